mod config;
mod dispatch;
mod server;

pub use config::ServerConfig;
pub use dispatch::{Dispatcher, RoundOutcome};
pub use server::Server;
