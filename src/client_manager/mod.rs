mod error;
mod manager;

pub use error::{InsufficientClients, Result};
pub use manager::ClientManager;
