mod error;
mod local;
mod proxy;

pub use error::{ClientErr, Result};
pub use local::{Client, LocalClient};
pub use proxy::{ClientHandle, ClientProxy};
