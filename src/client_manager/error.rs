use std::{
    error::Error,
    fmt::{self, Display},
};

/// The specific result type for sampling clients.
pub type Result<T> = std::result::Result<T, InsufficientClients>;

/// Error returned by `ClientManager::sample` whenever less clients than requested are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientClients {
    pub requested: usize,
    pub available: usize,
}

impl Display for InsufficientClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClientManager error: requested {} clients but only {} are available",
            self.requested, self.available
        )
    }
}

impl Error for InsufficientClients {}
