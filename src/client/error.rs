use std::{error::Error, fmt, io};

/// The result type of calls made on a client.
pub type Result<T> = std::result::Result<T, ClientErr>;

/// Hard failures raised by a client call.
///
/// Not finishing in time is not one of them, clients report it by returning an empty update.
#[derive(Debug)]
pub enum ClientErr {
    /// The client went away before answering.
    Disconnected,
    /// The client answered with something that doesn't follow the protocol.
    Protocol(String),
    /// The client failed while doing the work.
    Failed(String),
    Io(io::Error),
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("client disconnected"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Failed(msg) => write!(f, "client failed: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
