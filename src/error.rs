use std::{fmt, io, time::Duration};

use crate::{client::ClientErr, client_manager::InsufficientClients, history::HistoryErr};

/// All errors that can stop a run.
#[derive(Debug)]
pub enum OrchestraError {
    /// Less clients than needed were registered.
    InsufficientClients { requested: usize, available: usize },
    /// The client chosen to provide the initial weights failed to do so.
    Bootstrap { cid: String, source: ClientErr },
    /// A metric couldn't be recorded.
    History(HistoryErr),
    /// Invalid configuration, caught before running.
    InvalidConfig(String),
    Io(io::Error),
}

impl fmt::Display for OrchestraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientClients {
                requested,
                available,
            } => write!(
                f,
                "insufficient clients: requested {requested}, available {available}"
            ),
            Self::Bootstrap { cid, source } => {
                write!(f, "client {cid} failed to provide initial weights: {source}")
            }
            Self::History(e) => write!(f, "history error: {e}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bootstrap { source, .. } => Some(source),
            Self::History(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InsufficientClients> for OrchestraError {
    fn from(e: InsufficientClients) -> Self {
        Self::InsufficientClients {
            requested: e.requested,
            available: e.available,
        }
    }
}

impl From<HistoryErr> for OrchestraError {
    fn from(e: HistoryErr) -> Self {
        Self::History(e)
    }
}

impl From<io::Error> for OrchestraError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Why a single dispatched call didn't yield a usable result.
///
/// These never abort a round, they are handed to the strategy next to the successful results.
#[derive(Debug)]
pub enum RoundFailure {
    /// The call itself raised.
    Call { cid: String, source: ClientErr },
    /// The call succeeded but carried no weights or no examples.
    EmptyUpdate { cid: String },
    /// The returned weights don't have the layout of the dispatched weights.
    LayoutMismatch { cid: String },
    /// The call didn't settle before the server's deadline.
    TimedOut { cid: String, after: Duration },
    /// The task running the call panicked or was cancelled.
    Panicked { cid: String },
    /// The client was given more than one set of instructions in the same round.
    Duplicate { cid: String },
}

impl RoundFailure {
    /// The identity of the client this failure belongs to.
    pub fn cid(&self) -> &str {
        match self {
            Self::Call { cid, .. }
            | Self::EmptyUpdate { cid }
            | Self::LayoutMismatch { cid }
            | Self::TimedOut { cid, .. }
            | Self::Panicked { cid }
            | Self::Duplicate { cid } => cid,
        }
    }
}

impl fmt::Display for RoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { cid, source } => write!(f, "client {cid} call failed: {source}"),
            Self::EmptyUpdate { cid } => write!(f, "client {cid} returned an empty update"),
            Self::LayoutMismatch { cid } => {
                write!(f, "client {cid} returned weights with a different layout")
            }
            Self::TimedOut { cid, after } => {
                write!(f, "client {cid} didn't answer within {after:?}")
            }
            Self::Panicked { cid } => write!(f, "client {cid} call panicked"),
            Self::Duplicate { cid } => {
                write!(f, "client {cid} was selected more than once in the same round")
            }
        }
    }
}

impl std::error::Error for RoundFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Call { source, .. } => Some(source),
            _ => None,
        }
    }
}
