use std::{error::Error, fmt};

use super::MetricKind;

/// The specific result type for recording metrics.
pub type Result<T> = std::result::Result<T, HistoryErr>;

/// Error returned by `History::add` when an entry would break the ledger's ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryErr {
    /// This metric was already recorded for this round.
    Duplicate { round: u64, kind: MetricKind },
    /// A later round was already recorded.
    RoundRegressed { round: u64, last: u64 },
}

impl fmt::Display for HistoryErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate { round, kind } => {
                write!(f, "{kind:?} already recorded for round {round}")
            }
            Self::RoundRegressed { round, last } => {
                write!(f, "can't record round {round} after round {last}")
            }
        }
    }
}

impl Error for HistoryErr {}
