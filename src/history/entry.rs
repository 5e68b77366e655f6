use serde::{Deserialize, Serialize};

/// The kind of metric recorded in a `History` entry.
///
/// The declaration order is the order entries of the same round are listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CentralizedLoss,
    CentralizedAccuracy,
    DistributedLoss,
}

/// A single recorded metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The round the metric belongs to, round 0 is the measurement before any training.
    pub round: u64,
    pub kind: MetricKind,
    pub value: f64,
}
