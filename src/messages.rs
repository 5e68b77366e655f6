use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::parameters::Weights;

/// Per-round directives sent to a client, both keys and values are opaque strings.
pub type Config = BTreeMap<String, String>;

/// Well-known configuration keys understood by typical clients, the server never interprets them.
pub mod keys {
    pub const EPOCHS: &str = "epochs";
    pub const BATCH_SIZE: &str = "batch_size";
    pub const TIMEOUT: &str = "timeout";
    pub const PARTIAL_UPDATES: &str = "partial_updates";
    pub const EPOCH_GLOBAL: &str = "epoch_global";
    pub const ROUND: &str = "round";
}

/// Training instructions for a single client in a single round.
#[derive(Debug, Clone)]
pub struct FitIns {
    pub weights: Arc<Weights>,
    pub config: Config,
}

/// The result of a client's local training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRes {
    /// The refined weights, empty if the client couldn't finish and partial updates were disabled.
    pub weights: Weights,
    /// The amount of examples actually used for training.
    pub num_examples: u64,
    /// The amount of examples the client would have used had it finished.
    pub num_examples_ceil: u64,
}

impl FitRes {
    /// Whether this result carries an update that can be aggregated.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty() || self.num_examples == 0
    }
}

/// Evaluation instructions for a single client in a single round.
#[derive(Debug, Clone)]
pub struct EvaluateIns {
    pub weights: Arc<Weights>,
    pub config: Config,
}

/// The result of a client evaluating the global weights on it's local data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluateRes {
    pub num_examples: u64,
    pub loss: f64,
}
