use std::sync::Arc;

use crate::{
    client::ClientHandle,
    client_manager::ClientManager,
    error::RoundFailure,
    messages::{EvaluateIns, EvaluateRes, FitIns, FitRes},
    parameters::Weights,
};

/// The decision points of a federated round.
///
/// A `Strategy` decides who takes part in every round, what they are told to do, how their
/// results are combined and whether training should go on. The server holds exactly one
/// strategy for the whole run and only ever calls it from the round loop, implementors that
/// keep bookkeeping across rounds should document it.
#[allow(unused)]
#[trait_variant::make(Strategy: Send)]
pub trait StrategyTemplate: Sync {
    /// Should select the clients for a training round and build their instructions.
    ///
    /// # Arguments
    /// * `round` - The current round, starting at 1.
    /// * `weights` - A snapshot of the current global weights.
    /// * `clients` - The registry of available clients.
    ///
    /// # Returns
    /// The selected clients paired with their instructions, an empty list skips the round.
    async fn configure_fit(
        &self,
        round: u64,
        weights: &Arc<Weights>,
        clients: &ClientManager,
    ) -> Vec<(ClientHandle, FitIns)>;

    /// Should combine the training results of a round into new global weights.
    ///
    /// # Arguments
    /// * `round` - The current round.
    /// * `results` - The usable results, empty updates already filtered out.
    /// * `failures` - Why the rest of the dispatched calls didn't produce a result.
    ///
    /// # Returns
    /// The new global weights or `None` to keep the current ones.
    fn aggregate_fit(
        &self,
        round: u64,
        results: Vec<(ClientHandle, FitRes)>,
        failures: &[RoundFailure],
    ) -> Option<Weights>;

    /// Should select the clients for a distributed evaluation and build their instructions.
    ///
    /// # Arguments
    /// * `round` - The current round.
    /// * `weights` - A snapshot of the current global weights.
    /// * `clients` - The registry of available clients.
    async fn configure_evaluate(
        &self,
        round: u64,
        weights: &Arc<Weights>,
        clients: &ClientManager,
    ) -> Vec<(ClientHandle, EvaluateIns)>;

    /// Should combine the evaluation results of a round into a single loss.
    ///
    /// # Arguments
    /// * `round` - The current round.
    /// * `results` - The successful evaluations.
    /// * `failures` - Why the rest of the dispatched calls didn't produce a result.
    fn aggregate_evaluate(
        &self,
        round: u64,
        results: Vec<(ClientHandle, EvaluateRes)>,
        failures: &[RoundFailure],
    ) -> Option<f64>;

    /// Evaluates the global weights on the server side.
    ///
    /// # Returns
    /// The loss and accuracy, `None` disables centralized evaluation.
    fn evaluate(&self, _weights: &Weights) -> Option<(f64, f64)> {
        None
    }

    /// Decides whether to keep training after a round has been concluded.
    ///
    /// # Arguments
    /// * `round` - The round that just finished.
    /// * `loss` - The latest loss, if any was measured.
    /// * `accuracy` - The latest accuracy, if any was measured.
    fn on_conclude_round(&self, _round: u64, _loss: Option<f64>, _accuracy: Option<f64>) -> bool {
        true
    }
}
