use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use super::Strategy;
use crate::{
    client::ClientHandle,
    client_manager::ClientManager,
    error::RoundFailure,
    messages::{EvaluateIns, EvaluateRes, FitIns, FitRes},
    parameters::Weights,
};

/// When `EarlyStopping` should end a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarlyStoppingConfig {
    /// Stop as soon as the accuracy reaches this value.
    pub target_accuracy: Option<f64>,
    /// Stop after this many rounds without the loss improving.
    pub patience: Option<usize>,
    /// The minimum decrease of the loss that counts as an improvement.
    pub min_delta: f64,
}

#[derive(Debug, Default)]
struct Progress {
    best_loss: Option<f64>,
    stale_rounds: usize,
    /// The accuracy of the latest centralized evaluation.
    accuracy: Option<f64>,
}

/// Wraps a strategy, ending the run once the target accuracy is reached or the loss plateaus.
///
/// Keeps the best loss seen so far and the amount of rounds since it last improved across
/// rounds, only `on_conclude_round` touches them. It also remembers the accuracy of the latest
/// centralized evaluation, since the server doesn't report it once a distributed loss exists.
/// Every other decision is delegated.
pub struct EarlyStopping<S> {
    inner: S,
    config: EarlyStoppingConfig,
    progress: Mutex<Progress>,
}

impl<S> EarlyStopping<S> {
    /// Creates a new `EarlyStopping` strategy.
    ///
    /// # Arguments
    /// * `inner` - The strategy to delegate to.
    /// * `config` - When to stop.
    ///
    /// # Returns
    /// A new `EarlyStopping` instance.
    pub fn new(inner: S, config: EarlyStoppingConfig) -> Self {
        Self {
            inner,
            config,
            progress: Mutex::new(Progress::default()),
        }
    }

    /// Tracks a new loss.
    ///
    /// # Returns
    /// Whether the loss has plateaued for longer than the configured patience.
    fn plateaued(&self, loss: f64) -> bool {
        let Some(patience) = self.config.patience else {
            return false;
        };

        let mut progress = self.progress.lock();
        match progress.best_loss {
            Some(best) if loss >= best - self.config.min_delta => progress.stale_rounds += 1,
            _ => {
                progress.best_loss = Some(loss);
                progress.stale_rounds = 0;
            }
        }

        progress.stale_rounds >= patience
    }
}

impl<S: Strategy> Strategy for EarlyStopping<S> {
    async fn configure_fit(
        &self,
        round: u64,
        weights: &Arc<Weights>,
        clients: &ClientManager,
    ) -> Vec<(ClientHandle, FitIns)> {
        self.inner.configure_fit(round, weights, clients).await
    }

    fn aggregate_fit(
        &self,
        round: u64,
        results: Vec<(ClientHandle, FitRes)>,
        failures: &[RoundFailure],
    ) -> Option<Weights> {
        self.inner.aggregate_fit(round, results, failures)
    }

    async fn configure_evaluate(
        &self,
        round: u64,
        weights: &Arc<Weights>,
        clients: &ClientManager,
    ) -> Vec<(ClientHandle, EvaluateIns)> {
        self.inner.configure_evaluate(round, weights, clients).await
    }

    fn aggregate_evaluate(
        &self,
        round: u64,
        results: Vec<(ClientHandle, EvaluateRes)>,
        failures: &[RoundFailure],
    ) -> Option<f64> {
        self.inner.aggregate_evaluate(round, results, failures)
    }

    fn evaluate(&self, weights: &Weights) -> Option<(f64, f64)> {
        let evaluation = self.inner.evaluate(weights);
        self.progress.lock().accuracy = evaluation.map(|(_, accuracy)| accuracy);
        evaluation
    }

    fn on_conclude_round(&self, round: u64, loss: Option<f64>, accuracy: Option<f64>) -> bool {
        if !self.inner.on_conclude_round(round, loss, accuracy) {
            return false;
        }

        let accuracy = accuracy.or(self.progress.lock().accuracy);
        if let (Some(target), Some(accuracy)) = (self.config.target_accuracy, accuracy) {
            if accuracy >= target {
                info!("round {round}: accuracy {accuracy} reached target {target}, stopping");
                return false;
            }
        }

        if let Some(loss) = loss {
            if self.plateaued(loss) {
                info!("round {round}: loss hasn't improved in a while, stopping");
                return false;
            }
        }

        true
    }
}
