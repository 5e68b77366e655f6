use std::{sync::Arc, time::Duration};

use log::{debug, warn};

use super::{
    Strategy,
    aggregate::{weighted_average, weighted_loss_avg},
};
use crate::{
    client::ClientHandle,
    client_manager::ClientManager,
    error::RoundFailure,
    messages::{Config, EvaluateIns, EvaluateRes, FitIns, FitRes, keys},
    parameters::Weights,
};

/// A centralized evaluation function, returns the loss and accuracy of the given weights.
pub type EvalFn = Box<dyn Fn(&Weights) -> Option<(f64, f64)> + Send + Sync>;

/// The configuration of the `FedAvg` strategy.
#[derive(Debug, Clone)]
pub struct FedAvgConfig {
    /// Fraction of the available clients sampled for training.
    pub fraction_fit: f64,
    /// Fraction of the available clients sampled for evaluation.
    pub fraction_evaluate: f64,
    pub min_fit_clients: usize,
    pub min_evaluate_clients: usize,
    /// Rounds are skipped while less than this many clients are available.
    pub min_available_clients: usize,
    /// How long to wait for `min_available_clients` before giving up on a round.
    pub availability_timeout: Option<Duration>,
    pub epochs: usize,
    pub batch_size: usize,
    /// The time budget clients are told to respect when training, rounded up to whole seconds.
    pub round_timeout: Option<Duration>,
    /// Whether clients may return an update they couldn't finish in time.
    pub partial_updates: bool,
    /// Extra key/values forwarded untouched to every client.
    pub extra: Config,
}

impl Default for FedAvgConfig {
    fn default() -> Self {
        Self {
            fraction_fit: 0.1,
            fraction_evaluate: 0.1,
            min_fit_clients: 1,
            min_evaluate_clients: 1,
            min_available_clients: 1,
            availability_timeout: None,
            epochs: 1,
            batch_size: 32,
            round_timeout: None,
            partial_updates: false,
            extra: Config::new(),
        }
    }
}

/// Federated averaging.
///
/// Samples a fraction of the available clients every round and averages their weights
/// weighted by the amount of examples each one trained on. Holds no state across rounds.
pub struct FedAvg {
    config: FedAvgConfig,
    eval_fn: Option<EvalFn>,
}

impl Default for FedAvg {
    fn default() -> Self {
        Self::new(FedAvgConfig::default())
    }
}

impl FedAvg {
    /// Creates a new `FedAvg` strategy without centralized evaluation.
    ///
    /// # Arguments
    /// * `config` - The strategy's configuration.
    ///
    /// # Returns
    /// A new `FedAvg` instance.
    pub fn new(config: FedAvgConfig) -> Self {
        Self {
            config,
            eval_fn: None,
        }
    }

    /// Enables centralized evaluation.
    ///
    /// # Arguments
    /// * `eval_fn` - Computes the loss and accuracy of the global weights.
    pub fn with_eval_fn<F>(mut self, eval_fn: F) -> Self
    where
        F: Fn(&Weights) -> Option<(f64, f64)> + Send + Sync + 'static,
    {
        self.eval_fn = Some(Box::new(eval_fn));
        self
    }

    /// The amount of clients to sample for training out of `available`.
    pub fn num_fit_clients(&self, available: usize) -> usize {
        Self::num_clients(available, self.config.fraction_fit, self.config.min_fit_clients)
    }

    /// The amount of clients to sample for evaluation out of `available`.
    pub fn num_evaluate_clients(&self, available: usize) -> usize {
        Self::num_clients(
            available,
            self.config.fraction_evaluate,
            self.config.min_evaluate_clients,
        )
    }

    fn num_clients(available: usize, fraction: f64, min: usize) -> usize {
        ((available as f64 * fraction) as usize).max(min)
    }

    /// Samples clients for a round, waiting for enough of them to show up if configured to.
    ///
    /// # Arguments
    /// * `clients` - The registry of available clients.
    /// * `count` - A function of the amount of available clients to the amount to sample.
    ///
    /// # Returns
    /// The sampled clients, empty if there weren't enough of them.
    async fn sample(
        &self,
        clients: &ClientManager,
        count: impl Fn(usize) -> usize,
    ) -> Vec<ClientHandle> {
        let min_available = self.config.min_available_clients;

        if let Some(timeout) = self.config.availability_timeout {
            clients.wait_for(min_available, timeout).await;
        }

        let available = clients.num_available();
        if available < min_available {
            warn!("only {available} of at least {min_available} clients available, skipping");
            return Vec::new();
        }

        match clients.sample(count(available)) {
            Ok(sampled) => sampled,
            Err(e) => {
                warn!("{e}, skipping");
                Vec::new()
            }
        }
    }

    /// Builds the training configuration for a round.
    ///
    /// # Arguments
    /// * `round` - The current round, starting at 1.
    fn fit_config(&self, round: u64) -> Config {
        let cfg = &self.config;
        let mut config = cfg.extra.clone();

        let epoch_global = round.saturating_sub(1) * cfg.epochs as u64;
        config.insert(keys::EPOCHS.into(), cfg.epochs.to_string());
        config.insert(keys::BATCH_SIZE.into(), cfg.batch_size.to_string());
        config.insert(keys::EPOCH_GLOBAL.into(), epoch_global.to_string());
        config.insert(
            keys::PARTIAL_UPDATES.into(),
            if cfg.partial_updates { "1" } else { "0" }.into(),
        );

        // Clients only understand whole seconds, never round a budget down to nothing.
        if let Some(timeout) = cfg.round_timeout {
            let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
            config.insert(keys::TIMEOUT.into(), secs.max(1).to_string());
        }

        config
    }

    fn evaluate_config(&self, round: u64) -> Config {
        let mut config = self.config.extra.clone();
        config.insert(keys::ROUND.into(), round.to_string());
        config
    }
}

impl Strategy for FedAvg {
    async fn configure_fit(
        &self,
        round: u64,
        weights: &Arc<Weights>,
        clients: &ClientManager,
    ) -> Vec<(ClientHandle, FitIns)> {
        let config = self.fit_config(round);

        self.sample(clients, |available| self.num_fit_clients(available))
            .await
            .into_iter()
            .map(|client| {
                let ins = FitIns {
                    weights: Arc::clone(weights),
                    config: config.clone(),
                };
                (client, ins)
            })
            .collect()
    }

    fn aggregate_fit(
        &self,
        round: u64,
        mut results: Vec<(ClientHandle, FitRes)>,
        failures: &[RoundFailure],
    ) -> Option<Weights> {
        debug!(
            round = round, results = results.len(), failures = failures.len();
            "aggregating fit results"
        );

        results.sort_by(|(a, _), (b, _)| a.cid().cmp(b.cid()));
        let contributions: Vec<_> = results
            .iter()
            .map(|(_, res)| (&res.weights, res.num_examples))
            .collect();

        let aggregated = weighted_average(&contributions);
        if aggregated.is_none() && !results.is_empty() {
            warn!("round {round}: fit results couldn't be aggregated");
        }

        aggregated
    }

    async fn configure_evaluate(
        &self,
        round: u64,
        weights: &Arc<Weights>,
        clients: &ClientManager,
    ) -> Vec<(ClientHandle, EvaluateIns)> {
        let config = self.evaluate_config(round);

        self.sample(clients, |available| self.num_evaluate_clients(available))
            .await
            .into_iter()
            .map(|client| {
                let ins = EvaluateIns {
                    weights: Arc::clone(weights),
                    config: config.clone(),
                };
                (client, ins)
            })
            .collect()
    }

    fn aggregate_evaluate(
        &self,
        round: u64,
        mut results: Vec<(ClientHandle, EvaluateRes)>,
        failures: &[RoundFailure],
    ) -> Option<f64> {
        debug!(
            round = round, results = results.len(), failures = failures.len();
            "aggregating evaluation results"
        );

        results.sort_by(|(a, _), (b, _)| a.cid().cmp(b.cid()));
        let losses: Vec<_> = results
            .iter()
            .map(|(_, res)| (res.num_examples, res.loss))
            .collect();

        weighted_loss_avg(&losses)
    }

    fn evaluate(&self, weights: &Weights) -> Option<(f64, f64)> {
        self.eval_fn.as_ref().and_then(|eval_fn| eval_fn(weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{MockClient, scalar};

    fn registry(n: usize) -> ClientManager {
        let clients = ClientManager::with_seed(7);
        for i in 0..n {
            clients.register(MockClient::new(&format!("c{i}")).handle());
        }
        clients
    }

    fn fit_res(cid: &str, value: f32, n: u64) -> (ClientHandle, FitRes) {
        let res = FitRes {
            weights: scalar(value),
            num_examples: n,
            num_examples_ceil: n,
        };
        (MockClient::new(cid).handle(), res)
    }

    #[test]
    fn sample_size_respects_fraction_and_minimum() {
        let strategy = FedAvg::new(FedAvgConfig {
            fraction_fit: 0.5,
            min_fit_clients: 2,
            ..Default::default()
        });

        assert_eq!(strategy.num_fit_clients(10), 5);
        assert_eq!(strategy.num_fit_clients(3), 2);
        assert_eq!(strategy.num_evaluate_clients(100), 10);
    }

    #[tokio::test]
    async fn fit_instructions_carry_the_round_config() {
        let mut extra = Config::new();
        extra.insert("lr".into(), "0.1".into());
        let strategy = FedAvg::new(FedAvgConfig {
            fraction_fit: 1.0,
            epochs: 3,
            batch_size: 16,
            round_timeout: Some(Duration::from_secs(20)),
            partial_updates: true,
            extra,
            ..Default::default()
        });
        let weights = Arc::new(scalar(0.0));

        let instructions = strategy.configure_fit(4, &weights, &registry(3)).await;

        assert_eq!(instructions.len(), 3);
        let config = &instructions[0].1.config;
        assert_eq!(config[keys::EPOCHS], "3");
        assert_eq!(config[keys::BATCH_SIZE], "16");
        assert_eq!(config[keys::EPOCH_GLOBAL], "9");
        assert_eq!(config[keys::TIMEOUT], "20");
        assert_eq!(config[keys::PARTIAL_UPDATES], "1");
        assert_eq!(config["lr"], "0.1");
        assert!(Arc::ptr_eq(&instructions[0].1.weights, &weights));
    }

    #[test]
    fn round_timeout_is_rounded_up_to_whole_seconds() {
        let timeout_for = |millis| {
            let strategy = FedAvg::new(FedAvgConfig {
                round_timeout: Some(Duration::from_millis(millis)),
                ..Default::default()
            });
            strategy.fit_config(1)[keys::TIMEOUT].clone()
        };

        assert_eq!(timeout_for(0), "1");
        assert_eq!(timeout_for(250), "1");
        assert_eq!(timeout_for(2000), "2");
        assert_eq!(timeout_for(2500), "3");
        assert!(!FedAvg::default().fit_config(1).contains_key(keys::TIMEOUT));
    }

    #[tokio::test]
    async fn rounds_are_skipped_below_min_available() {
        let strategy = FedAvg::new(FedAvgConfig {
            min_available_clients: 4,
            ..Default::default()
        });
        let weights = Arc::new(scalar(0.0));
        let clients = registry(3);

        assert!(strategy.configure_fit(1, &weights, &clients).await.is_empty());
        assert!(
            strategy
                .configure_evaluate(1, &weights, &clients)
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn rounds_are_skipped_when_minimum_exceeds_available() {
        let strategy = FedAvg::new(FedAvgConfig {
            min_fit_clients: 5,
            ..Default::default()
        });
        let weights = Arc::new(scalar(0.0));

        assert!(strategy.configure_fit(1, &weights, &registry(2)).await.is_empty());
    }

    #[test]
    fn aggregation_is_independent_of_result_order() {
        let strategy = FedAvg::default();
        let results = vec![
            fit_res("a", 0.1, 7),
            fit_res("b", 0.7, 13),
            fit_res("c", 1.3, 3),
            fit_res("d", -2.9, 11),
        ];
        let mut reversed = results.clone();
        reversed.reverse();
        let mut rotated = results.clone();
        rotated.rotate_left(2);

        let expected = strategy.aggregate_fit(1, results, &[]).unwrap();
        assert_eq!(strategy.aggregate_fit(1, reversed, &[]).unwrap(), expected);
        assert_eq!(strategy.aggregate_fit(1, rotated, &[]).unwrap(), expected);
    }

    #[test]
    fn nothing_to_aggregate_keeps_the_weights() {
        let strategy = FedAvg::default();
        assert!(strategy.aggregate_fit(1, Vec::new(), &[]).is_none());
        assert!(strategy.aggregate_evaluate(1, Vec::new(), &[]).is_none());
    }

    #[test]
    fn centralized_evaluation_is_optional() {
        let weights = scalar(2.0);
        assert!(FedAvg::default().evaluate(&weights).is_none());

        let strategy =
            FedAvg::default().with_eval_fn(|w: &Weights| Some((w[0].values()[0] as f64, 0.5)));
        assert_eq!(strategy.evaluate(&weights), Some((2.0, 0.5)));
    }
}
