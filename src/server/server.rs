use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::Instant;

use super::{Dispatcher, ServerConfig};
use crate::{
    client_manager::ClientManager,
    error::OrchestraError,
    history::History,
    parameters::Weights,
    strategy::Strategy,
};

/// The round orchestrator.
///
/// Owns the global weights and drives the rounds, delegating every decision to it's strategy.
/// The weights are only replaced between rounds, clients always get a snapshot.
pub struct Server<S> {
    client_manager: Arc<ClientManager>,
    strategy: S,
    weights: Arc<Weights>,
    dispatcher: Dispatcher,
    config: ServerConfig,
}

impl<S: Strategy> Server<S> {
    /// Creates a new `Server`.
    ///
    /// # Arguments
    /// * `client_manager` - The registry of available clients.
    /// * `strategy` - The strategy to use for the whole run.
    /// * `config` - Server side configuration.
    ///
    /// # Returns
    /// A new `Server` instance.
    pub fn new(client_manager: Arc<ClientManager>, strategy: S, config: ServerConfig) -> Self {
        Self {
            client_manager,
            strategy,
            weights: Arc::new(Weights::default()),
            dispatcher: Dispatcher::new(&config),
            config,
        }
    }

    pub fn client_manager(&self) -> &Arc<ClientManager> {
        &self.client_manager
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// The current global weights.
    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Runs federated training for a number of rounds.
    ///
    /// # Arguments
    /// * `num_rounds` - The maximum amount of rounds to run, the strategy may stop earlier.
    ///
    /// # Returns
    /// The metrics recorded along the run, or an error if the initial weights couldn't be
    /// obtained. Client failures during the rounds never end the run.
    pub async fn fit(&mut self, num_rounds: u64) -> Result<History, OrchestraError> {
        let mut history = History::new();

        self.weights = Arc::new(self.initial_weights().await?);
        info!(
            tensors = self.weights.len(), params = self.weights.num_params();
            "initial weights received"
        );

        if let Some((loss, accuracy)) = self.strategy.evaluate(&self.weights) {
            info!("initial weights (loss/accuracy): {loss}, {accuracy}");
            history.add_loss_centralized(0, loss)?;
            history.add_accuracy_centralized(0, accuracy)?;
        }

        info!("starting {num_rounds} rounds");
        let start = Instant::now();

        for round in 1..=num_rounds {
            match self.fit_round(round).await {
                Some(weights) => self.weights = Arc::new(weights),
                None => warn!("round {round}: keeping the previous weights"),
            }

            let (mut loss, mut accuracy) = (None, None);
            if let Some((l, a)) = self.strategy.evaluate(&self.weights) {
                info!("progress (round/loss/accuracy): {round}, {l}, {a}");
                history.add_loss_centralized(round, l)?;
                history.add_accuracy_centralized(round, a)?;
                (loss, accuracy) = (Some(l), Some(a));
            }

            if let Some(l) = self.evaluate_round(round).await {
                info!("round {round}: distributed loss {l}");
                history.add_loss_distributed(round, l)?;
                (loss, accuracy) = (Some(l), None);
            }

            if !self.strategy.on_conclude_round(round, loss, accuracy) {
                info!("strategy stopped training after round {round}");
                break;
            }
        }

        info!("finished in {:?}", start.elapsed());
        Ok(history)
    }

    /// Runs a single training round.
    ///
    /// # Arguments
    /// * `round` - The current round.
    ///
    /// # Returns
    /// The new global weights, or `None` if the round was skipped or nothing could be aggregated.
    pub async fn fit_round(&self, round: u64) -> Option<Weights> {
        let instructions = self
            .strategy
            .configure_fit(round, &self.weights, &self.client_manager)
            .await;

        if instructions.is_empty() {
            warn!("round {round}: no clients selected for training, skipping");
            return None;
        }

        debug!(round = round, clients = instructions.len(); "dispatching fit");
        let outcome = self.dispatcher.fit_clients(instructions).await;
        debug!(
            round = round, results = outcome.results.len(), failures = outcome.failures.len();
            "fit round settled"
        );

        self.strategy
            .aggregate_fit(round, outcome.results, &outcome.failures)
    }

    /// Runs a single distributed evaluation round.
    ///
    /// # Arguments
    /// * `round` - The current round.
    ///
    /// # Returns
    /// The aggregated loss, or `None` if the round was skipped or nothing could be aggregated.
    pub async fn evaluate_round(&self, round: u64) -> Option<f64> {
        let instructions = self
            .strategy
            .configure_evaluate(round, &self.weights, &self.client_manager)
            .await;

        if instructions.is_empty() {
            debug!(round = round; "no clients selected for evaluation");
            return None;
        }

        debug!(round = round, clients = instructions.len(); "dispatching evaluate");
        let outcome = self.dispatcher.evaluate_clients(instructions).await;
        debug!(
            round = round, results = outcome.results.len(), failures = outcome.failures.len();
            "evaluate round settled"
        );

        self.strategy
            .aggregate_evaluate(round, outcome.results, &outcome.failures)
    }

    /// Asks a single random client for it's weights.
    ///
    /// # Returns
    /// The weights of the client, or an error if there are no clients or the call failed.
    async fn initial_weights(&self) -> Result<Weights, OrchestraError> {
        if let Some(wait) = self.config.bootstrap_wait {
            if !self.client_manager.wait_for(1, wait).await {
                warn!("no client registered within {wait:?}");
            }
        }

        let client = self
            .client_manager
            .sample(1)?
            .into_iter()
            .next()
            .ok_or(OrchestraError::InsufficientClients {
                requested: 1,
                available: 0,
            })?;

        debug!(cid = client.cid(); "requesting initial weights");
        client
            .get_parameters()
            .await
            .map_err(|source| OrchestraError::Bootstrap {
                cid: client.cid().to_string(),
                source,
            })
    }
}
