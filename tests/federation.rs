use std::sync::Arc;

use federated_orchestra::{
    Client, ClientErr, ClientManager, EarlyStopping, EarlyStoppingConfig, EvaluateIns,
    EvaluateRes, FedAvg, FedAvgConfig, FitIns, FitRes, LocalClient, MetricKind, OrchestraError,
    RunConfig, ServerConfig, Tensor, Weights, messages::keys, start_server,
};

/// Pulls every weight halfway towards a local target on each epoch.
#[derive(Debug)]
struct TargetClient {
    target: f32,
    examples: u64,
    crash_on_fit: bool,
}

impl TargetClient {
    fn new(target: f32, examples: u64) -> Self {
        Self {
            target,
            examples,
            crash_on_fit: false,
        }
    }

    fn crashing(mut self) -> Self {
        self.crash_on_fit = true;
        self
    }
}

impl Client for TargetClient {
    fn get_parameters(&mut self) -> Result<Weights, ClientErr> {
        Ok(Weights::new(vec![Tensor::from_vec(vec![0.0, 0.0])]))
    }

    fn fit(&mut self, ins: FitIns) -> Result<FitRes, ClientErr> {
        if self.crash_on_fit {
            return Err(ClientErr::Failed("out of memory".into()));
        }

        let epochs: usize = ins
            .config
            .get(keys::EPOCHS)
            .and_then(|e| e.parse().ok())
            .ok_or_else(|| ClientErr::Protocol("missing epochs".into()))?;

        let mut weights = (*ins.weights).clone();
        for _ in 0..epochs {
            for tensor in weights.iter_mut() {
                for w in tensor.values_mut() {
                    *w += (self.target - *w) * 0.5;
                }
            }
        }

        Ok(FitRes {
            weights,
            num_examples: self.examples,
            num_examples_ceil: self.examples,
        })
    }

    fn evaluate(&mut self, ins: EvaluateIns) -> Result<EvaluateRes, ClientErr> {
        let loss = ins
            .weights
            .iter()
            .flat_map(|t| t.values())
            .map(|w| f64::from(w - self.target).powi(2))
            .sum();

        Ok(EvaluateRes {
            num_examples: self.examples,
            loss,
        })
    }
}

fn federation(clients: Vec<TargetClient>) -> Arc<ClientManager> {
    let manager = Arc::new(ClientManager::with_seed(1234));
    for (i, client) in clients.into_iter().enumerate() {
        manager.register(Arc::new(LocalClient::new(format!("client-{i}"), client)));
    }
    manager
}

fn every_client() -> FedAvgConfig {
    FedAvgConfig {
        fraction_fit: 1.0,
        fraction_evaluate: 1.0,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn federation_converges_to_the_weighted_target() -> Result<(), OrchestraError> {
    let manager = federation(vec![
        TargetClient::new(1.0, 10),
        TargetClient::new(3.0, 30),
        TargetClient::new(0.0, 10).crashing(),
    ]);

    let history = start_server(manager, FedAvg::new(every_client()), ServerConfig::default(), 30)
        .await?;

    let losses = history.losses_distributed();
    assert_eq!(losses.len(), 30);
    assert!(losses.last().unwrap().1 < losses.first().unwrap().1);
    assert!(history.losses_centralized().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn centralized_evaluation_drives_early_stopping() -> Result<(), OrchestraError> {
    let manager = federation(vec![TargetClient::new(2.0, 5), TargetClient::new(2.0, 5)]);

    let config = FedAvgConfig {
        fraction_evaluate: 0.0,
        min_evaluate_clients: 0,
        ..every_client()
    };
    let fedavg = FedAvg::new(config).with_eval_fn(|weights: &Weights| {
        let error = (f64::from(weights[0].values()[0]) - 2.0).abs();
        Some((error, if error < 0.01 { 1.0 } else { 0.0 }))
    });
    let strategy = EarlyStopping::new(
        fedavg,
        EarlyStoppingConfig {
            target_accuracy: Some(1.0),
            ..Default::default()
        },
    );

    let history = start_server(manager, strategy, ServerConfig::default(), 100).await?;

    // The error halves every round: 2, 1, 0.5, ... and drops below 0.01 at round 8.
    assert_eq!(history.last_round(), Some(8));
    let first = history.to_vec()[0];
    assert_eq!((first.round, first.kind), (0, MetricKind::CentralizedLoss));
    assert_eq!(first.value, 2.0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn target_accuracy_stops_runs_with_distributed_evaluation() -> Result<(), OrchestraError> {
    let manager = federation(vec![TargetClient::new(2.0, 5), TargetClient::new(2.0, 5)]);

    let fedavg = FedAvg::new(every_client()).with_eval_fn(|weights: &Weights| {
        let error = (f64::from(weights[0].values()[0]) - 2.0).abs();
        Some((error, if error < 0.01 { 1.0 } else { 0.0 }))
    });
    let strategy = EarlyStopping::new(
        fedavg,
        EarlyStoppingConfig {
            target_accuracy: Some(0.95),
            ..Default::default()
        },
    );

    let history = start_server(manager, strategy, ServerConfig::default(), 100).await?;

    assert_eq!(history.last_round(), Some(8));
    assert_eq!(history.losses_distributed().len(), 8);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_config_drives_a_whole_run() -> Result<(), OrchestraError> {
    let config = RunConfig::from_json(
        r#"{
            "num_rounds": 4,
            "seed": 9,
            "server": { "call_timeout_secs": 5.0, "max_concurrency": 2 },
            "strategy": { "fraction_fit": 0.5, "fraction_evaluate": 1.0, "epochs": 2 }
        }"#,
    )?;

    let manager = federation((0..6).map(|i| TargetClient::new(i as f32, 10)).collect());
    let strategy = FedAvg::new(config.fedavg_config());

    let history = start_server(manager, strategy, config.server_config(), config.num_rounds).await?;

    assert_eq!(
        history
            .losses_distributed()
            .iter()
            .map(|(round, _)| *round)
            .collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    Ok(())
}

#[tokio::test]
async fn empty_registry_fails_before_any_round() {
    let manager = Arc::new(ClientManager::new());

    let err = start_server(manager, FedAvg::default(), ServerConfig::default(), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestraError::InsufficientClients { .. }));
}
