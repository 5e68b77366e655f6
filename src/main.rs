mod demo;

use std::{env, sync::Arc};

use anyhow::Context;
use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::signal;

use federated_orchestra::{
    ClientManager, EarlyStopping, FedAvg, History, LocalClient, RunConfig, ServerConfig,
    Strategy, Weights, start_server,
};

use crate::demo::{Dataset, LinearClient, Line, line_of};

const DEFAULT_NUM_CLIENTS: usize = 10;
const SAMPLES_PER_CLIENT: usize = 200;
const TEST_SAMPLES: usize = 500;
const ACCURACY_TOLERANCE: f32 = 0.25;

const DEFAULT_CONFIG: &str = r#"{
    "num_rounds": 20,
    "strategy": {
        "fraction_fit": 0.5,
        "fraction_evaluate": 0.5,
        "min_available_clients": 2,
        "epochs": 2,
        "batch_size": 16,
        "round_timeout_secs": 5,
        "partial_updates": true
    },
    "early_stopping": { "target_accuracy": 0.95 }
}"#;

const LINE: Line = Line {
    slope: 1.5,
    intercept: -0.5,
    noise: 0.1,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => RunConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => RunConfig::from_json(DEFAULT_CONFIG).context("parsing the default config")?,
    };

    let num_clients = match env::var("NUM_CLIENTS") {
        Ok(n) => n.parse().context("NUM_CLIENTS must be a positive integer")?,
        Err(_) => DEFAULT_NUM_CLIENTS,
    };

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let client_manager = Arc::new(match config.seed {
        Some(seed) => ClientManager::with_seed(seed),
        None => ClientManager::new(),
    });

    for i in 0..num_clients {
        let client = LinearClient::new(rng.random(), LINE, SAMPLES_PER_CLIENT);
        client_manager.register(Arc::new(LocalClient::new(format!("client-{i}"), client)));
    }
    info!("registered {num_clients} simulated clients");

    let test_set = Dataset::generate(&mut rng, LINE, TEST_SAMPLES);
    let fedavg = FedAvg::new(config.fedavg_config()).with_eval_fn(move |weights: &Weights| {
        let (slope, intercept) = line_of(weights).ok()?;
        let loss = test_set.mse(slope, intercept);
        let accuracy = test_set.accuracy(slope, intercept, ACCURACY_TOLERANCE);
        Some((loss, accuracy))
    });

    let server_config = config.server_config();
    let history = match config.early_stopping_config() {
        Some(early_stopping) => {
            let strategy = EarlyStopping::new(fedavg, early_stopping);
            run(client_manager, strategy, server_config, config.num_rounds).await?
        }
        None => run(client_manager, fedavg, server_config, config.num_rounds).await?,
    };

    if let Some(history) = history {
        let json = serde_json::to_string_pretty(&history).context("serializing the history")?;
        println!("{json}");
    }

    Ok(())
}

/// Runs the federation until it finishes or the process is interrupted.
///
/// # Returns
/// The run's history, `None` if it was interrupted.
async fn run<S: Strategy>(
    client_manager: Arc<ClientManager>,
    strategy: S,
    config: ServerConfig,
    num_rounds: u64,
) -> anyhow::Result<Option<History>> {
    tokio::select! {
        ret = start_server(client_manager, strategy, config, num_rounds) => {
            let history = ret.context("federated training failed")?;
            info!("wrapping up after {} round(s)", history.last_round().unwrap_or(0));
            Ok(Some(history))
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
            Ok(None)
        }
    }
}
