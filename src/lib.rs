pub mod client;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod history;
pub mod messages;
pub mod parameters;
pub mod server;
pub mod strategy;

use std::sync::Arc;

pub use client::{Client, ClientErr, ClientHandle, ClientProxy, LocalClient};
pub use client_manager::{ClientManager, InsufficientClients};
pub use config::RunConfig;
pub use error::{OrchestraError, RoundFailure};
pub use history::{Entry, History, MetricKind};
pub use messages::{Config, EvaluateIns, EvaluateRes, FitIns, FitRes};
pub use parameters::{Tensor, Weights};
pub use server::{Server, ServerConfig};
pub use strategy::{EarlyStopping, EarlyStoppingConfig, FedAvg, FedAvgConfig, Strategy};

/// Runs a whole federated training with the clients registered in `client_manager`.
///
/// # Arguments
/// * `client_manager` - The registry of available clients, may keep changing during the run.
/// * `strategy` - The strategy to use for the whole run.
/// * `config` - Server side configuration.
/// * `num_rounds` - The maximum amount of rounds to run.
///
/// # Errors
/// Returns an `OrchestraError` if the initial weights couldn't be obtained.
pub async fn start_server<S: Strategy>(
    client_manager: Arc<ClientManager>,
    strategy: S,
    config: ServerConfig,
    num_rounds: u64,
) -> Result<History, OrchestraError> {
    log::info!(
        "starting server with {} client(s) registered",
        client_manager.num_available()
    );

    let mut server = Server::new(client_manager, strategy, config);
    server.fit(num_rounds).await
}
