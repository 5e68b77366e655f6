//! The JSON facing run configuration, validated and adapted into the typed configurations
//! of the server and the strategies.

use std::{fs, num::NonZeroUsize, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::OrchestraError,
    messages::Config,
    server::ServerConfig,
    strategy::{EarlyStoppingConfig, FedAvgConfig},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub num_rounds: u64,
    /// Seed for client sampling, entropy seeded if absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub strategy: FedAvgSettings,
    #[serde(default)]
    pub early_stopping: Option<EarlyStoppingSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub call_timeout_secs: Option<f64>,
    pub max_concurrency: Option<usize>,
    pub bootstrap_wait_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FedAvgSettings {
    pub fraction_fit: f64,
    pub fraction_evaluate: f64,
    pub min_fit_clients: usize,
    pub min_evaluate_clients: usize,
    pub min_available_clients: usize,
    pub availability_timeout_secs: Option<f64>,
    pub epochs: usize,
    pub batch_size: usize,
    pub round_timeout_secs: Option<u64>,
    pub partial_updates: bool,
    pub extra: Config,
}

impl Default for FedAvgSettings {
    fn default() -> Self {
        let defaults = FedAvgConfig::default();
        Self {
            fraction_fit: defaults.fraction_fit,
            fraction_evaluate: defaults.fraction_evaluate,
            min_fit_clients: defaults.min_fit_clients,
            min_evaluate_clients: defaults.min_evaluate_clients,
            min_available_clients: defaults.min_available_clients,
            availability_timeout_secs: None,
            epochs: defaults.epochs,
            batch_size: defaults.batch_size,
            round_timeout_secs: None,
            partial_updates: defaults.partial_updates,
            extra: defaults.extra,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EarlyStoppingSettings {
    pub target_accuracy: Option<f64>,
    pub patience: Option<usize>,
    pub min_delta: f64,
}

impl RunConfig {
    /// Parses and validates a `RunConfig` from JSON.
    ///
    /// # Errors
    /// Returns `OrchestraError::InvalidConfig` if the JSON is malformed or the values are invalid.
    pub fn from_json(json: &str) -> Result<Self, OrchestraError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OrchestraError::InvalidConfig(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a `RunConfig` from a JSON file.
    ///
    /// # Errors
    /// Returns `OrchestraError::Io` if the file can't be read, `OrchestraError::InvalidConfig`
    /// if it's contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OrchestraError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Checks every value is within it's valid range.
    pub fn validate(&self) -> Result<(), OrchestraError> {
        let invalid = |msg: String| -> Result<(), OrchestraError> {
            Err(OrchestraError::InvalidConfig(msg))
        };
        let strategy = &self.strategy;

        for (name, fraction) in [
            ("fraction_fit", strategy.fraction_fit),
            ("fraction_evaluate", strategy.fraction_evaluate),
        ] {
            if !(0.0..=1.0).contains(&fraction) {
                return invalid(format!("{name} must be within [0, 1], got {fraction}"));
            }
        }

        if strategy.epochs == 0 {
            return invalid("epochs must be at least 1".into());
        }

        if strategy.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }

        if strategy.round_timeout_secs == Some(0) {
            return invalid("round_timeout_secs must be at least 1".into());
        }

        if self.server.max_concurrency == Some(0) {
            return invalid("max_concurrency must be at least 1".into());
        }

        for (name, secs) in [
            ("call_timeout_secs", self.server.call_timeout_secs),
            ("bootstrap_wait_secs", self.server.bootstrap_wait_secs),
            ("availability_timeout_secs", strategy.availability_timeout_secs),
        ] {
            if let Some(secs) = secs {
                if secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                    return invalid(format!("{name} must be a positive duration, got {secs}"));
                }
            }
        }

        if let Some(early_stopping) = &self.early_stopping {
            if early_stopping.min_delta < 0.0 {
                return invalid("min_delta must not be negative".into());
            }

            if early_stopping.patience == Some(0) {
                return invalid("patience must be at least 1".into());
            }
        }

        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        let server = &self.server;
        ServerConfig {
            call_timeout: server.call_timeout_secs.map(Duration::from_secs_f64),
            max_concurrency: server.max_concurrency.and_then(NonZeroUsize::new),
            bootstrap_wait: server.bootstrap_wait_secs.map(Duration::from_secs_f64),
        }
    }

    pub fn fedavg_config(&self) -> FedAvgConfig {
        let strategy = &self.strategy;
        FedAvgConfig {
            fraction_fit: strategy.fraction_fit,
            fraction_evaluate: strategy.fraction_evaluate,
            min_fit_clients: strategy.min_fit_clients,
            min_evaluate_clients: strategy.min_evaluate_clients,
            min_available_clients: strategy.min_available_clients,
            availability_timeout: strategy
                .availability_timeout_secs
                .map(Duration::from_secs_f64),
            epochs: strategy.epochs,
            batch_size: strategy.batch_size,
            round_timeout: strategy.round_timeout_secs.map(Duration::from_secs),
            partial_updates: strategy.partial_updates,
            extra: strategy.extra.clone(),
        }
    }

    pub fn early_stopping_config(&self) -> Option<EarlyStoppingConfig> {
        self.early_stopping.as_ref().map(|s| EarlyStoppingConfig {
            target_accuracy: s.target_accuracy,
            patience: s.patience,
            min_delta: s.min_delta,
        })
    }
}
