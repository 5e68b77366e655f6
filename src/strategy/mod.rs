pub mod aggregate;
mod early_stopping;
mod fedavg;
mod strategy;

pub use early_stopping::{EarlyStopping, EarlyStoppingConfig};
pub use fedavg::{EvalFn, FedAvg, FedAvgConfig};
pub use strategy::Strategy;
