use std::sync::Arc;

use super::Result;
use crate::{
    messages::{EvaluateIns, EvaluateRes, FitIns, FitRes},
    parameters::Weights,
};

/// A shared handle to a client, as stored by the `ClientManager`.
pub type ClientHandle = Arc<dyn ClientProxy>;

/// The server side view of a remote client.
///
/// Implementors wrap whatever transport reaches the actual client, the server only relies on this contract.
#[async_trait::async_trait]
pub trait ClientProxy: Send + Sync {
    /// The stable identity of this client.
    fn cid(&self) -> &str;

    /// Should return the client's current local weights, used once to bootstrap the global weights.
    async fn get_parameters(&self) -> Result<Weights>;

    /// Should refine the given weights on the client's local data.
    ///
    /// # Arguments
    /// * `ins` - The weights to start from and the configuration for this round.
    ///
    /// # Returns
    /// The refined weights, or empty weights / zero examples when no usable update exists.
    async fn fit(&self, ins: FitIns) -> Result<FitRes>;

    /// Should evaluate the given weights on the client's local data.
    ///
    /// # Arguments
    /// * `ins` - The weights to evaluate and the configuration for this round.
    async fn evaluate(&self, ins: EvaluateIns) -> Result<EvaluateRes>;
}
