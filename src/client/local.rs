use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task;

use super::{ClientErr, ClientProxy, Result};
use crate::{
    messages::{EvaluateIns, EvaluateRes, FitIns, FitRes},
    parameters::Weights,
};

/// The client side of the protocol, implemented by whoever owns the data and the model.
///
/// Calls are blocking, they are expected to be CPU-bound.
pub trait Client {
    fn get_parameters(&mut self) -> Result<Weights>;

    fn fit(&mut self, ins: FitIns) -> Result<FitRes>;

    fn evaluate(&mut self, ins: EvaluateIns) -> Result<EvaluateRes>;
}

/// Exposes an in-process `Client` as a `ClientProxy`.
///
/// It bridges the async runtime with the blocking implementation of the `Client` by running
/// every call on the blocking thread pool. The inner lock serializes calls to the same client.
pub struct LocalClient<C> {
    cid: String,
    inner: Arc<Mutex<C>>,
}

impl<C> LocalClient<C> {
    /// Creates a new `LocalClient`.
    ///
    /// # Arguments
    /// * `cid` - The identity this client is registered under.
    /// * `client` - The blocking client implementation.
    ///
    /// # Returns
    /// A new `LocalClient` instance.
    pub fn new(cid: impl Into<String>, client: C) -> Self {
        Self {
            cid: cid.into(),
            inner: Arc::new(Mutex::new(client)),
        }
    }
}

impl<C: Client + Send + 'static> LocalClient<C> {
    /// Runs `f` against the inner client on the blocking thread pool.
    ///
    /// # Arguments
    /// * `f` - The call to make.
    ///
    /// # Returns
    /// The result of the call, or a `ClientErr::Failed` if the call panicked.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);

        task::spawn_blocking(move || f(&mut inner.lock()))
            .await
            .map_err(|e| ClientErr::Failed(format!("client task aborted: {e}")))?
    }
}

#[async_trait::async_trait]
impl<C: Client + Send + 'static> ClientProxy for LocalClient<C> {
    fn cid(&self) -> &str {
        &self.cid
    }

    async fn get_parameters(&self) -> Result<Weights> {
        self.run(|client| client.get_parameters()).await
    }

    async fn fit(&self, ins: FitIns) -> Result<FitRes> {
        self.run(move |client| client.fit(ins)).await
    }

    async fn evaluate(&self, ins: EvaluateIns) -> Result<EvaluateRes> {
        self.run(move |client| client.evaluate(ins)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Tensor;

    struct Doubler;

    impl Client for Doubler {
        fn get_parameters(&mut self) -> Result<Weights> {
            Ok(Weights::new(vec![Tensor::from_vec(vec![1.0])]))
        }

        fn fit(&mut self, ins: FitIns) -> Result<FitRes> {
            let tensors = ins
                .weights
                .iter()
                .map(|t| Tensor::from_vec(t.values().iter().map(|v| v * 2.).collect()))
                .collect();

            Ok(FitRes {
                weights: Weights::new(tensors),
                num_examples: 4,
                num_examples_ceil: 4,
            })
        }

        fn evaluate(&mut self, _ins: EvaluateIns) -> Result<EvaluateRes> {
            panic!("evaluation is broken");
        }
    }

    #[tokio::test]
    async fn local_client_forwards_calls() {
        let client = LocalClient::new("a", Doubler);
        assert_eq!(client.cid(), "a");

        let weights = client.get_parameters().await.unwrap();
        let ins = FitIns {
            weights: Arc::new(weights),
            config: Default::default(),
        };

        let res = client.fit(ins).await.unwrap();
        assert_eq!(res.weights[0].values(), &[2.0]);
        assert_eq!(res.num_examples, 4);
    }

    #[tokio::test]
    async fn local_client_turns_panics_into_errors() {
        let client = LocalClient::new("a", Doubler);
        let ins = EvaluateIns {
            weights: Arc::new(Weights::default()),
            config: Default::default(),
        };

        let err = client.evaluate(ins).await.unwrap_err();
        assert!(matches!(err, ClientErr::Failed(_)));
    }
}
