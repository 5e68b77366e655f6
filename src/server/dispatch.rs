use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};

use log::{debug, warn};
use tokio::{sync::Semaphore, task::JoinSet, time};

use super::ServerConfig;
use crate::{
    client::ClientHandle,
    error::RoundFailure,
    messages::{EvaluateIns, EvaluateRes, FitIns, FitRes},
};

/// Everything a round of calls produced, once every call has settled.
pub struct RoundOutcome<R> {
    /// The usable results, in dispatch order.
    pub results: Vec<(ClientHandle, R)>,
    pub failures: Vec<RoundFailure>,
}

/// Fans instructions out to clients and joins every call before returning.
#[derive(Clone)]
pub struct Dispatcher {
    call_timeout: Option<Duration>,
    permits: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Creates a new `Dispatcher`.
    ///
    /// # Arguments
    /// * `config` - The server configuration holding the call timeout and concurrency limit.
    ///
    /// # Returns
    /// A new `Dispatcher` instance.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            call_timeout: config.call_timeout,
            permits: config
                .max_concurrency
                .map(|limit| Arc::new(Semaphore::new(limit.get()))),
        }
    }

    /// Trains on every given client concurrently.
    ///
    /// Empty updates and updates whose layout differs from the dispatched weights are turned
    /// into failures.
    ///
    /// # Arguments
    /// * `instructions` - The clients paired with their instructions.
    pub async fn fit_clients(
        &self,
        instructions: Vec<(ClientHandle, FitIns)>,
    ) -> RoundOutcome<FitRes> {
        self.dispatch(instructions, fit_client).await
    }

    /// Evaluates on every given client concurrently.
    ///
    /// # Arguments
    /// * `instructions` - The clients paired with their instructions.
    pub async fn evaluate_clients(
        &self,
        instructions: Vec<(ClientHandle, EvaluateIns)>,
    ) -> RoundOutcome<EvaluateRes> {
        self.dispatch(instructions, evaluate_client).await
    }

    /// Spawns one task per client and waits for all of them.
    ///
    /// A client appearing twice only gets the first set of instructions, the second one
    /// is reported as a failure. Tasks that panic are reported as failures too.
    ///
    /// # Arguments
    /// * `instructions` - The clients paired with their instructions.
    /// * `call` - Makes the actual call on a client.
    async fn dispatch<I, R, F, Fut>(
        &self,
        instructions: Vec<(ClientHandle, I)>,
        call: F,
    ) -> RoundOutcome<R>
    where
        R: Send + 'static,
        F: Fn(ClientHandle, I) -> Fut,
        Fut: Future<Output = Result<R, RoundFailure>> + Send + 'static,
    {
        let mut failures = Vec::new();
        let mut seen = HashSet::with_capacity(instructions.len());
        let mut dispatched: Vec<ClientHandle> = Vec::with_capacity(instructions.len());
        let mut tasks = JoinSet::new();

        for (client, ins) in instructions {
            let cid = client.cid().to_string();
            if !seen.insert(cid.clone()) {
                failures.push(RoundFailure::Duplicate { cid });
                continue;
            }

            let idx = dispatched.len();
            let fut = call(Arc::clone(&client), ins);
            let permits = self.permits.clone();
            let call_timeout = self.call_timeout;
            dispatched.push(client);

            tasks.spawn(async move {
                let _permit = match permits {
                    Some(permits) => permits.acquire_owned().await.ok(),
                    None => None,
                };

                let res = match call_timeout {
                    Some(after) => time::timeout(after, fut)
                        .await
                        .unwrap_or(Err(RoundFailure::TimedOut { cid, after })),
                    None => fut.await,
                };

                (idx, res)
            });
        }

        let mut settled: Vec<Option<Result<R, RoundFailure>>> =
            dispatched.iter().map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            if let Ok((idx, res)) = joined {
                settled[idx] = Some(res);
            }
        }

        let mut results = Vec::with_capacity(dispatched.len());
        for (client, res) in dispatched.into_iter().zip(settled) {
            match res {
                Some(Ok(res)) => results.push((client, res)),
                Some(Err(failure)) => failures.push(failure),
                None => failures.push(RoundFailure::Panicked {
                    cid: client.cid().to_string(),
                }),
            }
        }

        for failure in &failures {
            warn!("{failure}");
        }

        debug!(results = results.len(), failures = failures.len(); "calls settled");
        RoundOutcome { results, failures }
    }
}

async fn fit_client(client: ClientHandle, ins: FitIns) -> Result<FitRes, RoundFailure> {
    let dispatched = Arc::clone(&ins.weights);
    let res = client.fit(ins).await.map_err(|source| RoundFailure::Call {
        cid: client.cid().to_string(),
        source,
    })?;

    if res.is_empty() {
        return Err(RoundFailure::EmptyUpdate {
            cid: client.cid().to_string(),
        });
    }

    // Nothing to compare against before the first weights are known.
    if !dispatched.is_empty() && !res.weights.same_layout(&dispatched) {
        return Err(RoundFailure::LayoutMismatch {
            cid: client.cid().to_string(),
        });
    }

    Ok(res)
}

async fn evaluate_client(
    client: ClientHandle,
    ins: EvaluateIns,
) -> Result<EvaluateRes, RoundFailure> {
    client
        .evaluate(ins)
        .await
        .map_err(|source| RoundFailure::Call {
            cid: client.cid().to_string(),
            source,
        })
}
