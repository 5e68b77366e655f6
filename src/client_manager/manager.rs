use std::{collections::BTreeMap, sync::Arc, time::Duration};

use log::{debug, info};
use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng, seq::index};
use tokio::{
    sync::Notify,
    time::{self, Instant},
};

use super::{InsufficientClients, Result};
use crate::client::ClientHandle;

/// Keeps track of the clients currently reachable by the server.
///
/// Safe to share between the server and whatever accepts incoming clients, every operation
/// takes the inner lock only for it's own duration.
pub struct ClientManager {
    clients: Mutex<BTreeMap<String, ClientHandle>>,
    rng: Mutex<StdRng>,
    registered: Notify,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    /// Creates a new `ClientManager` sampling with an entropy seeded rng.
    ///
    /// # Returns
    /// A new `ClientManager` instance.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Creates a new `ClientManager` with a fixed sampling seed.
    ///
    /// Given the same set of registered clients, the same sequence of `sample` calls
    /// selects the same clients.
    ///
    /// # Arguments
    /// * `seed` - The seed for the sampling rng.
    ///
    /// # Returns
    /// A new `ClientManager` instance.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            clients: Mutex::new(BTreeMap::new()),
            rng: Mutex::new(rng),
            registered: Notify::new(),
        }
    }

    /// The amount of clients currently registered.
    pub fn num_available(&self) -> usize {
        self.clients.lock().len()
    }

    /// Registers a new client.
    ///
    /// # Arguments
    /// * `client` - The handle of the client.
    ///
    /// # Returns
    /// `false` if a client with the same cid was already registered, in which case nothing changes.
    pub fn register(&self, client: ClientHandle) -> bool {
        let cid = client.cid().to_string();

        {
            let mut clients = self.clients.lock();
            if clients.contains_key(&cid) {
                return false;
            }

            clients.insert(cid.clone(), client);
        }

        info!(cid = cid.as_str(); "client registered");
        self.registered.notify_waiters();
        true
    }

    /// Unregisters a client.
    ///
    /// # Arguments
    /// * `cid` - The identity of the client.
    ///
    /// # Returns
    /// `false` if there was no such client.
    pub fn unregister(&self, cid: &str) -> bool {
        let removed = self.clients.lock().remove(cid).is_some();
        if removed {
            info!(cid = cid; "client unregistered");
        }

        removed
    }

    pub fn contains(&self, cid: &str) -> bool {
        self.clients.lock().contains_key(cid)
    }

    /// Returns every registered client, ordered by cid.
    pub fn all(&self) -> Vec<ClientHandle> {
        self.clients.lock().values().cloned().collect()
    }

    /// Selects `count` distinct clients uniformly at random.
    ///
    /// Never waits for clients to arrive, use `wait_for` beforehand for that.
    ///
    /// # Arguments
    /// * `count` - The amount of clients to select.
    ///
    /// # Returns
    /// The selected clients or `InsufficientClients` if less than `count` are registered.
    pub fn sample(&self, count: usize) -> Result<Vec<ClientHandle>> {
        let clients = self.clients.lock();
        let available = clients.len();

        if count > available {
            return Err(InsufficientClients {
                requested: count,
                available,
            });
        }

        let handles: Vec<&ClientHandle> = clients.values().collect();
        let picked = index::sample(&mut *self.rng.lock(), available, count);
        debug!(requested = count, available = available; "sampled clients");

        Ok(picked
            .into_iter()
            .map(|i| Arc::clone(handles[i]))
            .collect())
    }

    /// Waits until at least `count` clients are registered.
    ///
    /// # Arguments
    /// * `count` - The amount of clients to wait for.
    /// * `timeout` - The maximum amount of time to wait.
    ///
    /// # Returns
    /// Whether there were enough clients before the timeout elapsed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.registered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.num_available() >= count {
                return true;
            }

            if time::timeout_at(deadline, notified).await.is_err() {
                return self.num_available() >= count;
            }
        }
    }
}
