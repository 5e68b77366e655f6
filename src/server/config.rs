use std::{num::NonZeroUsize, time::Duration};

/// Server side knobs, everything about who takes part in a round belongs to the strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerConfig {
    /// A call not settled within this time counts as failed. `None` waits for clients forever
    /// and relies on them honoring the round timeout they are told.
    pub call_timeout: Option<Duration>,
    /// The maximum amount of calls in flight at once, unbounded if `None`.
    pub max_concurrency: Option<NonZeroUsize>,
    /// How long to wait for a first client to provide the initial weights.
    pub bootstrap_wait: Option<Duration>,
}
