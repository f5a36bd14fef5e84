//! Politeness pacing between page requests

use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use std::time::Duration;
use tracing::{debug_span, Instrument};

/// Spaces requests at least `delay` apart, plus up to `jitter` extra
pub struct Pacer {
    limiter: Option<DefaultDirectRateLimiter>,
    jitter: Duration,
}

impl Pacer {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        let limiter = Quota::with_period(delay).map(RateLimiter::direct);
        Self { limiter, jitter }
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        limiter
            .until_ready_with_jitter(Jitter::up_to(self.jitter))
            .instrument(debug_span!("pacer"))
            .await;
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("limited", &self.limiter.is_some())
            .field("jitter", &self.jitter)
            .finish()
    }
}
