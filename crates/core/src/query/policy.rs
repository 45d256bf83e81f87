use std::time::Duration;

/// Exponential retry delay: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl Backoff {
    /// No delay between attempts.
    pub const NONE: Backoff = Backoff {
        base: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Retry and freshness settings for one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
    /// How long fetched data counts as fresh.
    pub stale_time: Duration,
    /// How long an inactive key keeps its pages before eviction.
    pub cache_time: Duration,
}

impl FetchPolicy {
    /// Policy for game listings: two retries, fresh for an hour, inactive
    /// keys dropped after five minutes.
    pub fn listing() -> Self {
        Self {
            retries: 2,
            backoff: Backoff::default(),
            stale_time: Duration::from_secs(60 * 60),
            cache_time: Duration::from_secs(5 * 60),
        }
    }

    /// Same policy with a different retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Same policy with a different backoff.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Same policy with a different freshness window.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Same policy with a different eviction delay for inactive keys.
    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::listing()
    }
}
