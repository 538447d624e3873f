//! Shared backoff state and next-delay computation
//!
//! One [`Backoff`] exists per poller. Each fetch cycle is summarised into a
//! [`CycleOutcome`], and [`Backoff::next_delay`] turns that summary into the wait
//! before the following cycle.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for "never" when a deadline does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// What one fetch cycle observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Listeners resolved and removed this cycle
    pub resolved: usize,

    /// Listeners whose event still reported them as pending
    pub collisions: usize,

    /// Largest `retry_after` carried by a colliding event
    pub retry_after: Option<Duration>,

    /// The batch fetch itself failed
    pub fetch_failed: bool,
}

impl CycleOutcome {
    /// Outcome of a cycle whose fetch failed
    pub fn failed() -> Self {
        Self {
            fetch_failed: true,
            ..Self::default()
        }
    }

    /// Record a collision, keeping the largest retry hint seen so far
    pub fn record_collision(&mut self, retry_after: Option<Duration>) {
        self.collisions += 1;
        self.retry_after = match (self.retry_after, retry_after) {
            (Some(current), Some(new)) => Some(current.max(new)),
            (current, new) => current.or(new),
        };
    }

    /// Record a resolved listener
    pub fn record_resolution(&mut self) {
        self.resolved += 1;
    }
}

/// Shared polling cadence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `base`, never growing past `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    /// Current shared delay
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Base delay
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Return to the base delay, used when arming from an empty registry
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Compute the wait before the next cycle
    ///
    /// An explicit `retry_after` wins and leaves the shared delay alone; it is
    /// still capped at the ceiling. Collisions without a hint double the shared
    /// delay up to the cap. Cycles with no news, including failed fetches,
    /// hold the delay.
    pub fn next_delay(&mut self, outcome: &CycleOutcome) -> Duration {
        if outcome.collisions > 0 {
            if let Some(retry_after) = outcome.retry_after {
                return retry_after.min(self.max);
            }
            self.current = self.current.saturating_mul(2).min(self.max);
        }
        self.current
    }
}

/// Random offset in `[0, max]` for the first arm of a poller
pub fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..=max)
}

/// `now + delay`, saturating to a far-future instant instead of overflowing
pub fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
