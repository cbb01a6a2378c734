//! Retry delay policy for failed range fetches.

use std::time::Duration;

/// Exponential backoff with jitter, capped at `max_delay`.
///
/// The jitter term exists to avoid synchronized retry storms when many
/// in-flight jobs fail at the same time (e.g. one endpoint stalls).
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Baseline delay; also the jitter range.
    pub min_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(3),
        }
    }
}

impl Backoff {
    /// Compute the delay for a given attempt count.
    ///
    /// A negative `attempt` returns `min_delay` (the first-attempt baseline,
    /// not a zero-delay special case). Otherwise the delay is
    /// `min_delay * 1.5^attempt` plus a random jitter in `[0, min_delay)`,
    /// capped at `max_delay`.
    pub fn next(&self, attempt: i32) -> Duration {
        if attempt < 0 {
            return self.min_delay;
        }

        let minf = self.min_delay.as_secs_f64();
        let durf = minf * 1.5f64.powi(attempt) + rand::random::<f64>() * minf;

        let delay = Duration::from_secs_f64(durf);
        if delay > self.max_delay {
            return self.max_delay;
        }

        delay
    }
}
