use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many rollback passes may be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryLimit {
    /// At most this many passes; zero is treated as one.
    Bounded(u32),
    /// Keep trying until a pass succeeds or the context is done.
    Unbounded,
}

impl RetryLimit {
    /// Whether the 1-based `attempt` may run.
    #[must_use]
    pub fn permits(self, attempt: u32) -> bool {
        match self {
            Self::Bounded(max) => attempt <= max.max(1),
            Self::Unbounded => true,
        }
    }
}

/// Pause between two rollback passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    None,
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        multiplier: u32,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial_ms: 100,
            max_ms: 5_000,
            multiplier: 2,
        }
    }
}

impl Backoff {
    /// Delay to wait after the 1-based `failed_attempt` before the next one.
    #[must_use]
    pub fn delay(self, failed_attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential {
                initial_ms,
                max_ms,
                multiplier,
            } => {
                let exponent = failed_attempt.saturating_sub(1);
                let factor = u64::from(multiplier).checked_pow(exponent).unwrap_or(u64::MAX);
                Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// Hook that blocks the rollback loop between passes.
#[derive(Clone)]
pub struct Sleeper(Arc<dyn Fn(Duration) + Send + Sync>);

impl Sleeper {
    pub fn new(sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        Self(Arc::new(sleep))
    }

    pub fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            (self.0)(duration);
        }
    }
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::new(thread::sleep)
    }
}

impl fmt::Debug for Sleeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sleeper")
    }
}

/// Attempt limit and backoff for rollback.
///
/// ```
/// use std::time::Duration;
/// use txsaga_core::{Backoff, RetryLimit, RetryPolicy};
///
/// let policy = RetryPolicy::bounded(3).with_backoff(Backoff::Fixed { delay_ms: 50 });
/// assert!(policy.limit.permits(3));
/// assert!(!policy.limit.permits(4));
/// assert_eq!(policy.backoff.delay(1), Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub limit: RetryLimit,
    pub backoff: Backoff,
    #[serde(skip)]
    sleeper: Sleeper,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: RetryLimit::Unbounded,
            backoff: Backoff::default(),
            sleeper: Sleeper::default(),
        }
    }
}

impl RetryPolicy {
    /// Up to `attempts` passes with no pause in between.
    #[must_use]
    pub fn bounded(attempts: u32) -> Self {
        Self {
            limit: RetryLimit::Bounded(attempts),
            backoff: Backoff::None,
            sleeper: Sleeper::default(),
        }
    }

    /// Passes until success or cancellation, with the default backoff.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limit(mut self, limit: RetryLimit) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the blocking sleep between passes, e.g. to record delays in
    /// tests or to wake early on shutdown.
    #[must_use]
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Sleeper::new(sleep);
        self
    }

    pub(crate) fn pause_after(&self, failed_attempt: u32) {
        self.sleeper.sleep(self.backoff.delay(failed_attempt));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn bounded_limit_clamps_zero_to_one_attempt() {
        assert!(RetryLimit::Bounded(0).permits(1));
        assert!(!RetryLimit::Bounded(0).permits(2));
        assert!(RetryLimit::Bounded(2).permits(2));
        assert!(!RetryLimit::Bounded(2).permits(3));
        assert!(RetryLimit::Unbounded.permits(u32::MAX));
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let backoff = Backoff::Exponential {
            initial_ms: 100,
            max_ms: 1_000,
            multiplier: 3,
        };

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(300));
        assert_eq!(backoff.delay(3), Duration::from_millis(900));
        assert_eq!(backoff.delay(4), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(200), Duration::from_millis(1_000));
    }

    #[test]
    fn no_backoff_never_sleeps() {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&slept);
        let policy = RetryPolicy::bounded(3).with_sleeper(move |d| {
            recorder.lock().expect("lock").push(d);
        });

        policy.pause_after(1);

        assert!(slept.lock().expect("lock").is_empty());
    }

    #[test]
    fn sleeper_receives_backoff_delay() {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&slept);
        let policy = RetryPolicy::unbounded()
            .with_backoff(Backoff::Fixed { delay_ms: 25 })
            .with_sleeper(move |d| recorder.lock().expect("lock").push(d));

        policy.pause_after(1);
        policy.pause_after(2);

        assert_eq!(
            *slept.lock().expect("lock"),
            vec![Duration::from_millis(25), Duration::from_millis(25)]
        );
    }

    #[test]
    fn policy_parses_from_toml() -> Result<(), toml::de::Error> {
        let policy: RetryPolicy = toml::from_str(
            r#"
            limit = { bounded = 5 }

            [backoff]
            strategy = "fixed"
            delay_ms = 10
            "#,
        )?;

        assert_eq!(policy.limit, RetryLimit::Bounded(5));
        assert_eq!(policy.backoff, Backoff::Fixed { delay_ms: 10 });
        Ok(())
    }

    #[test]
    fn missing_keys_use_defaults() -> Result<(), toml::de::Error> {
        let policy: RetryPolicy = toml::from_str(r#"limit = "unbounded""#)?;

        assert_eq!(policy.limit, RetryLimit::Unbounded);
        assert_eq!(policy.backoff, Backoff::default());
        Ok(())
    }
}
