//! Backoff, jitter, deadline and budget for internal retries.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Default maximum number of internal retries for one transaction.
pub const DEFAULT_MAX_INTERNAL_RETRY_COUNT: u32 = 100;

/// How random noise is applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Jitter {
    /// Use the computed delay as is.
    None,
    /// Pick uniformly from `[0, delay]`.
    #[default]
    Full,
    /// Pick uniformly from `[delay / 2, delay]`.
    Equal,
}

impl Jitter {
    /// Apply the jitter to `delay` using `rng`.
    pub fn apply<R: Rng + ?Sized>(self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Self::None => delay,
            Self::Full => scale(delay, rng.gen_range(0.0..=1.0)),
            Self::Equal => {
                let half = delay / 2;
                half.saturating_add(scale(half, rng.gen_range(0.0..=1.0)))
            }
        }
    }
}

/// `delay * factor` for `factor` in `[0, 1]`, never above `delay`.
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).map_or(delay, |d| d.min(delay))
}

/// Retry policy for transactions aborted by the database.
///
/// The policy is a pure function of its fields; it keeps no per-transaction state. The
/// transaction fixes its deadline with [`deadline`](Self::deadline) at the first abort and
/// asks [`next_delay`](Self::next_delay) for every retry after that.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use spindle::{Jitter, RetryPolicy};
///
/// let policy = RetryPolicy::default()
///     .with_initial_delay(Duration::from_millis(10))
///     .with_jitter(Jitter::None);
///
/// assert_eq!(policy.next_delay(1), Duration::from_millis(10));
/// assert_eq!(policy.next_delay(2), Duration::from_millis(20));
/// assert!(!policy.should_give_up(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any computed delay.
    pub max_delay: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
    /// Noise applied to computed delays.
    pub jitter: Jitter,
    /// Time budget for all retries of one transaction, counted from its first abort.
    pub total_timeout: Duration,
    /// Maximum number of retries for one transaction.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(32),
            multiplier: 2.0,
            jitter: Jitter::Full,
            total_timeout: Duration::from_secs(120),
            max_retries: DEFAULT_MAX_INTERNAL_RETRY_COUNT,
        }
    }
}

impl RetryPolicy {
    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum computed delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the total retry time budget.
    #[must_use]
    pub const fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check that the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the multiplier is below 1 or not finite, or if the
    /// initial delay exceeds the maximum delay.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::config(format!(
                "retry multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::config(format!(
                "initial retry delay {:?} exceeds max delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// The un-jittered delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// The jittered delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, &mut rand::thread_rng())
    }

    /// Like [`next_delay`](Self::next_delay) with a caller-supplied random source.
    pub fn next_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.jitter.apply(self.backoff(attempt), rng)
    }

    /// The retry deadline for a transaction whose first abort happened at `now`.
    ///
    /// `None` if `total_timeout` is too large to be represented, in which case only the
    /// retry budget limits the transaction.
    #[must_use]
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.total_timeout)
    }

    /// Whether waiting `delay` from `now` ends after `deadline`.
    ///
    /// A wait that cannot be represented as an instant always ends too late.
    #[must_use]
    pub fn exceeds_deadline(now: Instant, delay: Duration, deadline: Option<Instant>) -> bool {
        match (now.checked_add(delay), deadline) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(end), Some(deadline)) => end > deadline,
        }
    }

    /// Returns `true` once `retry_count` retries have used up the budget.
    #[must_use]
    pub const fn should_give_up(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn fixed() -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(Jitter::None)
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = fixed();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(1));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn attempt_zero_behaves_like_first() {
        assert_eq!(fixed().backoff(0), fixed().backoff(1));
    }

    #[test]
    fn full_jitter_stays_within_bounds() {
        let policy = fixed().with_jitter(Jitter::Full);
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..10 {
            let delay = policy.next_delay_with(attempt, &mut rng);
            assert!(delay <= policy.backoff(attempt));
        }
    }

    #[test]
    fn equal_jitter_keeps_half() {
        let policy = fixed().with_jitter(Jitter::Equal);
        let mut rng = StdRng::seed_from_u64(11);
        for attempt in 1..10 {
            let base = policy.backoff(attempt);
            let delay = policy.next_delay_with(attempt, &mut rng);
            assert!(delay >= base / 2 && delay <= base);
        }
    }

    #[test]
    fn budget_is_inclusive() {
        let policy = fixed().with_max_retries(3);
        assert!(!policy.should_give_up(2));
        assert!(policy.should_give_up(3));
        assert!(RetryPolicy::default().with_max_retries(0).should_give_up(0));
    }

    #[test]
    fn deadline_adds_total_timeout() {
        let policy = fixed().with_total_timeout(Duration::from_secs(5));
        let now = Instant::now();
        assert_eq!(policy.deadline(now), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn unrepresentable_timeout_has_no_deadline() {
        let policy = fixed().with_total_timeout(Duration::MAX);
        let now = Instant::now();
        assert_eq!(policy.deadline(now), None);
        assert!(!RetryPolicy::exceeds_deadline(now, Duration::from_secs(3600), None));
    }

    #[test]
    fn unrepresentable_delay_exceeds_any_deadline() {
        let now = Instant::now();
        assert!(RetryPolicy::exceeds_deadline(now, Duration::MAX, None));
        assert!(RetryPolicy::exceeds_deadline(now, Duration::MAX, Some(now)));
        let deadline = Some(now + Duration::from_secs(1));
        assert!(!RetryPolicy::exceeds_deadline(now, Duration::from_secs(1), deadline));
    }

    #[test]
    fn jitter_never_overflows_huge_delays() {
        let mut rng = StdRng::seed_from_u64(3);
        for jitter in [Jitter::None, Jitter::Full, Jitter::Equal] {
            assert!(jitter.apply(Duration::MAX, &mut rng) <= Duration::MAX);
        }
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::MAX)
            .with_max_delay(Duration::MAX);
        assert_eq!(policy.backoff(1), Duration::MAX);
        let _ = policy.next_delay_with(4, &mut rng);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(fixed().with_multiplier(0.5).validate().is_err());
        assert!(fixed().with_multiplier(f64::NAN).validate().is_err());
        assert!(fixed().with_initial_delay(Duration::from_secs(5)).validate().is_err());
    }

    #[test]
    fn serde_fills_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries": 3}"#).unwrap();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, RetryPolicy::default().initial_delay);
    }
}
