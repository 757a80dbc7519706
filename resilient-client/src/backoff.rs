//! Delay computation between retry attempts.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum relative jitter applied to a computed delay (±10%).
pub const JITTER_RATIO: f64 = 0.1;

/// Fallback horizon for deadlines that do not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// How the delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * (attempt - 1)`
    Linear,
    /// `base * 2^(attempt - 2)`
    Exponential,
    /// `base`
    Fixed,
    /// No delay
    None,
}

/// Calculate the delay before `attempt` (1-based) with random jitter.
///
/// The first attempt never waits. The result is clamped to `max_delay` when
/// given and rounded to whole milliseconds.
///
/// # Examples
///
/// ```
/// use resilient_client::backoff::{calculate_backoff, BackoffStrategy};
/// use std::time::Duration;
///
/// let base = Duration::from_millis(100);
/// assert_eq!(calculate_backoff(1, base, None, BackoffStrategy::Exponential), Duration::ZERO);
///
/// let delay = calculate_backoff(2, base, None, BackoffStrategy::Exponential);
/// assert!(delay >= Duration::from_millis(90) && delay <= Duration::from_millis(110));
/// ```
#[must_use]
pub fn calculate_backoff(
    attempt: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    strategy: BackoffStrategy,
) -> Duration {
    let jitter = rand::thread_rng().gen_range(-1.0..=1.0);
    calculate_backoff_with_jitter(attempt, base_delay, max_delay, strategy, jitter)
}

/// Deterministic form of [`calculate_backoff`].
///
/// `jitter` is a factor in `[-1.0, 1.0]` scaled by [`JITTER_RATIO`]; `0.0`
/// yields the raw strategy delay.
#[must_use]
pub fn calculate_backoff_with_jitter(
    attempt: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    strategy: BackoffStrategy,
    jitter: f64,
) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }

    let base_ms = base_delay.as_secs_f64() * 1000.0;
    let raw_ms = match strategy {
        BackoffStrategy::None => return Duration::ZERO,
        BackoffStrategy::Fixed => base_ms,
        BackoffStrategy::Linear => base_ms * f64::from(attempt - 1),
        // Exponent saturates well past any realistic max_delay.
        BackoffStrategy::Exponential => base_ms * 2f64.powi((attempt - 2).min(62) as i32),
    };

    let jitter = jitter.clamp(-1.0, 1.0) * JITTER_RATIO;
    let mut delay_ms = (raw_ms * (1.0 + jitter)).max(0.0);
    if let Some(max) = max_delay {
        delay_ms = delay_ms.min(max.as_secs_f64() * 1000.0);
    }

    let rounded = delay_ms.round();
    if rounded.is_finite() && rounded < u64::MAX as f64 {
        Duration::from_millis(rounded as u64)
    } else {
        max_delay.unwrap_or(Duration::MAX)
    }
}

/// `now + after`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);

    #[test]
    fn test_first_attempt_never_waits() {
        for strategy in [
            BackoffStrategy::Linear,
            BackoffStrategy::Exponential,
            BackoffStrategy::Fixed,
            BackoffStrategy::None,
        ] {
            assert_eq!(calculate_backoff(0, BASE, None, strategy), Duration::ZERO);
            assert_eq!(calculate_backoff(1, BASE, None, strategy), Duration::ZERO);
        }
    }

    #[test]
    fn test_strategies_without_jitter() {
        let calc = |attempt, strategy| {
            calculate_backoff_with_jitter(attempt, BASE, None, strategy, 0.0)
        };

        assert_eq!(calc(2, BackoffStrategy::Fixed), Duration::from_millis(100));
        assert_eq!(calc(5, BackoffStrategy::Fixed), Duration::from_millis(100));

        assert_eq!(calc(2, BackoffStrategy::Linear), Duration::from_millis(100));
        assert_eq!(calc(3, BackoffStrategy::Linear), Duration::from_millis(200));
        assert_eq!(calc(4, BackoffStrategy::Linear), Duration::from_millis(300));

        assert_eq!(calc(2, BackoffStrategy::Exponential), Duration::from_millis(100));
        assert_eq!(calc(3, BackoffStrategy::Exponential), Duration::from_millis(200));
        assert_eq!(calc(4, BackoffStrategy::Exponential), Duration::from_millis(400));

        assert_eq!(calc(4, BackoffStrategy::None), Duration::ZERO);
    }

    #[test]
    fn test_jitter_is_symmetric_ten_percent() {
        let low = calculate_backoff_with_jitter(2, BASE, None, BackoffStrategy::Fixed, -1.0);
        let high = calculate_backoff_with_jitter(2, BASE, None, BackoffStrategy::Fixed, 1.0);
        assert_eq!(low, Duration::from_millis(90));
        assert_eq!(high, Duration::from_millis(110));
    }

    #[test]
    fn test_max_delay_cap() {
        let max = Some(Duration::from_millis(150));
        let delay = calculate_backoff_with_jitter(6, BASE, max, BackoffStrategy::Exponential, 1.0);
        assert_eq!(delay, Duration::from_millis(150));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, BASE), now + BASE);
        assert!(deadline_after(now, Duration::MAX) >= now + FAR_FUTURE);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let max = Some(Duration::from_secs(30));
        let delay = calculate_backoff(u32::MAX, BASE, max, BackoffStrategy::Exponential);
        assert_eq!(delay, Duration::from_secs(30));
    }
}
