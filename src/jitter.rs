//! Randomized jitter applied to each backoff interval.
//!
//! Draws a uniform deviate `r` in `[0, 1)` and scales the interval by
//! `1 - randomization_factor + 2 * randomization_factor * r`, clamped at
//! zero. At `randomization_factor = 0` this is the identity; at `1.0` it
//! spans `[0, 2x]`. This is `Jitter::Full` specialized to a single
//! randomization factor rather than a choice of strategies, since only one
//! jitter shape is needed here (full, symmetric around the unrandomized
//! interval).

use rand::Rng;
use std::time::Duration;

/// Apply the full-jitter randomization formula to `interval` using the thread RNG.
pub fn randomize(interval: Duration, randomization_factor: f64) -> Duration {
    randomize_with_rng(interval, randomization_factor, &mut rand::rng())
}

/// Same as [`randomize`] but with an injectable RNG, for deterministic tests.
pub fn randomize_with_rng<R: Rng + ?Sized>(
    interval: Duration,
    randomization_factor: f64,
    rng: &mut R,
) -> Duration {
    if randomization_factor <= 0.0 {
        return interval;
    }
    let r: f64 = rng.random_range(0.0..1.0);
    let factor = 1.0 - randomization_factor + 2.0 * randomization_factor * r;
    let secs = (interval.as_secs_f64() * factor).max(0.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn zero_randomization_factor_is_identity() {
        let interval = Duration::from_millis(500);
        assert_eq!(randomize(interval, 0.0), interval);
    }

    #[test]
    fn stays_within_bounds_across_many_draws() {
        let interval = Duration::from_millis(1000);
        let rf = 0.5;
        let lower = interval.mul_f64(1.0 - rf);
        let upper = interval.mul_f64(1.0 + rf);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let got = randomize_with_rng(interval, rf, &mut rng);
            assert!(got >= lower && got <= upper, "{:?} not in [{:?}, {:?}]", got, lower, upper);
        }
    }

    #[test]
    fn produces_at_least_fifty_distinct_values_over_a_hundred_draws() {
        let interval = Duration::from_secs(1);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(randomize_with_rng(interval, 0.5, &mut rng));
        }
        assert!(seen.len() >= 50, "only {} distinct values", seen.len());
    }

    #[test]
    fn zero_interval_stays_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(randomize_with_rng(Duration::ZERO, 0.5, &mut rng), Duration::ZERO);
        }
    }

    #[test]
    fn full_randomization_factor_can_reach_double() {
        let interval = Duration::from_millis(100);
        let mut rng = StdRng::seed_from_u64(99);
        let mut saw_above_base = false;
        for _ in 0..500 {
            if randomize_with_rng(interval, 1.0, &mut rng) > interval {
                saw_above_base = true;
                break;
            }
        }
        assert!(
            saw_above_base,
            "randomization_factor=1.0 should sometimes exceed the base interval"
        );
    }
}
