//! Backoff policy: the configuration and pure projections the retry engine
//! is built around.
//!
//! A [`Policy`] is immutable once built and validated eagerly, the same way
//! a `TimeoutPolicy::new` / `RetryPolicy::builder()` pair rejects bad
//! configuration at construction time rather than at first use.

use std::time::Duration;

/// Errors raised while building a [`Policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// `initial_interval` must be strictly positive.
    #[error("initial_interval must be > 0")]
    NonPositiveInitialInterval,
    /// `multiplier` must be strictly greater than 1.
    #[error("multiplier must be > 1.0 (got {0})")]
    MultiplierTooSmall(f64),
    /// `randomization_factor` must lie in `[0, 1]`.
    #[error("randomization_factor must be in [0, 1] (got {0})")]
    RandomizationFactorOutOfRange(f64),
    /// `max_interval` must be >= `initial_interval`.
    #[error("max_interval ({max:?}) must be >= initial_interval ({initial:?})")]
    MaxIntervalBelowInitial {
        /// Configured maximum interval.
        max: Duration,
        /// Configured initial interval.
        initial: Duration,
    },
}

/// Immutable exponential backoff configuration.
///
/// Construct via [`PolicyBuilder`]; defaults are `initial_interval = 100ms`,
/// `multiplier = 2.0`, `randomization_factor = 0.5`, `max_interval = 60s`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Policy {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Policy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Deserializing straight into `Policy` would let a malformed JSON
        // document construct an unvalidated policy; routing through
        // `PolicyBuilder::build` keeps the "rejected at construction or all
        // four constraints hold" invariant even from the outside.
        let builder = PolicyBuilder::deserialize(deserializer)?;
        Policy::try_from(builder).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "serde")]
impl std::convert::TryFrom<PolicyBuilder> for Policy {
    type Error = PolicyError;

    fn try_from(builder: PolicyBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl Default for Policy {
    fn default() -> Self {
        PolicyBuilder::new().build().expect("defaults always validate")
    }
}

impl Policy {
    /// Start building a policy.
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    /// First nonzero wait.
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Per-attempt growth factor.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Jitter width in `[0, 1]`.
    pub fn randomization_factor(&self) -> f64 {
        self.randomization_factor
    }

    /// Ceiling for the unrandomized interval.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Project this policy onto a bounded (or unbounded) attempt count.
    ///
    /// `attempts = -1` means "until plateau": extend entries until the first
    /// one clamped at `max_interval`, then stop (that clamped entry is
    /// included). `attempts = 0` yields the single all-zero first entry.
    pub fn timetable(&self, attempts: i64) -> TimeTable {
        let mut entries = Vec::new();
        // Entry 1 is always the free first try: no wait before it.
        entries.push(TimeTableEntry {
            attempt: 1,
            interval: Duration::ZERO,
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
        });

        if attempts == 0 {
            return self.summarize(entries);
        }

        let mut interval = self.initial_interval;
        let mut attempt: u64 = 2;
        loop {
            let clamped = interval >= self.max_interval;
            let this_interval = interval.min(self.max_interval);
            let (min_i, max_i) = self.spread(this_interval);
            entries.push(TimeTableEntry {
                attempt,
                interval: this_interval,
                min_interval: min_i,
                max_interval: max_i,
            });

            if attempts == -1 {
                if clamped {
                    break;
                }
            } else if entries.len() as i64 >= attempts {
                break;
            }

            interval = interval.mul_f64(self.multiplier).min(self.max_interval);
            attempt += 1;
        }

        self.summarize(entries)
    }

    fn spread(&self, interval: Duration) -> (Duration, Duration) {
        let rf = self.randomization_factor;
        let min = interval.mul_f64((1.0 - rf).max(0.0));
        let max = interval.mul_f64(1.0 + rf);
        (min, max)
    }

    fn summarize(&self, entries: Vec<TimeTableEntry>) -> TimeTable {
        let min_time = entries.iter().map(|e| e.min_interval).sum();
        let max_time = entries.iter().map(|e| e.max_interval).sum();
        TimeTable { min_time, max_time, entries }
    }
}

/// Builder for [`Policy`], validating on [`PolicyBuilder::build`].
///
/// Also doubles as [`Policy`]'s deserialization target behind the `serde`
/// feature: missing fields in a partial JSON document fall back to
/// [`PolicyBuilder::new`]'s defaults via the container-level `#[serde(default)]`,
/// and [`PolicyBuilder::build`] still runs before a `Policy` comes out the
/// other end.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PolicyBuilder {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyBuilder {
    /// Start from the documented defaults (100ms initial, 2x multiplier,
    /// 0.5 randomization factor, 60s ceiling).
    pub fn new() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
        }
    }

    /// Override the initial interval.
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Override the per-attempt growth multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Override the jitter width.
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Override the maximum interval.
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Validate and produce a [`Policy`].
    pub fn build(self) -> Result<Policy, PolicyError> {
        if self.initial_interval.is_zero() {
            return Err(PolicyError::NonPositiveInitialInterval);
        }
        if !(self.multiplier > 1.0) {
            return Err(PolicyError::MultiplierTooSmall(self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(PolicyError::RandomizationFactorOutOfRange(self.randomization_factor));
        }
        if self.max_interval < self.initial_interval {
            return Err(PolicyError::MaxIntervalBelowInitial {
                max: self.max_interval,
                initial: self.initial_interval,
            });
        }
        Ok(Policy {
            initial_interval: self.initial_interval,
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_interval: self.max_interval,
        })
    }
}

/// One row of a [`TimeTable`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeTableEntry {
    /// 1-based attempt number.
    pub attempt: u64,
    /// Unrandomized interval preceding this attempt.
    pub interval: Duration,
    /// Lower bound of the randomized interval.
    pub min_interval: Duration,
    /// Upper bound of the randomized interval.
    pub max_interval: Duration,
}

/// A precomputed projection of a [`Policy`] onto a bounded attempt count.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeTable {
    /// Sum of every entry's `min_interval`.
    pub min_time: Duration,
    /// Sum of every entry's `max_interval`.
    pub max_time: Duration,
    /// Ordered attempt entries; `entries[0]` is always all-zero.
    pub entries: Vec<TimeTableEntry>,
}
