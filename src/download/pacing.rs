//! Randomized request pacing and Retry-After parsing.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::constants::{
    DEFAULT_DELAY_MAX, DEFAULT_DELAY_MIN, MAX_RETRY_AFTER, NAVIGATION_DELAY_MAX,
    NAVIGATION_DELAY_MIN,
};

/// Inclusive range a random pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY_MIN, DEFAULT_DELAY_MAX)
    }
}

impl DelayRange {
    /// Creates a range; bounds given in the wrong order are swapped.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Range from whole seconds.
    #[must_use]
    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// Pause between navigations inside one browsing session.
    #[must_use]
    pub fn navigation() -> Self {
        Self::new(NAVIGATION_DELAY_MIN, NAVIGATION_DELAY_MAX)
    }

    /// A range that never waits.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draws a delay uniformly from the range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample(&self) -> Duration {
        if self.max.is_zero() || self.min == self.max {
            return self.min;
        }
        let ms = rand::thread_rng()
            .gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(ms)
    }

    /// Sleeps for a sampled delay.
    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "pacing");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Parses a Retry-After header value (integer seconds or HTTP-date).
///
/// Values are capped at one hour; past dates yield zero.
///
/// ```
/// use std::time::Duration;
/// use manual_archiver_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(seconds, "Retry-After exceeds maximum, capping at 1 hour");
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    match httpdate::parse_http_date(header_value) {
        Ok(datetime) => match datetime.duration_since(std::time::SystemTime::now()) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            Err(_) => Some(Duration::ZERO),
        },
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}
