//! Constants for fetching, pacing and the circuit breaker.

use std::time::Duration;

/// HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// HTTP read timeout (5 minutes; scanned manuals can run to hundreds of MB).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Maximum Retry-After honoured (1 hour).
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Default pause between items, lower bound.
pub const DEFAULT_DELAY_MIN: Duration = Duration::from_secs(2);

/// Default pause between items, upper bound.
pub const DEFAULT_DELAY_MAX: Duration = Duration::from_secs(5);

/// Default pause between page navigations inside a session.
pub const NAVIGATION_DELAY_MIN: Duration = Duration::from_secs(1);
pub const NAVIGATION_DELAY_MAX: Duration = Duration::from_secs(2);

/// Consecutive failures that open the circuit for the rest of a run.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

/// Bytes of the body kept for content sniffing.
pub const SNIFF_BYTES: usize = 1024;
