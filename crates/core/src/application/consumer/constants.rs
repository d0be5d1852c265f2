// Consumer constants (no magic values)
use std::time::Duration;

/// Default bound on each blocking get issued by a consumer (1s)
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a store error before the next get (1s)
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);
