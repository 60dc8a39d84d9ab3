/// Local polling cadence (ms) of the drift controller.
pub const DRIFT_POLL_INTERVAL_MS: u64 = 1_000;

/// Below this difference (seconds) the player counts as in sync.
pub const IN_SYNC_THRESHOLD_SECS: f64 = 2.0;

/// Above this difference (seconds) a hard seek is considered.
pub const HARD_SEEK_THRESHOLD_SECS: f64 = 5.0;

/// How long (ms) drift must stay above the hard threshold before a seek fires.
pub const DRIFT_SUSTAIN_MS: u64 = 2_000;

/// Minimum gap (ms) between two corrections.
pub const CORRECTION_COOLDOWN_MS: u64 = 10_000;

/// Consecutive corrections allowed before correction is suspended.
pub const MAX_CONSECUTIVE_CORRECTIONS: u32 = 3;

/// How long (ms) correction stays suspended after hitting the cap.
pub const SUSPENSION_MS: u64 = 30_000;

/// Sustained in-sync time (ms) that clears the consecutive-correction counter.
pub const IN_SYNC_RESET_MS: u64 = 10_000;

/// A seek counts as in flight until the player confirms it or this many ms pass.
pub const SEEK_SETTLE_MS: u64 = 1_500;

/// Maximum reconnect attempts before the client gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay (ms) for the exponential backoff on reconnect.
pub const BACKOFF_BASE_MS: u64 = 1_000;

/// Timeout (ms) allowed for the WS write task to shut down gracefully.
pub const WRITE_TASK_SHUTDOWN_MS: u64 = 500;
