//! Wall-clock helpers.
//!
//! Limiter windows and breaker timestamps are plain milliseconds since the
//! Unix epoch so every state transition can be driven with an explicit `now`
//! in tests.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Round a millisecond timestamp up to whole seconds.
pub fn millis_to_secs_ceil(ms: u64) -> u64 {
    ms.div_ceil(1000)
}
