//! Epoch-millisecond clock helper.
//!
//! # Invariants
//! - All persisted timestamps are unix epoch milliseconds as `i64`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as unix epoch milliseconds.
///
/// A clock set before the unix epoch degrades to `0` instead of failing;
/// timestamps are advisory metadata, not ordering keys.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::now_epoch_ms;

    #[test]
    fn now_epoch_ms_is_positive() {
        assert!(now_epoch_ms() > 0);
    }
}
