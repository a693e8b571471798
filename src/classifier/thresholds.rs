//! Timing thresholds used to tell single, double and long presses apart

use std::time::Duration;

/// Default maximum gap between two presses merged into a double press
pub const DEFAULT_DOUBLE_WINDOW_MS: u64 = 250;

/// Default minimum hold time for a long press
pub const DEFAULT_LONG_WINDOW_MS: u64 = 500;

/// Double and long press windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Maximum gap between two presses for them to count as a double
    pub double_window: Duration,
    /// Minimum held duration for a press to count as long
    pub long_window: Duration,
}

impl Thresholds {
    pub fn new(double_window: Duration, long_window: Duration) -> Self {
        Self {
            double_window,
            long_window,
        }
    }

    /// Build thresholds from millisecond values, where zero means "unset".
    pub fn from_millis(double_ms: u64, long_ms: u64) -> Self {
        let double_ms = if double_ms == 0 {
            DEFAULT_DOUBLE_WINDOW_MS
        } else {
            double_ms
        };
        let long_ms = if long_ms == 0 {
            DEFAULT_LONG_WINDOW_MS
        } else {
            long_ms
        };
        Self::new(
            Duration::from_millis(double_ms),
            Duration::from_millis(long_ms),
        )
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_millis(DEFAULT_DOUBLE_WINDOW_MS, DEFAULT_LONG_WINDOW_MS)
    }
}
