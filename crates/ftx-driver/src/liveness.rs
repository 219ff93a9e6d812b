//! Liveness Monitor - Tracks responses to detect a silent controller
//!
//! **Purpose**: Detect whether the controller is still answering exchange
//! frames (powered on, USB cable connected) independently of the link state.
//!
//! Timestamps are monotonic microseconds anchored to the first use in the
//! process, so they fit in an `AtomicU64` and ignore wall-clock changes.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static APP_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

/// Controller liveness monitor
pub struct LivenessMonitor {
    last_response: AtomicU64,
    timeout: Duration,
}

impl LivenessMonitor {
    /// Create a new monitor
    ///
    /// # Example
    /// ```
    /// # use ftx_driver::LivenessMonitor;
    /// # use std::time::Duration;
    /// let monitor = LivenessMonitor::new(Duration::from_secs(1));
    /// assert!(monitor.is_alive());
    /// ```
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_response: AtomicU64::new(monotonic_micros()),
            timeout,
        }
    }

    /// Returns true if a response arrived within the timeout window
    pub fn is_alive(&self) -> bool {
        self.time_since_last_response() < self.timeout
    }

    /// Record that a valid response was received
    pub fn register_response(&self) {
        self.last_response
            .store(monotonic_micros(), Ordering::Relaxed);
    }

    /// Time since the last valid response
    pub fn time_since_last_response(&self) -> Duration {
        let last_us = self.last_response.load(Ordering::Relaxed);
        Duration::from_micros(monotonic_micros().saturating_sub(last_us))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
