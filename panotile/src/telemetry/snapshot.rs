//! Point-in-time streaming statistics.

use std::fmt;
use std::time::Duration;

/// Copy of [`super::StreamingMetrics`] at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamingSnapshot {
    pub uptime: Duration,
    pub fetches_started: u64,
    pub tiles_loaded: u64,
    pub fetch_failures: u64,
    pub stale_completions: u64,
    pub bytes_decoded: u64,
    pub evicted_cooldown: u64,
    pub evicted_pressure: u64,
    pub teardowns: u64,
    pub in_flight: u64,
    pub queued: u64,
    pub resident: u64,
}

impl StreamingSnapshot {
    /// Failed fraction of finished fetches (0.0 when none finished).
    pub fn failure_rate(&self) -> f64 {
        let finished = self.tiles_loaded + self.fetch_failures;
        if finished == 0 {
            0.0
        } else {
            self.fetch_failures as f64 / finished as f64
        }
    }

    /// Tiles loaded per second of uptime.
    pub fn tiles_per_second(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.tiles_loaded as f64 / secs
        } else {
            0.0
        }
    }

    /// Total evictions of both kinds.
    pub fn evictions(&self) -> u64 {
        self.evicted_cooldown + self.evicted_pressure
    }
}

impl fmt::Display for StreamingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resident {} | in flight {} | queued {} | loaded {} | failed {} | evicted {}",
            self.resident,
            self.in_flight,
            self.queued,
            self.tiles_loaded,
            self.fetch_failures,
            self.evictions()
        )
    }
}
