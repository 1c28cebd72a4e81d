//! Atomic streaming counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::StreamingSnapshot;

/// Counters for one streamer. Shareable across threads via `Arc`.
#[derive(Debug)]
pub struct StreamingMetrics {
    started_at: Instant,

    fetches_started: AtomicU64,
    tiles_loaded: AtomicU64,
    fetch_failures: AtomicU64,
    stale_completions: AtomicU64,
    bytes_decoded: AtomicU64,
    evicted_cooldown: AtomicU64,
    evicted_pressure: AtomicU64,
    teardowns: AtomicU64,

    // Gauges
    in_flight: AtomicU64,
    queued: AtomicU64,
    resident: AtomicU64,
}

impl Default for StreamingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            fetches_started: AtomicU64::new(0),
            tiles_loaded: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            stale_completions: AtomicU64::new(0),
            bytes_decoded: AtomicU64::new(0),
            evicted_cooldown: AtomicU64::new(0),
            evicted_pressure: AtomicU64::new(0),
            teardowns: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            resident: AtomicU64::new(0),
        }
    }

    pub fn fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile became resident with `bytes` of decoded texture.
    pub fn tile_loaded(&self, bytes: u64) {
        self.tiles_loaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_decoded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A completion arrived for a scene that was already torn down.
    pub fn stale_completion(&self) {
        self.stale_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evicted_after_cooldown(&self, count: u64) {
        self.evicted_cooldown.fetch_add(count, Ordering::Relaxed);
    }

    pub fn evicted_under_pressure(&self, count: u64) {
        self.evicted_pressure.fetch_add(count, Ordering::Relaxed);
    }

    pub fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the gauges.
    pub fn set_gauges(&self, in_flight: usize, queued: usize, resident: usize) {
        self.in_flight.store(in_flight as u64, Ordering::Relaxed);
        self.queued.store(queued as u64, Ordering::Relaxed);
        self.resident.store(resident as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StreamingSnapshot {
        StreamingSnapshot {
            uptime: self.started_at.elapsed(),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            tiles_loaded: self.tiles_loaded.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            stale_completions: self.stale_completions.load(Ordering::Relaxed),
            bytes_decoded: self.bytes_decoded.load(Ordering::Relaxed),
            evicted_cooldown: self.evicted_cooldown.load(Ordering::Relaxed),
            evicted_pressure: self.evicted_pressure.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            resident: self.resident.load(Ordering::Relaxed),
        }
    }
}
