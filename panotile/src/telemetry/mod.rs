//! Streaming telemetry.
//!
//! Lock-free counters updated by the tile streamer, read by hosts through
//! point-in-time snapshots (debug overlays, logs, health checks).
//!
//! ```text
//! TileStreamer ─────► StreamingMetrics ─────► StreamingSnapshot ─────► host
//!                     (atomic counters)       (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```
//! use panotile::telemetry::StreamingMetrics;
//!
//! let metrics = StreamingMetrics::new();
//! metrics.fetch_started();
//! metrics.tile_loaded(4096);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.tiles_loaded, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::StreamingMetrics;
pub use snapshot::StreamingSnapshot;
