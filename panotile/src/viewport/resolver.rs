//! Throttled viewport resolver.
//!
//! Callers feed the live viewport every frame; the desired tile set is only
//! recomputed once per recompute interval (150 ms by default). Between
//! recomputations the previous result stays current.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::level::select_level;
use super::visibility::visible_tiles_with_margin;
use super::Viewport;
use crate::config::StreamingConfig;
use crate::manifest::{Manifest, TileAddress};

/// Outcome of one visibility computation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Index of the selected level.
    pub level: u32,
    /// Viewport the result was computed for.
    pub viewport: Viewport,
    /// Tiles the streamer should have resident.
    pub tiles: HashSet<TileAddress>,
}

/// Computes desired tile sets for one scene's manifest.
pub struct ViewportResolver {
    manifest: Arc<Manifest>,
    interval: Duration,
    margin: f64,
    keep_base_level: bool,
    last_run: Option<Instant>,
    current: Option<Resolution>,
}

impl ViewportResolver {
    /// Create a resolver using the streaming configuration.
    pub fn new(manifest: Arc<Manifest>, config: &StreamingConfig) -> Self {
        Self {
            manifest,
            interval: config.recompute_interval,
            margin: config.prefetch_margin,
            keep_base_level: config.keep_base_level,
            last_run: None,
            current: None,
        }
    }

    /// The manifest tiles are resolved against.
    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    /// Recompute the desired set if the interval has elapsed.
    ///
    /// Returns the new result when a recomputation happened, `None` when the
    /// call was throttled (see [`current`](Self::current)).
    pub fn resolve(&mut self, viewport: &Viewport, now: Instant) -> Option<&Resolution> {
        if let Some(last) = self.last_run {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }

        self.last_run = Some(now);
        self.current = Some(self.compute(viewport));
        self.current.as_ref()
    }

    /// Most recent result, if any.
    pub fn current(&self) -> Option<&Resolution> {
        self.current.as_ref()
    }

    /// Make the next [`resolve`](Self::resolve) recompute regardless of the
    /// interval.
    pub fn force_next(&mut self) {
        self.last_run = None;
    }

    /// Replace the manifest, e.g. after a re-parse. The next resolve
    /// recomputes.
    pub fn set_manifest(&mut self, manifest: Arc<Manifest>) {
        self.manifest = manifest;
        self.current = None;
        self.last_run = None;
    }

    fn compute(&self, viewport: &Viewport) -> Resolution {
        let position = select_level(viewport.fov, self.manifest.level_count());
        let Some(level) = self.manifest.level_at(position) else {
            return Resolution {
                level: 0,
                viewport: *viewport,
                tiles: HashSet::new(),
            };
        };

        let mut tiles = visible_tiles_with_margin(viewport, level, self.margin);
        if self.keep_base_level && position > 0 {
            if let Some(base) = self.manifest.level_at(0) {
                tiles.extend(base.tiles());
            }
        }

        tracing::trace!(
            level = level.index,
            tiles = tiles.len(),
            yaw = viewport.yaw,
            pitch = viewport.pitch,
            fov = viewport.fov,
            "Resolved viewport"
        );

        Resolution {
            level: level.index,
            viewport: *viewport,
            tiles,
        }
    }
}

impl std::fmt::Debug for ViewportResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportResolver")
            .field("levels", &self.manifest.level_count())
            .field("interval", &self.interval)
            .field("margin", &self.margin)
            .field("keep_base_level", &self.keep_base_level)
            .field("last_run", &self.last_run)
            .finish()
    }
}
