//! Per-tile bookkeeping owned by the streamer.

use std::sync::Arc;
use std::time::Instant;

use super::error::TileFetchError;
use crate::geometry::SpherePatch;
use crate::manifest::TileAddress;

/// Lifecycle of one tile address within a scene.
///
/// ```text
/// Unrequested ──► Queued ──► Loading ──► Resident ◄──► PendingRemoval ──► (evicted)
///      ▲                        │
///      └──── fetch failure ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    /// No request, no entry.
    Unrequested,
    /// Waiting for a fetch slot.
    Queued,
    /// Fetch in flight.
    Loading,
    /// Texture available and still desired.
    Resident,
    /// Texture available but left the desired set; evicted after cooldown.
    PendingRemoval,
}

impl TileState {
    /// Whether a texture exists for the tile.
    pub fn has_texture(&self) -> bool {
        matches!(self, TileState::Resident | TileState::PendingRemoval)
    }
}

/// A resident tile.
#[derive(Debug, Clone)]
pub struct CacheEntry<H> {
    pub address: TileAddress,
    pub scene_id: String,
    pub patch: Arc<SpherePatch>,
    pub texture: H,
    /// Last reconcile in which the tile was desired (or its load time).
    pub last_used: Instant,
    /// Eviction deadline once the tile left the desired set.
    pub pending_removal_at: Option<Instant>,
}

impl<H> CacheEntry<H> {
    pub fn state(&self) -> TileState {
        if self.pending_removal_at.is_some() {
            TileState::PendingRemoval
        } else {
            TileState::Resident
        }
    }
}

/// What a renderer needs to draw one tile.
#[derive(Debug, Clone)]
pub struct RenderablePatch<H> {
    pub address: TileAddress,
    pub patch: Arc<SpherePatch>,
    pub texture: H,
}

/// Everything that changed during one reconcile (or settle).
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Fetches started.
    pub requested: Vec<TileAddress>,
    /// Tiles that became resident.
    pub loaded: Vec<TileAddress>,
    /// Fetches that failed; the tiles are unrequested again.
    pub failed: Vec<(TileAddress, TileFetchError)>,
    /// Tiles evicted after their cooldown.
    pub evicted_cooldown: Vec<TileAddress>,
    /// Tiles evicted early to respect the cache limit.
    pub evicted_pressure: Vec<TileAddress>,
}

impl ReconcileReport {
    /// Whether nothing happened.
    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
            && self.loaded.is_empty()
            && self.failed.is_empty()
            && self.evicted_cooldown.is_empty()
            && self.evicted_pressure.is_empty()
    }

    /// Append another report.
    pub fn merge(&mut self, other: ReconcileReport) {
        self.requested.extend(other.requested);
        self.loaded.extend(other.loaded);
        self.failed.extend(other.failed);
        self.evicted_cooldown.extend(other.evicted_cooldown);
        self.evicted_pressure.extend(other.evicted_pressure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_texture() {
        assert!(TileState::Resident.has_texture());
        assert!(TileState::PendingRemoval.has_texture());
        assert!(!TileState::Loading.has_texture());
        assert!(!TileState::Unrequested.has_texture());
    }

    #[test]
    fn test_report_merge() {
        let mut report = ReconcileReport::default();
        assert!(report.is_empty());

        report.merge(ReconcileReport {
            loaded: vec![TileAddress::new(0, 0, 0)],
            ..Default::default()
        });
        assert!(!report.is_empty());
        assert_eq!(report.loaded.len(), 1);
    }
}
