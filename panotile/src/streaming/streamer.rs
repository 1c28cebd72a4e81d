//! The tile cache and loader for one scene.
//!
//! [`TileStreamer`] is driven from the render loop. Each
//! [`reconcile`](TileStreamer::reconcile) call:
//!
//! 1. applies fetch completions delivered since the last call,
//! 2. refreshes desired entries and starts the cooldown of the others,
//! 3. evicts entries whose cooldown elapsed,
//! 4. queues missing tiles and starts fetches up to the concurrency limit,
//! 5. evicts least-recently-used entries beyond the cache limit.
//!
//! Fetches run as tokio tasks and report back over a channel, so all cache
//! state has a single writer. Cancellation is soft: a tile that leaves the
//! view while loading still completes and then ages out like any other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::error::TileFetchError;
use super::fetcher::TileFetcher;
use super::queue::{LoadPriority, LoadQueue, LoadRequest};
use super::state::{CacheEntry, ReconcileReport, RenderablePatch, TileState};
use super::texture::{decode_tile, TextureUploader};
use crate::config::StreamingConfig;
use crate::geometry::{angular_distance, tile_patch_with_fraction, SpherePatch};
use crate::manifest::{Manifest, TileAddress};
use crate::telemetry::StreamingMetrics;
use crate::viewport::Viewport;

/// How long `settle` waits for a completion before re-checking its tasks.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of one fetch task.
struct Completion {
    epoch: u64,
    scene_id: String,
    address: TileAddress,
    result: Result<RgbaImage, TileFetchError>,
}

/// Owns every cache entry and in-flight load of one scene.
pub struct TileStreamer<U: TextureUploader> {
    scene_id: String,
    manifest: Arc<Manifest>,
    fetcher: Arc<dyn TileFetcher>,
    uploader: U,
    config: StreamingConfig,
    runtime: Handle,
    metrics: Arc<StreamingMetrics>,

    entries: HashMap<TileAddress, CacheEntry<U::Handle>>,
    queue: LoadQueue,
    in_flight: HashMap<TileAddress, AbortHandle>,
    desired: HashSet<TileAddress>,
    focus: Option<Viewport>,

    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Bumped on teardown; completions from older epochs are discarded.
    epoch: u64,
}

impl<U: TextureUploader> TileStreamer<U> {
    /// Create a streamer for a scene.
    ///
    /// Fetch tasks are spawned on `runtime`.
    pub fn new(
        scene_id: impl Into<String>,
        manifest: Arc<Manifest>,
        fetcher: Arc<dyn TileFetcher>,
        uploader: U,
        config: StreamingConfig,
        runtime: Handle,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        Self {
            scene_id: scene_id.into(),
            manifest,
            fetcher,
            uploader,
            config,
            runtime,
            metrics: Arc::new(StreamingMetrics::new()),
            entries: HashMap::new(),
            queue: LoadQueue::new(),
            in_flight: HashMap::new(),
            desired: HashSet::new(),
            focus: None,
            completions_tx,
            completions,
            epoch: 0,
        }
    }

    /// Report into shared metrics instead of a private instance.
    pub fn with_metrics(mut self, metrics: Arc<StreamingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<StreamingMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Valid part of the desired set from the last reconcile.
    pub fn desired(&self) -> &HashSet<TileAddress> {
        &self.desired
    }

    /// Fetches currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Tiles waiting for a fetch slot.
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Resident plus pending-removal entries.
    pub fn cache_len(&self) -> usize {
        self.entries.len()
    }

    /// Entries still in the desired set.
    pub fn resident_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.pending_removal_at.is_none())
            .count()
    }

    /// Entries waiting out their cooldown.
    pub fn pending_removal_count(&self) -> usize {
        self.entries.len() - self.resident_count()
    }

    /// Lifecycle state of a tile.
    pub fn state(&self, address: &TileAddress) -> TileState {
        if let Some(entry) = self.entries.get(address) {
            entry.state()
        } else if self.in_flight.contains_key(address) {
            TileState::Loading
        } else if self.queue.contains(address) {
            TileState::Queued
        } else {
            TileState::Unrequested
        }
    }

    /// Renderable patch for a tile, if it is loaded. Never waits.
    pub fn get_resident(&self, address: &TileAddress) -> Option<RenderablePatch<U::Handle>> {
        self.entries.get(address).map(|entry| RenderablePatch {
            address: entry.address,
            patch: Arc::clone(&entry.patch),
            texture: entry.texture.clone(),
        })
    }

    /// Every loaded tile, coarsest level first so finer tiles draw on top.
    pub fn renderables(&self) -> Vec<RenderablePatch<U::Handle>> {
        let mut addresses: Vec<&TileAddress> = self.entries.keys().collect();
        addresses.sort_unstable();
        addresses
            .into_iter()
            .filter_map(|address| self.get_resident(address))
            .collect()
    }

    /// Set the view direction used to order queued loads.
    pub fn set_focus(&mut self, viewport: Viewport) {
        self.focus = Some(viewport);

        let queued: Vec<TileAddress> = self.queue.addresses().collect();
        for address in queued {
            let priority = self.priority_for(address);
            self.queue
                .push(LoadRequest::new(address, self.scene_id.clone(), priority));
        }
    }

    /// Bring the cache in line with `desired` as of `now`.
    ///
    /// Addresses that do not exist in the manifest are ignored. Calling
    /// twice with the same arguments changes nothing the second time.
    pub fn reconcile(&mut self, desired: &HashSet<TileAddress>, now: Instant) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.reap_finished();
        self.drain_completions(now, &mut report);

        let desired: HashSet<TileAddress> = desired
            .iter()
            .filter(|address| self.manifest.contains(address))
            .copied()
            .collect();

        let cooldown = self.config.unload_cooldown;
        for entry in self.entries.values_mut() {
            if desired.contains(&entry.address) {
                entry.last_used = now;
                entry.pending_removal_at = None;
            } else if entry.pending_removal_at.is_none() {
                entry.pending_removal_at = Some(now + cooldown);
            }
        }

        self.evict_expired(now, &mut report);

        self.queue.retain(|address| desired.contains(address));
        let mut missing: Vec<TileAddress> = desired
            .iter()
            .filter(|address| {
                !self.entries.contains_key(address)
                    && !self.in_flight.contains_key(address)
                    && !self.queue.contains(address)
            })
            .copied()
            .collect();
        missing.sort_unstable();
        for address in missing {
            let priority = self.priority_for(address);
            self.queue
                .push(LoadRequest::new(address, self.scene_id.clone(), priority));
        }

        self.dispatch(&mut report);
        self.enforce_limit(&desired, &mut report);
        self.desired = desired;
        self.update_gauges();

        if !report.is_empty() {
            tracing::debug!(
                scene_id = %self.scene_id,
                requested = report.requested.len(),
                loaded = report.loaded.len(),
                failed = report.failed.len(),
                evicted_cooldown = report.evicted_cooldown.len(),
                evicted_pressure = report.evicted_pressure.len(),
                in_flight = self.in_flight.len(),
                queued = self.queue.len(),
                cached = self.entries.len(),
                "Reconciled tiles"
            );
        }

        report
    }

    /// Wait until every queued and in-flight fetch has finished.
    ///
    /// Completions are applied as of `now`. Used at startup (to show a
    /// complete first frame) and by tests.
    pub async fn settle(&mut self, now: Instant) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        loop {
            self.reap_finished();
            self.drain_completions(now, &mut report);
            self.dispatch(&mut report);
            if self.in_flight.is_empty() {
                break;
            }
            if let Ok(Some(completion)) =
                tokio::time::timeout(SETTLE_POLL_INTERVAL, self.completions.recv()).await
            {
                self.complete(completion, now, &mut report);
            }
        }

        let desired = std::mem::take(&mut self.desired);
        self.enforce_limit(&desired, &mut report);
        self.desired = desired;
        self.update_gauges();
        report
    }

    /// Release every entry and cancel every load of the current scene.
    pub fn teardown(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
        let queued = self.queue.len();
        self.queue.clear();

        let released = self.entries.len();
        for (address, entry) in self.entries.drain() {
            self.uploader.release(address, entry.texture);
        }

        self.desired.clear();
        self.epoch += 1;
        self.metrics.teardown();
        self.update_gauges();

        tracing::info!(
            scene_id = %self.scene_id,
            released,
            queued,
            "Tore down scene tiles"
        );
    }

    /// Tear down the current scene and start streaming another.
    pub fn switch_scene(&mut self, scene_id: impl Into<String>, manifest: Arc<Manifest>) {
        self.teardown();
        self.scene_id = scene_id.into();
        self.manifest = manifest;
        self.focus = None;
        tracing::info!(
            scene_id = %self.scene_id,
            levels = self.manifest.level_count(),
            "Switched scene"
        );
    }

    fn reap_finished(&mut self) {
        // A finished task has already sent its completion; anything still
        // tracked here without one (e.g. a panicking fetcher) frees its slot.
        self.in_flight.retain(|_, handle| !handle.is_finished());
    }

    fn drain_completions(&mut self, now: Instant, report: &mut ReconcileReport) {
        while let Ok(completion) = self.completions.try_recv() {
            self.complete(completion, now, report);
        }
    }

    fn complete(&mut self, completion: Completion, now: Instant, report: &mut ReconcileReport) {
        if completion.epoch != self.epoch {
            self.metrics.stale_completion();
            tracing::debug!(
                scene_id = %completion.scene_id,
                current_scene = %self.scene_id,
                "Discarding completion from torn-down scene"
            );
            return;
        }

        let address = completion.address;
        self.in_flight.remove(&address);

        match completion.result {
            Ok(image) => {
                if self.entries.contains_key(&address) {
                    return;
                }
                let Some(patch) = self.build_patch(address) else {
                    return;
                };
                let bytes = image.as_raw().len() as u64;
                let texture = self.uploader.upload(address, image);
                let pending_removal_at = (!self.desired.contains(&address))
                    .then(|| now + self.config.unload_cooldown);

                self.entries.insert(
                    address,
                    CacheEntry {
                        address,
                        scene_id: self.scene_id.clone(),
                        patch: Arc::new(patch),
                        texture,
                        last_used: now,
                        pending_removal_at,
                    },
                );
                self.metrics.tile_loaded(bytes);
                report.loaded.push(address);
            }
            Err(error) => {
                tracing::warn!(
                    scene_id = %self.scene_id,
                    level = address.level,
                    col = address.col,
                    row = address.row,
                    error = %error,
                    "Tile fetch failed"
                );
                self.metrics.fetch_failed();
                report.failed.push((address, error));
            }
        }
    }

    fn dispatch(&mut self, report: &mut ReconcileReport) {
        while self.in_flight.len() < self.config.max_concurrent_loads {
            let Some(request) = self.queue.pop() else {
                break;
            };
            self.spawn_fetch(request.address);
            report.requested.push(request.address);
        }
    }

    fn spawn_fetch(&mut self, address: TileAddress) {
        let locator = self.manifest.tile_locator(address);
        let fetcher = Arc::clone(&self.fetcher);
        let sender = self.completions_tx.clone();
        let epoch = self.epoch;
        let scene_id = self.scene_id.clone();

        tracing::trace!(
            scene_id = %self.scene_id,
            level = address.level,
            col = address.col,
            row = address.row,
            locator = %locator,
            "Fetching tile"
        );

        let task = self.runtime.spawn(async move {
            let result = match fetcher.fetch(&locator).await {
                Ok(bytes) => tokio::task::spawn_blocking(move || decode_tile(&bytes))
                    .await
                    .unwrap_or_else(|e| {
                        Err(TileFetchError::Decode(format!("decode task failed: {}", e)))
                    }),
                Err(e) => Err(e),
            };
            // The receiver is gone only when the streamer was dropped
            let _ = sender.send(Completion {
                epoch,
                scene_id,
                address,
                result,
            });
        });

        self.in_flight.insert(address, task.abort_handle());
        self.metrics.fetch_started();
    }

    fn evict_expired(&mut self, now: Instant, report: &mut ReconcileReport) {
        let expired: Vec<TileAddress> = self
            .entries
            .values()
            .filter(|entry| entry.pending_removal_at.is_some_and(|at| now >= at))
            .map(|entry| entry.address)
            .collect();

        for address in &expired {
            self.evict(*address);
        }
        if !expired.is_empty() {
            self.metrics.evicted_after_cooldown(expired.len() as u64);
            tracing::debug!(
                scene_id = %self.scene_id,
                count = expired.len(),
                "Evicted tiles after cooldown"
            );
        }
        report.evicted_cooldown.extend(expired);
    }

    fn enforce_limit(&mut self, desired: &HashSet<TileAddress>, report: &mut ReconcileReport) {
        let limit = self.config.cache_limit;
        if self.entries.len() <= limit {
            return;
        }

        // Undesired entries go first, then the least recently used
        let mut candidates: Vec<(bool, Instant, TileAddress)> = self
            .entries
            .values()
            .map(|entry| (desired.contains(&entry.address), entry.last_used, entry.address))
            .collect();
        candidates.sort_unstable();

        let excess = self.entries.len() - limit;
        let victims: Vec<TileAddress> = candidates
            .into_iter()
            .take(excess)
            .map(|(_, _, address)| address)
            .collect();
        for address in &victims {
            self.evict(*address);
        }

        self.metrics.evicted_under_pressure(victims.len() as u64);
        tracing::debug!(
            scene_id = %self.scene_id,
            count = victims.len(),
            limit,
            "Evicted tiles over cache limit"
        );
        report.evicted_pressure.extend(victims);
    }

    fn evict(&mut self, address: TileAddress) {
        if let Some(entry) = self.entries.remove(&address) {
            self.uploader.release(address, entry.texture);
        }
    }

    fn build_patch(&self, address: TileAddress) -> Option<SpherePatch> {
        let level = self.manifest.level(address.level)?;
        let fraction = self
            .manifest
            .overlap_fraction(self.config.default_overlap_fraction);
        tile_patch_with_fraction(
            level,
            address.col,
            address.row,
            fraction,
            self.config.sphere_radius,
        )
    }

    fn priority_for(&self, address: TileAddress) -> LoadPriority {
        let distance = match (self.focus, self.manifest.level(address.level)) {
            (Some(focus), Some(level)) => {
                let (cols, rows) = level.effective_grid();
                let yaw = (address.col as f64 + 0.5) / cols as f64 * 360.0 - 180.0;
                let pitch = 90.0 - (address.row as f64 + 0.5) / rows as f64 * 180.0;
                angular_distance(focus.yaw, focus.pitch, yaw, pitch)
            }
            _ => 0.0,
        };
        LoadPriority::new(address.level, distance)
    }

    fn update_gauges(&self) {
        self.metrics
            .set_gauges(self.in_flight.len(), self.queue.len(), self.entries.len());
    }
}

impl<U: TextureUploader> Drop for TileStreamer<U> {
    fn drop(&mut self) {
        for handle in self.in_flight.values() {
            handle.abort();
        }
    }
}
