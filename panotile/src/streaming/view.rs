//! Per-frame facade combining the resolver and the streamer.

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;

use super::fetcher::TileFetcher;
use super::state::{ReconcileReport, RenderablePatch};
use super::streamer::TileStreamer;
use super::texture::TextureUploader;
use crate::config::StreamingConfig;
use crate::manifest::{Manifest, TileAddress};
use crate::viewport::{Viewport, ViewportResolver};

/// A streamed panorama as seen by a host render loop.
///
/// Call [`set_viewport`](Self::set_viewport) when the camera moves and
/// [`tick`](Self::tick) once per frame, then draw
/// [`renderables`](Self::renderables).
pub struct PanoramaView<U: TextureUploader> {
    resolver: ViewportResolver,
    streamer: TileStreamer<U>,
    viewport: Viewport,
}

impl<U: TextureUploader> PanoramaView<U> {
    pub fn new(
        scene_id: impl Into<String>,
        manifest: Manifest,
        fetcher: Arc<dyn TileFetcher>,
        uploader: U,
        config: StreamingConfig,
        runtime: Handle,
    ) -> Self {
        let manifest = Arc::new(manifest);
        let resolver = ViewportResolver::new(Arc::clone(&manifest), &config);
        let streamer = TileStreamer::new(scene_id, manifest, fetcher, uploader, config, runtime);
        Self {
            resolver,
            streamer,
            viewport: Viewport::default(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Record the camera. Unusable viewports (non-finite, zero fov) are
    /// ignored so the last good one stays in effect.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport.is_usable() {
            self.viewport = viewport.normalized();
        }
    }

    /// Advance one frame.
    ///
    /// Returns the reconcile report when the desired set was recomputed,
    /// `None` while throttled.
    pub fn tick(&mut self, now: Instant) -> Option<ReconcileReport> {
        let resolution = self.resolver.resolve(&self.viewport, now)?;
        let desired = resolution.tiles.clone();
        self.streamer.set_focus(self.viewport);
        Some(self.streamer.reconcile(&desired, now))
    }

    /// Recompute now and wait for every resulting fetch. Used for the first
    /// frame of a scene.
    pub async fn settle(&mut self, now: Instant) -> ReconcileReport {
        self.resolver.force_next();
        let mut report = self.tick(now).unwrap_or_default();
        report.merge(self.streamer.settle(now).await);
        report
    }

    /// Switch to another scene, releasing every tile of the current one.
    pub fn switch_scene(&mut self, scene_id: impl Into<String>, manifest: Manifest) {
        let manifest = Arc::new(manifest);
        self.resolver.set_manifest(Arc::clone(&manifest));
        self.streamer.switch_scene(scene_id, manifest);
    }

    pub fn renderables(&self) -> Vec<RenderablePatch<U::Handle>> {
        self.streamer.renderables()
    }

    pub fn get_resident(&self, address: &TileAddress) -> Option<RenderablePatch<U::Handle>> {
        self.streamer.get_resident(address)
    }

    pub fn resolver(&self) -> &ViewportResolver {
        &self.resolver
    }

    pub fn streamer(&self) -> &TileStreamer<U> {
        &self.streamer
    }

    pub fn streamer_mut(&mut self) -> &mut TileStreamer<U> {
        &mut self.streamer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures::three_level_manifest;
    use crate::streaming::streamer::tests::CountingFetcher;
    use crate::streaming::CpuTextureUploader;
    use std::time::Duration;

    fn view(fetcher: Arc<CountingFetcher>) -> PanoramaView<CpuTextureUploader> {
        PanoramaView::new(
            "scene-a",
            three_level_manifest(),
            fetcher,
            CpuTextureUploader::new(),
            StreamingConfig::default(),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_tick_is_throttled() {
        let mut view = view(Arc::new(CountingFetcher::default()));
        let start = Instant::now();

        assert!(view.tick(start).is_some());
        assert!(view.tick(start + Duration::from_millis(100)).is_none());
        assert!(view.tick(start + Duration::from_millis(150)).is_some());
    }

    #[tokio::test]
    async fn test_settle_loads_visible_tiles() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut view = view(fetcher.clone());
        view.set_viewport(Viewport::new(0.0, 0.0, 120.0));

        let report = view.settle(Instant::now()).await;
        // Wide field of view: the whole coarsest level
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(view.renderables().len(), 2);
        assert!(view.get_resident(&TileAddress::new(0, 1, 0)).is_some());
    }

    #[tokio::test]
    async fn test_zoom_keeps_base_level() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut view = view(fetcher);
        view.set_viewport(Viewport::new(0.0, 0.0, 30.0));

        view.settle(Instant::now()).await;
        let levels: std::collections::BTreeSet<u32> =
            view.renderables().iter().map(|r| r.address.level).collect();
        assert!(levels.contains(&0));
        assert!(levels.contains(&2));
    }

    #[tokio::test]
    async fn test_unusable_viewport_ignored() {
        let mut view = view(Arc::new(CountingFetcher::default()));
        view.set_viewport(Viewport::new(10.0, 5.0, 60.0));
        view.set_viewport(Viewport::new(f64::NAN, 0.0, 60.0));
        view.set_viewport(Viewport::new(0.0, 0.0, 0.0));
        assert_eq!(view.viewport(), Viewport::new(10.0, 5.0, 60.0));
    }

    #[tokio::test]
    async fn test_switch_scene_clears_tiles() {
        let mut view = view(Arc::new(CountingFetcher::default()));
        view.settle(Instant::now()).await;
        assert!(!view.renderables().is_empty());

        view.switch_scene("scene-b", three_level_manifest());
        assert!(view.renderables().is_empty());
        assert_eq!(view.streamer().scene_id(), "scene-b");
        assert!(view.resolver().current().is_none());
    }
}
