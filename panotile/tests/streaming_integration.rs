//! Integration tests for the generate → publish → parse → stream flow.
//!
//! These tests drive the public API end to end:
//! - generated tiles written to disk and streamed through `FileTileFetcher`
//! - double-encoded manifests parsed like their plain form
//! - published pyramids streamed back from object storage by URL
//! - failed tile loads retried on a later recompute
//!
//! Run with: `cargo test --test streaming_integration`

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::runtime::Handle;

use panotile::config::{GeneratorConfig, StreamingConfig};
use panotile::generator::{PanoramaSource, PyramidGenerator, TilePyramid};
use panotile::manifest::{load_scene_source, parse_manifest_str, Manifest, TileAddress};
use panotile::publish::PyramidPublisher;
use panotile::store::{MemoryObjectStore, MemorySceneStore, SceneRecord, SceneStore};
use panotile::streaming::{
    BoxFuture, CpuTextureUploader, FileTileFetcher, PanoramaView, TileFetchError, TileFetcher,
};
use panotile::viewport::Viewport;

// ============================================================================
// Helper Functions
// ============================================================================

/// 512×256 source; pyramid levels 128, 256 and 512 wide in 64px tiles.
fn source_image() -> RgbaImage {
    RgbaImage::from_fn(512, 256, |x, y| {
        Rgba([(x / 2) as u8, y as u8, ((x + y) / 3) as u8, 255])
    })
}

fn generator() -> PyramidGenerator {
    PyramidGenerator::new(
        GeneratorConfig::default()
            .with_tile_sizes(64, 128)
            .with_preview_size(32, 16)
            .with_min_level_width(16),
    )
}

fn generate() -> TilePyramid {
    generator()
        .generate(&PanoramaSource::from_rgba(source_image()))
        .unwrap()
}

fn write_pyramid(pyramid: &TilePyramid, dir: &Path) {
    for tile in &pyramid.tiles {
        std::fs::write(dir.join(&tile.key), &tile.data).unwrap();
    }
    std::fs::write(dir.join(&pyramid.preview.key), &pyramid.preview.data).unwrap();
}

fn view(manifest: Manifest, fetcher: Arc<dyn TileFetcher>) -> PanoramaView<CpuTextureUploader> {
    PanoramaView::new(
        "scene-1",
        manifest,
        fetcher,
        CpuTextureUploader::new(),
        StreamingConfig::default(),
        Handle::current(),
    )
}

/// Serves objects from a memory store by their published URL.
struct StoreFetcher {
    store: Arc<MemoryObjectStore>,
    base_url: &'static str,
}

impl TileFetcher for StoreFetcher {
    fn fetch(&self, locator: &str) -> BoxFuture<'_, Result<Bytes, TileFetchError>> {
        let key = locator
            .strip_prefix(self.base_url)
            .unwrap_or(locator)
            .trim_start_matches('/')
            .to_string();
        let result = self
            .store
            .get(&key)
            .map(|object| object.data)
            .ok_or(TileFetchError::NotFound(key));
        Box::pin(async move { result })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_generated_pyramid_streams_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let pyramid = generate();
    write_pyramid(&pyramid, dir.path());

    let json = serde_json::to_string(&pyramid.manifest_json()).unwrap();
    let manifest = parse_manifest_str(&json, &[]).unwrap();
    assert_eq!(manifest.level_count(), 3);

    let fetcher = Arc::new(FileTileFetcher::new(dir.path()));
    let mut view = view(manifest, fetcher);
    let start = Instant::now();

    // Wide view: the coarsest level only
    view.set_viewport(Viewport::new(0.0, 0.0, 120.0));
    let report = view.settle(start).await;
    assert!(report.failed.is_empty());
    assert_eq!(report.loaded.len(), 2);

    // Zoom in on the view centre
    view.set_viewport(Viewport::new(0.0, 0.0, 30.0));
    let later = start + Duration::from_millis(200);
    view.tick(later).unwrap();
    view.streamer_mut().settle(later).await;

    let centre = view.get_resident(&TileAddress::new(2, 3, 1)).unwrap();
    assert_eq!(centre.texture.dimensions(), (64, 64));
    assert!(centre.patch.triangle_count() > 0);
    assert!(view.get_resident(&TileAddress::new(2, 0, 1)).is_none());

    // Base level stays as the backdrop
    assert!(view.get_resident(&TileAddress::new(0, 0, 0)).is_some());
    assert!(view.streamer().cache_len() <= StreamingConfig::default().cache_limit);
}

#[tokio::test]
async fn test_double_encoded_manifest_streams_identically() {
    let pyramid = generate();
    let plain = serde_json::to_string(&pyramid.manifest_json()).unwrap();
    let double = serde_json::to_string(&plain).unwrap();

    let from_plain = parse_manifest_str(&plain, &[]).unwrap();
    let from_double = parse_manifest_str(&double, &[]).unwrap();
    assert_eq!(from_plain, from_double);
    assert_eq!(
        from_double.tile_locator(TileAddress::new(2, 7, 3)),
        "l2_3_7.jpg"
    );
}

#[tokio::test]
async fn test_published_pyramid_streams_from_object_store() {
    let objects = Arc::new(MemoryObjectStore::new("mem://cdn"));
    let scenes = Arc::new(MemorySceneStore::new());
    scenes.insert(SceneRecord::new("scene-1"));

    let mut png = std::io::Cursor::new(Vec::new());
    source_image().write_to(&mut png, ImageFormat::Png).unwrap();
    let publisher = PyramidPublisher::new(objects.clone(), scenes.clone());
    let published = publisher
        .process_and_publish(&generator(), "scene-1", png.get_ref())
        .await
        .unwrap();
    assert_eq!(published.main_url, "mem://cdn/scene-1/panorama.jpg");

    let scene = scenes.get_scene("scene-1").await.unwrap();
    let source = load_scene_source(
        scene.tiles_manifest.as_ref().unwrap(),
        &[],
        scene.main_url.as_deref(),
    );
    assert_eq!(source.preview(), Some("mem://cdn/scene-1/preview.jpg"));
    let manifest = source.manifest().cloned().unwrap();

    let fetcher = Arc::new(StoreFetcher {
        store: objects,
        base_url: "mem://cdn",
    });
    let mut view = view(manifest, fetcher);
    view.set_viewport(Viewport::new(90.0, 10.0, 60.0));
    let report = view.settle(Instant::now()).await;

    assert!(report.failed.is_empty());
    assert!(!report.loaded.is_empty());
    assert_eq!(view.renderables().len(), report.loaded.len());
}

#[tokio::test]
async fn test_unusable_manifest_degrades_to_preview() {
    let blob = serde_json::json!({"type": "multires", "levels": "nope"});
    let source = load_scene_source(&blob, &[], Some("scenes/1/preview.jpg"));

    assert!(!source.is_pyramid());
    assert!(source.manifest().is_none());
    assert_eq!(source.preview(), Some("scenes/1/preview.jpg"));
}

#[tokio::test]
async fn test_missing_tile_retried_after_it_appears() {
    let dir = tempfile::tempdir().unwrap();
    let pyramid = generate();
    write_pyramid(&pyramid, dir.path());
    let missing = pyramid.tile(TileAddress::new(0, 1, 0)).unwrap();
    std::fs::remove_file(dir.path().join(&missing.key)).unwrap();

    let manifest = parse_manifest_str(&pyramid.manifest_json().to_string(), &[]).unwrap();
    let mut view = view(manifest, Arc::new(FileTileFetcher::new(dir.path())));
    view.set_viewport(Viewport::new(0.0, 0.0, 120.0));
    let start = Instant::now();

    let report = view.settle(start).await;
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.is_not_found());
    assert!(view.get_resident(&TileAddress::new(0, 0, 0)).is_some());
    assert!(view.get_resident(&TileAddress::new(0, 1, 0)).is_none());

    std::fs::write(dir.path().join(&missing.key), &missing.data).unwrap();
    let later = start + Duration::from_millis(200);
    let report = view.tick(later).unwrap();
    assert_eq!(report.requested, vec![TileAddress::new(0, 1, 0)]);
    view.streamer_mut().settle(later).await;
    assert!(view.get_resident(&TileAddress::new(0, 1, 0)).is_some());
}
