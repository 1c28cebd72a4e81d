//! Pyramid planning, resampling and slicing.

use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, RgbaImage};
use rayon::prelude::*;

use super::encoder::{ImageTileEncoder, TileEncoder};
use super::error::GeneratorError;
use crate::config::GeneratorConfig;
use crate::manifest::{tile_key, Level, Manifest, TileAddress, TileFormat};

/// Level tag of the preview image, below every pyramid level.
pub const PREVIEW_LEVEL: i32 = -1;

/// Storage key of the preview image.
pub const PREVIEW_KEY: &str = "preview.jpg";

/// Storage key of the normalized full panorama.
pub const PANORAMA_KEY: &str = "panorama.jpg";

/// A decoded equirectangular source image.
#[derive(Debug, Clone)]
pub struct PanoramaSource {
    image: RgbaImage,
}

impl PanoramaSource {
    /// Decode an encoded image, rejecting sources with an edge longer than
    /// `max_dimension` before allocating pixels.
    pub fn decode(bytes: &[u8], max_dimension: u32) -> Result<Self, GeneratorError> {
        let reader = guessed_reader(bytes)?;
        let (width, height) = reader.into_dimensions()?;
        if width > max_dimension || height > max_dimension {
            return Err(GeneratorError::DimensionOverflow {
                width,
                height,
                max: max_dimension,
            });
        }

        let mut reader = guessed_reader(bytes)?;
        // Dimensions were checked above
        reader.no_limits();
        let image = reader.decode()?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image: image.into_rgba8(),
        }
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

fn guessed_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, GeneratorError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| GeneratorError::UnsupportedFormat(e.to_string()))?;
    if reader.format().is_none() {
        return Err(GeneratorError::UnsupportedFormat(
            "unrecognized image format".to_string(),
        ));
    }
    Ok(reader)
}

/// Dimensions and level layout derived from a source size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidPlan {
    /// Normalized 2:1 width (the top level).
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    /// Levels coarsest first, indexed from 0.
    pub levels: Vec<Level>,
}

/// Plan the pyramid for a `source_width`×`source_height` source.
///
/// The source is normalized to 2:1 at most `max_width` wide. Level `i` of
/// `N` is `width >> (N - 1 - i)` wide. Levels narrower than
/// `min_level_width` are dropped; the top level always remains.
pub fn plan_levels(
    source_width: u32,
    source_height: u32,
    config: &GeneratorConfig,
) -> Result<PyramidPlan, GeneratorError> {
    if source_width == 0 || source_height == 0 {
        return Err(GeneratorError::UnsupportedFormat(
            "source image is empty".to_string(),
        ));
    }

    let width = source_width.min(config.max_width);
    let height = width / 2;
    if height == 0 {
        return Err(GeneratorError::UnsupportedFormat(format!(
            "source image {}×{} is too small",
            source_width, source_height
        )));
    }

    let tile_size = if width > config.large_source_threshold {
        config.large_tile_size
    } else {
        config.tile_size
    };

    let count = config.level_count.max(1);
    let widths: Vec<u32> = (0..count)
        .filter_map(|i| {
            let shift = count - 1 - i;
            let level_width = width.checked_shr(shift).unwrap_or(0);
            let is_top = shift == 0;
            (is_top || (level_width >= config.min_level_width && level_width >= 2))
                .then_some(level_width)
        })
        .collect();

    let levels = widths
        .iter()
        .enumerate()
        .map(|(index, &level_width)| {
            let level_height = if level_width == width {
                height
            } else {
                level_width / 2
            };
            Level::new(index as u32, level_width, level_height, tile_size)
        })
        .collect();

    Ok(PyramidPlan {
        width,
        height,
        tile_size,
        levels,
    })
}

/// One encoded pyramid tile.
#[derive(Debug, Clone)]
pub struct GeneratedTile {
    pub address: TileAddress,
    /// Storage key, `l{level}_{row}_{col}.{ext}`.
    pub key: String,
    pub data: Vec<u8>,
}

/// The low-resolution first-paint image.
#[derive(Debug, Clone)]
pub struct PreviewImage {
    /// Always [`PREVIEW_LEVEL`].
    pub level: i32,
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Everything produced for one scene.
#[derive(Debug, Clone)]
pub struct TilePyramid {
    pub manifest: Manifest,
    pub preview: PreviewImage,
    pub tiles: Vec<GeneratedTile>,
    /// Normalized full panorama, when requested.
    pub panorama: Option<Vec<u8>>,
}

impl TilePyramid {
    /// Manifest in its serialized JSON shape.
    pub fn manifest_json(&self) -> serde_json::Value {
        self.manifest.to_wire().to_value()
    }

    pub fn tile(&self, address: TileAddress) -> Option<&GeneratedTile> {
        self.tiles.iter().find(|tile| tile.address == address)
    }

    /// Encoded bytes across tiles, preview and panorama.
    pub fn total_bytes(&self) -> usize {
        self.tiles.iter().map(|t| t.data.len()).sum::<usize>()
            + self.preview.data.len()
            + self.panorama.as_ref().map_or(0, Vec::len)
    }
}

/// Builds tile pyramids from panorama sources.
pub struct PyramidGenerator {
    config: GeneratorConfig,
    encoder: Arc<dyn TileEncoder>,
}

impl PyramidGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let encoder =
            ImageTileEncoder::new(config.tile_format).with_quality(config.jpeg_quality);
        Self {
            config,
            encoder: Arc::new(encoder),
        }
    }

    /// Use a custom tile encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn TileEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Format of the emitted tiles.
    pub fn tile_format(&self) -> TileFormat {
        self.encoder.format()
    }

    /// Generate tiles, preview and manifest.
    pub fn generate(&self, source: &PanoramaSource) -> Result<TilePyramid, GeneratorError> {
        self.build(source, false)
    }

    /// Like [`generate`](Self::generate), also encoding the normalized
    /// panorama as [`PANORAMA_KEY`].
    pub fn generate_with_panorama(
        &self,
        source: &PanoramaSource,
    ) -> Result<TilePyramid, GeneratorError> {
        self.build(source, true)
    }

    fn build(
        &self,
        source: &PanoramaSource,
        with_panorama: bool,
    ) -> Result<TilePyramid, GeneratorError> {
        let started = Instant::now();
        let plan = plan_levels(source.width(), source.height(), &self.config)?;

        let normalized: Cow<'_, RgbaImage> =
            if (plan.width, plan.height) == (source.width(), source.height()) {
                Cow::Borrowed(source.image())
            } else {
                tracing::debug!(
                    from_width = source.width(),
                    from_height = source.height(),
                    width = plan.width,
                    height = plan.height,
                    "Normalizing panorama"
                );
                Cow::Owned(imageops::resize(
                    source.image(),
                    plan.width,
                    plan.height,
                    FilterType::Lanczos3,
                ))
            };

        let mut tiles = Vec::new();
        for level in &plan.levels {
            let level_image: Cow<'_, RgbaImage> =
                if (level.width, level.height) == normalized.dimensions() {
                    Cow::Borrowed(normalized.as_ref())
                } else {
                    Cow::Owned(imageops::resize(
                        normalized.as_ref(),
                        level.width,
                        level.height,
                        FilterType::Lanczos3,
                    ))
                };

            let addresses: Vec<TileAddress> = level.tiles().collect();
            for batch in addresses.chunks(self.config.encode_batch_size.max(1)) {
                let encoded = batch
                    .par_iter()
                    .map(|&address| self.encode_tile(&level_image, level, address))
                    .collect::<Result<Vec<_>, _>>()?;
                tiles.extend(encoded);
            }

            tracing::debug!(
                level = level.index,
                width = level.width,
                height = level.height,
                cols = level.cols,
                rows = level.rows,
                "Encoded level"
            );
        }

        let preview = self.encode_preview(&normalized)?;
        let panorama = if with_panorama {
            Some(self.jpeg(self.config.jpeg_quality).encode(&normalized)?)
        } else {
            None
        };

        let manifest = Manifest {
            levels: plan.levels.clone(),
            tile_size: plan.tile_size,
            original_width: plan.width,
            original_height: plan.height,
            preview_locator: Some(preview.key.clone()),
            tile_format: self.encoder.format(),
            base_path: String::new(),
            explicit_tiles: None,
            overlap_px: None,
        };

        tracing::info!(
            width = plan.width,
            height = plan.height,
            levels = plan.levels.len(),
            tiles = tiles.len(),
            tile_size = plan.tile_size,
            encoder = self.encoder.name(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Generated tile pyramid"
        );

        Ok(TilePyramid {
            manifest,
            preview,
            tiles,
            panorama,
        })
    }

    fn encode_tile(
        &self,
        image: &RgbaImage,
        level: &Level,
        address: TileAddress,
    ) -> Result<GeneratedTile, GeneratorError> {
        let (x, y, width, height) = level.tile_rect(address.col, address.row).ok_or_else(|| {
            GeneratorError::EncodeFailure(format!(
                "tile {}/{}/{} lies outside its level",
                address.level, address.col, address.row
            ))
        })?;

        // Edge tiles are clipped, never padded
        let tile = imageops::crop_imm(image, x, y, width, height).to_image();
        Ok(GeneratedTile {
            address,
            key: tile_key(address, self.encoder.format()),
            data: self.encoder.encode(&tile)?,
        })
    }

    fn encode_preview(&self, normalized: &RgbaImage) -> Result<PreviewImage, GeneratorError> {
        let (width, height) = (self.config.preview_width, self.config.preview_height);
        let small = imageops::resize(normalized, width, height, FilterType::Triangle);
        Ok(PreviewImage {
            level: PREVIEW_LEVEL,
            key: PREVIEW_KEY.to_string(),
            width,
            height,
            data: self.jpeg(self.config.preview_quality).encode(&small)?,
        })
    }

    fn jpeg(&self, quality: u8) -> ImageTileEncoder {
        ImageTileEncoder::new(TileFormat::Jpeg).with_quality(quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest;
    use image::{ImageFormat, Rgba};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    fn small_config() -> GeneratorConfig {
        GeneratorConfig::default()
            .with_tile_sizes(64, 128)
            .with_preview_size(32, 16)
            .with_min_level_width(16)
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_plan_default_source() {
        let plan = plan_levels(4096, 2048, &GeneratorConfig::default()).unwrap();
        assert_eq!((plan.width, plan.height, plan.tile_size), (4096, 2048, 512));

        let grids: Vec<(u32, u32, u32, u32)> = plan
            .levels
            .iter()
            .map(|l| (l.width, l.height, l.cols, l.rows))
            .collect();
        assert_eq!(
            grids,
            vec![(1024, 512, 2, 1), (2048, 1024, 4, 2), (4096, 2048, 8, 4)]
        );
    }

    #[test]
    fn test_plan_large_source_uses_large_tiles() {
        let plan = plan_levels(10000, 5000, &GeneratorConfig::default()).unwrap();
        assert_eq!(plan.tile_size, 1024);
        assert_eq!(plan.levels[0].width, 2500);
        assert_eq!(plan.levels[2].width, 10000);
    }

    #[test]
    fn test_plan_caps_width_and_fixes_aspect() {
        let plan = plan_levels(20000, 8000, &GeneratorConfig::default()).unwrap();
        assert_eq!((plan.width, plan.height), (16384, 8192));

        let plan = plan_levels(3000, 2000, &GeneratorConfig::default()).unwrap();
        assert_eq!((plan.width, plan.height), (3000, 1500));
    }

    #[test]
    fn test_plan_drops_tiny_levels() {
        let plan = plan_levels(100, 50, &GeneratorConfig::default()).unwrap();
        assert_eq!(plan.levels.len(), 1);
        assert_eq!(plan.levels[0].index, 0);
        assert_eq!(plan.levels[0].width, 100);
    }

    #[test]
    fn test_plan_rejects_empty() {
        assert!(matches!(
            plan_levels(0, 10, &GeneratorConfig::default()),
            Err(GeneratorError::UnsupportedFormat(_))
        ));
        assert!(plan_levels(1, 1, &GeneratorConfig::default()).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            PanoramaSource::decode(b"definitely not an image", 65536),
            Err(GeneratorError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let bytes = png_bytes(&gradient(64, 32));
        assert_eq!(
            PanoramaSource::decode(&bytes, 48).unwrap_err(),
            GeneratorError::DimensionOverflow {
                width: 64,
                height: 32,
                max: 48
            }
        );

        let source = PanoramaSource::decode(&bytes, 64).unwrap();
        assert_eq!((source.width(), source.height()), (64, 32));
    }

    #[test]
    fn test_generate_emits_every_tile() {
        let generator = PyramidGenerator::new(small_config());
        let pyramid = generator
            .generate(&PanoramaSource::from_rgba(gradient(256, 128)))
            .unwrap();

        // 64×32, 128×64 and 256×128 in 64px tiles
        assert_eq!(pyramid.manifest.level_count(), 3);
        assert_eq!(pyramid.tiles.len(), 1 + 2 + 8);
        assert!(pyramid.tile(TileAddress::new(2, 3, 1)).is_some());
        assert_eq!(
            pyramid.tile(TileAddress::new(1, 1, 0)).unwrap().key,
            "l1_0_1.jpg"
        );

        assert_eq!(pyramid.preview.level, PREVIEW_LEVEL);
        assert_eq!(pyramid.preview.key, PREVIEW_KEY);
        let preview = image::load_from_memory(&pyramid.preview.data).unwrap();
        assert_eq!((preview.width(), preview.height()), (32, 16));
        assert!(pyramid.panorama.is_none());
    }

    #[test]
    fn test_edge_tiles_are_clipped() {
        let generator = PyramidGenerator::new(small_config().with_level_count(1));
        let pyramid = generator
            .generate(&PanoramaSource::from_rgba(gradient(200, 100)))
            .unwrap();

        let corner = pyramid.tile(TileAddress::new(0, 3, 1)).unwrap();
        let decoded = image::load_from_memory(&corner.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 36));
    }

    #[test]
    fn test_top_level_keeps_source_pixels() {
        let source = gradient(256, 128);
        let generator = PyramidGenerator::new(small_config().with_tile_format(TileFormat::Png));
        let pyramid = generator
            .generate(&PanoramaSource::from_rgba(source.clone()))
            .unwrap();

        let tile = pyramid.tile(TileAddress::new(2, 1, 1)).unwrap();
        let decoded = image::load_from_memory(&tile.data).unwrap().to_rgba8();
        let expected = imageops::crop_imm(&source, 64, 64, 64, 64).to_image();
        assert_eq!(decoded, expected);
        assert_eq!(tile.key, "l2_1_1.png");
    }

    #[test]
    fn test_panorama_is_normalized() {
        let generator = PyramidGenerator::new(small_config());
        let pyramid = generator
            .generate_with_panorama(&PanoramaSource::from_rgba(gradient(300, 200)))
            .unwrap();

        let panorama = image::load_from_memory(pyramid.panorama.as_ref().unwrap()).unwrap();
        assert_eq!((panorama.width(), panorama.height()), (300, 150));
        assert_eq!(pyramid.manifest.original_height, 150);
    }

    #[test]
    fn test_manifest_json_parses_back() {
        let generator = PyramidGenerator::new(small_config());
        let pyramid = generator
            .generate(&PanoramaSource::from_rgba(gradient(256, 128)))
            .unwrap();

        let parsed = parse_manifest(&pyramid.manifest_json(), &[]).unwrap();
        assert_eq!(parsed.levels, pyramid.manifest.levels);
        assert_eq!(parsed.tile_size, 64);
        assert_eq!((parsed.original_width, parsed.original_height), (256, 128));
        for tile in &pyramid.tiles {
            assert_eq!(parsed.tile_locator(tile.address), tile.key);
        }
    }

    /// Records the peak number of concurrent encodes.
    struct SlowEncoder {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TileEncoder for SlowEncoder {
        fn encode(&self, _image: &RgbaImage) -> Result<Vec<u8>, GeneratorError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![0])
        }

        fn format(&self) -> TileFormat {
            TileFormat::Jpeg
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[test]
    fn test_encode_batches_bound_parallelism() {
        let encoder = Arc::new(SlowEncoder {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let generator = PyramidGenerator::new(small_config().with_encode_batch_size(2))
            .with_encoder(encoder.clone());
        let pyramid = generator
            .generate(&PanoramaSource::from_rgba(gradient(256, 128)))
            .unwrap();

        assert_eq!(pyramid.tiles.len(), 11);
        assert!(encoder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_encode_failure_aborts() {
        struct FailingEncoder;
        impl TileEncoder for FailingEncoder {
            fn encode(&self, _image: &RgbaImage) -> Result<Vec<u8>, GeneratorError> {
                Err(GeneratorError::EncodeFailure("disk full".to_string()))
            }
            fn format(&self) -> TileFormat {
                TileFormat::Jpeg
            }
            fn name(&self) -> &str {
                "failing"
            }
        }

        let generator =
            PyramidGenerator::new(small_config()).with_encoder(Arc::new(FailingEncoder));
        let result = generator.generate(&PanoramaSource::from_rgba(gradient(256, 128)));
        assert_eq!(
            result.unwrap_err(),
            GeneratorError::EncodeFailure("disk full".to_string())
        );
    }
}
