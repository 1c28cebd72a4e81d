//! Configuration for streaming, pyramid generation and logging.
//!
//! Every setting has a `DEFAULT_*` constant and a `Default` implementation,
//! so hosts only override what they need. Settings can also be read from an
//! INI file through [`ConfigFile`]:
//!
//! ```ini
//! [streaming]
//! max_concurrent_loads = 4
//! cache_limit = 160
//! unload_cooldown_ms = 5000
//!
//! [generator]
//! level_count = 3
//! tile_format = jpg
//!
//! [logging]
//! filter = panotile=debug
//! ```

mod file;

pub use file::{config_file_path, ConfigError, ConfigFile};

use std::path::PathBuf;
use std::time::Duration;

use crate::manifest::TileFormat;

// ==================== Streaming Defaults ====================

/// Maximum tile fetches in flight per scene.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 4;

/// Maximum resident plus pending-removal tiles per scene.
pub const DEFAULT_TILE_CACHE_LIMIT: usize = 160;

/// Grace period before a tile that left the view is evicted.
pub const DEFAULT_TILE_UNLOAD_COOLDOWN: Duration = Duration::from_millis(5000);

/// Minimum wall-clock interval between visibility recomputations.
pub const DEFAULT_RECOMPUTE_INTERVAL: Duration = Duration::from_millis(150);

/// Prefetch margin applied to the viewport extent (0.5 = 50% larger).
pub const DEFAULT_PREFETCH_MARGIN: f64 = 0.5;

/// Overlap fraction used when a manifest does not specify `overlap`.
pub const DEFAULT_OVERLAP_FRACTION: f64 = 0.002;

/// Radius of the sphere the tile patches are placed on.
pub const DEFAULT_SPHERE_RADIUS: f64 = 500.0;

// ==================== Generator Defaults ====================

/// Number of pyramid levels produced for a panorama.
pub const DEFAULT_LEVEL_COUNT: u32 = 3;

/// Widest normalized panorama the generator keeps.
pub const DEFAULT_MAX_WIDTH: u32 = 16384;

/// Normalized width above which the large tile size is used.
pub const DEFAULT_LARGE_SOURCE_THRESHOLD: u32 = 8192;

/// Tile edge length for ordinary sources.
pub const DEFAULT_GENERATOR_TILE_SIZE: u32 = 512;

/// Tile edge length for very large sources.
pub const DEFAULT_LARGE_TILE_SIZE: u32 = 1024;

/// Preview image width.
pub const DEFAULT_PREVIEW_WIDTH: u32 = 512;

/// Preview image height.
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 256;

/// Tiles encoded concurrently per batch.
pub const DEFAULT_ENCODE_BATCH_SIZE: usize = 10;

/// JPEG quality for pyramid tiles.
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// JPEG quality for the preview image.
pub const DEFAULT_PREVIEW_QUALITY: u8 = 85;

/// Largest source edge the generator accepts before decoding.
pub const DEFAULT_MAX_SOURCE_DIMENSION: u32 = 65536;

/// Levels narrower than this are not emitted (the top level always is).
pub const DEFAULT_MIN_LEVEL_WIDTH: u32 = 64;

// ==================== Logging Defaults ====================

/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Configuration for the viewer-side streaming engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingConfig {
    /// Maximum concurrent tile fetches per scene.
    pub max_concurrent_loads: usize,

    /// Maximum resident plus pending-removal entries per scene.
    ///
    /// Exceeding it evicts least-recently-used entries immediately,
    /// regardless of cooldown.
    pub cache_limit: usize,

    /// Delay between a tile leaving the desired set and its eviction.
    pub unload_cooldown: Duration,

    /// Minimum interval between visibility recomputations.
    pub recompute_interval: Duration,

    /// Extra fraction of the viewport extent treated as visible.
    pub prefetch_margin: f64,

    /// Always keep every level-0 tile in the desired set as a backdrop.
    pub keep_base_level: bool,

    /// Patch overlap fraction when the manifest does not specify one.
    pub default_overlap_fraction: f64,

    /// Sphere radius for generated patches.
    pub sphere_radius: f64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            cache_limit: DEFAULT_TILE_CACHE_LIMIT,
            unload_cooldown: DEFAULT_TILE_UNLOAD_COOLDOWN,
            recompute_interval: DEFAULT_RECOMPUTE_INTERVAL,
            prefetch_margin: DEFAULT_PREFETCH_MARGIN,
            keep_base_level: true,
            default_overlap_fraction: DEFAULT_OVERLAP_FRACTION,
            sphere_radius: DEFAULT_SPHERE_RADIUS,
        }
    }
}

impl StreamingConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrent fetch limit (minimum 1).
    pub fn with_max_concurrent_loads(mut self, loads: usize) -> Self {
        self.max_concurrent_loads = loads.max(1);
        self
    }

    /// Set the cache entry limit (minimum 1).
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit.max(1);
        self
    }

    /// Set the unload cooldown.
    pub fn with_unload_cooldown(mut self, cooldown: Duration) -> Self {
        self.unload_cooldown = cooldown;
        self
    }

    /// Set the visibility recompute interval.
    pub fn with_recompute_interval(mut self, interval: Duration) -> Self {
        self.recompute_interval = interval;
        self
    }

    /// Set the prefetch margin.
    pub fn with_prefetch_margin(mut self, margin: f64) -> Self {
        self.prefetch_margin = margin.max(0.0);
        self
    }

    /// Enable or disable the level-0 backdrop.
    pub fn with_keep_base_level(mut self, keep: bool) -> Self {
        self.keep_base_level = keep;
        self
    }

    /// Set the sphere radius.
    pub fn with_sphere_radius(mut self, radius: f64) -> Self {
        self.sphere_radius = radius;
        self
    }
}

/// Configuration for the tile pyramid generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Number of levels to produce.
    pub level_count: u32,

    /// Maximum normalized width.
    pub max_width: u32,

    /// Width above which `large_tile_size` is used.
    pub large_source_threshold: u32,

    /// Tile size for ordinary sources.
    pub tile_size: u32,

    /// Tile size for large sources.
    pub large_tile_size: u32,

    /// Preview width in pixels.
    pub preview_width: u32,

    /// Preview height in pixels.
    pub preview_height: u32,

    /// Number of tiles encoded concurrently.
    pub encode_batch_size: usize,

    /// Encoding of the emitted tiles.
    pub tile_format: TileFormat,

    /// JPEG quality for tiles (1-100).
    pub jpeg_quality: u8,

    /// JPEG quality for the preview (1-100).
    pub preview_quality: u8,

    /// Largest accepted source edge.
    pub max_source_dimension: u32,

    /// Narrowest level emitted below the top level.
    pub min_level_width: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            level_count: DEFAULT_LEVEL_COUNT,
            max_width: DEFAULT_MAX_WIDTH,
            large_source_threshold: DEFAULT_LARGE_SOURCE_THRESHOLD,
            tile_size: DEFAULT_GENERATOR_TILE_SIZE,
            large_tile_size: DEFAULT_LARGE_TILE_SIZE,
            preview_width: DEFAULT_PREVIEW_WIDTH,
            preview_height: DEFAULT_PREVIEW_HEIGHT,
            encode_batch_size: DEFAULT_ENCODE_BATCH_SIZE,
            tile_format: TileFormat::Jpeg,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            preview_quality: DEFAULT_PREVIEW_QUALITY,
            max_source_dimension: DEFAULT_MAX_SOURCE_DIMENSION,
            min_level_width: DEFAULT_MIN_LEVEL_WIDTH,
        }
    }
}

impl GeneratorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of levels (minimum 1).
    pub fn with_level_count(mut self, count: u32) -> Self {
        self.level_count = count.max(1);
        self
    }

    /// Set the maximum normalized width.
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = width.max(2);
        self
    }

    /// Set the tile format.
    pub fn with_tile_format(mut self, format: TileFormat) -> Self {
        self.tile_format = format;
        self
    }

    /// Set the ordinary and large tile sizes.
    pub fn with_tile_sizes(mut self, tile_size: u32, large_tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self.large_tile_size = large_tile_size.max(1);
        self
    }

    /// Set the preview dimensions.
    pub fn with_preview_size(mut self, width: u32, height: u32) -> Self {
        self.preview_width = width.max(1);
        self.preview_height = height.max(1);
        self
    }

    /// Set the encode batch size (minimum 1).
    pub fn with_encode_batch_size(mut self, size: usize) -> Self {
        self.encode_batch_size = size.max(1);
        self
    }

    /// Set the minimum emitted level width.
    pub fn with_min_level_width(mut self, width: u32) -> Self {
        self.min_level_width = width;
        self
    }
}

/// Configuration for [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG` when set.
    pub filter: String,

    /// Directory for daily-rotated log files; console only when `None`.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Set the filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Write logs to files in the given directory as well.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}
