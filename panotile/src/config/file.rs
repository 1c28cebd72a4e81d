//! INI-backed configuration file.
//!
//! Missing sections and keys keep their defaults; unknown keys are ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use super::{GeneratorConfig, LoggingConfig, StreamingConfig};
use crate::manifest::TileFormat;

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("invalid configuration syntax: {0}")]
    Parse(String),

    /// A key holds a value of the wrong type.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Returns the default configuration file location
/// (`<config dir>/panotile/config.ini`).
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("panotile").join("config.ini"))
}

/// All configuration sections read from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub streaming: StreamingConfig,
    pub generator: GeneratorConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load configuration from the default location.
    ///
    /// Returns defaults if the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(parse) => ConfigError::Parse(parse.to_string()),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("streaming")) {
            apply_streaming(section, &mut config.streaming)?;
        }
        if let Some(section) = ini.section(Some("generator")) {
            apply_generator(section, &mut config.generator)?;
        }
        if let Some(section) = ini.section(Some("logging")) {
            apply_logging(section, &mut config.logging);
        }

        tracing::debug!(
            max_concurrent_loads = config.streaming.max_concurrent_loads,
            cache_limit = config.streaming.cache_limit,
            level_count = config.generator.level_count,
            "Loaded configuration"
        );

        Ok(config)
    }
}

fn apply_streaming(section: &Properties, config: &mut StreamingConfig) -> Result<(), ConfigError> {
    if let Some(v) = read::<usize>(section, "streaming", "max_concurrent_loads")? {
        config.max_concurrent_loads = v.max(1);
    }
    if let Some(v) = read::<usize>(section, "streaming", "cache_limit")? {
        config.cache_limit = v.max(1);
    }
    if let Some(v) = read::<u64>(section, "streaming", "unload_cooldown_ms")? {
        config.unload_cooldown = Duration::from_millis(v);
    }
    if let Some(v) = read::<u64>(section, "streaming", "recompute_interval_ms")? {
        config.recompute_interval = Duration::from_millis(v);
    }
    if let Some(v) = read::<f64>(section, "streaming", "prefetch_margin")? {
        config.prefetch_margin = v.max(0.0);
    }
    if let Some(v) = read::<bool>(section, "streaming", "keep_base_level")? {
        config.keep_base_level = v;
    }
    if let Some(v) = read::<f64>(section, "streaming", "default_overlap_fraction")? {
        config.default_overlap_fraction = v.max(0.0);
    }
    if let Some(v) = read::<f64>(section, "streaming", "sphere_radius")? {
        config.sphere_radius = v;
    }
    Ok(())
}

fn apply_generator(section: &Properties, config: &mut GeneratorConfig) -> Result<(), ConfigError> {
    if let Some(v) = read::<u32>(section, "generator", "level_count")? {
        config.level_count = v.max(1);
    }
    if let Some(v) = read::<u32>(section, "generator", "max_width")? {
        config.max_width = v.max(2);
    }
    if let Some(v) = read::<u32>(section, "generator", "large_source_threshold")? {
        config.large_source_threshold = v;
    }
    if let Some(v) = read::<u32>(section, "generator", "tile_size")? {
        config.tile_size = v.max(1);
    }
    if let Some(v) = read::<u32>(section, "generator", "large_tile_size")? {
        config.large_tile_size = v.max(1);
    }
    if let Some(v) = read::<u32>(section, "generator", "preview_width")? {
        config.preview_width = v.max(1);
    }
    if let Some(v) = read::<u32>(section, "generator", "preview_height")? {
        config.preview_height = v.max(1);
    }
    if let Some(v) = read::<usize>(section, "generator", "encode_batch_size")? {
        config.encode_batch_size = v.max(1);
    }
    if let Some(raw) = section.get("tile_format") {
        config.tile_format =
            TileFormat::from_extension(raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "generator.tile_format".to_string(),
                value: raw.to_string(),
            })?;
    }
    if let Some(v) = read::<u8>(section, "generator", "jpeg_quality")? {
        config.jpeg_quality = v.clamp(1, 100);
    }
    if let Some(v) = read::<u8>(section, "generator", "preview_quality")? {
        config.preview_quality = v.clamp(1, 100);
    }
    if let Some(v) = read::<u32>(section, "generator", "max_source_dimension")? {
        config.max_source_dimension = v;
    }
    if let Some(v) = read::<u32>(section, "generator", "min_level_width")? {
        config.min_level_width = v;
    }
    Ok(())
}

fn apply_logging(section: &Properties, config: &mut LoggingConfig) {
    if let Some(filter) = section.get("filter").filter(|f| !f.trim().is_empty()) {
        config.filter = filter.trim().to_string();
    }
    if let Some(dir) = section.get("log_dir").filter(|d| !d.trim().is_empty()) {
        config.log_dir = Some(PathBuf::from(dir.trim()));
    }
}

fn read<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = section.get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key: format!("{}.{}", section_name, key),
            value: raw.to_string(),
        })
}
