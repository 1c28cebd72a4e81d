//! Tolerant manifest parser.
//!
//! Accepts a manifest as a JSON object, as a JSON string holding the object,
//! or double-encoded. Every field is looked up through an ordered list of
//! accepted spellings; the first value that is present and converts wins.
//! Levels and dimensions that a producer left out are derived from the tile
//! list or from a flat listing of discovered tile files.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::error::ManifestError;
use super::model::{Level, Manifest, TileAddress, TileFormat, DEFAULT_TILE_SIZE};
use super::naming::{
    file_name, join_locator, parent_locator, parse_tile_key, tile_key, DiscoveredTile,
};

/// String layers unwrapped before giving up on a blob.
const MAX_STRING_UNWRAPS: usize = 2;

/// Largest tile grid accepted for a single level.
pub const MAX_TILES_PER_LEVEL: u64 = 1 << 16;

// Key precedence lists, first entry wins.
const TYPE_KEYS: &[&str] = &["type"];
const TILE_SIZE_KEYS: &[&str] = &["tileSize", "tile_size", "tilesize"];
const WIDTH_KEYS: &[&str] = &["dimensions.width", "originalWidth", "original_width", "width"];
const HEIGHT_KEYS: &[&str] = &[
    "dimensions.height",
    "originalHeight",
    "original_height",
    "height",
];
const PREVIEW_KEYS: &[&str] = &["preview", "previewUrl", "preview_url", "previewLocator"];
const FORMAT_KEYS: &[&str] = &["format", "tileFormat", "tile_format", "extension"];
const BASE_PATH_KEYS: &[&str] = &["basePath", "base_path", "baseUrl", "base_url"];
const OVERLAP_KEYS: &[&str] = &["overlap", "overlapPx", "overlap_px"];
const LEVELS_KEYS: &[&str] = &["levels"];
const TILES_KEYS: &[&str] = &["tiles"];

const LEVEL_INDEX_KEYS: &[&str] = &["level", "index"];
const LEVEL_WIDTH_KEYS: &[&str] = &["width"];
const LEVEL_HEIGHT_KEYS: &[&str] = &["height"];
const LEVEL_COLS_KEYS: &[&str] = &["tilesX", "tiles_x", "cols", "columns"];
const LEVEL_ROWS_KEYS: &[&str] = &["tilesY", "tiles_y", "rows"];

const TILE_LEVEL_KEYS: &[&str] = &["level", "z"];
const TILE_COL_KEYS: &[&str] = &["col", "x", "column"];
const TILE_ROW_KEYS: &[&str] = &["row", "y"];
const TILE_NAME_KEYS: &[&str] = &["key", "filename", "name"];
const TILE_URL_KEYS: &[&str] = &["url", "locator", "src"];

/// What a scene can display after its manifest was read.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneSource {
    /// The pyramid is usable.
    Pyramid(Manifest),
    /// The manifest could not be used; show the preview image only.
    PreviewOnly {
        preview: Option<String>,
        reason: ManifestError,
    },
}

impl SceneSource {
    /// The parsed manifest, if the pyramid is usable.
    pub fn manifest(&self) -> Option<&Manifest> {
        match self {
            SceneSource::Pyramid(manifest) => Some(manifest),
            SceneSource::PreviewOnly { .. } => None,
        }
    }

    /// Locator of the preview image, if any is known.
    pub fn preview(&self) -> Option<&str> {
        match self {
            SceneSource::Pyramid(manifest) => manifest.preview_locator.as_deref(),
            SceneSource::PreviewOnly { preview, .. } => preview.as_deref(),
        }
    }

    /// Whether a pyramid is available.
    pub fn is_pyramid(&self) -> bool {
        matches!(self, SceneSource::Pyramid(_))
    }
}

/// Parse a stored manifest and degrade to preview-only on any failure.
///
/// `preview` is the scene's own preview locator; it fills in a manifest that
/// does not name one and is what remains visible when parsing fails.
pub fn load_scene_source(
    blob: &Value,
    fallback: &[DiscoveredTile],
    preview: Option<&str>,
) -> SceneSource {
    match parse_manifest(blob, fallback) {
        Ok(mut manifest) => {
            if manifest.preview_locator.is_none() {
                manifest.preview_locator = preview.map(str::to_string);
            }
            SceneSource::Pyramid(manifest)
        }
        Err(reason) => {
            tracing::warn!(
                error = %reason,
                fallback_tiles = fallback.len(),
                "Manifest unusable, showing preview only"
            );
            SceneSource::PreviewOnly {
                preview: preview.map(str::to_string),
                reason,
            }
        }
    }
}

/// Parse manifest text.
///
/// Blank text is treated like a missing manifest and falls back to
/// `fallback`.
pub fn parse_manifest_str(
    raw: &str,
    fallback: &[DiscoveredTile],
) -> Result<Manifest, ManifestError> {
    if raw.trim().is_empty() {
        return parse_manifest(&Value::Null, fallback);
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ManifestError::Malformed(format!("invalid JSON: {}", e)))?;
    parse_manifest(&value, fallback)
}

/// Parse a manifest value into the canonical [`Manifest`].
///
/// A `null` (or empty string) blob is built entirely from `fallback`.
pub fn parse_manifest(
    value: &Value,
    fallback: &[DiscoveredTile],
) -> Result<Manifest, ManifestError> {
    let value = unwrap_string_layers(value)?;
    let manifest = match &value {
        Value::Null if fallback.is_empty() => return Err(ManifestError::Empty),
        Value::Null => build(&Map::new(), fallback)?,
        Value::Object(object) => build(object, fallback)?,
        other => {
            return Err(ManifestError::Malformed(format!(
                "expected an object, found {}",
                value_kind(other)
            )))
        }
    };

    tracing::debug!(
        levels = manifest.levels.len(),
        tile_size = manifest.tile_size,
        width = manifest.original_width,
        height = manifest.original_height,
        explicit_tiles = manifest.explicit_tiles.as_ref().map_or(0, |t| t.len()),
        "Parsed manifest"
    );

    Ok(manifest)
}

fn unwrap_string_layers(value: &Value) -> Result<Value, ManifestError> {
    let mut current = value.clone();
    let mut unwraps = 0;
    while let Some(text) = current.as_str().map(str::to_owned) {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        if unwraps == MAX_STRING_UNWRAPS {
            return Err(ManifestError::Malformed(
                "manifest is string-encoded too many times".to_string(),
            ));
        }
        current = serde_json::from_str(&text)
            .map_err(|e| ManifestError::Malformed(format!("invalid JSON: {}", e)))?;
        unwraps += 1;
    }
    Ok(current)
}

fn build(object: &Map<String, Value>, fallback: &[DiscoveredTile]) -> Result<Manifest, ManifestError> {
    if let Some(kind) = lookup(object, TYPE_KEYS) {
        let supported = kind
            .as_str()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("multires"));
        if !supported {
            return Err(ManifestError::Malformed(format!(
                "unsupported manifest type {}",
                kind
            )));
        }
    }

    let tile_size = first_u32(object, TILE_SIZE_KEYS, 1).unwrap_or(DEFAULT_TILE_SIZE);

    let listed: Vec<TileEntry> = lookup(object, TILES_KEYS)
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(TileEntry::from_value).collect())
        .unwrap_or_default();
    let tiles = if listed.is_empty() {
        fallback.iter().map(TileEntry::from_discovered).collect()
    } else {
        listed
    };

    let mut levels: Vec<Level> = match lookup(object, LEVELS_KEYS).and_then(Value::as_array) {
        Some(entries) => entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| parse_level(entry, position, tile_size))
            .collect(),
        None => Vec::new(),
    };
    if levels.is_empty() {
        levels = derive_levels(&tiles, tile_size);
    }
    if let Some(level) = levels
        .iter()
        .find(|level| level.tile_count() > MAX_TILES_PER_LEVEL)
    {
        return Err(ManifestError::Malformed(format!(
            "level {} has {}x{} tiles, more than {}",
            level.index, level.cols, level.rows, MAX_TILES_PER_LEVEL
        )));
    }
    if levels.is_empty() {
        return Err(ManifestError::Empty);
    }
    levels.sort_by_key(|level| level.index);
    levels.dedup_by_key(|level| level.index);

    let top = levels.last().copied();
    let original_width = first_u32(object, WIDTH_KEYS, 1)
        .or(top.map(|level| level.width))
        .filter(|&w| w > 0)
        .ok_or(ManifestError::MissingDimensions)?;
    let original_height = first_u32(object, HEIGHT_KEYS, 1)
        .or(top.map(|level| level.height))
        .filter(|&h| h > 0)
        .ok_or(ManifestError::MissingDimensions)?;

    let tile_format = first_string(object, FORMAT_KEYS)
        .and_then(TileFormat::from_extension)
        .or_else(|| tiles.iter().find_map(TileEntry::format))
        .unwrap_or_default();

    let preview_locator = first_string(object, PREVIEW_KEYS).map(str::to_string);
    let base_path = first_string(object, BASE_PATH_KEYS)
        .map(str::to_string)
        .or_else(|| {
            preview_locator
                .as_deref()
                .map(parent_locator)
                .filter(|parent| !parent.is_empty())
        })
        .or_else(|| {
            tiles
                .iter()
                .find_map(|tile| tile.url.as_deref())
                .map(parent_locator)
        })
        .unwrap_or_default();

    let explicit: BTreeMap<TileAddress, String> = tiles
        .iter()
        .filter_map(|tile| {
            let locator = tile.locator(&base_path)?;
            let conventional = join_locator(&base_path, &tile_key(tile.address, tile_format));
            (locator != conventional).then_some((tile.address, locator))
        })
        .collect();

    Ok(Manifest {
        levels,
        tile_size,
        original_width,
        original_height,
        preview_locator,
        tile_format,
        base_path,
        explicit_tiles: (!explicit.is_empty()).then_some(explicit),
        overlap_px: first_u32(object, OVERLAP_KEYS, 0),
    })
}

fn parse_level(value: &Value, position: usize, tile_size: u32) -> Option<Level> {
    let object = value.as_object()?;
    let index = first_u32(object, LEVEL_INDEX_KEYS, 0)
        .or_else(|| u32::try_from(position).ok())?;
    let listed_cols = first_u32(object, LEVEL_COLS_KEYS, 1);
    let listed_rows = first_u32(object, LEVEL_ROWS_KEYS, 1);

    let width = first_u32(object, LEVEL_WIDTH_KEYS, 1)
        .or_else(|| listed_cols.and_then(|cols| cols.checked_mul(tile_size)))?;
    let height = first_u32(object, LEVEL_HEIGHT_KEYS, 1)
        .or_else(|| listed_rows.and_then(|rows| rows.checked_mul(tile_size)))
        .unwrap_or(0);

    // The pixel size decides the grid; a listed grid only has to agree
    let cols = width.div_ceil(tile_size);
    let rows = height.div_ceil(tile_size);
    let cols_differ = listed_cols.is_some_and(|listed| listed != cols);
    let rows_differ = listed_rows.is_some_and(|listed| listed != rows);
    if cols_differ || rows_differ {
        tracing::warn!(
            level = index,
            width,
            height,
            tile_size,
            listed_cols = ?listed_cols,
            listed_rows = ?listed_rows,
            cols,
            rows,
            "Listed tile grid disagrees with level size, using derived grid"
        );
    }

    Some(Level::with_grid(index, width, height, tile_size, cols, rows))
}

/// Group tiles by level and size each level to the extent of its tiles.
fn derive_levels(tiles: &[TileEntry], tile_size: u32) -> Vec<Level> {
    let mut extents: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
    for tile in tiles {
        let extent = extents.entry(tile.address.level).or_insert((0, 0));
        extent.0 = extent.0.max(tile.address.col);
        extent.1 = extent.1.max(tile.address.row);
    }

    extents
        .into_iter()
        .filter_map(|(index, (max_col, max_row))| {
            let cols = max_col.checked_add(1)?;
            let rows = max_row.checked_add(1)?;
            let width = cols.checked_mul(tile_size)?;
            let height = rows.checked_mul(tile_size)?;
            Some(Level::with_grid(index, width, height, tile_size, cols, rows))
        })
        .collect()
}

/// One tile as listed by a manifest or a storage listing.
#[derive(Debug, Clone)]
struct TileEntry {
    address: TileAddress,
    key: Option<String>,
    url: Option<String>,
}

impl TileEntry {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let key = first_string(object, TILE_NAME_KEYS).map(str::to_string);
        let url = first_string(object, TILE_URL_KEYS).map(str::to_string);

        let from_name = key
            .as_deref()
            .or(url.as_deref())
            .and_then(|name| parse_tile_key(file_name(name)))
            .map(|parsed| parsed.address);

        let address = match (
            first_u32(object, TILE_LEVEL_KEYS, 0),
            first_u32(object, TILE_COL_KEYS, 0),
            first_u32(object, TILE_ROW_KEYS, 0),
        ) {
            (Some(level), Some(col), Some(row)) => TileAddress::new(level, col, row),
            _ => from_name?,
        };

        Some(Self { address, key, url })
    }

    fn from_discovered(tile: &DiscoveredTile) -> Self {
        Self {
            address: tile.address,
            key: None,
            url: Some(tile.locator.clone()),
        }
    }

    fn format(&self) -> Option<TileFormat> {
        let name = self.key.as_deref().or(self.url.as_deref())?;
        let name = file_name(name);
        let (_, ext) = name.rsplit_once('.')?;
        TileFormat::from_extension(ext)
    }

    fn locator(&self, base_path: &str) -> Option<String> {
        match (&self.url, &self.key) {
            (Some(url), _) => Some(url.clone()),
            (None, Some(key)) => Some(join_locator(base_path, key)),
            (None, None) => None,
        }
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| lookup_path(object, key))
        .find(|value| !value.is_null())
}

fn lookup_path<'a>(object: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = object.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// First key whose value converts to an integer `>= min`.
fn first_u32(object: &Map<String, Value>, keys: &[&str], min: u32) -> Option<u32> {
    keys.iter()
        .filter_map(|key| lookup_path(object, key))
        .find_map(|value| as_u32(value).filter(|&v| v >= min))
}

/// First key holding a non-blank string.
fn first_string<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| lookup_path(object, key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => match number.as_u64() {
            Some(n) => u32::try_from(n).ok(),
            None => number.as_f64().and_then(integral_f64),
        },
        Value::String(text) => {
            let text = text.trim();
            match text.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => text.parse::<f64>().ok().and_then(integral_f64),
            }
        }
        _ => None,
    }
}

fn integral_f64(value: f64) -> Option<u32> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
