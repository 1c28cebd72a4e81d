//! Tile key naming convention and locator helpers.
//!
//! Tiles without an explicit locator are named `l{level}_{row}_{col}.{ext}`
//! and resolved against the manifest's base path, e.g. `l2_1_5.jpg` is
//! level 2, row 1, column 5.

use regex::Regex;
use std::sync::OnceLock;

use super::model::{TileAddress, TileFormat};

/// A tile discovered in a flat listing (e.g. an object storage prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTile {
    pub address: TileAddress,
    pub locator: String,
}

impl DiscoveredTile {
    /// Create a discovered tile.
    pub fn new(address: TileAddress, locator: impl Into<String>) -> Self {
        Self {
            address,
            locator: locator.into(),
        }
    }

    /// Build from a locator whose final path segment follows the naming
    /// convention. Returns `None` for anything else (preview, manifest, ...).
    pub fn from_locator(locator: &str) -> Option<Self> {
        let parsed = parse_tile_key(file_name(locator))?;
        Some(Self::new(parsed.address, locator))
    }
}

/// Result of parsing a conventional tile key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTileKey {
    pub address: TileAddress,
    /// `None` when the extension is not a known tile format.
    pub format: Option<TileFormat>,
}

fn tile_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // l{level}_{row}_{col}.{ext}
        Regex::new(r"^[lL](\d+)_(\d+)_(\d+)\.([A-Za-z0-9]+)$").unwrap()
    })
}

/// Conventional key for a tile.
pub fn tile_key(address: TileAddress, format: TileFormat) -> String {
    format!(
        "l{}_{}_{}.{}",
        address.level,
        address.row,
        address.col,
        format.extension()
    )
}

/// Parse a conventional tile key such as `l2_1_5.jpg`.
///
/// Only the key itself is matched; strip any directory first
/// (see [`DiscoveredTile::from_locator`]).
pub fn parse_tile_key(key: &str) -> Option<ParsedTileKey> {
    let captures = tile_key_pattern().captures(key.trim())?;
    let level = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let row = captures.get(2)?.as_str().parse::<u32>().ok()?;
    let col = captures.get(3)?.as_str().parse::<u32>().ok()?;
    let format = TileFormat::from_extension(captures.get(4)?.as_str());

    Some(ParsedTileKey {
        address: TileAddress::new(level, col, row),
        format,
    })
}

/// Join a base path and a key with exactly one separator.
///
/// An empty base yields the key unchanged.
pub fn join_locator(base: &str, key: &str) -> String {
    if base.is_empty() {
        return key.to_string();
    }
    let key = key.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{}{}", base, key)
    } else {
        format!("{}/{}", base, key)
    }
}

/// Parent of a locator including the trailing separator.
///
/// Query strings and fragments are dropped first; a locator with no
/// separator has an empty parent.
pub fn parent_locator(locator: &str) -> String {
    let path = strip_query(locator);
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => String::new(),
    }
}

/// Final path segment of a locator without query or fragment.
pub fn file_name(locator: &str) -> &str {
    let path = strip_query(locator);
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

fn strip_query(locator: &str) -> &str {
    let end = locator.find(['?', '#']).unwrap_or(locator.len());
    &locator[..end]
}
