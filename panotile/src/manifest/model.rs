//! Canonical in-memory tile pyramid description.
//!
//! A [`Manifest`] is independent of the encoding it was read from. It is
//! parsed fresh each time a scene is displayed and never mutated in place.

use std::collections::BTreeMap;
use std::fmt;

use super::naming::{join_locator, tile_key};

/// Tile size assumed when a manifest does not state one.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Address of one tile within a scene's pyramid.
///
/// This is the only identity a tile needs; it is unique within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    /// Pyramid level (0 = lowest resolution)
    pub level: u32,
    /// Column within the level grid (0 = yaw -180°)
    pub col: u32,
    /// Row within the level grid (0 = top, pitch +90°)
    pub row: u32,
}

impl TileAddress {
    /// Create a new tile address.
    pub fn new(level: u32, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{}_{}", self.level, self.col, self.row)
    }
}

/// One resolution level of the pyramid.
///
/// Invariant for levels built with [`Level::new`]:
/// `cols = ceil(width / tile_size)` and `rows = ceil(height / tile_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub cols: u32,
    pub rows: u32,
}

impl Level {
    /// Create a level whose grid is derived from its pixel size.
    pub fn new(index: u32, width: u32, height: u32, tile_size: u32) -> Self {
        let (cols, rows) = if tile_size == 0 {
            (0, 0)
        } else {
            (width.div_ceil(tile_size), height.div_ceil(tile_size))
        };
        Self {
            index,
            width,
            height,
            tile_size,
            cols,
            rows,
        }
    }

    /// Create a level with an explicit grid, as listed by a manifest.
    pub fn with_grid(
        index: u32,
        width: u32,
        height: u32,
        tile_size: u32,
        cols: u32,
        rows: u32,
    ) -> Self {
        Self {
            index,
            width,
            height,
            tile_size,
            cols,
            rows,
        }
    }

    /// Grid dimensions usable for tiling this level.
    ///
    /// Falls back to the pixel-derived grid when the listed grid is empty,
    /// and to a single tile when nothing can be derived.
    pub fn effective_grid(&self) -> (u32, u32) {
        if self.cols > 0 && self.rows > 0 {
            return (self.cols, self.rows);
        }
        let derived = Level::new(self.index, self.width, self.height, self.tile_size);
        (derived.cols.max(1), derived.rows.max(1))
    }

    /// Whether the listed grid is usable as-is.
    pub fn has_valid_grid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }

    /// Number of tiles in the effective grid.
    pub fn tile_count(&self) -> u64 {
        let (cols, rows) = self.effective_grid();
        cols as u64 * rows as u64
    }

    /// Whether `address` lies on this level's effective grid.
    pub fn contains(&self, address: &TileAddress) -> bool {
        let (cols, rows) = self.effective_grid();
        address.level == self.index && address.col < cols && address.row < rows
    }

    /// Iterate every tile address of the effective grid in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = TileAddress> {
        let (cols, rows) = self.effective_grid();
        let index = self.index;
        (0..rows).flat_map(move |row| (0..cols).map(move |col| TileAddress::new(index, col, row)))
    }

    /// Pixel rectangle `(x, y, width, height)` of a tile, clipped to the level.
    ///
    /// Returns `None` for tiles outside the level.
    pub fn tile_rect(&self, col: u32, row: u32) -> Option<(u32, u32, u32, u32)> {
        let x = col.checked_mul(self.tile_size)?;
        let y = row.checked_mul(self.tile_size)?;
        if x >= self.width || y >= self.height {
            return None;
        }
        let w = self.tile_size.min(self.width - x);
        let h = self.tile_size.min(self.height - y);
        Some((x, y, w, h))
    }
}

/// Encoding of tile images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl TileFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpg",
            TileFormat::Png => "png",
            TileFormat::Webp => "webp",
        }
    }

    /// MIME type for uploads.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Png => "image/png",
            TileFormat::Webp => "image/webp",
        }
    }

    /// Parse an extension or format name (case insensitive, leading dot allowed).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(TileFormat::Jpeg),
            "png" => Some(TileFormat::Png),
            "webp" => Some(TileFormat::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Canonical description of a scene's tile pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Levels ordered by increasing resolution.
    pub levels: Vec<Level>,
    pub tile_size: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub preview_locator: Option<String>,
    pub tile_format: TileFormat,
    /// Prefix for conventional tile names; empty means relative keys.
    pub base_path: String,
    /// Locators for tiles that do not follow the naming convention.
    pub explicit_tiles: Option<BTreeMap<TileAddress, String>>,
    pub overlap_px: Option<u32>,
}

impl Manifest {
    /// Number of levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Level with the given index.
    pub fn level(&self, index: u32) -> Option<&Level> {
        self.levels.iter().find(|level| level.index == index)
    }

    /// Level at a position in resolution order.
    pub fn level_at(&self, position: usize) -> Option<&Level> {
        self.levels.get(position)
    }

    /// Highest-resolution level.
    pub fn top_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    /// Whether `address` names a tile of this pyramid.
    pub fn contains(&self, address: &TileAddress) -> bool {
        self.level(address.level)
            .is_some_and(|level| level.contains(address))
    }

    /// Retrieval locator for a tile.
    ///
    /// An explicit locator wins; otherwise the conventional
    /// `l{level}_{row}_{col}.{format}` name is resolved against `base_path`.
    pub fn tile_locator(&self, address: TileAddress) -> String {
        if let Some(locator) = self
            .explicit_tiles
            .as_ref()
            .and_then(|tiles| tiles.get(&address))
        {
            return locator.clone();
        }
        join_locator(&self.base_path, &tile_key(address, self.tile_format))
    }

    /// Overlap as a fraction of one tile, or `default` when unspecified.
    pub fn overlap_fraction(&self, default: f64) -> f64 {
        match self.overlap_px {
            Some(px) if self.tile_size > 0 => px as f64 / self.tile_size as f64,
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures::three_level_manifest;
    use std::collections::HashSet;

    #[test]
    fn test_level_grid_invariant() {
        let level = Level::new(0, 1000, 500, 512);
        assert_eq!(level.cols, 2);
        assert_eq!(level.rows, 1);

        let level = Level::new(2, 4096, 2048, 512);
        assert_eq!((level.cols, level.rows), (8, 4));
    }

    #[test]
    fn test_level_zero_tile_size() {
        let level = Level::new(0, 1024, 512, 0);
        assert_eq!((level.cols, level.rows), (0, 0));
        assert_eq!(level.effective_grid(), (1, 1));
    }

    #[test]
    fn test_effective_grid_derives_from_pixels() {
        let level = Level::with_grid(1, 2048, 1024, 512, 0, 0);
        assert!(!level.has_valid_grid());
        assert_eq!(level.effective_grid(), (4, 2));
    }

    #[test]
    fn test_level_tiles_row_major() {
        let level = Level::new(1, 2048, 1024, 512);
        let tiles: Vec<_> = level.tiles().collect();

        assert_eq!(tiles.len(), 8);
        assert_eq!(tiles[0], TileAddress::new(1, 0, 0));
        assert_eq!(tiles[1], TileAddress::new(1, 1, 0));
        assert_eq!(tiles[4], TileAddress::new(1, 0, 1));
        let unique: HashSet<_> = tiles.iter().collect();
        assert_eq!(unique.len(), 8);
    }

    #[test]
    fn test_tile_rect_clips_edges() {
        let level = Level::new(0, 1000, 500, 512);
        assert_eq!(level.tile_rect(0, 0), Some((0, 0, 512, 500)));
        assert_eq!(level.tile_rect(1, 0), Some((512, 0, 488, 500)));
        assert_eq!(level.tile_rect(2, 0), None);
        assert_eq!(level.tile_rect(0, 1), None);
    }

    #[test]
    fn test_level_contains() {
        let level = Level::new(1, 2048, 1024, 512);
        assert!(level.contains(&TileAddress::new(1, 3, 1)));
        assert!(!level.contains(&TileAddress::new(1, 4, 0)));
        assert!(!level.contains(&TileAddress::new(0, 0, 0)));
    }

    #[test]
    fn test_tile_format_extension() {
        assert_eq!(TileFormat::from_extension("JPEG"), Some(TileFormat::Jpeg));
        assert_eq!(TileFormat::from_extension(".png"), Some(TileFormat::Png));
        assert_eq!(TileFormat::from_extension("webp"), Some(TileFormat::Webp));
        assert_eq!(TileFormat::from_extension("tiff"), None);
        assert_eq!(TileFormat::Jpeg.extension(), "jpg");
        assert_eq!(TileFormat::Png.content_type(), "image/png");
    }

    #[test]
    fn test_tile_locator_conventional() {
        let manifest = three_level_manifest();
        assert_eq!(
            manifest.tile_locator(TileAddress::new(2, 5, 1)),
            "scenes/a/l2_1_5.jpg"
        );
    }

    #[test]
    fn test_tile_locator_explicit_wins() {
        let mut manifest = three_level_manifest();
        let address = TileAddress::new(0, 1, 0);
        manifest.explicit_tiles = Some(BTreeMap::from([(
            address,
            "https://cdn.example.com/x/tile.jpg".to_string(),
        )]));

        assert_eq!(
            manifest.tile_locator(address),
            "https://cdn.example.com/x/tile.jpg"
        );
        // Unlisted tiles still use the convention
        assert_eq!(
            manifest.tile_locator(TileAddress::new(0, 0, 0)),
            "scenes/a/l0_0_0.jpg"
        );
    }

    #[test]
    fn test_overlap_fraction() {
        let mut manifest = three_level_manifest();
        assert!((manifest.overlap_fraction(0.002) - 0.002).abs() < 1e-12);

        manifest.overlap_px = Some(2);
        assert!((manifest.overlap_fraction(0.002) - 2.0 / 512.0).abs() < 1e-12);
    }

    #[test]
    fn test_manifest_lookup() {
        let manifest = three_level_manifest();
        assert_eq!(manifest.level_count(), 3);
        assert_eq!(manifest.top_level().map(|l| l.width), Some(4096));
        assert!(manifest.contains(&TileAddress::new(2, 7, 3)));
        assert!(!manifest.contains(&TileAddress::new(3, 0, 0)));
    }

    #[test]
    fn test_tile_address_display() {
        assert_eq!(TileAddress::new(2, 5, 1).to_string(), "L2/5_1");
    }
}
