//! Tile visibility for a viewport.
//!
//! The viewport is projected to a rectangle in equirectangular texture
//! space and intersected with the level grid. Horizontally the rectangle
//! wraps across the ±180° seam.

use std::collections::HashSet;
use std::f64::consts::{PI, TAU};

use super::Viewport;
use crate::config::DEFAULT_PREFETCH_MARGIN;
use crate::geometry::normalize_yaw;
use crate::manifest::{Level, TileAddress};

/// Viewport extent in texture space.
///
/// `u` runs left to right from yaw -180°; `v` runs bottom to top from
/// pitch -90°. `u` bounds may leave `[0, 1]` when the rectangle wraps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub center_u: f64,
    pub center_v: f64,
    pub half_u: f64,
    pub half_v: f64,
}

impl UvRect {
    /// Rectangle for `viewport`, enlarged by `margin` (0.5 = 50%).
    pub fn from_viewport(viewport: &Viewport, margin: f64) -> Self {
        let fov = viewport.fov.to_radians();
        let scale = 1.0 + margin.max(0.0);
        Self {
            center_u: (normalize_yaw(viewport.yaw) + 180.0) / 360.0,
            center_v: (viewport.pitch.clamp(-90.0, 90.0) + 90.0) / 180.0,
            half_u: fov / TAU * scale,
            half_v: fov / PI * scale,
        }
    }

    pub fn u_min(&self) -> f64 {
        self.center_u - self.half_u
    }

    pub fn u_max(&self) -> f64 {
        self.center_u + self.half_u
    }

    /// Whether the rectangle spans the full width.
    pub fn covers_all_columns(&self) -> bool {
        self.half_u * 2.0 >= 1.0
    }

    /// Vertical extent in image row space (0 = top), clipped to `[0, 1]`.
    fn row_span(&self) -> (f64, f64) {
        let top = (1.0 - (self.center_v + self.half_v)).max(0.0);
        let bottom = (1.0 - (self.center_v - self.half_v)).min(1.0);
        (top, bottom)
    }
}

/// Tiles of `level` visible in `viewport` with the default prefetch margin.
pub fn visible_tiles(viewport: &Viewport, level: &Level) -> HashSet<TileAddress> {
    visible_tiles_with_margin(viewport, level, DEFAULT_PREFETCH_MARGIN)
}

/// Tiles of `level` whose cell overlaps the viewport rectangle.
///
/// When the rectangle reaches a pole, every column of the first or last row
/// is included, since those cells all meet at the pole on the sphere.
///
/// Fails open: an unusable viewport or level grid yields every tile of the
/// level rather than nothing.
pub fn visible_tiles_with_margin(
    viewport: &Viewport,
    level: &Level,
    margin: f64,
) -> HashSet<TileAddress> {
    if !level.has_valid_grid() || !viewport.is_usable() {
        tracing::debug!(
            level = level.index,
            cols = level.cols,
            rows = level.rows,
            fov = viewport.fov,
            "Visibility undefined, selecting whole level"
        );
        return level.tiles().collect();
    }

    let rect = UvRect::from_viewport(viewport, margin);
    let (cols, rows) = (level.cols, level.rows);
    let (top, bottom) = rect.row_span();
    let all_columns = rect.covers_all_columns();

    let mut tiles = HashSet::new();
    for row in 0..rows {
        let row_start = row as f64 / rows as f64;
        let row_end = (row + 1) as f64 / rows as f64;
        if !(row_start < bottom && row_end > top) {
            continue;
        }

        // Near a pole every column converges into view
        let pole_row = (row == 0 && top <= 0.0) || (row == rows - 1 && bottom >= 1.0);

        for col in 0..cols {
            if all_columns || pole_row || column_overlaps(col, cols, &rect) {
                tiles.insert(TileAddress::new(level.index, col, row));
            }
        }
    }

    tiles
}

fn column_overlaps(col: u32, cols: u32, rect: &UvRect) -> bool {
    let width = 1.0 / cols as f64;
    let start = col as f64 * width;
    [-1.0, 0.0, 1.0].iter().any(|shift| {
        let cell_start = start + shift;
        let cell_end = cell_start + width;
        cell_start < rect.u_max() && cell_end > rect.u_min()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(cols: u32, rows: u32) -> Level {
        Level::new(2, cols * 512, rows * 512, 512)
    }

    fn columns(tiles: &HashSet<TileAddress>) -> Vec<u32> {
        let mut cols: Vec<u32> = tiles.iter().map(|t| t.col).collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }

    #[test]
    fn test_uv_rect() {
        let rect = UvRect::from_viewport(&Viewport::new(0.0, 0.0, 90.0), 0.5);
        assert!((rect.center_u - 0.5).abs() < 1e-12);
        assert!((rect.center_v - 0.5).abs() < 1e-12);
        assert!((rect.half_u - 0.25 * 1.5).abs() < 1e-12);
        assert!((rect.half_v - 0.5 * 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_wraparound_across_seam() {
        let viewport = Viewport::new(179.0, 0.0, 60.0);
        let tiles = visible_tiles(&viewport, &level(8, 4));
        let cols = columns(&tiles);
        assert!(cols.contains(&0), "col 0 must wrap into view: {cols:?}");
        assert!(cols.contains(&7));

        let tight = visible_tiles_with_margin(&viewport, &level(8, 4), 0.0);
        assert_eq!(columns(&tight), vec![0, 1, 6, 7]);
    }

    #[test]
    fn test_wraparound_left_edge() {
        let tiles = visible_tiles(&Viewport::new(-179.0, 0.0, 30.0), &level(8, 4));
        let cols = columns(&tiles);
        assert!(cols.contains(&7));
        assert!(cols.contains(&0));
    }

    #[test]
    fn test_equator_view_excludes_poles() {
        let tiles = visible_tiles_with_margin(&Viewport::new(0.0, 0.0, 20.0), &level(8, 8), 0.0);
        let rows: HashSet<u32> = tiles.iter().map(|t| t.row).collect();
        assert!(!rows.contains(&0));
        assert!(!rows.contains(&7));
        assert!(rows.contains(&3) && rows.contains(&4));
        // yaw 0 sits on the boundary between columns 3 and 4
        assert_eq!(columns(&tiles), vec![3, 4]);
    }

    #[test]
    fn test_looking_up_selects_whole_top_row() {
        let tiles = visible_tiles(&Viewport::new(0.0, 85.0, 40.0), &level(8, 4));
        let top_row = tiles.iter().filter(|t| t.row == 0).count();
        assert_eq!(top_row, 8);
        assert!(tiles.iter().all(|t| t.row < 2));
    }

    #[test]
    fn test_looking_down_selects_whole_bottom_row() {
        let tiles = visible_tiles(&Viewport::new(90.0, -85.0, 40.0), &level(8, 4));
        let bottom_row = tiles.iter().filter(|t| t.row == 3).count();
        assert_eq!(bottom_row, 8);
        assert!(tiles.iter().all(|t| t.row >= 2));
    }

    #[test]
    fn test_wide_fov_selects_every_column() {
        let tiles = visible_tiles(&Viewport::new(0.0, 0.0, 150.0), &level(8, 4));
        assert_eq!(columns(&tiles).len(), 8);
    }

    #[test]
    fn test_fail_open_on_invalid_grid() {
        let broken = Level::with_grid(1, 2048, 1024, 512, 0, 0);
        let tiles = visible_tiles(&Viewport::new(0.0, 0.0, 60.0), &broken);
        assert_eq!(tiles.len(), 8);
    }

    #[test]
    fn test_fail_open_on_invalid_viewport() {
        let grid = level(4, 2);
        for viewport in [
            Viewport::new(f64::NAN, 0.0, 60.0),
            Viewport::new(0.0, f64::INFINITY, 60.0),
            Viewport::new(0.0, 0.0, 0.0),
        ] {
            assert_eq!(visible_tiles(&viewport, &grid).len(), 8);
        }
    }

    #[test]
    fn test_tiles_carry_level_index() {
        let tiles = visible_tiles(&Viewport::new(10.0, 0.0, 60.0), &level(8, 4));
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| t.level == 2));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_centre_tile_always_visible(
                yaw in -180.0..180.0_f64,
                pitch in -89.0..89.0_f64,
                fov in 5.0..120.0_f64,
                cols in 1u32..32,
                rows in 1u32..16
            ) {
                let grid = level(cols, rows);
                let tiles = visible_tiles(&Viewport::new(yaw, pitch, fov), &grid);

                let u = (yaw + 180.0) / 360.0;
                let v = 1.0 - (pitch + 90.0) / 180.0;
                let col = ((u * cols as f64) as u32).min(cols - 1);
                let row = ((v * rows as f64) as u32).min(rows - 1);
                prop_assert!(tiles.contains(&TileAddress::new(2, col, row)));
                prop_assert!(tiles.iter().all(|t| t.col < cols && t.row < rows));
            }
        }
    }
}
