//! Sphere patches for individual tiles.
//!
//! Each tile covers `2π / cols` horizontally and `π / rows` vertically.
//! Patches are widened by a small overlap on every side so neighbouring
//! tiles never leave a visible seam, and are built with inward-facing
//! normals and winding so they render from inside the sphere.

use std::f64::consts::{PI, TAU};

use crate::config::DEFAULT_OVERLAP_FRACTION;
use crate::manifest::Level;

/// Fewest segments along either patch axis.
pub const MIN_SEGMENTS: u32 = 2;

/// Most segments along either patch axis.
pub const MAX_SEGMENTS: u32 = 32;

/// Minimum segments across the whole sphere horizontally.
const SPHERE_WIDTH_SEGMENTS: u32 = 64;

/// Minimum segments across the whole sphere vertically.
const SPHERE_HEIGHT_SEGMENTS: u32 = 32;

/// Segments contributed by every grid cell.
const SEGMENTS_PER_CELL: u32 = 8;

/// Tolerance for treating a patch edge as a pole.
const POLE_EPSILON: f64 = 1e-9;

/// Angular footprint of a patch.
///
/// `phi` is the horizontal angle in `[0, 2π]`, `theta` the polar angle in
/// `[0, π]` measured from the zenith.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchBounds {
    pub phi_start: f64,
    pub phi_length: f64,
    pub theta_start: f64,
    pub theta_length: f64,
}

impl PatchBounds {
    pub fn phi_end(&self) -> f64 {
        self.phi_start + self.phi_length
    }

    pub fn theta_end(&self) -> f64 {
        self.theta_start + self.theta_length
    }
}

/// Footprint of tile `(col, row)` widened by `overlap_fraction` of a tile.
///
/// Returns `None` if the tile lies outside the level's grid.
pub fn patch_bounds(
    level: &Level,
    col: u32,
    row: u32,
    overlap_fraction: f64,
) -> Option<PatchBounds> {
    let (cols, rows) = level.effective_grid();
    if col >= cols || row >= rows {
        return None;
    }

    let fraction = if overlap_fraction.is_finite() {
        overlap_fraction.max(0.0)
    } else {
        0.0
    };

    let tile_phi = TAU / cols as f64;
    let tile_theta = PI / rows as f64;
    let overlap_phi = tile_phi * fraction;
    let overlap_theta = tile_theta * fraction;

    let phi_start = (col as f64 * tile_phi - overlap_phi).max(0.0);
    let phi_end = ((col + 1) as f64 * tile_phi + overlap_phi).min(TAU);
    let theta_start = (row as f64 * tile_theta - overlap_theta).max(0.0);
    let theta_end = ((row + 1) as f64 * tile_theta + overlap_theta).min(PI);

    Some(PatchBounds {
        phi_start,
        phi_length: phi_end - phi_start,
        theta_start,
        theta_length: theta_end - theta_start,
    })
}

/// Segments per patch `(width, height)` for a grid.
///
/// Every level resolves the sphere with at least 64×32 segments overall so
/// the silhouette of coarse levels stays smooth.
pub fn segments_for_grid(cols: u32, rows: u32) -> (u32, u32) {
    let cols = cols.max(1);
    let rows = rows.max(1);
    let width = SPHERE_WIDTH_SEGMENTS
        .max(cols.saturating_mul(SEGMENTS_PER_CELL))
        .div_ceil(cols);
    let height = SPHERE_HEIGHT_SEGMENTS
        .max(rows.saturating_mul(SEGMENTS_PER_CELL))
        .div_ceil(rows);
    (
        width.clamp(MIN_SEGMENTS, MAX_SEGMENTS),
        height.clamp(MIN_SEGMENTS, MAX_SEGMENTS),
    )
}

/// Inward-facing partial sphere mesh for one tile.
///
/// Texture coordinates are in image space (origin top-left) relative to the
/// tile, so the tile image maps onto the patch without flipping. Triangles
/// wind counter-clockwise when viewed from the sphere's centre.
#[derive(Debug, Clone, PartialEq)]
pub struct SpherePatch {
    pub bounds: PatchBounds,
    pub radius: f64,
    pub width_segments: u32,
    pub height_segments: u32,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl SpherePatch {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Patch for a tile using the manifest overlap in pixels.
///
/// Without an explicit overlap a fraction of [`DEFAULT_OVERLAP_FRACTION`] of
/// a tile is used.
pub fn tile_patch(
    level: &Level,
    col: u32,
    row: u32,
    overlap_px: Option<u32>,
    radius: f64,
) -> Option<SpherePatch> {
    let fraction = match overlap_px {
        Some(px) if level.tile_size > 0 => px as f64 / level.tile_size as f64,
        _ => DEFAULT_OVERLAP_FRACTION,
    };
    tile_patch_with_fraction(level, col, row, fraction, radius)
}

/// Patch for a tile with the overlap given as a fraction of one tile.
pub fn tile_patch_with_fraction(
    level: &Level,
    col: u32,
    row: u32,
    overlap_fraction: f64,
    radius: f64,
) -> Option<SpherePatch> {
    let bounds = patch_bounds(level, col, row, overlap_fraction)?;
    let (cols, rows) = level.effective_grid();
    let (width_segments, height_segments) = segments_for_grid(cols, rows);

    // Unwidened cell for texture coordinates
    let tile_phi = TAU / cols as f64;
    let tile_theta = PI / rows as f64;
    let cell_phi = col as f64 * tile_phi;
    let cell_theta = row as f64 * tile_theta;

    let vertex_count = ((width_segments + 1) * (height_segments + 1)) as usize;
    let mut positions = Vec::with_capacity(vertex_count);
    let mut normals = Vec::with_capacity(vertex_count);
    let mut uvs = Vec::with_capacity(vertex_count);

    for iy in 0..=height_segments {
        let theta = bounds.theta_start + bounds.theta_length * iy as f64 / height_segments as f64;
        let v = ((theta - cell_theta) / tile_theta).clamp(0.0, 1.0);

        for ix in 0..=width_segments {
            let phi = bounds.phi_start + bounds.phi_length * ix as f64 / width_segments as f64;
            let u = ((phi - cell_phi) / tile_phi).clamp(0.0, 1.0);

            let x = theta.sin() * phi.cos();
            let y = theta.cos();
            let z = theta.sin() * phi.sin();

            positions.push([
                (radius * x) as f32,
                (radius * y) as f32,
                (radius * z) as f32,
            ]);
            normals.push([-x as f32, -y as f32, -z as f32]);
            uvs.push([u as f32, v as f32]);
        }
    }

    let touches_north = bounds.theta_start <= POLE_EPSILON;
    let touches_south = bounds.theta_end() >= PI - POLE_EPSILON;
    let stride = width_segments + 1;
    let mut indices = Vec::with_capacity((width_segments * height_segments * 6) as usize);

    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * stride + ix;
            let b = a + 1;
            let c = a + stride;
            let d = c + 1;

            // Rows touching a pole collapse to a point along one edge
            if !(iy == 0 && touches_north) {
                indices.extend_from_slice(&[a, c, b]);
            }
            if !(iy == height_segments - 1 && touches_south) {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    Some(SpherePatch {
        bounds,
        radius,
        width_segments,
        height_segments,
        positions,
        normals,
        uvs,
        indices,
    })
}
