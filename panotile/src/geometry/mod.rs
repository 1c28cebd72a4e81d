//! Sphere geometry for equirectangular tiles.
//!
//! Maps camera angles to points on the viewing sphere and pyramid tiles to
//! the sphere patches they are textured onto.
//!
//! Angles follow the equirectangular layout: yaw -180° is the left edge of
//! the image (horizontal angle 0) and pitch +90° is the top edge (polar
//! angle 0).
//!
//! ```text
//!            pitch +90  (θ = 0, row 0)
//!                 │
//!   yaw -180 ─────┼───── yaw +180
//!   (φ = 0)       │      (φ = 2π)
//!            pitch -90  (θ = π, last row)
//! ```

mod patch;

pub use patch::{
    patch_bounds, segments_for_grid, tile_patch, tile_patch_with_fraction, PatchBounds,
    SpherePatch, MAX_SEGMENTS, MIN_SEGMENTS,
};

use std::f64::consts::PI;

/// Point or direction in viewer space (y up).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Converts camera angles to a point on a sphere of `radius`.
///
/// `phi = 90° - pitch` is the polar angle from +y and `theta = yaw + 180°`
/// the horizontal angle from +x towards +z.
#[inline]
pub fn yaw_pitch_to_vector(yaw: f64, pitch: f64, radius: f64) -> Vec3 {
    let phi = (90.0 - pitch).to_radians();
    let theta = (yaw + 180.0).to_radians();

    Vec3 {
        x: radius * phi.sin() * theta.cos(),
        y: radius * phi.cos(),
        z: radius * phi.sin() * theta.sin(),
    }
}

/// Converts a direction back to `(yaw, pitch)` in degrees.
///
/// Inverse of [`yaw_pitch_to_vector`] for any radius. Yaw is normalized to
/// `[-180, 180)`; at the poles yaw is undefined and comes back as whatever
/// `atan2` yields. A zero or non-finite vector maps to `(0, 0)`.
#[inline]
pub fn vector_to_yaw_pitch(vector: Vec3) -> (f64, f64) {
    let radius = vector.length();
    if radius == 0.0 || !radius.is_finite() {
        return (0.0, 0.0);
    }

    let phi = (vector.y / radius).clamp(-1.0, 1.0).acos();
    let theta = vector.z.atan2(vector.x);

    let pitch = 90.0 - phi.to_degrees();
    let yaw = normalize_yaw(theta.to_degrees() - 180.0);
    (yaw, pitch)
}

/// Wraps a yaw angle into `[-180, 180)`.
#[inline]
pub fn normalize_yaw(yaw: f64) -> f64 {
    (yaw + 180.0).rem_euclid(360.0) - 180.0
}

/// Great-circle distance in degrees between two view directions.
pub fn angular_distance(yaw_a: f64, pitch_a: f64, yaw_b: f64, pitch_b: f64) -> f64 {
    let a = yaw_pitch_to_vector(yaw_a, pitch_a, 1.0);
    let b = yaw_pitch_to_vector(yaw_b, pitch_b, 1.0);
    a.dot(&b).clamp(-1.0, 1.0).acos() * 180.0 / PI
}
