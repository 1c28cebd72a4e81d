//! Viewport resolution.
//!
//! Decides which pyramid level the camera needs and which of its tiles are
//! in view, with a prefetch margin around the visible area.
//!
//! ```text
//! Viewport { yaw, pitch, fov }
//!     │
//!     ├─► select_level(fov, level_count) ──► Level
//!     │                                        │
//!     └─► UvRect (margin, seam wrap) ──────────┴─► visible_tiles ──► desired set
//! ```
//!
//! [`ViewportResolver`] wraps both steps and throttles recomputation so
//! rapid drag gestures do not recompute visibility on every frame.

mod level;
mod resolver;
mod visibility;

pub use level::select_level;
pub use resolver::{Resolution, ViewportResolver};
pub use visibility::{visible_tiles, visible_tiles_with_margin, UvRect};

use crate::geometry::{normalize_yaw, yaw_pitch_to_vector, Vec3};

/// Camera orientation and zoom, all in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Horizontal angle in `[-180, 180]`
    pub yaw: f64,
    /// Vertical angle in `[-90, 90]`
    pub pitch: f64,
    /// Field of view
    pub fov: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            fov: 75.0,
        }
    }
}

impl Viewport {
    pub fn new(yaw: f64, pitch: f64, fov: f64) -> Self {
        Self { yaw, pitch, fov }
    }

    /// Whether every component is finite and the field of view positive.
    pub fn is_usable(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite() && self.fov.is_finite() && self.fov > 0.0
    }

    /// Copy with yaw wrapped to `[-180, 180)` and pitch clamped to `[-90, 90]`.
    pub fn normalized(&self) -> Self {
        Self {
            yaw: normalize_yaw(self.yaw),
            pitch: self.pitch.clamp(-90.0, 90.0),
            fov: self.fov,
        }
    }

    /// Point on the sphere the camera looks at.
    pub fn direction(&self, radius: f64) -> Vec3 {
        yaw_pitch_to_vector(self.yaw, self.pitch, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized() {
        let viewport = Viewport::new(270.0, 120.0, 60.0).normalized();
        assert!((viewport.yaw + 90.0).abs() < 1e-12);
        assert_eq!(viewport.pitch, 90.0);
        assert_eq!(viewport.fov, 60.0);
    }

    #[test]
    fn test_is_usable() {
        assert!(Viewport::default().is_usable());
        assert!(!Viewport::new(0.0, 0.0, -10.0).is_usable());
        assert!(!Viewport::new(f64::NAN, 0.0, 60.0).is_usable());
    }

    #[test]
    fn test_direction() {
        let v = Viewport::new(-180.0, 0.0, 60.0).direction(2.0);
        assert!((v.x - 2.0).abs() < 1e-12);
    }
}
