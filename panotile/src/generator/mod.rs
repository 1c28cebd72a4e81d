//! Tile pyramid generation.
//!
//! Turns one equirectangular source image into everything a viewer needs:
//!
//! ```text
//! source bytes ──► PanoramaSource ──► normalize to 2:1 (Lanczos3)
//!                                          │
//!                        ┌─────────────────┼──────────────────┐
//!                        ▼                 ▼                  ▼
//!                 level 0 .. N-2      top level          preview
//!                  (resampled)     (normalized as-is)   (512×256)
//!                        │                 │                  │
//!                        └──► slice ──► encode in batches ◄───┘
//!                                          │
//!                                          ▼
//!                                TilePyramid + Manifest
//! ```
//!
//! Tiles are encoded on the rayon pool, at most `encode_batch_size` at a
//! time. Generation is all-or-nothing: the first error aborts the pyramid.

mod encoder;
mod error;
mod pyramid;
mod request;

pub use encoder::{ImageTileEncoder, TileEncoder};
pub use error::GeneratorError;
pub use pyramid::{
    plan_levels, GeneratedTile, PanoramaSource, PreviewImage, PyramidGenerator, PyramidPlan,
    TilePyramid, PANORAMA_KEY, PREVIEW_KEY, PREVIEW_LEVEL,
};
pub use request::{handle_request, GeneratorOperation, GeneratorRequest, GeneratorResponse};
