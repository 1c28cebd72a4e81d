//! Publishing generated pyramids.
//!
//! ```text
//! TilePyramid ──► upload every asset (bounded, unordered) ──► url per key
//!                                                               │
//!                      manifest with tile URLs ◄────────────────┘
//!                               │
//!                               ▼
//!                 SceneStore::update_scene_images
//! ```
//!
//! A partial pyramid is never published: the scene only changes after
//! every upload has succeeded.

mod error;
mod publisher;

pub use error::PublishError;
pub use publisher::{PublishedScene, PyramidPublisher, DEFAULT_UPLOAD_CONCURRENCY};
