//! Storage collaborator contracts.
//!
//! The crate persists nothing itself. Hosts plug in their object storage
//! and scene database through these traits:
//!
//! ```text
//! PyramidPublisher ──► ObjectStore::put(key, bytes, content_type) ──► url
//!        │
//!        └──────────► SceneStore::update_scene_images(id, main_url, manifest)
//! ```
//!
//! [`MemoryObjectStore`] and [`MemorySceneStore`] keep everything in memory
//! for tests and local tooling.

mod memory;

pub use memory::{MemoryObjectStore, MemorySceneStore, StoredObject};

use bytes::Bytes;
use thiserror::Error;

use crate::streaming::BoxFuture;

/// Errors reported by storage collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("scene not found: {0}")]
    SceneNotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A scene as persisted by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRecord {
    pub id: String,
    /// Locator of the full panorama (or preview) image.
    pub main_url: Option<String>,
    /// Stored manifest blob, in whatever shape its producer wrote.
    pub tiles_manifest: Option<serde_json::Value>,
}

impl SceneRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            main_url: None,
            tiles_manifest: None,
        }
    }
}

/// Blob storage addressed by key.
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, returning its public locator.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> BoxFuture<'_, Result<String, StoreError>>;
}

/// Scene persistence.
pub trait SceneStore: Send + Sync {
    fn get_scene(&self, id: &str) -> BoxFuture<'_, Result<SceneRecord, StoreError>>;

    /// Point a scene at newly published images.
    fn update_scene_images(
        &self,
        id: &str,
        main_url: &str,
        manifest: &serde_json::Value,
    ) -> BoxFuture<'_, Result<(), StoreError>>;
}
