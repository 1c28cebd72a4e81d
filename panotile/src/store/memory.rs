//! In-memory storage collaborators.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use parking_lot::Mutex;

use super::{ObjectStore, SceneRecord, SceneStore, StoreError};
use crate::streaming::BoxFuture;

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

/// Object store backed by a map; URLs are `{base_url}/{key}`.
#[derive(Debug)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every `put` to `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing.lock().insert(key.into());
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> BoxFuture<'_, Result<String, StoreError>> {
        let result = if self.failing.lock().contains(key) {
            Err(StoreError::Backend(format!("write to {} rejected", key)))
        } else {
            self.objects.lock().insert(
                key.to_string(),
                StoredObject {
                    data,
                    content_type: content_type.to_string(),
                },
            );
            Ok(format!("{}/{}", self.base_url, key))
        };
        Box::pin(async move { result })
    }
}

/// Scene store backed by a map.
#[derive(Debug, Default)]
pub struct MemorySceneStore {
    scenes: Mutex<HashMap<String, SceneRecord>>,
    updates: Mutex<u64>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, scene: SceneRecord) {
        self.scenes.lock().insert(scene.id.clone(), scene);
    }

    /// Number of successful `update_scene_images` calls.
    pub fn update_count(&self) -> u64 {
        *self.updates.lock()
    }
}

impl SceneStore for MemorySceneStore {
    fn get_scene(&self, id: &str) -> BoxFuture<'_, Result<SceneRecord, StoreError>> {
        let result = self
            .scenes
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SceneNotFound(id.to_string()));
        Box::pin(async move { result })
    }

    fn update_scene_images(
        &self,
        id: &str,
        main_url: &str,
        manifest: &serde_json::Value,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let result = match self.scenes.lock().get_mut(id) {
            Some(scene) => {
                scene.main_url = Some(main_url.to_string());
                scene.tiles_manifest = Some(manifest.clone());
                *self.updates.lock() += 1;
                Ok(())
            }
            None => Err(StoreError::SceneNotFound(id.to_string())),
        };
        Box::pin(async move { result })
    }
}
