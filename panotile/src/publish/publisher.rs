//! All-or-nothing pyramid publication.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};

use super::error::PublishError;
use crate::generator::{PanoramaSource, PyramidGenerator, TilePyramid, PANORAMA_KEY};
use crate::store::{ObjectStore, SceneStore};

/// Uploads running at once.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// Result of a successful publication.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedScene {
    pub scene_id: String,
    /// Panorama locator, or the preview's when no panorama was generated.
    pub main_url: String,
    /// Manifest as stored on the scene, with every tile URL filled in.
    pub manifest: serde_json::Value,
    pub uploaded: usize,
}

/// Uploads a pyramid and only then points the scene at it.
pub struct PyramidPublisher {
    objects: Arc<dyn ObjectStore>,
    scenes: Arc<dyn SceneStore>,
    prefix: String,
    upload_concurrency: usize,
}

impl PyramidPublisher {
    pub fn new(objects: Arc<dyn ObjectStore>, scenes: Arc<dyn SceneStore>) -> Self {
        Self {
            objects,
            scenes,
            prefix: String::new(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Key prefix in front of `{scene_id}/{file}`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    /// Storage key of one asset.
    pub fn object_key(&self, scene_id: &str, file: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}/{}", scene_id, file)
        } else {
            format!("{}/{}/{}", self.prefix, scene_id, file)
        }
    }

    /// Decode, generate (with panorama) and publish in one go.
    pub async fn process_and_publish(
        &self,
        generator: &PyramidGenerator,
        scene_id: &str,
        source_image: &[u8],
    ) -> Result<PublishedScene, PublishError> {
        let source = PanoramaSource::decode(source_image, generator.config().max_source_dimension)?;
        let pyramid = generator.generate_with_panorama(&source)?;
        self.publish(scene_id, &pyramid).await
    }

    /// Upload every asset of `pyramid`, then update the scene.
    ///
    /// The first failed upload aborts the rest and leaves the scene as it
    /// was; objects already written are not removed.
    pub async fn publish(
        &self,
        scene_id: &str,
        pyramid: &TilePyramid,
    ) -> Result<PublishedScene, PublishError> {
        let tile_type = pyramid.manifest.tile_format.content_type();
        let mut assets: Vec<(String, Bytes, &'static str)> = pyramid
            .tiles
            .iter()
            .map(|tile| (tile.key.clone(), Bytes::from(tile.data.clone()), tile_type))
            .collect();
        assets.push((
            pyramid.preview.key.clone(),
            Bytes::from(pyramid.preview.data.clone()),
            "image/jpeg",
        ));
        if let Some(panorama) = &pyramid.panorama {
            assets.push((
                PANORAMA_KEY.to_string(),
                Bytes::from(panorama.clone()),
                "image/jpeg",
            ));
        }
        let uploaded = assets.len();

        tracing::info!(
            scene_id = %scene_id,
            assets = uploaded,
            bytes = pyramid.total_bytes(),
            "Publishing tile pyramid"
        );

        let objects = &self.objects;
        let urls: HashMap<String, String> = stream::iter(assets)
            .map(|(file, data, content_type)| {
                let key = self.object_key(scene_id, &file);
                async move {
                    match objects.put(&key, data, content_type).await {
                        Ok(url) => Ok((file, url)),
                        Err(e) => Err(PublishError::Upload {
                            key,
                            reason: e.to_string(),
                        }),
                    }
                }
            })
            .buffer_unordered(self.upload_concurrency)
            .try_collect()
            .await
            .inspect_err(|e| {
                tracing::warn!(scene_id = %scene_id, error = %e, "Publication aborted");
            })?;

        let mut wire = pyramid
            .manifest
            .to_wire()
            .with_urls(|tile| urls.get(&tile.key).cloned());
        wire.preview = urls.get(&pyramid.preview.key).cloned();
        let manifest = wire.to_value();

        let main_url = urls
            .get(PANORAMA_KEY)
            .or_else(|| urls.get(&pyramid.preview.key))
            .cloned()
            .unwrap_or_default();

        self.scenes
            .update_scene_images(scene_id, &main_url, &manifest)
            .await
            .map_err(|e| PublishError::SceneUpdate(e.to_string()))?;

        tracing::info!(scene_id = %scene_id, main_url = %main_url, "Published scene");

        Ok(PublishedScene {
            scene_id: scene_id.to_string(),
            main_url,
            manifest,
            uploaded,
        })
    }
}
