//! Request/response envelope for upload-processing collaborators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::GeneratorError;
use super::pyramid::{PanoramaSource, PyramidGenerator, TilePyramid, PANORAMA_KEY};

/// What the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorOperation {
    /// Tiles, preview and manifest plus the normalized panorama.
    Process,
    /// Tiles, preview and manifest only.
    Tiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorRequest {
    pub operation: GeneratorOperation,
    /// Encoded source image.
    pub source_image: Vec<u8>,
    pub scene_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorResponse {
    pub success: bool,
    /// Encoded assets by file name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tiles: BTreeMap<String, Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratorResponse {
    pub fn failure(error: &GeneratorError) -> Self {
        Self {
            success: false,
            tiles: BTreeMap::new(),
            manifest: None,
            error: Some(error.to_string()),
        }
    }

    fn from_pyramid(pyramid: TilePyramid) -> Self {
        let manifest = pyramid.manifest_json();
        let mut tiles: BTreeMap<String, Vec<u8>> = pyramid
            .tiles
            .into_iter()
            .map(|tile| (tile.key, tile.data))
            .collect();
        tiles.insert(pyramid.preview.key, pyramid.preview.data);
        if let Some(panorama) = pyramid.panorama {
            tiles.insert(PANORAMA_KEY.to_string(), panorama);
        }

        Self {
            success: true,
            tiles,
            manifest: Some(manifest),
            error: None,
        }
    }
}

/// Run a request end to end. Failures are reported in the response.
pub fn handle_request(generator: &PyramidGenerator, request: &GeneratorRequest) -> GeneratorResponse {
    match run(generator, request) {
        Ok(pyramid) => GeneratorResponse::from_pyramid(pyramid),
        Err(e) => {
            tracing::warn!(
                scene_id = %request.scene_id,
                operation = ?request.operation,
                error = %e,
                "Pyramid generation failed"
            );
            GeneratorResponse::failure(&e)
        }
    }
}

fn run(generator: &PyramidGenerator, request: &GeneratorRequest) -> Result<TilePyramid, GeneratorError> {
    let source = PanoramaSource::decode(
        &request.source_image,
        generator.config().max_source_dimension,
    )?;
    tracing::info!(
        scene_id = %request.scene_id,
        operation = ?request.operation,
        width = source.width(),
        height = source.height(),
        "Processing panorama"
    );

    match request.operation {
        GeneratorOperation::Process => generator.generate_with_panorama(&source),
        GeneratorOperation::Tiles => generator.generate(&source),
    }
}
