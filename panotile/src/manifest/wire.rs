//! Serialized manifest shape written by the generator.
//!
//! ```json
//! { "type": "multires", "tileSize": 512,
//!   "dimensions": {"width": 4096, "height": 2048},
//!   "preview": "<locator>",
//!   "levels": [{"level":0,"width":1024,"height":512,"tilesX":2,"tilesY":1}],
//!   "tiles": [{"level":0,"col":0,"row":0,"key":"l0_0_0.jpg"}] }
//! ```

use serde::{Deserialize, Serialize};

use super::model::{Manifest, TileAddress};
use super::naming::tile_key;

/// Value of the `type` field for tiled manifests.
pub const MULTIRES_TYPE: &str = "multires";

/// Canonical wire form of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireManifest {
    #[serde(rename = "type")]
    pub kind: String,
    pub tile_size: u32,
    pub dimensions: WireDimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap: Option<u32>,
    pub levels: Vec<WireLevel>,
    pub tiles: Vec<WireTile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLevel {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTile {
    pub level: u32,
    pub col: u32,
    pub row: u32,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WireManifest {
    /// Serialize to a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        // Plain structs of strings and integers always serialize.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Replace every tile locator with the one returned by `locate`.
    ///
    /// Used after publication, when each tile key maps to an uploaded URL.
    pub fn with_urls(mut self, mut locate: impl FnMut(&WireTile) -> Option<String>) -> Self {
        for tile in &mut self.tiles {
            if let Some(url) = locate(tile) {
                tile.url = Some(url);
            }
        }
        self
    }
}

impl Manifest {
    /// Wire form listing every tile of every level.
    pub fn to_wire(&self) -> WireManifest {
        let levels = self
            .levels
            .iter()
            .map(|level| {
                let (cols, rows) = level.effective_grid();
                WireLevel {
                    level: level.index,
                    width: level.width,
                    height: level.height,
                    tiles_x: cols,
                    tiles_y: rows,
                }
            })
            .collect();

        let tiles = self
            .levels
            .iter()
            .flat_map(|level| level.tiles())
            .map(|address| self.wire_tile(address))
            .collect();

        WireManifest {
            kind: MULTIRES_TYPE.to_string(),
            tile_size: self.tile_size,
            dimensions: WireDimensions {
                width: self.original_width,
                height: self.original_height,
            },
            preview: self.preview_locator.clone(),
            format: self.tile_format.extension().to_string(),
            base_path: (!self.base_path.is_empty()).then(|| self.base_path.clone()),
            overlap: self.overlap_px,
            levels,
            tiles,
        }
    }

    fn wire_tile(&self, address: TileAddress) -> WireTile {
        let url = self
            .explicit_tiles
            .as_ref()
            .and_then(|tiles| tiles.get(&address))
            .cloned();
        WireTile {
            level: address.level,
            col: address.col,
            row: address.row,
            key: tile_key(address, self.tile_format),
            url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures::three_level_manifest;
    use crate::manifest::parse_manifest;

    #[test]
    fn test_wire_field_names() {
        let value = three_level_manifest().to_wire().to_value();

        assert_eq!(value["type"], "multires");
        assert_eq!(value["tileSize"], 512);
        assert_eq!(value["dimensions"]["width"], 4096);
        assert_eq!(value["levels"][1]["tilesX"], 4);
        assert_eq!(value["levels"][1]["tilesY"], 2);
        assert_eq!(value["tiles"][0]["key"], "l0_0_0.jpg");
        assert!(value["tiles"][0].get("url").is_none());
        assert!(value.get("overlap").is_none());
    }

    #[test]
    fn test_wire_lists_every_tile() {
        let wire = three_level_manifest().to_wire();
        // 2x1 + 4x2 + 8x4
        assert_eq!(wire.tiles.len(), 2 + 8 + 32);
        assert!(wire
            .tiles
            .iter()
            .any(|t| t.level == 2 && t.col == 5 && t.row == 1 && t.key == "l2_1_5.jpg"));
    }

    #[test]
    fn test_wire_reparses_to_same_manifest() {
        let manifest = three_level_manifest();
        let parsed = parse_manifest(&manifest.to_wire().to_value(), &[]).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_with_urls() {
        let wire = three_level_manifest()
            .to_wire()
            .with_urls(|tile| (tile.level == 0).then(|| format!("https://cdn/{}", tile.key)));

        assert_eq!(wire.tiles[0].url.as_deref(), Some("https://cdn/l0_0_0.jpg"));
        assert!(wire.tiles.iter().filter(|t| t.level > 0).all(|t| t.url.is_none()));
    }
}
