//! Tile pyramid manifests.
//!
//! A manifest describes a scene's pyramid: its levels, tile size, panorama
//! dimensions, preview image and how to locate every tile.
//!
//! ```text
//! stored blob ──► parse_manifest_str ──► Manifest ◄── Manifest::to_wire ──► JSON
//!   (object, string,     │                   │
//!    double-encoded)     │                   └──► tile_locator(address)
//!                        ▼
//!             ManifestError ──► SceneSource::PreviewOnly
//! ```
//!
//! Producers have written manifests with differing key spellings over time,
//! so the parser resolves every field through an ordered list of accepted
//! keys. Any parse failure degrades the scene to its preview image; see
//! [`load_scene_source`].

mod error;
mod model;
mod naming;
mod parser;
mod wire;

pub use error::ManifestError;
pub use model::{Level, Manifest, TileAddress, TileFormat, DEFAULT_TILE_SIZE};
pub use naming::{
    file_name, join_locator, parent_locator, parse_tile_key, tile_key, DiscoveredTile,
    ParsedTileKey,
};
pub use parser::{load_scene_source, parse_manifest, parse_manifest_str, SceneSource};
pub use wire::{WireDimensions, WireLevel, WireManifest, WireTile, MULTIRES_TYPE};
