//! Panotile - tile pyramids for 360° panoramas
//!
//! This library covers both halves of multi-resolution panorama delivery:
//!
//! - **Authoring**: [`generator`] turns an equirectangular source image into
//!   a pyramid of fixed-size tiles, a low-resolution preview and a manifest,
//!   and [`publish`] uploads the result through the storage collaborators.
//! - **Viewing**: [`manifest`] parses whatever manifest a producer wrote,
//!   [`viewport`] decides which tiles the camera needs, [`streaming`] fetches,
//!   caches and evicts them under bounded concurrency, and [`geometry`] maps
//!   every tile to an inward-facing sphere patch for the renderer.
//!
//! ```text
//! source image ──► generator ──► tiles + manifest ──► object storage
//!                                                        │
//!        renderer ◄── geometry ◄── streaming ◄── viewport ◄── manifest
//! ```
//!
//! The crate does not draw anything itself; hosts hand the renderable patches
//! to whatever 3D renderer they use.

pub mod config;
pub mod generator;
pub mod geometry;
pub mod logging;
pub mod manifest;
pub mod publish;
pub mod store;
pub mod streaming;
pub mod telemetry;
pub mod viewport;
