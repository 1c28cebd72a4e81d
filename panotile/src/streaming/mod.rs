//! Viewport-driven tile streaming.
//!
//! The streamer keeps a bounded cache of decoded tiles in line with the
//! desired set produced by the viewport resolver:
//!
//! ```text
//!                      ┌──────────── TileStreamer ─────────────┐
//! desired set ──────►  │ reconcile ──► LoadQueue ──► dispatch  │
//! (per recompute)      │    │                          │       │
//!                      │    │ evict (cooldown / LRU)   ▼       │
//!                      │    ▼                     tokio task   │
//!                      │ entries ◄── upload ◄── decode ◄ fetch │──► TileFetcher
//!                      └────│──────────────────────────────────┘     (HTTP / file)
//!                           ▼
//!                     RenderablePatch ──► renderer
//! ```
//!
//! At most `max_concurrent_loads` fetches run at once. Loaded tiles that
//! leave the desired set stay for a cooldown before eviction, and the cache
//! never holds more than `cache_limit` entries after a reconcile.
//! [`PanoramaView`] wraps the resolver and the streamer for a render loop.

mod error;
mod fetcher;
mod queue;
mod state;
mod streamer;
mod texture;
mod view;

pub use error::TileFetchError;
pub use fetcher::{BoxFuture, FileTileFetcher, HttpTileFetcher, TileFetcher, DEFAULT_FETCH_TIMEOUT};
pub use queue::{LoadPriority, LoadQueue, LoadRequest};
pub use state::{CacheEntry, ReconcileReport, RenderablePatch, TileState};
pub use streamer::TileStreamer;
pub use texture::{decode_tile, CpuTextureUploader, TextureUploader};
pub use view::PanoramaView;
