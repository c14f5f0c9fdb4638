//! Karta renders styled vector map tiles into raster images.
//!
//! Rendering a tile goes through these stages:
//!
//! * A [`TileLoader`] fetches raw payloads of data layers over HTTP (or from anywhere else), and
//!   the [`tile_provider`] caches them, remembers void areas and decodes them in a worker pool.
//! * A [`Style`] describes which data layers to draw at which zoom levels and how, with
//!   properties computed from per-object formulas.
//! * The [compositor](render::Compositor) draws the objects onto a raster, places labels and
//!   icons without overlaps and keeps a hidden *save surface* that maps pixels back to objects.
//!
//! The [`RenderEngine`] ties it all together. A host creates tiles through the [`TileLifecycle`]
//! trait and receives the results through a [`Messenger`]:
//!
//! ```no_run
//! use karta::{EngineBuilder, EngineConfig, TileCoords, TileLifecycle};
//!
//! # async fn run() -> Result<(), karta::KartaError> {
//! let config = EngineConfig {
//!     tile_url: "https://example.com/tiles/{key}/{value}/{z}/{x}/{y}".into(),
//!     style_url: "https://example.com/styles/{style_id}.json".into(),
//!     ..Default::default()
//! };
//!
//! let engine = EngineBuilder::new(config).build()?;
//! let handle = engine.create_tile(TileCoords::new(4, 5, 3));
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```

mod async_runtime;
mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod messenger;
pub mod placement;
pub mod platform;
pub mod render;
pub mod style;
pub mod tile;
pub mod tile_provider;

#[cfg(test)]
mod tests;

pub use color::Color;
pub use config::EngineConfig;
pub use engine::{EngineBuilder, RenderContext, RenderEngine, TileHandle, TileLifecycle};
pub use error::KartaError;
pub use messenger::{DummyMessenger, Messenger};
pub use render::RenderedTile;
pub use style::{Style, StyleDocument};
pub use tile::{DataLayerId, TileCoords, TileKey, TileRequest};
pub use tile_provider::loader::{AssetKind, TileLoader, WebTileLoader};

pub use karta_types;
pub use karta_wkb;
