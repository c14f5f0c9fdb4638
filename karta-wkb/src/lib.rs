//! Reader for the binary tile payloads consumed by the karta renderer.
//!
//! A payload carries one or more tiles. Every tile is a list of [`MapObject`]s, each object has
//! JSON-encoded [`ObjectInfo`] (envelope, center, tags) and an optional geometry in a compact
//! little-endian WKB-like encoding that is read by the [`GeometryWalker`].
//!
//! ```
//! use karta_wkb::{GeometryWalker, GeometryType, WalkMode};
//! use karta_wkb::writer::GeometryWriter;
//!
//! let mut writer = GeometryWriter::new();
//! writer.point(1.0, 2.0);
//! let bytes = writer.finish();
//!
//! let mut walker = GeometryWalker::new(&bytes);
//! assert_eq!(walker.walk(&mut WalkMode::Skip)?, GeometryType::Point);
//! assert_eq!(walker.offset(), 12);
//! # Ok::<(), karta_wkb::error::WkbError>(())
//! ```

pub mod error;
mod geometry;
mod object;
mod payload;
mod reader;
pub mod writer;

pub use geometry::{Geometry, GeometrySink, GeometryType, GeometryWalker, WalkMode, MAX_NESTING};
pub use object::{Center, DecodedTile, Envelope, MapObject, ObjectInfo, ObjectType, TagValue};
pub use payload::{decode_payload, decode_tile_objects};
