//! Geometry primitives and tile pyramid math shared by the karta crates.
//!
//! * [`tile_math`] converts between geographic coordinates, tile indices of a pyramid with an
//!   arbitrary [zoom base](ZoomBase) and planar Web Mercator meters.
//! * [`Rect`] is an axis-aligned rectangle used for envelopes, tile bounds and label boxes.

pub mod rect;
pub mod tile_math;

pub use rect::Rect;
pub use tile_math::ZoomBase;

/// Point in a cartesian space (map meters or raster pixels).
pub type Point2 = nalgebra::Point2<f64>;

/// Vector in a cartesian space.
pub type Vector2 = nalgebra::Vector2<f64>;
