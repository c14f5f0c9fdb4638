//! Tile identifiers.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Index of a display tile as requested by the host. `x` and `y` may lie outside of the world and
/// are wrapped when data is requested.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoords {
    /// Column.
    pub x: i64,
    /// Row, growing southwards.
    pub y: i64,
    /// Zoom level.
    pub z: u32,
}

impl TileCoords {
    /// Creates new coordinates.
    pub fn new(x: i64, y: i64, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Coordinates wrapped into `0..2^z`.
    pub fn wrapped(&self) -> (u32, u32) {
        let n = 1i64 << self.z.min(31);
        (self.x.rem_euclid(n) as u32, self.y.rem_euclid(n) as u32)
    }
}

/// Logical dataset a style layer reads from. Displayed as `key=value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataLayerId {
    key: Arc<str>,
    value: Arc<str>,
}

impl DataLayerId {
    /// Creates a new id.
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Dataset key, substituted for `{key}` in url templates.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Dataset value, substituted for `{value}` in url templates.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Display for DataLayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Index of a backing data tile inside of a data layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Zoom level of the tile index.
    pub z: u32,
    /// Zoom level at which the geometry was captured.
    pub detail_zoom: u32,
}

impl TileKey {
    /// Creates a new key.
    pub fn new(x: u32, y: u32, z: u32, detail_zoom: u32) -> Self {
        Self {
            x,
            y,
            z,
            detail_zoom,
        }
    }

    /// True if `other` is this tile or one of its descendants.
    pub fn contains(&self, other: &TileKey) -> bool {
        if other.z < self.z {
            return false;
        }

        let shift = other.z - self.z;
        shift < 32 && other.x >> shift == self.x && other.y >> shift == self.y
    }

    /// True if one of the tiles contains the other.
    pub fn is_related(&self, other: &TileKey) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Area of the tile measured in level-16 tiles: `4^(16 - z)`.
    pub fn weight(&self) -> f64 {
        4f64.powi(16 - self.z as i32)
    }
}

impl Display for TileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}@{}", self.z, self.x, self.y, self.detail_zoom)
    }
}

/// One logical fetch unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileRequest {
    /// Dataset to fetch from.
    pub layer: DataLayerId,
    /// Tile to fetch.
    pub key: TileKey,
}
