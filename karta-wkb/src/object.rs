use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use karta_types::{Point2, Rect};
use serde::{Deserialize, Serialize};

/// Bounding box of an object in projected meters.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Minimum x.
    pub left: f64,
    /// Maximum x.
    pub right: f64,
    /// Maximum y.
    pub top: f64,
    /// Minimum y.
    pub bottom: f64,
}

impl Envelope {
    /// Envelope as a normalized rectangle.
    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.bottom, self.right, self.top)
    }
}

/// Anchor point of an object in projected meters. Point labels and icons are placed here.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Center {
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
}

impl From<Center> for Point2 {
    fn from(value: Center) -> Self {
        Point2::new(value.x, value.y)
    }
}

/// Value of an object tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// Boolean tag.
    Bool(bool),
    /// Numeric tag.
    Number(f64),
    /// Text tag.
    String(String),
}

impl Display for TagValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Number(v) => write!(f, "{v}"),
            TagValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl TagValue {
    /// Compares the value with its string representation.
    pub fn eq_str(&self, str_value: &str) -> bool {
        match self {
            TagValue::String(s) => s == str_value,
            TagValue::Number(v) => str_value.parse::<f64>() == Ok(*v),
            TagValue::Bool(v) => str_value.parse::<bool>() == Ok(*v),
        }
    }

    /// Numeric value, parsing strings if necessary.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TagValue::Number(v) => Some(*v),
            TagValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            TagValue::String(s) => s.trim().parse().ok(),
        }
    }
}

/// Attributes of a map object, stored as JSON in the payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectInfo {
    #[serde(rename = "Envelope", default)]
    /// Bounding box of the geometry.
    pub envelope: Envelope,
    #[serde(rename = "Center", default)]
    /// Anchor of icons and point labels.
    pub center: Center,
    /// Attributes available to style formulas.
    #[serde(default)]
    pub tags: HashMap<String, TagValue>,
    /// Length of a line object in meters. Only line objects carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    /// Stable object identifier used for the save surface colors and random seeds.
    #[serde(rename = "Hash", default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<u32>,
    /// Orientation of the object in degrees.
    #[serde(rename = "Angle", default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
}

impl ObjectInfo {
    /// Tag by name.
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}

/// Kind of a map object as seen by the style.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Point or multi-point.
    Point,
    /// Line or multi-line.
    Line,
    /// Polygon or multi-polygon.
    Polygon,
}

/// Single feature of a tile.
///
/// Geometry bytes are kept encoded and are walked every time the object is drawn.
#[derive(Debug, Clone)]
pub struct MapObject {
    /// Encoded geometry record, or `None` for a pure point located at [`ObjectInfo::center`].
    pub geometry: Option<Bytes>,
    /// Attributes of the object.
    pub info: Arc<ObjectInfo>,
}

impl MapObject {
    /// Object type, inferred from the presence of the geometry and the `length` attribute.
    pub fn object_type(&self) -> ObjectType {
        match (&self.geometry, self.info.length) {
            (None, _) => ObjectType::Point,
            (Some(_), Some(_)) => ObjectType::Line,
            (Some(_), None) => ObjectType::Polygon,
        }
    }
}

/// Objects of one tile as they were decoded from a payload.
#[derive(Debug, Clone)]
pub struct DecodedTile {
    /// Tile column.
    pub x: u32,
    /// Tile row.
    pub y: u32,
    /// Tile level.
    pub z: u32,
    /// Level the geometry was generalized for.
    pub detail_zoom: u32,
    /// Objects in payload order.
    pub objects: Vec<MapObject>,
}
