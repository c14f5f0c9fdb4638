//! Encoders producing the binary format read by this crate.
//!
//! Used by tile fixtures and by in-memory tile sources.

use bytes::{BufMut, Bytes};

use crate::geometry::GeometryType;
use crate::object::ObjectInfo;

/// Builds a geometry record.
#[derive(Debug, Default)]
pub struct GeometryWriter {
    buffer: Vec<u8>,
}

impl GeometryWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a point record.
    pub fn point(&mut self, x: f32, y: f32) -> &mut Self {
        self.buffer.put_u32_le(GeometryType::Point as u32);
        self.put_point((x, y));
        self
    }

    /// Writes a line string record.
    pub fn line_string(&mut self, points: &[(f32, f32)]) -> &mut Self {
        self.buffer.put_u32_le(GeometryType::LineString as u32);
        self.put_points(points);
        self
    }

    /// Writes a polygon record.
    pub fn polygon(&mut self, rings: &[Vec<(f32, f32)>]) -> &mut Self {
        self.buffer.put_u32_le(GeometryType::Polygon as u32);
        self.put_rings(rings);
        self
    }

    /// Writes a multi point record.
    pub fn multi_point(&mut self, points: &[(f32, f32)]) -> &mut Self {
        self.buffer.put_u32_le(GeometryType::MultiPoint as u32);
        self.buffer.put_u32_le(points.len() as u32);
        for &(x, y) in points {
            self.point(x, y);
        }
        self
    }

    /// Writes a multi line string record.
    pub fn multi_line_string(&mut self, lines: &[Vec<(f32, f32)>]) -> &mut Self {
        self.buffer.put_u32_le(GeometryType::MultiLineString as u32);
        self.buffer.put_u32_le(lines.len() as u32);
        for line in lines {
            self.line_string(line);
        }
        self
    }

    /// Writes a multi polygon record.
    pub fn multi_polygon(&mut self, polygons: &[Vec<Vec<(f32, f32)>>]) -> &mut Self {
        self.buffer.put_u32_le(GeometryType::MultiPolygon as u32);
        self.buffer.put_u32_le(polygons.len() as u32);
        for polygon in polygons {
            self.polygon(polygon);
        }
        self
    }

    /// Writes a collection header. The next `count` records become its members.
    pub fn begin_collection(&mut self, count: u32) -> &mut Self {
        self.buffer
            .put_u32_le(GeometryType::GeometryCollection as u32);
        self.buffer.put_u32_le(count);
        self
    }

    /// Returns the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }

    fn put_point(&mut self, (x, y): (f32, f32)) {
        self.buffer.put_f32_le(x);
        self.buffer.put_f32_le(y);
    }

    fn put_points(&mut self, points: &[(f32, f32)]) {
        self.buffer.put_u32_le(points.len() as u32);
        for &point in points {
            self.put_point(point);
        }
    }

    fn put_rings(&mut self, rings: &[Vec<(f32, f32)>]) {
        self.buffer.put_u32_le(rings.len() as u32);
        for ring in rings {
            self.put_points(ring);
        }
    }
}

/// Builds a multi-tile payload.
#[derive(Debug)]
pub struct TilePayloadWriter {
    buffer: Vec<u8>,
    tile_count: u32,
    // Offset of the size field of the tile being written.
    open_tile: Option<usize>,
}

impl Default for TilePayloadWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TilePayloadWriter {
    /// Creates a payload with no tiles.
    pub fn new() -> Self {
        Self {
            buffer: vec![0; 4],
            tile_count: 0,
            open_tile: None,
        }
    }

    /// Starts a new tile. Objects added afterwards belong to it.
    pub fn begin_tile(&mut self, x: u32, y: u32, z: u32, detail_zoom: u32) -> &mut Self {
        self.close_tile();

        self.buffer.put_u32_le(x);
        self.buffer.put_u32_le(y);
        self.buffer.put_u32_le(z);
        self.buffer.put_u32_le(detail_zoom);
        self.open_tile = Some(self.buffer.len());
        self.buffer.put_u32_le(0);
        self.tile_count += 1;

        self
    }

    /// Appends an object to the current tile. `geometry` of `None` writes a pure point.
    pub fn add_object(&mut self, info: &ObjectInfo, geometry: Option<&[u8]>) -> &mut Self {
        // Serializing a struct of plain fields into memory does not fail.
        let info = serde_json::to_vec(info).unwrap_or_default();
        self.buffer.put_u32_le(info.len() as u32);
        self.buffer.put_slice(&info);

        let geometry = geometry.unwrap_or_default();
        self.buffer.put_u32_le(geometry.len() as u32);
        self.buffer.put_slice(geometry);

        self
    }

    /// Returns the encoded payload.
    pub fn finish(mut self) -> Bytes {
        self.close_tile();
        self.buffer[0..4].copy_from_slice(&self.tile_count.to_le_bytes());
        self.buffer.into()
    }

    fn close_tile(&mut self) {
        if let Some(offset) = self.open_tile.take() {
            let size = (self.buffer.len() - offset - 4) as u32;
            self.buffer[offset..offset + 4].copy_from_slice(&size.to_le_bytes());
        }
    }
}
