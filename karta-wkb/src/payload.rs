use std::sync::Arc;

use bytes::Bytes;

use crate::error::WkbError;
use crate::geometry::{GeometryWalker, WalkMode};
use crate::object::{DecodedTile, MapObject, ObjectInfo};
use crate::reader::ByteReader;

/// Decodes a full response payload: `u32 tileCount`, then for every tile
/// `u32 x, u32 y, u32 z, u32 detailZoom, u32 dataSize` followed by `dataSize` bytes of objects.
///
/// The payload must be consumed exactly.
pub fn decode_payload(payload: Bytes) -> Result<Vec<DecodedTile>, WkbError> {
    let mut reader = ByteReader::new(&payload);
    let count = reader.read_u32()?;

    let mut tiles = Vec::new();
    for _ in 0..count {
        let x = reader.read_u32()?;
        let y = reader.read_u32()?;
        let z = reader.read_u32()?;
        let detail_zoom = reader.read_u32()?;

        let data = reader.read_sized()?;
        let start = reader.offset() - data.len();
        let objects = decode_tile_objects(payload.slice(start..reader.offset()))?;

        log::trace!(
            "Decoded tile {x}/{y}/{z} at detail {detail_zoom}: {} objects",
            objects.len()
        );

        tiles.push(DecodedTile {
            x,
            y,
            z,
            detail_zoom,
            objects,
        });
    }

    if reader.remaining() != 0 {
        return Err(WkbError::LengthMismatch {
            consumed: reader.offset(),
            declared: payload.len(),
        });
    }

    Ok(tiles)
}

/// Decodes the objects of a single tile.
///
/// Every object is `u32 infoSize`, JSON info, `u32 geometrySize` and the geometry record. A
/// geometry size of zero denotes a pure point. Geometry is validated by walking it in skip mode,
/// so a later draw walk can trust the offsets.
pub fn decode_tile_objects(data: Bytes) -> Result<Vec<MapObject>, WkbError> {
    let mut reader = ByteReader::new(&data);
    let mut objects = vec![];

    while reader.remaining() > 0 {
        let info_bytes = reader.read_sized()?;
        let info: ObjectInfo = serde_json::from_slice(info_bytes)
            .map_err(|e| WkbError::InvalidInfo(e.to_string()))?;

        let geometry_bytes = reader.read_sized()?;
        let geometry = if geometry_bytes.is_empty() {
            None
        } else {
            let end = reader.offset();
            let start = end - geometry_bytes.len();
            GeometryWalker::walk_exact(geometry_bytes, &mut WalkMode::Skip).map_err(|e| {
                match e {
                    // Report offsets relative to the tile data.
                    WkbError::Truncated {
                        offset,
                        needed,
                        remaining,
                    } => WkbError::Truncated {
                        offset: offset + start,
                        needed,
                        remaining,
                    },
                    other => other,
                }
            })?;
            Some(data.slice(start..end))
        };

        objects.push(MapObject {
            geometry,
            info: Arc::new(info),
        });
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::object::ObjectType;
    use crate::writer::{GeometryWriter, TilePayloadWriter};
    use crate::GeometryType;

    fn info(name: &str, length: Option<f64>) -> ObjectInfo {
        let mut info = ObjectInfo {
            length,
            ..Default::default()
        };
        info.tags
            .insert("name".into(), crate::TagValue::String(name.into()));
        info
    }

    fn sample_payload() -> Bytes {
        let mut payload = TilePayloadWriter::new();

        payload.begin_tile(3, 5, 4, 4);
        payload.add_object(&info("capital", None), None);

        let mut line = GeometryWriter::new();
        line.line_string(&[(0.0, 0.0), (100.0, 0.0), (100.0, 50.0)]);
        payload.add_object(&info("river", Some(150.0)), Some(line.finish().as_slice()));

        let mut polygon = GeometryWriter::new();
        polygon.polygon(&[vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]]);
        payload.add_object(&info("park", None), Some(polygon.finish().as_slice()));

        payload.begin_tile(4, 5, 4, 4);
        payload.finish()
    }

    #[test]
    fn decodes_multiple_tiles() {
        let tiles = decode_payload(sample_payload()).expect("valid payload");
        assert_eq!(tiles.len(), 2);

        let first = &tiles[0];
        assert_eq!((first.x, first.y, first.z, first.detail_zoom), (3, 5, 4, 4));
        let types: Vec<_> = first.objects.iter().map(|o| o.object_type()).collect();
        assert_eq!(
            types,
            vec![ObjectType::Point, ObjectType::Line, ObjectType::Polygon]
        );

        let line = first.objects[1].geometry.as_ref().expect("line geometry");
        assert_eq!(line.len(), 4 + 4 + 3 * 8);
        assert_eq!(
            GeometryWalker::walk_exact(line, &mut WalkMode::Skip),
            Ok(GeometryType::LineString)
        );

        assert!(tiles[1].objects.is_empty());
    }

    #[test]
    fn truncated_payload_fails() {
        let payload = sample_payload();
        for cut in [3, 10, 30, payload.len() - 1] {
            let result = decode_payload(payload.slice(..cut));
            assert!(result.is_err(), "payload cut at {cut} must not decode");
        }
    }

    #[test]
    fn geometry_size_mismatch_fails() {
        let mut geometry = GeometryWriter::new();
        geometry.point(1.0, 1.0);
        let mut bytes = geometry.finish();
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let mut payload = TilePayloadWriter::new();
        payload.begin_tile(0, 0, 0, 0);
        payload.add_object(&ObjectInfo::default(), Some(bytes.as_slice()));

        assert_matches!(
            decode_payload(payload.finish()),
            Err(WkbError::LengthMismatch { .. })
        );
    }

    #[test]
    fn invalid_info_fails() {
        let mut data = 3u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"{{{");
        data.extend_from_slice(&0u32.to_le_bytes());

        assert_matches!(
            decode_tile_objects(Bytes::from(data)),
            Err(WkbError::InvalidInfo(_))
        );
    }
}
