use karta_types::Point2;

use crate::error::WkbError;
use crate::reader::ByteReader;

const POINT_SIZE: usize = 8;

/// Maximum number of geometry collections nested into each other.
pub const MAX_NESTING: usize = 32;

/// Type tag of a geometry record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GeometryType {
    /// Two `f32` coordinates.
    Point = 1,
    /// Point count followed by the points.
    LineString = 2,
    /// Ring count, then every ring as a point count followed by the points.
    Polygon = 3,
    /// Count followed by `Point` records.
    MultiPoint = 4,
    /// Count followed by `LineString` records.
    MultiLineString = 5,
    /// Count followed by `Polygon` records.
    MultiPolygon = 6,
    /// Count followed by records of any type.
    GeometryCollection = 7,
}

impl GeometryType {
    fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            1 => Self::Point,
            2 => Self::LineString,
            3 => Self::Polygon,
            4 => Self::MultiPoint,
            5 => Self::MultiLineString,
            6 => Self::MultiPolygon,
            7 => Self::GeometryCollection,
            _ => return None,
        })
    }
}

/// Receiver of drawing commands produced by the [`GeometryWalker`] in draw mode.
///
/// Coordinates are passed exactly as they are stored in the record.
pub trait GeometrySink {
    /// A single point.
    fn point(&mut self, x: f64, y: f64);
    /// Starts a new line or ring.
    fn move_to(&mut self, x: f64, y: f64);
    /// Continues the current line or ring.
    fn line_to(&mut self, x: f64, y: f64);
    /// Closes the current ring.
    fn close_ring(&mut self);
    /// A line string is complete and can be stroked.
    fn finish_line(&mut self);
    /// All rings of a polygon are complete and it can be filled.
    fn finish_polygon(&mut self);
}

/// How the walker treats the geometry it reads.
pub enum WalkMode<'s> {
    /// Feed every primitive into the sink.
    Draw(&'s mut dyn GeometrySink),
    /// Only advance the cursor.
    Skip,
}

/// Cursor over a buffer of geometry records.
///
/// Every call to [`GeometryWalker::walk`] consumes exactly one record (with all of its members),
/// leaving the cursor at the first byte after it.
pub struct GeometryWalker<'a> {
    reader: ByteReader<'a>,
}

impl<'a> GeometryWalker<'a> {
    /// Creates a walker positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(data),
        }
    }

    /// Current offset from the start of the buffer.
    pub fn offset(&self) -> usize {
        self.reader.offset()
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// Walks a buffer that must contain exactly one geometry record.
    pub fn walk_exact(data: &'a [u8], mode: &mut WalkMode<'_>) -> Result<GeometryType, WkbError> {
        let mut walker = Self::new(data);
        let geometry_type = walker.walk(mode)?;
        if walker.remaining() != 0 {
            return Err(WkbError::LengthMismatch {
                consumed: walker.offset(),
                declared: data.len(),
            });
        }

        Ok(geometry_type)
    }

    /// Reads the next record.
    pub fn walk(&mut self, mode: &mut WalkMode<'_>) -> Result<GeometryType, WkbError> {
        self.walk_nested(mode, 0)
    }

    fn walk_nested(
        &mut self,
        mode: &mut WalkMode<'_>,
        depth: usize,
    ) -> Result<GeometryType, WkbError> {
        let offset = self.reader.offset();
        let geometry_type = self.read_type()?;
        match geometry_type {
            GeometryType::Point => self.walk_point(mode)?,
            GeometryType::LineString => self.walk_line_string(mode)?,
            GeometryType::Polygon => self.walk_polygon(mode)?,
            GeometryType::MultiPoint => {
                // Multi points are not drawn, but their members still have to be consumed.
                self.walk_members(GeometryType::MultiPoint, &mut WalkMode::Skip)?
            }
            GeometryType::MultiLineString | GeometryType::MultiPolygon => {
                self.walk_members(geometry_type, mode)?
            }
            GeometryType::GeometryCollection => {
                check_nesting(offset, depth)?;
                let count = self.reader.read_u32()?;
                for _ in 0..count {
                    self.walk_nested(mode, depth + 1)?;
                }
            }
        }

        Ok(geometry_type)
    }

    fn read_type(&mut self) -> Result<GeometryType, WkbError> {
        let offset = self.reader.offset();
        let tag = self.reader.read_u32()?;
        GeometryType::from_tag(tag).ok_or(WkbError::UnknownGeometryType { offset, tag })
    }

    fn walk_members(
        &mut self,
        container: GeometryType,
        mode: &mut WalkMode<'_>,
    ) -> Result<(), WkbError> {
        let expected = match container {
            GeometryType::MultiPoint => GeometryType::Point,
            GeometryType::MultiLineString => GeometryType::LineString,
            _ => GeometryType::Polygon,
        };

        let count = self.reader.read_u32()?;
        for _ in 0..count {
            let offset = self.reader.offset();
            let tag = self.reader.read_u32()?;
            if tag != expected as u32 {
                return Err(WkbError::UnexpectedMember {
                    offset,
                    expected,
                    found: tag,
                });
            }

            match expected {
                GeometryType::Point => self.walk_point(mode)?,
                GeometryType::LineString => self.walk_line_string(mode)?,
                _ => self.walk_polygon(mode)?,
            }
        }

        Ok(())
    }

    fn walk_point(&mut self, mode: &mut WalkMode<'_>) -> Result<(), WkbError> {
        let (x, y) = self.reader.read_point()?;
        if let WalkMode::Draw(sink) = mode {
            sink.point(x, y);
        }

        Ok(())
    }

    fn walk_line_string(&mut self, mode: &mut WalkMode<'_>) -> Result<(), WkbError> {
        let count = self.reader.read_u32()?;
        match mode {
            WalkMode::Skip => self.reader.skip_items(count, POINT_SIZE),
            WalkMode::Draw(sink) => {
                self.feed_points(count, &mut **sink)?;
                sink.finish_line();
                Ok(())
            }
        }
    }

    fn walk_polygon(&mut self, mode: &mut WalkMode<'_>) -> Result<(), WkbError> {
        let ring_count = self.reader.read_u32()?;
        for _ in 0..ring_count {
            let count = self.reader.read_u32()?;
            match mode {
                WalkMode::Skip => self.reader.skip_items(count, POINT_SIZE)?,
                WalkMode::Draw(sink) => {
                    self.feed_points(count, &mut **sink)?;
                    sink.close_ring();
                }
            }
        }

        if let WalkMode::Draw(sink) = mode {
            sink.finish_polygon();
        }

        Ok(())
    }

    fn feed_points(&mut self, count: u32, sink: &mut dyn GeometrySink) -> Result<(), WkbError> {
        for i in 0..count {
            let (x, y) = self.reader.read_point()?;
            if i == 0 {
                sink.move_to(x, y);
            } else {
                sink.line_to(x, y);
            }
        }

        Ok(())
    }
}

/// Geometry decoded into owned coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Single point.
    Point(Point2),
    /// Line string.
    LineString(Vec<Point2>),
    /// Polygon as a list of rings, the first one is the outer ring.
    Polygon(Vec<Vec<Point2>>),
    /// Set of points.
    MultiPoint(Vec<Point2>),
    /// Set of line strings.
    MultiLineString(Vec<Vec<Point2>>),
    /// Set of polygons.
    MultiPolygon(Vec<Vec<Vec<Point2>>>),
    /// Mixed set of geometries.
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// Decodes a buffer that must contain exactly one geometry record.
    pub fn decode(data: &[u8]) -> Result<Self, WkbError> {
        let mut reader = ByteReader::new(data);
        let geometry = Self::read(&mut reader, 0)?;
        if reader.remaining() != 0 {
            return Err(WkbError::LengthMismatch {
                consumed: reader.offset(),
                declared: data.len(),
            });
        }

        Ok(geometry)
    }

    /// Type of the geometry.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::Collection(_) => GeometryType::GeometryCollection,
        }
    }

    /// All line strings contained in the geometry, including nested ones.
    pub fn lines(&self) -> Vec<&[Point2]> {
        let mut lines = vec![];
        self.collect_lines(&mut lines);
        lines
    }

    fn collect_lines<'a>(&'a self, lines: &mut Vec<&'a [Point2]>) {
        match self {
            Geometry::LineString(points) => lines.push(points),
            Geometry::MultiLineString(parts) => lines.extend(parts.iter().map(|p| p.as_slice())),
            Geometry::Collection(members) => {
                for member in members {
                    member.collect_lines(lines);
                }
            }
            _ => {}
        }
    }

    fn read(reader: &mut ByteReader, depth: usize) -> Result<Self, WkbError> {
        let offset = reader.offset();
        let tag = reader.read_u32()?;
        let geometry_type =
            GeometryType::from_tag(tag).ok_or(WkbError::UnknownGeometryType { offset, tag })?;

        Ok(match geometry_type {
            GeometryType::Point => Geometry::Point(read_point(reader)?),
            GeometryType::LineString => Geometry::LineString(read_points(reader)?),
            GeometryType::Polygon => Geometry::Polygon(read_rings(reader)?),
            GeometryType::MultiPoint => Geometry::MultiPoint(read_members(
                reader,
                GeometryType::Point,
                read_point,
            )?),
            GeometryType::MultiLineString => Geometry::MultiLineString(read_members(
                reader,
                GeometryType::LineString,
                read_points,
            )?),
            GeometryType::MultiPolygon => Geometry::MultiPolygon(read_members(
                reader,
                GeometryType::Polygon,
                read_rings,
            )?),
            GeometryType::GeometryCollection => {
                check_nesting(offset, depth)?;
                let count = reader.read_u32()?;
                let mut members = Vec::new();
                for _ in 0..count {
                    members.push(Self::read(reader, depth + 1)?);
                }
                Geometry::Collection(members)
            }
        })
    }
}

fn check_nesting(offset: usize, depth: usize) -> Result<(), WkbError> {
    if depth >= MAX_NESTING {
        return Err(WkbError::TooDeep {
            offset,
            max_depth: MAX_NESTING,
        });
    }

    Ok(())
}

fn read_point(reader: &mut ByteReader) -> Result<Point2, WkbError> {
    let (x, y) = reader.read_point()?;
    Ok(Point2::new(x, y))
}

fn read_points(reader: &mut ByteReader) -> Result<Vec<Point2>, WkbError> {
    let count = reader.read_u32()? as usize;
    // Capacity is bounded by the data actually present, so a corrupted count cannot allocate.
    let mut points = Vec::with_capacity(count.min(reader.remaining() / POINT_SIZE));
    for _ in 0..count {
        points.push(read_point(reader)?);
    }

    Ok(points)
}

fn read_rings(reader: &mut ByteReader) -> Result<Vec<Vec<Point2>>, WkbError> {
    let count = reader.read_u32()?;
    let mut rings = Vec::new();
    for _ in 0..count {
        rings.push(read_points(reader)?);
    }

    Ok(rings)
}

fn read_members<T>(
    reader: &mut ByteReader,
    expected: GeometryType,
    read_member: fn(&mut ByteReader) -> Result<T, WkbError>,
) -> Result<Vec<T>, WkbError> {
    let count = reader.read_u32()?;
    let mut members = Vec::new();
    for _ in 0..count {
        let offset = reader.offset();
        let tag = reader.read_u32()?;
        if tag != expected as u32 {
            return Err(WkbError::UnexpectedMember {
                offset,
                expected,
                found: tag,
            });
        }
        members.push(read_member(reader)?);
    }

    Ok(members)
}
