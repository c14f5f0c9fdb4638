//! Decoding errors.

use thiserror::Error;

use crate::GeometryType;

/// Error reading a tile payload or a geometry record.
///
/// Every variant is fatal for the tile being decoded: once an offset cannot be trusted, nothing
/// after it can be read either.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WkbError {
    /// The buffer ends before a field that must be present.
    #[error("unexpected end of data at offset {offset}: need {needed} bytes, {remaining} left")]
    Truncated {
        /// Offset of the field.
        offset: usize,
        /// Size of the field.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// The geometry type tag is not one of the known types.
    #[error("unknown geometry type {tag} at offset {offset}")]
    UnknownGeometryType {
        /// Offset of the tag.
        offset: usize,
        /// The tag value.
        tag: u32,
    },

    /// A member of a multi-geometry has a wrong type.
    #[error("expected {expected:?} member at offset {offset}, found type tag {found}")]
    UnexpectedMember {
        /// Offset of the member tag.
        offset: usize,
        /// Type required by the container.
        expected: GeometryType,
        /// Tag found in the data.
        found: u32,
    },

    /// A record did not consume exactly the number of bytes declared for it.
    #[error("record consumed {consumed} bytes, but {declared} were declared")]
    LengthMismatch {
        /// Bytes read by the decoder.
        consumed: usize,
        /// Bytes declared by the enclosing length field.
        declared: usize,
    },

    /// Geometry collections are nested deeper than [`MAX_NESTING`](crate::MAX_NESTING).
    #[error("geometry collection at offset {offset} is nested deeper than {max_depth} levels")]
    TooDeep {
        /// Offset of the collection tag.
        offset: usize,
        /// Allowed nesting.
        max_depth: usize,
    },

    /// Object info is not valid JSON of the expected shape.
    #[error("invalid object info: {0}")]
    InvalidInfo(String),
}
