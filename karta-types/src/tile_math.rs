//! Conversions between geographic coordinates, tile indices and Web Mercator meters.
//!
//! Tile indices are fractional: the integer part selects a tile, the fractional part is the
//! position inside of it. A pyramid level `z` contains `base^z` tiles along each axis, so the
//! classic doubling pyramid uses [`ZoomBase::WEB`] (base 2), while for example base 4 makes
//! every integer zoom step equal to two classic ones.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::Rect;

/// Equatorial radius used by the spherical Mercator projection.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Half of the projected world width in meters.
pub const HALF_WORLD_METERS: f64 = PI * EARTH_RADIUS;

/// Latitude limit of the square Web Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Exponential base of a tile pyramid.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ZoomBase(f64);

impl ZoomBase {
    /// Standard doubling pyramid.
    pub const WEB: ZoomBase = ZoomBase(2.0);

    /// Creates a new base. Returns `None` if the base is not a finite number greater than 1.
    pub fn new(base: f64) -> Option<Self> {
        if base.is_finite() && base > 1.0 {
            Some(Self(base))
        } else {
            None
        }
    }

    /// Numeric value of the base.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Number of tiles along one axis at the (possibly fractional) zoom `z`.
    pub fn tiles_at(&self, z: f64) -> f64 {
        self.0.powf(z)
    }

    /// Inverse of [`ZoomBase::tiles_at`].
    pub fn zoom_for(&self, tiles: f64) -> f64 {
        tiles.ln() / self.0.ln()
    }
}

impl Default for ZoomBase {
    fn default() -> Self {
        Self::WEB
    }
}

impl TryFrom<f64> for ZoomBase {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("invalid zoom base: {value}"))
    }
}

impl From<ZoomBase> for f64 {
    fn from(value: ZoomBase) -> Self {
        value.0
    }
}

/// Longitude in degrees to the fractional tile x index.
pub fn longitude_to_tile(lon: f64, z: f64, base: ZoomBase) -> f64 {
    longitude_to_normalized(lon) * base.tiles_at(z)
}

/// Fractional tile x index to longitude in degrees.
pub fn tile_to_longitude(x: f64, z: f64, base: ZoomBase) -> f64 {
    normalized_to_longitude(x / base.tiles_at(z))
}

/// Latitude in degrees to the fractional tile y index (y grows southwards).
pub fn latitude_to_tile(lat: f64, z: f64, base: ZoomBase) -> f64 {
    latitude_to_normalized(lat) * base.tiles_at(z)
}

/// Fractional tile y index to latitude in degrees.
pub fn tile_to_latitude(y: f64, z: f64, base: ZoomBase) -> f64 {
    normalized_to_latitude(y / base.tiles_at(z))
}

/// Latitude in degrees to projected northing in meters.
pub fn latitude_to_meters(lat: f64) -> f64 {
    ((90.0 + lat) * PI / 360.0).tan().ln() * EARTH_RADIUS
}

/// Projected northing in meters to latitude in degrees.
pub fn meters_to_latitude(y: f64) -> f64 {
    (y / EARTH_RADIUS).exp().atan() * 360.0 / PI - 90.0
}

/// Longitude in degrees to projected easting in meters.
pub fn longitude_to_meters(lon: f64) -> f64 {
    lon * PI / 180.0 * EARTH_RADIUS
}

/// Projected easting in meters to longitude in degrees.
pub fn meters_to_longitude(x: f64) -> f64 {
    x / EARTH_RADIUS * 180.0 / PI
}

/// Longitude to `[0, 1]`, where 0 is the antimeridian on the west.
pub fn longitude_to_normalized(lon: f64) -> f64 {
    (lon + 180.0) / 360.0
}

/// Inverse of [`longitude_to_normalized`].
pub fn normalized_to_longitude(x: f64) -> f64 {
    x * 360.0 - 180.0
}

/// Latitude to `[0, 1]`, where 0 is the northern edge of the Mercator square.
pub fn latitude_to_normalized(lat: f64) -> f64 {
    0.5 - latitude_to_meters(lat) / (2.0 * HALF_WORLD_METERS)
}

/// Inverse of [`latitude_to_normalized`].
pub fn normalized_to_latitude(y: f64) -> f64 {
    meters_to_latitude((0.5 - y) * 2.0 * HALF_WORLD_METERS)
}

/// Projected bounds of the tile `(x, y, z)` in meters.
pub fn tile_bounds_meters(x: f64, y: f64, z: f64, base: ZoomBase) -> Rect {
    let tile_size = 2.0 * HALF_WORLD_METERS / base.tiles_at(z);
    let x_min = -HALF_WORLD_METERS + x * tile_size;
    let y_max = HALF_WORLD_METERS - y * tile_size;

    Rect::new(x_min, y_max - tile_size, x_min + tile_size, y_max)
}

/// Largest zoom at which the geographic box `west, south, east, north` fits into a viewport of
/// `width x height` pixels made of tiles of `tile_size` pixels.
#[allow(clippy::too_many_arguments)]
pub fn fit_bounds(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    width: f64,
    height: f64,
    tile_size: f64,
    base: ZoomBase,
) -> Option<f64> {
    let span_x = longitude_to_normalized(east) - longitude_to_normalized(west);
    let span_y = latitude_to_normalized(south.max(-MAX_LATITUDE))
        - latitude_to_normalized(north.min(MAX_LATITUDE));

    if span_x <= 0.0 || span_y <= 0.0 || width <= 0.0 || height <= 0.0 {
        return None;
    }

    let zoom_x = base.zoom_for(width / (span_x * tile_size));
    let zoom_y = base.zoom_for(height / (span_y * tile_size));

    Some(zoom_x.min(zoom_y))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn latitude_round_trip() {
        for base in [ZoomBase::WEB, ZoomBase(4.0)] {
            for z in 0..=20 {
                let mut lat = -85.0;
                while lat <= 85.0 {
                    let y = latitude_to_tile(lat, z as f64, base);
                    assert_abs_diff_eq!(tile_to_latitude(y, z as f64, base), lat, epsilon = 1e-6);
                    lat += 7.3;
                }
            }
        }
    }

    #[test]
    fn longitude_round_trip() {
        for z in 0..=20 {
            let mut lon = -180.0;
            while lon <= 180.0 {
                let x = longitude_to_tile(lon, z as f64, ZoomBase::WEB);
                assert_abs_diff_eq!(
                    tile_to_longitude(x, z as f64, ZoomBase::WEB),
                    lon,
                    epsilon = 1e-6
                );
                lon += 11.7;
            }
        }
    }

    #[test]
    fn world_edges() {
        assert_eq!(tile_to_longitude(0.0, 0.0, ZoomBase::WEB), -180.0);
        assert_eq!(tile_to_longitude(1.0, 0.0, ZoomBase::WEB), 180.0);
        assert_abs_diff_eq!(tile_to_latitude(0.5, 0.0, ZoomBase::WEB), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            tile_to_latitude(0.0, 0.0, ZoomBase::WEB),
            MAX_LATITUDE,
            epsilon = 1e-6
        );
    }

    #[test]
    fn meters() {
        assert_abs_diff_eq!(latitude_to_meters(0.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(longitude_to_meters(180.0), HALF_WORLD_METERS, epsilon = 1e-6);
        assert_abs_diff_eq!(
            latitude_to_meters(MAX_LATITUDE),
            HALF_WORLD_METERS,
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(meters_to_latitude(latitude_to_meters(55.75)), 55.75, epsilon = 1e-9);
        assert_abs_diff_eq!(meters_to_longitude(longitude_to_meters(37.6)), 37.6, epsilon = 1e-9);
    }

    #[test]
    fn base_four_is_two_doubling_steps() {
        let lat = 48.85;
        assert_abs_diff_eq!(
            latitude_to_tile(lat, 3.0, ZoomBase(4.0)),
            latitude_to_tile(lat, 6.0, ZoomBase::WEB),
            epsilon = 1e-9
        );
    }

    #[test]
    fn tile_bounds() {
        let world = tile_bounds_meters(0.0, 0.0, 0.0, ZoomBase::WEB);
        assert_abs_diff_eq!(world.x_min(), -HALF_WORLD_METERS);
        assert_abs_diff_eq!(world.y_max(), HALF_WORLD_METERS);

        let ne = tile_bounds_meters(1.0, 0.0, 1.0, ZoomBase::WEB);
        assert_abs_diff_eq!(ne.x_min(), 0.0);
        assert_abs_diff_eq!(ne.y_min(), 0.0);
    }

    #[test]
    fn fit_whole_world() {
        let z = fit_bounds(-180.0, -85.0, 180.0, 85.0, 512.0, 512.0, 256.0, ZoomBase::WEB)
            .expect("valid bounds");
        assert_abs_diff_eq!(z, 1.0, epsilon = 0.01);
        assert!(fit_bounds(10.0, 0.0, 0.0, 1.0, 512.0, 512.0, 256.0, ZoomBase::WEB).is_none());
    }

    #[test]
    fn invalid_base() {
        assert!(ZoomBase::new(1.0).is_none());
        assert!(ZoomBase::new(f64::NAN).is_none());
        assert!(ZoomBase::new(4.0).is_some());
    }
}
