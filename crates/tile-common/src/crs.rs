//! Coordinate Reference System codes and transforms.
//!
//! Raster sources declare their CRS as one of the codes below; bounds
//! resolution and tile rendering reproject between them analytically.
//! Anything beyond 4326/3857 would plug in here.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// WGS84 spheroid radius in meters (https://epsg.io/3857).
const EARTH_RADIUS: f64 = 6378137.0;

/// Projected bound of EPSG:3857 in meters, |x| and |y|.
pub const WEB_MERCATOR_EXTENT: f64 = 20037508.342789244;

/// Well-known CRS codes supported by the tile server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse a CRS string, e.g. "EPSG:4326".
    pub fn from_epsg_string(s: &str) -> Result<Self, CrsParseError> {
        match s.to_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" => Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg3857 => 3857,
        }
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }

    /// Get the valid bounds for this CRS.
    pub fn valid_bounds(&self) -> BoundingBox {
        match self {
            CrsCode::Epsg4326 => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Epsg3857 => BoundingBox::new(
                -WEB_MERCATOR_EXTENT,
                -WEB_MERCATOR_EXTENT,
                WEB_MERCATOR_EXTENT,
                WEB_MERCATOR_EXTENT,
            ),
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Forward Web Mercator: lon/lat degrees to meters.
///
/// Latitude is clamped to the projection's ±85.051° validity band so poles
/// map to the finite projected extent.
pub fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-85.05112877980659, 85.05112877980659);
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = ((PI / 4.0) + (lat.to_radians() / 2.0)).tan().ln() * EARTH_RADIUS;
    (x, y)
}

/// Inverse Web Mercator: meters to lon/lat degrees.
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Transform a point between supported CRSs.
pub fn transform_point(from: CrsCode, to: CrsCode, x: f64, y: f64) -> (f64, f64) {
    match (from, to) {
        (a, b) if a == b => (x, y),
        (CrsCode::Epsg4326, CrsCode::Epsg3857) => wgs84_to_mercator(x, y),
        (CrsCode::Epsg3857, CrsCode::Epsg4326) => mercator_to_wgs84(x, y),
        _ => unreachable!("all supported CRS pairs handled"),
    }
}

/// Reproject a bounding box between supported CRSs.
///
/// Both supported transforms are monotonic in x and y, so transforming the
/// two corners is exact; no edge densification needed.
pub fn transform_bbox(from: CrsCode, to: CrsCode, bbox: &BoundingBox) -> BoundingBox {
    if from == to {
        return *bbox;
    }
    let (x0, y0) = transform_point(from, to, bbox.min_x, bbox.min_y);
    let (x1, y1) = transform_point(from, to, bbox.max_x, bbox.max_y);
    BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
}

/// Convert a linear distance (e.g. a pixel size) from one CRS's units into
/// another's, measured at a reference point given in `from` coordinates.
///
/// Used by the bounds resolver to compare source resolutions in the
/// reference frame.
pub fn transform_distance(from: CrsCode, to: CrsCode, distance: f64, at_x: f64, at_y: f64) -> f64 {
    if from == to {
        return distance;
    }
    let (x0, y0) = transform_point(from, to, at_x, at_y);
    let (x1, _) = transform_point(from, to, at_x + distance, at_y);
    let (_, y1) = transform_point(from, to, at_x, at_y + distance);
    // Mean of the axis scale factors at the reference point
    ((x1 - x0).abs() + (y1 - y0).abs()) / 2.0
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(
            CrsCode::from_epsg_string("EPSG:4326").unwrap(),
            CrsCode::Epsg4326
        );
        assert_eq!(
            CrsCode::from_epsg_string("epsg:3857").unwrap(),
            CrsCode::Epsg3857
        );
        assert!(CrsCode::from_epsg_string("EPSG:5070").is_err());
    }

    #[test]
    fn test_mercator_round_trip() {
        let (x, y) = wgs84_to_mercator(6.6323, 46.5197);
        let (lon, lat) = mercator_to_wgs84(x, y);
        assert!((lon - 6.6323).abs() < 1e-9);
        assert!((lat - 46.5197).abs() < 1e-9);
    }

    #[test]
    fn test_mercator_extent() {
        let (x, _) = wgs84_to_mercator(180.0, 0.0);
        assert!((x - WEB_MERCATOR_EXTENT).abs() < 1e-6);
        let (_, y) = wgs84_to_mercator(0.0, 85.05112877980659);
        assert!((y - WEB_MERCATOR_EXTENT).abs() < 1e-6);
    }

    #[test]
    fn test_transform_bbox_identity() {
        let bbox = BoundingBox::new(-1.0, -2.0, 3.0, 4.0);
        assert_eq!(
            transform_bbox(CrsCode::Epsg4326, CrsCode::Epsg4326, &bbox),
            bbox
        );
    }

    #[test]
    fn test_transform_distance_degrees_to_meters() {
        // One degree of longitude at the equator is ~111 km in mercator
        let m = transform_distance(CrsCode::Epsg4326, CrsCode::Epsg3857, 1.0, 0.0, 0.0);
        assert!((m - 111_319.49).abs() / 111_319.49 < 0.01);
    }
}
