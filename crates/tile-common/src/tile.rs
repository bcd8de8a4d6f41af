//! XYZ (slippy-map) tile coordinates and Web Mercator tile math.

use crate::crs::WEB_MERCATOR_EXTENT;
use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// Tile image size in pixels.
pub const TILE_SIZE: u32 = 256;

/// A tile coordinate (z/x/y), XYZ scheme (row 0 at the north edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Check the column/row are inside the matrix for this zoom.
    pub fn is_valid(&self) -> bool {
        let n = 1u64 << self.z;
        (self.x as u64) < n && (self.y as u64) < n
    }

    /// Resolution in meters per pixel at this tile's zoom level
    /// (at the equator; EPSG:3857 deforms away from it).
    pub fn resolution(&self) -> f64 {
        (2.0 * WEB_MERCATOR_EXTENT) / (TILE_SIZE as f64 * (1u64 << self.z) as f64)
    }

    /// Bounding box of this tile in EPSG:3857 meters.
    pub fn bbox_3857(&self) -> BoundingBox {
        let n = (1u64 << self.z) as f64;
        let span = 2.0 * WEB_MERCATOR_EXTENT / n;
        let min_x = -WEB_MERCATOR_EXTENT + self.x as f64 * span;
        let max_y = WEB_MERCATOR_EXTENT - self.y as f64 * span;
        BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_zero_covers_world() {
        let bbox = TileCoord::new(0, 0, 0).bbox_3857();
        assert!((bbox.min_x + WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!((bbox.max_y - WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!((bbox.width() - 2.0 * WEB_MERCATOR_EXTENT).abs() < 1e-6);
    }

    #[test]
    fn test_adjacent_tiles_share_edges() {
        // Edges are ~2e7 m, so compare at a few ulps above that magnitude
        let a = TileCoord::new(3, 2, 5).bbox_3857();
        let b = TileCoord::new(3, 3, 5).bbox_3857();
        assert!((a.max_x - b.min_x).abs() < 1e-6);

        let below = TileCoord::new(3, 2, 6).bbox_3857();
        assert!((a.min_y - below.max_y).abs() < 1e-6);
    }

    #[test]
    fn test_validity() {
        assert!(TileCoord::new(2, 3, 3).is_valid());
        assert!(!TileCoord::new(2, 4, 0).is_valid());
    }

    #[test]
    fn test_resolution_halves_per_zoom() {
        let r0 = TileCoord::new(0, 0, 0).resolution();
        let r1 = TileCoord::new(1, 0, 0).resolution();
        assert!((r0 / r1 - 2.0).abs() < 1e-12);
    }
}
