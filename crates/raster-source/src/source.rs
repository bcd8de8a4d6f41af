//! The raster source handle trait.

use tile_common::{BoundingBox, CrsCode, ScriptTileResult};

/// Affine georeferencing for a north-up raster: the top-left corner of the
/// top-left pixel plus per-axis pixel sizes (both positive; y grows
/// downward in pixel space, so geo y decreases with row).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
}

/// An opened raster source: decode state for one dataset.
///
/// This is an abstraction over whatever actually holds pixels: a decoded
/// raster file, an in-memory grid, an upstream tile service. Handles are
/// opened lazily per request, cached for the request's duration via the
/// registry, and never shared mutably: all access is `&self`, so worker
/// threads sample concurrently without locking.
pub trait RasterSource: Send + Sync {
    /// Identifier the source was opened from, for error messages.
    fn id(&self) -> &str;

    /// Number of bands.
    fn band_count(&self) -> usize;

    /// Declared nodata value for a band, if any.
    fn nodata(&self, band: usize) -> Option<f64>;

    /// Coordinate reference system of the raster.
    fn crs(&self) -> CrsCode;

    /// Georeferencing transform.
    fn geo_transform(&self) -> GeoTransform;

    /// Pixel extent (width, height).
    fn raster_size(&self) -> (usize, usize);

    /// Read every band at one pixel. `col`/`row` are guaranteed in range
    /// by [`sample`](Self::sample). Errors here mean the source became
    /// unreadable, which is fatal for the whole render.
    fn read_pixel(&self, col: usize, row: usize) -> ScriptTileResult<Vec<f64>>;

    /// Extent of the raster in its native CRS.
    fn native_bbox(&self) -> BoundingBox {
        let gt = self.geo_transform();
        let (width, height) = self.raster_size();
        BoundingBox::new(
            gt.origin_x,
            gt.origin_y - height as f64 * gt.pixel_size_y,
            gt.origin_x + width as f64 * gt.pixel_size_x,
            gt.origin_y,
        )
    }

    /// Finest axis resolution in native CRS units per pixel.
    fn resolution(&self) -> f64 {
        let gt = self.geo_transform();
        gt.pixel_size_x.min(gt.pixel_size_y)
    }

    /// Sample all bands at a native-CRS coordinate, nearest neighbor.
    ///
    /// Returns `Ok(None)` when the coordinate falls outside the pixel
    /// extent, or when ANY band at the pixel equals its declared nodata
    /// (whole-pixel nodata policy: a partially valid pixel must not leak
    /// into scripts as if it were fully valid).
    fn sample(&self, geo_x: f64, geo_y: f64) -> ScriptTileResult<Option<Vec<f64>>> {
        let gt = self.geo_transform();
        let (width, height) = self.raster_size();

        let col = (geo_x - gt.origin_x) / gt.pixel_size_x;
        let row = (gt.origin_y - geo_y) / gt.pixel_size_y;
        if col < 0.0 || row < 0.0 {
            return Ok(None);
        }
        let (col, row) = (col as usize, row as usize);
        if col >= width || row >= height {
            return Ok(None);
        }

        let values = self.read_pixel(col, row)?;
        for (band, value) in values.iter().enumerate() {
            if let Some(nd) = self.nodata(band) {
                if *value == nd || (value.is_nan() && nd.is_nan()) {
                    return Ok(None);
                }
            }
        }
        Ok(Some(values))
    }
}
