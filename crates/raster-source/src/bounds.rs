//! The bounds resolver: the common renderable extent of a request's
//! declared sources.

use crate::source::RasterSource;
use std::sync::Arc;
use tile_common::{crs, BoundingBox, CrsCode, PolygonGeometry, ScriptTileError, ScriptTileResult};

/// The resolved rendering extent for a set of sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsResult {
    /// Extent in `crs` coordinates; always inside the intersection of all
    /// contributing sources' extents.
    pub bbox: BoundingBox,
    /// Reference CRS: the CRS of the first declared input.
    pub crs: CrsCode,
    /// Finest contributing resolution, in reference CRS units per pixel.
    pub resolution: f64,
}

impl BoundsResult {
    /// The extent reprojected to WGS84, the shape the bounds endpoint
    /// serves.
    pub fn wgs84_bbox(&self) -> BoundingBox {
        crs::transform_bbox(self.crs, CrsCode::Epsg4326, &self.bbox)
    }

    /// The WGS84 extent as a GeoJSON polygon for the UI map.
    pub fn to_polygon(&self) -> PolygonGeometry {
        self.wgs84_bbox().into()
    }
}

/// Compute the geographic intersection of all declared sources.
///
/// The reference CRS is the first declared input's; declaration order is
/// semantically load-bearing here, which is why `inputs` is an ordered
/// list and not a map. Each source's extent is reprojected into the
/// reference CRS and all rectangles intersected; a non-positive overlap
/// is `EmptyIntersection`. The chosen resolution is the minimum
/// (finest) pixel size among the sources, measured in reference CRS
/// units, so the extent is renderable by every input without upsampling
/// beyond its native resolution.
pub fn compute_bounds(
    inputs: &[(String, Arc<dyn RasterSource>)],
) -> ScriptTileResult<BoundsResult> {
    let (_, first) = inputs.first().ok_or(ScriptTileError::NoInputs)?;
    let reference_crs = first.crs();

    let mut bbox: Option<BoundingBox> = None;
    let mut resolution = f64::INFINITY;

    for (_, source) in inputs {
        let native = source.native_bbox();
        let projected = crs::transform_bbox(source.crs(), reference_crs, &native);

        bbox = Some(match bbox {
            None => projected,
            Some(acc) => acc
                .intersection(&projected)
                .ok_or(ScriptTileError::EmptyIntersection)?,
        });

        let center_x = (native.min_x + native.max_x) / 2.0;
        let center_y = (native.min_y + native.max_y) / 2.0;
        let res = crs::transform_distance(
            source.crs(),
            reference_crs,
            source.resolution(),
            center_x,
            center_y,
        );
        resolution = resolution.min(res);
    }

    let bbox = bbox.expect("at least one input");
    if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        return Err(ScriptTileError::EmptyIntersection);
    }

    Ok(BoundsResult {
        bbox,
        crs: reference_crs,
        resolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSource;
    use crate::source::GeoTransform;

    fn grid(
        id: &str,
        crs: CrsCode,
        origin: (f64, f64),
        pixel: f64,
        size: (usize, usize),
    ) -> (String, Arc<dyn RasterSource>) {
        let (width, height) = size;
        let source = GridSource::from_parts(
            id,
            width,
            height,
            1,
            crs,
            GeoTransform {
                origin_x: origin.0,
                origin_y: origin.1,
                pixel_size_x: pixel,
                pixel_size_y: pixel,
            },
            vec![None],
            vec![0.0; width * height],
        );
        (id.to_string(), Arc::new(source))
    }

    #[test]
    fn test_single_source() {
        let inputs = vec![grid("a", CrsCode::Epsg4326, (10.0, 50.0), 0.5, (4, 4))];
        let bounds = compute_bounds(&inputs).unwrap();
        assert_eq!(bounds.bbox, BoundingBox::new(10.0, 48.0, 12.0, 50.0));
        assert_eq!(bounds.crs, CrsCode::Epsg4326);
        assert_eq!(bounds.resolution, 0.5);
    }

    #[test]
    fn test_intersection_and_finest_resolution() {
        let inputs = vec![
            grid("coarse", CrsCode::Epsg4326, (0.0, 10.0), 1.0, (10, 10)),
            grid("fine", CrsCode::Epsg4326, (5.0, 8.0), 0.25, (8, 8)),
        ];
        let bounds = compute_bounds(&inputs).unwrap();
        assert_eq!(bounds.bbox, BoundingBox::new(5.0, 6.0, 7.0, 8.0));
        assert_eq!(bounds.resolution, 0.25);
    }

    #[test]
    fn test_reorder_same_rectangle() {
        let a = grid("a", CrsCode::Epsg4326, (0.0, 10.0), 1.0, (10, 10));
        let b = grid("b", CrsCode::Epsg4326, (5.0, 8.0), 0.25, (8, 8));
        let fwd = compute_bounds(&[a.clone(), b.clone()]).unwrap();
        let rev = compute_bounds(&[b, a]).unwrap();
        assert_eq!(fwd.bbox, rev.bbox);
        assert_eq!(fwd.resolution, rev.resolution);
    }

    #[test]
    fn test_disjoint_extents() {
        let inputs = vec![
            grid("a", CrsCode::Epsg4326, (0.0, 10.0), 1.0, (5, 5)),
            grid("b", CrsCode::Epsg4326, (100.0, 10.0), 1.0, (5, 5)),
        ];
        assert!(matches!(
            compute_bounds(&inputs).unwrap_err(),
            ScriptTileError::EmptyIntersection
        ));
    }

    #[test]
    fn test_no_inputs() {
        assert!(matches!(
            compute_bounds(&[]).unwrap_err(),
            ScriptTileError::NoInputs
        ));
    }

    #[test]
    fn test_mixed_crs_reference_is_first() {
        // ~1 degree square at the equator, one source in 4326 and one in
        // 3857 covering a slightly shifted square
        let wgs = grid("wgs", CrsCode::Epsg4326, (0.0, 1.0), 0.01, (100, 100));
        let merc = grid(
            "merc",
            CrsCode::Epsg3857,
            (55_000.0, 100_000.0),
            1000.0,
            (100, 100),
        );

        let bounds = compute_bounds(&[wgs.clone(), merc.clone()]).unwrap();
        assert_eq!(bounds.crs, CrsCode::Epsg4326);
        // Overlap starts at the mercator source's west edge (~0.494 deg)
        assert!(bounds.bbox.min_x > 0.49 && bounds.bbox.min_x < 0.50);
        assert!(bounds.bbox.max_x <= 1.0 + 1e-9);

        let bounds = compute_bounds(&[merc, wgs]).unwrap();
        assert_eq!(bounds.crs, CrsCode::Epsg3857);
    }
}
