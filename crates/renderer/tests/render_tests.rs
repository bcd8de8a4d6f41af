//! End-to-end rendering behavior: nodata transparency, channel clamping,
//! fault containment, cancellation, and sampling failure propagation.

use pixel_script::compile;
use raster_source::{compute_bounds, GeoTransform, GridSource, RasterSource};
use renderer::engine::{render, RenderOutput};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tile_common::{BoundingBox, CrsCode, ScriptTileError, ScriptTileResult};

/// 2x2 single-band grid over (0,0)..(2,2) in WGS84, one value per pixel.
fn grid_2x2(values: [f64; 4], nodata: Option<f64>) -> (String, Arc<dyn RasterSource>) {
    let source = GridSource::from_parts(
        "mem:v",
        2,
        2,
        1,
        CrsCode::Epsg4326,
        GeoTransform {
            origin_x: 0.0,
            origin_y: 2.0,
            pixel_size_x: 1.0,
            pixel_size_y: 1.0,
        },
        vec![nodata],
        values.to_vec(),
    );
    ("v".to_string(), Arc::new(source) as Arc<dyn RasterSource>)
}

fn render_2x2(
    script_source: &str,
    values: [f64; 4],
    nodata: Option<f64>,
) -> ScriptTileResult<RenderOutput> {
    let inputs = vec![grid_2x2(values, nodata)];
    let script = compile(script_source, &["v".to_string()])?;
    let bounds = compute_bounds(&inputs)?;
    render(&script, &inputs, &bounds, 2, 2, &AtomicBool::new(false))
}

fn pixel(out: &RenderOutput, x: usize, y: usize) -> [u8; 4] {
    let start = (y * out.width + x) * 4;
    out.pixels[start..start + 4].try_into().unwrap()
}

#[test]
fn test_identity_passthrough() {
    // Output pixels line up with grid pixels, so each band value lands in
    // its own output pixel
    let out = render_2x2(
        "return [v[0], v[0], v[0], 255]",
        [0.0, 64.0, 128.0, 255.0],
        None,
    )
    .unwrap();
    assert_eq!(out.fault_count, 0);
    assert_eq!(pixel(&out, 0, 0), [0, 0, 0, 255]);
    assert_eq!(pixel(&out, 1, 0), [64, 64, 64, 255]);
    assert_eq!(pixel(&out, 0, 1), [128, 128, 128, 255]);
    assert_eq!(pixel(&out, 1, 1), [255, 255, 255, 255]);
}

#[test]
fn test_channel_clamp() {
    // Negative floors to 0, overflow caps at 255, fractions round
    let out = render_2x2(
        "return [v[0], 0, 0, 255]",
        [-10.0, 300.5, 0.4, 0.6],
        None,
    )
    .unwrap();
    assert_eq!(pixel(&out, 0, 0)[0], 0);
    assert_eq!(pixel(&out, 1, 0)[0], 255);
    assert_eq!(pixel(&out, 0, 1)[0], 0);
    assert_eq!(pixel(&out, 1, 1)[0], 1);
}

#[test]
fn test_nan_channel_clamps_to_zero() {
    let out = render_2x2("return [0 / 0, 100, 100, 255]", [1.0, 1.0, 1.0, 1.0], None).unwrap();
    assert_eq!(out.fault_count, 0);
    assert_eq!(pixel(&out, 0, 0), [0, 100, 100, 255]);
}

#[test]
fn test_all_nodata_forces_transparency() {
    // The script unconditionally returns opaque white; nodata pixels must
    // still come out fully transparent
    let out = render_2x2(
        "return [255, 255, 255, 255]",
        [5.0, -9999.0, 5.0, -9999.0],
        Some(-9999.0),
    )
    .unwrap();
    assert_eq!(out.fault_count, 0);
    assert_eq!(pixel(&out, 0, 0), [255, 255, 255, 255]);
    assert_eq!(pixel(&out, 1, 0), [0, 0, 0, 0]);
    assert_eq!(pixel(&out, 0, 1), [255, 255, 255, 255]);
    assert_eq!(pixel(&out, 1, 1), [0, 0, 0, 0]);
}

#[test]
fn test_partial_nodata_feeds_nan_to_script() {
    // Two inputs; `b` is nodata everywhere, `a` is valid, so the script
    // still runs and sees NaN for b's bands
    let a = grid_2x2([10.0, 10.0, 10.0, 10.0], None);
    let b = {
        let (_, source) = grid_2x2([-1.0, -1.0, -1.0, -1.0], Some(-1.0));
        ("b".to_string(), source)
    };
    let inputs = vec![("a".to_string(), a.1), b];
    let script = compile(
        "return [a[0] * 10, b[0], 0, 255]",
        &["a".to_string(), "b".to_string()],
    )
    .unwrap();
    let bounds = compute_bounds(&inputs).unwrap();
    let out = render(&script, &inputs, &bounds, 2, 2, &AtomicBool::new(false)).unwrap();

    assert_eq!(out.fault_count, 0);
    // NaN from the nodata input clamps to 0, alpha stays opaque
    assert_eq!(pixel(&out, 0, 0), [100, 0, 0, 255]);
}

#[test]
fn test_faults_are_contained_per_pixel() {
    // Pixels above 100 hit a two-channel return, a structural fault; the
    // rest of the image still renders
    let out = render_2x2(
        "if (v[0] > 100) { return [1, 2] } return [0, 255, 0, 255]",
        [50.0, 150.0, 50.0, 200.0],
        None,
    )
    .unwrap();
    assert_eq!(out.fault_count, 2);
    assert_eq!(pixel(&out, 0, 0), [0, 255, 0, 255]);
    assert_eq!(pixel(&out, 1, 0), [0, 0, 0, 0]);
    assert_eq!(pixel(&out, 0, 1), [0, 255, 0, 255]);
    assert_eq!(pixel(&out, 1, 1), [0, 0, 0, 0]);
}

#[test]
fn test_three_channel_return_gets_opaque_alpha() {
    let out = render_2x2("return [v[0], 0, 0]", [9.0, 9.0, 9.0, 9.0], None).unwrap();
    assert_eq!(pixel(&out, 0, 0), [9, 0, 0, 255]);
}

#[test]
fn test_pre_cancelled_render_is_aborted() {
    let inputs = vec![grid_2x2([1.0, 1.0, 1.0, 1.0], None)];
    let script = compile("return [v[0], 0, 0, 255]", &["v".to_string()]).unwrap();
    let bounds = compute_bounds(&inputs).unwrap();
    let err = render(&script, &inputs, &bounds, 64, 64, &AtomicBool::new(true)).unwrap_err();
    assert!(matches!(err, ScriptTileError::RenderError(_)));
}

#[test]
fn test_zero_size_rejected() {
    let inputs = vec![grid_2x2([1.0, 1.0, 1.0, 1.0], None)];
    let script = compile("return [0, 0, 0, 255]", &["v".to_string()]).unwrap();
    let bounds = compute_bounds(&inputs).unwrap();
    let err = render(&script, &inputs, &bounds, 0, 256, &AtomicBool::new(false)).unwrap_err();
    assert!(matches!(err, ScriptTileError::InvalidParameter { .. }));
}

/// A source whose pixel reads fail, standing in for a dataset that became
/// unreadable mid-render.
struct BrokenSource;

impl RasterSource for BrokenSource {
    fn id(&self) -> &str {
        "file:broken.grid"
    }
    fn band_count(&self) -> usize {
        1
    }
    fn nodata(&self, _band: usize) -> Option<f64> {
        None
    }
    fn crs(&self) -> CrsCode {
        CrsCode::Epsg4326
    }
    fn geo_transform(&self) -> GeoTransform {
        GeoTransform {
            origin_x: 0.0,
            origin_y: 2.0,
            pixel_size_x: 1.0,
            pixel_size_y: 1.0,
        }
    }
    fn raster_size(&self) -> (usize, usize) {
        (2, 2)
    }
    fn read_pixel(&self, _col: usize, _row: usize) -> ScriptTileResult<Vec<f64>> {
        Err(ScriptTileError::InternalError("read error".to_string()))
    }
}

#[test]
fn test_read_failure_aborts_whole_render() {
    let inputs = vec![(
        "v".to_string(),
        Arc::new(BrokenSource) as Arc<dyn RasterSource>,
    )];
    let script = compile("return [v[0], 0, 0, 255]", &["v".to_string()]).unwrap();
    let bounds = compute_bounds(&inputs).unwrap();
    assert_eq!(bounds.bbox, BoundingBox::new(0.0, 0.0, 2.0, 2.0));

    let err = render(&script, &inputs, &bounds, 4, 4, &AtomicBool::new(false)).unwrap_err();
    match err {
        ScriptTileError::SamplingFailure { source_id, .. } => {
            assert_eq!(source_id, "file:broken.grid")
        }
        other => panic!("expected SamplingFailure, got {other:?}"),
    }
}

#[test]
fn test_transparent_output_helper() {
    let out = RenderOutput::transparent(3, 2);
    assert_eq!(out.pixels.len(), 3 * 2 * 4);
    assert!(out.pixels.iter().all(|&b| b == 0));
    assert_eq!(out.fault_count, 0);
}
