//! The request pipeline shared by the bounds, render, and tile endpoints:
//! compile the script, resolve sources, compute bounds, then (for image
//! endpoints) run the pixel loop on the blocking pool and PNG-encode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pixel_script::CompiledScript;
use raster_source::{compute_bounds, BoundsResult, RasterSource, SourceRegistry};
use renderer::engine::{render, RenderOutput};
use renderer::png;
use serde::Serialize;
use tile_common::{crs, CrsCode, PolygonGeometry, ScriptTileError, ScriptTileResult, TileCoord};
use tracing::{debug, info};

use crate::request::CustomScriptRequest;
use crate::state::AppState;

/// Body served by `POST /bounds`: WGS84 rectangle plus GeoJSON polygon.
#[derive(Debug, Serialize)]
pub struct BoundsResponse {
    pub bbox: [f64; 4],
    pub polygon: PolygonGeometry,
}

/// An encoded render, ready for the HTTP layer.
#[derive(Debug)]
pub struct RenderedImage {
    pub png: Vec<u8>,
    pub fault_count: u64,
}

/// Flips a render's cancellation flag when dropped.
///
/// Held across the blocking-pool await: axum drops the handler future on
/// client disconnect, which drops the guard, and the pixel loop observes
/// the flag at its next row block instead of rendering for nobody.
struct CancelGuard(Arc<AtomicBool>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Compile the script and resolve every declared source.
///
/// Compilation runs first so a broken script is rejected without opening
/// any source; both steps happen before any pixel work.
fn prepare(
    state: &AppState,
    request: &CustomScriptRequest,
) -> ScriptTileResult<(CompiledScript, Vec<(String, Arc<dyn RasterSource>)>, BoundsResult)> {
    request.validate()?;
    let script = pixel_script::compile(&request.script, &request.input_names())?;

    let mut registry = SourceRegistry::new(Arc::clone(&state.opener));
    let sources = registry.resolve_all(&request.inputs)?;
    let bounds = compute_bounds(&sources)?;
    debug!(
        inputs = sources.len(),
        crs = ?bounds.crs,
        "request prepared"
    );
    Ok((script, sources, bounds))
}

/// Resolve the request's combined bounds, for `POST /bounds`.
pub async fn execute_bounds(
    state: Arc<AppState>,
    request: CustomScriptRequest,
) -> ScriptTileResult<BoundsResponse> {
    let bounds = run_blocking(move || {
        let (_, _, bounds) = prepare(&state, &request)?;
        Ok(bounds)
    })
    .await?;

    Ok(BoundsResponse {
        bbox: bounds.wgs84_bbox().to_array(),
        polygon: bounds.to_polygon(),
    })
}

/// Render the full request extent at the given dimensions.
pub async fn execute_render(
    state: Arc<AppState>,
    request: CustomScriptRequest,
    width: u32,
    height: u32,
) -> ScriptTileResult<RenderedImage> {
    let metrics = Arc::clone(&state.metrics);
    let timer = crate::metrics::Timer::start();
    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelGuard(Arc::clone(&cancel));

    let result = run_blocking(move || {
        let (script, sources, bounds) = prepare(&state, &request)?;
        let output = render(
            &script,
            &sources,
            &bounds,
            width as usize,
            height as usize,
            &cancel,
        )?;
        encode(output)
    })
    .await;

    finish_render(&metrics, timer, result).await
}

/// Render one Web Mercator XYZ tile window, for `POST /tile/:z/:x/:y`.
///
/// The tile is rendered in EPSG:3857 directly; sources are reprojected per
/// pixel as usual. A tile entirely outside the request's combined bounds
/// short-circuits to a transparent PNG without touching the pixel loop.
pub async fn execute_tile(
    state: Arc<AppState>,
    request: CustomScriptRequest,
    tile: TileCoord,
) -> ScriptTileResult<RenderedImage> {
    if !tile.is_valid() {
        return Err(ScriptTileError::InvalidParameter {
            param: "tile".to_string(),
            message: format!("{}/{}/{} is outside the tile matrix", tile.z, tile.x, tile.y),
        });
    }

    let metrics = Arc::clone(&state.metrics);
    let timer = crate::metrics::Timer::start();
    let size = tile_common::TILE_SIZE as usize;
    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelGuard(Arc::clone(&cancel));

    let result = run_blocking(move || {
        let (script, sources, bounds) = prepare(&state, &request)?;

        let tile_bbox = tile.bbox_3857();
        let data_bbox_3857 = crs::transform_bbox(bounds.crs, CrsCode::Epsg3857, &bounds.bbox);
        if !tile_bbox.intersects(&data_bbox_3857) {
            info!(z = tile.z, x = tile.x, y = tile.y, "tile outside data extent");
            return encode(RenderOutput::transparent(size, size));
        }

        let tile_bounds = BoundsResult {
            bbox: tile_bbox,
            crs: CrsCode::Epsg3857,
            resolution: tile.resolution(),
        };
        let output = render(&script, &sources, &tile_bounds, size, size, &cancel)?;
        encode(output)
    })
    .await;

    finish_render(&metrics, timer, result).await
}

/// PNG-encode a render, timing the encode separately from the pixel loop.
fn encode(output: RenderOutput) -> ScriptTileResult<(RenderedImage, u64)> {
    let timer = crate::metrics::Timer::start();
    let png = png::encode_auto(&output.pixels, output.width, output.height)?;
    Ok((
        RenderedImage {
            png,
            fault_count: output.fault_count,
        },
        timer.elapsed_us(),
    ))
}

async fn finish_render(
    metrics: &crate::metrics::MetricsCollector,
    timer: crate::metrics::Timer,
    result: ScriptTileResult<(RenderedImage, u64)>,
) -> ScriptTileResult<RenderedImage> {
    metrics
        .record_render(timer.elapsed_us(), result.is_ok())
        .await;
    match result {
        Ok((image, encode_us)) => {
            metrics.record_pixel_faults(image.fault_count);
            metrics.record_png_encode(encode_us).await;
            Ok(image)
        }
        Err(err) => Err(err),
    }
}

/// Bridge the CPU-bound pipeline onto the blocking pool so the async
/// worker threads stay free for request plumbing.
async fn run_blocking<T, F>(work: F) -> ScriptTileResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ScriptTileResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ScriptTileError::InternalError(format!("render task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExampleCatalog;
    use raster_source::{GeoTransform, GridSource, SourceOpener};
    use tile_common::CrsCode;

    /// Serves a fixed 2x2 world-spanning grid for any identifier.
    struct MemOpener;

    impl SourceOpener for MemOpener {
        fn open(&self, identifier: &str) -> ScriptTileResult<Arc<dyn RasterSource>> {
            if identifier == "mem:missing" {
                return Err(ScriptTileError::SourceNotFound(identifier.to_string()));
            }
            Ok(Arc::new(GridSource::from_parts(
                identifier,
                2,
                2,
                3,
                CrsCode::Epsg4326,
                GeoTransform {
                    origin_x: -180.0,
                    origin_y: 85.0,
                    pixel_size_x: 180.0,
                    pixel_size_y: 85.0,
                },
                vec![None, None, None],
                vec![
                    10.0, 20.0, 30.0, 40.0, 50.0, 60.0, //
                    70.0, 80.0, 90.0, 100.0, 110.0, 120.0,
                ],
            )))
        }
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::with_opener(
            Arc::new(MemOpener),
            ExampleCatalog::default(),
        ))
    }

    fn rgb_request() -> CustomScriptRequest {
        CustomScriptRequest {
            inputs: vec![("rgb".to_string(), "mem:demo".to_string())],
            script: "return [rgb[0], rgb[1], rgb[2], 255]".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bounds_pipeline() {
        let response = execute_bounds(test_state(), rgb_request()).await.unwrap();
        assert_eq!(response.bbox, [-180.0, -85.0, 180.0, 85.0]);
    }

    #[tokio::test]
    async fn test_render_pipeline_produces_png() {
        let image = execute_render(test_state(), rgb_request(), 32, 32)
            .await
            .unwrap();
        assert_eq!(&image.png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        assert_eq!(image.fault_count, 0);
    }

    #[tokio::test]
    async fn test_compile_error_precedes_resolution() {
        let request = CustomScriptRequest {
            inputs: vec![("rgb".to_string(), "mem:missing".to_string())],
            script: "return [undeclared[0], 0, 0, 255]".to_string(),
        };
        // The script error must win even though the source would also fail
        let err = execute_bounds(test_state(), request).await.unwrap_err();
        assert!(matches!(err, ScriptTileError::UndeclaredInputReference(_)));
    }

    #[tokio::test]
    async fn test_missing_source_surfaces() {
        let request = CustomScriptRequest {
            inputs: vec![("rgb".to_string(), "mem:missing".to_string())],
            script: "return [rgb[0], 0, 0, 255]".to_string(),
        };
        let err = execute_render(test_state(), request, 16, 16).await.unwrap_err();
        assert!(matches!(err, ScriptTileError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_tile_inside_and_outside_extent() {
        // Zoom 1, tile (0,0): north-west quadrant, overlaps the data
        let image = execute_tile(test_state(), rgb_request(), TileCoord::new(1, 0, 0))
            .await
            .unwrap();
        assert_eq!(&image.png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);

        // An invalid coordinate is rejected outright
        let err = execute_tile(test_state(), rgb_request(), TileCoord::new(1, 5, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptTileError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_render_records_encode_timing() {
        let state = test_state();
        execute_render(Arc::clone(&state), rgb_request(), 16, 16)
            .await
            .unwrap();

        let snapshot = state.metrics.snapshot().await;
        assert_eq!(snapshot.png_encode_count, 1);
        assert_eq!(snapshot.renders_total, 1);
    }

    #[tokio::test]
    async fn test_dropped_guard_cancels_render() {
        let cancel = Arc::new(AtomicBool::new(false));
        let guard = CancelGuard(Arc::clone(&cancel));
        assert!(!cancel.load(Ordering::Relaxed));
        drop(guard);
        assert!(cancel.load(Ordering::Relaxed));
    }
}
