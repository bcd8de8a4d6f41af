//! The pixel evaluation engine: runs a compiled script over every pixel
//! of the output image, sampling each declared source at the pixel's
//! geographic location.
//!
//! Rows are processed in parallel blocks on the rayon pool. The script and
//! all source handles are shared read-only, so the only cross-thread state
//! is the fault counter and the abort slot.

use pixel_script::CompiledScript;
use raster_source::{BoundsResult, RasterSource};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tile_common::{crs, ScriptTileError, ScriptTileResult};
use tracing::debug;

/// Rows per parallel work unit. Cancellation is observed between blocks,
/// so this bounds how much work a cancelled render still finishes.
const ROW_BLOCK: usize = 32;

/// A rendered RGBA image plus per-render bookkeeping.
#[derive(Debug)]
pub struct RenderOutput {
    /// Row-major RGBA bytes, 4 per pixel.
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Pixels where script evaluation faulted and was painted transparent.
    pub fault_count: u64,
}

impl RenderOutput {
    /// A fully transparent image, for tiles that miss the data extent.
    pub fn transparent(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![0; width * height * 4],
            width,
            height,
            fault_count: 0,
        }
    }
}

/// Render `script` over `bounds` at the requested pixel dimensions.
///
/// `inputs` must be in the script's declared order. Per pixel, each source
/// is sampled at the pixel center (reprojected from the reference CRS to
/// the source's own CRS); a nodata or out-of-extent sample binds the
/// input's bands as NaN. A pixel where every input is nodata is forced
/// transparent without evaluating the script. A script fault paints that
/// one pixel transparent and increments the fault count; only a source
/// read failure aborts the whole render.
///
/// `cancel` is checked between row blocks; a cancelled render returns
/// `RenderError` without finishing remaining blocks.
pub fn render(
    script: &CompiledScript,
    inputs: &[(String, Arc<dyn RasterSource>)],
    bounds: &BoundsResult,
    width: usize,
    height: usize,
    cancel: &AtomicBool,
) -> ScriptTileResult<RenderOutput> {
    if width == 0 || height == 0 {
        return Err(ScriptTileError::InvalidParameter {
            param: "size".to_string(),
            message: "width and height must be positive".to_string(),
        });
    }
    debug_assert_eq!(script.input_names().len(), inputs.len());

    let x_step = bounds.bbox.width() / width as f64;
    let y_step = bounds.bbox.height() / height as f64;

    let fault_count = AtomicU64::new(0);
    let abort: Mutex<Option<ScriptTileError>> = Mutex::new(None);
    let aborted = AtomicBool::new(false);

    let mut pixels = vec![0u8; width * height * 4];

    pixels
        .par_chunks_mut(ROW_BLOCK * width * 4)
        .enumerate()
        .for_each(|(block, rows)| {
            if cancel.load(Ordering::Relaxed) || aborted.load(Ordering::Relaxed) {
                return;
            }
            let first_row = block * ROW_BLOCK;

            // One sample buffer per input, reused across the block's pixels
            let mut bands: Vec<Vec<f64>> = inputs
                .iter()
                .map(|(_, source)| vec![f64::NAN; source.band_count()])
                .collect();

            'rows: for (r, row) in rows.chunks_mut(width * 4).enumerate() {
                let geo_y = bounds.bbox.max_y - (first_row + r) as f64 * y_step - y_step / 2.0;

                for (x, pixel) in row.chunks_mut(4).enumerate() {
                    let geo_x = bounds.bbox.min_x + (x as f64 + 0.5) * x_step;

                    let mut all_nodata = true;
                    for (i, (_, source)) in inputs.iter().enumerate() {
                        let (sx, sy) =
                            crs::transform_point(bounds.crs, source.crs(), geo_x, geo_y);
                        match source.sample(sx, sy) {
                            Ok(Some(values)) => {
                                bands[i] = values;
                                all_nodata = false;
                            }
                            Ok(None) => {
                                bands[i] = vec![f64::NAN; source.band_count()];
                            }
                            Err(e) => {
                                let mut slot = match abort.lock() {
                                    Ok(slot) => slot,
                                    Err(poisoned) => poisoned.into_inner(),
                                };
                                slot.get_or_insert(sampling_failure(source.as_ref(), e));
                                aborted.store(true, Ordering::Relaxed);
                                break 'rows;
                            }
                        }
                    }

                    if all_nodata {
                        pixel.fill(0);
                        continue;
                    }

                    match script.eval_pixel(&bands) {
                        Ok(channels) => {
                            for (out, value) in pixel.iter_mut().zip(channels) {
                                *out = clamp_channel(value);
                            }
                        }
                        Err(_) => {
                            pixel.fill(0);
                            fault_count.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        });

    if let Some(err) = abort.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(err);
    }
    if cancel.load(Ordering::Relaxed) {
        return Err(ScriptTileError::RenderError("render cancelled".to_string()));
    }

    let fault_count = fault_count.into_inner();
    if fault_count > 0 {
        debug!(fault_count, width, height, "render completed with pixel faults");
    }
    Ok(RenderOutput {
        pixels,
        width,
        height,
        fault_count,
    })
}

/// Map a channel value to a byte: NaN becomes 0, everything else is
/// rounded then clamped to [0, 255].
fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

fn sampling_failure(source: &dyn RasterSource, err: ScriptTileError) -> ScriptTileError {
    match err {
        e @ ScriptTileError::SamplingFailure { .. } => e,
        other => ScriptTileError::SamplingFailure {
            source_id: source.id().to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_channel() {
        assert_eq!(clamp_channel(-3.0), 0);
        assert_eq!(clamp_channel(0.0), 0);
        assert_eq!(clamp_channel(127.4), 127);
        assert_eq!(clamp_channel(127.5), 128);
        assert_eq!(clamp_channel(300.0), 255);
        assert_eq!(clamp_channel(f64::NAN), 0);
        assert_eq!(clamp_channel(f64::INFINITY), 255);
        assert_eq!(clamp_channel(f64::NEG_INFINITY), 0);
    }
}
