//! The built-in grid container: an in-memory, pixel-interleaved,
//! multi-band f64 raster, optionally loaded from a minimal on-disk format.
//!
//! This is the stand-in decode capability; real raster format parsing is
//! out of scope. The file layout is a fixed header followed by
//! little-endian f64 samples in row-major, pixel-interleaved order.

use crate::source::{GeoTransform, RasterSource};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tile_common::{CrsCode, ScriptTileError, ScriptTileResult};

/// File magic, including a format version byte.
const GRID_MAGIC: &[u8; 8] = b"TSGRID\x00\x01";

/// An in-memory multi-band raster grid.
#[derive(Debug, Clone)]
pub struct GridSource {
    id: String,
    width: usize,
    height: usize,
    bands: usize,
    crs: CrsCode,
    transform: GeoTransform,
    /// One entry per band.
    nodata: Vec<Option<f64>>,
    /// Pixel-interleaved, row-major: `data[(row * width + col) * bands + band]`.
    data: Vec<f64>,
}

impl GridSource {
    /// Build a grid from parts. Panics if `data` does not match the
    /// declared dimensions; this constructor is for tests and tooling.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: impl Into<String>,
        width: usize,
        height: usize,
        bands: usize,
        crs: CrsCode,
        transform: GeoTransform,
        nodata: Vec<Option<f64>>,
        data: Vec<f64>,
    ) -> Self {
        assert_eq!(data.len(), width * height * bands, "data size mismatch");
        assert_eq!(nodata.len(), bands, "nodata entries must match band count");
        Self {
            id: id.into(),
            width,
            height,
            bands,
            crs,
            transform,
            nodata,
            data,
        }
    }

    /// Load a grid file, reading the whole dataset into memory so later
    /// sampling never touches the filesystem.
    pub fn from_file(id: &str, path: &Path) -> ScriptTileResult<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScriptTileError::SourceNotFound(id.to_string())
            } else {
                decode_err(id, e.to_string())
            }
        })?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        read_exact(&mut reader, &mut magic, id)?;
        if &magic != GRID_MAGIC {
            return Err(ScriptTileError::UnsupportedFormat(id.to_string()));
        }

        let width = read_u32(&mut reader, id)? as usize;
        let height = read_u32(&mut reader, id)? as usize;
        let bands = read_u32(&mut reader, id)? as usize;
        let epsg = read_u32(&mut reader, id)?;
        if width == 0 || height == 0 || bands == 0 {
            return Err(decode_err(id, "zero-sized raster".to_string()));
        }
        // Unsupported EPSG codes surface as IncompatibleCrs, not a decode
        // failure
        let crs = CrsCode::from_epsg_string(&format!("EPSG:{}", epsg))?;

        let transform = GeoTransform {
            origin_x: read_f64(&mut reader, id)?,
            origin_y: read_f64(&mut reader, id)?,
            pixel_size_x: read_f64(&mut reader, id)?,
            pixel_size_y: read_f64(&mut reader, id)?,
        };
        if transform.pixel_size_x <= 0.0 || transform.pixel_size_y <= 0.0 {
            return Err(decode_err(id, "non-positive pixel size".to_string()));
        }

        let mut nodata = Vec::with_capacity(bands);
        for _ in 0..bands {
            let mut flag = [0u8; 1];
            read_exact(&mut reader, &mut flag, id)?;
            let value = read_f64(&mut reader, id)?;
            nodata.push(if flag[0] != 0 { Some(value) } else { None });
        }

        let samples = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(bands))
            .ok_or_else(|| decode_err(id, "raster dimensions overflow".to_string()))?;
        let mut data = Vec::with_capacity(samples);
        let mut buf = [0u8; 8];
        for _ in 0..samples {
            read_exact(&mut reader, &mut buf, id)?;
            data.push(f64::from_le_bytes(buf));
        }

        Ok(Self {
            id: id.to_string(),
            width,
            height,
            bands,
            crs,
            transform,
            nodata,
            data,
        })
    }

    /// Write the grid in the on-disk layout `from_file` reads.
    pub fn write_file(&self, path: &Path) -> ScriptTileResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(GRID_MAGIC)?;
        writer.write_all(&(self.width as u32).to_le_bytes())?;
        writer.write_all(&(self.height as u32).to_le_bytes())?;
        writer.write_all(&(self.bands as u32).to_le_bytes())?;
        writer.write_all(&self.crs.epsg().to_le_bytes())?;
        writer.write_all(&self.transform.origin_x.to_le_bytes())?;
        writer.write_all(&self.transform.origin_y.to_le_bytes())?;
        writer.write_all(&self.transform.pixel_size_x.to_le_bytes())?;
        writer.write_all(&self.transform.pixel_size_y.to_le_bytes())?;
        for nd in &self.nodata {
            writer.write_all(&[nd.is_some() as u8])?;
            writer.write_all(&nd.unwrap_or(0.0).to_le_bytes())?;
        }
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl RasterSource for GridSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn band_count(&self) -> usize {
        self.bands
    }

    fn nodata(&self, band: usize) -> Option<f64> {
        self.nodata.get(band).copied().flatten()
    }

    fn crs(&self) -> CrsCode {
        self.crs
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn raster_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn read_pixel(&self, col: usize, row: usize) -> ScriptTileResult<Vec<f64>> {
        let start = (row * self.width + col) * self.bands;
        Ok(self.data[start..start + self.bands].to_vec())
    }
}

fn decode_err(id: &str, message: String) -> ScriptTileError {
    ScriptTileError::DecodeFailure {
        source_id: id.to_string(),
        message,
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], id: &str) -> ScriptTileResult<()> {
    reader
        .read_exact(buf)
        .map_err(|e| decode_err(id, format!("truncated grid file: {}", e)))
}

fn read_u32<R: Read>(reader: &mut R, id: &str) -> ScriptTileResult<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, id)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R, id: &str) -> ScriptTileResult<f64> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf, id)?;
    Ok(f64::from_le_bytes(buf))
}
