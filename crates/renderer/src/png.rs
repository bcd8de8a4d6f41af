//! PNG encoding for rendered images.
//!
//! Two output modes: indexed (color type 3, PLTE plus tRNS) when the image
//! holds at most 256 distinct RGBA colors, and plain RGBA (color type 6)
//! otherwise. Script output tends to be quantized color maps, so the
//! indexed path is the common case and cuts tile sizes substantially.

use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use tile_common::ScriptTileResult;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const MAX_PALETTE: usize = 256;

/// Below this pixel count a parallel palette pass costs more than it saves.
const PARALLEL_MIN_PIXELS: usize = 4096;

/// Encode RGBA pixels, picking indexed or truecolor automatically.
pub fn encode_auto(pixels: &[u8], width: usize, height: usize) -> ScriptTileResult<Vec<u8>> {
    let palette = if pixels.len() / 4 >= PARALLEL_MIN_PIXELS {
        build_palette_parallel(pixels)
    } else {
        build_palette(pixels)
    };
    match palette {
        Some((palette, indices)) => encode_indexed(width, height, &palette, &indices),
        None => encode_rgba(pixels, width, height),
    }
}

/// Encode as truecolor RGBA (color type 6).
pub fn encode_rgba(pixels: &[u8], width: usize, height: usize) -> ScriptTileResult<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut out, b"IHDR", &ihdr(width, height, 6));
    let idat = compress_scanlines(pixels, width * 4, height)?;
    write_chunk(&mut out, b"IDAT", &idat);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

/// Encode as indexed color (type 3) with a tRNS alpha table when any
/// palette entry is not fully opaque.
fn encode_indexed(
    width: usize,
    height: usize,
    palette: &[[u8; 4]],
    indices: &[u8],
) -> ScriptTileResult<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut out, b"IHDR", &ihdr(width, height, 3));

    let mut plte = Vec::with_capacity(palette.len() * 3);
    for color in palette {
        plte.extend_from_slice(&color[..3]);
    }
    write_chunk(&mut out, b"PLTE", &plte);

    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut out, b"tRNS", &trns);
    }

    let idat = compress_scanlines(indices, width, height)?;
    write_chunk(&mut out, b"IDAT", &idat);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

fn ihdr(width: usize, height: usize, color_type: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&(width as u32).to_be_bytes());
    data.extend_from_slice(&(height as u32).to_be_bytes());
    data.push(8); // bit depth
    data.push(color_type);
    data.push(0); // compression
    data.push(0); // filter
    data.push(0); // interlace
    data
}

fn write_chunk(out: &mut Vec<u8>, tag: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(data);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(tag);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Prefix each scanline with filter byte 0 and zlib-compress the stream.
fn compress_scanlines(data: &[u8], stride: usize, height: usize) -> ScriptTileResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(height * (stride + 1));
    for row in data.chunks_exact(stride).take(height) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

#[inline]
fn pack(pixel: &[u8]) -> u32 {
    u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]])
}

/// Single-pass palette build. Bails to `None` past 256 colors.
fn build_palette(pixels: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE);
    let mut palette: Vec<[u8; 4]> = Vec::with_capacity(MAX_PALETTE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for pixel in pixels.chunks_exact(4) {
        let packed = pack(pixel);
        let index = match lookup.get(&packed) {
            Some(&index) => index,
            None => {
                if palette.len() >= MAX_PALETTE {
                    return None;
                }
                let index = palette.len() as u8;
                lookup.insert(packed, index);
                palette.push([pixel[0], pixel[1], pixel[2], pixel[3]]);
                index
            }
        };
        indices.push(index);
    }
    Some((palette, indices))
}

/// Two-pass parallel palette build for large images: collect per-chunk
/// color sets, merge into one palette, then map pixels to indices in
/// parallel. First-occurrence order of the merged palette depends on
/// chunk order, which is deterministic.
fn build_palette_parallel(pixels: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let pixel_count = pixels.len() / 4;
    let chunk_pixels = (pixel_count / rayon::current_num_threads()).max(256);

    let chunk_colors: Vec<Vec<u32>> = pixels
        .par_chunks(chunk_pixels * 4)
        .map(|chunk| {
            let mut seen: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE);
            for pixel in chunk.chunks_exact(4) {
                seen.insert(pack(pixel), ());
                if seen.len() > MAX_PALETTE {
                    break;
                }
            }
            seen.into_keys().collect()
        })
        .collect();

    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE);
    let mut palette: Vec<[u8; 4]> = Vec::with_capacity(MAX_PALETTE);
    for packed in chunk_colors.into_iter().flatten() {
        if !lookup.contains_key(&packed) {
            if palette.len() >= MAX_PALETTE {
                return None;
            }
            lookup.insert(packed, palette.len() as u8);
            palette.push(packed.to_le_bytes());
        }
    }

    let mut indices = vec![0u8; pixel_count];
    indices
        .par_chunks_mut(chunk_pixels)
        .zip(pixels.par_chunks(chunk_pixels * 4))
        .for_each(|(index_chunk, pixel_chunk)| {
            for (index, pixel) in index_chunk.iter_mut().zip(pixel_chunk.chunks_exact(4)) {
                *index = lookup.get(&pack(pixel)).copied().unwrap_or(0);
            }
        });

    Some((palette, indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_dedup() {
        let pixels = [
            255, 0, 0, 255, //
            0, 255, 0, 255, //
            0, 0, 255, 255, //
            255, 0, 0, 255,
        ];
        let (palette, indices) = build_palette(&pixels).unwrap();
        assert_eq!(palette.len(), 3);
        assert_eq!(indices.len(), 4);
        assert_eq!(indices[0], indices[3]);
    }

    #[test]
    fn test_palette_overflow() {
        let mut pixels = Vec::new();
        for i in 0..300u32 {
            pixels.extend_from_slice(&[(i % 256) as u8, (i / 256) as u8, 0, 255]);
        }
        assert!(build_palette(&pixels).is_none());
    }

    #[test]
    fn test_parallel_matches_sequential_palette_size() {
        let mut pixels = Vec::with_capacity(128 * 128 * 4);
        for y in 0..128u32 {
            for x in 0..128u32 {
                let c = (((x / 8) + (y / 8)) % 40) as u8;
                pixels.extend_from_slice(&[c * 6, 255 - c * 3, c, 255]);
            }
        }
        let (seq, _) = build_palette(&pixels).unwrap();
        let (par, indices) = build_palette_parallel(&pixels).unwrap();
        assert_eq!(seq.len(), par.len());
        assert_eq!(indices.len(), 128 * 128);
    }

    #[test]
    fn test_encode_auto_signature_and_indexed_type() {
        let pixels = [
            10, 20, 30, 255, //
            10, 20, 30, 255, //
            40, 50, 60, 0, //
            40, 50, 60, 0,
        ];
        let png = encode_auto(&pixels, 2, 2).unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);
        // IHDR color type byte: 8 (sig) + 8 (len+tag) + 9 offset into data
        assert_eq!(png[8 + 8 + 9], 3);
        // Partially transparent palette forces a tRNS chunk
        assert!(png.windows(4).any(|w| w == b"tRNS"));
    }

    #[test]
    fn test_encode_auto_rgba_fallback() {
        let mut pixels = Vec::new();
        for i in 0..300u32 {
            pixels.extend_from_slice(&[(i % 256) as u8, (i / 2 % 256) as u8, 7, 255]);
        }
        let png = encode_auto(&pixels, 300, 1).unwrap();
        assert_eq!(png[8 + 8 + 9], 6);
    }

    #[test]
    fn test_indexed_smaller_for_quantized_tile() {
        let mut pixels = Vec::with_capacity(256 * 256 * 4);
        for y in 0..256u32 {
            for x in 0..256u32 {
                let band = ((x + y) / 32 % 16) as u8;
                pixels.extend_from_slice(&[band * 16, 128, 255 - band * 16, 255]);
            }
        }
        let indexed = encode_auto(&pixels, 256, 256).unwrap();
        let rgba = encode_rgba(&pixels, 256, 256).unwrap();
        assert!(indexed.len() < rgba.len());
    }
}
