//! Decoding one TIFF plane into 16-bit samples.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{TiffError, VolumeError};
use crate::io::RangeReader;
use crate::volume::{copy_rows, SampleEndian, SourceLayout, IN_MEMORY_BYTES_PER_SAMPLE};

use super::directory::{ChunkLayout, PlaneDirectory};
use super::parser::ByteOrder;
use super::tags::Compression;

/// Decompress one strip or tile.
///
/// `expected_len` is the decoded size; it bounds the output of codecs that
/// do not record it.
pub fn decompress_chunk(
    compression: u16,
    data: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>, TiffError> {
    match Compression::from_u16(compression) {
        Some(Compression::None) => Ok(data.to_vec()),
        Some(Compression::Deflate) | Some(Compression::AdobeDeflate) => {
            let mut out = Vec::with_capacity(expected_len);
            ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| TiffError::Decompression(format!("deflate: {}", e)))?;
            Ok(out)
        }
        Some(Compression::PackBits) => Ok(unpack_bits(data, expected_len)),
        Some(other) => Err(TiffError::UnsupportedCompression(other.name().to_string())),
        None => Err(TiffError::UnsupportedCompression(format!(
            "unknown ({})",
            compression
        ))),
    }
}

/// Decode a PackBits run-length stream.
fn unpack_bits(data: &[u8], expected_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(expected_len);
    let mut i = 0;
    while i < data.len() && out.len() < expected_len {
        let n = data[i] as i8;
        i += 1;
        if n >= 0 {
            let len = n as usize + 1;
            let end = (i + len).min(data.len());
            out.extend_from_slice(&data[i..end]);
            i = end;
        } else if n != -128 {
            let len = (1 - n as isize) as usize;
            if let Some(&byte) = data.get(i) {
                out.extend(std::iter::repeat(byte).take(len));
            }
            i += 1;
        }
    }
    out.truncate(expected_len);
    out
}

/// Read and decode the plane described by `dir` into `dest`.
///
/// `dest` receives `width * height` 16-bit little-endian samples.
pub async fn read_plane_into<R: RangeReader + ?Sized>(
    reader: &R,
    byte_order: ByteOrder,
    dir: &PlaneDirectory,
    dest: &mut [u8],
) -> Result<(), VolumeError> {
    if dir.samples_per_pixel != 1 {
        return Err(VolumeError::unsupported(format!(
            "{} samples per pixel; only single-channel planes are supported",
            dir.samples_per_pixel
        )));
    }
    if dir.predictor != 1 {
        return Err(VolumeError::unsupported(format!(
            "TIFF predictor {}",
            dir.predictor
        )));
    }
    let bytes_per_sample = match dir.bits_per_sample {
        8 => 1,
        16 => 2,
        other => {
            return Err(VolumeError::unsupported(format!(
                "unexpected TIFF pixel size {} bits",
                other
            )))
        }
    };

    let plane_bytes = dir.width as usize * dir.height as usize * IN_MEMORY_BYTES_PER_SAMPLE;
    if dest.len() < plane_bytes {
        return Err(VolumeError::out_of_bounds(format!(
            "destination holds {} bytes, plane needs {}",
            dest.len(),
            plane_bytes
        )));
    }

    let endian = match byte_order {
        ByteOrder::LittleEndian => SampleEndian::Little,
        ByteOrder::BigEndian => SampleEndian::Big,
    };
    let dest_row_bytes = dir.width as usize * IN_MEMORY_BYTES_PER_SAMPLE;

    match &dir.layout {
        ChunkLayout::Tiles {
            tile_width,
            tile_length,
            offsets,
            byte_counts,
        } => {
            let tiles_across = dir.width.div_ceil((*tile_width).max(1));
            let tiles_down = dir.height.div_ceil((*tile_length).max(1));
            if offsets.len() != 1 || tiles_across * tiles_down != 1 {
                return Err(VolumeError::unsupported(format!(
                    "{} tiles per plane; only one tile per plane is supported",
                    offsets.len().max((tiles_across * tiles_down) as usize)
                )));
            }

            let row_stride = *tile_width as usize * bytes_per_sample;
            let expected = row_stride * *tile_length as usize;
            let raw = reader
                .read_exact_at(offsets[0], byte_counts[0] as usize)
                .await?;
            let tile = decompress_chunk(dir.compression, &raw, expected)?;
            let layout = SourceLayout {
                bits: dir.bits_per_sample,
                row_stride,
                endian,
            };
            copy_rows(&tile, layout, dir.width, dir.height, dest)?;
        }
        ChunkLayout::Strips {
            rows_per_strip,
            offsets,
            byte_counts,
        } => {
            let strips_needed = dir.height.div_ceil(*rows_per_strip) as usize;
            if offsets.len() < strips_needed {
                return Err(VolumeError::malformed(format!(
                    "{} strips for {} rows of {} per strip",
                    offsets.len(),
                    dir.height,
                    rows_per_strip
                )));
            }

            let layout = SourceLayout::packed(dir.bits_per_sample, dir.width, endian);
            for strip in 0..strips_needed {
                let first_row = strip as u32 * rows_per_strip;
                let rows = (*rows_per_strip).min(dir.height - first_row);
                let expected = rows as usize * layout.row_stride;

                let raw = reader
                    .read_exact_at(offsets[strip], byte_counts[strip] as usize)
                    .await?;
                let decoded = decompress_chunk(dir.compression, &raw, expected)?;
                let start = first_row as usize * dest_row_bytes;
                copy_rows(&decoded, layout, dir.width, rows, &mut dest[start..])?;
            }
        }
    }

    Ok(())
}
