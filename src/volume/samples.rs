//! Row copies from decoded source samples into 16-bit little-endian planes.
//!
//! Every in-memory volume stores 16 bits per sample. Sources with 16-bit
//! samples are copied row by row; 8-bit sources are zero-extended.

use crate::error::{IoError, VolumeError};

use super::dimensions::IN_MEMORY_BYTES_PER_SAMPLE;

/// Byte order of decoded 16-bit source samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEndian {
    Little,
    Big,
}

/// Description of a decoded source region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    /// Bits per source sample
    pub bits: u32,

    /// Bytes between the starts of consecutive source rows
    pub row_stride: usize,

    /// Byte order of 16-bit samples
    pub endian: SampleEndian,
}

impl SourceLayout {
    /// Tightly packed rows of `width` samples.
    pub fn packed(bits: u32, width: u32, endian: SampleEndian) -> Self {
        Self {
            bits,
            row_stride: width as usize * bits.div_ceil(8) as usize,
            endian,
        }
    }
}

/// Copy `rows` rows of `width` samples from `src` into `dest`.
///
/// `dest` is written as packed 16-bit little-endian rows of `width` samples.
/// Only 8-bit and 16-bit sources are accepted.
pub fn copy_rows(
    src: &[u8],
    layout: SourceLayout,
    width: u32,
    rows: u32,
    dest: &mut [u8],
) -> Result<(), VolumeError> {
    let width = width as usize;
    let rows = rows as usize;
    let src_row_bytes = match layout.bits {
        8 => width,
        16 => width * 2,
        other => {
            return Err(VolumeError::unsupported(format!(
                "cannot convert {}-bit samples to 16-bit",
                other
            )))
        }
    };
    let dest_row_bytes = width * IN_MEMORY_BYTES_PER_SAMPLE;

    if rows == 0 || width == 0 {
        return Ok(());
    }
    if layout.row_stride < src_row_bytes {
        return Err(VolumeError::malformed(format!(
            "row stride {} is smaller than row size {}",
            layout.row_stride, src_row_bytes
        )));
    }

    let src_needed = (rows - 1) * layout.row_stride + src_row_bytes;
    if src.len() < src_needed {
        return Err(VolumeError::Io(IoError::Io(format!(
            "short decode: expected {} bytes, got {}",
            src_needed,
            src.len()
        ))));
    }
    if dest.len() < rows * dest_row_bytes {
        return Err(VolumeError::out_of_bounds(format!(
            "destination holds {} bytes, need {}",
            dest.len(),
            rows * dest_row_bytes
        )));
    }

    for row in 0..rows {
        let src_row = &src[row * layout.row_stride..][..src_row_bytes];
        let dest_row = &mut dest[row * dest_row_bytes..][..dest_row_bytes];

        match (layout.bits, layout.endian) {
            (16, SampleEndian::Little) => dest_row.copy_from_slice(src_row),
            (16, SampleEndian::Big) => {
                for (d, s) in dest_row.chunks_exact_mut(2).zip(src_row.chunks_exact(2)) {
                    d[0] = s[1];
                    d[1] = s[0];
                }
            }
            _ => {
                for (d, &s) in dest_row.chunks_exact_mut(2).zip(src_row) {
                    d[0] = s;
                    d[1] = 0;
                }
            }
        }
    }

    Ok(())
}
