//! Sub-block segments and their decompression.
//!
//! A sub-block segment repeats its directory entry, then carries optional
//! metadata, the bitmap data and optional attachments:
//!
//! ```text
//! +0   MetadataSize   i32
//! +4   AttachmentSize i32
//! +8   DataSize       i64
//! +16  DirectoryEntryDV
//! ...  padding up to max(256, 16 + entry size)
//!      metadata, data, attachment
//! ```

use tracing::debug;

use crate::error::CziError;
use crate::io::{read_i32_le, read_i64_le, RangeReader};

use super::directory::{DirectoryEntry, DIMENSION_ENTRY_SIZE, DV_FIXED_SIZE};
use super::segment::{SegmentHeader, SEGMENT_HEADER_SIZE, SUBBLOCK_ID};

/// Minimum size of the sub-block header part.
const SUBBLOCK_HEADER_MIN: usize = 256;

/// Offset of the directory entry within the sub-block header.
const SUBBLOCK_ENTRY_OFFSET: usize = 16;

/// Sub-block compression modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CziCompression {
    Uncompressed,
    /// Plain zstd frame
    Zstd0,
    /// zstd frame behind a small header, optionally with hi/lo byte packing
    Zstd1,
}

impl CziCompression {
    pub fn from_i32(value: i32) -> Result<Self, CziError> {
        match value {
            0 => Ok(CziCompression::Uncompressed),
            5 => Ok(CziCompression::Zstd0),
            6 => Ok(CziCompression::Zstd1),
            other => Err(CziError::UnsupportedCompression(other)),
        }
    }
}

/// Read the compressed bitmap data of the sub-block described by `entry`.
pub async fn read_subblock_data<R: RangeReader + ?Sized>(
    reader: &R,
    entry: &DirectoryEntry,
) -> Result<Vec<u8>, CziError> {
    let position = entry.file_position;
    SegmentHeader::read_expecting(reader, position, SUBBLOCK_ID).await?;

    let data_start = position + SEGMENT_HEADER_SIZE;
    let fixed = reader
        .read_exact_at(data_start, SUBBLOCK_ENTRY_OFFSET + DV_FIXED_SIZE)
        .await?;
    let metadata_size = read_i32_le(&fixed[0..4]);
    let data_size = read_i64_le(&fixed[8..16]);
    let count_at = SUBBLOCK_ENTRY_OFFSET + 28;
    let dimension_count = read_i32_le(&fixed[count_at..count_at + 4]);
    if metadata_size < 0 || data_size < 0 || dimension_count < 0 {
        return Err(CziError::InvalidSegment {
            offset: position,
            message: format!(
                "negative sizes (metadata {}, data {}, dimensions {})",
                metadata_size, data_size, dimension_count
            ),
        });
    }

    let entry_len = DV_FIXED_SIZE + dimension_count as usize * DIMENSION_ENTRY_SIZE;
    let header_len = SUBBLOCK_HEADER_MIN.max(SUBBLOCK_ENTRY_OFFSET + entry_len);
    let data_offset = data_start + header_len as u64 + metadata_size as u64;
    debug!(
        position,
        data_offset,
        data_size,
        compression = entry.compression,
        "Reading CZI sub-block"
    );

    let data = reader.read_exact_at(data_offset, data_size as usize).await?;
    Ok(data.to_vec())
}

/// Decompress sub-block data to its raw bitmap bytes.
pub fn decompress_subblock(
    compression: i32,
    data: Vec<u8>,
    expected_len: usize,
) -> Result<Vec<u8>, CziError> {
    match CziCompression::from_i32(compression)? {
        CziCompression::Uncompressed => Ok(data),
        CziCompression::Zstd0 => zstd_decompress(&data, expected_len),
        CziCompression::Zstd1 => {
            let (header_len, hi_lo_packed) = parse_zstd1_header(&data)?;
            let raw = zstd_decompress(&data[header_len..], expected_len)?;
            if hi_lo_packed {
                Ok(unpack_hi_lo(&raw))
            } else {
                Ok(raw)
            }
        }
    }
}

fn zstd_decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>, CziError> {
    zstd::bulk::decompress(data, expected_len)
        .map_err(|e| CziError::Decompression(format!("zstd: {}", e)))
}

/// Header length and hi/lo packing flag of a Zstd1 payload.
fn parse_zstd1_header(data: &[u8]) -> Result<(usize, bool), CziError> {
    match data.first() {
        Some(1) => Ok((1, false)),
        Some(3) if data.len() >= 3 => {
            if data[1] != 1 {
                return Err(CziError::Decompression(format!(
                    "unknown Zstd1 chunk type {}",
                    data[1]
                )));
            }
            Ok((3, data[2] & 1 == 1))
        }
        Some(other) => Err(CziError::Decompression(format!(
            "invalid Zstd1 header size {}",
            other
        ))),
        None => Err(CziError::Decompression("empty Zstd1 payload".to_string())),
    }
}

/// Undo hi/lo packing: all low bytes first, then all high bytes.
fn unpack_hi_lo(packed: &[u8]) -> Vec<u8> {
    let half = packed.len() / 2;
    let (lo, hi) = packed.split_at(half);
    lo.iter().zip(hi).flat_map(|(&l, &h)| [l, h]).collect()
}
