//! ZISRAW segment headers and the file header segment.
//!
//! A CZI container is a sequence of segments. Each starts with a 32-byte
//! header: a 16-byte NUL-padded ASCII id followed by the allocated and used
//! sizes of the segment data. All integers are little-endian.

use crate::error::CziError;
use crate::io::{read_i32_le, read_i64_le, RangeReader};

/// Size of every segment header in bytes.
pub const SEGMENT_HEADER_SIZE: u64 = 32;

pub const FILE_HEADER_ID: &str = "ZISRAWFILE";
pub const DIRECTORY_ID: &str = "ZISRAWDIRECTORY";
pub const SUBBLOCK_ID: &str = "ZISRAWSUBBLOCK";
pub const METADATA_ID: &str = "ZISRAWMETADATA";

/// Bytes of file header data this parser needs.
const FILE_HEADER_DATA_SIZE: usize = 80;

/// Header of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Segment id with padding removed
    pub id: String,
    pub allocated_size: i64,
    pub used_size: i64,
}

impl SegmentHeader {
    /// Parse a header from its 32 raw bytes.
    pub fn parse(bytes: &[u8], offset: u64) -> Result<Self, CziError> {
        if bytes.len() < SEGMENT_HEADER_SIZE as usize {
            return Err(CziError::InvalidSegment {
                offset,
                message: format!("header truncated to {} bytes", bytes.len()),
            });
        }
        let id_end = bytes[..16].iter().position(|&b| b == 0).unwrap_or(16);
        let id = String::from_utf8_lossy(&bytes[..id_end]).into_owned();
        let allocated_size = read_i64_le(&bytes[16..24]);
        let used_size = read_i64_le(&bytes[24..32]);
        if allocated_size < 0 || used_size < 0 {
            return Err(CziError::InvalidSegment {
                offset,
                message: format!("negative size ({}, {})", allocated_size, used_size),
            });
        }
        Ok(Self {
            id,
            allocated_size,
            used_size,
        })
    }

    /// Read the header at `offset` and check that it carries `expected`.
    pub async fn read_expecting<R: RangeReader + ?Sized>(
        reader: &R,
        offset: u64,
        expected: &str,
    ) -> Result<Self, CziError> {
        let bytes = reader
            .read_exact_at(offset, SEGMENT_HEADER_SIZE as usize)
            .await?;
        let header = Self::parse(&bytes, offset)?;
        if header.id != expected {
            return Err(CziError::InvalidSegment {
                offset,
                message: format!("expected {}, found {:?}", expected, header.id),
            });
        }
        Ok(header)
    }

    /// Size of the segment data, preferring the used size when recorded.
    pub fn data_size(&self) -> u64 {
        if self.used_size > 0 {
            self.used_size as u64
        } else {
            self.allocated_size as u64
        }
    }
}

/// Whether `bytes` starts with a CZI file header segment.
pub fn is_czi_header(bytes: &[u8]) -> bool {
    bytes.len() >= 16
        && bytes.starts_with(FILE_HEADER_ID.as_bytes())
        && bytes[FILE_HEADER_ID.len()..16].iter().all(|&b| b == 0)
}

// =============================================================================
// FileHeader
// =============================================================================

/// Contents of the `ZISRAWFILE` segment at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub major: i32,
    pub minor: i32,
    /// Offset of the `ZISRAWDIRECTORY` segment, 0 if absent
    pub directory_position: u64,
    /// Offset of the `ZISRAWMETADATA` segment, 0 if absent
    pub metadata_position: u64,
}

impl FileHeader {
    pub async fn read<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, CziError> {
        let header = SegmentHeader::read_expecting(reader, 0, FILE_HEADER_ID).await?;
        if header.data_size() < FILE_HEADER_DATA_SIZE as u64 {
            return Err(CziError::InvalidSegment {
                offset: 0,
                message: format!("file header holds only {} bytes", header.data_size()),
            });
        }
        let data = reader
            .read_exact_at(SEGMENT_HEADER_SIZE, FILE_HEADER_DATA_SIZE)
            .await?;
        Self::parse(&data)
    }

    /// Parse the segment data (without the 32-byte segment header).
    pub fn parse(data: &[u8]) -> Result<Self, CziError> {
        if data.len() < FILE_HEADER_DATA_SIZE {
            return Err(CziError::InvalidSegment {
                offset: 0,
                message: "file header truncated".to_string(),
            });
        }
        let position = |at: usize, name: &'static str| {
            let value = read_i64_le(&data[at..at + 8]);
            u64::try_from(value).map_err(|_| CziError::InvalidSegment {
                offset: 0,
                message: format!("negative {} {}", name, value),
            })
        };

        Ok(Self {
            major: read_i32_le(&data[0..4]),
            minor: read_i32_le(&data[4..8]),
            directory_position: position(52, "directory position")?,
            metadata_position: position(60, "metadata position")?,
        })
    }
}
