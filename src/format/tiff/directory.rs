//! IFD chain traversal and per-plane directory decoding.
//!
//! A plane stack stores one 2D plane per IFD. Opening a file walks the whole
//! chain once, recording only the IFD offsets; the tags of an individual
//! plane are decoded on demand when that plane is read.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{Ifd, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Read and parse the file header.
pub async fn read_header<R: RangeReader + ?Sized>(reader: &R) -> Result<TiffHeader, TiffError> {
    let size = reader.size();
    if size < TIFF_HEADER_SIZE as u64 {
        return Err(TiffError::FileTooSmall {
            required: TIFF_HEADER_SIZE as u64,
            actual: size,
        });
    }
    let len = size.min(BIGTIFF_HEADER_SIZE as u64) as usize;
    let bytes = reader.read_exact_at(0, len).await?;
    TiffHeader::parse(&bytes, size)
}

/// Read the IFD at `offset`.
pub async fn read_ifd<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    offset: u64,
) -> Result<Ifd, TiffError> {
    if offset == 0 || offset >= reader.size() {
        return Err(TiffError::InvalidIfdOffset(offset));
    }
    let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
    let entry_count = header.read_entry_count(&count_bytes);
    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
    Ifd::parse(&ifd_bytes, header)
}

/// Collect the offset of every IFD in the chain.
///
/// Only the entry count and next pointer of each IFD are read. A chain that
/// revisits an offset is rejected.
pub async fn walk_ifd_chain<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Vec<u64>, TiffError> {
    let mut offsets = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 {
        if offset >= reader.size() {
            // Truncated writers sometimes leave a dangling last pointer
            warn!(
                offset,
                ifds = offsets.len(),
                "IFD chain points past end of file, stopping"
            );
            break;
        }
        if !seen.insert(offset) {
            return Err(TiffError::IfdLoop(offset));
        }

        let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
        let entry_count = header.read_entry_count(&count_bytes);
        let next_pos = offset
            + header.ifd_count_size() as u64
            + entry_count * header.ifd_entry_size() as u64;
        let next_bytes = reader
            .read_exact_at(next_pos, header.ifd_next_offset_size())
            .await?;

        offsets.push(offset);
        offset = if header.is_bigtiff {
            header.byte_order.read_u64(&next_bytes)
        } else {
            header.byte_order.read_u32(&next_bytes) as u64
        };
    }

    debug!(count = offsets.len(), "Walked IFD chain");
    Ok(offsets)
}

// =============================================================================
// PlaneDirectory
// =============================================================================

/// How the samples of one plane are chunked on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkLayout {
    Strips {
        rows_per_strip: u32,
        offsets: Vec<u64>,
        byte_counts: Vec<u64>,
    },
    Tiles {
        tile_width: u32,
        tile_length: u32,
        offsets: Vec<u64>,
        byte_counts: Vec<u64>,
    },
}

/// Tags of one IFD needed to decode its plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneDirectory {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u32,
    pub samples_per_pixel: u32,
    pub compression: u16,
    pub predictor: u32,
    pub sample_format: Option<u32>,
    pub layout: ChunkLayout,
}

impl PlaneDirectory {
    /// Decode the plane tags of a parsed IFD.
    pub async fn read<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let required = |tag: TiffTag| {
            ifd.get_entry_by_tag(tag)
                .ok_or(TiffError::MissingTag(tag.name()))
        };

        let width = values
            .read_u32(required(TiffTag::ImageWidth)?, TiffTag::ImageWidth)
            .await?;
        let height = values
            .read_u32(required(TiffTag::ImageLength)?, TiffTag::ImageLength)
            .await?;
        let bits_per_sample = optional_u32(&values, ifd, TiffTag::BitsPerSample, 1).await?;
        let samples_per_pixel = optional_u32(&values, ifd, TiffTag::SamplesPerPixel, 1).await?;
        let compression =
            optional_u32(&values, ifd, TiffTag::Compression, Compression::None as u32).await?;
        let predictor = optional_u32(&values, ifd, TiffTag::Predictor, 1).await?;
        let sample_format = match ifd.get_entry_by_tag(TiffTag::SampleFormat) {
            Some(entry) => Some(values.read_u32(entry, TiffTag::SampleFormat).await?),
            None => None,
        };

        let layout = if let Some(offsets_entry) = ifd.get_entry_by_tag(TiffTag::TileOffsets) {
            let tile_width = values
                .read_u32(required(TiffTag::TileWidth)?, TiffTag::TileWidth)
                .await?;
            let tile_length = values
                .read_u32(required(TiffTag::TileLength)?, TiffTag::TileLength)
                .await?;
            let offsets = values
                .read_u64_array(offsets_entry, TiffTag::TileOffsets)
                .await?;
            let byte_counts = values
                .read_u64_array(required(TiffTag::TileByteCounts)?, TiffTag::TileByteCounts)
                .await?;
            ChunkLayout::Tiles {
                tile_width,
                tile_length,
                offsets,
                byte_counts,
            }
        } else {
            let offsets = values
                .read_u64_array(required(TiffTag::StripOffsets)?, TiffTag::StripOffsets)
                .await?;
            let byte_counts = values
                .read_u64_array(
                    required(TiffTag::StripByteCounts)?,
                    TiffTag::StripByteCounts,
                )
                .await?;
            let rows_per_strip =
                optional_u32(&values, ifd, TiffTag::RowsPerStrip, height).await?;
            ChunkLayout::Strips {
                rows_per_strip: rows_per_strip.clamp(1, height.max(1)),
                offsets,
                byte_counts,
            }
        };

        let (offsets, byte_counts) = match &layout {
            ChunkLayout::Strips {
                offsets,
                byte_counts,
                ..
            }
            | ChunkLayout::Tiles {
                offsets,
                byte_counts,
                ..
            } => (offsets, byte_counts),
        };
        if offsets.len() != byte_counts.len() {
            return Err(TiffError::InvalidTagValue {
                tag: "StripByteCounts",
                message: format!(
                    "{} offsets but {} byte counts",
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        Ok(PlaneDirectory {
            width,
            height,
            bits_per_sample,
            samples_per_pixel,
            compression: u16::try_from(compression).map_err(|_| {
                TiffError::InvalidTagValue {
                    tag: "Compression",
                    message: format!("{} is not a compression code", compression),
                }
            })?,
            predictor,
            sample_format,
            layout,
        })
    }
}

/// Single value of an optional tag.
async fn optional_u32<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
    default: u32,
) -> Result<u32, TiffError> {
    match ifd.get_entry_by_tag(tag) {
        Some(entry) => values.read_u32(entry, tag).await,
        None => Ok(default),
    }
}
