//! Sub-block directory and the statistics derived from it.
//!
//! The directory segment lists one `DV` entry per sub-block: its pixel
//! type, compression, file position and the start/size of every dimension
//! it spans. Volume extents are computed from these entries alone, so no
//! sub-block needs to be read to describe the file.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::CziError;
use crate::io::{read_i32_le, read_i64_le, RangeReader};

use super::segment::{SegmentHeader, DIRECTORY_ID, SEGMENT_HEADER_SIZE};

/// Offset of the first entry within the directory segment data.
const DIRECTORY_ENTRIES_OFFSET: u64 = 128;

/// Fixed part of a `DV` entry, before its dimension entries.
pub const DV_FIXED_SIZE: usize = 32;

/// Size of one dimension entry.
pub const DIMENSION_ENTRY_SIZE: usize = 20;

/// Upper bound on dimensions per entry; real files use fewer than 16.
const MAX_DIMENSIONS: i32 = 64;

// =============================================================================
// PixelType
// =============================================================================

/// Pixel type of a sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    Gray8,
    Gray16,
    Gray32Float,
    Bgr24,
    Bgr48,
    Bgr96Float,
    /// Any other code (Bgra32, Gray64, complex types...)
    Other(i32),
}

impl PixelType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => PixelType::Gray8,
            1 => PixelType::Gray16,
            2 => PixelType::Gray32Float,
            3 => PixelType::Bgr24,
            4 => PixelType::Bgr48,
            8 => PixelType::Bgr96Float,
            other => PixelType::Other(other),
        }
    }

    /// Bits per pixel, for the types a volume can report.
    pub fn bits_per_pixel(self) -> Option<u32> {
        match self {
            PixelType::Gray8 => Some(8),
            PixelType::Gray16 => Some(16),
            PixelType::Gray32Float => Some(32),
            PixelType::Bgr24 => Some(24),
            PixelType::Bgr48 => Some(48),
            PixelType::Bgr96Float => Some(96),
            PixelType::Other(_) => None,
        }
    }
}

// =============================================================================
// DirectoryEntry
// =============================================================================

/// Extent of a sub-block along one dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionEntry {
    /// Single-letter dimension name (X, Y, Z, C, T, S, M...)
    pub dimension: char,
    pub start: i32,
    /// Logical size; 1 for non-spatial dimensions
    pub size: i32,
    pub start_coordinate: f32,
    /// Size of the stored bitmap; differs from `size` in pyramid layers
    pub stored_size: i32,
}

/// A `DV` directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub pixel_type: PixelType,
    pub file_position: u64,
    pub compression: i32,
    pub pyramid_type: u8,
    pub dimensions: Vec<DimensionEntry>,
}

impl DirectoryEntry {
    /// Parse an entry from the start of `bytes`, returning it and its length.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), CziError> {
        if bytes.len() < DV_FIXED_SIZE {
            return Err(CziError::InvalidDirectoryEntry(format!(
                "entry truncated to {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..2] != b"DV" {
            return Err(CziError::InvalidDirectoryEntry(format!(
                "unknown schema {:?}",
                String::from_utf8_lossy(&bytes[0..2])
            )));
        }

        let dimension_count = read_i32_le(&bytes[28..32]);
        if !(0..=MAX_DIMENSIONS).contains(&dimension_count) {
            return Err(CziError::InvalidDirectoryEntry(format!(
                "{} dimensions",
                dimension_count
            )));
        }
        let len = DV_FIXED_SIZE + dimension_count as usize * DIMENSION_ENTRY_SIZE;
        if bytes.len() < len {
            return Err(CziError::InvalidDirectoryEntry(format!(
                "entry needs {} bytes, {} available",
                len,
                bytes.len()
            )));
        }

        let file_position = read_i64_le(&bytes[6..14]);
        let file_position = u64::try_from(file_position).map_err(|_| {
            CziError::InvalidDirectoryEntry(format!("negative file position {}", file_position))
        })?;

        let dimensions = bytes[DV_FIXED_SIZE..len]
            .chunks_exact(DIMENSION_ENTRY_SIZE)
            .map(|d| DimensionEntry {
                dimension: d[0] as char,
                start: read_i32_le(&d[4..8]),
                size: read_i32_le(&d[8..12]),
                start_coordinate: f32::from_le_bytes([d[12], d[13], d[14], d[15]]),
                stored_size: read_i32_le(&d[16..20]),
            })
            .collect();

        Ok((
            Self {
                pixel_type: PixelType::from_i32(read_i32_le(&bytes[2..6])),
                file_position,
                compression: read_i32_le(&bytes[18..22]),
                pyramid_type: bytes[22],
                dimensions,
            },
            len,
        ))
    }

    /// Entry for dimension `name`, if the sub-block spans it.
    pub fn dimension(&self, name: char) -> Option<&DimensionEntry> {
        self.dimensions.iter().find(|d| d.dimension == name)
    }

    /// Start index along a non-spatial dimension.
    pub fn index(&self, name: char) -> Option<i32> {
        self.dimension(name).map(|d| d.start)
    }

    /// Logical X/Y rectangle covered by the sub-block.
    pub fn rect(&self) -> Option<Rect> {
        let x = self.dimension('X')?;
        let y = self.dimension('Y')?;
        Some(Rect {
            x: x.start,
            y: y.start,
            w: x.size,
            h: y.size,
        })
    }

    /// Stored bitmap size `(width, height)`.
    pub fn stored_size(&self) -> Option<(u32, u32)> {
        let x = self.dimension('X')?;
        let y = self.dimension('Y')?;
        Some((
            u32::try_from(x.stored_size).ok()?,
            u32::try_from(y.stored_size).ok()?,
        ))
    }

    /// Whether the sub-block is full resolution (not a pyramid layer).
    pub fn is_layer0(&self) -> bool {
        match (self.dimension('X'), self.dimension('Y')) {
            (Some(x), Some(y)) => x.size == x.stored_size && y.size == y.stored_size,
            _ => false,
        }
    }
}

// =============================================================================
// Rect
// =============================================================================

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.w).max(other.x + other.w);
        let y1 = (self.y + self.h).max(other.y + other.h);
        Rect {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

// =============================================================================
// SubBlockStatistics
// =============================================================================

/// Interval `[start, start + size)` covered along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionBounds {
    pub start: i32,
    pub size: i32,
}

/// Aggregate extents of all sub-blocks in a directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubBlockStatistics {
    /// Bounds of every non-spatial dimension except M
    pub bounds: BTreeMap<char, DimensionBounds>,

    /// Largest M (mosaic tile) index, if any sub-block has one
    pub max_m_index: Option<i32>,

    /// Union of the rectangles of all layer-0 sub-blocks
    pub bounding_box_layer0: Rect,

    /// Layer-0 bounding box per scene index
    pub scene_boxes: BTreeMap<i32, Rect>,
}

impl SubBlockStatistics {
    pub fn from_entries(entries: &[DirectoryEntry]) -> Self {
        let mut stats = SubBlockStatistics::default();
        let mut ranges: BTreeMap<char, (i32, i32)> = BTreeMap::new();

        for entry in entries {
            for dim in &entry.dimensions {
                match dim.dimension {
                    'X' | 'Y' => {}
                    'M' => {
                        stats.max_m_index =
                            Some(stats.max_m_index.map_or(dim.start, |m| m.max(dim.start)));
                    }
                    name => {
                        let end = dim.start + dim.size.max(1);
                        ranges
                            .entry(name)
                            .and_modify(|(lo, hi)| {
                                *lo = (*lo).min(dim.start);
                                *hi = (*hi).max(end);
                            })
                            .or_insert((dim.start, end));
                    }
                }
            }

            if !entry.is_layer0() {
                continue;
            }
            if let Some(rect) = entry.rect() {
                stats.bounding_box_layer0 = stats.bounding_box_layer0.union(&rect);
                if let Some(scene) = entry.index('S') {
                    let scene_box = stats.scene_boxes.entry(scene).or_default();
                    *scene_box = scene_box.union(&rect);
                }
            }
        }

        stats.bounds = ranges
            .into_iter()
            .map(|(name, (lo, hi))| {
                (
                    name,
                    DimensionBounds {
                        start: lo,
                        size: hi - lo,
                    },
                )
            })
            .collect();
        stats
    }

    pub fn bounds(&self, name: char) -> Option<DimensionBounds> {
        self.bounds.get(&name).copied()
    }

    pub fn is_mosaic(&self) -> bool {
        self.max_m_index.is_some_and(|m| m > 0)
    }
}

// =============================================================================
// Directory
// =============================================================================

/// Read every entry of the directory segment at `position`.
pub async fn read_directory<R: RangeReader + ?Sized>(
    reader: &R,
    position: u64,
) -> Result<Vec<DirectoryEntry>, CziError> {
    let header = SegmentHeader::read_expecting(reader, position, DIRECTORY_ID).await?;
    let data_start = position + SEGMENT_HEADER_SIZE;
    let available = reader.size().saturating_sub(data_start);
    let data_len = header.data_size().min(available);
    if data_len < DIRECTORY_ENTRIES_OFFSET {
        return Err(CziError::InvalidSegment {
            offset: position,
            message: format!("directory holds only {} bytes", data_len),
        });
    }

    let data = reader.read_exact_at(data_start, data_len as usize).await?;
    let entry_count = read_i32_le(&data[0..4]);
    if entry_count < 0 {
        return Err(CziError::InvalidSegment {
            offset: position,
            message: format!("negative entry count {}", entry_count),
        });
    }

    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut cursor = DIRECTORY_ENTRIES_OFFSET as usize;
    for _ in 0..entry_count {
        let (entry, len) = DirectoryEntry::parse(&data[cursor..])?;
        entries.push(entry);
        cursor += len;
    }

    debug!(entries = entries.len(), "Read CZI sub-block directory");
    Ok(entries)
}
