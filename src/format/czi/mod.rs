//! CZI (ZISRAW) container support.
//!
//! Only the parts of the container needed for z-stacks are parsed: the file
//! header, the sub-block directory, the XML metadata segment and individual
//! sub-blocks. Uncompressed and zstd-compressed sub-blocks can be decoded.

mod directory;
mod metadata;
mod reader;
mod segment;
mod subblock;

pub use directory::{
    read_directory, DimensionBounds, DimensionEntry, DirectoryEntry, PixelType, Rect,
    SubBlockStatistics,
};
pub use metadata::{read_metadata_xml, CziMetadata};
pub use reader::{extract_dimensions, CziVolume};
pub use segment::{is_czi_header, FileHeader, SegmentHeader, SEGMENT_HEADER_SIZE};
pub use subblock::{decompress_subblock, read_subblock_data, CziCompression};
