use thiserror::Error;

use crate::volume::DimensionIssue;

/// I/O errors that can occur when reading from a volume source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system or the underlying stream
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err.to_string())
    }
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// The IFD chain points back at a directory that was already visited
    #[error("IFD chain loops back to offset {0}")]
    IfdLoop(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Compressed strip or tile could not be decoded
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors that can occur when parsing CZI containers
#[derive(Debug, Clone, Error)]
pub enum CziError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Segment header has an unexpected id or an impossible size
    #[error("Invalid segment at offset {offset}: {message}")]
    InvalidSegment { offset: u64, message: String },

    /// The file header does not point at a required segment
    #[error("Missing segment: {0}")]
    MissingSegment(&'static str),

    /// A sub-block directory entry could not be decoded
    #[error("Invalid directory entry: {0}")]
    InvalidDirectoryEntry(String),

    /// Unsupported sub-block compression scheme
    #[error("Unsupported CZI compression: {0}")]
    UnsupportedCompression(i32),

    /// Compressed sub-block could not be decoded
    #[error("Decompression failed: {0}")]
    Decompression(String),
}

/// Broad classification of load failures.
///
/// Every [`VolumeError`] maps onto exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unparseable or self-contradictory metadata
    MetadataMalformed,
    /// A feature the loader deliberately does not handle (mosaic, tiling, depth)
    UnsupportedFeature,
    /// Requested time, scene or plane outside the declared extents
    BoundsViolation,
    /// The underlying file or codec failed
    IoFailure,
}

/// Errors produced while extracting dimensions or assembling a volume
#[derive(Debug, Clone, Error)]
pub enum VolumeError {
    /// Metadata could not be parsed or contradicts itself
    #[error("Malformed metadata: {reason}")]
    MetadataMalformed { reason: String },

    /// The file uses a feature this loader does not support
    #[error("Unsupported feature: {reason}")]
    UnsupportedFeature { reason: String },

    /// A requested index is outside the volume extents
    #[error("Out of bounds: {reason}")]
    BoundsViolation { reason: String },

    /// Extracted dimensions failed validation
    #[error("Invalid volume dimensions: {}", format_issues(.0))]
    InvalidDimensions(Vec<DimensionIssue>),

    /// No reader is registered for the file
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF structure error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// CZI structure error
    #[error("CZI error: {0}")]
    Czi(#[from] CziError),
}

impl VolumeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        VolumeError::MetadataMalformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        VolumeError::UnsupportedFeature {
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_bounds(reason: impl Into<String>) -> Self {
        VolumeError::BoundsViolation {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VolumeError::MetadataMalformed { .. } | VolumeError::InvalidDimensions(_) => {
                ErrorKind::MetadataMalformed
            }
            VolumeError::UnsupportedFeature { .. } | VolumeError::UnsupportedFormat { .. } => {
                ErrorKind::UnsupportedFeature
            }
            VolumeError::BoundsViolation { .. } => ErrorKind::BoundsViolation,
            VolumeError::Io(_) => ErrorKind::IoFailure,
            VolumeError::Tiff(err) => match err {
                TiffError::Io(_) | TiffError::Decompression(_) => ErrorKind::IoFailure,
                TiffError::UnsupportedCompression(_) => ErrorKind::UnsupportedFeature,
                _ => ErrorKind::MetadataMalformed,
            },
            VolumeError::Czi(err) => match err {
                CziError::Io(_) | CziError::Decompression(_) => ErrorKind::IoFailure,
                CziError::UnsupportedCompression(_) => ErrorKind::UnsupportedFeature,
                _ => ErrorKind::MetadataMalformed,
            },
        }
    }
}

fn format_issues(issues: &[DimensionIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
