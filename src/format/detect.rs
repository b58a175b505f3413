//! Format detection for volume files.
//!
//! A file's format is chosen from its extension through a [`FormatRegistry`].
//! The leading bytes are sniffed as well so that a misnamed file can still be
//! read:
//!
//! - **TIFF**: `II*\0` / `MM\0*` (classic) or `II+\0` / `MM\0+` (BigTIFF)
//! - **CZI**: a `ZISRAWFILE` segment at offset 0

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::VolumeError;
use crate::io::RangeReader;

use super::czi::is_czi_header;

/// Bytes needed by [`VolumeFormat::sniff`].
pub const SNIFF_BYTES: usize = 16;

// =============================================================================
// VolumeFormat
// =============================================================================

/// Container format of a volume file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeFormat {
    /// TIFF plane stack (OME-TIFF, ImageJ TIFF, plain stack)
    Tiff,

    /// Zeiss CZI container
    Czi,
}

impl VolumeFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            VolumeFormat::Tiff => "TIFF",
            VolumeFormat::Czi => "CZI",
        }
    }

    /// Identify a format from the first bytes of a file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if is_tiff_header(bytes) {
            Some(VolumeFormat::Tiff)
        } else if is_czi_header(bytes) {
            Some(VolumeFormat::Czi)
        } else {
            None
        }
    }
}

impl fmt::Display for VolumeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `bytes` start with a TIFF or BigTIFF header.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }
    matches!(
        (bytes[0], bytes[1], bytes[2], bytes[3]),
        (0x49, 0x49, 0x2A | 0x2B, 0x00) | (0x4D, 0x4D, 0x00, 0x2A | 0x2B)
    )
}

/// Sniff the format of an open file.
///
/// Returns `None` for files too short or not recognised.
pub async fn detect_format<R: RangeReader + ?Sized>(
    reader: &R,
) -> Result<Option<VolumeFormat>, VolumeError> {
    let len = reader.size().min(SNIFF_BYTES as u64) as usize;
    let bytes = reader.read_exact_at(0, len).await?;
    Ok(VolumeFormat::sniff(&bytes))
}

// =============================================================================
// FormatRegistry
// =============================================================================

/// Mapping from lowercase file extension to format.
///
/// Multi-part extensions such as `.ome.tif` resolve through their final
/// component.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: HashMap<String, VolumeFormat>,
}

impl Default for FormatRegistry {
    /// Registry with `tif`, `tiff`, `btf` and `czi`.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("tif", VolumeFormat::Tiff);
        registry.register("tiff", VolumeFormat::Tiff);
        registry.register("btf", VolumeFormat::Tiff);
        registry.register("czi", VolumeFormat::Czi);
        registry
    }
}

impl FormatRegistry {
    /// Registry with no extensions.
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Map `extension` (with or without a leading dot) to `format`.
    pub fn register(&mut self, extension: &str, format: VolumeFormat) {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.formats.insert(extension, format);
    }

    pub fn format_for_extension(&self, extension: &str) -> Option<VolumeFormat> {
        self.formats
            .get(&extension.trim_start_matches('.').to_ascii_lowercase())
            .copied()
    }

    /// Format registered for the extension of `path`.
    pub fn format_for_path(&self, path: &Path) -> Result<VolumeFormat, VolumeError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| VolumeError::UnsupportedFormat {
                reason: format!("{} has no file extension", path.display()),
            })?;
        self.format_for_extension(extension)
            .ok_or_else(|| VolumeError::UnsupportedFormat {
                reason: format!("no reader for .{} files", extension.to_ascii_lowercase()),
            })
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.formats.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }
}
