//! PlaneSource trait for format-agnostic plane access.
//!
//! A plane source is an opened file whose dimensions are already extracted
//! and validated. The assembler only ever talks to this trait, so it holds no
//! TIFF or CZI specific logic:
//! - [`crate::format::tiff::TiffVolume`] maps a coordinate to an IFD index
//! - [`crate::format::czi::CziVolume`] finds the sub-block at a coordinate

use async_trait::async_trait;

use crate::error::VolumeError;
use crate::volume::{PlaneSelector, VolumeDimensions};

/// Format-agnostic interface for reading 2D planes of a volume.
#[async_trait]
pub trait PlaneSource: Send + Sync {
    /// Validated dimensions of the volume.
    fn dimensions(&self) -> &VolumeDimensions;

    /// Whether the source can address more than one scene.
    ///
    /// Sources that cannot ignore `PlaneSelector::scene`.
    fn supports_scenes(&self) -> bool {
        false
    }

    /// Decode one plane into `dest` as 16-bit little-endian samples.
    ///
    /// `dest` must hold at least `size_x * size_y * 2` bytes.
    async fn read_plane(&self, selector: PlaneSelector, dest: &mut [u8])
        -> Result<(), VolumeError>;
}
