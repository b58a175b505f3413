//! # Volume Stack
//!
//! Decode multi-channel, multi-timepoint microscopy volumes into a validated
//! 16-bit in-memory stack.
//!
//! The library reads a single timepoint of a volume file plane by plane,
//! fetching only the byte ranges each plane needs, and lays the planes out
//! channel-major in one contiguous buffer.
//!
//! ## Features
//!
//! - **OME-TIFF, ImageJ TIFF and plain TIFF stacks**: dimensions from the
//!   first IFD's description; strips or single tiles, uncompressed, Deflate or
//!   PackBits
//! - **CZI containers**: dimensions from the sub-block directory and XML
//!   metadata; uncompressed or Zstd sub-blocks; scene selection
//! - **Plane-index mapping** for every `XY`/`YX` + `Z`/`C`/`T` permutation
//! - **Shared image cache** with single-flight loading
//!
//! ## Architecture
//!
//! - [`volume`] - Dimension model, plane index mapping, in-memory image
//! - [`io`] - Range reader abstraction and block caching
//! - [`mod@format`] - TIFF and CZI parsers and plane readers
//! - [`loader`] - Volume assembly, image cache and load entry points
//! - [`config`] - CLI configuration for the binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use volume_stack::{ImageCache, LoadRequest, VolumeLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), volume_stack::VolumeError> {
//!     let loader = VolumeLoader::new(Arc::new(ImageCache::new()));
//!
//!     let dims = loader.load_dimensions("cells.ome.tif", 0).await?;
//!     println!("{} channels", dims.size_c);
//!
//!     let image = loader
//!         .load_from_file(&LoadRequest::new("cells.ome.tif").time(0).cached(true))
//!         .await?;
//!     println!("{:?}", image.channel_range(0));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod loader;
pub mod volume;

// Re-export commonly used types
pub use error::{CziError, ErrorKind, IoError, TiffError, VolumeError};
pub use format::{detect_format, FormatRegistry, VolumeFormat};
pub use io::{BlockCache, LocalFileReader, MemoryReader, RangeReader};
pub use loader::{
    assemble_volume, ArraySource, ArrayVolume, ImageCache, LoadRequest, LoaderOptions,
    PlaneSource, VolumeLoader,
};
pub use volume::{
    coordinate_from_plane_index, plane_index_from_coordinate, Axis, DimensionOrder, ImageXyzc,
    PlaneCoordinate, PlaneLayout, PlaneSelector, VolumeDimensions,
};
