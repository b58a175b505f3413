//! Turning files and arrays into in-memory volumes.
//!
//! - [`PlaneSource`]: one 2D plane at a time from an opened file
//! - [`assemble_volume`]: every plane of one timepoint into an [`ImageXyzc`]
//! - [`ImageCache`]: shared, single-flight cache of loaded images
//! - [`VolumeLoader`]: the entry points tying these together
//!
//! [`ImageXyzc`]: crate::volume::ImageXyzc

mod array;
mod assembler;
mod cache;
mod service;
mod source;

pub use array::{ArraySource, ArrayVolume};
pub use assembler::assemble_volume;
pub use cache::ImageCache;
pub use service::{LoadRequest, LoaderOptions, VolumeLoader};
pub use source::PlaneSource;
