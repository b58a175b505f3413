//! Volume dimension model, plane addressing and the in-memory image.

mod axis;
mod dimensions;
mod image;
mod plane_index;
mod samples;

pub use axis::{Axis, DimensionOrder};
pub use dimensions::{
    index_channel_names, DimensionIssue, VolumeDimensions, IN_MEMORY_BITS_PER_SAMPLE,
    IN_MEMORY_BYTES_PER_SAMPLE,
};
pub use image::{ImageXyzc, VolumeBuffer};
pub use plane_index::{
    coordinate_from_plane_index, plane_index_from_coordinate, PlaneCoordinate, PlaneLayout,
    PlaneSelector,
};
pub use samples::{copy_rows, SampleEndian, SourceLayout};
