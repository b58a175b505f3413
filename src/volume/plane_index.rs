//! Mapping between linear plane indices and `(Z, C, T)` coordinates.
//!
//! Files store their 2D planes sequentially. The dimension order declares the
//! sequence: of the three non-spatial axes, the one listed first varies
//! fastest. A plane index is therefore a mixed-radix number whose digits are
//! the coordinates of those axes:
//!
//! ```text
//! index = v0 + v1 * len0 + v2 * len0 * len1
//! ```
//!
//! where `v_k` / `len_k` are the coordinate and extent of the axis in slot `k`.
//!
//! Coordinates or indices outside the volume are rejected with
//! [`VolumeError::BoundsViolation`] rather than producing a meaningless index.

use crate::error::VolumeError;

use super::axis::{Axis, DimensionOrder};
use super::dimensions::VolumeDimensions;

// =============================================================================
// PlaneCoordinate / PlaneSelector
// =============================================================================

/// Position of one 2D plane within a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaneCoordinate {
    pub z: u32,
    pub c: u32,
    pub t: u32,
}

impl PlaneCoordinate {
    pub const fn new(z: u32, c: u32, t: u32) -> Self {
        Self { z, c, t }
    }

    /// Coordinate along a non-spatial axis. X and Y map to 0.
    pub const fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Z => self.z,
            Axis::C => self.c,
            Axis::T => self.t,
            Axis::X | Axis::Y => 0,
        }
    }

    fn set(&mut self, axis: Axis, value: u32) {
        match axis {
            Axis::Z => self.z = value,
            Axis::C => self.c = value,
            Axis::T => self.t = value,
            Axis::X | Axis::Y => {}
        }
    }
}

/// A plane request handed to a plane reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaneSelector {
    pub coordinate: PlaneCoordinate,

    /// Scene within a multi-scene container; ignored by single-scene formats
    pub scene: u32,
}

// =============================================================================
// PlaneLayout
// =============================================================================

/// The sequential plane layout of one volume.
///
/// Built once per load from validated dimensions; lookups are then plain
/// arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    order: DimensionOrder,
    size_z: u32,
    size_c: u32,
    size_t: u32,
}

impl PlaneLayout {
    /// Build the layout for a set of dimensions.
    ///
    /// Fails if the dimension order is malformed or any non-spatial extent is
    /// zero.
    pub fn new(dims: &VolumeDimensions) -> Result<Self, VolumeError> {
        let order = dims.order()?;
        if dims.size_z == 0 || dims.size_c == 0 || dims.size_t == 0 {
            return Err(VolumeError::malformed(format!(
                "plane layout needs non-zero extents, got Z={} C={} T={}",
                dims.size_z, dims.size_c, dims.size_t
            )));
        }
        Ok(Self {
            order,
            size_z: dims.size_z,
            size_c: dims.size_c,
            size_t: dims.size_t,
        })
    }

    /// The typed dimension order.
    pub fn order(&self) -> DimensionOrder {
        self.order
    }

    /// Total number of planes (`Z * C * T`).
    pub fn plane_count(&self) -> u64 {
        self.size_z as u64 * self.size_c as u64 * self.size_t as u64
    }

    fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Z => self.size_z,
            Axis::C => self.size_c,
            Axis::T => self.size_t,
            Axis::X | Axis::Y => 1,
        }
    }

    /// Extents of slots 0, 1 and 2.
    fn slot_lengths(&self) -> [u64; 3] {
        let planes = self.order.planes();
        [
            self.extent(planes[0]) as u64,
            self.extent(planes[1]) as u64,
            self.extent(planes[2]) as u64,
        ]
    }

    /// Linear plane index of a coordinate.
    pub fn index_of(&self, coord: PlaneCoordinate) -> Result<u32, VolumeError> {
        for axis in [Axis::Z, Axis::C, Axis::T] {
            let value = coord.get(axis);
            let extent = self.extent(axis);
            if value >= extent {
                return Err(VolumeError::out_of_bounds(format!(
                    "invalid {} index: {}/{}",
                    axis, value, extent
                )));
            }
        }

        let planes = self.order.planes();
        let [len0, len1, _] = self.slot_lengths();
        let v0 = coord.get(planes[0]) as u64;
        let v1 = coord.get(planes[1]) as u64;
        let v2 = coord.get(planes[2]) as u64;

        let index = v0 + v1 * len0 + v2 * len0 * len1;
        u32::try_from(index).map_err(|_| {
            VolumeError::out_of_bounds(format!("plane index {} does not fit in 32 bits", index))
        })
    }

    /// Coordinate of a linear plane index.
    pub fn coordinate_of(&self, index: u32) -> Result<PlaneCoordinate, VolumeError> {
        let count = self.plane_count();
        if index as u64 >= count {
            return Err(VolumeError::out_of_bounds(format!(
                "invalid image index: {}/{}",
                index, count
            )));
        }

        let planes = self.order.planes();
        let [len0, len1, _] = self.slot_lengths();
        let index = index as u64;
        let v0 = index % len0;
        let v1 = index / len0 % len1;
        let v2 = index / len0 / len1;

        let mut coord = PlaneCoordinate::default();
        coord.set(planes[0], v0 as u32);
        coord.set(planes[1], v1 as u32);
        coord.set(planes[2], v2 as u32);
        Ok(coord)
    }

    /// Every coordinate, in file order.
    /// Stops at the last index that fits in 32 bits.
    pub fn coordinates(&self) -> impl Iterator<Item = PlaneCoordinate> + '_ {
        (0..self.plane_count())
            .map_while(|i| u32::try_from(i).ok())
            .filter_map(move |i| self.coordinate_of(i).ok())
    }
}

// =============================================================================
// Free functions
// =============================================================================

/// Linear plane index of `(z, c, t)` in the file order declared by `dims`.
pub fn plane_index_from_coordinate(
    dims: &VolumeDimensions,
    z: u32,
    c: u32,
    t: u32,
) -> Result<u32, VolumeError> {
    PlaneLayout::new(dims)?.index_of(PlaneCoordinate::new(z, c, t))
}

/// `(z, c, t)` of a linear plane index in the file order declared by `dims`.
pub fn coordinate_from_plane_index(
    dims: &VolumeDimensions,
    plane_index: u32,
) -> Result<PlaneCoordinate, VolumeError> {
    PlaneLayout::new(dims)?.coordinate_of(plane_index)
}
