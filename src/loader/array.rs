//! In-memory volumes handed over as raw 16-bit sample arrays.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::VolumeError;
use crate::volume::{
    DimensionOrder, PlaneLayout, PlaneSelector, VolumeDimensions, IN_MEMORY_BITS_PER_SAMPLE,
    IN_MEMORY_BYTES_PER_SAMPLE,
};

use super::source::PlaneSource;

/// A 4D volume already in memory.
///
/// `data` holds 16-bit little-endian samples with X fastest. The outer two
/// axes are `C` then `Z` unless `axes` says `ZCYX`.
#[derive(Debug, Clone)]
pub struct ArrayVolume {
    /// Cache key for the volume
    pub name: String,

    pub data: Bytes,

    /// Extents in `axes` order
    pub shape: Vec<u32>,

    /// `CZYX`, `ZCYX`, or empty for `CZYX`
    pub axes: String,

    pub channel_names: Vec<String>,

    /// Voxel size along X, Y and Z in microns
    pub physical_sizes: Vec<f64>,
}

impl ArrayVolume {
    /// Volume in `CZYX` order with unit voxel size and no channel names.
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>, shape: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            shape,
            axes: String::new(),
            channel_names: Vec::new(),
            physical_sizes: vec![1.0, 1.0, 1.0],
        }
    }

    pub fn with_axes(mut self, axes: impl Into<String>) -> Self {
        self.axes = axes.into();
        self
    }

    pub fn with_channel_names(mut self, names: Vec<String>) -> Self {
        self.channel_names = names;
        self
    }

    pub fn with_physical_sizes(mut self, sizes: Vec<f64>) -> Self {
        self.physical_sizes = sizes;
        self
    }

    /// Plane order in `data`.
    fn plane_order(&self) -> Result<DimensionOrder, VolumeError> {
        match self.axes.to_ascii_uppercase().as_str() {
            "" | "CZYX" => Ok(DimensionOrder::XYZCT),
            "ZCYX" => Ok(DimensionOrder::XYCZT),
            other => Err(VolumeError::malformed(format!(
                "array axes must be CZYX or ZCYX, got '{}'",
                other
            ))),
        }
    }

    /// Dimensions described by the shape, axes and physical sizes.
    pub fn dimensions(&self) -> Result<VolumeDimensions, VolumeError> {
        if self.shape.len() != 4 {
            return Err(VolumeError::malformed(format!(
                "array shape must have 4 entries, got {}",
                self.shape.len()
            )));
        }
        if self.physical_sizes.len() != 3 {
            return Err(VolumeError::malformed(format!(
                "expected 3 physical sizes, got {}",
                self.physical_sizes.len()
            )));
        }
        let order = self.plane_order()?;
        let (size_c, size_z) = if order == DimensionOrder::XYZCT {
            (self.shape[0], self.shape[1])
        } else {
            (self.shape[1], self.shape[0])
        };

        let samples: u64 = self.shape.iter().map(|&s| s as u64).product();
        let expected = samples * IN_MEMORY_BYTES_PER_SAMPLE as u64;
        if self.data.len() as u64 != expected {
            return Err(VolumeError::malformed(format!(
                "array holds {} bytes but shape {:?} needs {}",
                self.data.len(),
                self.shape,
                expected
            )));
        }

        Ok(VolumeDimensions {
            size_x: self.shape[3],
            size_y: self.shape[2],
            size_z,
            size_c,
            size_t: 1,
            dimension_order: order.to_string(),
            physical_size_x: self.physical_sizes[0],
            physical_size_y: self.physical_sizes[1],
            physical_size_z: self.physical_sizes[2],
            bits_per_pixel: IN_MEMORY_BITS_PER_SAMPLE,
            channel_names: self.channel_names.clone(),
        })
    }
}

/// [`PlaneSource`] over an [`ArrayVolume`].
pub struct ArraySource {
    data: Bytes,
    dimensions: VolumeDimensions,
    layout: PlaneLayout,
}

impl ArraySource {
    pub fn new(volume: &ArrayVolume) -> Result<Self, VolumeError> {
        let dimensions = volume.dimensions()?;
        dimensions.ensure_valid()?;
        let layout = PlaneLayout::new(&dimensions)?;
        Ok(Self {
            data: volume.data.clone(),
            dimensions,
            layout,
        })
    }
}

#[async_trait]
impl PlaneSource for ArraySource {
    fn dimensions(&self) -> &VolumeDimensions {
        &self.dimensions
    }

    async fn read_plane(
        &self,
        selector: PlaneSelector,
        dest: &mut [u8],
    ) -> Result<(), VolumeError> {
        let index = self.layout.index_of(selector.coordinate)? as usize;
        let plane_bytes = self.dimensions.plane_bytes();
        let start = index * plane_bytes;
        let plane = self
            .data
            .get(start..start + plane_bytes)
            .ok_or_else(|| VolumeError::out_of_bounds(format!("array plane {}", index)))?;
        if dest.len() != plane_bytes {
            return Err(VolumeError::malformed(format!(
                "plane buffer is {} bytes, expected {}",
                dest.len(),
                plane_bytes
            )));
        }
        dest.copy_from_slice(plane);
        Ok(())
    }
}
