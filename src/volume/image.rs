//! The assembled in-memory volume and the buffer it is built in.

use bytes::{Bytes, BytesMut};

use crate::error::VolumeError;

use super::dimensions::{VolumeDimensions, IN_MEMORY_BYTES_PER_SAMPLE};

// =============================================================================
// VolumeBuffer
// =============================================================================

/// Zero-initialised 16-bit sample buffer for one time point.
///
/// Layout is channel-major, slice-minor: plane `(c, z)` starts at
/// `c * (plane_bytes * size_z) + z * plane_bytes`. The buffer is exclusively
/// owned while planes are written and is consumed by [`ImageXyzc::from_buffer`].
#[derive(Debug)]
pub struct VolumeBuffer {
    data: BytesMut,
    plane_bytes: usize,
    size_z: u32,
    size_c: u32,
}

impl VolumeBuffer {
    /// Allocate a zeroed buffer of `X * Y * 2 * Z * C` bytes.
    pub fn new(size_x: u32, size_y: u32, size_z: u32, size_c: u32) -> Result<Self, VolumeError> {
        let plane_bytes = (size_x as usize)
            .checked_mul(size_y as usize)
            .and_then(|n| n.checked_mul(IN_MEMORY_BYTES_PER_SAMPLE));
        let total = plane_bytes
            .and_then(|n| n.checked_mul(size_z as usize))
            .and_then(|n| n.checked_mul(size_c as usize));

        let (plane_bytes, total) = match (plane_bytes, total) {
            (Some(p), Some(t)) => (p, t),
            _ => {
                return Err(VolumeError::unsupported(format!(
                    "volume of {}x{}x{}x{} samples does not fit in memory",
                    size_x, size_y, size_z, size_c
                )))
            }
        };

        Ok(Self {
            data: BytesMut::zeroed(total),
            plane_bytes,
            size_z,
            size_c,
        })
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte offset of plane `(c, z)`.
    pub fn plane_offset(&self, c: u32, z: u32) -> usize {
        c as usize * (self.plane_bytes * self.size_z as usize) + z as usize * self.plane_bytes
    }

    /// Mutable view of plane `(c, z)`.
    pub fn plane_mut(&mut self, c: u32, z: u32) -> Result<&mut [u8], VolumeError> {
        if c >= self.size_c || z >= self.size_z {
            return Err(VolumeError::out_of_bounds(format!(
                "plane (c={}, z={}) outside {}x{} volume",
                c, z, self.size_c, self.size_z
            )));
        }
        let offset = self.plane_offset(c, z);
        Ok(&mut self.data[offset..offset + self.plane_bytes])
    }
}

// =============================================================================
// ImageXyzc
// =============================================================================

/// A decoded volume at a single time point.
///
/// Samples are 16-bit little-endian, laid out channel-major then slice-major
/// then row-major. Instances are immutable and shared behind `Arc`.
#[derive(Debug, Clone)]
pub struct ImageXyzc {
    size_x: u32,
    size_y: u32,
    size_z: u32,
    size_c: u32,
    physical_size_x: f64,
    physical_size_y: f64,
    physical_size_z: f64,
    channel_names: Vec<String>,
    data: Bytes,
}

impl ImageXyzc {
    /// Wrap a fully written buffer.
    ///
    /// Missing channel names are filled with stringified indices.
    pub fn from_buffer(dims: &VolumeDimensions, buffer: VolumeBuffer) -> Self {
        Self {
            size_x: dims.size_x,
            size_y: dims.size_y,
            size_z: dims.size_z,
            size_c: dims.size_c,
            physical_size_x: dims.physical_size_x,
            physical_size_y: dims.physical_size_y,
            physical_size_z: dims.physical_size_z,
            channel_names: dims.channel_names_or_indices(),
            data: buffer.data.freeze(),
        }
    }

    pub fn size_x(&self) -> u32 {
        self.size_x
    }

    pub fn size_y(&self) -> u32 {
        self.size_y
    }

    pub fn size_z(&self) -> u32 {
        self.size_z
    }

    pub fn size_c(&self) -> u32 {
        self.size_c
    }

    /// Physical voxel size `[x, y, z]` in microns.
    pub fn physical_size(&self) -> [f64; 3] {
        [
            self.physical_size_x,
            self.physical_size_y,
            self.physical_size_z,
        ]
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn channel_name(&self, c: u32) -> Option<&str> {
        self.channel_names.get(c as usize).map(String::as_str)
    }

    /// Raw little-endian sample bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Bytes in one `X * Y` plane.
    pub fn plane_bytes(&self) -> usize {
        self.size_x as usize * self.size_y as usize * IN_MEMORY_BYTES_PER_SAMPLE
    }

    /// Bytes in one channel (`Z` planes).
    pub fn channel_bytes(&self) -> usize {
        self.plane_bytes() * self.size_z as usize
    }

    /// One plane, sharing the underlying buffer.
    pub fn plane(&self, c: u32, z: u32) -> Option<Bytes> {
        if c >= self.size_c || z >= self.size_z {
            return None;
        }
        let offset = c as usize * self.channel_bytes() + z as usize * self.plane_bytes();
        Some(self.data.slice(offset..offset + self.plane_bytes()))
    }

    /// All slices of one channel, sharing the underlying buffer.
    pub fn channel(&self, c: u32) -> Option<Bytes> {
        if c >= self.size_c {
            return None;
        }
        let offset = c as usize * self.channel_bytes();
        Some(self.data.slice(offset..offset + self.channel_bytes()))
    }

    /// A single sample.
    pub fn sample(&self, x: u32, y: u32, z: u32, c: u32) -> Option<u16> {
        if x >= self.size_x || y >= self.size_y || z >= self.size_z || c >= self.size_c {
            return None;
        }
        let offset = c as usize * self.channel_bytes()
            + z as usize * self.plane_bytes()
            + (y as usize * self.size_x as usize + x as usize) * IN_MEMORY_BYTES_PER_SAMPLE;
        Some(u16::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
        ]))
    }

    /// Minimum and maximum sample of one channel.
    pub fn channel_range(&self, c: u32) -> Option<(u16, u16)> {
        let channel = self.channel(c)?;
        channel
            .chunks_exact(2)
            .map(|s| u16::from_le_bytes([s[0], s[1]]))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
