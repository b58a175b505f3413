//! Volume shape, units and channel metadata.
//!
//! [`VolumeDimensions`] is built fresh by a format's metadata extractor for
//! every load, validated once, and then treated as read-only. The raw
//! dimension order string is kept exactly as the file declared it so that
//! validation can report what was actually found; the typed
//! [`DimensionOrder`] is derived from it on demand.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::VolumeError;

use super::axis::{Axis, DimensionOrder};

/// Bits per sample of every in-memory volume, regardless of source depth.
pub const IN_MEMORY_BITS_PER_SAMPLE: u32 = 16;

/// Bytes per sample of every in-memory volume.
pub const IN_MEMORY_BYTES_PER_SAMPLE: usize = (IN_MEMORY_BITS_PER_SAMPLE / 8) as usize;

// =============================================================================
// DimensionIssue
// =============================================================================

/// A single failed validation check.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionIssue {
    /// The dimension order string is empty
    EmptyDimensionOrder,

    /// The dimension order does not start with `XY` or `YX`
    BadSpatialPrefix { order: String },

    /// The dimension order is not five distinct letters from `XYZCT`
    MalformedDimensionOrder { order: String },

    /// One of the five extents is zero
    NonPositiveSize { axis: char, value: u32 },

    /// One of the physical voxel sizes is zero, negative or NaN
    NonPositivePhysicalSize { axis: char, value: f64 },

    /// Channel names are present but do not match the channel count
    ChannelNameCount { names: usize, size_c: u32 },
}

impl fmt::Display for DimensionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionIssue::EmptyDimensionOrder => write!(f, "dimension order is empty"),
            DimensionIssue::BadSpatialPrefix { order } => {
                write!(f, "dimension order {:?} does not start with XY or YX", order)
            }
            DimensionIssue::MalformedDimensionOrder { order } => write!(
                f,
                "dimension order {:?} is not a permutation of XYZCT",
                order
            ),
            DimensionIssue::NonPositiveSize { axis, value } => {
                write!(f, "invalid {} size: {}", axis, value)
            }
            DimensionIssue::NonPositivePhysicalSize { axis, value } => {
                write!(f, "invalid physical pixel size {}: {}", axis, value)
            }
            DimensionIssue::ChannelNameCount { names, size_c } => {
                write!(f, "{} channel names for {} channels", names, size_c)
            }
        }
    }
}

// =============================================================================
// VolumeDimensions
// =============================================================================

/// Shape, units and channel labels of one decodable volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDimensions {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,

    /// Axis order of the planes in the source file, e.g. `XYZCT`
    pub dimension_order: String,

    /// Physical size of one voxel along each axis, in microns
    pub physical_size_x: f64,
    pub physical_size_y: f64,
    pub physical_size_z: f64,

    /// Sample depth of the source data (8, 16, 24, 32, 48, 96...)
    pub bits_per_pixel: u32,

    /// Channel labels; either empty or exactly `size_c` entries
    pub channel_names: Vec<String>,
}

impl Default for VolumeDimensions {
    fn default() -> Self {
        Self {
            size_x: 1,
            size_y: 1,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            dimension_order: DimensionOrder::XYCZT.to_string(),
            physical_size_x: 1.0,
            physical_size_y: 1.0,
            physical_size_z: 1.0,
            bits_per_pixel: IN_MEMORY_BITS_PER_SAMPLE,
            channel_names: Vec::new(),
        }
    }
}

impl VolumeDimensions {
    /// Run every validation check and collect the failures.
    ///
    /// All checks run regardless of earlier failures.
    pub fn issues(&self) -> Vec<DimensionIssue> {
        let mut issues = Vec::new();
        let order = self.dimension_order.as_str();

        if order.is_empty() {
            issues.push(DimensionIssue::EmptyDimensionOrder);
        }

        if !order.starts_with("XY") && !order.starts_with("YX") {
            issues.push(DimensionIssue::BadSpatialPrefix {
                order: order.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let well_formed = order.chars().count() == 5
            && order
                .chars()
                .all(|c| Axis::from_char(c).is_some() && seen.insert(c));
        if !well_formed {
            issues.push(DimensionIssue::MalformedDimensionOrder {
                order: order.to_string(),
            });
        }

        for (axis, value) in [
            ('X', self.size_x),
            ('Y', self.size_y),
            ('Z', self.size_z),
            ('C', self.size_c),
            ('T', self.size_t),
        ] {
            if value == 0 {
                issues.push(DimensionIssue::NonPositiveSize { axis, value });
            }
        }

        for (axis, value) in [
            ('x', self.physical_size_x),
            ('y', self.physical_size_y),
            ('z', self.physical_size_z),
        ] {
            // NaN fails this comparison as well
            if !(value > 0.0) {
                issues.push(DimensionIssue::NonPositivePhysicalSize { axis, value });
            }
        }

        if !self.channel_names.is_empty() && self.channel_names.len() != self.size_c as usize {
            issues.push(DimensionIssue::ChannelNameCount {
                names: self.channel_names.len(),
                size_c: self.size_c,
            });
        }

        issues
    }

    /// Check the dimensions, logging one diagnostic per failed check.
    ///
    /// Returns `true` only if every check passes.
    pub fn validate(&self) -> bool {
        let issues = self.issues();
        for issue in &issues {
            error!("{}", issue);
        }
        issues.is_empty()
    }

    /// Like [`validate`](Self::validate), but returns the failures as an error.
    pub fn ensure_valid(&self) -> Result<(), VolumeError> {
        let issues = self.issues();
        if issues.is_empty() {
            return Ok(());
        }
        for issue in &issues {
            error!("{}", issue);
        }
        Err(VolumeError::InvalidDimensions(issues))
    }

    /// Parse the dimension order into its typed form.
    pub fn order(&self) -> Result<DimensionOrder, VolumeError> {
        DimensionOrder::parse(&self.dimension_order)
    }

    /// Number of planes stored in the source (`Z * C * T`).
    pub fn plane_count(&self) -> u64 {
        self.size_z as u64 * self.size_c as u64 * self.size_t as u64
    }

    /// Size in bytes of one in-memory plane.
    pub fn plane_bytes(&self) -> usize {
        self.size_x as usize * self.size_y as usize * IN_MEMORY_BYTES_PER_SAMPLE
    }

    /// Extent of a single axis.
    pub fn size_of(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.size_x,
            Axis::Y => self.size_y,
            Axis::Z => self.size_z,
            Axis::C => self.size_c,
            Axis::T => self.size_t,
        }
    }

    /// Channel names, generating stringified indices when none were provided.
    pub fn channel_names_or_indices(&self) -> Vec<String> {
        if self.channel_names.is_empty() {
            index_channel_names(self.size_c)
        } else {
            self.channel_names.clone()
        }
    }

    /// Emit a summary of the dimensions at info level.
    pub fn log(&self) {
        info!(
            size_x = self.size_x,
            size_y = self.size_y,
            size_z = self.size_z,
            size_c = self.size_c,
            size_t = self.size_t,
            dimension_order = %self.dimension_order,
            bits_per_pixel = self.bits_per_pixel,
            "Volume dimensions"
        );
        info!(
            "Physical pixel size: [{}, {}, {}]",
            self.physical_size_x, self.physical_size_y, self.physical_size_z
        );
    }
}

/// `["0", "1", ..]` for `count` channels.
pub fn index_channel_names(count: u32) -> Vec<String> {
    (0..count).map(|i| i.to_string()).collect()
}
