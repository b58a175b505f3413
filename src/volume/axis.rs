//! Canonical axes and the typed dimension order.
//!
//! File formats describe how planes are laid out on disk with a five letter
//! string such as `XYZCT`. The first two letters are always the spatial plane
//! axes; the remaining three are a permutation of `Z`, `C` and `T` where the
//! earliest letter varies fastest in the file's sequential plane order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VolumeError;

// =============================================================================
// Axis
// =============================================================================

/// One of the five canonical volume axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Columns of a plane
    X,
    /// Rows of a plane
    Y,
    /// Depth (slice)
    Z,
    /// Channel
    C,
    /// Time point
    T,
}

impl Axis {
    /// All axes, in canonical `XYZCT` order.
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::C, Axis::T];

    /// Parse an axis from its letter. Only upper case letters are accepted.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            'C' => Some(Axis::C),
            'T' => Some(Axis::T),
            _ => None,
        }
    }

    /// The letter used for this axis in dimension order strings.
    pub const fn as_char(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::C => 'C',
            Axis::T => 'T',
        }
    }

    /// Whether this axis spans a single plane (X or Y).
    pub const fn is_spatial(self) -> bool {
        matches!(self, Axis::X | Axis::Y)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// =============================================================================
// DimensionOrder
// =============================================================================

/// A validated axis permutation.
///
/// `planes[0]` varies fastest in the file's sequential plane order and
/// `planes[2]` slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionOrder {
    spatial: [Axis; 2],
    planes: [Axis; 3],
}

impl DimensionOrder {
    /// `XYZCT`: Z fastest, then C, then T.
    pub const XYZCT: DimensionOrder = DimensionOrder {
        spatial: [Axis::X, Axis::Y],
        planes: [Axis::Z, Axis::C, Axis::T],
    };

    /// `XYCZT`: C fastest, then Z, then T.
    pub const XYCZT: DimensionOrder = DimensionOrder {
        spatial: [Axis::X, Axis::Y],
        planes: [Axis::C, Axis::Z, Axis::T],
    };

    /// Parse a dimension order string.
    ///
    /// The string must be exactly five letters from `XYZCT` without repeats,
    /// and must begin with `XY` or `YX`.
    pub fn parse(order: &str) -> Result<Self, VolumeError> {
        let mut axes = Vec::with_capacity(5);
        for c in order.chars() {
            let axis = Axis::from_char(c).ok_or_else(|| {
                VolumeError::malformed(format!(
                    "dimension order {:?} contains unknown axis {:?}",
                    order, c
                ))
            })?;
            if axes.contains(&axis) {
                return Err(VolumeError::malformed(format!(
                    "dimension order {:?} repeats axis {}",
                    order, axis
                )));
            }
            axes.push(axis);
        }

        if axes.len() != 5 {
            return Err(VolumeError::malformed(format!(
                "dimension order {:?} must have 5 axes, has {}",
                order,
                axes.len()
            )));
        }

        if !(axes[0].is_spatial() && axes[1].is_spatial()) {
            return Err(VolumeError::malformed(format!(
                "dimension order {:?} must start with XY or YX",
                order
            )));
        }

        Ok(DimensionOrder {
            spatial: [axes[0], axes[1]],
            planes: [axes[2], axes[3], axes[4]],
        })
    }

    /// The two spatial axes, in order.
    pub fn spatial(&self) -> [Axis; 2] {
        self.spatial
    }

    /// The non-spatial axes, fastest-varying first.
    pub fn planes(&self) -> [Axis; 3] {
        self.planes
    }

    /// Slot (0 = fastest) of a non-spatial axis. Returns `None` for X and Y.
    pub fn position(&self, axis: Axis) -> Option<usize> {
        self.planes.iter().position(|&a| a == axis)
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for axis in self.spatial.iter().chain(self.planes.iter()) {
            write!(f, "{}", axis)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for DimensionOrder {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DimensionOrder::parse(s)
    }
}
