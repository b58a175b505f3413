//! Volume assembly: every (channel, slice) plane of one timepoint into a
//! single 16-bit buffer.

use std::time::Instant;

use tracing::{debug, error, warn};

use crate::error::VolumeError;
use crate::volume::{ImageXyzc, PlaneCoordinate, PlaneSelector, VolumeBuffer};

use super::source::PlaneSource;

/// Read timepoint `time` of `scene` from `source` into an image.
///
/// The buffer is laid out channel-major: plane `(c, z)` starts at
/// `(c * size_z + z) * plane_bytes`. Any failed plane read aborts the load and
/// the partially filled buffer is dropped.
pub async fn assemble_volume<S: PlaneSource + ?Sized>(
    source: &S,
    time: u32,
    scene: u32,
) -> Result<ImageXyzc, VolumeError> {
    let started = Instant::now();
    let dims = source.dimensions();
    dims.ensure_valid()?;

    if time >= dims.size_t {
        error!(time, size_t = dims.size_t, "Requested timepoint out of range");
        return Err(VolumeError::out_of_bounds(format!(
            "time {} requested but the volume has {} timepoints",
            time, dims.size_t
        )));
    }

    let scene = if scene > 0 && !source.supports_scenes() {
        warn!(scene, "Format has no scenes, reading scene 0");
        0
    } else {
        scene
    };

    let mut buffer = VolumeBuffer::new(dims.size_x, dims.size_y, dims.size_z, dims.size_c)?;
    for c in 0..dims.size_c {
        for z in 0..dims.size_z {
            let selector = PlaneSelector {
                coordinate: PlaneCoordinate::new(z, c, time),
                scene,
            };
            let dest = buffer.plane_mut(c, z)?;
            source
                .read_plane(selector, dest)
                .await
                .inspect_err(|e| error!(c, z, time, scene, "Failed to read plane: {}", e))?;
        }
    }
    debug!(
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        planes = dims.size_c * dims.size_z,
        "Read volume planes"
    );

    Ok(ImageXyzc::from_buffer(dims, buffer))
}
