//! Z-stack reader for CZI containers.
//!
//! Dimensions come from the sub-block directory statistics and the XML
//! metadata. Planes are located by coordinate rather than by a linear
//! index: the first full-resolution sub-block whose Z, C, T and S indices
//! match (after adding each dimension's start offset) is decoded.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::{CziError, VolumeError};
use crate::io::RangeReader;
use crate::loader::PlaneSource;
use crate::volume::{
    copy_rows, PlaneSelector, SampleEndian, SourceLayout, VolumeDimensions,
    IN_MEMORY_BYTES_PER_SAMPLE,
};

use super::directory::{
    read_directory, DimensionBounds, DirectoryEntry, PixelType, Rect, SubBlockStatistics,
};
use super::metadata::{read_metadata_xml, CziMetadata};
use super::segment::{FileHeader, DIRECTORY_ID};
use super::subblock::{decompress_subblock, read_subblock_data};

/// An opened CZI z-stack.
pub struct CziVolume<R: RangeReader> {
    reader: R,
    entries: Vec<DirectoryEntry>,
    statistics: SubBlockStatistics,

    /// Layer-0 region of the selected scene
    plane_rect: Rect,
    dimensions: VolumeDimensions,
}

impl<R: RangeReader> CziVolume<R> {
    /// Open a container and extract the dimensions of `scene`.
    pub async fn open(reader: R, scene: u32) -> Result<Self, VolumeError> {
        let (header, entries, statistics) = read_structure(&reader).await?;
        let plane_rect = scene_rect(&statistics, scene)?;

        let xml = read_metadata_xml(&reader, header.metadata_position).await?;
        let metadata = CziMetadata::parse(&xml)
            .inspect_err(|e| error!(file = reader.identifier(), "{}", e))?;

        let dimensions = extract_dimensions(&entries, &statistics, plane_rect, &metadata)
            .inspect_err(|e| error!(file = reader.identifier(), "{}", e))?;
        Self::assemble(reader, entries, statistics, plane_rect, dimensions)
    }

    /// Open a container with caller-supplied dimensions.
    ///
    /// The metadata segment is not read. Mosaic files are still rejected and
    /// the dimensions are still validated.
    pub async fn open_with_dimensions(
        reader: R,
        scene: u32,
        dimensions: VolumeDimensions,
    ) -> Result<Self, VolumeError> {
        let (_, entries, statistics) = read_structure(&reader).await?;
        let plane_rect = scene_rect(&statistics, scene)?;
        Self::assemble(reader, entries, statistics, plane_rect, dimensions)
    }

    fn assemble(
        reader: R,
        entries: Vec<DirectoryEntry>,
        statistics: SubBlockStatistics,
        plane_rect: Rect,
        dimensions: VolumeDimensions,
    ) -> Result<Self, VolumeError> {
        dimensions
            .ensure_valid()
            .inspect_err(|e| error!(file = reader.identifier(), "{}", e))?;
        debug!(
            file = reader.identifier(),
            subblocks = entries.len(),
            bounds = ?statistics.bounds,
            "Opened CZI container"
        );
        Ok(Self {
            reader,
            entries,
            statistics,
            plane_rect,
            dimensions,
        })
    }

    pub fn statistics(&self) -> &SubBlockStatistics {
        &self.statistics
    }

    pub fn subblock_count(&self) -> usize {
        self.entries.len()
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// First layer-0 sub-block at the given absolute indices.
    fn find_subblock(
        &self,
        z: i32,
        c: i32,
        t: Option<i32>,
        s: Option<i32>,
    ) -> Option<&DirectoryEntry> {
        let matches = |entry: &DirectoryEntry, name: char, wanted: Option<i32>| match wanted {
            Some(value) => entry.index(name).unwrap_or(value) == value,
            None => true,
        };
        self.entries.iter().find(|entry| {
            entry.is_layer0()
                && entry.index('Z') == Some(z)
                && entry.index('C') == Some(c)
                && matches(entry, 'T', t)
                && matches(entry, 'S', s)
                && entry
                    .rect()
                    .is_some_and(|rect| rect.intersects(&self.plane_rect))
        })
    }
}

/// File header, directory entries and statistics.
///
/// Mosaics and files without Z or C are rejected here, before any sub-block
/// is read.
async fn read_structure<R: RangeReader + ?Sized>(
    reader: &R,
) -> Result<(FileHeader, Vec<DirectoryEntry>, SubBlockStatistics), VolumeError> {
    let header = FileHeader::read(reader).await?;
    if header.directory_position == 0 {
        return Err(CziError::MissingSegment(DIRECTORY_ID).into());
    }
    let entries = read_directory(reader, header.directory_position).await?;
    let statistics = SubBlockStatistics::from_entries(&entries);

    if statistics.is_mosaic() {
        error!(
            file = reader.identifier(),
            "CZI file is a mosaic; mosaic reading is not supported"
        );
        return Err(VolumeError::unsupported("mosaic CZI files cannot be read"));
    }
    for axis in ['Z', 'C'] {
        if statistics.bounds(axis).is_none() {
            error!(
                file = reader.identifier(),
                "CZI file has no {} dimension; only z-stacks can be read", axis
            );
            return Err(VolumeError::unsupported(format!(
                "CZI file has no {} dimension",
                axis
            )));
        }
    }
    Ok((header, entries, statistics))
}

/// Layer-0 region covered by `scene`.
fn scene_rect(statistics: &SubBlockStatistics, scene: u32) -> Result<Rect, VolumeError> {
    match statistics.bounds('S') {
        Some(bounds) => {
            if scene >= bounds.size as u32 {
                return Err(VolumeError::out_of_bounds(format!(
                    "scene {} requested but the file has {} scenes",
                    scene, bounds.size
                )));
            }
            let absolute = bounds.start + scene as i32;
            Ok(statistics
                .scene_boxes
                .get(&absolute)
                .copied()
                .unwrap_or(statistics.bounding_box_layer0))
        }
        None => {
            if scene > 0 {
                warn!(scene, "CZI file has no scenes, reading scene 0");
            }
            Ok(statistics.bounding_box_layer0)
        }
    }
}

/// Build unvalidated dimensions from directory statistics and metadata.
pub fn extract_dimensions(
    entries: &[DirectoryEntry],
    statistics: &SubBlockStatistics,
    plane_rect: Rect,
    metadata: &CziMetadata,
) -> Result<VolumeDimensions, VolumeError> {
    let size = |axis: char| {
        statistics
            .bounds(axis)
            .map_or(1, |b| u32::try_from(b.size).unwrap_or(0))
    };

    let first_channel = statistics.bounds('C').map(|b| b.start);
    let pixel_type = entries
        .iter()
        .find(|e| first_channel.is_none() || e.index('C') == first_channel)
        .map(|e| e.pixel_type)
        .ok_or_else(|| VolumeError::malformed("CZI file has no sub-blocks"))?;
    let bits_per_pixel = pixel_type.bits_per_pixel().ok_or_else(|| {
        VolumeError::malformed(format!("unrecognised CZI pixel type {:?}", pixel_type))
    })?;

    let [physical_size_x, physical_size_y, physical_size_z] = metadata.physical_sizes();
    Ok(VolumeDimensions {
        size_x: u32::try_from(plane_rect.w).unwrap_or(0),
        size_y: u32::try_from(plane_rect.h).unwrap_or(0),
        size_z: size('Z'),
        size_c: size('C'),
        size_t: size('T'),
        physical_size_x,
        physical_size_y,
        physical_size_z,
        bits_per_pixel,
        channel_names: metadata.channel_names.clone(),
        ..VolumeDimensions::default()
    })
}

fn offset_index(bounds: Option<DimensionBounds>, index: u32) -> Option<i32> {
    bounds.map(|b| b.start + index as i32)
}

#[async_trait]
impl<R: RangeReader> PlaneSource for CziVolume<R> {
    fn dimensions(&self) -> &VolumeDimensions {
        &self.dimensions
    }

    fn supports_scenes(&self) -> bool {
        true
    }

    async fn read_plane(
        &self,
        selector: PlaneSelector,
        dest: &mut [u8],
    ) -> Result<(), VolumeError> {
        let coord = selector.coordinate;
        let stats = &self.statistics;
        let z = offset_index(stats.bounds('Z'), coord.z).unwrap_or(coord.z as i32);
        let c = offset_index(stats.bounds('C'), coord.c).unwrap_or(coord.c as i32);
        let t = offset_index(stats.bounds('T'), coord.t);
        let s = offset_index(stats.bounds('S'), selector.scene);

        let entry = self.find_subblock(z, c, t, s).ok_or_else(|| {
            VolumeError::malformed(format!(
                "no sub-block at Z={} C={} T={:?} S={:?}",
                z, c, t, s
            ))
        })?;

        let (width, height) = (self.dimensions.size_x, self.dimensions.size_y);
        if entry.stored_size() != Some((width, height)) {
            return Err(VolumeError::malformed(format!(
                "sub-block size {:?} does not match the {}x{} plane",
                entry.stored_size(),
                width,
                height
            )));
        }
        let bits = match entry.pixel_type {
            PixelType::Gray8 => 8,
            PixelType::Gray16 => 16,
            other => {
                return Err(VolumeError::unsupported(format!(
                    "CZI pixel type {:?} cannot be loaded as 16-bit",
                    other
                )))
            }
        };

        let plane_bytes = width as usize * height as usize * IN_MEMORY_BYTES_PER_SAMPLE;
        if dest.len() < plane_bytes {
            return Err(VolumeError::out_of_bounds(format!(
                "destination holds {} bytes, plane needs {}",
                dest.len(),
                plane_bytes
            )));
        }

        let layout = SourceLayout::packed(bits, width, SampleEndian::Little);
        let data = read_subblock_data(&self.reader, entry).await?;
        let expected = layout.row_stride * height as usize;
        let raw = decompress_subblock(entry.compression, data, expected)?;
        copy_rows(&raw, layout, width, height, dest)
    }
}
