//! Plane-stack reader for TIFF files.
//!
//! Each IFD of the chain holds one 2D plane. The first IFD's description
//! string determines the volume dimensions; the dimension order then maps a
//! `(Z, C, T)` coordinate to the IFD holding that plane.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::{TiffError, VolumeError};
use crate::io::RangeReader;
use crate::loader::PlaneSource;
use crate::volume::{PlaneLayout, PlaneSelector, VolumeDimensions};

use super::description::{dimensions_from_description, DescriptionDialect, TiffBaseInfo};
use super::directory::{read_header, read_ifd, walk_ifd_chain, PlaneDirectory};
use super::parser::{Ifd, TiffHeader};
use super::plane::read_plane_into;
use super::tags::TiffTag;
use super::values::ValueReader;

/// An opened TIFF plane stack.
pub struct TiffVolume<R: RangeReader> {
    reader: R,
    header: TiffHeader,

    /// Offset of every IFD in chain order
    ifd_offsets: Vec<u64>,

    dialect: DescriptionDialect,
    dimensions: VolumeDimensions,
    layout: PlaneLayout,
}

impl<R: RangeReader> TiffVolume<R> {
    /// Open a stack, extracting dimensions from its first IFD.
    pub async fn open(reader: R) -> Result<Self, VolumeError> {
        let (header, ifd_offsets) = read_structure(&reader).await?;
        let first = read_ifd(&reader, &header, ifd_offsets[0]).await?;
        let first_plane = PlaneDirectory::read(&reader, &header, &first).await?;
        if first.get_entry_by_tag(TiffTag::SampleFormat).is_none() {
            warn!(
                file = reader.identifier(),
                "TIFF has no SampleFormat tag, assuming unsigned integers"
            );
        }

        let description = read_description(&reader, &header, &first).await?;
        let dialect = DescriptionDialect::sniff(description.as_deref());
        let base = TiffBaseInfo {
            width: first_plane.width,
            height: first_plane.height,
            bits_per_sample: first_plane.bits_per_sample,
            ifd_count: ifd_offsets.len() as u32,
        };
        let dimensions = dimensions_from_description(description.as_deref(), &base)
            .inspect_err(|e| error!(file = reader.identifier(), "{}", e))?;

        Self::assemble(reader, header, ifd_offsets, dialect, dimensions)
    }

    /// Open a stack with caller-supplied dimensions.
    ///
    /// The description is not parsed; the dimensions are still validated.
    pub async fn open_with_dimensions(
        reader: R,
        dimensions: VolumeDimensions,
    ) -> Result<Self, VolumeError> {
        let (header, ifd_offsets) = read_structure(&reader).await?;
        Self::assemble(
            reader,
            header,
            ifd_offsets,
            DescriptionDialect::Fallback,
            dimensions,
        )
    }

    fn assemble(
        reader: R,
        header: TiffHeader,
        ifd_offsets: Vec<u64>,
        dialect: DescriptionDialect,
        dimensions: VolumeDimensions,
    ) -> Result<Self, VolumeError> {
        dimensions
            .ensure_valid()
            .inspect_err(|e| error!(file = reader.identifier(), "{}", e))?;
        let layout = PlaneLayout::new(&dimensions)?;
        if layout.plane_count() > ifd_offsets.len() as u64 {
            warn!(
                file = reader.identifier(),
                planes = layout.plane_count(),
                ifds = ifd_offsets.len(),
                "TIFF declares more planes than it has IFDs"
            );
        }
        debug!(
            file = reader.identifier(),
            ?dialect,
            ifds = ifd_offsets.len(),
            bigtiff = header.is_bigtiff,
            "Opened TIFF stack"
        );

        Ok(Self {
            reader,
            header,
            ifd_offsets,
            dialect,
            dimensions,
            layout,
        })
    }

    /// Metadata dialect of the first IFD's description.
    pub fn dialect(&self) -> DescriptionDialect {
        self.dialect
    }

    /// Number of IFDs in the chain.
    pub fn ifd_count(&self) -> usize {
        self.ifd_offsets.len()
    }
}

/// Header plus the offset of every IFD; an empty chain is malformed.
async fn read_structure<R: RangeReader + ?Sized>(
    reader: &R,
) -> Result<(TiffHeader, Vec<u64>), VolumeError> {
    let header = read_header(reader).await?;
    let ifd_offsets = walk_ifd_chain(reader, &header).await?;
    if ifd_offsets.is_empty() {
        return Err(VolumeError::malformed(format!(
            "{} contains no image directories",
            reader.identifier()
        )));
    }
    Ok((header, ifd_offsets))
}

async fn read_description<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<Option<String>, TiffError> {
    match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        Some(entry) => {
            let values = ValueReader::new(reader, header);
            let text = values.read_string(entry, TiffTag::ImageDescription).await?;
            Ok(Some(text))
        }
        None => {
            warn!(
                file = reader.identifier(),
                "TIFF has no ImageDescription, treating as a plain stack"
            );
            Ok(None)
        }
    }
}

#[async_trait]
impl<R: RangeReader> PlaneSource for TiffVolume<R> {
    fn dimensions(&self) -> &VolumeDimensions {
        &self.dimensions
    }

    async fn read_plane(
        &self,
        selector: PlaneSelector,
        dest: &mut [u8],
    ) -> Result<(), VolumeError> {
        let index = self.layout.index_of(selector.coordinate)?;
        let offset = *self.ifd_offsets.get(index as usize).ok_or_else(|| {
            VolumeError::malformed(format!(
                "plane {} requested but the file has {} IFDs",
                index,
                self.ifd_offsets.len()
            ))
        })?;

        let ifd = read_ifd(&self.reader, &self.header, offset).await?;
        let dir = PlaneDirectory::read(&self.reader, &self.header, &ifd).await?;
        if dir.width != self.dimensions.size_x || dir.height != self.dimensions.size_y {
            return Err(VolumeError::malformed(format!(
                "IFD {} is {}x{}, expected {}x{}",
                index, dir.width, dir.height, self.dimensions.size_x, self.dimensions.size_y
            )));
        }

        read_plane_into(&self.reader, self.header.byte_order, &dir, dest).await
    }
}
