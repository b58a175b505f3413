//! XML metadata segment: voxel scaling and channel names.

use roxmltree::{Document, Node};
use tracing::warn;

use crate::error::{CziError, VolumeError};
use crate::io::{read_i32_le, RangeReader};

use super::segment::{SegmentHeader, METADATA_ID, SEGMENT_HEADER_SIZE};

/// Offset of the XML text within the metadata segment data.
const METADATA_XML_OFFSET: u64 = 256;

/// Metres to microns.
const MICRONS_PER_METRE: f64 = 1_000_000.0;

/// Read the XML text of the metadata segment at `position`.
pub async fn read_metadata_xml<R: RangeReader + ?Sized>(
    reader: &R,
    position: u64,
) -> Result<String, CziError> {
    if position == 0 {
        return Err(CziError::MissingSegment(METADATA_ID));
    }
    SegmentHeader::read_expecting(reader, position, METADATA_ID).await?;
    let data_start = position + SEGMENT_HEADER_SIZE;
    let sizes = reader.read_exact_at(data_start, 8).await?;
    let xml_size = read_i32_le(&sizes[0..4]);
    let xml_size = usize::try_from(xml_size).map_err(|_| CziError::InvalidSegment {
        offset: position,
        message: format!("negative XML size {}", xml_size),
    })?;

    let xml = reader
        .read_exact_at(data_start + METADATA_XML_OFFSET, xml_size)
        .await?;
    let end = xml.iter().position(|&b| b == 0).unwrap_or(xml.len());
    Ok(String::from_utf8_lossy(&xml[..end]).into_owned())
}

/// Values taken from the metadata XML.
#[derive(Debug, Clone, PartialEq)]
pub struct CziMetadata {
    /// Voxel size along X, Y and Z in microns, when recorded
    pub scaling: [Option<f64>; 3],
    pub channel_names: Vec<String>,
}

impl CziMetadata {
    pub fn parse(xml: &str) -> Result<Self, VolumeError> {
        let doc = Document::parse(xml)
            .map_err(|e| VolumeError::malformed(format!("bad CZI XML metadata: {}", e)))?;
        let metadata = doc
            .descendants()
            .find(|n| n.has_tag_name("Metadata"))
            .ok_or_else(|| VolumeError::malformed("no Metadata element in CZI XML"))?;

        let scaling = ['X', 'Y', 'Z'].map(|axis| distance(metadata, axis));

        let channels = path(metadata, &["Information", "Image", "Dimensions", "Channels"])
            .ok_or_else(|| {
                VolumeError::malformed(
                    "CZI XML has no Metadata/Information/Image/Dimensions/Channels",
                )
            })?;
        let channel_names = channels
            .children()
            .filter(|n| n.has_tag_name("Channel"))
            .enumerate()
            .map(|(i, channel)| {
                channel
                    .attribute("Name")
                    .or_else(|| channel.attribute("Id"))
                    .map(str::to_string)
                    .unwrap_or_else(|| i.to_string())
            })
            .collect();

        Ok(Self {
            scaling,
            channel_names,
        })
    }

    /// Voxel sizes in microns, 1.0 where the file records none.
    pub fn physical_sizes(&self) -> [f64; 3] {
        let mut sizes = [1.0; 3];
        for (i, axis) in ['X', 'Y', 'Z'].iter().enumerate() {
            match self.scaling[i] {
                Some(value) => sizes[i] = value,
                None => warn!("CZI has no {} scaling, assuming 1 micron", axis),
            }
        }
        sizes
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn path<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    names.iter().try_fold(node, |n, name| child(n, name))
}

/// `Scaling/Items/Distance[@Id=axis]/Value`, converted from metres.
fn distance(metadata: Node, axis: char) -> Option<f64> {
    let items = path(metadata, &["Scaling", "Items"])?;
    let id = axis.to_string();
    let value = items
        .children()
        .filter(|n| n.has_tag_name("Distance"))
        .find(|n| n.attribute("Id") == Some(id.as_str()))
        .and_then(|n| child(n, "Value"))
        .and_then(|n| n.text())?;
    match value.trim().parse::<f64>() {
        Ok(metres) if metres.is_finite() && metres > 0.0 => Some(metres * MICRONS_PER_METRE),
        _ => {
            warn!("Ignoring CZI {} scaling {:?}", axis, value);
            None
        }
    }
}
