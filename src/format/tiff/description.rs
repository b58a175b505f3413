//! Volume dimensions from the `ImageDescription` of the first IFD.
//!
//! Plane stacks written by different tools describe their shape in different
//! dialects of the description string:
//!
//! - **ImageJ**: `ImageJ=1.53t\nchannels=2\nslices=10\n...`
//! - **Shape array**: `{"shape": [C, Z, Y, X]}` or `{"shape": [T, C, Z, Y, X]}`
//! - **OME-XML**: an `<OME>` document whose first `Pixels` element holds the
//!   sizes, dimension order, physical sizes and channels
//!
//! Anything else is treated as a plain stack with one plane per IFD.

use roxmltree::{Document, Node};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::VolumeError;
use crate::volume::{index_channel_names, DimensionOrder, VolumeDimensions};

const IMAGEJ_PREFIX: &str = "ImageJ=";
const SHAPE_PREFIX: &str = "{\"shape\":";
const OME_PREFIX: &str = "<?xml version";
const OME_SUFFIX: &str = "OME>";

// =============================================================================
// DescriptionDialect
// =============================================================================

/// Metadata dialect of a TIFF description string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionDialect {
    ImageJ,
    ShapeArray,
    OmeXml,
    /// Unrecognised or missing description
    Fallback,
}

impl DescriptionDialect {
    /// Classify a description by its prefix (and suffix, for OME-XML).
    pub fn sniff(description: Option<&str>) -> Self {
        let Some(text) = description else {
            return DescriptionDialect::Fallback;
        };

        if text.starts_with(IMAGEJ_PREFIX) {
            DescriptionDialect::ImageJ
        } else if text.starts_with(SHAPE_PREFIX) {
            DescriptionDialect::ShapeArray
        } else if text.starts_with(OME_PREFIX)
            && text
                .trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
                .ends_with(OME_SUFFIX)
        {
            DescriptionDialect::OmeXml
        } else {
            DescriptionDialect::Fallback
        }
    }
}

// =============================================================================
// TiffBaseInfo
// =============================================================================

/// Facts taken from the TIFF structure itself rather than the description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffBaseInfo {
    /// ImageWidth of the first IFD
    pub width: u32,
    /// ImageLength of the first IFD
    pub height: u32,
    /// BitsPerSample of the first IFD
    pub bits_per_sample: u32,
    /// Number of IFDs in the chain
    pub ifd_count: u32,
}

/// Build unvalidated dimensions from a description string.
pub fn dimensions_from_description(
    description: Option<&str>,
    base: &TiffBaseInfo,
) -> Result<VolumeDimensions, VolumeError> {
    let dialect = DescriptionDialect::sniff(description);
    info!(?dialect, "Reading TIFF description");

    let text = description.unwrap_or_default();
    match dialect {
        DescriptionDialect::ImageJ => parse_imagej(text, base),
        DescriptionDialect::ShapeArray => parse_shape_array(text, base),
        DescriptionDialect::OmeXml => parse_ome_xml(text, base),
        DescriptionDialect::Fallback => Ok(plain_stack(base)),
    }
}

fn base_dimensions(base: &TiffBaseInfo) -> VolumeDimensions {
    VolumeDimensions {
        size_x: base.width,
        size_y: base.height,
        bits_per_pixel: base.bits_per_sample,
        dimension_order: DimensionOrder::XYCZT.to_string(),
        ..VolumeDimensions::default()
    }
}

fn check_plane_extent(
    dialect: &str,
    size_x: u32,
    size_y: u32,
    base: &TiffBaseInfo,
) -> Result<(), VolumeError> {
    if (size_x != 0 && size_x != base.width) || (size_y != 0 && size_y != base.height) {
        return Err(VolumeError::malformed(format!(
            "{} declares {}x{} planes but the TIFF stores {}x{}",
            dialect, size_x, size_y, base.width, base.height
        )));
    }
    Ok(())
}

// =============================================================================
// ImageJ
// =============================================================================

fn parse_imagej(text: &str, base: &TiffBaseInfo) -> Result<VolumeDimensions, VolumeError> {
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    for line in text.lines().map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split('=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(VolumeError::malformed(format!(
                "unexpected name/value pair in ImageJ metadata: {:?}",
                line
            )));
        }
        pairs.push((key, value));
    }
    let lookup = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.trim())
    };

    let count = |key: &str| -> Result<u32, VolumeError> {
        match lookup(key) {
            Some(value) => value.parse::<u32>().map_err(|_| {
                VolumeError::malformed(format!("ImageJ {} is not an integer: {:?}", key, value))
            }),
            None => {
                warn!("ImageJ metadata has no {}, assuming 1", key);
                Ok(1)
            }
        }
    };

    let mut dims = base_dimensions(base);
    dims.size_c = count("channels")?;
    dims.size_z = count("slices")?;
    dims.size_t = count("frames")?;

    if let Some(value) = lookup("spacing") {
        match value.parse::<f64>() {
            Ok(spacing) if spacing.is_finite() => {
                let spacing = spacing.abs();
                dims.physical_size_x = spacing;
                dims.physical_size_y = spacing;
                dims.physical_size_z = spacing;
            }
            _ => warn!("Failed to read ImageJ spacing {:?}", value),
        }
    }

    dims.channel_names = index_channel_names(dims.size_c);
    Ok(dims)
}

// =============================================================================
// Shape array
// =============================================================================

#[derive(Debug, Deserialize)]
struct ShapeDescription {
    shape: Vec<u32>,
}

fn parse_shape_array(text: &str, base: &TiffBaseInfo) -> Result<VolumeDimensions, VolumeError> {
    let text = text.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    let parsed: ShapeDescription = serde_json::from_str(text)
        .map_err(|e| VolumeError::malformed(format!("invalid shape description: {}", e)))?;

    let (t, rest) = match parsed.shape.as_slice() {
        [c, z, y, x] => (1, [*c, *z, *y, *x]),
        [t, c, z, y, x] => (*t, [*c, *z, *y, *x]),
        other => {
            return Err(VolumeError::malformed(format!(
                "expected a 4D or 5D shape, got {} dimensions",
                other.len()
            )))
        }
    };
    let [c, z, y, x] = rest;
    check_plane_extent("shape description", x, y, base)?;

    let mut dims = base_dimensions(base);
    dims.size_t = t;
    dims.size_c = c;
    dims.size_z = z;
    dims.size_y = y;
    dims.size_x = x;
    dims.dimension_order = DimensionOrder::XYZCT.to_string();
    dims.channel_names = index_channel_names(c);
    Ok(dims)
}

// =============================================================================
// OME-XML
// =============================================================================

/// Bits per sample of an OME pixel type.
fn ome_pixel_type_bits(pixel_type: &str) -> Option<u32> {
    match pixel_type {
        "uint8" | "int8" => Some(8),
        "uint16" | "int16" => Some(16),
        "uint32" | "int32" | "float" => Some(32),
        "double" => Some(64),
        _ => None,
    }
}

/// Factor converting a length unit to microns.
fn microns_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "" | "µm" | "μm" | "um" | "micron" => Some(1.0),
        "Å" => Some(1e-4),
        "nm" => Some(1e-3),
        "mm" => Some(1e3),
        "cm" => Some(1e4),
        "m" => Some(1e6),
        _ => None,
    }
}

fn parse_ome_xml(text: &str, base: &TiffBaseInfo) -> Result<VolumeDimensions, VolumeError> {
    let text = text.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    let doc = Document::parse(text)
        .map_err(|e| VolumeError::malformed(format!("bad OME-XML: {}", e)))?;

    let pixels = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "Pixels")
        .ok_or_else(|| VolumeError::malformed("no <Pixels> element in OME-XML"))?;

    let pixel_type = pixels.attribute("Type").unwrap_or("uint16").to_lowercase();
    let bits = ome_pixel_type_bits(&pixel_type).ok_or_else(|| {
        VolumeError::unsupported(format!("unknown OME pixel type {:?}", pixel_type))
    })?;
    if bits != 8 && bits != 16 {
        return Err(VolumeError::unsupported(format!(
            "image must be 8 or 16-bit integer typed, got {}",
            pixel_type
        )));
    }

    let size = |name: &str| -> Result<u32, VolumeError> {
        match pixels.attribute(name) {
            Some(value) => value.trim().parse::<u32>().map_err(|_| {
                VolumeError::malformed(format!("OME {} is not an integer: {:?}", name, value))
            }),
            None => Ok(0),
        }
    };

    let mut dims = base_dimensions(base);
    dims.bits_per_pixel = bits;
    dims.size_x = size("SizeX")?;
    dims.size_y = size("SizeY")?;
    dims.size_z = size("SizeZ")?;
    dims.size_c = size("SizeC")?;
    dims.size_t = size("SizeT")?;
    check_plane_extent("OME-XML", dims.size_x, dims.size_y, base)?;

    if let Some(order) = pixels.attribute("DimensionOrder") {
        dims.dimension_order = order.to_string();
    }

    dims.physical_size_x = physical_size(&pixels, "X")?;
    dims.physical_size_y = physical_size(&pixels, "Y")?;
    dims.physical_size_z = physical_size(&pixels, "Z")?;

    dims.channel_names = pixels
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Channel")
        .enumerate()
        .map(|(i, channel)| {
            channel
                .attribute("Name")
                .filter(|s| !s.is_empty())
                .or_else(|| channel.attribute("ID").filter(|s| !s.is_empty()))
                .map(str::to_string)
                .unwrap_or_else(|| i.to_string())
        })
        .collect();

    Ok(dims)
}

/// `PhysicalSize{axis}` in microns, default 1.0.
fn physical_size(pixels: &Node<'_, '_>, axis: &str) -> Result<f64, VolumeError> {
    let name = format!("PhysicalSize{}", axis);
    let Some(raw) = pixels.attribute(name.as_str()) else {
        return Ok(1.0);
    };
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| VolumeError::malformed(format!("OME {} is not a number: {:?}", name, raw)))?;

    let unit = pixels
        .attribute(format!("{}Unit", name).as_str())
        .unwrap_or_default();
    match microns_per_unit(unit) {
        Some(factor) => Ok(value * factor),
        None => {
            warn!("Unknown OME length unit {:?} for {}, keeping raw value", unit, name);
            Ok(value)
        }
    }
}

// =============================================================================
// Plain stack
// =============================================================================

fn plain_stack(base: &TiffBaseInfo) -> VolumeDimensions {
    let mut dims = base_dimensions(base);
    dims.size_z = base.ifd_count;
    dims.channel_names = index_channel_names(1);
    dims
}
