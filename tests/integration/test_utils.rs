//! Test utilities for integration tests.
//!
//! This module provides a tracking range reader and byte-level builders for
//! TIFF plane stacks and CZI containers.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use tokio::sync::RwLock;

use volume_stack::error::IoError;
use volume_stack::io::RangeReader;

// =============================================================================
// Mock Range Reader with Request Tracking
// =============================================================================

/// A range reader over bytes that records every read request.
pub struct TrackingReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<(u64, usize)>>>,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Whether any request touched `[start, end)`.
    pub async fn touched(&self, start: u64, end: u64) -> bool {
        self.requests
            .read()
            .await
            .iter()
            .any(|&(offset, len)| offset < end && offset + len as u64 > start)
    }
}

impl Clone for TrackingReader {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            identifier: self.identifier.clone(),
            request_count: Arc::clone(&self.request_count),
            requests: Arc::clone(&self.requests),
        }
    }
}

#[async_trait]
impl RangeReader for TrackingReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push((offset, len));

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// TIFF Builder
// =============================================================================

/// Compression applied to every strip by [`TiffStackBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripCompression {
    None,
    Deflate,
}

/// Builds a single-strip-per-plane grayscale TIFF stack.
pub struct TiffStackBuilder {
    width: u32,
    height: u32,
    bits: u16,
    big_endian: bool,
    compression: StripCompression,
    description: Option<String>,
    planes: Vec<Vec<u16>>,
}

impl TiffStackBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: 16,
            big_endian: false,
            compression: StripCompression::None,
            description: None,
            planes: Vec::new(),
        }
    }

    pub fn bits(mut self, bits: u16) -> Self {
        self.bits = bits;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn compression(mut self, compression: StripCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a plane filled with `value`.
    pub fn constant_plane(self, value: u16) -> Self {
        let samples = vec![value; (self.width * self.height) as usize];
        self.plane(samples)
    }

    /// Add a plane of row-major samples.
    pub fn plane(mut self, samples: Vec<u16>) -> Self {
        assert_eq!(samples.len(), (self.width * self.height) as usize);
        self.planes.push(samples);
        self
    }

    fn u16_bytes(&self, value: u16) -> [u8; 2] {
        if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    fn u32_bytes(&self, value: u32) -> [u8; 4] {
        if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    fn strip_bytes(&self, samples: &[u16]) -> Vec<u8> {
        let raw: Vec<u8> = match self.bits {
            8 => samples.iter().map(|&s| s as u8).collect(),
            _ => samples.iter().flat_map(|&s| self.u16_bytes(s)).collect(),
        };
        match self.compression {
            StripCompression::None => raw,
            StripCompression::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&raw).unwrap();
                encoder.finish().unwrap()
            }
        }
    }

    /// Assemble the file. Only the first IFD carries the description.
    pub fn build(&self) -> Vec<u8> {
        let mut data = if self.big_endian {
            vec![0x4D, 0x4D, 0x00, 0x2A]
        } else {
            vec![0x49, 0x49, 0x2A, 0x00]
        };
        data.extend_from_slice(&self.u32_bytes(8));

        let compression_code: u16 = match self.compression {
            StripCompression::None => 1,
            StripCompression::Deflate => 8,
        };

        for (i, samples) in self.planes.iter().enumerate() {
            let description = if i == 0 { self.description.as_deref() } else { None };
            let desc_bytes = description
                .map(|d| {
                    let mut bytes = d.as_bytes().to_vec();
                    bytes.push(0);
                    bytes
                })
                .unwrap_or_default();
            let strip = self.strip_bytes(samples);

            // Nine fixed tags plus ImageDescription on the first IFD.
            let entry_count: u32 = 9 + u32::from(description.is_some());
            let ifd_start = data.len() as u32;
            let desc_offset = ifd_start + 2 + entry_count * 12 + 4;
            let strip_offset = desc_offset + desc_bytes.len() as u32;
            let next = if i + 1 < self.planes.len() {
                strip_offset + strip.len() as u32
            } else {
                0
            };

            data.extend_from_slice(&self.u16_bytes(entry_count as u16));
            self.push_long(&mut data, 256, self.width);
            self.push_long(&mut data, 257, self.height);
            self.push_short(&mut data, 258, self.bits);
            self.push_short(&mut data, 259, compression_code);
            self.push_short(&mut data, 262, 1);
            if description.is_some() {
                let count = desc_bytes.len() as u32;
                self.push_entry(&mut data, 270, 2, count, self.u32_bytes(desc_offset));
            }
            self.push_long(&mut data, 273, strip_offset);
            self.push_short(&mut data, 277, 1);
            self.push_long(&mut data, 278, self.height);
            self.push_long(&mut data, 279, strip.len() as u32);
            data.extend_from_slice(&self.u32_bytes(next));
            data.extend_from_slice(&desc_bytes);
            data.extend_from_slice(&strip);
        }
        data
    }

    fn push_entry(
        &self,
        data: &mut Vec<u8>,
        tag: u16,
        field_type: u16,
        count: u32,
        value: [u8; 4],
    ) {
        data.extend_from_slice(&self.u16_bytes(tag));
        data.extend_from_slice(&self.u16_bytes(field_type));
        data.extend_from_slice(&self.u32_bytes(count));
        data.extend_from_slice(&value);
    }

    fn push_short(&self, data: &mut Vec<u8>, tag: u16, value: u16) {
        let [a, b] = self.u16_bytes(value);
        self.push_entry(data, tag, 3, 1, [a, b, 0, 0]);
    }

    fn push_long(&self, data: &mut Vec<u8>, tag: u16, value: u32) {
        self.push_entry(data, tag, 4, 1, self.u32_bytes(value));
    }
}

/// Minimal OME-XML description for a single image.
pub fn ome_xml(
    size: (u32, u32, u32, u32, u32),
    order: &str,
    pixel_type: &str,
    channels: &[&str],
    physical_size_z: Option<(&str, &str)>,
) -> String {
    let (x, y, z, c, t) = size;
    let z_attrs = physical_size_z
        .map(|(value, unit)| {
            format!(r#" PhysicalSizeZ="{}" PhysicalSizeZUnit="{}""#, value, unit)
        })
        .unwrap_or_default();
    let channel_elements: String = channels
        .iter()
        .enumerate()
        .map(|(i, name)| format!(r#"<Channel ID="Channel:0:{}" Name="{}"/>"#, i, name))
        .collect();
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">"#,
            r#"<Image ID="Image:0"><Pixels ID="Pixels:0" DimensionOrder="{}" Type="{}""#,
            r#" SizeX="{}" SizeY="{}" SizeZ="{}" SizeC="{}" SizeT="{}""#,
            r#" PhysicalSizeX="0.25" PhysicalSizeY="0.25"{}>{}</Pixels></Image></OME>"#
        ),
        order, pixel_type, x, y, z, c, t, z_attrs, channel_elements
    )
}

// =============================================================================
// CZI Builder
// =============================================================================

const DV_FIXED_SIZE: usize = 32;
const DIMENSION_ENTRY_SIZE: usize = 20;

/// Pixel type codes used by [`CziBlock`].
pub const CZI_GRAY8: i32 = 0;
pub const CZI_GRAY16: i32 = 1;

/// Compression codes used by [`CziBlock`].
pub const CZI_UNCOMPRESSED: i32 = 0;
pub const CZI_ZSTD0: i32 = 5;

/// One sub-block of a CZI container.
#[derive(Debug, Clone)]
pub struct CziBlock {
    pub pixel_type: i32,
    pub compression: i32,

    /// Non-spatial coordinates, each of size 1
    pub dims: Vec<(char, i32)>,

    /// Row-major samples; 8-bit blocks use the low byte
    pub samples: Vec<u16>,
}

impl CziBlock {
    pub fn gray16(dims: &[(char, i32)], samples: Vec<u16>) -> Self {
        Self {
            pixel_type: CZI_GRAY16,
            compression: CZI_UNCOMPRESSED,
            dims: dims.to_vec(),
            samples,
        }
    }

    fn payload(&self) -> Vec<u8> {
        let raw: Vec<u8> = if self.pixel_type == CZI_GRAY8 {
            self.samples.iter().map(|&s| s as u8).collect()
        } else {
            self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
        };
        if self.compression == CZI_ZSTD0 {
            zstd::bulk::compress(&raw, 3).unwrap()
        } else {
            raw
        }
    }
}

/// Builds a CZI container with uniformly sized sub-blocks.
pub struct CziBuilder {
    width: i32,
    height: i32,
    blocks: Vec<CziBlock>,
    xml: String,
}

/// Metadata listing `channels` and a Z distance in meters.
pub fn czi_xml(channels: &[&str], z_meters: &str) -> String {
    let channel_elements: String = channels
        .iter()
        .enumerate()
        .map(|(i, name)| format!(r#"<Channel Id="Channel:{}" Name="{}"/>"#, i, name))
        .collect();
    format!(
        concat!(
            "<ImageDocument><Metadata>",
            r#"<Scaling><Items><Distance Id="X"><Value>1.5E-07</Value></Distance>"#,
            r#"<Distance Id="Y"><Value>1.5E-07</Value></Distance>"#,
            r#"<Distance Id="Z"><Value>{}</Value></Distance></Items></Scaling>"#,
            "<Information><Image><Dimensions><Channels>{}</Channels></Dimensions>",
            "</Image></Information></Metadata></ImageDocument>"
        ),
        z_meters, channel_elements
    )
}

impl CziBuilder {
    pub fn new(width: i32, height: i32, xml: impl Into<String>) -> Self {
        Self {
            width,
            height,
            blocks: Vec::new(),
            xml: xml.into(),
        }
    }

    pub fn block(mut self, block: CziBlock) -> Self {
        self.blocks.push(block);
        self
    }

    fn segment(id: &str, body: Vec<u8>) -> Vec<u8> {
        let mut bytes = vec![0u8; 32];
        bytes[..id.len()].copy_from_slice(id.as_bytes());
        bytes[16..24].copy_from_slice(&(body.len() as i64).to_le_bytes());
        bytes[24..32].copy_from_slice(&(body.len() as i64).to_le_bytes());
        bytes.extend(body);
        bytes
    }

    fn entry(&self, block: &CziBlock, position: usize) -> Vec<u8> {
        let mut dims = vec![('X', 0, self.width), ('Y', 0, self.height)];
        dims.extend(block.dims.iter().map(|&(name, start)| (name, start, 1)));

        let mut bytes = vec![0u8; DV_FIXED_SIZE];
        bytes[0..2].copy_from_slice(b"DV");
        bytes[2..6].copy_from_slice(&block.pixel_type.to_le_bytes());
        bytes[6..14].copy_from_slice(&(position as i64).to_le_bytes());
        bytes[18..22].copy_from_slice(&block.compression.to_le_bytes());
        bytes[28..32].copy_from_slice(&(dims.len() as i32).to_le_bytes());
        for (name, start, size) in dims {
            let mut d = vec![0u8; DIMENSION_ENTRY_SIZE];
            d[0] = name as u8;
            d[4..8].copy_from_slice(&start.to_le_bytes());
            d[8..12].copy_from_slice(&size.to_le_bytes());
            d[16..20].copy_from_slice(&size.to_le_bytes());
            bytes.extend_from_slice(&d);
        }
        bytes
    }

    /// Assemble the file, returning it with the byte range of each
    /// sub-block's pixel data.
    pub fn build_with_ranges(&self) -> (Vec<u8>, Vec<(u64, u64)>) {
        let mut file = Self::segment("ZISRAWFILE", vec![0u8; 512]);
        let mut entries = Vec::new();
        let mut ranges = Vec::new();
        for block in &self.blocks {
            let entry = self.entry(block, file.len());
            let payload = block.payload();

            let mut body = vec![0u8; 16];
            body[8..16].copy_from_slice(&(payload.len() as i64).to_le_bytes());
            body.extend_from_slice(&entry);
            body.resize(body.len().max(256), 0);
            let data_start = (file.len() + 32 + body.len()) as u64;
            ranges.push((data_start, data_start + payload.len() as u64));
            body.extend_from_slice(&payload);

            file.extend(Self::segment("ZISRAWSUBBLOCK", body));
            entries.push(entry);
        }

        let directory_position = file.len() as i64;
        let mut directory = vec![0u8; 128];
        directory[0..4].copy_from_slice(&(entries.len() as i32).to_le_bytes());
        for entry in entries {
            directory.extend(entry);
        }
        file.extend(Self::segment("ZISRAWDIRECTORY", directory));

        let metadata_position = file.len() as i64;
        let mut metadata = vec![0u8; 256];
        metadata[0..4].copy_from_slice(&(self.xml.len() as i32).to_le_bytes());
        metadata.extend_from_slice(self.xml.as_bytes());
        file.extend(Self::segment("ZISRAWMETADATA", metadata));

        file[32 + 52..32 + 60].copy_from_slice(&directory_position.to_le_bytes());
        file[32 + 60..32 + 68].copy_from_slice(&metadata_position.to_le_bytes());
        (file, ranges)
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_ranges().0
    }
}

// =============================================================================
// Files on disk
// =============================================================================

/// Write `bytes` to a temporary file ending in `suffix`.
pub fn write_temp(bytes: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("volume-stack-")
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Sample at `(x, y)` of a row-major plane generated by [`gradient`].
pub fn gradient_value(seed: u16, width: u32, x: u32, y: u32) -> u16 {
    seed.wrapping_mul(1000)
        .wrapping_add((y * width + x) as u16)
}

/// Row-major plane whose samples encode `seed` and the pixel position.
pub fn gradient(seed: u16, width: u32, height: u32) -> Vec<u16> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| gradient_value(seed, width, x, y)))
        .collect()
}
