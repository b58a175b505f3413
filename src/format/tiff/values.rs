//! TIFF tag value reading.
//!
//! Values are stored either inline in the IFD entry or at an offset in the
//! file. Arrays such as StripOffsets are fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

/// Reads tag values respecting the file's byte order and layout.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let offset = entry.value_offset(self.header.byte_order);
        Ok(self.reader.read_exact_at(offset, size as usize).await?)
    }

    /// Single unsigned integer value.
    ///
    /// Arrays are accepted when every element is equal, as written by
    /// encoders that repeat BitsPerSample per sample.
    pub async fn read_u32(&self, entry: &IfdEntry, tag: TiffTag) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }

        let values = self.read_u64_array(entry, tag).await?;
        let first = *values.first().ok_or_else(|| TiffError::InvalidTagValue {
            tag: tag.name(),
            message: "empty value".to_string(),
        })?;
        if values.iter().any(|&v| v != first) {
            return Err(TiffError::InvalidTagValue {
                tag: tag.name(),
                message: format!("expected a single value, got {:?}", values),
            });
        }
        u32::try_from(first).map_err(|_| TiffError::InvalidTagValue {
            tag: tag.name(),
            message: format!("value {} does not fit in 32 bits", first),
        })
    }

    /// Array of unsigned integers (Byte, Short, Long or Long8).
    pub async fn read_u64_array(
        &self,
        entry: &IfdEntry,
        tag: TiffTag,
    ) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;
        let size = field_type.size_in_bytes();

        let read: fn(ByteOrder, &[u8]) -> u64 = match field_type {
            FieldType::Byte => |_, b| b[0] as u64,
            FieldType::Short => |bo, b| bo.read_u16(b) as u64,
            FieldType::Long | FieldType::Ifd => |bo, b| bo.read_u32(b) as u64,
            FieldType::Long8 | FieldType::Ifd8 => |bo, b| bo.read_u64(b),
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: format!("expected unsigned integers, got {:?}", other),
                })
            }
        };

        Ok(bytes
            .chunks_exact(size)
            .take(count)
            .map(|chunk| read(byte_order, chunk))
            .collect())
    }

    /// ASCII value with the NUL terminator stripped.
    pub async fn read_string(&self, entry: &IfdEntry, tag: TiffTag) -> Result<String, TiffError> {
        match entry.field_type {
            Some(FieldType::Ascii) | Some(FieldType::Byte) | Some(FieldType::Undefined) => {}
            Some(other) => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: format!("expected Ascii, got {:?}", other),
                })
            }
            None => return Err(TiffError::UnknownFieldType(entry.field_type_raw)),
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}
