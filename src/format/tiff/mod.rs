//! TIFF plane-stack support.
//!
//! A stack stores one 2D plane per IFD, written by ImageJ, by numpy-based
//! writers (a JSON shape description), or by OME writers (an OME-XML
//! description). Classic TIFF and BigTIFF are both accepted, in either byte
//! order.
//!
//! # Key Concepts
//!
//! - **Byte order**: declared by the header (`II` little-endian, `MM`
//!   big-endian); tag values and 16-bit samples follow it.
//!
//! - **IFD chain**: opening a stack walks the chain once and records each
//!   IFD's offset. The tags of an individual plane are decoded when that plane
//!   is read.
//!
//! - **Description dialect**: the first IFD's `ImageDescription` decides how
//!   many channels, slices and timepoints the IFDs represent, and in which
//!   order they are stored.

mod description;
mod directory;
mod parser;
mod plane;
mod reader;
mod tags;
mod values;

pub use description::{dimensions_from_description, DescriptionDialect, TiffBaseInfo};
pub use directory::{read_header, read_ifd, walk_ifd_chain, ChunkLayout, PlaneDirectory};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use plane::{decompress_chunk, read_plane_into};
pub use reader::TiffVolume;
pub use tags::{Compression, FieldType, TiffTag};
pub use values::ValueReader;
