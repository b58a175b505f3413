//! Format parsers for microscopy volume files.
//!
//! Each supported container gets its own module with a structure layer
//! (headers, directories, codecs) and a reader implementing
//! [`crate::loader::PlaneSource`]:
//!
//! - **TIFF**: one plane per IFD, dimensions from an ImageJ, shape-array or
//!   OME-XML description
//! - **CZI**: sub-blocks addressed by dimension coordinates
//!
//! Use [`FormatRegistry`] to pick a format from a file extension and
//! [`detect::detect_format`] to confirm it from the file's leading bytes.

pub mod czi;
pub mod detect;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, FormatRegistry, VolumeFormat};
