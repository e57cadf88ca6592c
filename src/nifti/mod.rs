//! Analyze 7.5 / NIfTI-1 volume decoding.
//!
//! The pipeline runs leaf-first: a [`cursor::Cursor`] gives typed access to
//! the raw buffer, [`header`] decodes one of the two fixed 348-byte layouts,
//! [`extension`] walks the post-header section chain, and [`image`] decodes
//! the voxel stream. [`io`] orchestrates the stages and adds the file layer.

pub mod cursor;
pub mod extension;
pub mod header;
pub mod image;
pub mod io;

pub use cursor::{Cursor, Endianness};
pub use extension::Extension;
pub use header::{
    decode_analyze, decode_nifti1, detect_endianness, AnalyzeHistory, DataHistory, Filetype,
    HeaderKey, ImageDimension, Nifti1History, VolumeHeader, HEADER_SIZE,
};
pub use image::{DataType, DecodedVolume, VolumeData};
pub use io::{decode, decode_pair, load, load_header, DecodeOptions};
