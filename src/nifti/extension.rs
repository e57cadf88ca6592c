//! Post-header extension chain parsing.
//!
//! A 4-byte extender sits at offset 348; a non-zero first byte announces a
//! chain of `(esize, ecode, edata)` sections that runs up to `vox_offset`
//! (single-file volumes) or the end of the header buffer (dual-file).

use super::cursor::Cursor;
use crate::error::{Error, Result};
use std::io::SeekFrom;

/// Byte offset of the 4-byte extender marker.
pub const EXTENDER_OFFSET: usize = 348;

/// One self-describing extension section.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    /// Total section size including the 8-byte preamble.
    pub esize: i32,
    /// Vendor/application code identifying the payload format.
    pub ecode: i32,
    /// Raw payload (`esize - 8` bytes), uninterpreted.
    pub edata: Vec<u8>,
}

/// Decode the extension chain.
///
/// `vox_offset` bounds the extension region for single-file volumes; pass
/// `None` to bound it by the end of the buffer. Returns an empty list when
/// the region has no room for sections or the extender's first byte is zero.
pub fn decode_extensions(cursor: &mut Cursor, vox_offset: Option<usize>) -> Result<Vec<Extension>> {
    let end = vox_offset.unwrap_or(cursor.len()).min(cursor.len());
    if end <= EXTENDER_OFFSET + 4 {
        return Ok(Vec::new());
    }

    cursor.seek(SeekFrom::Start(EXTENDER_OFFSET as u64))?;
    let extender = cursor.read_u8_vec(4)?;
    if extender[0] == 0 {
        return Ok(Vec::new());
    }

    let mut sections = Vec::new();
    while cursor.tell() < end {
        if end - cursor.tell() < 8 {
            return Err(Error::CorruptExtension(format!(
                "{} trailing bytes cannot hold a section preamble",
                end - cursor.tell()
            )));
        }
        let esize = cursor.read_i32()?;
        let ecode = cursor.read_i32()?;
        if esize < 8 {
            return Err(Error::CorruptExtension(format!(
                "esize {esize} is smaller than the 8-byte section preamble"
            )));
        }
        let data_len = esize as usize - 8;
        if cursor.tell() + data_len > end {
            return Err(Error::CorruptExtension(format!(
                "section of {esize} bytes overruns the extension region ending at byte {end}"
            )));
        }
        let edata = cursor.read_bytes(data_len)?.to_vec();
        sections.push(Extension {
            esize,
            ecode,
            edata,
        });
    }
    Ok(sections)
}
