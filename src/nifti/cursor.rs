//! Sequential typed reads over an in-memory volume buffer.
//!
//! Exactly one cursor is attached to each buffer a decode call touches; no
//! other component reads file bytes directly. The endianness is fixed at
//! construction, after detection from the header's `sizeof_hdr` field.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::SeekFrom;

/// Byte order of a volume file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

impl Endianness {
    /// Returns true for little-endian.
    pub const fn is_little(self) -> bool {
        matches!(self, Self::Little)
    }
}

macro_rules! read_fns {
    ($(#[$doc:meta] $name:ident / $vec_name:ident -> $ty:ty, $size:expr, $read:ident;)*) => {
        $(
            #[$doc]
            pub fn $name(&mut self) -> Result<$ty> {
                let bytes = self.take($size)?;
                Ok(match self.endian {
                    Endianness::Little => LittleEndian::$read(bytes),
                    Endianness::Big => BigEndian::$read(bytes),
                })
            }

            /// Batch form of the scalar read; elements in stream order.
            pub fn $vec_name(&mut self, count: usize) -> Result<Vec<$ty>> {
                (0..count).map(|_| self.$name()).collect()
            }
        )*
    };
}

/// Sequential reader over one borrowed byte buffer.
#[derive(Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endianness,
}

impl<'a> Cursor<'a> {
    /// Attach a cursor to `buf` with a fixed byte order.
    pub fn new(buf: &'a [u8], endian: Endianness) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    /// Current byte offset.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left between the current offset and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// The byte order this cursor decodes with.
    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    /// Move the read offset. All three origins are supported; a target
    /// outside `0..=len` fails without moving.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<usize> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.buf.len() as i128 + delta as i128,
        };
        if target < 0 || target > self.buf.len() as i128 {
            return Err(Error::OutOfBounds {
                offset: target.max(0) as usize,
                requested: 0,
                len: self.buf.len(),
            });
        }
        self.pos = target as usize;
        Ok(self.pos)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(Error::OutOfBounds {
                offset: self.pos,
                requested: count,
                len: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Read `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count)
    }

    /// Read one unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read one signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    /// Batch form of [`Cursor::read_u8`].
    pub fn read_u8_vec(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Batch form of [`Cursor::read_i8`].
    pub fn read_i8_vec(&mut self, count: usize) -> Result<Vec<i8>> {
        Ok(self.take(count)?.iter().map(|&b| b as i8).collect())
    }

    read_fns! {
        /// Read one `i16`.
        read_i16 / read_i16_vec -> i16, 2, read_i16;
        /// Read one `u16`.
        read_u16 / read_u16_vec -> u16, 2, read_u16;
        /// Read one `i32`.
        read_i32 / read_i32_vec -> i32, 4, read_i32;
        /// Read one `u32`.
        read_u32 / read_u32_vec -> u32, 4, read_u32;
        /// Read one `i64`.
        read_i64 / read_i64_vec -> i64, 8, read_i64;
        /// Read one `u64`.
        read_u64 / read_u64_vec -> u64, 8, read_u64;
        /// Read one `f32`.
        read_f32 / read_f32_vec -> f32, 4, read_f32;
        /// Read one `f64`.
        read_f64 / read_f64_vec -> f64, 8, read_f64;
    }

    /// Read a fixed-width string field: `count` bytes, UTF-8 (lossy), with
    /// NUL padding and surrounding whitespace trimmed.
    pub fn read_string(&mut self, count: usize) -> Result<String> {
        let bytes = self.take(count)?;
        let text = String::from_utf8_lossy(bytes);
        Ok(text
            .trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string())
    }
}
