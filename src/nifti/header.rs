//! Fixed-layout 348-byte header parsing and representation.
//!
//! Two fixed layouts share the same 348-byte footprint: the current NIfTI-1
//! layout and the legacy Analyze 7.5 layout. Which one is decoded is the
//! caller's choice (the loader redecodes legacy when the magic rules the
//! buffer out of NIfTI); endianness is auto-detected from `sizeof_hdr`,
//! trying little-endian first.

use super::cursor::{Cursor, Endianness};
use crate::error::{Error, Result};
use std::io::SeekFrom;

/// Fixed size of the binary header in bytes. Bit-exact constraint.
pub const HEADER_SIZE: usize = 348;

/// Canonical byte offsets of the three header blocks.
///
/// Both layouts share these block boundaries; only the field packing inside
/// the image-dimension and data-history blocks differs.
mod offsets {
    pub const HEADER_KEY: u64 = 0;
    pub const IMAGE_DIMENSION: u64 = 40;
    pub const DATA_HISTORY: u64 = 148;
}

/// Filetype discriminant derived from the header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filetype {
    /// Legacy Analyze 7.5 header/image pair (no magic).
    Analyze = 0,
    /// NIfTI-1 dual-file header/image pair (`"ni1"`).
    NiftiDual = 1,
    /// NIfTI-1 single-file volume (`"n+1"`).
    NiftiSingle = 2,
}

impl Filetype {
    /// Classify the (NUL-trimmed) magic string.
    pub fn from_magic(magic: &str) -> Self {
        match magic {
            "n+1" => Self::NiftiSingle,
            "ni1" => Self::NiftiDual,
            _ => Self::Analyze,
        }
    }

    /// Numeric discriminant (0/1/2).
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Header-key block (bytes 0-39), identical in both layouts.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderKey {
    /// Must be 348 under the detected byte order.
    pub sizeof_hdr: i32,
    /// Unused 10-byte name field.
    pub data_type: String,
    /// Unused 18-byte name field.
    pub db_name: String,
    /// Historically 16384; not validated.
    pub extents: i32,
    /// Unused.
    pub session_error: i16,
    /// Historically `'r'`; not validated.
    pub regular: u8,
    /// MRI slice-ordering byte (`hkey_un0` in the legacy layout).
    pub dim_info: u8,
}

/// Image-dimension block (bytes 40-147).
///
/// Fields that exist only in the NIfTI-1 packing (intent, scaling, slice
/// timing) decode as zero for legacy headers. `glmax`/`glmin` are widened to
/// `f64` so the voxel decode can record float extrema; the file's int32
/// values are the initial contents.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDimension {
    /// `dim[0]` is the dimension count (1-7); `dim[1..=7]` are the extents,
    /// coerced to at least 1 after decode.
    pub dim: [i16; 8],
    /// First intent parameter.
    pub intent_p1: f32,
    /// Second intent parameter.
    pub intent_p2: f32,
    /// Third intent parameter.
    pub intent_p3: f32,
    /// Intent code.
    pub intent_code: i16,
    /// Element encoding code (see `DataType`).
    pub datatype: i16,
    /// Bits per voxel; must agree with `datatype`.
    pub bitpix: i16,
    /// First slice index (`dim_un0` in the legacy layout).
    pub slice_start: i16,
    /// `pixdim[0]` is qfac; `pixdim[1..=7]` are voxel sizes per dimension.
    pub pixdim: [f32; 8],
    /// Byte offset of the voxel data in a single-file volume.
    pub vox_offset: f32,
    /// Data scaling slope (decoded, never applied).
    pub scl_slope: f32,
    /// Data scaling intercept (decoded, never applied).
    pub scl_inter: f32,
    /// Last slice index.
    pub slice_end: i16,
    /// Slice timing order code.
    pub slice_code: u8,
    /// Packed spatial/temporal unit codes.
    pub xyzt_units: u8,
    /// Display calibration maximum.
    pub cal_max: f32,
    /// Display calibration minimum.
    pub cal_min: f32,
    /// Time for one slice.
    pub slice_duration: f32,
    /// Time axis shift.
    pub toffset: f32,
    /// Global maximum; overwritten with the decoded extremum.
    pub glmax: f64,
    /// Global minimum; overwritten with the decoded extremum.
    pub glmin: f64,
}

/// Data-history block of the NIfTI-1 layout (bytes 148-347).
#[derive(Debug, Clone, PartialEq)]
pub struct Nifti1History {
    /// Free-text description (80 bytes).
    pub descrip: String,
    /// Auxiliary filename (24 bytes).
    pub aux_file: String,
    /// Quaternion transform code.
    pub qform_code: i16,
    /// Affine transform code; > 0 means `srow_*` are trusted.
    pub sform_code: i16,
    /// Quaternion b parameter.
    pub quatern_b: f32,
    /// Quaternion c parameter.
    pub quatern_c: f32,
    /// Quaternion d parameter.
    pub quatern_d: f32,
    /// Quaternion x offset.
    pub qoffset_x: f32,
    /// Quaternion y offset.
    pub qoffset_y: f32,
    /// Quaternion z offset.
    pub qoffset_z: f32,
    /// First row of the voxel-to-world affine.
    pub srow_x: [f32; 4],
    /// Second row of the voxel-to-world affine.
    pub srow_y: [f32; 4],
    /// Third row of the voxel-to-world affine.
    pub srow_z: [f32; 4],
    /// Intent name (16 bytes).
    pub intent_name: String,
    /// `"n+1"` or `"ni1"` (NUL-trimmed).
    pub magic: String,
}

/// Data-history block of the legacy Analyze 7.5 layout (bytes 148-347).
///
/// Legacy orientation metadata is untrusted: volumes decoded through this
/// layout report `qform_code`/`sform_code` of 0 and carry no affine.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeHistory {
    /// Free-text description (80 bytes).
    pub descrip: String,
    /// Auxiliary filename (24 bytes).
    pub aux_file: String,
    /// Legacy orientation byte.
    pub orient: u8,
    /// Volume center in voxels (five 16-bit values, unaligned).
    pub originator: [i16; 5],
    /// Generation tag (10 bytes).
    pub generated: String,
    /// Scan number (10 bytes).
    pub scannum: String,
    /// Patient identifier (10 bytes).
    pub patient_id: String,
    /// Experiment date (10 bytes).
    pub exp_date: String,
    /// Experiment time (10 bytes).
    pub exp_time: String,
    /// View count.
    pub views: i32,
    /// Added volume count.
    pub vols_added: i32,
    /// Field start.
    pub start_field: i32,
    /// Field skip.
    pub field_skip: i32,
    /// Original data maximum.
    pub omax: i32,
    /// Original data minimum.
    pub omin: i32,
    /// Scaled data maximum.
    pub smax: i32,
    /// Scaled data minimum.
    pub smin: i32,
}

/// The layout-tagged data-history block.
#[derive(Debug, Clone, PartialEq)]
pub enum DataHistory {
    /// Current NIfTI-1 history.
    Nifti1(Nifti1History),
    /// Legacy Analyze 7.5 history.
    Analyze(AnalyzeHistory),
}

/// A fully decoded volume header.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    /// Header-key block.
    pub hk: HeaderKey,
    /// Image-dimension block.
    pub dime: ImageDimension,
    /// Layout-tagged data-history block.
    pub hist: DataHistory,
}

impl VolumeHeader {
    /// Declared dimension count (`dim[0]`).
    pub fn ndim(&self) -> usize {
        self.dime.dim[0] as usize
    }

    /// Extents of dimensions 1-7 as `usize`.
    pub fn shape7(&self) -> [usize; 7] {
        let mut shape = [1usize; 7];
        for (i, s) in shape.iter_mut().enumerate() {
            *s = self.dime.dim[i + 1] as usize;
        }
        shape
    }

    /// The magic string; empty for legacy headers.
    pub fn magic(&self) -> &str {
        match &self.hist {
            DataHistory::Nifti1(h) => &h.magic,
            DataHistory::Analyze(_) => "",
        }
    }

    /// Quaternion transform code; forced to 0 for legacy headers.
    pub fn qform_code(&self) -> i16 {
        match &self.hist {
            DataHistory::Nifti1(h) => h.qform_code,
            DataHistory::Analyze(_) => 0,
        }
    }

    /// Affine transform code; forced to 0 for legacy headers.
    pub fn sform_code(&self) -> i16 {
        match &self.hist {
            DataHistory::Nifti1(h) => h.sform_code,
            DataHistory::Analyze(_) => 0,
        }
    }

    /// The three sform rows, if this header carries a trusted affine.
    pub fn srow(&self) -> Option<[[f32; 4]; 3]> {
        match &self.hist {
            DataHistory::Nifti1(h) if h.sform_code > 0 => Some([h.srow_x, h.srow_y, h.srow_z]),
            _ => None,
        }
    }
}

/// Detect the byte order from the leading `sizeof_hdr` field.
///
/// Little-endian is probed first; a buffer that reads 348 little-endian is
/// decoded little-endian even if it would also read 348 big-endian. This
/// order is a compatibility requirement.
pub fn detect_endianness(buffer: &[u8]) -> Result<Endianness> {
    for endian in [Endianness::Little, Endianness::Big] {
        let mut probe = Cursor::new(buffer, endian);
        let sizeof_hdr = probe.read_i32().map_err(|_| {
            Error::CorruptHeader(format!(
                "buffer of {} bytes is too short for the sizeof_hdr field",
                buffer.len()
            ))
        })?;
        if sizeof_hdr == HEADER_SIZE as i32 {
            return Ok(endian);
        }
    }
    Err(Error::CorruptHeader(
        "sizeof_hdr is not 348 under either byte order".to_string(),
    ))
}

fn decode_header_key(cursor: &mut Cursor) -> Result<HeaderKey> {
    cursor.seek(SeekFrom::Start(offsets::HEADER_KEY))?;
    Ok(HeaderKey {
        sizeof_hdr: cursor.read_i32()?,
        data_type: cursor.read_string(10)?,
        db_name: cursor.read_string(18)?,
        extents: cursor.read_i32()?,
        session_error: cursor.read_i16()?,
        regular: cursor.read_u8()?,
        dim_info: cursor.read_u8()?,
    })
}

/// Validate `dim[0]` and coerce non-positive extents to 1.
fn coerce_dims(dim: &mut [i16; 8]) -> Result<()> {
    if !(1..=7).contains(&dim[0]) {
        return Err(Error::CorruptHeader(format!(
            "dim[0] must be between 1 and 7, got {}",
            dim[0]
        )));
    }
    for extent in dim.iter_mut().skip(1) {
        if *extent < 1 {
            *extent = 1;
        }
    }
    Ok(())
}

fn dim_array(values: Vec<i16>) -> [i16; 8] {
    let mut out = [0i16; 8];
    out.copy_from_slice(&values);
    out
}

fn pixdim_array(values: Vec<f32>) -> [f32; 8] {
    let mut out = [0f32; 8];
    out.copy_from_slice(&values);
    out
}

fn srow_array(values: Vec<f32>) -> [f32; 4] {
    let mut out = [0f32; 4];
    out.copy_from_slice(&values);
    out
}

fn ensure_header_fits(cursor: &Cursor) -> Result<()> {
    if cursor.len() < HEADER_SIZE {
        return Err(Error::CorruptHeader(format!(
            "buffer of {} bytes is smaller than the {}-byte header",
            cursor.len(),
            HEADER_SIZE
        )));
    }
    Ok(())
}

/// Decode the current (NIfTI-1) fixed layout.
pub fn decode_nifti1(cursor: &mut Cursor) -> Result<VolumeHeader> {
    ensure_header_fits(cursor)?;
    let hk = decode_header_key(cursor)?;

    cursor.seek(SeekFrom::Start(offsets::IMAGE_DIMENSION))?;
    let mut dim = dim_array(cursor.read_i16_vec(8)?);
    coerce_dims(&mut dim)?;
    let intent_p1 = cursor.read_f32()?;
    let intent_p2 = cursor.read_f32()?;
    let intent_p3 = cursor.read_f32()?;
    let intent_code = cursor.read_i16()?;
    let datatype = cursor.read_i16()?;
    let bitpix = cursor.read_i16()?;
    let slice_start = cursor.read_i16()?;
    let pixdim = pixdim_array(cursor.read_f32_vec(8)?);
    let vox_offset = cursor.read_f32()?;
    let scl_slope = cursor.read_f32()?;
    let scl_inter = cursor.read_f32()?;
    let slice_end = cursor.read_i16()?;
    let slice_code = cursor.read_u8()?;
    let xyzt_units = cursor.read_u8()?;
    let cal_max = cursor.read_f32()?;
    let cal_min = cursor.read_f32()?;
    let slice_duration = cursor.read_f32()?;
    let toffset = cursor.read_f32()?;
    let glmax = f64::from(cursor.read_i32()?);
    let glmin = f64::from(cursor.read_i32()?);

    cursor.seek(SeekFrom::Start(offsets::DATA_HISTORY))?;
    let hist = Nifti1History {
        descrip: cursor.read_string(80)?,
        aux_file: cursor.read_string(24)?,
        qform_code: cursor.read_i16()?,
        sform_code: cursor.read_i16()?,
        quatern_b: cursor.read_f32()?,
        quatern_c: cursor.read_f32()?,
        quatern_d: cursor.read_f32()?,
        qoffset_x: cursor.read_f32()?,
        qoffset_y: cursor.read_f32()?,
        qoffset_z: cursor.read_f32()?,
        srow_x: srow_array(cursor.read_f32_vec(4)?),
        srow_y: srow_array(cursor.read_f32_vec(4)?),
        srow_z: srow_array(cursor.read_f32_vec(4)?),
        intent_name: cursor.read_string(16)?,
        magic: cursor.read_string(4)?,
    };

    Ok(VolumeHeader {
        hk,
        dime: ImageDimension {
            dim,
            intent_p1,
            intent_p2,
            intent_p3,
            intent_code,
            datatype,
            bitpix,
            slice_start,
            pixdim,
            vox_offset,
            scl_slope,
            scl_inter,
            slice_end,
            slice_code,
            xyzt_units,
            cal_max,
            cal_min,
            slice_duration,
            toffset,
            glmax,
            glmin,
        },
        hist: DataHistory::Nifti1(hist),
    })
}

/// Decode the legacy (Analyze 7.5) fixed layout.
pub fn decode_analyze(cursor: &mut Cursor) -> Result<VolumeHeader> {
    ensure_header_fits(cursor)?;
    let hk = decode_header_key(cursor)?;

    cursor.seek(SeekFrom::Start(offsets::IMAGE_DIMENSION))?;
    let mut dim = dim_array(cursor.read_i16_vec(8)?);
    coerce_dims(&mut dim)?;
    let _unused = cursor.read_i16_vec(7)?;
    let datatype = cursor.read_i16()?;
    let bitpix = cursor.read_i16()?;
    let slice_start = cursor.read_i16()?; // dim_un0
    let pixdim = pixdim_array(cursor.read_f32_vec(8)?);
    let vox_offset = cursor.read_f32()?;
    let _funused = cursor.read_f32_vec(3)?;
    let cal_max = cursor.read_f32()?;
    let cal_min = cursor.read_f32()?;
    let _compressed = cursor.read_f32()?;
    let _verified = cursor.read_f32()?;
    let glmax = f64::from(cursor.read_i32()?);
    let glmin = f64::from(cursor.read_i32()?);

    cursor.seek(SeekFrom::Start(offsets::DATA_HISTORY))?;
    let descrip = cursor.read_string(80)?;
    let aux_file = cursor.read_string(24)?;
    let orient = cursor.read_u8()?;
    let mut originator = [0i16; 5];
    for value in &mut originator {
        *value = cursor.read_i16()?;
    }
    let generated = cursor.read_string(10)?;
    let scannum = cursor.read_string(10)?;
    let patient_id = cursor.read_string(10)?;
    let exp_date = cursor.read_string(10)?;
    let exp_time = cursor.read_string(10)?;
    let _hist_un0 = cursor.read_bytes(3)?;
    let hist = AnalyzeHistory {
        descrip,
        aux_file,
        orient,
        originator,
        generated,
        scannum,
        patient_id,
        exp_date,
        exp_time,
        views: cursor.read_i32()?,
        vols_added: cursor.read_i32()?,
        start_field: cursor.read_i32()?,
        field_skip: cursor.read_i32()?,
        omax: cursor.read_i32()?,
        omin: cursor.read_i32()?,
        smax: cursor.read_i32()?,
        smin: cursor.read_i32()?,
    };

    Ok(VolumeHeader {
        hk,
        dime: ImageDimension {
            dim,
            intent_p1: 0.0,
            intent_p2: 0.0,
            intent_p3: 0.0,
            intent_code: 0,
            datatype,
            bitpix,
            slice_start,
            pixdim,
            vox_offset,
            scl_slope: 0.0,
            scl_inter: 0.0,
            slice_end: 0,
            slice_code: 0,
            xyzt_units: 0,
            cal_max,
            cal_min,
            slice_duration: 0.0,
            toffset: 0.0,
            glmax,
            glmin,
        },
        hist: DataHistory::Analyze(hist),
    })
}
