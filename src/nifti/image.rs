//! Voxel array decoding and the typed volume representation.
//!
//! The sample stream is decoded either in one sequential pass (no index
//! filters, trivial dimensions 4-7) or slice-by-slice with per-slice seeks
//! over the selected indices of dimensions 3-7. Volumes are F-order
//! `ndarray` arrays: a flat buffer with explicit shape and strides, first
//! axis fastest, matching the on-disk sample order.

use super::cursor::{Cursor, Endianness};
use super::extension::Extension;
use super::header::{Filetype, ImageDimension, VolumeHeader};
use super::io::DecodeOptions;
use crate::array;
use crate::error::{Error, Result};
use ndarray::{ArrayD, Axis};
use num_complex::{Complex, Complex32, Complex64};
use std::cmp::Ordering;
use std::io::SeekFrom;

/// Element encoding selected by the header's numeric datatype code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Code 2: unsigned 8-bit integer.
    Uint8,
    /// Code 4: signed 16-bit integer.
    Int16,
    /// Code 8: signed 32-bit integer.
    Int32,
    /// Code 16: 32-bit float.
    Float32,
    /// Code 32: complex, two 32-bit floats per voxel.
    Complex64,
    /// Code 64: 64-bit float.
    Float64,
    /// Code 128: RGB, three 8-bit channels per voxel.
    Rgb24,
    /// Code 256: signed 8-bit integer.
    Int8,
    /// Code 511: RGB, three 32-bit float channels per voxel.
    Rgb96,
    /// Code 512: unsigned 16-bit integer.
    Uint16,
    /// Code 768: unsigned 32-bit integer.
    Uint32,
    /// Code 1024: signed 64-bit integer.
    Int64,
    /// Code 1280: unsigned 64-bit integer.
    Uint64,
    /// Code 1792: complex, two 64-bit floats per voxel.
    Complex128,
}

impl DataType {
    /// Map a header datatype code to its element encoding.
    ///
    /// The 128-bit float (1536) and 256-bit complex (2048) codes exist in
    /// the format but are explicitly unsupported, like every unknown code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::Uint8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            32 => Ok(Self::Complex64),
            64 => Ok(Self::Float64),
            128 => Ok(Self::Rgb24),
            256 => Ok(Self::Int8),
            511 => Ok(Self::Rgb96),
            512 => Ok(Self::Uint16),
            768 => Ok(Self::Uint32),
            1024 => Ok(Self::Int64),
            1280 => Ok(Self::Uint64),
            1792 => Ok(Self::Complex128),
            other => Err(Error::UnsupportedDatatype(other)),
        }
    }

    /// The header datatype code.
    pub const fn code(self) -> i16 {
        match self {
            Self::Uint8 => 2,
            Self::Int16 => 4,
            Self::Int32 => 8,
            Self::Float32 => 16,
            Self::Complex64 => 32,
            Self::Float64 => 64,
            Self::Rgb24 => 128,
            Self::Int8 => 256,
            Self::Rgb96 => 511,
            Self::Uint16 => 512,
            Self::Uint32 => 768,
            Self::Int64 => 1024,
            Self::Uint64 => 1280,
            Self::Complex128 => 1792,
        }
    }

    /// Bits per voxel, across all samples.
    pub const fn bitpix(self) -> i16 {
        match self {
            Self::Uint8 | Self::Int8 => 8,
            Self::Int16 | Self::Uint16 => 16,
            Self::Rgb24 => 24,
            Self::Int32 | Self::Uint32 | Self::Float32 => 32,
            Self::Complex64 | Self::Float64 | Self::Int64 | Self::Uint64 => 64,
            Self::Rgb96 => 96,
            Self::Complex128 => 128,
        }
    }

    /// Bytes per voxel, across all samples.
    pub const fn bytes_per_voxel(self) -> usize {
        (self.bitpix() / 8) as usize
    }

    /// Scalar samples per voxel (2 for complex, 3 for RGB).
    pub const fn samples_per_voxel(self) -> usize {
        match self {
            Self::Complex64 | Self::Complex128 => 2,
            Self::Rgb24 | Self::Rgb96 => 3,
            _ => 1,
        }
    }
}

macro_rules! each_volume {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            VolumeData::Uint8($arr) => $body,
            VolumeData::Int8($arr) => $body,
            VolumeData::Int16($arr) => $body,
            VolumeData::Uint16($arr) => $body,
            VolumeData::Int32($arr) => $body,
            VolumeData::Uint32($arr) => $body,
            VolumeData::Int64($arr) => $body,
            VolumeData::Uint64($arr) => $body,
            VolumeData::Float32($arr) => $body,
            VolumeData::Float64($arr) => $body,
            VolumeData::Complex64($arr) => $body,
            VolumeData::Complex128($arr) => $body,
            VolumeData::Rgb24($arr) => $body,
            VolumeData::Rgb96($arr) => $body,
        }
    };
}

macro_rules! map_volume {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            VolumeData::Uint8($arr) => VolumeData::Uint8($body),
            VolumeData::Int8($arr) => VolumeData::Int8($body),
            VolumeData::Int16($arr) => VolumeData::Int16($body),
            VolumeData::Uint16($arr) => VolumeData::Uint16($body),
            VolumeData::Int32($arr) => VolumeData::Int32($body),
            VolumeData::Uint32($arr) => VolumeData::Uint32($body),
            VolumeData::Int64($arr) => VolumeData::Int64($body),
            VolumeData::Uint64($arr) => VolumeData::Uint64($body),
            VolumeData::Float32($arr) => VolumeData::Float32($body),
            VolumeData::Float64($arr) => VolumeData::Float64($body),
            VolumeData::Complex64($arr) => VolumeData::Complex64($body),
            VolumeData::Complex128($arr) => VolumeData::Complex128($body),
            VolumeData::Rgb24($arr) => VolumeData::Rgb24($body),
            VolumeData::Rgb96($arr) => VolumeData::Rgb96($body),
        }
    };
}

/// The decoded voxel array, typed by element encoding.
///
/// RGB voxels are per-element channel triples, so the array shape always
/// matches the (selected) volume dimensions regardless of element kind.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum VolumeData {
    Uint8(ArrayD<u8>),
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Uint16(ArrayD<u16>),
    Int32(ArrayD<i32>),
    Uint32(ArrayD<u32>),
    Int64(ArrayD<i64>),
    Uint64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Complex64(ArrayD<Complex32>),
    Complex128(ArrayD<Complex64>),
    Rgb24(ArrayD<[u8; 3]>),
    Rgb96(ArrayD<[f32; 3]>),
}

impl VolumeData {
    /// Element encoding of this volume.
    pub fn datatype(&self) -> DataType {
        match self {
            Self::Uint8(_) => DataType::Uint8,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Uint16(_) => DataType::Uint16,
            Self::Int32(_) => DataType::Int32,
            Self::Uint32(_) => DataType::Uint32,
            Self::Int64(_) => DataType::Int64,
            Self::Uint64(_) => DataType::Uint64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Complex64(_) => DataType::Complex64,
            Self::Complex128(_) => DataType::Complex128,
            Self::Rgb24(_) => DataType::Rgb24,
            Self::Rgb96(_) => DataType::Rgb96,
        }
    }

    /// Array shape (selected extents, trailing singletons collapsed).
    pub fn shape(&self) -> &[usize] {
        each_volume!(self, arr => arr.shape())
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        each_volume!(self, arr => arr.ndim())
    }

    /// Number of voxels (elements, not scalar samples).
    pub fn len(&self) -> usize {
        each_volume!(self, arr => arr.len())
    }

    /// Returns true if the volume holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reverse element order along `axis` (stride re-view, no copy).
    pub(crate) fn flip_axis(&mut self, axis: usize) {
        each_volume!(self, arr => arr.invert_axis(Axis(axis)));
    }

    /// Exchange two axes (stride re-view, no copy).
    pub(crate) fn swap_axes(&mut self, a: usize, b: usize) {
        each_volume!(self, arr => arr.swap_axes(a, b));
    }

    /// Append trailing singleton axes until the rank is at least `rank`.
    pub(crate) fn into_padded(self, rank: usize) -> Self {
        map_volume!(self, arr => {
            let mut a = arr;
            while a.ndim() < rank {
                let n = a.ndim();
                a = a.insert_axis(Axis(n));
            }
            a
        })
    }

    /// Drop trailing singleton axes (never below rank 1).
    pub(crate) fn into_collapsed(self) -> Self {
        map_volume!(self, arr => {
            let mut a = arr;
            while a.ndim() > 1 && a.shape()[a.ndim() - 1] == 1 {
                let n = a.ndim();
                a.index_axis_inplace(Axis(n - 1), 0);
            }
            a
        })
    }
}

/// Everything a decode call produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVolume {
    /// The decoded header, with `dim[3..=7]` and `glmax`/`glmin` rewritten
    /// to reflect the decoded image.
    pub header: VolumeHeader,
    /// Filetype discriminant (Analyze / dual-file / single-file).
    pub filetype: Filetype,
    /// Byte order the file was decoded with.
    pub endianness: Endianness,
    /// The voxel array.
    pub image: VolumeData,
    /// Extension sections (empty for legacy volumes).
    pub extensions: Vec<Extension>,
}

// ---------------------------------------------------------------------------
// Running min/max
// ---------------------------------------------------------------------------

/// Compare complex samples by Euclidean magnitude, phase angle breaking ties.
///
/// Kept separate from the scalar comparison so it can be tested on its own.
pub(crate) fn complex_cmp(a: Complex<f64>, b: Complex<f64>) -> Ordering {
    match a.norm().partial_cmp(&b.norm()) {
        Some(Ordering::Equal) | None => a.arg().partial_cmp(&b.arg()).unwrap_or(Ordering::Equal),
        Some(order) => order,
    }
}

#[derive(Debug)]
struct ScalarRange {
    min: f64,
    max: f64,
}

impl ScalarRange {
    fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn update(&mut self, value: f64) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    fn store(&self, dime: &mut ImageDimension) {
        if self.min <= self.max {
            dime.glmin = self.min;
            dime.glmax = self.max;
        }
    }
}

#[derive(Debug)]
struct ComplexRange {
    min: Option<Complex<f64>>,
    max: Option<Complex<f64>>,
}

impl ComplexRange {
    fn new() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    fn update(&mut self, value: Complex<f64>) {
        match self.min {
            Some(min) if complex_cmp(value, min) != Ordering::Less => {}
            _ => self.min = Some(value),
        }
        match self.max {
            Some(max) if complex_cmp(value, max) != Ordering::Greater => {}
            _ => self.max = Some(value),
        }
    }

    fn store(&self, dime: &mut ImageDimension) {
        // The int32 header fields cannot hold a complex value; the stored
        // extrema are the moduli of the winning samples.
        if let (Some(min), Some(max)) = (self.min, self.max) {
            dime.glmin = min.norm();
            dime.glmax = max.norm();
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Resolve one 1-based index filter against a dimension extent.
///
/// An empty filter selects every index. Validation happens before any byte
/// of voxel data is read.
fn validate_filter(name: &'static str, filter: &[usize], extent: usize) -> Result<Vec<usize>> {
    if filter.is_empty() {
        return Ok((1..=extent).collect());
    }
    if extent == 1 {
        if filter != [1] {
            return Err(Error::InvalidIndex {
                name,
                reason: "must be exactly 1 because the dimension has size 1".to_string(),
            });
        }
        return Ok(vec![1]);
    }
    if array::unique(filter).len() != filter.len() {
        return Err(Error::InvalidIndex {
            name,
            reason: format!("duplicate values are not allowed (valid range is 1..={extent})"),
        });
    }
    for &value in filter {
        if value < 1 || value > extent {
            return Err(Error::InvalidIndex {
                name,
                reason: format!("value {value} is outside the valid range 1..={extent}"),
            });
        }
    }
    Ok(filter.to_vec())
}

struct ReadPlan {
    /// Byte offset of the first voxel in the buffer.
    start: usize,
    /// Declared extents of dimensions 1-7.
    declared: [usize; 7],
    /// Selected 1-based indices per outer dimension.
    slices: Vec<usize>,
    vols: Vec<usize>,
    dim5: Vec<usize>,
    dim6: Vec<usize>,
    dim7: Vec<usize>,
    /// Single sequential pass over the whole stream.
    fast: bool,
    bytes_per_voxel: usize,
}

impl ReadPlan {
    fn slice_len(&self) -> usize {
        self.declared[0] * self.declared[1]
    }

    fn selected_shape(&self) -> [usize; 7] {
        [
            self.declared[0],
            self.declared[1],
            self.slices.len(),
            self.vols.len(),
            self.dim5.len(),
            self.dim6.len(),
            self.dim7.len(),
        ]
    }

    fn total_voxels(&self) -> usize {
        self.selected_shape().iter().product()
    }

    /// Row-major linear voxel offset of a selected slice over the declared
    /// shape; `(x, y)` vary fastest in the file, so the slice offset scales
    /// by one slice worth of voxels.
    fn slice_offset(&self, i7: usize, i6: usize, i5: usize, vol: usize, slice: usize) -> Result<usize> {
        let sizes = [
            self.declared[6],
            self.declared[5],
            self.declared[4],
            self.declared[3],
            self.declared[2],
        ];
        let subs = [i7 - 1, i6 - 1, i5 - 1, vol - 1, slice - 1];
        Ok(array::sub2ind(&sizes, &subs)? * self.slice_len())
    }
}

/// Decode the sample stream voxel-by-voxel with `read_voxel`, feeding every
/// decoded voxel to `observe` for min/max tracking.
fn read_stream<T>(
    cursor: &mut Cursor,
    plan: &ReadPlan,
    mut read_voxel: impl FnMut(&mut Cursor) -> Result<T>,
    mut observe: impl FnMut(&T),
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(plan.total_voxels());
    if plan.fast {
        cursor.seek(SeekFrom::Start(plan.start as u64))?;
        for _ in 0..plan.total_voxels() {
            let value = read_voxel(cursor)?;
            observe(&value);
            out.push(value);
        }
        return Ok(out);
    }

    let slice_len = plan.slice_len();
    for &i7 in &plan.dim7 {
        for &i6 in &plan.dim6 {
            for &i5 in &plan.dim5 {
                for &vol in &plan.vols {
                    for &slice in &plan.slices {
                        let offset = plan.slice_offset(i7, i6, i5, vol, slice)?;
                        let byte = plan.start + offset * plan.bytes_per_voxel;
                        cursor.seek(SeekFrom::Start(byte as u64))?;
                        for _ in 0..slice_len {
                            let value = read_voxel(cursor)?;
                            observe(&value);
                            out.push(value);
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Decode an old-layout (Analyze 6.0) RGB stream: within each slice the
/// samples are three full channel planes, not per-voxel triples.
fn read_rgb_planar(
    cursor: &mut Cursor,
    plan: &ReadPlan,
    mut observe: impl FnMut(u8),
) -> Result<Vec<[u8; 3]>> {
    let slice_len = plan.slice_len();
    let mut out = Vec::with_capacity(plan.total_voxels());

    let mut read_slice = |cursor: &mut Cursor, out: &mut Vec<[u8; 3]>| -> Result<()> {
        let r = cursor.read_u8_vec(slice_len)?;
        let g = cursor.read_u8_vec(slice_len)?;
        let b = cursor.read_u8_vec(slice_len)?;
        for i in 0..slice_len {
            let voxel = [r[i], g[i], b[i]];
            for channel in voxel {
                observe(channel);
            }
            out.push(voxel);
        }
        Ok(())
    };

    if plan.fast {
        cursor.seek(SeekFrom::Start(plan.start as u64))?;
        let slice_count = plan.total_voxels() / slice_len;
        for _ in 0..slice_count {
            read_slice(cursor, &mut out)?;
        }
        return Ok(out);
    }

    for &i7 in &plan.dim7 {
        for &i6 in &plan.dim6 {
            for &i5 in &plan.dim5 {
                for &vol in &plan.vols {
                    for &slice in &plan.slices {
                        let offset = plan.slice_offset(i7, i6, i5, vol, slice)?;
                        let byte = plan.start + offset * plan.bytes_per_voxel;
                        cursor.seek(SeekFrom::Start(byte as u64))?;
                        read_slice(cursor, &mut out)?;
                    }
                }
            }
        }
    }
    Ok(out)
}

fn finish<T>(flat: Vec<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    array::reshape(flat, shape)
}

macro_rules! scalar_stream {
    ($cursor:expr, $plan:expr, $dime:expr, $reader:ident, $ty:ty) => {{
        let mut range = ScalarRange::new();
        let flat = read_stream($cursor, $plan, |c| c.$reader(), |v: &$ty| {
            range.update(*v as f64)
        })?;
        range.store($dime);
        flat
    }};
}

/// Decode the voxel array described by `header` through `cursor`.
///
/// `cursor` must be attached to the buffer that carries the voxel data: the
/// single `.nii` buffer, or the image member of a header/image pair. Rewrites
/// `header.dime.dim[3..=7]` to the selected extents and `glmax`/`glmin` to
/// the observed extrema.
pub(crate) fn decode_image(
    header: &mut VolumeHeader,
    filetype: Filetype,
    cursor: &mut Cursor,
    options: &DecodeOptions,
) -> Result<VolumeData> {
    let dtype = DataType::from_code(header.dime.datatype)?;
    if header.dime.bitpix != dtype.bitpix() {
        return Err(Error::CorruptHeader(format!(
            "bitpix {} does not match datatype code {} (expected {})",
            header.dime.bitpix,
            dtype.code(),
            dtype.bitpix()
        )));
    }

    let declared = header.shape7();
    let slices = validate_filter("slice_index", &options.slice_index, declared[2])?;
    let vols = validate_filter("img_index", &options.img_index, declared[3])?;
    let dim5 = validate_filter("dim5_index", &options.dim5_index, declared[4])?;
    let dim6 = validate_filter("dim6_index", &options.dim6_index, declared[5])?;
    let dim7 = validate_filter("dim7_index", &options.dim7_index, declared[6])?;

    // Voxel data starts at byte 0 for Analyze and dual-file volumes, at
    // vox_offset inside a single-file volume.
    let start = match filetype {
        Filetype::NiftiSingle => {
            let vox_offset = header.dime.vox_offset;
            if !vox_offset.is_finite() || vox_offset < 0.0 {
                return Err(Error::CorruptHeader(format!(
                    "vox_offset must be a non-negative finite value, got {vox_offset}"
                )));
            }
            vox_offset as usize
        }
        Filetype::Analyze | Filetype::NiftiDual => 0,
    };

    let fast = !options.has_filters() && declared[3..].iter().all(|&d| d == 1);
    let plan = ReadPlan {
        start,
        declared,
        slices,
        vols,
        dim5,
        dim6,
        dim7,
        fast,
        bytes_per_voxel: dtype.bytes_per_voxel(),
    };
    let shape = plan.selected_shape();
    let dime = &mut header.dime;

    let image = match dtype {
        DataType::Uint8 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_u8, u8);
            VolumeData::Uint8(finish(flat, &shape)?)
        }
        DataType::Int8 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_i8, i8);
            VolumeData::Int8(finish(flat, &shape)?)
        }
        DataType::Int16 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_i16, i16);
            VolumeData::Int16(finish(flat, &shape)?)
        }
        DataType::Uint16 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_u16, u16);
            VolumeData::Uint16(finish(flat, &shape)?)
        }
        DataType::Int32 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_i32, i32);
            VolumeData::Int32(finish(flat, &shape)?)
        }
        DataType::Uint32 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_u32, u32);
            VolumeData::Uint32(finish(flat, &shape)?)
        }
        DataType::Int64 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_i64, i64);
            VolumeData::Int64(finish(flat, &shape)?)
        }
        DataType::Uint64 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_u64, u64);
            VolumeData::Uint64(finish(flat, &shape)?)
        }
        DataType::Float32 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_f32, f32);
            VolumeData::Float32(finish(flat, &shape)?)
        }
        DataType::Float64 => {
            let flat = scalar_stream!(cursor, &plan, dime, read_f64, f64);
            VolumeData::Float64(finish(flat, &shape)?)
        }
        DataType::Complex64 => {
            let mut range = ComplexRange::new();
            let flat = read_stream(
                cursor,
                &plan,
                |c| {
                    let re = c.read_f32()?;
                    let im = c.read_f32()?;
                    Ok(Complex32::new(re, im))
                },
                |v: &Complex32| range.update(Complex::new(f64::from(v.re), f64::from(v.im))),
            )?;
            range.store(dime);
            VolumeData::Complex64(finish(flat, &shape)?)
        }
        DataType::Complex128 => {
            let mut range = ComplexRange::new();
            let flat = read_stream(
                cursor,
                &plan,
                |c| {
                    let re = c.read_f64()?;
                    let im = c.read_f64()?;
                    Ok(Complex64::new(re, im))
                },
                |v: &Complex64| range.update(*v),
            )?;
            range.store(dime);
            VolumeData::Complex128(finish(flat, &shape)?)
        }
        DataType::Rgb24 => {
            let mut range = ScalarRange::new();
            let flat = if options.old_rgb {
                read_rgb_planar(cursor, &plan, |channel| range.update(f64::from(channel)))?
            } else {
                read_stream(
                    cursor,
                    &plan,
                    |c| {
                        let bytes = c.read_bytes(3)?;
                        Ok([bytes[0], bytes[1], bytes[2]])
                    },
                    |v: &[u8; 3]| {
                        for &channel in v {
                            range.update(f64::from(channel));
                        }
                    },
                )?
            };
            range.store(dime);
            VolumeData::Rgb24(finish(flat, &shape)?)
        }
        DataType::Rgb96 => {
            let mut range = ScalarRange::new();
            let flat = read_stream(
                cursor,
                &plan,
                |c| Ok([c.read_f32()?, c.read_f32()?, c.read_f32()?]),
                |v: &[f32; 3]| {
                    for &channel in v {
                        range.update(f64::from(channel));
                    }
                },
            )?;
            range.store(dime);
            VolumeData::Rgb96(finish(flat, &shape)?)
        }
    };

    // The header now describes the selected sub-volume.
    dime.dim[3] = shape[2] as i16;
    dime.dim[4] = shape[3] as i16;
    dime.dim[5] = shape[4] as i16;
    dime.dim[6] = shape[5] as i16;
    dime.dim[7] = shape[6] as i16;

    Ok(image.into_collapsed())
}
