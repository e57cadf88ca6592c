//! Decode orchestration and file-loading conveniences.
//!
//! The core entry points ([`decode`], [`decode_pair`]) operate purely on
//! in-memory buffers: header decode, filetype branch (legacy redecode or
//! extension chain), then the voxel decode. [`load`] adds the file layer on
//! top: readahead, gzip decompression (libdeflate one-shot with a streaming
//! fallback), header/image companion resolution, and memory-mapped reads for
//! uncompressed files.

use super::cursor::{Cursor, Endianness};
use super::header::{
    decode_analyze, decode_nifti1, detect_endianness, Filetype, VolumeHeader, HEADER_SIZE,
};
use super::extension::decode_extensions;
use super::image::{decode_image, DecodedVolume};
use crate::error::{Error, Result};
use flate2::bufread::MultiGzDecoder;
use libdeflater::{DecompressionError, Decompressor};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Index filters and layout flags for a decode call.
///
/// All filters are 1-based and empty by default (select everything).
///
/// # Example
/// ```ignore
/// let options = DecodeOptions::new()
///     .slice_index(vec![4, 5, 6])
///     .img_index(vec![1]);
/// let volume = neurovol::nifti::decode("scan.nii", &bytes, &options)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Selected indices along dimension 3 (slices).
    pub slice_index: Vec<usize>,
    /// Selected indices along dimension 4 (volumes).
    pub img_index: Vec<usize>,
    /// Selected indices along dimension 5.
    pub dim5_index: Vec<usize>,
    /// Selected indices along dimension 6.
    pub dim6_index: Vec<usize>,
    /// Selected indices along dimension 7.
    pub dim7_index: Vec<usize>,
    /// Decode RGB voxels from the old plane-per-slice layout.
    pub old_rgb: bool,
}

impl DecodeOptions {
    /// Options that select the whole volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select slices (dimension 3) by 1-based index.
    pub fn slice_index(mut self, indices: Vec<usize>) -> Self {
        self.slice_index = indices;
        self
    }

    /// Select volumes (dimension 4) by 1-based index.
    pub fn img_index(mut self, indices: Vec<usize>) -> Self {
        self.img_index = indices;
        self
    }

    /// Select dimension-5 indices.
    pub fn dim5_index(mut self, indices: Vec<usize>) -> Self {
        self.dim5_index = indices;
        self
    }

    /// Select dimension-6 indices.
    pub fn dim6_index(mut self, indices: Vec<usize>) -> Self {
        self.dim6_index = indices;
        self
    }

    /// Select dimension-7 indices.
    pub fn dim7_index(mut self, indices: Vec<usize>) -> Self {
        self.dim7_index = indices;
        self
    }

    /// Treat RGB volumes as the old plane-per-slice layout.
    pub fn old_rgb(mut self, old_rgb: bool) -> Self {
        self.old_rgb = old_rgb;
        self
    }

    pub(crate) fn has_filters(&self) -> bool {
        !(self.slice_index.is_empty()
            && self.img_index.is_empty()
            && self.dim5_index.is_empty()
            && self.dim6_index.is_empty()
            && self.dim7_index.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuffixKind {
    Single,
    Header,
    Image,
}

/// Classify a filename by suffix; a trailing `.gz` is noted and stripped.
fn classify_filename(filename: &str) -> Result<(SuffixKind, bool)> {
    let lower = filename.to_ascii_lowercase();
    let (stem, gz) = match lower.strip_suffix(".gz") {
        Some(stem) => (stem, true),
        None => (lower.as_str(), false),
    };
    let kind = if stem.ends_with(".nii") {
        SuffixKind::Single
    } else if stem.ends_with(".hdr") {
        SuffixKind::Header
    } else if stem.ends_with(".img") {
        SuffixKind::Image
    } else {
        return Err(Error::UnsupportedExtension(filename.to_string()));
    };
    Ok((kind, gz))
}

/// Decode a single-file (`.nii`) volume from its in-memory bytes.
///
/// The filename only selects the decode path by suffix; pass the name of a
/// gzipped file together with its already-decompressed bytes. Header/image
/// pair members are rejected here because their voxels live in a second
/// buffer; use [`decode_pair`] or [`load`] for those.
pub fn decode(filename: &str, buffer: &[u8], options: &DecodeOptions) -> Result<DecodedVolume> {
    match classify_filename(filename)? {
        (SuffixKind::Single, _) => decode_single(buffer, options),
        (SuffixKind::Header | SuffixKind::Image, _) => Err(Error::UnsupportedExtension(format!(
            "{filename}: header/image pair members carry voxels in a companion file; \
             use decode_pair or load"
        ))),
    }
}

/// Decode a header/image pair (`.hdr`/`.img`) from in-memory bytes.
///
/// `filename` may name either member. Header fields (and, for NIfTI dual
/// files, the extension chain, bounded by the header buffer's end) come from
/// `header_buffer`; voxels are read from byte 0 of `image_buffer`.
pub fn decode_pair(
    filename: &str,
    header_buffer: &[u8],
    image_buffer: &[u8],
    options: &DecodeOptions,
) -> Result<DecodedVolume> {
    match classify_filename(filename)? {
        (SuffixKind::Header | SuffixKind::Image, _) => {
            decode_pair_buffers(header_buffer, image_buffer, options)
        }
        (SuffixKind::Single, _) => Err(Error::UnsupportedExtension(format!(
            "{filename}: single-file volumes carry their own voxels; use decode"
        ))),
    }
}

fn decode_single(buffer: &[u8], options: &DecodeOptions) -> Result<DecodedVolume> {
    let endianness = detect_endianness(buffer)?;
    let mut cursor = Cursor::new(buffer, endianness);
    let mut header = decode_nifti1(&mut cursor)?;
    let filetype = Filetype::from_magic(header.magic());

    let extensions = match filetype {
        Filetype::Analyze => {
            // No recognized magic: redecode the same bytes through the
            // legacy layout. Legacy volumes carry no extension chain.
            header = decode_analyze(&mut cursor)?;
            Vec::new()
        }
        Filetype::NiftiSingle => {
            let end = header.dime.vox_offset.max(0.0) as usize;
            decode_extensions(&mut cursor, Some(end))?
        }
        Filetype::NiftiDual => decode_extensions(&mut cursor, None)?,
    };

    let image = decode_image(&mut header, filetype, &mut cursor, options)?;
    Ok(DecodedVolume {
        header,
        filetype,
        endianness,
        image,
        extensions,
    })
}

fn decode_pair_buffers(
    header_buffer: &[u8],
    image_buffer: &[u8],
    options: &DecodeOptions,
) -> Result<DecodedVolume> {
    let endianness = detect_endianness(header_buffer)?;
    let mut header_cursor = Cursor::new(header_buffer, endianness);
    let mut header = decode_nifti1(&mut header_cursor)?;
    let filetype = Filetype::from_magic(header.magic());

    let extensions = match filetype {
        Filetype::Analyze => {
            header = decode_analyze(&mut header_cursor)?;
            Vec::new()
        }
        _ => decode_extensions(&mut header_cursor, None)?,
    };

    let mut image_cursor = Cursor::new(image_buffer, endianness);
    let image = decode_image(&mut header, filetype, &mut image_cursor, options)?;
    Ok(DecodedVolume {
        header,
        filetype,
        endianness,
        image,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

/// File content held either as a read-only map or an owned (decompressed)
/// buffer; the decode core only ever sees `&[u8]`.
enum FileBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(mmap) => mmap,
            Self::Owned(bytes) => bytes,
        }
    }
}

const GZIP_BUFFER_SIZE: usize = 256 * 1024;

#[cfg(target_os = "linux")]
fn read_file_with_readahead(path: &Path) -> Result<Vec<u8>> {
    use std::os::unix::io::AsRawFd;

    let file = File::open(path)?;
    let fd = file.as_raw_fd();
    let len = file.metadata()?.len() as usize;

    // POSIX_FADV_SEQUENTIAL: the whole file is about to be read front to back.
    unsafe {
        libc::posix_fadvise(fd, 0, len as libc::off_t, libc::POSIX_FADV_SEQUENTIAL);
    }

    let mut buffer = Vec::with_capacity(len);
    let mut reader = BufReader::with_capacity(GZIP_BUFFER_SIZE, file);
    reader.read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(not(target_os = "linux"))]
fn read_file_with_readahead(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

fn estimate_gzip_uncompressed_size(compressed: &[u8]) -> usize {
    // ISIZE per RFC 1952: original size modulo 2^32, reliable for
    // single-member gzip under 4GB.
    if compressed.len() >= 4 {
        let trailer = &compressed[compressed.len() - 4..];
        u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize
    } else {
        compressed.len() * 4
    }
}

fn decompress_gzip_streaming(compressed: &[u8]) -> Result<Vec<u8>> {
    let cursor = std::io::Cursor::new(compressed);
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(GZIP_BUFFER_SIZE, cursor));
    let mut output = Vec::with_capacity(estimate_gzip_uncompressed_size(compressed));
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(format!("gzip stream decode failed: {e}")))?;
    Ok(output)
}

/// One-shot libdeflate decompression sized from the gzip trailer, falling
/// back to streaming decode for multi-member or >4GB payloads.
fn decompress_gzip_with_fallback(compressed: &[u8]) -> Result<Vec<u8>> {
    let buffer_size = estimate_gzip_uncompressed_size(compressed).max(HEADER_SIZE);
    let mut output = vec![0u8; buffer_size];
    let mut decompressor = Decompressor::new();
    match decompressor.gzip_decompress(compressed, &mut output) {
        Ok(written) => {
            output.truncate(written);
            Ok(output)
        }
        Err(DecompressionError::InsufficientSpace) => decompress_gzip_streaming(compressed),
        Err(e) => Err(Error::Decompression(e.to_string())),
    }
}

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

fn read_volume_bytes(path: &Path) -> Result<FileBytes> {
    if is_gzipped(path) {
        let compressed = read_file_with_readahead(path)?;
        Ok(FileBytes::Owned(decompress_gzip_with_fallback(&compressed)?))
    } else {
        let file = File::open(path)?;
        // SAFETY: read-only map of a file we just opened; concurrent external
        // modification can yield stale data but no undefined behavior.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FileBytes::Mapped(mmap))
    }
}

/// Find the pair companion by swapping the extension, preferring an
/// uncompressed member and falling back to `.gz`.
fn companion_path(path: &Path, extension: &str) -> Result<PathBuf> {
    let mut base = path.to_path_buf();
    if is_gzipped(&base) {
        base.set_extension("");
    }
    let plain = base.with_extension(extension);
    if plain.exists() {
        return Ok(plain);
    }
    let mut gz = plain.clone().into_os_string();
    gz.push(".gz");
    let gz = PathBuf::from(gz);
    if gz.exists() {
        return Ok(gz);
    }
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!(
            "companion file {} not found for {}",
            plain.display(),
            path.display()
        ),
    )))
}

fn filename_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load and decode a volume from disk.
///
/// Supports `.nii`, `.hdr`, and `.img` entry points, each optionally
/// gzipped; pair members are resolved to their companion automatically.
///
/// # Example
/// ```ignore
/// let volume = neurovol::nifti::load("scan.nii.gz", &DecodeOptions::new())?;
/// println!("{:?} {:?}", volume.filetype, volume.image.shape());
/// ```
#[must_use = "this function returns a decoded volume that should be used"]
pub fn load<P: AsRef<Path>>(path: P, options: &DecodeOptions) -> Result<DecodedVolume> {
    let path = path.as_ref();
    let (kind, _) = classify_filename(&filename_of(path))?;
    match kind {
        SuffixKind::Single => {
            let bytes = read_volume_bytes(path)?;
            decode_single(&bytes, options)
        }
        SuffixKind::Header => {
            let image_path = companion_path(path, "img")?;
            let header_bytes = read_volume_bytes(path)?;
            let image_bytes = read_volume_bytes(&image_path)?;
            decode_pair_buffers(&header_bytes, &image_bytes, options)
        }
        SuffixKind::Image => {
            let header_path = companion_path(path, "hdr")?;
            let header_bytes = read_volume_bytes(&header_path)?;
            let image_bytes = read_volume_bytes(path)?;
            decode_pair_buffers(&header_bytes, &image_bytes, options)
        }
    }
}

/// Load only the header of a volume file.
///
/// For an `.img` entry point the companion `.hdr` is read instead.
pub fn load_header<P: AsRef<Path>>(path: P) -> Result<(VolumeHeader, Filetype, Endianness)> {
    let path = path.as_ref();
    let (kind, _) = classify_filename(&filename_of(path))?;
    let header_path = match kind {
        SuffixKind::Image => companion_path(path, "hdr")?,
        _ => path.to_path_buf(),
    };
    let bytes = read_volume_bytes(&header_path)?;

    let endianness = detect_endianness(&bytes)?;
    let mut cursor = Cursor::new(&bytes, endianness);
    let mut header = decode_nifti1(&mut cursor)?;
    let filetype = Filetype::from_magic(header.magic());
    if filetype == Filetype::Analyze {
        header = decode_analyze(&mut cursor)?;
    }
    Ok((header, filetype, endianness))
}
