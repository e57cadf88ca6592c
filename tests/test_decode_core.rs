//! End-to-end tests for the decode core and the reorienter, driven by
//! handcrafted byte buffers.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use neurovol::array;
use neurovol::nifti::{decode, decode_pair, DataType, DecodeOptions, Filetype, VolumeData};
use neurovol::transforms::reorient;
use neurovol::Error;

/// Parameters for a handcrafted single-file header.
#[derive(Clone)]
struct HeaderSpec {
    dim: Vec<i16>,
    datatype: i16,
    bitpix: i16,
    pixdim: [f32; 3],
    srow: Option<[[f32; 4]; 3]>,
    magic: [u8; 4],
}

impl HeaderSpec {
    fn new(dim: &[i16], datatype: i16, bitpix: i16) -> Self {
        Self {
            dim: dim.to_vec(),
            datatype,
            bitpix,
            pixdim: [1.0, 1.0, 1.0],
            srow: None,
            magic: *b"n+1\0",
        }
    }

    fn with_srow(mut self, srow: [[f32; 4]; 3]) -> Self {
        self.srow = Some(srow);
        self
    }

    fn with_pixdim(mut self, pixdim: [f32; 3]) -> Self {
        self.pixdim = pixdim;
        self
    }

    fn with_magic(mut self, magic: &[u8; 4]) -> Self {
        self.magic = *magic;
        self
    }
}

fn write_header<E: ByteOrder>(spec: &HeaderSpec) -> Vec<u8> {
    let mut buf = vec![0u8; 352];
    E::write_i32(&mut buf[0..4], 348);
    E::write_i16(&mut buf[40..42], spec.dim.len() as i16);
    for (i, &d) in spec.dim.iter().enumerate() {
        E::write_i16(&mut buf[42 + 2 * i..44 + 2 * i], d);
    }
    E::write_i16(&mut buf[70..72], spec.datatype);
    E::write_i16(&mut buf[72..74], spec.bitpix);
    for (i, &p) in spec.pixdim.iter().enumerate() {
        E::write_f32(&mut buf[80 + 4 * i..84 + 4 * i], p);
    }
    E::write_f32(&mut buf[108..112], 352.0); // vox_offset
    if let Some(srow) = spec.srow {
        E::write_i16(&mut buf[254..256], 1); // sform_code
        for (row, base) in srow.iter().zip([280usize, 296, 312]) {
            for (i, &v) in row.iter().enumerate() {
                E::write_f32(&mut buf[base + 4 * i..base + 4 * i + 4], v);
            }
        }
    }
    buf[344..348].copy_from_slice(&spec.magic);
    buf
}

fn single_file<E: ByteOrder>(spec: &HeaderSpec, payload: &[u8]) -> Vec<u8> {
    let mut buf = write_header::<E>(spec);
    buf.extend_from_slice(payload);
    buf
}

fn uint8_cube() -> Vec<u8> {
    // 4x3x2 uint8 volume, values 0..24 in file (F) order.
    let spec = HeaderSpec::new(&[4, 3, 2], 2, 8);
    single_file::<LittleEndian>(&spec, &(0..24).collect::<Vec<u8>>())
}

#[test]
fn test_header_decodes_identically_under_both_byte_orders() {
    let spec = HeaderSpec::new(&[4, 3, 2], 512, 16).with_pixdim([0.5, 0.75, 2.0]);
    let payload_values: Vec<u16> = (0..24).map(|v| v * 11).collect();

    let mut payload_le = vec![0u8; 48];
    let mut payload_be = vec![0u8; 48];
    LittleEndian::write_u16_into(&payload_values, &mut payload_le);
    BigEndian::write_u16_into(&payload_values, &mut payload_be);

    let le = decode(
        "scan.nii",
        &single_file::<LittleEndian>(&spec, &payload_le),
        &DecodeOptions::new(),
    )
    .unwrap();
    let be = decode(
        "scan.nii",
        &single_file::<BigEndian>(&spec, &payload_be),
        &DecodeOptions::new(),
    )
    .unwrap();

    assert_eq!(le.header, be.header);
    assert_eq!(le.image, be.image);
    assert_ne!(le.endianness, be.endianness);
}

#[test]
fn test_wrong_sizeof_hdr_is_corrupt_header() {
    let mut buf = uint8_cube();
    LittleEndian::write_i32(&mut buf[0..4], 346);
    let err = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap_err();
    assert!(matches!(err, Error::CorruptHeader(_)));

    // 348 under neither order, even though bytes are plausible elsewhere.
    let mut buf = uint8_cube();
    buf[0..4].copy_from_slice(&[1, 1, 1, 1]);
    let err = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap_err();
    assert!(err.to_string().contains("sizeof_hdr"));
}

#[test]
fn test_every_supported_datatype_decodes_full_volume() {
    for code in [2i16, 4, 8, 16, 32, 64, 128, 256, 511, 512, 768, 1024, 1280, 1792] {
        let dtype = DataType::from_code(code).unwrap();
        let spec = HeaderSpec::new(&[2, 2, 2], code, dtype.bitpix());
        let payload = vec![0u8; 8 * dtype.bytes_per_voxel()];
        let volume = decode(
            "scan.nii",
            &single_file::<LittleEndian>(&spec, &payload),
            &DecodeOptions::new(),
        )
        .unwrap();

        assert_eq!(volume.image.len(), 8, "voxel count for code {code}");
        assert_eq!(volume.image.datatype(), dtype);
        // Flattened scalar sample count: x2 for complex, x3 for RGB.
        let samples = volume.image.len() * dtype.samples_per_voxel();
        assert_eq!(samples, 8 * dtype.samples_per_voxel());
    }
}

#[test]
fn test_unsupported_datatypes_fail() {
    // 1536 (float128) and 2048 (complex256) are explicitly excluded.
    for code in [1536i16, 2048, 7, 9999] {
        let spec = HeaderSpec::new(&[2, 2, 2], code, 8);
        let err = decode(
            "scan.nii",
            &single_file::<LittleEndian>(&spec, &[0u8; 64]),
            &DecodeOptions::new(),
        )
        .unwrap_err();
        match err {
            Error::UnsupportedDatatype(c) => assert_eq!(c, code),
            other => panic!("expected UnsupportedDatatype for {code}, got {other:?}"),
        }
    }
}

#[test]
fn test_invalid_index_filters() {
    // Empty payload: any attempted read would fail, so an InvalidIndex error
    // proves validation happened before any read.
    let spec = HeaderSpec::new(&[4, 3, 2], 2, 8);
    let buf = single_file::<LittleEndian>(&spec, &[]);

    let err = decode(
        "scan.nii",
        &buf,
        &DecodeOptions::new().slice_index(vec![0]),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { name: "slice_index", .. }));

    let err = decode(
        "scan.nii",
        &buf,
        &DecodeOptions::new().slice_index(vec![1, 1]),
    )
    .unwrap_err();
    assert!(err.to_string().contains("duplicate"));

    // dim[4] has size 1, so a non-empty filter must be exactly [1].
    let err = decode(
        "scan.nii",
        &buf,
        &DecodeOptions::new().img_index(vec![2]),
    )
    .unwrap_err();
    assert!(err.to_string().contains("must be exactly 1"));

    let ok = decode(
        "scan.nii",
        &uint8_cube(),
        &DecodeOptions::new().img_index(vec![1]),
    );
    assert!(ok.is_ok());
}

#[test]
fn test_selective_decode_of_outer_dimensions() {
    // 2x2x2x3 uint8 volume, values 0..24 in file order.
    let spec = HeaderSpec::new(&[2, 2, 2, 3], 2, 8);
    let buf = single_file::<LittleEndian>(&spec, &(0..24).collect::<Vec<u8>>());

    let second_vol = decode(
        "scan.nii",
        &buf,
        &DecodeOptions::new().img_index(vec![2]),
    )
    .unwrap();
    assert_eq!(second_vol.image.shape(), &[2, 2, 2]);
    assert_eq!(second_vol.header.dime.dim[4], 1);
    match &second_vol.image {
        VolumeData::Uint8(arr) => {
            assert_eq!(arr[[0, 0, 0]], 8);
            assert_eq!(arr[[1, 1, 1]], 15);
        }
        other => panic!("expected Uint8, got {other:?}"),
    }

    let slice_of_vol = decode(
        "scan.nii",
        &buf,
        &DecodeOptions::new().slice_index(vec![2]).img_index(vec![3]),
    )
    .unwrap();
    assert_eq!(slice_of_vol.image.shape(), &[2, 2]);
    match &slice_of_vol.image {
        VolumeData::Uint8(arr) => {
            // Volume 3, slice 2 starts at voxel (3-1)*4 + (2-1)... scaled by
            // the 2x2 slice: offset 20.
            assert_eq!(arr[[0, 0]], 20);
            assert_eq!(arr[[1, 1]], 23);
        }
        other => panic!("expected Uint8, got {other:?}"),
    }
    assert_eq!(slice_of_vol.header.dime.glmin, 20.0);
    assert_eq!(slice_of_vol.header.dime.glmax, 23.0);
}

#[test]
fn test_extension_marker_zero_means_empty() {
    let spec = HeaderSpec::new(&[2, 2, 1], 2, 8);
    let mut buf = write_header::<LittleEndian>(&spec);
    // Push vox_offset out so an extension region exists, leave marker 0 and
    // fill the region with section-like bytes.
    LittleEndian::write_f32(&mut buf[108..112], 384.0);
    buf.extend_from_slice(&[16, 0, 0, 0, 4, 0, 0, 0]);
    buf.extend_from_slice(&[0xAB; 24]);
    buf.extend_from_slice(&[1, 2, 3, 4]); // voxels at 384

    let volume = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap();
    assert!(volume.extensions.is_empty());
}

#[test]
fn test_extension_chain_decodes() {
    let spec = HeaderSpec::new(&[2, 2, 1], 2, 8);
    let mut buf = write_header::<LittleEndian>(&spec);
    LittleEndian::write_f32(&mut buf[108..112], 368.0); // vox_offset past one section
    buf[348] = 1; // extender marker
    let mut section = vec![0u8; 16];
    LittleEndian::write_i32(&mut section[0..4], 16);
    LittleEndian::write_i32(&mut section[4..8], 6);
    section[8..16].copy_from_slice(b"comment\0");
    buf.extend_from_slice(&section);
    buf.extend_from_slice(&[9, 8, 7, 6]); // voxels at 368

    let volume = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap();
    assert_eq!(volume.extensions.len(), 1);
    assert_eq!(volume.extensions[0].esize, 16);
    assert_eq!(volume.extensions[0].ecode, 6);
    assert_eq!(volume.extensions[0].edata, b"comment\0");
    match &volume.image {
        VolumeData::Uint8(arr) => assert_eq!(arr[[0, 0]], 9),
        other => panic!("expected Uint8, got {other:?}"),
    }
}

#[test]
fn test_corrupt_extension_esize() {
    let spec = HeaderSpec::new(&[2, 2, 1], 2, 8);
    let mut buf = write_header::<LittleEndian>(&spec);
    LittleEndian::write_f32(&mut buf[108..112], 376.0);
    buf[348] = 1;
    let mut section = vec![0u8; 16];
    LittleEndian::write_i32(&mut section[0..4], 4); // esize < 8
    buf.extend_from_slice(&section);

    let err = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap_err();
    assert!(matches!(err, Error::CorruptExtension(_)));
}

#[test]
fn test_decode_is_pure() {
    let buf = uint8_cube();
    let first = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap();
    let second = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap();
    assert!(array::isequal(&first, &second));
}

#[test]
fn test_complex_extrema_use_magnitude() {
    // Two complex voxels: 3+4i (norm 5) and 0+1i (norm 1).
    let spec = HeaderSpec::new(&[2, 1, 1], 32, 64);
    let mut payload = vec![0u8; 16];
    LittleEndian::write_f32_into(&[3.0, 4.0, 0.0, 1.0], &mut payload);
    let volume = decode(
        "scan.nii",
        &single_file::<LittleEndian>(&spec, &payload),
        &DecodeOptions::new(),
    )
    .unwrap();

    assert_eq!(volume.header.dime.glmax, 5.0);
    assert_eq!(volume.header.dime.glmin, 1.0);
    match &volume.image {
        VolumeData::Complex64(arr) => {
            assert_eq!(arr[[0]], num_complex::Complex32::new(3.0, 4.0));
            assert_eq!(arr[[1]], num_complex::Complex32::new(0.0, 1.0));
        }
        other => panic!("expected Complex64, got {other:?}"),
    }
}

#[test]
fn test_rgb_layouts_decode_to_same_triples() {
    // 2x2x1 RGB24 volume of four voxels.
    let triples: [[u8; 3]; 4] = [[1, 101, 201], [2, 102, 202], [3, 103, 203], [4, 104, 204]];
    let spec = HeaderSpec::new(&[2, 2, 1], 128, 24);

    // New layout: per-voxel interleaved channels.
    let mut interleaved = Vec::new();
    for t in &triples {
        interleaved.extend_from_slice(t);
    }
    // Old layout: per-slice channel planes (r-plane, g-plane, b-plane).
    let mut planar = Vec::new();
    for channel in 0..3 {
        for t in &triples {
            planar.push(t[channel]);
        }
    }

    let new_volume = decode(
        "scan.nii",
        &single_file::<LittleEndian>(&spec, &interleaved),
        &DecodeOptions::new(),
    )
    .unwrap();
    let old_volume = decode(
        "scan.nii",
        &single_file::<LittleEndian>(&spec, &planar),
        &DecodeOptions::new().old_rgb(true),
    )
    .unwrap();

    assert_eq!(new_volume.image, old_volume.image);
    match &new_volume.image {
        VolumeData::Rgb24(arr) => {
            assert_eq!(arr.shape(), &[2, 2]);
            assert_eq!(arr[[0, 0]], [1, 101, 201]);
            assert_eq!(arr[[1, 1]], [4, 104, 204]);
        }
        other => panic!("expected Rgb24, got {other:?}"),
    }
    assert_eq!(new_volume.header.dime.glmin, 1.0);
    assert_eq!(new_volume.header.dime.glmax, 204.0);
}

#[test]
fn test_dual_pair_and_analyze_paths() {
    // NIfTI dual: magic "ni1", voxels in a separate buffer from byte 0.
    let spec = HeaderSpec::new(&[2, 2, 1], 2, 8).with_magic(b"ni1\0");
    let header_buf = write_header::<LittleEndian>(&spec);
    let image_buf: Vec<u8> = vec![10, 20, 30, 40];
    let dual = decode_pair("scan.hdr", &header_buf, &image_buf, &DecodeOptions::new()).unwrap();
    assert_eq!(dual.filetype, Filetype::NiftiDual);
    assert_eq!(dual.filetype.code(), 1);
    assert_eq!(dual.header.dime.glmax, 40.0);

    // No recognized magic: legacy redecode, orientation codes forced to 0.
    let spec = HeaderSpec::new(&[2, 2, 1], 2, 8)
        .with_magic(&[0, 0, 0, 0])
        .with_srow([[1.0, 0.0, 0.0, 0.0]; 3]);
    let header_buf = write_header::<LittleEndian>(&spec);
    let legacy = decode_pair("scan.img", &header_buf, &image_buf, &DecodeOptions::new()).unwrap();
    assert_eq!(legacy.filetype, Filetype::Analyze);
    assert_eq!(legacy.filetype.code(), 0);
    assert_eq!(legacy.header.qform_code(), 0);
    assert_eq!(legacy.header.sform_code(), 0);
    assert!(legacy.header.srow().is_none());
    assert!(legacy.extensions.is_empty());

    // An Analyze volume passes through the reorienter untouched.
    let image_before = legacy.image.clone();
    let oriented = reorient(legacy);
    assert_eq!(oriented.flip, [false; 3]);
    assert_eq!(oriented.rot_dim, [0, 1, 2]);
    assert_eq!(oriented.volume.image, image_before);
}

#[test]
fn test_reorient_identity_sform_is_noop() {
    let spec = HeaderSpec::new(&[4, 3, 2], 2, 8).with_srow([
        [1.0, 0.0, 0.0, -90.0],
        [0.0, 1.0, 0.0, -126.0],
        [0.0, 0.0, 1.0, -72.0],
    ]);
    let buf = single_file::<LittleEndian>(&spec, &(0..24).collect::<Vec<u8>>());
    let volume = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap();
    let image_before = volume.image.clone();

    let oriented = reorient(volume);
    assert_eq!(oriented.flip, [false, false, false]);
    assert_eq!(oriented.rot_dim, [0, 1, 2]);
    assert_eq!(oriented.rotation, [[1, 0, 0], [0, 1, 0], [0, 0, 1]]);
    assert_eq!(oriented.volume.image, image_before);
}

#[test]
fn test_reorient_negative_x_flips_first_axis() {
    let spec = HeaderSpec::new(&[4, 3, 2], 2, 8).with_srow([
        [-1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ]);
    let buf = single_file::<LittleEndian>(&spec, &(0..24).collect::<Vec<u8>>());
    let volume = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap();
    let before = match &volume.image {
        VolumeData::Uint8(arr) => arr.clone(),
        other => panic!("expected Uint8, got {other:?}"),
    };

    let oriented = reorient(volume);
    assert_eq!(oriented.flip, [true, false, false]);
    assert_eq!(oriented.rot_dim, [0, 1, 2]);

    let after = match &oriented.volume.image {
        VolumeData::Uint8(arr) => arr.clone(),
        other => panic!("expected Uint8, got {other:?}"),
    };
    for x in 0..4 {
        for y in 0..3 {
            for z in 0..2 {
                assert_eq!(after[[x, y, z]], before[[3 - x, y, z]]);
            }
        }
    }
    // The srow sign was fixed up alongside the image.
    let srow = oriented.volume.header.srow().unwrap();
    assert_eq!(srow[0][0], 1.0);
}

#[test]
fn test_reorient_swapped_x_y_axes() {
    let spec = HeaderSpec::new(&[4, 3, 2], 2, 8)
        .with_pixdim([0.5, 0.75, 2.0])
        .with_srow([
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ]);
    let buf = single_file::<LittleEndian>(&spec, &(0..24).collect::<Vec<u8>>());
    let volume = decode("scan.nii", &buf, &DecodeOptions::new()).unwrap();
    let before = match &volume.image {
        VolumeData::Uint8(arr) => arr.clone(),
        other => panic!("expected Uint8, got {other:?}"),
    };

    let oriented = reorient(volume);
    assert_eq!(oriented.rot_dim, [1, 0, 2]);
    assert_eq!(oriented.rotation, [[0, 1, 0], [1, 0, 0], [0, 0, 1]]);
    assert_eq!(oriented.flip, [false, false, false]);

    // dim[1]/dim[2] swapped, pixdim follows its axes.
    assert_eq!(&oriented.volume.header.dime.dim[1..4], &[3, 4, 2]);
    assert_eq!(
        &oriented.volume.header.dime.pixdim[1..4],
        &[0.75, 0.5, 2.0]
    );

    let after = match &oriented.volume.image {
        VolumeData::Uint8(arr) => arr.clone(),
        other => panic!("expected Uint8, got {other:?}"),
    };
    assert_eq!(after.shape(), &[3, 4, 2]);
    for x in 0..4 {
        for y in 0..3 {
            for z in 0..2 {
                assert_eq!(after[[y, x, z]], before[[x, y, z]]);
            }
        }
    }
}
