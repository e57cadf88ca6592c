//! Anatomical reorientation by axis permutation and sign flips.
//!
//! The sform rows of a decoded volume are assumed to encode an axis-aligned
//! affine: exactly one dominant-magnitude entry per row. Normalization to
//! canonical display orientation (array indices increasing toward
//! right/anterior/superior) then needs only axis swaps and reversals, both
//! realized as stride re-views; no voxel is resampled. General rotation
//! matrices are out of contract: the first maximal-magnitude column wins.

use crate::nifti::header::DataHistory;
use crate::nifti::image::DecodedVolume;

/// A reoriented volume plus the transform that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedVolume {
    /// The volume with its image, `dim`, `pixdim` and `srow_*` rewritten.
    pub volume: DecodedVolume,
    /// Which display axes were reversed.
    pub flip: [bool; 3],
    /// `rot_dim[i]` is the original axis now at display position `i`.
    pub rot_dim: [usize; 3],
    /// The same permutation as a 3x3 matrix: `rotation[i][rot_dim[i]] == 1`.
    pub rotation: [[i32; 3]; 3],
}

impl OrientedVolume {
    fn identity(volume: DecodedVolume) -> Self {
        Self {
            volume,
            flip: [false; 3],
            rot_dim: [0, 1, 2],
            rotation: [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
        }
    }
}

/// First index of the largest-magnitude spatial entry of an sform row.
fn argmax_abs(row: &[f32; 4]) -> usize {
    let mut best = 0;
    for i in 1..3 {
        if row[i].abs() > row[best].abs() {
            best = i;
        }
    }
    best
}

/// Realign a decoded volume to canonical display orientation.
///
/// Caller-invoked only, never automatic. Volumes without a trusted sform
/// (legacy Analyze, or `sform_code <= 0`) pass through untouched with the
/// identity transform.
pub fn reorient(volume: DecodedVolume) -> OrientedVolume {
    let Some(mut srow) = volume.header.srow() else {
        return OrientedVolume::identity(volume);
    };

    let DecodedVolume {
        mut header,
        filetype,
        endianness,
        image,
        extensions,
    } = volume;
    // Collapsed trailing singletons come back so all three spatial axes are
    // addressable; they are collapsed again on the way out.
    let mut image = image.into_padded(3);
    let mut rot_dim = [0usize, 1, 2];
    let mut flip = [false; 3];

    // Step 1: move the dominant axis of srow_x to position 0, then fix its
    // sign.
    let xmax = argmax_abs(&srow[0]);
    if xmax != 0 {
        image.swap_axes(0, xmax);
        for row in srow.iter_mut() {
            row.swap(0, xmax);
        }
        header.dime.dim.swap(1, xmax + 1);
        rot_dim.swap(0, xmax);
    }
    if srow[0][0] < 0.0 {
        image.flip_axis(0);
        flip[0] = true;
        for row in srow.iter_mut() {
            row[0] = -row[0];
        }
    }

    // Step 2: settle axis 1 from srow_y. zmax is noted before this step
    // mutates anything; it decides whether a z-dominant srow_y still means a
    // sign fix on axis 1 rather than a swap.
    let ymax = argmax_abs(&srow[1]);
    let zmax_before = argmax_abs(&srow[2]);
    if ymax == 1 || (ymax == 2 && zmax_before == 2) {
        if srow[1][ymax] < 0.0 {
            image.flip_axis(1);
            flip[1] = true;
            for row in srow.iter_mut() {
                row[ymax] = -row[ymax];
            }
        }
    } else if ymax == 2 {
        image.swap_axes(1, 2);
        for row in srow.iter_mut() {
            row.swap(1, 2);
        }
        header.dime.dim.swap(2, 3);
        rot_dim.swap(1, 2);
        if srow[1][1] < 0.0 {
            image.flip_axis(1);
            flip[1] = true;
            for row in srow.iter_mut() {
                row[1] = -row[1];
            }
        }
    }

    // Step 3: fix the sign of axis 2 from the current srow_z.
    let zmax = argmax_abs(&srow[2]);
    if zmax == 2 && srow[2][2] < 0.0 {
        image.flip_axis(2);
        flip[2] = true;
        for row in srow.iter_mut() {
            row[2] = -row[2];
        }
    }

    // Step 4: voxel sizes travel with their axes.
    let pixdim = header.dime.pixdim;
    for (i, &src) in rot_dim.iter().enumerate() {
        header.dime.pixdim[1 + i] = pixdim[1 + src];
    }

    if let DataHistory::Nifti1(hist) = &mut header.hist {
        hist.srow_x = srow[0];
        hist.srow_y = srow[1];
        hist.srow_z = srow[2];
    }

    let mut rotation = [[0i32; 3]; 3];
    for (i, &src) in rot_dim.iter().enumerate() {
        rotation[i][src] = 1;
    }

    OrientedVolume {
        volume: DecodedVolume {
            header,
            filetype,
            endianness,
            image: image.into_collapsed(),
            extensions,
        },
        flip,
        rot_dim,
        rotation,
    }
}
