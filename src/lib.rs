//! High-fidelity Analyze/NIfTI-1 volume decoding for surgical planning.
//!
//! `neurovol` turns the raw bytes of a brain-scan file into a typed,
//! N-dimensional voxel array plus its parsed header and extension chain, and
//! can realign the result to canonical anatomical orientation using only axis
//! permutations and sign flips derived from the sform affine.
//!
//! The decode core operates purely on in-memory buffers; the [`nifti::load`]
//! convenience reads (and gunzips) files before handing them to the core.

#![warn(missing_docs)]

pub mod array;
pub mod error;
pub mod nifti;
pub mod transforms;

pub use error::{Error, Result};
