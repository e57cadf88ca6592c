//! Shared n-dimensional array helpers.
//!
//! Volumes are flat buffers with explicit shape and strides
//! (`ndarray::ArrayD`) in Fortran order, matching the x-fastest sample order
//! of the file format. Permutes and flips are stride re-views, never element
//! copies. Every helper fails fast on rank or shape mismatches.

use crate::error::{Error, Result};
use ndarray::{ArrayD, Axis, IxDyn, ShapeBuilder};

/// Reshape a flat sample stream into an F-order array.
///
/// The last declared dimension becomes the outermost axis; the first varies
/// fastest. The element count must match the shape product exactly.
pub fn reshape<T>(flat: Vec<T>, sizes: &[usize]) -> Result<ArrayD<T>> {
    let expected: usize = sizes.iter().product();
    if expected != flat.len() {
        return Err(Error::ShapeMismatch(format!(
            "cannot reshape {} elements into shape {:?} ({} elements)",
            flat.len(),
            sizes,
            expected
        )));
    }
    ArrayD::from_shape_vec(IxDyn(sizes).f(), flat)
        .map_err(|e| Error::ShapeMismatch(e.to_string()))
}

/// Rearrange axes so that output axis `i` is input axis `order[i]`.
///
/// `order` must be a permutation of `0..ndim`. The permutation is realized as
/// the accumulated sequence of adjacent-axis transposes that sorts `order`,
/// so only strides move.
pub fn permute<T>(mut array: ArrayD<T>, order: &[usize]) -> Result<ArrayD<T>> {
    let ndim = array.ndim();
    if order.len() != ndim {
        return Err(Error::ShapeMismatch(format!(
            "axis order has {} entries for a {}-dimensional array",
            order.len(),
            ndim
        )));
    }
    let mut check = order.to_vec();
    check.sort_unstable();
    if check.iter().enumerate().any(|(i, &v)| i != v) {
        return Err(Error::ShapeMismatch(format!(
            "axis order {:?} is not a permutation of 0..{}",
            order, ndim
        )));
    }

    // Bubble-sort `order`, remembering each adjacent swap; replaying the
    // swaps in reverse maps the identity arrangement onto `order`.
    let mut ord = order.to_vec();
    let mut swaps = Vec::new();
    let mut sorted = false;
    while !sorted {
        sorted = true;
        for i in 0..ndim.saturating_sub(1) {
            if ord[i] > ord[i + 1] {
                ord.swap(i, i + 1);
                swaps.push(i);
                sorted = false;
            }
        }
    }
    for &i in swaps.iter().rev() {
        array.swap_axes(i, i + 1);
    }
    Ok(array)
}

/// Transpose a rank-2 array.
pub fn transpose<T>(array: ArrayD<T>) -> Result<ArrayD<T>> {
    if array.ndim() != 2 {
        return Err(Error::ShapeMismatch(format!(
            "transpose requires a 2-dimensional array, got {} dimensions",
            array.ndim()
        )));
    }
    Ok(array.reversed_axes())
}

/// Reverse element order along the axis at nesting depth `depth`.
pub fn flip<T>(array: &mut ArrayD<T>, depth: usize) -> Result<()> {
    if depth >= array.ndim() {
        return Err(Error::ShapeMismatch(format!(
            "flip depth {} exceeds array rank {}",
            depth,
            array.ndim()
        )));
    }
    array.invert_axis(Axis(depth));
    Ok(())
}

/// Bounds-checked row-major linear index of `subs` within `sizes`.
pub fn sub2ind(sizes: &[usize], subs: &[usize]) -> Result<usize> {
    if sizes.len() != subs.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} subscripts given for {} dimensions",
            subs.len(),
            sizes.len()
        )));
    }
    let mut index = 0usize;
    for (axis, (&sub, &size)) in subs.iter().zip(sizes.iter()).enumerate() {
        if sub >= size {
            return Err(Error::ShapeMismatch(format!(
                "subscript {} out of bounds for axis {} of size {}",
                sub, axis, size
            )));
        }
        index = index * size + sub;
    }
    Ok(index)
}

/// Sorted deduplication of an index sequence.
pub fn unique(values: &[usize]) -> Vec<usize> {
    let mut out = values.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Deep structural equality, short-circuiting on reference identity.
pub fn isequal<T: PartialEq + ?Sized>(a: &T, b: &T) -> bool {
    std::ptr::eq(a, b) || a == b
}
