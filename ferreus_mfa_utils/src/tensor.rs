/////////////////////////////////////////////////////////////////////////////////////////////
//
// Index arithmetic and axis unfolding for tensor-product arrays stored first-dimension-fastest.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! A tensor-product array of shape `[n_0, ..., n_{d-1}]` with `c` channels is
//! stored as a `(n_0 * ... * n_{d-1}, c)` matrix whose row index advances
//! fastest along dimension 0.
//!
//! Separable fitting works one axis at a time: [`unfold`] gathers every curve
//! running along `axis` into a column of a `(n_axis, curves * c)` matrix, the
//! caller transforms those columns (changing `n_axis`), and [`fold`] scatters
//! the result back into row storage with the new shape.

use faer::{Mat, MatRef};
use itertools::Itertools;

/// Row strides for a first-dimension-fastest layout.
///
/// # Examples
///
/// ```
/// use ferreus_mfa_utils::strides;
///
/// assert_eq!(strides(&[4, 3, 2]), vec![1, 4, 12]);
/// ```
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(shape.len());
    let mut acc = 1;
    for n in shape {
        out.push(acc);
        acc *= n;
    }
    out
}

/// Converts a multi-index into its flat row index.
#[inline(always)]
pub fn ravel(index: &[usize], shape: &[usize]) -> usize {
    let mut flat = 0;
    let mut stride = 1;
    for (i, n) in index.iter().zip(shape.iter()) {
        flat += i * stride;
        stride *= n;
    }
    flat
}

/// Converts a flat row index into its multi-index.
#[inline(always)]
pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .map(|n| {
            let i = flat % n;
            flat /= n;
            i
        })
        .collect()
}

/// Iterates over every multi-index of `shape` in storage order (dimension 0 fastest).
///
/// # Examples
///
/// ```
/// use ferreus_mfa_utils::tensor_indices;
///
/// let all: Vec<Vec<usize>> = tensor_indices(&[2, 2]).collect();
/// assert_eq!(all, vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]);
/// ```
pub fn tensor_indices(shape: &[usize]) -> impl Iterator<Item = Vec<usize>> {
    let empty = shape.is_empty() || shape.contains(&0);
    let ranges: Vec<std::ops::Range<usize>> = if empty {
        vec![0..0]
    } else {
        shape.iter().rev().map(|n| 0..*n).collect()
    };

    ranges.into_iter().multi_cartesian_product().map(|mut idx| {
        idx.reverse();
        idx
    })
}

/// Unfolds row storage so that each column holds one channel of one curve along `axis`.
///
/// Column `curve * channels + ch` holds channel `ch` of the `curve`-th line
/// along `axis`, where curves are numbered in storage order of the remaining
/// dimensions.
pub fn unfold(data: MatRef<'_, f64>, shape: &[usize], axis: usize) -> Mat<f64> {
    let total: usize = shape.iter().product();
    let channels = data.ncols();
    let n_axis = shape[axis];
    let stride = strides(shape)[axis];
    let ncurves = if n_axis == 0 { 0 } else { total / n_axis };

    let mut out = Mat::<f64>::zeros(n_axis, ncurves * channels);
    for r in 0..total {
        let (i, curve) = split_row(r, stride, n_axis);
        for ch in 0..channels {
            out[(i, curve * channels + ch)] = data[(r, ch)];
        }
    }
    out
}

/// Inverse of [`unfold`]. `shape` is the shape after the axis transform, so
/// `shape[axis]` must equal `unfolded.nrows()`.
pub fn fold(unfolded: MatRef<'_, f64>, shape: &[usize], axis: usize, channels: usize) -> Mat<f64> {
    let total: usize = shape.iter().product();
    let n_axis = shape[axis];
    let stride = strides(shape)[axis];
    debug_assert_eq!(unfolded.nrows(), n_axis);

    let mut out = Mat::<f64>::zeros(total, channels);
    for r in 0..total {
        let (i, curve) = split_row(r, stride, n_axis);
        for ch in 0..channels {
            out[(r, ch)] = unfolded[(i, curve * channels + ch)];
        }
    }
    out
}

#[inline(always)]
fn split_row(r: usize, stride: usize, n_axis: usize) -> (usize, usize) {
    let i = (r / stride) % n_axis;
    let curve = r % stride + (r / (stride * n_axis)) * stride;
    (i, curve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ravel_unravel_agree() {
        let shape = [3, 4, 2];
        for (flat, idx) in tensor_indices(&shape).enumerate() {
            assert_eq!(ravel(&idx, &shape), flat);
            assert_eq!(unravel(flat, &shape), idx);
        }
        assert_eq!(tensor_indices(&shape).count(), 24);
        assert_eq!(tensor_indices(&[3, 0]).count(), 0);
    }

    #[test]
    fn unfold_gathers_lines_along_axis() {
        // value encodes the multi-index: 100*i0 + 10*i1 + i2
        let shape = [2, 3, 2];
        let data = Mat::from_fn(12, 1, |r, _| {
            let idx = unravel(r, &shape);
            (100 * idx[0] + 10 * idx[1] + idx[2]) as f64
        });

        let m = unfold(data.as_ref(), &shape, 1);
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.ncols(), 4);
        // first curve: i0 = 0, i2 = 0
        assert_eq!(m[(0, 0)], 0.0);
        assert_eq!(m[(2, 0)], 20.0);
        // second curve: i0 = 1, i2 = 0
        assert_eq!(m[(1, 1)], 110.0);
        // fourth curve: i0 = 1, i2 = 1
        assert_eq!(m[(2, 3)], 121.0);

        let back = fold(m.as_ref(), &shape, 1, 1);
        assert_eq!(back, data);
    }

    #[test]
    fn fold_accepts_a_resized_axis() {
        let shape = [2, 3];
        let data = Mat::from_fn(6, 2, |r, c| (r * 2 + c) as f64);
        let m = unfold(data.as_ref(), &shape, 0);

        // keep only the first row along axis 0
        let reduced = Mat::from_fn(1, m.ncols(), |_, j| m[(0, j)]);
        let folded = fold(reduced.as_ref(), &[1, 3], 0, 2);
        assert_eq!(folded.nrows(), 3);
        assert_eq!(folded[(1, 0)], data[(2, 0)]);
        assert_eq!(folded[(2, 1)], data[(4, 1)]);
    }
}
