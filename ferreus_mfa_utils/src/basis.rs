/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements knot span search, B-spline basis functions, and clamped knot vector construction.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;
use thiserror::Error;

/// Reasons a knot vector fails validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KnotError {
    /// The knot vector does not have `nctrl + degree + 1` entries.
    #[error("knot vector has {found} entries, expected {expected}")]
    Length { expected: usize, found: usize },

    /// A knot is smaller than its predecessor.
    #[error("knot {index} is smaller than the knot before it")]
    Decreasing { index: usize },

    /// The first or last `degree + 1` knots are not repeated.
    #[error("knot vector is not clamped at both ends")]
    NotClamped,
}

/// Finds the knot span index `i` such that `knots[i] <= u < knots[i + 1]`.
///
/// The parameter is clamped to the valid range so that `u = 1` (the end of a
/// clamped knot vector) maps to the last non-empty span, `nctrl - 1`.
///
/// # Examples
///
/// ```
/// use ferreus_mfa_utils::{find_span, uniform_knots};
///
/// let knots = uniform_knots(2, 5);
/// assert_eq!(knots, vec![0.0, 0.0, 0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0, 1.0, 1.0]);
/// assert_eq!(find_span(&knots, 2, 5, 0.0), 2);
/// assert_eq!(find_span(&knots, 2, 5, 0.5), 3);
/// assert_eq!(find_span(&knots, 2, 5, 1.0), 4);
/// ```
pub fn find_span(knots: &[f64], degree: usize, nctrl: usize, u: f64) -> usize {
    if u >= knots[nctrl] {
        return nctrl - 1;
    }
    if u <= knots[degree] {
        return degree;
    }

    let mut low = degree;
    let mut high = nctrl;
    let mut mid = (low + high) / 2;

    while u < knots[mid] || u >= knots[mid + 1] {
        if u < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }

    mid
}

/// Computes the `degree + 1` non-vanishing basis functions at `u` for the given span.
///
/// Entry `j` of the result is the value of basis function `span - degree + j`.
pub fn basis_funs(knots: &[f64], degree: usize, span: usize, u: f64) -> Vec<f64> {
    let mut funs = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];

    funs[0] = 1.0;

    for j in 1..=degree {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;

        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom != 0.0 { funs[r] / denom } else { 0.0 };
            funs[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        funs[j] = saved;
    }

    funs
}

/// Computes the non-vanishing basis functions at `u` and their derivatives up
/// to order `nders`, following algorithm A2.3 of The NURBS Book.
///
/// Row `k` of the result holds the `k`-th derivatives, entry `j` belonging to
/// basis function `span - degree + j`. Rows above `degree` are zero.
///
/// # Examples
///
/// ```
/// use ferreus_mfa_utils::{basis_fun_derivs, find_span, uniform_knots};
///
/// // degree 1 on [0, 1]: N0 = 1 - u, N1 = u
/// let knots = uniform_knots(1, 2);
/// let ders = basis_fun_derivs(&knots, 1, find_span(&knots, 1, 2, 0.25), 0.25, 2);
/// assert_eq!(ders[0], vec![0.75, 0.25]);
/// assert_eq!(ders[1], vec![-1.0, 1.0]);
/// assert_eq!(ders[2], vec![0.0, 0.0]);
/// ```
pub fn basis_fun_derivs(knots: &[f64], degree: usize, span: usize, u: f64, nders: usize) -> Vec<Vec<f64>> {
    let p = degree;
    let div = |a: f64, b: f64| if b != 0.0 { a / b } else { 0.0 };

    // upper triangle: basis functions, lower triangle: knot differences
    let mut ndu = vec![vec![0.0; p + 1]; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    ndu[0][0] = 1.0;
    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = 0.0;
        for r in 0..j {
            ndu[j][r] = right[r + 1] + left[j - r];
            let temp = div(ndu[r][j - 1], ndu[j][r]);
            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    let mut ders = vec![vec![0.0; p + 1]; nders + 1];
    for j in 0..=p {
        ders[0][j] = ndu[j][p];
    }

    let top = nders.min(p);
    let mut a = [vec![0.0; p + 1], vec![0.0; p + 1]];
    for r in 0..=p {
        let (mut s1, mut s2) = (0, 1);
        a[0][0] = 1.0;
        for k in 1..=top {
            let pk = p - k;
            let mut d = 0.0;
            if r >= k {
                let rk = r - k;
                a[s2][0] = div(a[s1][0], ndu[pk + 1][rk]);
                d = a[s2][0] * ndu[rk][pk];
            }
            // j runs over the terms whose knot differences exist
            let j1 = if r + 1 >= k { 1 } else { k - r };
            let j2 = if r <= pk + 1 { k - 1 } else { p - r };
            for j in j1..=j2 {
                let col = r + j - k;
                a[s2][j] = div(a[s1][j] - a[s1][j - 1], ndu[pk + 1][col]);
                d += a[s2][j] * ndu[col][pk];
            }
            if r <= pk {
                a[s2][k] = div(-a[s1][k - 1], ndu[pk + 1][r]);
                d += a[s2][k] * ndu[r][pk];
            }
            ders[k][r] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    let mut factor = p as f64;
    for k in 1..=top {
        for value in ders[k].iter_mut() {
            *value *= factor;
        }
        factor *= (p - k) as f64;
    }

    ders
}

/// Builds the dense `(params.len(), nctrl)` matrix of basis function values,
/// one row per parameter.
///
/// Each row has at most `degree + 1` non-zero entries and sums to one.
pub fn basis_matrix(knots: &[f64], degree: usize, nctrl: usize, params: &[f64]) -> Mat<f64> {
    let mut n = Mat::<f64>::zeros(params.len(), nctrl);

    params.iter().enumerate().for_each(|(row, &u)| {
        let span = find_span(knots, degree, nctrl, u);
        let funs = basis_funs(knots, degree, span, u);
        funs.iter().enumerate().for_each(|(j, value)| {
            n[(row, span - degree + j)] = *value;
        });
    });

    n
}

/// Returns a clamped knot vector with uniformly spaced internal knots on `[0, 1]`.
///
/// The vector has `nctrl + degree + 1` entries: `degree + 1` zeros, the
/// `nctrl - degree - 1` internal knots, and `degree + 1` ones.
pub fn uniform_knots(degree: usize, nctrl: usize) -> Vec<f64> {
    assert!(nctrl > degree, "need at least degree + 1 control points");

    let nknots = nctrl + degree + 1;
    let nspans = nctrl - degree;
    let mut knots = vec![0.0; nknots];

    for j in 1..nspans {
        knots[degree + j] = j as f64 / nspans as f64;
    }
    knots[nknots - degree - 1..].fill(1.0);

    knots
}

/// Returns a clamped knot vector whose internal knots follow the distribution
/// of the (sorted, non-decreasing) input parameters.
///
/// `d` is taken as the ratio of input parameter spans to internal knot spans,
/// and each internal knot interpolates linearly between the two parameters it
/// falls between. This places more knots where the input is denser, which
/// keeps every knot span populated for non-uniformly spaced input.
pub fn param_averaged_knots(degree: usize, nctrl: usize, params: &[f64]) -> Vec<f64> {
    assert!(nctrl > degree, "need at least degree + 1 control points");
    assert!(params.len() >= 2, "need at least two parameters to average");

    let nknots = nctrl + degree + 1;
    let nspans = nctrl - degree;
    let d = (params.len() - 1) as f64 / nspans as f64;
    let mut knots = vec![0.0; nknots];

    for j in 1..nspans {
        let jd = j as f64 * d;
        let i = jd.floor() as usize;
        let a = jd - i as f64;
        knots[degree + j] = (1.0 - a) * params[i] + a * params[(i + 1).min(params.len() - 1)];
    }
    knots[nknots - degree - 1..].fill(1.0);

    knots
}

/// Checks length, monotonicity and end clamping of a knot vector.
pub fn validate_knots(knots: &[f64], degree: usize, nctrl: usize) -> Result<(), KnotError> {
    let expected = nctrl + degree + 1;
    if knots.len() != expected {
        return Err(KnotError::Length {
            expected,
            found: knots.len(),
        });
    }

    if let Some(index) = knots.windows(2).position(|w| w[1] < w[0]) {
        return Err(KnotError::Decreasing { index: index + 1 });
    }

    let first = knots[0];
    let last = knots[expected - 1];
    let clamped = knots[..=degree].iter().all(|k| *k == first)
        && knots[expected - degree - 1..].iter().all(|k| *k == last);

    if !clamped {
        return Err(KnotError::NotClamped);
    }

    Ok(())
}

/// Maps a coordinate into `[0, 1]` relative to `[min, max]`, clamping outside values.
#[inline(always)]
pub fn normalize_param(x: f64, min: f64, max: f64) -> f64 {
    let extent = max - min;
    if extent <= 0.0 {
        return 0.0;
    }
    ((x - min) / extent).clamp(0.0, 1.0)
}
