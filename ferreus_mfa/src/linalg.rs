/////////////////////////////////////////////////////////////////////////////////////////////
//
// Adds the normal-equation least-squares solve and eigenvector helpers used by the encoder.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # linalg
//!
//! Least-squares helpers for the encoder.
//!
//! Control points are found from the normal equations `NᵀN P = Nᵀ Q`, with an
//! optional Tikhonov term on the diagonal, factored with a Cholesky LLᵀ.
//! A failed factorization, or pivots spanning more than
//! [`MIN_PIVOT_RATIO`] in magnitude, is reported as a numerical instability
//! rather than returning control points from a near-singular system.
//!
//! # References
//! 1. Å. Björck. Numerical Methods for Least Squares Problems. SIAM, 1996.
use crate::error::EncodingError;
use faer::{
    linalg::solvers::{Llt, Solve},
    Mat, MatRef, Side,
};

/// Smallest accepted ratio between the smallest and largest squared pivot of
/// the Cholesky factor. Roughly a condition number bound of `1e14`.
pub(crate) const MIN_PIVOT_RATIO: f64 = 1e-14;

/// Factors `NᵀN + λI`.
pub(crate) fn factor_normal(
    n: MatRef<'_, f64>,
    lambda: f64,
    context: &str,
) -> Result<Llt<f64>, EncodingError> {
    let mut ntn = n.transpose() * n;
    if lambda > 0.0 {
        for i in 0..ntn.nrows() {
            ntn[(i, i)] += lambda;
        }
    }
    factor_spd(ntn.as_ref(), context)
}

/// Factors a symmetric positive definite matrix, rejecting ill-conditioned ones.
pub(crate) fn factor_spd(a: MatRef<'_, f64>, context: &str) -> Result<Llt<f64>, EncodingError> {
    let instability = || EncodingError::NumericalInstability {
        context: context.to_string(),
    };

    if a.nrows() == 0 {
        return Err(instability());
    }

    let llt = a.llt(Side::Lower).map_err(|_| instability())?;

    let l = llt.L();
    let (mut lo, mut hi) = (f64::INFINITY, 0.0f64);
    for i in 0..l.nrows() {
        let pivot = l[(i, i)] * l[(i, i)];
        lo = lo.min(pivot);
        hi = hi.max(pivot);
    }
    if !(lo.is_finite() && hi.is_finite()) || hi == 0.0 || lo / hi < MIN_PIVOT_RATIO {
        return Err(instability());
    }

    Ok(llt)
}

/// Solves `min ‖N P - Q‖² + λ‖P‖²` for every column of `rhs`.
pub(crate) fn least_squares(
    n: MatRef<'_, f64>,
    rhs: MatRef<'_, f64>,
    lambda: f64,
    context: &str,
) -> Result<Mat<f64>, EncodingError> {
    let llt = factor_normal(n, lambda, context)?;
    let ntq = n.transpose() * rhs;
    let p = llt.solve(&ntq);

    if p.col_iter().any(|c| c.iter().any(|v| !v.is_finite())) {
        return Err(EncodingError::NumericalInstability {
            context: context.to_string(),
        });
    }
    Ok(p)
}

/// Eigenvector of the smallest eigenvalue of a symmetric matrix.
pub(crate) fn smallest_eigenvector(a: MatRef<'_, f64>, context: &str) -> Result<Vec<f64>, EncodingError> {
    let evd = a
        .self_adjoint_eigen(Side::Lower)
        .map_err(|_| EncodingError::NumericalInstability {
            context: context.to_string(),
        })?;

    let s = evd.S().column_vector();
    let mut best = 0;
    for i in 1..s.nrows() {
        if s[i] < s[best] {
            best = i;
        }
    }
    let u = evd.U();
    Ok((0..u.nrows()).map(|i| u[(i, best)]).collect())
}

/// Sum of squared entries of `a - b`.
pub(crate) fn sse(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> f64 {
    let mut acc = 0.0;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            let d = a[(i, j)] - b[(i, j)];
            acc += d * d;
        }
    }
    acc
}
