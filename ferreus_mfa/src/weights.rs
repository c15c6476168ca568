/////////////////////////////////////////////////////////////////////////////////////////////
//
// Solves for rational (NURBS) control point weights by eigenvector initialisation and refinement.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Rational weights
//!
//! For fixed weights $\mathbf{w}$ the rational basis
//!
//! $$
//! R_{ij} = \frac{N_{ij} w_j}{\sum_k N_{ik} w_k}
//! $$
//!
//! turns the rational fit into an ordinary linear least-squares problem in
//! the control points. The weights themselves are found in two stages:
//!
//! 1. For single channel data, the linearised problem of `1` gives a
//!    candidate as the eigenvector of the smallest eigenvalue of
//!    $M = N^T Q^2 N - N^T Q N (N^T N)^{-1} N^T Q N$, where $Q$ is the
//!    diagonal matrix of data values. The candidate is only usable when all
//!    its entries share one sign.
//! 2. A damped multiplicative refinement raises the weights of control
//!    points whose support carries large residuals,
//!    $w_j \leftarrow w_j (1 + \alpha\, e_j / \max_k e_k)$ with
//!    $e_j = \sum_i R_{ij} |r_i|$, then renormalises to a maximum of one.
//!
//! A candidate is accepted only if it lowers the sum of squared residuals by
//! more than the relative tolerance; otherwise the step $\alpha$ is halved.
//! The solve stops once the step drops below [`MIN_STEP`] or the iteration
//! cap is reached. The result is therefore never worse than the ordinary
//! B-spline fit it starts from.
//!
//! # References
//! 1. W. Ma and J.-P. Kruth. NURBS curve and surface fitting for reverse
//!    engineering. International Journal of Advanced Manufacturing
//!    Technology, 14(12):918-927, 1998.
use crate::{
    config::WeightSettings,
    error::EncodingError,
    linalg::{factor_normal, least_squares, smallest_eigenvector, sse},
};
use faer::{linalg::solvers::Solve, Mat, MatRef};

/// Smallest refinement step before the solve gives up.
pub(crate) const MIN_STEP: f64 = 1e-3;

/// Outcome of one weighted solve.
#[derive(Debug, Clone)]
pub(crate) struct WeightedFit {
    pub weights: Vec<f64>,
    pub ctrl_pts: Mat<f64>,
    pub sse: f64,
    pub unweighted_sse: f64,
}

/// Basis scaled by the weights and normalised per row.
pub(crate) fn rational_basis(n: MatRef<'_, f64>, weights: &[f64]) -> Mat<f64> {
    let mut r = Mat::<f64>::zeros(n.nrows(), n.ncols());
    for i in 0..n.nrows() {
        let mut denom = 0.0;
        for j in 0..n.ncols() {
            denom += n[(i, j)] * weights[j];
        }
        let denom = if denom != 0.0 { denom } else { 1.0 };
        for j in 0..n.ncols() {
            r[(i, j)] = n[(i, j)] * weights[j] / denom;
        }
    }
    r
}

/// Fits control points and weights to `data` over basis `n`.
///
/// `observe(iter, sse, accepted)` is called for every candidate tried.
/// Only the initial unweighted solve can fail; failed candidates are skipped.
pub(crate) fn solve_weighted<F>(
    n: MatRef<'_, f64>,
    data: MatRef<'_, f64>,
    lambda: f64,
    settings: &WeightSettings,
    context: &str,
    mut observe: F,
) -> Result<WeightedFit, EncodingError>
where
    F: FnMut(usize, f64, bool),
{
    let ncols = n.ncols();
    let ctrl = least_squares(n, data, lambda, context)?;
    let unweighted_sse = sse((n * &ctrl).as_ref(), data);

    let mut best = WeightedFit {
        weights: vec![1.0; ncols],
        ctrl_pts: ctrl,
        sse: unweighted_sse,
        unweighted_sse,
    };
    if unweighted_sse == 0.0 {
        return Ok(best);
    }

    let mut iter = 0;
    if data.ncols() == 1 {
        if let Some(w) = eigen_weights(n, data, lambda, settings.min_weight, context) {
            try_candidate(n, data, lambda, w, settings, context, &mut best, &mut observe, iter);
        }
        iter += 1;
    }

    let mut step = 1.0;
    while iter < settings.max_iterations && step >= MIN_STEP {
        let r = rational_basis(n, &best.weights);
        let fitted = &r * &best.ctrl_pts;

        let mut support_err = vec![0.0; ncols];
        for i in 0..n.nrows() {
            let mut e2 = 0.0;
            for c in 0..data.ncols() {
                let d = fitted[(i, c)] - data[(i, c)];
                e2 += d * d;
            }
            let e = e2.sqrt();
            for (j, acc) in support_err.iter_mut().enumerate() {
                *acc += r[(i, j)] * e;
            }
        }
        let emax = support_err.iter().cloned().fold(0.0, f64::max);
        if emax == 0.0 {
            break;
        }

        let candidate: Vec<f64> = best
            .weights
            .iter()
            .zip(support_err.iter())
            .map(|(w, e)| w * (1.0 + step * e / emax))
            .collect();
        let candidate = normalize_weights(candidate, settings.min_weight);

        if !try_candidate(n, data, lambda, candidate, settings, context, &mut best, &mut observe, iter) {
            step *= 0.5;
        }
        iter += 1;
    }

    Ok(best)
}

/// Solves with `weights` and keeps the result if it improves on `best`.
#[allow(clippy::too_many_arguments)]
fn try_candidate<F>(
    n: MatRef<'_, f64>,
    data: MatRef<'_, f64>,
    lambda: f64,
    weights: Vec<f64>,
    settings: &WeightSettings,
    context: &str,
    best: &mut WeightedFit,
    observe: &mut F,
    iter: usize,
) -> bool
where
    F: FnMut(usize, f64, bool),
{
    let r = rational_basis(n, &weights);
    let ctrl = match least_squares(r.as_ref(), data, lambda, context) {
        Ok(ctrl) => ctrl,
        Err(e) => {
            log::debug!("{context}: weight candidate {iter} skipped: {e}");
            observe(iter, f64::INFINITY, false);
            return false;
        }
    };
    let err = sse((&r * &ctrl).as_ref(), data);
    let accepted = err < best.sse * (1.0 - settings.tolerance);
    observe(iter, err, accepted);

    if accepted {
        best.weights = weights;
        best.ctrl_pts = ctrl;
        best.sse = err;
    }
    accepted
}

/// Eigenvector weights for single channel data, or `None` when the
/// eigenvector changes sign or cannot be computed.
fn eigen_weights(
    n: MatRef<'_, f64>,
    data: MatRef<'_, f64>,
    lambda: f64,
    min_weight: f64,
    context: &str,
) -> Option<Vec<f64>> {
    let qn = Mat::from_fn(n.nrows(), n.ncols(), |i, j| data[(i, 0)] * n[(i, j)]);
    let ntqn = n.transpose() * &qn;
    let ntq2n = qn.transpose() * &qn;

    let llt = factor_normal(n, lambda, context).ok()?;
    let m = &ntq2n - &ntqn * llt.solve(&ntqn);
    // symmetrise round-off before the eigen solve
    let m = Mat::from_fn(m.nrows(), m.ncols(), |i, j| 0.5 * (m[(i, j)] + m[(j, i)]));

    let v = smallest_eigenvector(m.as_ref(), context).ok()?;
    let positive = v.iter().all(|x| *x > 0.0);
    let negative = v.iter().all(|x| *x < 0.0);
    if !(positive || negative) {
        log::debug!("{context}: eigenvector weights change sign, starting from unit weights");
        return None;
    }

    Some(normalize_weights(v.iter().map(|x| x.abs()).collect(), min_weight))
}

/// Scales weights to a maximum of one and clamps them to `[min_weight, 1]`.
fn normalize_weights(mut weights: Vec<f64>, min_weight: f64) -> Vec<f64> {
    let max = weights.iter().cloned().fold(0.0, f64::max);
    if !(max.is_finite() && max > 0.0) {
        return vec![1.0; weights.len()];
    }
    weights
        .iter_mut()
        .for_each(|w| *w = (*w / max).clamp(min_weight, 1.0));
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferreus_mfa_utils::{basis_matrix, linspace, uniform_knots};

    fn sharp_curve() -> (Mat<f64>, Mat<f64>) {
        let params = linspace(0.0, 1.0, 41);
        let n = basis_matrix(&uniform_knots(3, 8), 3, 8, &params);
        let q = Mat::from_fn(params.len(), 1, |i, _| {
            let x = 20.0 * (params[i] - 0.5);
            1.0 / (1.0 + x * x)
        });
        (n, q)
    }

    #[test]
    fn rational_basis_rows_sum_to_one() {
        let (n, _) = sharp_curve();
        let w: Vec<f64> = (0..8).map(|j| 0.2 + 0.1 * j as f64).collect();
        let r = rational_basis(n.as_ref(), &w);
        for i in 0..r.nrows() {
            let sum: f64 = (0..r.ncols()).map(|j| r[(i, j)]).sum();
            assert!((sum - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn weighted_fit_never_loses_to_the_plain_fit() {
        let (n, q) = sharp_curve();
        let mut steps = 0;
        let fit = solve_weighted(
            n.as_ref(),
            q.as_ref(),
            0.0,
            &WeightSettings::default(),
            "test",
            |_, _, _| steps += 1,
        )
        .unwrap();

        assert!(steps > 0);
        assert!(fit.sse <= fit.unweighted_sse);
        assert!(fit.weights.iter().all(|w| *w >= 1e-4 && *w <= 1.0));
        assert_eq!(fit.ctrl_pts.nrows(), 8);
    }

    #[test]
    fn exact_data_keeps_unit_weights() {
        // a cubic is reproduced exactly by a cubic B-spline
        let params = linspace(0.0, 1.0, 20);
        let n = basis_matrix(&uniform_knots(3, 6), 3, 6, &params);
        let q = Mat::from_fn(20, 1, |i, _| params[i].powi(3));

        let fit = solve_weighted(n.as_ref(), q.as_ref(), 0.0, &WeightSettings::default(), "cubic", |_, _, _| {})
            .unwrap();
        assert!(fit.sse < 1e-20);
        assert!(fit.sse <= fit.unweighted_sse);
    }

    #[test]
    fn normalized_weights_are_clamped() {
        let w = normalize_weights(vec![2.0, 1.0, 1e-9], 1e-4);
        assert_eq!(w, vec![1.0, 0.5, 1e-4]);
        assert_eq!(normalize_weights(vec![0.0, 0.0], 1e-4), vec![1.0, 1.0]);
    }
}
