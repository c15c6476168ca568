/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the tensor-product (rational) B-spline model produced by the encoder.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Tensor-product B-spline models.
//!
//! A [`TensorModel`] maps a point of the domain to `channels` output values:
//!
//! $$
//! \mathbf{f}(\mathbf{u}) = \mathbf{s} \odot
//! \frac{\sum_{\mathbf{i}} N_{\mathbf{i}}(\mathbf{u})\, w_{\mathbf{i}}\, \mathbf{P}_{\mathbf{i}}}
//!      {\sum_{\mathbf{i}} N_{\mathbf{i}}(\mathbf{u})\, w_{\mathbf{i}}}
//! $$
//!
//! where $N_{\mathbf{i}}$ is the product of the one dimensional basis
//! functions, $w_{\mathbf{i}}$ the control point weights (all one for an
//! ordinary B-spline) and $\mathbf{s}$ the per-channel scale factors the
//! values were divided by before fitting. Domain coordinates are mapped to
//! parameters through the bounding box of the samples the model was fitted to.
//!
//! Control points are stored one row per control point with dimension 0
//! changing fastest.
use ferreus_mfa_utils::{
    basis_fun_derivs, basis_funs, find_span, normalize_param, ravel, tensor_indices, validate_knots,
};
use faer::{Mat, MatRef};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One fitted geometry or science variable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorModel {
    name: String,
    degrees: Vec<usize>,
    nctrl: Vec<usize>,
    knots: Vec<Vec<f64>>,
    ctrl_pts: Mat<f64>,
    weights: Vec<f64>,
    scale: Vec<f64>,
    param_min: Vec<f64>,
    param_max: Vec<f64>,
}

impl TensorModel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        degrees: Vec<usize>,
        nctrl: Vec<usize>,
        knots: Vec<Vec<f64>>,
        ctrl_pts: Mat<f64>,
        weights: Vec<f64>,
        scale: Vec<f64>,
        param_min: Vec<f64>,
        param_max: Vec<f64>,
    ) -> Self {
        Self {
            name,
            degrees,
            nctrl,
            knots,
            ctrl_pts,
            weights,
            scale,
            param_min,
            param_max,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dom_dim(&self) -> usize {
        self.degrees.len()
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    pub fn nctrl(&self) -> &[usize] {
        &self.nctrl
    }

    /// Total number of control points.
    pub fn nctrl_total(&self) -> usize {
        self.nctrl.iter().product()
    }

    pub fn knots(&self) -> &[Vec<f64>] {
        &self.knots
    }

    /// Control points in scaled units, one row per control point.
    pub fn ctrl_pts(&self) -> &Mat<f64> {
        &self.ctrl_pts
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Number of output values per evaluation.
    pub fn channels(&self) -> usize {
        self.ctrl_pts.ncols()
    }

    /// Whether any weight differs from one.
    pub fn is_rational(&self) -> bool {
        self.weights.iter().any(|w| *w != 1.0)
    }

    pub fn param_min(&self) -> &[f64] {
        &self.param_min
    }

    pub fn param_max(&self) -> &[f64] {
        &self.param_max
    }

    /// Maps domain coordinates to parameters, clamping to `[0, 1]`.
    pub fn param(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.param_min.iter().zip(self.param_max.iter()))
            .map(|(x, (lo, hi))| normalize_param(*x, *lo, *hi))
            .collect()
    }

    /// Evaluates the model at domain coordinates `x`.
    pub fn evaluate(&self, x: &[f64]) -> Vec<f64> {
        self.evaluate_param(&self.param(x))
    }

    /// Evaluates the model at parameters `u` in `[0, 1]`.
    pub fn evaluate_param(&self, u: &[f64]) -> Vec<f64> {
        let d = self.dom_dim();
        let channels = self.channels();

        let mut first = Vec::with_capacity(d);
        let mut funs = Vec::with_capacity(d);
        for k in 0..d {
            let p = self.degrees[k];
            let span = find_span(&self.knots[k], p, self.nctrl[k], u[k]);
            first.push(span - p);
            funs.push(basis_funs(&self.knots[k], p, span, u[k]));
        }

        let support: Vec<usize> = self.degrees.iter().map(|p| p + 1).collect();
        let mut numer = vec![0.0; channels];
        let mut denom = 0.0;
        let mut idx = vec![0usize; d];

        for local in tensor_indices(&support) {
            let mut n = 1.0;
            for k in 0..d {
                n *= funs[k][local[k]];
                idx[k] = first[k] + local[k];
            }
            if n == 0.0 {
                continue;
            }
            let row = ravel(&idx, &self.nctrl);
            let nw = n * self.weights[row];
            denom += nw;
            for (c, acc) in numer.iter_mut().enumerate() {
                *acc += nw * self.ctrl_pts[(row, c)];
            }
        }

        let denom = if denom != 0.0 { denom } else { 1.0 };
        numer
            .iter()
            .zip(self.scale.iter())
            .map(|(v, s)| v / denom * s)
            .collect()
    }

    /// Partial derivative of the model at parameters `u`, `derivs[k]` times
    /// along dimension `k`, with respect to the parameters.
    ///
    /// Rational models are differentiated with the multivariate Leibniz rule
    /// on $A = \sum N w P$ and $W = \sum N w$:
    ///
    /// $$
    /// C^{(\alpha)} = \frac{1}{W}\Big(A^{(\alpha)} - \sum_{0 < \beta \le \alpha}
    ///     \tbinom{\alpha}{\beta} W^{(\beta)} C^{(\alpha - \beta)}\Big)
    /// $$
    pub fn evaluate_derivs(&self, u: &[f64], derivs: &[usize]) -> Vec<f64> {
        let d = self.dom_dim();
        let channels = self.channels();

        let mut first = Vec::with_capacity(d);
        let mut ders = Vec::with_capacity(d);
        for k in 0..d {
            let p = self.degrees[k];
            let span = find_span(&self.knots[k], p, self.nctrl[k], u[k]);
            first.push(span - p);
            ders.push(basis_fun_derivs(&self.knots[k], p, span, u[k], derivs[k]));
        }

        // every multi-index below `derivs`, dimension 0 fastest, so each
        // smaller index is finished before it is needed
        let orders: Vec<usize> = derivs.iter().map(|n| n + 1).collect();
        let multi: Vec<Vec<usize>> = tensor_indices(&orders).collect();
        let support: Vec<usize> = self.degrees.iter().map(|p| p + 1).collect();
        let mut a = vec![vec![0.0; channels]; multi.len()];
        let mut w = vec![0.0; multi.len()];
        let mut idx = vec![0usize; d];

        for local in tensor_indices(&support) {
            for k in 0..d {
                idx[k] = first[k] + local[k];
            }
            let row = ravel(&idx, &self.nctrl);
            let weight = self.weights[row];
            for (m, gamma) in multi.iter().enumerate() {
                let n: f64 = (0..d).map(|k| ders[k][gamma[k]][local[k]]).product();
                if n == 0.0 {
                    continue;
                }
                w[m] += n * weight;
                for (c, acc) in a[m].iter_mut().enumerate() {
                    *acc += n * weight * self.ctrl_pts[(row, c)];
                }
            }
        }

        let w0 = if w[0] != 0.0 { w[0] } else { 1.0 };
        let mut out: Vec<Vec<f64>> = Vec::with_capacity(multi.len());
        for (m, gamma) in multi.iter().enumerate() {
            let mut value = a[m].clone();
            for (b, beta) in multi.iter().enumerate().take(m + 1).skip(1) {
                if beta.iter().zip(gamma.iter()).any(|(bk, gk)| bk > gk) {
                    continue;
                }
                let rest: Vec<usize> = gamma.iter().zip(beta.iter()).map(|(gk, bk)| gk - bk).collect();
                let factor = w[b] * beta
                    .iter()
                    .zip(gamma.iter())
                    .map(|(bk, gk)| binomial(*gk, *bk))
                    .product::<f64>();
                if factor == 0.0 {
                    continue;
                }
                let lower = &out[ravel(&rest, &orders)];
                for (v, l) in value.iter_mut().zip(lower.iter()) {
                    *v -= factor * l;
                }
            }
            for v in value.iter_mut() {
                *v /= w0;
            }
            out.push(value);
        }

        out.pop()
            .unwrap_or_default()
            .iter()
            .zip(self.scale.iter())
            .map(|(v, s)| v * s)
            .collect()
    }

    /// Partial derivative at domain coordinates `x`, `derivs[k]` times along
    /// dimension `k`, with respect to the coordinates.
    pub fn derivative(&self, x: &[f64], derivs: &[usize]) -> Vec<f64> {
        let chain: f64 = derivs
            .iter()
            .zip(self.param_min.iter().zip(self.param_max.iter()))
            .map(|(n, (lo, hi))| {
                let extent = hi - lo;
                match n {
                    0 => 1.0,
                    _ if extent > 0.0 => extent.powi(-(*n as i32)),
                    _ => 0.0,
                }
            })
            .product();
        self.evaluate_derivs(&self.param(x), derivs)
            .into_iter()
            .map(|v| v * chain)
            .collect()
    }

    /// Evaluates the model at every row of `points` (domain coordinates only).
    pub fn evaluate_points(&self, points: MatRef<'_, f64>) -> Mat<f64> {
        let rows: Vec<Vec<f64>> = (0..points.nrows())
            .into_par_iter()
            .map(|i| {
                let x: Vec<f64> = (0..self.dom_dim()).map(|k| points[(i, k)]).collect();
                self.evaluate(&x)
            })
            .collect();

        Mat::from_fn(rows.len(), self.channels(), |i, c| rows[i][c])
    }

    /// Checks every structural invariant. Used when restoring persisted state.
    pub fn validate(&self) -> Result<(), String> {
        let d = self.degrees.len();
        let name = &self.name;
        if d == 0 {
            return Err(format!("{name}: model has no dimensions"));
        }
        for (field, len) in [
            ("nctrl", self.nctrl.len()),
            ("knots", self.knots.len()),
            ("param_min", self.param_min.len()),
            ("param_max", self.param_max.len()),
        ] {
            if len != d {
                return Err(format!("{name}: {field} has {len} entries, expected {d}"));
            }
        }
        for k in 0..d {
            if self.nctrl[k] < self.degrees[k] + 1 {
                return Err(format!(
                    "{name}: dimension {k} has {} control points for degree {}",
                    self.nctrl[k], self.degrees[k]
                ));
            }
            validate_knots(&self.knots[k], self.degrees[k], self.nctrl[k])
                .map_err(|e| format!("{name}: dimension {k}: {e}"))?;
        }
        let total = self.nctrl_total();
        if self.ctrl_pts.nrows() != total || self.weights.len() != total {
            return Err(format!(
                "{name}: expected {total} control points and weights, found {} and {}",
                self.ctrl_pts.nrows(),
                self.weights.len()
            ));
        }
        if self.scale.len() != self.channels() {
            return Err(format!(
                "{name}: {} scale factors for {} channels",
                self.scale.len(),
                self.channels()
            ));
        }
        if self.weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(format!("{name}: weights must be finite and positive"));
        }
        Ok(())
    }
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}
