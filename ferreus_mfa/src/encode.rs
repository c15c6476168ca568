/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the fixed-degree tensor-product B-spline least-squares encoder.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Encoder
//!
//! Fits a [`TensorModel`] of fixed degree and control point count to a
//! [`PointSet`].
//!
//! Structured input is fitted one dimension at a time: the samples are
//! unfolded into the curves running along dimension `k`, every curve is
//! fitted with the same one dimensional basis, and the resulting control
//! points become the input of dimension `k + 1`. Each dimension solves one
//! small set of normal equations with many right hand sides. Scattered input
//! is fitted in one solve over the full tensor-product basis.
//!
//! Every shape and count check runs before any system is assembled, so a
//! rejected configuration never computes control points.
//!
//! When weights are requested they are solved with
//! [`solve_weighted`](crate::weights) on the last dimension of a structured
//! fit (independently per curve), or on the full basis for scattered input.
//!
//! # References
//! 1. L. Piegl and W. Tiller. The NURBS Book, 2nd edition. Springer, 1997. Section 9.4.
//! 2. T. Peterka, Y. S. Nashed, I. Grindeanu, V. S. Mahadevan, R. Yeh and
//!    X.-M. Tricoche. Foundations of Multivariate Functional Approximation
//!    for Scientific Data. IEEE LDAV, 2018.
use crate::{
    config::{EncodeSettings, KnotPolicy},
    error::EncodingError,
    input::{Parameterization, PointSet},
    linalg::{least_squares, sse},
    progress::{ProgressMsg, ProgressSink, Reporter},
    spline::TensorModel,
    weights::{solve_weighted, WeightedFit},
};
use faer::{Mat, MatRef};
use ferreus_mfa_utils::{
    argsort, basis_funs, basis_matrix, find_span, fold, param_averaged_knots, ravel,
    tensor_indices, uniform_knots, unfold, unravel,
};
use rayon::prelude::*;
use std::sync::Arc;

/// What to fit: a contiguous range of point set columns and the spline shape to use.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Used in error messages and progress events.
    pub name: String,

    /// First column, counted from the first domain coordinate.
    pub first_column: usize,

    pub channels: usize,
    pub degrees: Vec<usize>,
    pub nctrl: Vec<usize>,

    /// Per-channel factors the values are divided by before fitting.
    pub scale: Vec<f64>,

    pub weighted: bool,
}

/// Fits models to one point set.
#[derive(Debug)]
pub struct Encoder<'a> {
    points: &'a PointSet,
    settings: &'a EncodeSettings,
    gid: usize,
    reporter: Reporter,
}

/// Fits one model with no progress reporting.
pub fn encode(points: &PointSet, spec: &ModelSpec, settings: &EncodeSettings) -> Result<TensorModel, EncodingError> {
    Encoder::new(points, settings).encode(spec)
}

impl<'a> Encoder<'a> {
    pub fn new(points: &'a PointSet, settings: &'a EncodeSettings) -> Self {
        Self {
            points,
            settings,
            gid: 0,
            reporter: Reporter::default(),
        }
    }

    /// Reports progress for block `gid` to `sink`, filtered by `verbose`.
    pub fn progress(mut self, gid: usize, sink: Option<Arc<dyn ProgressSink>>, verbose: u8) -> Self {
        self.gid = gid;
        self.reporter = Reporter::new(sink, verbose);
        self
    }

    /// Runs every check [`Encoder::encode`] runs before solving.
    pub fn check(&self, spec: &ModelSpec) -> Result<(), EncodingError> {
        let d = self.points.dom_dim();
        let model = &spec.name;

        if spec.degrees.len() != d || spec.nctrl.len() != d {
            return Err(EncodingError::Shape(format!(
                "{model}: {} degrees and {} control point counts for {d} dimensions",
                spec.degrees.len(),
                spec.nctrl.len()
            )));
        }
        if spec.channels == 0 || spec.first_column + spec.channels > self.points.pt_dim() {
            return Err(EncodingError::Shape(format!(
                "{model}: columns {}..{} outside the {} available",
                spec.first_column,
                spec.first_column + spec.channels,
                self.points.pt_dim()
            )));
        }
        if spec.scale.len() != spec.channels {
            return Err(EncodingError::Shape(format!(
                "{model}: {} scale factors for {} channels",
                spec.scale.len(),
                spec.channels
            )));
        }

        for dim in 0..d {
            let (degree, nctrl) = (spec.degrees[dim], spec.nctrl[dim]);
            if nctrl < degree + 1 {
                return Err(EncodingError::DegreeTooHigh {
                    model: model.clone(),
                    dim,
                    degree,
                    nctrl,
                });
            }
        }

        match self.points.ndom_pts() {
            Some(ndom) => {
                for dim in 0..d {
                    let nctrl = spec.nctrl[dim];
                    if nctrl > ndom[dim] {
                        return Err(EncodingError::Underdetermined {
                            model: model.clone(),
                            dim,
                            nctrl,
                            ndom: ndom[dim],
                        });
                    }
                    if nctrl == ndom[dim] && !self.settings.allow_interpolation {
                        return Err(EncodingError::ExactlyDetermined {
                            model: model.clone(),
                            dim,
                            nctrl,
                        });
                    }
                }
            }
            None => {
                let nctrl_total: usize = spec.nctrl.iter().product();
                let npts = self.points.npts();
                let exact_ok = self.settings.allow_interpolation && npts == nctrl_total;
                if npts <= nctrl_total && !exact_ok {
                    return Err(EncodingError::TooFewPoints {
                        model: model.clone(),
                        nctrl_total,
                        npts,
                    });
                }
            }
        }

        Ok(())
    }

    /// Fits one model.
    pub fn encode(&self, spec: &ModelSpec) -> Result<TensorModel, EncodingError> {
        self.check(spec)?;

        let knots = self.knot_vectors(spec);
        let data = self.scaled_values(spec);

        let (ctrl_pts, weights) = match self.points.params() {
            Parameterization::Grid(params) => {
                let fit = self.encode_grid(spec, &knots, params, data.as_ref(), spec.weighted)?;
                if spec.weighted && spec.degrees.len() > 1 {
                    self.prefer_better(spec, &knots, params, data.as_ref(), fit)?
                } else {
                    fit
                }
            }
            Parameterization::Scattered(params) => self.encode_scattered(spec, &knots, params.as_ref(), data.as_ref())?,
        };

        let model = TensorModel::new(
            spec.name.clone(),
            spec.degrees.clone(),
            spec.nctrl.clone(),
            knots,
            ctrl_pts,
            weights,
            spec.scale.clone(),
            self.points.param_min().to_vec(),
            self.points.param_max().to_vec(),
        );
        log::debug!(
            "block {}: encoded {} with {} control points",
            self.gid,
            spec.name,
            model.nctrl_total()
        );
        Ok(model)
    }

    fn knot_vectors(&self, spec: &ModelSpec) -> Vec<Vec<f64>> {
        (0..spec.degrees.len())
            .map(|k| {
                let (p, n) = (spec.degrees[k], spec.nctrl[k]);
                match self.settings.knot_policy {
                    KnotPolicy::Uniform => uniform_knots(p, n),
                    KnotPolicy::ParamAveraged => {
                        let mut params = match self.points.params() {
                            Parameterization::Grid(params) => params[k].clone(),
                            Parameterization::Scattered(params) => {
                                (0..params.nrows()).map(|i| params[(i, k)]).collect()
                            }
                        };
                        let order = argsort(&params);
                        params = order.iter().map(|i| params[*i]).collect();
                        if params.len() < 2 {
                            uniform_knots(p, n)
                        } else {
                            param_averaged_knots(p, n, &params)
                        }
                    }
                }
            })
            .collect()
    }

    fn scaled_values(&self, spec: &ModelSpec) -> Mat<f64> {
        let cols = self.points.columns(spec.first_column, spec.channels);
        Mat::from_fn(cols.nrows(), spec.channels, |i, c| cols[(i, c)] / spec.scale[c])
    }

    /// Separable fit of a structured grid. Returns control points and weights.
    fn encode_grid(
        &self,
        spec: &ModelSpec,
        knots: &[Vec<f64>],
        params: &[Vec<f64>],
        data: MatRef<'_, f64>,
        weighted: bool,
    ) -> Result<(Mat<f64>, Vec<f64>), EncodingError> {
        let d = spec.degrees.len();
        let channels = spec.channels;
        let lambda = self.settings.regularization;
        let mut shape: Vec<usize> = self.points.ndom_pts().map(|s| s.to_vec()).unwrap_or_default();
        let mut current = data.to_owned();
        let mut curve_weights: Option<Vec<Vec<f64>>> = None;

        for k in 0..d {
            let context = format!("encoding {} along dimension {k}", spec.name);
            let n = basis_matrix(&knots[k], spec.degrees[k], spec.nctrl[k], &params[k]);
            let unfolded = unfold(current.as_ref(), &shape, k);

            let solved = if weighted && k == d - 1 {
                let ncurves = unfolded.ncols() / channels;
                let fits: Vec<WeightedFit> = (0..ncurves)
                    .into_par_iter()
                    .map(|curve| {
                        let rhs = unfolded.as_ref().subcols(curve * channels, channels);
                        solve_weighted(
                            n.as_ref(),
                            rhs,
                            lambda,
                            &self.settings.weight_settings,
                            &context,
                            |iter, sse, accepted| {
                                self.reporter.emit(3, || ProgressMsg::WeightIteration {
                                    gid: self.gid,
                                    model: spec.name.clone(),
                                    iter,
                                    sse,
                                    accepted,
                                })
                            },
                        )
                    })
                    .collect::<Result<_, _>>()?;

                let mut solved = Mat::<f64>::zeros(spec.nctrl[k], unfolded.ncols());
                for (curve, fit) in fits.iter().enumerate() {
                    solved
                        .as_mut()
                        .subcols_mut(curve * channels, channels)
                        .copy_from(&fit.ctrl_pts);
                }
                curve_weights = Some(fits.into_iter().map(|f| f.weights).collect());
                solved
            } else {
                least_squares(n.as_ref(), unfolded.as_ref(), lambda, &context)?
            };

            shape[k] = spec.nctrl[k];
            current = fold(solved.as_ref(), &shape, k, channels);

            self.reporter.emit(2, || ProgressMsg::DimensionEncoded {
                gid: self.gid,
                model: spec.name.clone(),
                dim: k,
            });
        }

        let total: usize = shape.iter().product();
        let weights = match curve_weights {
            // curves of the last dimension are numbered by the remaining flat index
            Some(per_curve) => {
                let stride = total / shape[d - 1];
                (0..total)
                    .map(|r| {
                        let i = unravel(r, &shape)[d - 1];
                        per_curve[r % stride][i]
                    })
                    .collect()
            }
            None => vec![1.0; total],
        };

        Ok((current, weights))
    }

    /// For multi dimensional grids the per-curve weights only approximate a
    /// tensor-product rational fit, so keep whichever fit is closer to the data.
    fn prefer_better(
        &self,
        spec: &ModelSpec,
        knots: &[Vec<f64>],
        params: &[Vec<f64>],
        data: MatRef<'_, f64>,
        weighted: (Mat<f64>, Vec<f64>),
    ) -> Result<(Mat<f64>, Vec<f64>), EncodingError> {
        let plain = self.encode_grid(spec, knots, params, data, false)?;

        let err = |fit: &(Mat<f64>, Vec<f64>)| {
            let model = TensorModel::new(
                spec.name.clone(),
                spec.degrees.clone(),
                spec.nctrl.clone(),
                knots.to_vec(),
                fit.0.clone(),
                fit.1.clone(),
                vec![1.0; spec.channels],
                self.points.param_min().to_vec(),
                self.points.param_max().to_vec(),
            );
            sse(model.evaluate_points(self.points.domain()).as_ref(), data)
        };

        let (weighted_err, plain_err) = (err(&weighted), err(&plain));
        if weighted_err <= plain_err {
            Ok(weighted)
        } else {
            log::warn!(
                "block {}: {} weights raised the error ({weighted_err:.3e} > {plain_err:.3e}), weights reset to one",
                self.gid,
                spec.name
            );
            Ok(plain)
        }
    }

    /// Single solve over the full tensor basis for scattered samples.
    fn encode_scattered(
        &self,
        spec: &ModelSpec,
        knots: &[Vec<f64>],
        params: MatRef<'_, f64>,
        data: MatRef<'_, f64>,
    ) -> Result<(Mat<f64>, Vec<f64>), EncodingError> {
        let context = format!("encoding {} from scattered points", spec.name);
        let n = tensor_basis(knots, &spec.degrees, &spec.nctrl, params);
        let lambda = self.settings.regularization;

        let out = if spec.weighted {
            let fit = solve_weighted(
                n.as_ref(),
                data,
                lambda,
                &self.settings.weight_settings,
                &context,
                |iter, sse, accepted| {
                    self.reporter.emit(3, || ProgressMsg::WeightIteration {
                        gid: self.gid,
                        model: spec.name.clone(),
                        iter,
                        sse,
                        accepted,
                    })
                },
            )?;
            log::debug!(
                "block {}: {} weighted sse {:.3e}, unweighted {:.3e}",
                self.gid,
                spec.name,
                fit.sse,
                fit.unweighted_sse
            );
            (fit.ctrl_pts, fit.weights)
        } else {
            let total = n.ncols();
            (least_squares(n.as_ref(), data, lambda, &context)?, vec![1.0; total])
        };

        for dim in 0..spec.degrees.len() {
            self.reporter.emit(2, || ProgressMsg::DimensionEncoded {
                gid: self.gid,
                model: spec.name.clone(),
                dim,
            });
        }
        Ok(out)
    }
}

/// Dense `(npts, Π nctrl)` matrix of tensor-product basis values.
fn tensor_basis(knots: &[Vec<f64>], degrees: &[usize], nctrl: &[usize], params: MatRef<'_, f64>) -> Mat<f64> {
    let d = degrees.len();
    let total: usize = nctrl.iter().product();
    let support: Vec<usize> = degrees.iter().map(|p| p + 1).collect();
    let mut n = Mat::<f64>::zeros(params.nrows(), total);

    let mut first = vec![0usize; d];
    let mut idx = vec![0usize; d];
    for i in 0..params.nrows() {
        let funs: Vec<Vec<f64>> = (0..d)
            .map(|k| {
                let span = find_span(&knots[k], degrees[k], nctrl[k], params[(i, k)]);
                first[k] = span - degrees[k];
                basis_funs(&knots[k], degrees[k], span, params[(i, k)])
            })
            .collect();

        for local in tensor_indices(&support) {
            let mut value = 1.0;
            for k in 0..d {
                value *= funs[k][local[k]];
                idx[k] = first[k] + local[k];
            }
            n[(i, ravel(&idx, nctrl))] += value;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    fn grid_1d(n: usize, f: impl Fn(f64) -> f64) -> PointSet {
        let points = Mat::from_fn(n, 2, |i, c| {
            let x = -1.0 + 2.0 * i as f64 / (n - 1) as f64;
            if c == 0 { x } else { f(x) }
        });
        PointSet::grid(1, points, vec![n]).unwrap()
    }

    fn var_spec(degree: usize, nctrl: usize, dims: usize) -> ModelSpec {
        ModelSpec {
            name: "var 0".into(),
            first_column: dims,
            channels: 1,
            degrees: vec![degree; dims],
            nctrl: vec![nctrl; dims],
            scale: vec![1.0],
            weighted: false,
        }
    }

    #[test]
    fn cubic_is_reproduced_exactly() {
        let set = grid_1d(15, |x| x * x * x - x);
        let model = encode(&set, &var_spec(3, 6, 1), &EncodeSettings::default()).unwrap();
        for x in [-1.0, -0.3, 0.0, 0.45, 1.0] {
            assert!((model.evaluate(&[x])[0] - (x * x * x - x)).abs() < 1e-10);
        }
    }

    #[test]
    fn decoded_derivatives_match_the_analytic_ones() {
        let set = grid_1d(15, |x| x * x * x - x);
        let model = encode(&set, &var_spec(3, 6, 1), &EncodeSettings::default()).unwrap();
        for x in [-0.8, -0.3, 0.0, 0.45, 0.9] {
            let first = model.derivative(&[x], &[1])[0];
            let second = model.derivative(&[x], &[2])[0];
            assert!((first - (3.0 * x * x - 1.0)).abs() < 1e-8, "x = {x}: {first}");
            assert!((second - 6.0 * x).abs() < 1e-6, "x = {x}: {second}");
        }
    }

    #[test]
    fn counts_are_checked_before_solving() {
        let set = grid_1d(10, |x| x);
        let settings = EncodeSettings::default();

        let err = encode(&set, &var_spec(3, 12, 1), &settings).unwrap_err();
        assert!(matches!(err, EncodingError::Underdetermined { dim: 0, nctrl: 12, ndom: 10, .. }));

        let err = encode(&set, &var_spec(3, 10, 1), &settings).unwrap_err();
        assert!(matches!(err, EncodingError::ExactlyDetermined { dim: 0, nctrl: 10, .. }));

        let err = encode(&set, &var_spec(4, 3, 1), &settings).unwrap_err();
        assert!(matches!(err, EncodingError::DegreeTooHigh { degree: 4, nctrl: 3, .. }));
    }

    #[test]
    fn bilinear_grid_is_reproduced() {
        // f(x, y) = 1 + x - 2y, x fastest
        let (nx, ny) = (6, 5);
        let points = Mat::from_fn(nx * ny, 3, |r, c| {
            let (x, y) = ((r % nx) as f64, (r / nx) as f64);
            match c {
                0 => x,
                1 => y,
                _ => 1.0 + x - 2.0 * y,
            }
        });
        let set = PointSet::grid(2, points, vec![nx, ny]).unwrap();
        let model = encode(&set, &var_spec(2, 4, 2), &EncodeSettings::default()).unwrap();

        assert_eq!(model.nctrl_total(), 16);
        for (x, y) in [(0.0, 0.0), (2.5, 1.5), (5.0, 4.0)] {
            assert!((model.evaluate(&[x, y])[0] - (1.0 + x - 2.0 * y)).abs() < 1e-10);
        }
    }

    #[test]
    fn scattered_plane_is_reproduced() {
        let coords = [
            (0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.3, 0.7), (0.6, 0.2),
            (0.9, 0.5), (0.1, 0.4), (0.5, 0.5), (0.8, 0.9), (0.2, 0.1), (0.7, 0.6),
        ];
        let points = Mat::from_fn(coords.len(), 3, |i, c| {
            let (x, y) = coords[i];
            match c {
                0 => x,
                1 => y,
                _ => 3.0 * x + y,
            }
        });
        let set = PointSet::scattered(2, points).unwrap();
        let settings = EncodeSettings {
            knot_policy: KnotPolicy::ParamAveraged,
            ..EncodeSettings::default()
        };
        let model = encode(&set, &var_spec(1, 2, 2), &settings).unwrap();
        assert!((model.evaluate(&[0.5, 0.25])[0] - 1.75).abs() < 1e-10);
    }

    #[test]
    fn scale_factors_cancel_out() {
        let set = grid_1d(12, |x| 1000.0 * x * x);
        let mut spec = var_spec(2, 4, 1);
        spec.scale = vec![1000.0];
        let model = encode(&set, &spec, &EncodeSettings::default()).unwrap();
        assert!((model.ctrl_pts()[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((model.evaluate(&[0.5])[0] - 250.0).abs() < 1e-8);
    }

    #[test]
    fn weighted_grid_fit_is_rational_and_no_worse() {
        let set = grid_1d(40, |x| 1.0 / (1.0 + 100.0 * x * x));
        let plain = encode(&set, &var_spec(3, 10, 1), &EncodeSettings::default()).unwrap();
        let mut spec = var_spec(3, 10, 1);
        spec.weighted = true;
        let weighted = encode(&set, &spec, &EncodeSettings::default()).unwrap();

        let values = set.values(0);
        let plain_err = sse(plain.evaluate_points(set.domain()).as_ref(), values);
        let weighted_err = sse(weighted.evaluate_points(set.domain()).as_ref(), values);
        assert!(weighted_err <= plain_err * (1.0 + 1e-12));
        assert_eq!(weighted.weights().len(), 10);
    }

    /// `(2 + x) / (0.05 + y)`, a rational function inside every spline
    /// space that is at least linear in x.
    fn pole_near_edge(x: f64, y: f64) -> f64 {
        (2.0 + x) / (0.05 + y)
    }

    #[test]
    fn weighted_surface_grid_beats_the_plain_fit() {
        let (nx, ny) = (5, 40);
        let points = Mat::from_fn(nx * ny, 3, |r, c| {
            let x = (r % nx) as f64 / (nx - 1) as f64;
            let y = (r / nx) as f64 / (ny - 1) as f64;
            match c {
                0 => x,
                1 => y,
                _ => pole_near_edge(x, y),
            }
        });
        let set = PointSet::grid(2, points, vec![nx, ny]).unwrap();
        let mut spec = ModelSpec {
            degrees: vec![1, 3],
            nctrl: vec![2, 10],
            ..var_spec(1, 2, 2)
        };
        let plain = encode(&set, &spec, &EncodeSettings::default()).unwrap();
        spec.weighted = true;
        let weighted = encode(&set, &spec, &EncodeSettings::default()).unwrap();

        assert!(!plain.is_rational());
        assert!(weighted.is_rational());
        assert_eq!(weighted.weights().len(), 20);

        let values = set.values(0);
        let plain_err = sse(plain.evaluate_points(set.domain()).as_ref(), values);
        let weighted_err = sse(weighted.evaluate_points(set.domain()).as_ref(), values);
        assert!(weighted_err < 1e-3 * plain_err, "{weighted_err:.3e} vs {plain_err:.3e}");
        assert!((weighted.evaluate(&[0.5, 0.3])[0] - pole_near_edge(0.5, 0.3)).abs() < 1e-4);
    }

    #[test]
    fn weighted_scattered_fit_is_no_worse() {
        let coords = crate::common::generate_random_points(200, 2, Some(11));
        let points = Mat::from_fn(coords.nrows(), 3, |i, c| match c {
            2 => pole_near_edge(coords[(i, 0)], coords[(i, 1)]),
            _ => coords[(i, c)],
        });
        let set = PointSet::scattered(2, points).unwrap();
        let settings = EncodeSettings {
            knot_policy: KnotPolicy::ParamAveraged,
            ..EncodeSettings::default()
        };
        let mut spec = ModelSpec {
            degrees: vec![1, 3],
            nctrl: vec![2, 8],
            ..var_spec(1, 2, 2)
        };
        let plain = encode(&set, &spec, &settings).unwrap();
        spec.weighted = true;
        let weighted = encode(&set, &spec, &settings).unwrap();

        let values = set.values(0);
        let plain_err = sse(plain.evaluate_points(set.domain()).as_ref(), values);
        let weighted_err = sse(weighted.evaluate_points(set.domain()).as_ref(), values);
        assert!(weighted_err <= plain_err * (1.0 + 1e-12), "{weighted_err:.3e} vs {plain_err:.3e}");
        assert!(weighted.weights().iter().all(|w| *w > 0.0 && *w <= 1.0));
    }
}
