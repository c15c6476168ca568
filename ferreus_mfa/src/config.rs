/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the domain, encoding, and rational weight configuration types and their validation.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Declares the domain, encoding, and rational weight configuration types.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// How internal knots are placed along each dimension.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnotPolicy {
    /// Internal knots evenly spaced in parameter space.
    Uniform,

    /// Internal knots follow the distribution of the input parameters.
    /// Use for non-uniformly spaced or scattered input.
    ParamAveraged,
}

/// Controls the iterative solve for rational (NURBS) control point weights.
///
/// The solve starts from the ordinary B-spline fit and only ever accepts
/// weight updates that reduce the sum of squared residuals.
///
/// ### Default Values
/// - `max_iterations`: `32`
/// - `tolerance`: `1e-6`
/// - `min_weight`: `1e-4`
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSettings {
    /// Maximum number of refinement iterations per curve.
    pub max_iterations: usize,

    /// Minimum relative reduction in squared error for a step to be accepted.
    pub tolerance: f64,

    /// Weights are clamped to `[min_weight, 1]`.
    pub min_weight: f64,
}

impl Default for WeightSettings {
    fn default() -> Self {
        WeightSettings {
            max_iterations: 32,
            tolerance: 1e-6,
            min_weight: 1e-4,
        }
    }
}

/// Numeric options shared by every model fitted in one encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub knot_policy: KnotPolicy,

    /// Tikhonov term added to the diagonal of the normal equations.
    pub regularization: f64,

    pub weight_settings: WeightSettings,

    /// Accept `nctrl == ndom` (interpolation) instead of rejecting it.
    pub allow_interpolation: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        EncodeSettings {
            knot_policy: KnotPolicy::Uniform,
            regularization: 0.0,
            weight_settings: WeightSettings::default(),
            allow_interpolation: false,
        }
    }
}

/// Configuration of the data and models of every block.
///
/// Per-dimension vectors have `dom_dim` entries. `vars_p` and
/// `vars_nctrl_pts` hold one such vector per science variable, and there are
/// `pt_dim - dom_dim` science variables. Construct with
/// [`DomainArgs::builder`], which validates on `build`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainArgs {
    pub dom_dim: usize,
    pub pt_dim: usize,

    /// Input samples per dimension for generated structured data.
    pub ndom_pts: Vec<usize>,

    pub geom_p: Vec<usize>,
    pub vars_p: Vec<Vec<usize>>,
    pub geom_nctrl_pts: Vec<usize>,
    pub vars_nctrl_pts: Vec<Vec<usize>>,

    /// Global domain extent.
    pub min: Vec<f64>,
    pub max: Vec<f64>,

    /// Per-coordinate scale factors, geometry then variables (`pt_dim` entries).
    pub s: Vec<f64>,

    /// Amplitude of each generated science variable.
    pub f: Vec<f64>,

    /// Solve for rational weights on science variables.
    pub weighted: bool,

    /// One model per science variable (`true`), or a single vector-valued
    /// model over all of them using the shape of variable 0 (`false`).
    pub scalar: bool,

    /// Rotation of generated sample coordinates in the plane of dimensions
    /// 0 and 1, in degrees, about the centre of the sample region.
    pub rot: f64,

    /// Extra rotation in `[0, 1]` half turns, growing linearly across the
    /// region along the last dimension.
    pub twist: f64,

    /// Additive noise level for generated data.
    pub n: f64,

    /// Generate over ghost-padded bounds and check seams with neighbours.
    pub multiblock: bool,

    /// 0 = silent, 1 = per-block summaries, 2+ = per-dimension and per-iteration detail.
    pub verbose: u8,

    /// Regular grid (`true`) or scattered random samples (`false`).
    pub structured: bool,

    /// Seed for scattered sampling and noise; `None` seeds from the OS.
    pub rand_seed: Option<u64>,

    pub regularization: f64,

    /// `None` picks uniform knots for structured and averaged knots for scattered data.
    pub knot_policy: Option<KnotPolicy>,

    pub weight_settings: WeightSettings,

    pub allow_interpolation: bool,
}

impl DomainArgs {
    /// Returns a new [`DomainArgsBuilder`] with defaults for the given dimensions.
    pub fn builder(dom_dim: usize, pt_dim: usize) -> DomainArgsBuilder {
        DomainArgsBuilder::new(dom_dim, pt_dim)
    }

    /// Number of science variables.
    pub fn nvars(&self) -> usize {
        self.pt_dim.saturating_sub(self.dom_dim)
    }

    /// Whether generated coordinates are rotated or twisted.
    pub fn is_warped(&self) -> bool {
        self.rot != 0.0 || self.twist != 0.0
    }

    /// Knot policy after resolving the structured/scattered default. Warped
    /// samples count as scattered.
    pub fn resolved_knot_policy(&self) -> KnotPolicy {
        match self.knot_policy {
            Some(policy) => policy,
            None if self.structured && !self.is_warped() => KnotPolicy::Uniform,
            None => KnotPolicy::ParamAveraged,
        }
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            knot_policy: self.resolved_knot_policy(),
            regularization: self.regularization,
            weight_settings: self.weight_settings,
            allow_interpolation: self.allow_interpolation,
        }
    }

    /// Checks every length and value invariant.
    ///
    /// Control point counts are not compared with sample counts here; that
    /// is the encoder's job, since sample counts may come from a file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = self.dom_dim;
        if d < 1 {
            return Err(ConfigError::DomDim(d));
        }
        if self.pt_dim < d {
            return Err(ConfigError::PtDim {
                dom_dim: d,
                pt_dim: self.pt_dim,
            });
        }
        let nvars = self.nvars();

        check_len("ndom_pts", d, self.ndom_pts.len())?;
        check_len("geom_p", d, self.geom_p.len())?;
        check_len("geom_nctrl_pts", d, self.geom_nctrl_pts.len())?;
        check_len("vars_p", nvars, self.vars_p.len())?;
        check_len("vars_nctrl_pts", nvars, self.vars_nctrl_pts.len())?;
        for (p, n) in self.vars_p.iter().zip(self.vars_nctrl_pts.iter()) {
            check_len("vars_p", d, p.len())?;
            check_len("vars_nctrl_pts", d, n.len())?;
        }
        check_len("min", d, self.min.len())?;
        check_len("max", d, self.max.len())?;
        check_len("s", self.pt_dim, self.s.len())?;
        check_len("f", nvars, self.f.len())?;

        check_positive("ndom_pts", &self.ndom_pts)?;
        check_positive("geom_nctrl_pts", &self.geom_nctrl_pts)?;
        for n in &self.vars_nctrl_pts {
            check_positive("vars_nctrl_pts", n)?;
        }

        for axis in 0..d {
            let (min, max) = (self.min[axis], self.max[axis]);
            if !min.is_finite() || !max.is_finite() || min >= max {
                return Err(ConfigError::Domain { axis, min, max });
            }
        }
        if let Some((index, value)) = self
            .s
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s == 0.0)
        {
            return Err(ConfigError::Scale {
                index,
                value: *value,
            });
        }

        if !self.scalar {
            let shape = (self.vars_p.first(), self.vars_nctrl_pts.first());
            if let Some(var) = (1..nvars).find(|k| (self.vars_p.get(*k), self.vars_nctrl_pts.get(*k)) != shape) {
                return Err(ConfigError::VectorShape { var });
            }
        }

        let warp_ok = self.rot.is_finite() && (0.0..=1.0).contains(&self.twist) && (d >= 2 || !self.is_warped());
        if !warp_ok {
            return Err(ConfigError::Warp {
                dom_dim: d,
                rot: self.rot,
                twist: self.twist,
            });
        }

        check_non_negative("n", self.n)?;
        check_non_negative("regularization", self.regularization)?;

        let w = &self.weight_settings;
        if !(w.min_weight > 0.0 && w.min_weight <= 1.0) {
            return Err(ConfigError::WeightSettings(format!(
                "min_weight {} must lie in (0, 1]",
                w.min_weight
            )));
        }
        if !(w.tolerance.is_finite() && w.tolerance >= 0.0) {
            return Err(ConfigError::WeightSettings(format!(
                "tolerance {} must be finite and non-negative",
                w.tolerance
            )));
        }

        Ok(())
    }
}

fn check_len(field: &'static str, expected: usize, found: usize) -> Result<(), ConfigError> {
    if expected != found {
        return Err(ConfigError::Length {
            field,
            expected,
            found,
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, values: &[usize]) -> Result<(), ConfigError> {
    match values.iter().position(|v| *v == 0) {
        Some(index) => Err(ConfigError::NonPositive { field, index }),
        None => Ok(()),
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(())
}

/// A convenience builder for constructing a [`DomainArgs`] instance.
///
/// The builder should be called via the [`DomainArgs::builder`] method.
/// Defaults are degree 1 geometry with `degree + 1` control points, degree 4
/// science variables with 11 control points, 100 samples per dimension over
/// `[-4π, 4π]`, unit scale factors and amplitudes, and no weighting or noise.
///
/// See [`DomainArgs`] for details on each field.
#[derive(Debug, Clone)]
pub struct DomainArgsBuilder {
    args: DomainArgs,
}

impl DomainArgsBuilder {
    fn new(dom_dim: usize, pt_dim: usize) -> Self {
        let nvars = pt_dim.saturating_sub(dom_dim);
        Self {
            args: DomainArgs {
                dom_dim,
                pt_dim,
                ndom_pts: vec![100; dom_dim],
                geom_p: vec![1; dom_dim],
                vars_p: vec![vec![4; dom_dim]; nvars],
                geom_nctrl_pts: vec![2; dom_dim],
                vars_nctrl_pts: vec![vec![11; dom_dim]; nvars],
                min: vec![-4.0 * PI; dom_dim],
                max: vec![4.0 * PI; dom_dim],
                s: vec![1.0; pt_dim],
                f: vec![1.0; nvars],
                weighted: false,
                scalar: true,
                rot: 0.0,
                twist: 0.0,
                n: 0.0,
                multiblock: false,
                verbose: 0,
                structured: true,
                rand_seed: None,
                regularization: 0.0,
                knot_policy: None,
                weight_settings: WeightSettings::default(),
                allow_interpolation: false,
            },
        }
    }

    /// Sets the sample count in every dimension.
    pub fn ndom(mut self, n: usize) -> Self {
        self.args.ndom_pts = vec![n; self.args.dom_dim];
        self
    }

    pub fn ndom_pts(mut self, ndom_pts: Vec<usize>) -> Self {
        self.args.ndom_pts = ndom_pts;
        self
    }

    /// Sets the geometry degree in every dimension and resets its control
    /// point count to `degree + 1`.
    pub fn geom_degree(mut self, degree: usize) -> Self {
        self.args.geom_p = vec![degree; self.args.dom_dim];
        self.args.geom_nctrl_pts = vec![degree + 1; self.args.dom_dim];
        self
    }

    pub fn geom_p(mut self, geom_p: Vec<usize>) -> Self {
        self.args.geom_p = geom_p;
        self
    }

    pub fn geom_nctrl_pts(mut self, geom_nctrl_pts: Vec<usize>) -> Self {
        self.args.geom_nctrl_pts = geom_nctrl_pts;
        self
    }

    /// Sets the degree of every science variable in every dimension.
    pub fn vars_degree(mut self, degree: usize) -> Self {
        self.args.vars_p = vec![vec![degree; self.args.dom_dim]; self.args.nvars()];
        self
    }

    pub fn vars_p(mut self, vars_p: Vec<Vec<usize>>) -> Self {
        self.args.vars_p = vars_p;
        self
    }

    /// Sets the control point count of every science variable in every dimension.
    pub fn vars_nctrl(mut self, nctrl: usize) -> Self {
        self.args.vars_nctrl_pts = vec![vec![nctrl; self.args.dom_dim]; self.args.nvars()];
        self
    }

    pub fn vars_nctrl_pts(mut self, vars_nctrl_pts: Vec<Vec<usize>>) -> Self {
        self.args.vars_nctrl_pts = vars_nctrl_pts;
        self
    }

    /// Sets the global domain extent.
    pub fn domain(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.args.min = min;
        self.args.max = max;
        self
    }

    pub fn s(mut self, s: Vec<f64>) -> Self {
        self.args.s = s;
        self
    }

    pub fn f(mut self, f: Vec<f64>) -> Self {
        self.args.f = f;
        self
    }

    pub fn weighted(mut self, weighted: bool) -> Self {
        self.args.weighted = weighted;
        self
    }

    pub fn scalar(mut self, scalar: bool) -> Self {
        self.args.scalar = scalar;
        self
    }

    /// Rotates generated coordinates by `degrees` in the plane of dimensions 0 and 1.
    pub fn rot(mut self, degrees: f64) -> Self {
        self.args.rot = degrees;
        self
    }

    pub fn twist(mut self, twist: f64) -> Self {
        self.args.twist = twist;
        self
    }

    /// Sets the additive noise level.
    pub fn noise(mut self, n: f64) -> Self {
        self.args.n = n;
        self
    }

    pub fn multiblock(mut self, multiblock: bool) -> Self {
        self.args.multiblock = multiblock;
        self
    }

    pub fn verbose(mut self, verbose: u8) -> Self {
        self.args.verbose = verbose;
        self
    }

    pub fn structured(mut self, structured: bool) -> Self {
        self.args.structured = structured;
        self
    }

    pub fn rand_seed(mut self, seed: u64) -> Self {
        self.args.rand_seed = Some(seed);
        self
    }

    pub fn regularization(mut self, regularization: f64) -> Self {
        self.args.regularization = regularization;
        self
    }

    pub fn knot_policy(mut self, knot_policy: KnotPolicy) -> Self {
        self.args.knot_policy = Some(knot_policy);
        self
    }

    pub fn weight_settings(mut self, weight_settings: WeightSettings) -> Self {
        self.args.weight_settings = weight_settings;
        self
    }

    pub fn allow_interpolation(mut self, allow: bool) -> Self {
        self.args.allow_interpolation = allow;
        self
    }

    /// Validates and returns the [`DomainArgs`].
    pub fn build(self) -> Result<DomainArgs, ConfigError> {
        self.args.validate()?;
        Ok(self.args)
    }
}
