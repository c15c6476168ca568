/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides closed-form test functions for generating and validating block data.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Closed-form functions used to generate synthetic input and to measure
//! the error of a fitted model against the exact signal.
//!
//! Every function is multiplied by a per-variable amplitude. Functions that
//! only make sense in a fixed dimension report it through
//! [`AnalyticFunction::required_dim`].
//!
//! # References
//! 1. S. R. Marschner and R. J. Lobb. An evaluation of reconstruction filters
//!    for volume rendering. IEEE Visualization, 1994.
//! 2. R. Franke. A critical comparison of some methods for interpolation of
//!    scattered data. Naval Postgraduate School, 1979.
use crate::error::MfaError;
use faer::{Mat, MatRef};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Named analytic test signals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyticFunction {
    Sine,
    Cosine,
    Sinc,
    PolySinc1,
    PolySinc2,
    MarschnerLobb,
    F16,
    F17,
    F18,
    Rastrigin,
    Franke,
}

impl AnalyticFunction {
    pub const ALL: [AnalyticFunction; 11] = [
        AnalyticFunction::Sine,
        AnalyticFunction::Cosine,
        AnalyticFunction::Sinc,
        AnalyticFunction::PolySinc1,
        AnalyticFunction::PolySinc2,
        AnalyticFunction::MarschnerLobb,
        AnalyticFunction::F16,
        AnalyticFunction::F17,
        AnalyticFunction::F18,
        AnalyticFunction::Rastrigin,
        AnalyticFunction::Franke,
    ];

    /// Looks up a function by its short name (`"sinc"`, `"psinc1"`, `"ml"`, ...).
    pub fn from_name(name: &str) -> Result<Self, MfaError> {
        Self::ALL
            .iter()
            .find(|f| f.name() == name)
            .copied()
            .ok_or_else(|| MfaError::UnknownFunction(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalyticFunction::Sine => "sine",
            AnalyticFunction::Cosine => "cosine",
            AnalyticFunction::Sinc => "sinc",
            AnalyticFunction::PolySinc1 => "psinc1",
            AnalyticFunction::PolySinc2 => "psinc2",
            AnalyticFunction::MarschnerLobb => "ml",
            AnalyticFunction::F16 => "f16",
            AnalyticFunction::F17 => "f17",
            AnalyticFunction::F18 => "f18",
            AnalyticFunction::Rastrigin => "rastrigin",
            AnalyticFunction::Franke => "franke",
        }
    }

    /// Domain dimension the function is defined for, if fixed.
    pub fn required_dim(&self) -> Option<usize> {
        match self {
            AnalyticFunction::MarschnerLobb | AnalyticFunction::F17 | AnalyticFunction::F18 => Some(3),
            AnalyticFunction::F16 | AnalyticFunction::Franke => Some(2),
            _ => None,
        }
    }

    pub fn check_dim(&self, dom_dim: usize) -> Result<(), MfaError> {
        match self.required_dim() {
            Some(d) if d != dom_dim => Err(MfaError::Data(format!(
                "{} is defined in {d} dimensions, not {dom_dim}",
                self.name()
            ))),
            _ => Ok(()),
        }
    }

    /// Conventional domain of the function in `dom_dim` dimensions.
    pub fn default_bounds(&self, dom_dim: usize) -> (Vec<f64>, Vec<f64>) {
        let (lo, hi) = match self {
            AnalyticFunction::Sine
            | AnalyticFunction::Cosine
            | AnalyticFunction::Sinc
            | AnalyticFunction::PolySinc1
            | AnalyticFunction::PolySinc2 => (-4.0 * PI, 4.0 * PI),
            AnalyticFunction::MarschnerLobb
            | AnalyticFunction::F16
            | AnalyticFunction::F17
            | AnalyticFunction::F18 => (-1.0, 1.0),
            AnalyticFunction::Rastrigin => (-5.12, 5.12),
            AnalyticFunction::Franke => (0.0, 1.0),
        };
        (vec![lo; dom_dim], vec![hi; dom_dim])
    }

    /// Value of science variable `var` at `x`, scaled by `amplitude`.
    pub fn evaluate(&self, x: &[f64], var: usize, amplitude: f64) -> f64 {
        let value = match self {
            AnalyticFunction::Sine => x.iter().map(|x| x.sin()).product(),
            AnalyticFunction::Cosine => x.iter().map(|x| x.cos()).product(),
            AnalyticFunction::Sinc => x.iter().map(|x| sinc(*x)).product(),
            AnalyticFunction::PolySinc1 => poly_sinc(x, var, false),
            AnalyticFunction::PolySinc2 => poly_sinc(x, var, true),
            AnalyticFunction::MarschnerLobb => marschner_lobb(x[0], x[1], x[2]),
            AnalyticFunction::F16 => f16(x[0], x[1]),
            AnalyticFunction::F17 => f17(x[0], x[1], x[2]),
            AnalyticFunction::F18 => f18(x[0], x[1], x[2]),
            AnalyticFunction::Rastrigin => rastrigin(x),
            AnalyticFunction::Franke => franke(x[0], x[1]),
        };
        amplitude * value
    }

    /// Evaluates every variable at every row of `points` (domain coordinates
    /// only). Returns an `(npts, amplitudes.len())` matrix.
    pub fn evaluate_points(&self, points: MatRef<'_, f64>, amplitudes: &[f64]) -> Mat<f64> {
        let d = points.ncols();
        Mat::from_fn(points.nrows(), amplitudes.len(), |i, var| {
            let x: Vec<f64> = (0..d).map(|k| points[(i, k)]).collect();
            self.evaluate(&x, var, amplitudes[var])
        })
    }
}

impl std::fmt::Display for AnalyticFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// $\sin(x)/x$ with the removable singularity filled in.
#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 { 1.0 } else { x.sin() / x }
}

/// Sum of two sinc bumps centred at $\pm(1, -1, 1, \dots)$.
///
/// <div>
/// $$
/// a = \sum_i (x_i + \sigma_i)^2, \quad b = \sum_i (x_i - \sigma_i)^2, \quad
/// \sigma_i = (-1)^i, \quad c = 1 + 0.1\,k
/// $$
/// </div>
///
/// Variant 1 is $\sin(ca)/a + \sin(cb)/b$; variant 2 uses $\sqrt{a}$ and
/// $\sqrt{b}$. Each variable $k$ gets its own frequency $c$.
fn poly_sinc(x: &[f64], var: usize, radial: bool) -> f64 {
    let c = 1.0 + 0.1 * var as f64;
    let (mut a, mut b) = (0.0, 0.0);
    for (i, xi) in x.iter().enumerate() {
        let sigma = if i % 2 == 0 { 1.0 } else { -1.0 };
        a += (xi + sigma) * (xi + sigma);
        b += (xi - sigma) * (xi - sigma);
    }
    if radial {
        a = a.sqrt();
        b = b.sqrt();
    }
    c * (sinc(c * a) + sinc(c * b))
}

/// Marschner-Lobb signal on $[-1, 1]^3$ with $f_M = 6$, $\alpha = 1/4$.
///
/// <div>
/// $$
/// \rho(x,y,z) = \frac{1 - \sin(\pi z / 2) + \alpha\,(1 + \rho_r(\sqrt{x^2 + y^2}))}{2(1 + \alpha)},
/// \quad \rho_r(r) = \cos\!\left(2\pi f_M \cos\frac{\pi r}{2}\right)
/// $$
/// </div>
fn marschner_lobb(x: f64, y: f64, z: f64) -> f64 {
    const FM: f64 = 6.0;
    const ALPHA: f64 = 0.25;
    let r = (x * x + y * y).sqrt();
    let rho_r = (2.0 * PI * FM * (PI * r / 2.0).cos()).cos();
    (1.0 - (PI * z / 2.0).sin() + ALPHA * (1.0 + rho_r)) / (2.0 * (1.0 + ALPHA))
}

/// $\dfrac{x^4 + y^4 + x^2 y^2 + x y}{x^3 + y^3 + 4}$ on $[-1, 1]^2$.
fn f16(x: f64, y: f64) -> f64 {
    (x.powi(4) + y.powi(4) + x * x * y * y + x * y) / (x.powi(3) + y.powi(3) + 4.0)
}

/// $\sin(\pi x)\cos(\pi y)\,e^{-z^2}$ on $[-1, 1]^3$.
fn f17(x: f64, y: f64, z: f64) -> f64 {
    (PI * x).sin() * (PI * y).cos() * (-z * z).exp()
}

/// $\dfrac{(x + y + z)^3}{1 + x^2 + y^2 + z^2}$ on $[-1, 1]^3$.
fn f18(x: f64, y: f64, z: f64) -> f64 {
    (x + y + z).powi(3) / (1.0 + x * x + y * y + z * z)
}

/// Rastrigin function with $A = 10$: $A n + \sum_i (x_i^2 - A\cos 2\pi x_i)$.
fn rastrigin(x: &[f64]) -> f64 {
    const A: f64 = 10.0;
    A * x.len() as f64 + x.iter().map(|x| x * x - A * (2.0 * PI * x).cos()).sum::<f64>()
}

/// Franke's two-dimensional test function on $[0, 1]^2$.
fn franke(x: f64, y: f64) -> f64 {
    let (nx, ny) = (9.0 * x, 9.0 * y);
    let term1 = 0.75 * (-((nx - 2.0).powi(2) + (ny - 2.0).powi(2)) / 4.0).exp();
    let term2 = 0.75 * (-(nx + 1.0).powi(2) / 49.0 - (ny + 1.0).powi(2) / 10.0).exp();
    let term3 = 0.5 * (-((nx - 7.0).powi(2) + (ny - 3.0).powi(2)) / 4.0).exp();
    let term4 = -0.2 * (-(nx - 4.0).powi(2) - (ny - 7.0).powi(2)).exp();
    term1 + term2 + term3 + term4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for f in AnalyticFunction::ALL {
            assert_eq!(AnalyticFunction::from_name(f.name()).unwrap(), f);
        }
        assert!(matches!(
            AnalyticFunction::from_name("nope"),
            Err(MfaError::UnknownFunction(name)) if name == "nope"
        ));
    }

    #[test]
    fn sinc_is_one_at_the_origin() {
        let f = AnalyticFunction::Sinc;
        assert_eq!(f.evaluate(&[0.0, 0.0], 0, 2.0), 2.0);
        assert!((f.evaluate(&[PI], 0, 1.0)).abs() < 1e-15);
    }

    #[test]
    fn fixed_dimension_functions_are_checked() {
        assert!(AnalyticFunction::MarschnerLobb.check_dim(3).is_ok());
        assert!(AnalyticFunction::MarschnerLobb.check_dim(2).is_err());
        assert!(AnalyticFunction::Sinc.check_dim(4).is_ok());
    }

    #[test]
    fn known_values() {
        assert!((AnalyticFunction::Rastrigin.evaluate(&[0.0, 0.0], 0, 1.0)).abs() < 1e-12);
        let peak = AnalyticFunction::Franke.evaluate(&[0.2, 0.2], 0, 1.0);
        assert!((peak - 1.027355).abs() < 1e-5);
        // Marschner-Lobb stays in [0, 1]
        let ml = AnalyticFunction::MarschnerLobb.evaluate(&[0.3, -0.2, 0.5], 0, 1.0);
        assert!((0.0..=1.0).contains(&ml));
    }

    #[test]
    fn evaluate_points_applies_amplitudes_per_variable() {
        let points = Mat::from_fn(2, 1, |i, _| [0.0, PI / 2.0][i]);
        let values = AnalyticFunction::Sine.evaluate_points(points.as_ref(), &[1.0, -3.0]);
        assert_eq!(values.shape(), (2, 2));
        assert!((values[(1, 0)] - 1.0).abs() < 1e-15);
        assert!((values[(1, 1)] + 3.0).abs() < 1e-15);
    }
}
