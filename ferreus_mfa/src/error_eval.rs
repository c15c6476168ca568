/////////////////////////////////////////////////////////////////////////////////////////////
//
// Computes pointwise and aggregate approximation errors of fitted models.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Error statistics of fitted science variables.
use faer::{Mat, MatRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate error measures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorNorm {
    /// Largest absolute error (L∞).
    Max,
    L1,
    L2,
    Rms,
}

impl ErrorNorm {
    pub const ALL: [ErrorNorm; 4] = [ErrorNorm::Max, ErrorNorm::L1, ErrorNorm::L2, ErrorNorm::Rms];
}

impl fmt::Display for ErrorNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorNorm::Max => "max",
            ErrorNorm::L1 => "L1",
            ErrorNorm::L2 => "L2",
            ErrorNorm::Rms => "RMS",
        })
    }
}

/// Where the models are evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorQuery {
    /// The block's input samples.
    Samples,

    /// A regular grid over the block core with this many points per dimension.
    /// Requires an analytic ground truth.
    Grid(Vec<usize>),
}

/// Error statistics of one science variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub var: usize,
    pub npts: usize,
    pub max: f64,
    pub l1: f64,
    pub l2: f64,
    pub rms: f64,

    /// Value range of the ground truth.
    pub range: f64,

    /// Whether the measures above are divided by `range`.
    pub normalized: bool,
}

impl ErrorStats {
    pub fn value(&self, norm: ErrorNorm) -> f64 {
        match norm {
            ErrorNorm::Max => self.max,
            ErrorNorm::L1 => self.l1,
            ErrorNorm::L2 => self.l2,
            ErrorNorm::Rms => self.rms,
        }
    }
}

/// Result of one error evaluation, kept on the block.
#[derive(Debug, Clone)]
pub struct ErrorField {
    /// Domain coordinates of the query points.
    pub points: Mat<f64>,

    /// Pointwise absolute error (or error relative to the range when
    /// normalized), one column per science variable.
    pub errors: Mat<f64>,

    pub stats: Vec<ErrorStats>,

    /// Measures requested by the caller.
    pub norms: Vec<ErrorNorm>,
}

impl ErrorField {
    /// Compares `approx` against `truth`, column by column.
    pub fn compute(
        points: Mat<f64>,
        approx: MatRef<'_, f64>,
        truth: MatRef<'_, f64>,
        norms: &[ErrorNorm],
        normalize: bool,
    ) -> Self {
        let (npts, nvars) = (truth.nrows(), truth.ncols());
        let mut errors = Mat::<f64>::zeros(npts, nvars);
        let mut stats = Vec::with_capacity(nvars);

        for var in 0..nvars {
            let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
            for i in 0..npts {
                lo = lo.min(truth[(i, var)]);
                hi = hi.max(truth[(i, var)]);
            }
            let range = if npts > 0 { hi - lo } else { 0.0 };
            let divisor = if normalize && range > 0.0 { range } else { 1.0 };

            let (mut max, mut l1, mut sq) = (0.0f64, 0.0, 0.0);
            for i in 0..npts {
                let e = (approx[(i, var)] - truth[(i, var)]).abs() / divisor;
                errors[(i, var)] = e;
                max = max.max(e);
                l1 += e;
                sq += e * e;
            }

            stats.push(ErrorStats {
                var,
                npts,
                max,
                l1,
                l2: sq.sqrt(),
                rms: if npts > 0 { (sq / npts as f64).sqrt() } else { 0.0 },
                range,
                normalized: normalize,
            });
        }

        Self {
            points,
            errors,
            stats,
            norms: norms.to_vec(),
        }
    }
}
