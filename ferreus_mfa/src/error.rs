/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines configuration, encoding, and top-level error types for the MFA engine.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use ferreus_blocks::BlocksError;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, MfaError>;

/// Malformed [`crate::DomainArgs`]. Always raised before any block is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("dom_dim must be at least 1, got {0}")]
    DomDim(usize),

    #[error("pt_dim {pt_dim} must be at least dom_dim {dom_dim}")]
    PtDim { dom_dim: usize, pt_dim: usize },

    /// A per-dimension or per-channel vector has the wrong length.
    #[error("{field} has {found} entries, expected {expected}")]
    Length {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    /// A count that must be positive is zero.
    #[error("{field}[{index}] must be positive")]
    NonPositive { field: &'static str, index: usize },

    #[error("domain axis {axis} has invalid extent [{min}, {max}]")]
    Domain { axis: usize, min: f64, max: f64 },

    #[error("scale factor s[{index}] = {value} must be finite and non-zero")]
    Scale { index: usize, value: f64 },

    #[error("{field} = {value} must be finite and non-negative")]
    Negative { field: &'static str, value: f64 },

    #[error("invalid weight settings: {0}")]
    WeightSettings(String),

    /// Vector-valued science variables are fitted as one model.
    #[error("vector-valued variables share one degree and control point count, variable {var} differs from variable 0")]
    VectorShape { var: usize },

    /// Rotation and twist act on dimensions 0 and 1.
    #[error("cannot warp a {dom_dim}-dimensional domain by rot {rot} and twist {twist}; twist lies in [0, 1] and warping needs 2 dimensions")]
    Warp { dom_dim: usize, rot: f64, twist: f64 },
}

/// Failure of one encode call. Never affects other blocks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    /// Fewer input points than control points along a dimension.
    #[error("{model}: dimension {dim} has {nctrl} control points but only {ndom} input points")]
    Underdetermined {
        model: String,
        dim: usize,
        nctrl: usize,
        ndom: usize,
    },

    /// As many input points as control points, and interpolation was not allowed.
    #[error("{model}: dimension {dim} has {nctrl} control points for {nctrl} input points; the fit must be over-determined")]
    ExactlyDetermined {
        model: String,
        dim: usize,
        nctrl: usize,
    },

    /// Scattered input with no more samples than control points in total.
    #[error("{model}: {nctrl_total} control points but only {npts} scattered input points")]
    TooFewPoints {
        model: String,
        nctrl_total: usize,
        npts: usize,
    },

    /// A dimension needs at least `degree + 1` control points.
    #[error("{model}: dimension {dim} has degree {degree} but only {nctrl} control points")]
    DegreeTooHigh {
        model: String,
        dim: usize,
        degree: usize,
        nctrl: usize,
    },

    /// The least-squares system is singular or too ill-conditioned to trust.
    #[error("numerical instability while {context}")]
    NumericalInstability { context: String },

    /// The block has no input samples to fit.
    #[error("no input points to encode")]
    NoData,

    /// Input arrays disagree in shape.
    #[error("shape mismatch: {0}")]
    Shape(String),
}

/// Top-level error type of the MFA engine.
#[derive(Debug, Error)]
pub enum MfaError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Blocks(#[from] BlocksError),

    /// Persisted block state is corrupt or inconsistent.
    #[error("invalid block state: {0}")]
    Serialization(String),

    #[error("unknown analytic function {0:?}")]
    UnknownFunction(String),

    /// Input data cannot be used (wrong dimension, empty block, ...).
    #[error("data error: {0}")]
    Data(String),

    /// The block has not reached the pipeline stage an operation needs.
    #[error("block {gid} has no {missing}")]
    NotReady { gid: usize, missing: &'static str },

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
