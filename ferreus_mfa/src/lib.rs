/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API for distributed multivariate functional approximation (MFA).
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Multivariate functional approximation over decomposed domains.
//!
//! A multivariate functional approximation (MFA) replaces a large, possibly
//! scattered, dataset with a compact tensor-product B-spline (or NURBS)
//! model. This crate fits such models block by block: the domain is split
//! with the [`ferreus_blocks`] crate, each block fits its own data with a
//! fixed degree and control point count, and the resulting models are
//! checked against the data and persisted to one shared file.
//!
//! # Features
//! - Any domain dimension, any number of science variables
//! - Separable least-squares fitting of gridded data, full tensor fitting of scattered data
//! - Optional rational (NURBS) weights for sharp features
//! - Uniform or parameter-averaged knot placement, optional regularization
//! - Analytic test signals, CSV ingestion, and error evaluation against samples or exact values
//! - Blocks processed serially or in parallel with rayon, across ranks through a
//!   [`Communicator`](ferreus_blocks::Communicator)
//!
//! # Examples
//!
//! ```
//! use ferreus_mfa::{DomainArgs, FixedPipeline};
//! use ferreus_blocks::SingleProcess;
//! use std::{f64::consts::PI, sync::Arc};
//!
//! // One science variable over [-4π, 4π]: 40 samples, 16 cubic control points
//! let args = DomainArgs::builder(1, 2)
//!     .ndom(40)
//!     .vars_degree(3)
//!     .vars_nctrl(16)
//!     .domain(vec![-4.0 * PI], vec![4.0 * PI])
//!     .build()?;
//!
//! let report = FixedPipeline::builder(args, "sinc")
//!     .build()?
//!     .run(Arc::new(SingleProcess::new()))?;
//! assert!(report.is_success());
//!
//! let block = report.master.block(0).unwrap();
//! let rms = block.error_field().unwrap().stats[0].rms;
//! assert!(rms < 0.01);
//! # Ok::<(), ferreus_mfa::MfaError>(())
//! ```
//!
//! # References
//! 1. T. Peterka, Y. S. Nashed, I. Grindeanu, V. S. Mahadevan, R. Yeh and
//!    X.-M. Tricoche. Foundations of Multivariate Functional Approximation
//!    for Scientific Data. IEEE LDAV, 2018.
//! 2. L. Piegl and W. Tiller. The NURBS Book, 2nd edition. Springer, 1997.
pub mod config;

pub mod progress;

mod analytic;

mod block;

mod common;

mod encode;

mod error;

mod error_eval;

mod input;

mod linalg;

mod pipeline;

mod spline;

mod weights;

pub use {
    analytic::AnalyticFunction,
    block::{read_blocks, write_blocks, Block, BlockState, SEAM_SAMPLES},
    common::{create_evaluation_grid, csv_to_point_array, generate_random_points, point_array_to_csv, seeded_rng},
    config::{DomainArgs, DomainArgsBuilder, EncodeSettings, KnotPolicy, WeightSettings},
    encode::{encode, Encoder, ModelSpec},
    error::{ConfigError, EncodingError, MfaError, Result},
    error_eval::{ErrorField, ErrorNorm, ErrorQuery, ErrorStats},
    input::{Parameterization, PointSet, SampleMetadata},
    pipeline::{FixedPipeline, FixedPipelineBuilder, PipelineReport},
    spline::TensorModel,
};
