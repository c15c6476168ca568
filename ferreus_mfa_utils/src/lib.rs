/////////////////////////////////////////////////////////////////////////////////////////////
//
// Re-exports B-spline basis, tensor index, and matrix helpers used across the ferreus_mfa crates.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities for the [`ferreus_mfa`] crate
//!
//! Low level building blocks shared by the encoder and decoder:
//!
//! - Knot span search and Cox-de Boor basis function evaluation, following
//!   algorithms A2.1 and A2.2 of `1`.
//! - Clamped knot vector construction, either uniformly spaced or averaged
//!   from the input parameter distribution (eqs. 9.68 and 9.69 of `1`).
//! - Index arithmetic for tensor-product arrays stored with the first
//!   dimension changing fastest, including unfolding an array into the
//!   curves running along one axis.
//!
//! # References
//! 1. L. Piegl and W. Tiller. The NURBS Book, 2nd edition. Springer, 1997.
mod basis;
mod tensor;
mod utils;

pub use {
    basis::{
        basis_fun_derivs, basis_funs, basis_matrix, find_span, normalize_param,
        param_averaged_knots, uniform_knots, validate_knots, KnotError,
    },
    tensor::{fold, ravel, strides, tensor_indices, unfold, unravel},
    utils::{argsort, get_pointarray_extents, linspace, select_mat_rows},
};
