/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API for decomposing a domain into blocks and distributing them over ranks.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Block-parallel domain decomposition.
//!
//! This crate splits a bounding box into a Cartesian grid of blocks, assigns
//! the blocks to ranks, and manages the blocks each rank owns. It knows
//! nothing about what a block contains.
//!
//! - [`RegularDecomposer`] computes each block's core region, its
//!   ghost-padded bounds, and its [`Link`] of neighbours, and builds the
//!   local blocks through a caller-supplied factory.
//! - [`ContiguousAssigner`] and [`RoundRobinAssigner`] map global ids to ranks.
//! - [`Master`] owns the local blocks, visits them with `foreach`, routes
//!   neighbour messages with `exchange`, and persists the whole collection to
//!   one shared file with `write` / `read`.
//! - [`Communicator`] abstracts the parallel runtime. [`SingleProcess`] and
//!   the in-process [`ThreadWorld`] are provided.
//!
//! # Examples
//!
//! ```
//! use ferreus_blocks::{
//!     Bounds, BlocksError, ContiguousAssigner, DecompositionSettings, Master,
//!     RegularDecomposer, SingleProcess,
//! };
//! use std::sync::Arc;
//!
//! let domain = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0])?;
//! let decomposer = RegularDecomposer::new(domain, &DecompositionSettings::new(4))?;
//! let assigner = ContiguousAssigner::new(1, Some(4));
//!
//! let mut master = Master::new(Arc::new(SingleProcess::new()));
//! decomposer.decompose(&mut master, &assigner, |desc, _domain| {
//!     Ok::<_, BlocksError>(desc.core.volume())
//! })?;
//!
//! let mut total = 0.0;
//! master
//!     .foreach(|volume, _| {
//!         total += *volume;
//!         Ok::<(), BlocksError>(())
//!     })
//!     .map_err(|f| f.into_inner().remove(0).1)?;
//! assert!((total - 1.0).abs() < 1e-12);
//! # Ok::<(), BlocksError>(())
//! ```
mod assigner;
mod bounds;
mod comm;
mod decomposer;
mod error;
mod io;
mod link;
mod master;
mod rtree;

pub use {
    assigner::{Assigner, ContiguousAssigner, RoundRobinAssigner},
    bounds::Bounds,
    comm::{Communicator, SingleProcess, ThreadComm, ThreadWorld},
    decomposer::{BlockDescriptor, DecompositionSettings, RegularDecomposer},
    error::{BlockFailures, BlocksError, Result},
    link::{Link, Neighbour},
    master::{BlockProxy, Master},
    rtree::BlockLocator,
};
