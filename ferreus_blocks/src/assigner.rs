/////////////////////////////////////////////////////////////////////////////////////////////
//
// Deterministic mappings from block global ids to owning ranks.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Block ownership.
//!
//! An [`Assigner`] maps every global id in `0..nblocks` to exactly one rank in
//! `0..size`. The mapping depends only on `(size, nblocks)`, so every rank can
//! compute it independently. The block count may start out unknown (for
//! example when it is read back from a file) and be resolved later with
//! [`Assigner::set_nblocks`].

use crate::error::{BlocksError, Result};

/// Maps block global ids to owning ranks.
pub trait Assigner: Send + Sync {
    /// Number of ranks blocks are distributed over.
    fn size(&self) -> usize;

    /// Total number of blocks, or `None` while still unknown.
    fn nblocks(&self) -> Option<usize>;

    /// Resolves (or replaces) the total number of blocks.
    fn set_nblocks(&mut self, nblocks: usize);

    /// Rank that owns `gid`.
    fn rank(&self, gid: usize) -> Result<usize>;

    /// Global ids owned by `rank`, ascending.
    fn local_gids(&self, rank: usize) -> Result<Vec<usize>>;

    /// Number of blocks owned by `rank`.
    fn local_count(&self, rank: usize) -> Result<usize> {
        Ok(self.local_gids(rank)?.len())
    }

    /// Resolved block count, or [`BlocksError::UnresolvedBlockCount`].
    fn resolved_nblocks(&self) -> Result<usize> {
        self.nblocks().ok_or(BlocksError::UnresolvedBlockCount)
    }
}

/// Gives each rank one contiguous range of global ids.
///
/// With `nblocks = q * size + r`, the first `r` ranks own `q + 1` blocks and
/// the rest own `q`.
///
/// # Examples
///
/// ```
/// use ferreus_blocks::{Assigner, ContiguousAssigner};
///
/// let assigner = ContiguousAssigner::new(3, Some(7));
/// assert_eq!(assigner.local_gids(0).unwrap(), vec![0, 1, 2]);
/// assert_eq!(assigner.local_gids(1).unwrap(), vec![3, 4]);
/// assert_eq!(assigner.rank(6).unwrap(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContiguousAssigner {
    size: usize,
    nblocks: Option<usize>,
}

impl ContiguousAssigner {
    /// Creates the assigner. A `size` of zero is treated as one rank.
    pub fn new(size: usize, nblocks: Option<usize>) -> Self {
        Self {
            size: size.max(1),
            nblocks,
        }
    }

    fn range(&self, rank: usize) -> Result<std::ops::Range<usize>> {
        let n = self.resolved_nblocks()?;
        if rank >= self.size {
            return Ok(0..0);
        }
        let div = n / self.size;
        let rem = n % self.size;
        let start = rank * div + rank.min(rem);
        let count = div + usize::from(rank < rem);
        Ok(start..start + count)
    }
}

impl Assigner for ContiguousAssigner {
    fn size(&self) -> usize {
        self.size
    }

    fn nblocks(&self) -> Option<usize> {
        self.nblocks
    }

    fn set_nblocks(&mut self, nblocks: usize) {
        self.nblocks = Some(nblocks);
    }

    fn rank(&self, gid: usize) -> Result<usize> {
        let n = self.resolved_nblocks()?;
        if gid >= n {
            return Err(BlocksError::UnknownBlock {
                gid,
                rank: self.size,
            });
        }
        let div = n / self.size;
        let rem = n % self.size;
        let big = rem * (div + 1);
        Ok(if gid < big {
            gid / (div + 1)
        } else {
            rem + (gid - big) / div
        })
    }

    fn local_gids(&self, rank: usize) -> Result<Vec<usize>> {
        Ok(self.range(rank)?.collect())
    }
}

/// Deals global ids out to ranks in turn: `rank = gid % size`.
///
/// # Examples
///
/// ```
/// use ferreus_blocks::{Assigner, RoundRobinAssigner};
///
/// let assigner = RoundRobinAssigner::new(3, Some(7));
/// assert_eq!(assigner.local_gids(0).unwrap(), vec![0, 3, 6]);
/// assert_eq!(assigner.rank(4).unwrap(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRobinAssigner {
    size: usize,
    nblocks: Option<usize>,
}

impl RoundRobinAssigner {
    /// Creates the assigner. A `size` of zero is treated as one rank.
    pub fn new(size: usize, nblocks: Option<usize>) -> Self {
        Self {
            size: size.max(1),
            nblocks,
        }
    }
}

impl Assigner for RoundRobinAssigner {
    fn size(&self) -> usize {
        self.size
    }

    fn nblocks(&self) -> Option<usize> {
        self.nblocks
    }

    fn set_nblocks(&mut self, nblocks: usize) {
        self.nblocks = Some(nblocks);
    }

    fn rank(&self, gid: usize) -> Result<usize> {
        let n = self.resolved_nblocks()?;
        if gid >= n {
            return Err(BlocksError::UnknownBlock {
                gid,
                rank: self.size,
            });
        }
        Ok(gid % self.size)
    }

    fn local_gids(&self, rank: usize) -> Result<Vec<usize>> {
        let n = self.resolved_nblocks()?;
        if rank >= self.size {
            return Ok(Vec::new());
        }
        Ok((rank..n).step_by(self.size).collect())
    }
}
