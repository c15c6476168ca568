/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the error types raised by decomposition, block registration, messaging, and block I/O.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, BlocksError>;

/// Errors that can occur while decomposing a domain, routing blocks between
/// ranks, or reading and writing the shared block file.
#[derive(Debug, Error)]
pub enum BlocksError {
    /// The bounding box is malformed (mismatched lengths, `min > max`, or non-finite).
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    /// The requested block count cannot be laid out over the domain.
    #[error("cannot decompose domain: {0}")]
    Decomposition(String),

    /// A block with this global id is already registered on the local rank.
    #[error("block {gid} is already registered on rank {rank}")]
    DuplicateBlock { gid: usize, rank: usize },

    /// The global id is not registered on (or not owned by) the rank.
    #[error("block {gid} is not known to rank {rank}")]
    UnknownBlock { gid: usize, rank: usize },

    /// A message was addressed to a block that is not in the sender's link.
    #[error("block {target} is not a neighbour of block {gid}")]
    NotANeighbour { gid: usize, target: usize },

    /// The assigner was created with an unknown block count and nothing resolved it.
    #[error("the total number of blocks is unknown")]
    UnresolvedBlockCount,

    /// The assigner's block count disagrees with a persisted file.
    #[error("assigner expects {expected} blocks but {} holds {found}", path.display())]
    BlockCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// Point-to-point or collective communication failed.
    #[error("communication with rank {peer} failed: {reason}")]
    Communication { peer: usize, reason: String },

    /// A block payload could not be encoded or decoded for an exchange.
    #[error("payload for block {gid}: {source}")]
    Payload {
        gid: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Creating, opening, writing or flushing a file failed.
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Error serializing block state to JSON.
    #[error("serializing JSON to {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Error parsing JSON when reading block state.
    #[error("parsing JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The file `format` field does not match.
    #[error("unsupported format {found:?} (expected {expected:?}) in {}", path.display())]
    FormatMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },

    /// The file `version` field does not match.
    #[error("unsupported version {found} (expected {expected}) in {}", path.display())]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// The persisted collection is inconsistent (duplicate or out of range ids).
    #[error("block {gid}: {reason}")]
    BlockState { gid: usize, reason: String },
}

/// Per-block failures collected over one pass of [`crate::Master::foreach`].
///
/// Failures are ordered by global id. A failed block never stops its siblings
/// from being visited.
#[derive(Debug)]
pub struct BlockFailures<E> {
    failures: Vec<(usize, E)>,
}

impl<E> BlockFailures<E> {
    pub(crate) fn from_unsorted(mut failures: Vec<(usize, E)>) -> Self {
        failures.sort_by_key(|(gid, _)| *gid);
        Self { failures }
    }

    /// Number of blocks that failed.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Global ids of the failed blocks, ascending.
    pub fn gids(&self) -> Vec<usize> {
        self.failures.iter().map(|(gid, _)| *gid).collect()
    }

    /// Error recorded for `gid`, if that block failed.
    pub fn get(&self, gid: usize) -> Option<&E> {
        self.failures
            .iter()
            .find(|(g, _)| *g == gid)
            .map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, E)> {
        self.failures.iter()
    }

    pub fn into_inner(self) -> Vec<(usize, E)> {
        self.failures
    }

    /// Appends the failures of another pass, keeping gid order.
    pub fn merge(&mut self, other: BlockFailures<E>) {
        self.failures.extend(other.failures);
        self.failures.sort_by_key(|(gid, _)| *gid);
    }

    pub(crate) fn into_result(self) -> std::result::Result<(), Self> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E> Default for BlockFailures<E> {
    fn default() -> Self {
        Self {
            failures: Vec::new(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for BlockFailures<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} block(s) failed", self.failures.len())?;
        for (gid, err) in &self.failures {
            write!(f, "; block {gid}: {err}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for BlockFailures<E> {}
