/////////////////////////////////////////////////////////////////////////////////////////////
//
// Per-block adjacency records naming neighbouring blocks, their owners, and their bounds.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{assigner::Assigner, bounds::Bounds, error::Result};
use serde::{Deserialize, Serialize};

/// One entry of a [`Link`]: a neighbouring block referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub gid: usize,
    pub rank: usize,
    pub bounds: Bounds,
}

/// Adjacency of one block, ordered by neighbour global id.
///
/// Neighbours are references by id with cached rank and bounds; resolving a
/// neighbour to a live block goes through the [`crate::Master`] that owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    neighbours: Vec<Neighbour>,
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a neighbour, replacing any previous entry with the same id.
    pub fn add(&mut self, neighbour: Neighbour) {
        match self
            .neighbours
            .binary_search_by_key(&neighbour.gid, |n| n.gid)
        {
            Ok(pos) => self.neighbours[pos] = neighbour,
            Err(pos) => self.neighbours.insert(pos, neighbour),
        }
    }

    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbour> {
        self.neighbours.iter()
    }

    pub fn neighbour(&self, gid: usize) -> Option<&Neighbour> {
        self.neighbours
            .binary_search_by_key(&gid, |n| n.gid)
            .ok()
            .map(|pos| &self.neighbours[pos])
    }

    pub fn contains(&self, gid: usize) -> bool {
        self.neighbour(gid).is_some()
    }

    pub fn gids(&self) -> Vec<usize> {
        self.neighbours.iter().map(|n| n.gid).collect()
    }

    /// Distinct ranks owning at least one neighbour, ascending.
    pub fn ranks(&self) -> Vec<usize> {
        let mut ranks: Vec<usize> = self.neighbours.iter().map(|n| n.rank).collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }

    /// Recomputes cached owner ranks after the block collection has been
    /// redistributed with a different assigner.
    pub fn reassign(&mut self, assigner: &dyn Assigner) -> Result<()> {
        for n in self.neighbours.iter_mut() {
            n.rank = assigner.rank(n.gid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assigner::RoundRobinAssigner;

    fn neighbour(gid: usize, rank: usize) -> Neighbour {
        Neighbour {
            gid,
            rank,
            bounds: Bounds::unit(1).unwrap(),
        }
    }

    #[test]
    fn neighbours_stay_sorted() {
        let mut link = Link::new();
        link.add(neighbour(4, 1));
        link.add(neighbour(1, 0));
        link.add(neighbour(2, 1));
        link.add(neighbour(4, 0));

        assert_eq!(link.gids(), vec![1, 2, 4]);
        assert_eq!(link.neighbour(4).unwrap().rank, 0);
        assert_eq!(link.ranks(), vec![0, 1]);
        assert!(!link.contains(3));
    }

    #[test]
    fn reassign_uses_new_owners() {
        let mut link = Link::new();
        link.add(neighbour(1, 0));
        link.add(neighbour(2, 0));

        let assigner = RoundRobinAssigner::new(2, Some(3));
        link.reassign(&assigner).unwrap();
        assert_eq!(link.neighbour(1).unwrap().rank, 1);
        assert_eq!(link.neighbour(2).unwrap().rank, 0);
    }
}
