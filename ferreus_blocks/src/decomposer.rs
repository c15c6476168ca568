/////////////////////////////////////////////////////////////////////////////////////////////
//
// Regular Cartesian decomposition of a bounding box into core and ghost-padded block regions.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # decomposer
//!
//! Splits a global [`Bounds`] into a Cartesian grid of blocks.
//!
//! The per-axis block counts ("divisions") multiply to the requested total.
//! Axes fixed by the caller are respected; the remaining factor is split into
//! primes and each prime, largest first, is given to the free axis whose
//! blocks are currently widest. Block `gid` sits at grid coordinates with
//! axis 0 changing fastest.
//!
//! Cores tile the domain exactly: adjacent cores share a face computed by the
//! same expression, so there are no gaps or overlaps. Bounds extend each
//! interior face by half the ghost overlap, so neighbouring bounds overlap by
//! the full ghost width (clamped at the domain boundary).
//!
//! Everything here is a pure function of the domain and settings, so each
//! rank derives its own blocks without communication.

use crate::{
    assigner::Assigner,
    bounds::Bounds,
    error::{BlocksError, Result},
    link::{Link, Neighbour},
    master::Master,
    rtree::BlockLocator,
};
use serde::{Deserialize, Serialize};

/// Requested layout of a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionSettings {
    /// Total number of blocks.
    pub nblocks: usize,

    /// Blocks per axis. Empty, or one entry per axis with `0` meaning "choose".
    pub divisions: Vec<usize>,

    /// Width by which neighbouring bounds overlap along each axis. Empty means no overlap.
    pub ghost_overlap: Vec<f64>,
}

impl DecompositionSettings {
    pub fn new(nblocks: usize) -> Self {
        Self {
            nblocks,
            divisions: Vec::new(),
            ghost_overlap: Vec::new(),
        }
    }

    pub fn divisions(mut self, divisions: Vec<usize>) -> Self {
        self.divisions = divisions;
        self
    }

    pub fn ghost_overlap(mut self, ghost_overlap: Vec<f64>) -> Self {
        self.ghost_overlap = ghost_overlap;
        self
    }
}

/// Everything a block factory needs to construct one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub gid: usize,

    /// Grid coordinates of the block, axis 0 first.
    pub coords: Vec<usize>,

    /// Exclusively owned region.
    pub core: Bounds,

    /// Core padded by the ghost overlap, clamped to the domain.
    pub bounds: Bounds,

    pub link: Link,
}

/// Cartesian decomposition of a box.
#[derive(Debug)]
pub struct RegularDecomposer {
    domain: Bounds,
    divisions: Vec<usize>,
    ghost: Vec<f64>,
    nblocks: usize,
    cores: BlockLocator,
}

impl RegularDecomposer {
    /// Lays out `settings.nblocks` blocks over `domain`.
    ///
    /// # Errors
    /// [`BlocksError::Decomposition`] when `nblocks` is zero, the fixed
    /// divisions do not divide `nblocks`, a prime factor is left with no free
    /// axis to go to, or the per-axis vectors have the wrong length.
    pub fn new(domain: Bounds, settings: &DecompositionSettings) -> Result<Self> {
        let dim = domain.dim();
        let divisions = fill_divisions(dim, settings.nblocks, &settings.divisions, &domain)?;

        let ghost = match settings.ghost_overlap.len() {
            0 => vec![0.0; dim],
            n if n == dim => settings.ghost_overlap.clone(),
            n => {
                return Err(BlocksError::Decomposition(format!(
                    "ghost overlap has {n} entries for a {dim}-dimensional domain"
                )))
            }
        };
        if let Some(g) = ghost.iter().find(|g| !g.is_finite() || **g < 0.0) {
            return Err(BlocksError::Decomposition(format!(
                "ghost overlap {g} must be finite and non-negative"
            )));
        }

        log::debug!(
            "decomposing {:?}..{:?} into {} blocks with divisions {:?}",
            domain.min(),
            domain.max(),
            settings.nblocks,
            divisions
        );

        let mut decomposer = Self {
            domain,
            divisions,
            ghost,
            nblocks: settings.nblocks,
            cores: BlockLocator::new(dim, std::iter::empty()),
        };
        let cores: Vec<Bounds> = (0..decomposer.nblocks).map(|gid| decomposer.core(gid)).collect();
        decomposer.cores = BlockLocator::new(dim, cores.iter().enumerate());
        Ok(decomposer)
    }

    pub fn domain(&self) -> &Bounds {
        &self.domain
    }

    pub fn dim(&self) -> usize {
        self.domain.dim()
    }

    pub fn divisions(&self) -> &[usize] {
        &self.divisions
    }

    pub fn nblocks(&self) -> usize {
        self.nblocks
    }

    pub fn ghost_overlap(&self) -> &[f64] {
        &self.ghost
    }

    pub fn gid_to_coords(&self, gid: usize) -> Vec<usize> {
        let mut rest = gid;
        self.divisions
            .iter()
            .map(|n| {
                let c = rest % n;
                rest /= n;
                c
            })
            .collect()
    }

    pub fn coords_to_gid(&self, coords: &[usize]) -> usize {
        let mut gid = 0;
        let mut stride = 1;
        for (c, n) in coords.iter().zip(self.divisions.iter()) {
            gid += c * stride;
            stride *= n;
        }
        gid
    }

    /// Exclusively owned region of block `gid`.
    pub fn core(&self, gid: usize) -> Bounds {
        let coords = self.gid_to_coords(gid);
        let (min, max): (Vec<f64>, Vec<f64>) = coords
            .iter()
            .enumerate()
            .map(|(axis, &c)| {
                let n = self.divisions[axis];
                (self.face(axis, c), if c + 1 == n { self.domain.max()[axis] } else { self.face(axis, c + 1) })
            })
            .unzip();
        Bounds::from_faces(min, max)
    }

    /// Core of block `gid` padded by half the ghost overlap on every interior face.
    pub fn bounds(&self, gid: usize) -> Bounds {
        let coords = self.gid_to_coords(gid);
        let half: Vec<f64> = self.ghost.iter().map(|g| 0.5 * g).collect();
        let lower: Vec<f64> = coords
            .iter()
            .enumerate()
            .map(|(axis, &c)| if c > 0 { half[axis] } else { 0.0 })
            .collect();
        let upper: Vec<f64> = coords
            .iter()
            .enumerate()
            .map(|(axis, &c)| if c + 1 < self.divisions[axis] { half[axis] } else { 0.0 })
            .collect();
        self.core(gid).padded(&lower, &upper, &self.domain)
    }

    /// Blocks whose cores touch the core of `gid`, including diagonal neighbours.
    pub fn neighbours(&self, gid: usize) -> Vec<usize> {
        self.cores.intersecting(&self.core(gid), Some(gid))
    }

    /// Blocks whose core contains `point`. More than one only on shared faces.
    pub fn locate(&self, point: &[f64]) -> Vec<usize> {
        self.cores.locate(point)
    }

    /// Full descriptor of block `gid`, with neighbour owners taken from `assigner`.
    pub fn descriptor(&self, gid: usize, assigner: &dyn Assigner) -> Result<BlockDescriptor> {
        if gid >= self.nblocks {
            return Err(BlocksError::UnknownBlock {
                gid,
                rank: assigner.size(),
            });
        }
        let mut link = Link::new();
        for neighbour in self.neighbours(gid) {
            link.add(Neighbour {
                gid: neighbour,
                rank: assigner.rank(neighbour)?,
                bounds: self.bounds(neighbour),
            });
        }
        Ok(BlockDescriptor {
            gid,
            coords: self.gid_to_coords(gid),
            core: self.core(gid),
            bounds: self.bounds(gid),
            link,
        })
    }

    /// Builds every block the local rank owns with `factory` and registers it with `master`.
    ///
    /// The factory receives the block's descriptor and the global domain. The
    /// first factory or registration error is returned; blocks built before it
    /// stay registered.
    ///
    /// # Errors
    /// [`BlocksError::Decomposition`] if the assigner's block count or size
    /// disagrees with this decomposition, or whatever the factory returns.
    pub fn decompose<B, E, F>(
        &self,
        master: &mut Master<B>,
        assigner: &dyn Assigner,
        mut factory: F,
    ) -> std::result::Result<Vec<usize>, E>
    where
        E: From<BlocksError>,
        F: FnMut(&BlockDescriptor, &Bounds) -> std::result::Result<B, E>,
    {
        match assigner.nblocks() {
            Some(n) if n == self.nblocks => {}
            Some(n) => {
                return Err(BlocksError::Decomposition(format!(
                    "assigner distributes {n} blocks but the decomposition has {}",
                    self.nblocks
                ))
                .into())
            }
            None => return Err(BlocksError::UnresolvedBlockCount.into()),
        }
        if assigner.size() != master.size() {
            return Err(BlocksError::Decomposition(format!(
                "assigner expects {} ranks but the communicator has {}",
                assigner.size(),
                master.size()
            ))
            .into());
        }

        let gids = assigner.local_gids(master.rank())?;
        for &gid in &gids {
            let descriptor = self.descriptor(gid, assigner)?;
            let block = factory(&descriptor, &self.domain)?;
            master.add(gid, block, descriptor.link)?;
        }
        log::debug!("rank {} built blocks {:?}", master.rank(), gids);
        Ok(gids)
    }

    #[inline(always)]
    fn face(&self, axis: usize, c: usize) -> f64 {
        let lo = self.domain.min()[axis];
        lo + self.domain.extent(axis) * c as f64 / self.divisions[axis] as f64
    }
}

/// Completes the per-axis divisions so that their product is `nblocks`.
fn fill_divisions(
    dim: usize,
    nblocks: usize,
    requested: &[usize],
    domain: &Bounds,
) -> Result<Vec<usize>> {
    if dim == 0 {
        return Err(BlocksError::Decomposition("dimension must be at least one".into()));
    }
    if nblocks == 0 {
        return Err(BlocksError::Decomposition("at least one block is required".into()));
    }

    let mut divisions = match requested.len() {
        0 => vec![0; dim],
        n if n == dim => requested.to_vec(),
        n => {
            return Err(BlocksError::Decomposition(format!(
                "{n} divisions given for a {dim}-dimensional domain"
            )))
        }
    };

    let fixed: usize = divisions.iter().filter(|d| **d > 0).product();
    if nblocks % fixed != 0 {
        return Err(BlocksError::Decomposition(format!(
            "fixed divisions {divisions:?} do not divide {nblocks} blocks"
        )));
    }

    let free: Vec<usize> = (0..dim).filter(|&i| divisions[i] == 0).collect();
    let mut remaining = nblocks / fixed;
    if free.is_empty() {
        if remaining != 1 {
            return Err(BlocksError::Decomposition(format!(
                "divisions {divisions:?} give {fixed} blocks, not {nblocks}"
            )));
        }
        return Ok(divisions);
    }

    for &i in &free {
        divisions[i] = 1;
    }

    let mut factors = Vec::new();
    let mut p = 2;
    while remaining > 1 {
        if p * p > remaining {
            factors.push(remaining);
            break;
        }
        while remaining % p == 0 {
            factors.push(p);
            remaining /= p;
        }
        p += 1;
    }
    factors.sort_unstable_by(|a, b| b.cmp(a));

    for factor in factors {
        // widest block along a free axis; ties go to the lowest axis
        let mut target = free[0];
        let mut widest = f64::NEG_INFINITY;
        for &i in &free {
            let width = domain.extent(i) / divisions[i] as f64;
            if width > widest {
                widest = width;
                target = i;
            }
        }
        divisions[target] *= factor;
    }

    Ok(divisions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assigner::ContiguousAssigner, comm::SingleProcess};
    use std::sync::Arc;

    fn square(side: f64) -> Bounds {
        Bounds::new(vec![0.0, 0.0], vec![side, side]).unwrap()
    }

    #[test]
    fn divisions_multiply_to_block_count() {
        let domain = Bounds::new(vec![0.0, 0.0, 0.0], vec![4.0, 2.0, 1.0]).unwrap();
        for n in 1..40 {
            let d = RegularDecomposer::new(domain.clone(), &DecompositionSettings::new(n)).unwrap();
            assert_eq!(d.divisions().iter().product::<usize>(), n);
        }

        let d = RegularDecomposer::new(domain.clone(), &DecompositionSettings::new(8)).unwrap();
        assert_eq!(d.divisions(), &[4, 2, 1]);
    }

    #[test]
    fn fixed_divisions_are_respected() {
        let settings = DecompositionSettings::new(6).divisions(vec![0, 3]);
        let d = RegularDecomposer::new(square(1.0), &settings).unwrap();
        assert_eq!(d.divisions(), &[2, 3]);

        let bad = DecompositionSettings::new(5).divisions(vec![0, 3]);
        assert!(matches!(
            RegularDecomposer::new(square(1.0), &bad),
            Err(BlocksError::Decomposition(_))
        ));
        let exact = DecompositionSettings::new(4).divisions(vec![2, 3]);
        assert!(RegularDecomposer::new(square(1.0), &exact).is_err());
    }

    #[test]
    fn zero_blocks_is_an_error() {
        assert!(matches!(
            RegularDecomposer::new(square(1.0), &DecompositionSettings::new(0)),
            Err(BlocksError::Decomposition(_))
        ));
    }

    #[test]
    fn coordinates_round_trip() {
        let d = RegularDecomposer::new(square(1.0), &DecompositionSettings::new(6)).unwrap();
        for gid in 0..6 {
            assert_eq!(d.coords_to_gid(&d.gid_to_coords(gid)), gid);
        }
    }

    #[test]
    fn neighbours_include_diagonals() {
        let settings = DecompositionSettings::new(9).divisions(vec![3, 3]);
        let d = RegularDecomposer::new(square(3.0), &settings).unwrap();
        assert_eq!(d.neighbours(4), vec![0, 1, 2, 3, 5, 6, 7, 8]);
        assert_eq!(d.neighbours(0), vec![1, 3, 4]);
    }

    #[test]
    fn cores_of_a_narrow_domain_stay_ordered_and_distinct() {
        let domain = Bounds::new(vec![1.0], vec![1.0 + 1e-12]).unwrap();
        let d = RegularDecomposer::new(domain.clone(), &DecompositionSettings::new(7)).unwrap();
        let cores: Vec<Bounds> = (0..7).map(|gid| d.core(gid)).collect();
        for (gid, core) in cores.iter().enumerate() {
            assert!(core.min()[0] <= core.max()[0]);
            assert!(domain.contains_bounds(core));
            assert_ne!(core, &domain, "core {gid} fell back to the whole domain");
        }
        assert_eq!(cores[0].min()[0], 1.0);
        assert_eq!(cores[6].max()[0], 1.0 + 1e-12);
        for pair in cores.windows(2) {
            assert_eq!(pair[0].max()[0], pair[1].min()[0]);
        }
    }

    #[test]
    fn points_are_located_in_their_cores() {
        let settings = DecompositionSettings::new(4).divisions(vec![2, 2]);
        let d = RegularDecomposer::new(square(2.0), &settings).unwrap();
        assert_eq!(d.locate(&[0.5, 1.5]), vec![2]);
        assert_eq!(d.locate(&[1.0, 0.5]), vec![0, 1]);
        assert!(d.locate(&[2.5, 0.5]).is_empty());
    }

    #[test]
    fn ghost_bounds_are_clamped_to_domain() {
        let settings = DecompositionSettings::new(2)
            .divisions(vec![2, 1])
            .ghost_overlap(vec![0.5, 0.5]);
        let d = RegularDecomposer::new(square(2.0), &settings).unwrap();
        let b0 = d.bounds(0);
        assert_eq!(b0.min(), &[0.0, 0.0]);
        assert_eq!(b0.max(), &[1.25, 2.0]);
        let b1 = d.bounds(1);
        assert_eq!(b1.min(), &[0.75, 0.0]);
    }

    #[test]
    fn decompose_registers_local_blocks() {
        let d = RegularDecomposer::new(square(1.0), &DecompositionSettings::new(4)).unwrap();
        let mut master: Master<usize> = Master::new(Arc::new(SingleProcess::new()));
        let assigner = ContiguousAssigner::new(1, Some(4));

        let gids = d
            .decompose(&mut master, &assigner, |desc, _| {
                Ok::<_, BlocksError>(desc.link.len())
            })
            .unwrap();

        assert_eq!(gids, vec![0, 1, 2, 3]);
        assert_eq!(master.block(0), Some(&3));

        let wrong = ContiguousAssigner::new(1, Some(5));
        let mut other: Master<usize> = Master::new(Arc::new(SingleProcess::new()));
        assert!(d
            .decompose(&mut other, &wrong, |_, _| Ok::<_, BlocksError>(0))
            .is_err());
    }
}
