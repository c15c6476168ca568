/////////////////////////////////////////////////////////////////////////////////////////////
//
// Integration tests for decomposition geometry and block ownership across ranks.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use ferreus_blocks::{
    Assigner, BlocksError, Bounds, ContiguousAssigner, Communicator, DecompositionSettings,
    Master, RegularDecomposer, ThreadWorld,
};
use std::sync::Arc;

const TOL: f64 = 1e-12;

fn domain_3d() -> Bounds {
    Bounds::new(vec![-1.0, 0.0, 2.0], vec![2.0, 0.7, 2.9]).unwrap()
}

#[test]
fn cores_tile_the_domain() {
    let domain = domain_3d();
    for nblocks in [1, 2, 5, 6, 12, 30] {
        let d = RegularDecomposer::new(domain.clone(), &DecompositionSettings::new(nblocks)).unwrap();
        let cores: Vec<Bounds> = (0..nblocks).map(|gid| d.core(gid)).collect();

        let total: f64 = cores.iter().map(|c| c.volume()).sum();
        assert!((total - domain.volume()).abs() < TOL * domain.volume().max(1.0));

        for (i, a) in cores.iter().enumerate() {
            assert!(domain.contains_bounds(a));
            for b in cores.iter().skip(i + 1) {
                let shared = a.intersect(b).map(|s| s.volume()).unwrap_or(0.0);
                assert!(shared.abs() < TOL, "cores {a:?} and {b:?} overlap");
            }
        }
    }
}

#[test]
fn neighbour_bounds_overlap_by_ghost_width() {
    let ghost = vec![0.2, 0.1];
    let domain = Bounds::new(vec![0.0, 0.0], vec![4.0, 2.0]).unwrap();
    let settings = DecompositionSettings::new(8).ghost_overlap(ghost.clone());
    let d = RegularDecomposer::new(domain, &settings).unwrap();
    let assigner = ContiguousAssigner::new(1, Some(8));

    for gid in 0..8 {
        let desc = d.descriptor(gid, &assigner).unwrap();
        assert!(desc.bounds.contains_bounds(&desc.core));

        let coords = d.gid_to_coords(gid);
        for n in desc.link.iter() {
            let other = d.gid_to_coords(n.gid);
            // face neighbours along exactly one axis
            let differing: Vec<usize> = (0..2).filter(|&a| coords[a] != other[a]).collect();
            if differing.len() != 1 {
                continue;
            }
            let axis = differing[0];
            let overlap = desc.bounds.intersect(&n.bounds).unwrap();
            assert!(
                (overlap.extent(axis) - ghost[axis]).abs() < TOL,
                "blocks {gid} and {} overlap by {} along axis {axis}",
                n.gid,
                overlap.extent(axis)
            );
            // and their link is symmetric
            assert!(d.descriptor(n.gid, &assigner).unwrap().link.contains(gid));
        }
    }
}

#[test]
fn zero_ghost_bounds_touch() {
    let domain = Bounds::new(vec![0.0], vec![1.0]).unwrap();
    let d = RegularDecomposer::new(domain, &DecompositionSettings::new(3)).unwrap();
    let a = d.bounds(0);
    let b = d.bounds(1);
    assert_eq!(a, d.core(0));
    assert_eq!(a.intersect(&b).unwrap().volume(), 0.0);
}

#[test]
fn four_blocks_on_two_ranks_split_contiguously() {
    let domain = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
    let decomposer = RegularDecomposer::new(domain, &DecompositionSettings::new(4)).unwrap();

    let owned = ThreadWorld::run(2, |comm| {
        let size = comm.size();
        let mut master: Master<usize> = Master::new(Arc::new(comm));
        let assigner = ContiguousAssigner::new(size, Some(4));
        decomposer
            .decompose(&mut master, &assigner, |desc, _| Ok::<_, BlocksError>(desc.gid))
            .unwrap()
    });

    assert_eq!(owned[0], vec![0, 1]);
    assert_eq!(owned[1], vec![2, 3]);

    let mut all: Vec<usize> = owned.concat();
    all.sort_unstable();
    assert_eq!(all, vec![0, 1, 2, 3]);

    let assigner = ContiguousAssigner::new(2, Some(4));
    assert_eq!(assigner.local_count(0).unwrap(), 2);
    assert_eq!(assigner.local_count(1).unwrap(), 2);
}

#[test]
fn links_record_remote_owners() {
    let domain = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
    let decomposer = RegularDecomposer::new(domain, &DecompositionSettings::new(4)).unwrap();
    let assigner = ContiguousAssigner::new(2, Some(4));

    let desc = decomposer.descriptor(0, &assigner).unwrap();
    assert_eq!(desc.link.gids(), vec![1, 2, 3]);
    assert_eq!(desc.link.neighbour(1).unwrap().rank, 0);
    assert_eq!(desc.link.neighbour(3).unwrap().rank, 1);
    assert_eq!(desc.link.ranks(), vec![0, 1]);
}
