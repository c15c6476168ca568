/////////////////////////////////////////////////////////////////////////////////////////////
//
// Integration tests for saving, loading, and redistributing encoded blocks.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use ferreus_blocks::{
    Bounds, Communicator, ContiguousAssigner, DecompositionSettings, RegularDecomposer, SingleProcess,
    ThreadWorld,
};
use ferreus_mfa::{read_blocks, Block, BlockState, DomainArgs, FixedPipeline, MfaError};
use std::{f64::consts::PI, path::PathBuf, sync::Arc};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ferreus_mfa_{}_{name}.json", std::process::id()))
}

fn centre(block: &Block) -> Vec<f64> {
    block
        .core()
        .min()
        .iter()
        .zip(block.core().max())
        .map(|(a, b)| 0.5 * (a + b))
        .collect()
}

fn close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= 1e-12 * x.abs().max(1.0))
}

fn args_2d() -> DomainArgs {
    DomainArgs::builder(2, 4)
        .ndom(14)
        .vars_degree(3)
        .vars_nctrl(7)
        .domain(vec![-2.0 * PI, -PI], vec![2.0 * PI, PI])
        .f(vec![1.0, -3.0])
        .build()
        .unwrap()
}

fn single_block(args: &DomainArgs) -> Block {
    let domain = Bounds::new(args.min.clone(), args.max.clone()).unwrap();
    let decomposer = RegularDecomposer::new(domain.clone(), &DecompositionSettings::new(1)).unwrap();
    let desc = decomposer.descriptor(0, &ContiguousAssigner::new(1, Some(1))).unwrap();
    Block::new(&desc, &domain)
}

#[test]
fn blocks_written_on_two_ranks_read_back_on_any_rank_count() {
    let path = temp_path("redistribute");
    let pipeline = FixedPipeline::builder(args_2d(), "sinc")
        .nblocks(4)
        .output(&path)
        .build()
        .unwrap();

    let written: Vec<(usize, Vec<f64>)> = ThreadWorld::run(2, |comm| {
        let report = pipeline.run(Arc::new(comm)).unwrap();
        assert!(report.is_success());
        report
            .master
            .iter()
            .map(|(gid, b)| (gid, b.evaluate(&centre(b)).unwrap()))
            .collect::<Vec<_>>()
    })
    .concat();
    assert_eq!(written.len(), 4);

    for size in [1, 3] {
        let mut read: Vec<(usize, Vec<f64>)> = ThreadWorld::run(size, |comm| {
            let mut assigner = ContiguousAssigner::new(comm.size(), None);
            let master = read_blocks(Arc::new(comm), &path, &mut assigner).unwrap();
            master
                .iter()
                .map(|(gid, b)| {
                    assert!(b.input().is_none());
                    (gid, b.evaluate(&centre(b)).unwrap())
                })
                .collect::<Vec<_>>()
        })
        .concat();
        read.sort_by_key(|(gid, _)| *gid);

        assert_eq!(read.len(), 4);
        for ((g1, v1), (g2, v2)) in written.iter().zip(read.iter()) {
            assert_eq!(g1, g2);
            for (a, b) in v1.iter().zip(v2.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn reading_a_missing_file_fails() {
    let path = temp_path("missing");
    let err = read_blocks(
        Arc::new(SingleProcess::new()),
        &path,
        &mut ContiguousAssigner::new(1, None),
    )
    .unwrap_err();
    assert!(matches!(err, MfaError::Blocks(_)));
}

#[test]
fn saved_state_restores_the_same_models() {
    let args = DomainArgs::builder(2, 4)
        .ndom(14)
        .vars_degree(3)
        .vars_nctrl(7)
        .domain(vec![-2.0 * PI, -PI], vec![2.0 * PI, PI])
        .f(vec![1.0, -3.0])
        .weighted(true)
        .build()
        .unwrap();
    let mut block = single_block(&args);
    block.generate_analytical_data("sinc", &args).unwrap();
    block.encode(&args).unwrap();

    let json = serde_json::to_string(&block.save()).unwrap();
    let state: BlockState = serde_json::from_str(&json).unwrap();
    let restored = Block::load(state).unwrap();

    assert_eq!(restored.gid(), block.gid());
    assert_eq!(restored.core(), block.core());
    assert_eq!(restored.vars().len(), 2);
    for (a, b) in block.vars().iter().zip(restored.vars()) {
        assert_eq!(a.nctrl(), b.nctrl());
        assert!(close(a.weights(), b.weights()));
        for (ka, kb) in a.knots().iter().zip(b.knots()) {
            assert!(close(ka, kb));
        }
        let (pa, pb) = (a.ctrl_pts(), b.ctrl_pts());
        assert_eq!(pa.shape(), pb.shape());
        let (ca, cb): (Vec<f64>, Vec<f64>) = (0..pa.nrows()).map(|i| (pa[(i, 0)], pb[(i, 0)])).unzip();
        assert!(close(&ca, &cb));
    }

    for x in [[0.3, -0.2], [-5.0, 2.5], [6.0, 3.0]] {
        assert!(close(&block.evaluate(&x).unwrap(), &restored.evaluate(&x).unwrap()));
    }
}

#[test]
fn encoding_twice_gives_identical_models() {
    let args = args_2d();
    let mut block = single_block(&args);
    block.generate_analytical_data("sinc", &args).unwrap();

    block.encode(&args).unwrap();
    let first: Vec<_> = block.vars().iter().map(|m| m.ctrl_pts().clone()).collect();
    block.encode(&args).unwrap();
    let second: Vec<_> = block.vars().iter().map(|m| m.ctrl_pts().clone()).collect();

    assert_eq!(first, second);
}
