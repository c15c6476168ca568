/////////////////////////////////////////////////////////////////////////////////////////////
//
// Integration tests for the end-to-end fixed encoding workflow.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use ferreus_blocks::{Communicator, SingleProcess, ThreadWorld};
use ferreus_mfa::{
    progress::{closure_sink, ProgressMsg},
    DomainArgs, EncodingError, FixedPipeline, MfaError, PipelineReport,
};
use std::{
    f64::consts::PI,
    sync::{Arc, Mutex},
};

fn sinc_args(weighted: bool) -> DomainArgs {
    DomainArgs::builder(1, 2)
        .ndom(20)
        .vars_degree(3)
        .vars_nctrl(10)
        .domain(vec![-4.0 * PI], vec![4.0 * PI])
        .weighted(weighted)
        .build()
        .unwrap()
}

fn run_single(args: DomainArgs) -> PipelineReport {
    FixedPipeline::builder(args, "sinc")
        .build()
        .unwrap()
        .run(Arc::new(SingleProcess::new()))
        .unwrap()
}

#[test]
fn sinc_curve_is_encoded_within_tolerance() {
    let report = run_single(sinc_args(false));
    assert!(report.is_success());

    let block = report.master.block(0).unwrap();
    assert_eq!(block.vars().len(), 1);
    assert_eq!(block.vars()[0].nctrl(), &[10]);
    assert!(!block.vars()[0].is_rational());

    let stats = &block.error_field().unwrap().stats[0];
    assert!(stats.normalized);
    assert!(stats.rms < 0.15, "range normalized rms {}", stats.rms);
    assert!(stats.max < 0.25, "range normalized max {}", stats.max);
}

#[test]
fn rational_weights_sharpen_the_peak() {
    let plain = run_single(sinc_args(false));
    let weighted = run_single(sinc_args(true));
    assert!(plain.is_success() && weighted.is_success());

    let plain_block = plain.master.block(0).unwrap();
    let weighted_block = weighted.master.block(0).unwrap();
    assert!(weighted_block.vars()[0].is_rational());
    assert!(weighted_block.geometry().map(|g| !g.is_rational()).unwrap_or(false));

    // sinc peaks at 1 in the middle of the domain
    let plain_peak = (plain_block.evaluate(&[0.0]).unwrap()[0] - 1.0).abs();
    let weighted_peak = (weighted_block.evaluate(&[0.0]).unwrap()[0] - 1.0).abs();
    assert!(weighted_peak < plain_peak, "weighted {weighted_peak} vs plain {plain_peak}");

    let plain_rms = plain_block.error_field().unwrap().stats[0].rms;
    let weighted_rms = weighted_block.error_field().unwrap().stats[0].rms;
    assert!(weighted_rms <= plain_rms * (1.0 + 1e-12));
}

#[test]
fn geometry_only_domains_run_end_to_end() {
    let args = DomainArgs::builder(2, 2)
        .ndom(10)
        .domain(vec![-PI, -PI], vec![PI, PI])
        .build()
        .unwrap();
    let report = FixedPipeline::builder(args, "sine")
        .nblocks(2)
        .decode_grid(vec![3, 3])
        .build()
        .unwrap()
        .run(Arc::new(SingleProcess::new()))
        .unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    for (gid, grid) in &report.decoded {
        let block = report.master.block(*gid).unwrap();
        assert!(block.geometry().is_some());
        assert!(block.vars().is_empty());
        assert!(block.error_field().unwrap().stats.is_empty());
        assert_eq!(grid.shape(), (9, 2));
    }
    assert_eq!(report.decoded.len(), 2);
}

#[test]
fn vector_valued_run_fits_one_model_per_block() {
    let args = DomainArgs::builder(1, 4)
        .ndom(40)
        .vars_degree(3)
        .vars_nctrl(12)
        .domain(vec![-PI], vec![PI])
        .f(vec![1.0, 0.5, -2.0])
        .scalar(false)
        .build()
        .unwrap();
    let report = FixedPipeline::builder(args, "cosine")
        .nblocks(2)
        .analytic_error_grid(vec![25])
        .build()
        .unwrap()
        .run(Arc::new(SingleProcess::new()))
        .unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    for gid in 0..2 {
        let block = report.master.block(gid).unwrap();
        assert_eq!(block.vars().len(), 1);
        assert_eq!(block.vars()[0].channels(), 3);
        let stats = &block.error_field().unwrap().stats;
        assert_eq!(stats.len(), 3);
        assert!(stats.iter().all(|s| s.rms < 1e-3), "{stats:?}");
    }
}

#[test]
fn too_many_control_points_fail_before_any_solve() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    let (sink, handle) = closure_sink(64, move |msg| captured.lock().unwrap().push(msg));

    for (nctrl, exact) in [(20, true), (24, false)] {
        let args = DomainArgs::builder(1, 2)
            .ndom(20)
            .vars_degree(3)
            .vars_nctrl(nctrl)
            .domain(vec![-4.0 * PI], vec![4.0 * PI])
            .verbose(3)
            .build()
            .unwrap();
        let pipeline = FixedPipeline::builder(args, "sinc")
            .progress(Arc::clone(&sink))
            .build()
            .unwrap();
        let report = pipeline.run(Arc::new(SingleProcess::new())).unwrap();

        assert_eq!(report.failures.gids(), vec![0]);
        match report.failures.get(0) {
            Some(MfaError::Encoding(EncodingError::ExactlyDetermined { nctrl: n, .. })) => {
                assert!(exact);
                assert_eq!(*n, nctrl);
            }
            Some(MfaError::Encoding(EncodingError::Underdetermined { nctrl: n, ndom, .. })) => {
                assert!(!exact);
                assert_eq!((*n, *ndom), (nctrl, 20));
            }
            other => panic!("unexpected failure {other:?}"),
        }

        let block = report.master.block(0).unwrap();
        assert!(block.geometry().is_none());
        assert!(block.vars().is_empty());
        assert!(block.error_field().is_none());
    }

    drop(sink);
    handle.join().unwrap();
    let seen = seen.lock().unwrap();
    assert!(!seen.iter().any(|m| matches!(
        m,
        ProgressMsg::DimensionEncoded { .. } | ProgressMsg::BlockEncoded { .. } | ProgressMsg::WeightIteration { .. }
    )));
}

#[test]
fn two_ranks_own_two_contiguous_blocks_each() {
    let args = DomainArgs::builder(2, 3)
        .ndom(12)
        .vars_degree(3)
        .vars_nctrl(6)
        .domain(vec![-PI, -PI], vec![PI, PI])
        .build()
        .unwrap();
    let pipeline = FixedPipeline::builder(args, "cosine").nblocks(4).build().unwrap();

    let owned = ThreadWorld::run(2, |comm| {
        let rank = comm.rank();
        let report = pipeline.run(Arc::new(comm)).unwrap();
        assert!(report.is_success());
        (rank, report.master.gids())
    });

    assert_eq!(owned[0], (0, vec![0, 1]));
    assert_eq!(owned[1], (1, vec![2, 3]));

    let mut all: Vec<usize> = owned.into_iter().flat_map(|(_, gids)| gids).collect();
    all.sort_unstable();
    assert_eq!(all, vec![0, 1, 2, 3]);
}

#[test]
fn every_block_reports_a_description() {
    let args = DomainArgs::builder(2, 3)
        .ndom(10)
        .vars_degree(2)
        .vars_nctrl(5)
        .domain(vec![0.0, 0.0], vec![1.0, 1.0])
        .build()
        .unwrap();
    let report = FixedPipeline::builder(args, "franke")
        .nblocks(2)
        .decode_grid(vec![4, 3])
        .build()
        .unwrap()
        .run(Arc::new(SingleProcess::new()))
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.descriptions.len(), 2);
    for (gid, text) in &report.descriptions {
        assert!(text.starts_with(&format!("block {gid}:")));
        assert!(text.contains("var 0 error (range normalized)"));
    }

    assert_eq!(report.decoded.len(), 2);
    for (_, grid) in &report.decoded {
        assert_eq!(grid.nrows(), 12);
        assert_eq!(grid.ncols(), 3);
    }
}
