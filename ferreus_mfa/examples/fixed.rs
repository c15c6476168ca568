/////////////////////////////////////////////////////////////////////////////////////////////
//
// Encodes a 2D sinc over four blocks on two ranks, writes the blocks and reads them back.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use ferreus_blocks::{Communicator, ContiguousAssigner, ThreadWorld};
use ferreus_mfa::{read_blocks, DomainArgs, FixedPipeline};
use std::{f64::consts::PI, sync::Arc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two science variables over [-4π, 4π]^2, the second with twice the amplitude
    let args = DomainArgs::builder(2, 4)
        .ndom(40)
        .vars_degree(3)
        .vars_nctrl(14)
        .domain(vec![-4.0 * PI; 2], vec![4.0 * PI; 2])
        .f(vec![1.0, 2.0])
        .verbose(1)
        .build()?;

    let output = std::env::temp_dir().join("approx.out");
    let pipeline = FixedPipeline::builder(args, "sinc")
        .nblocks(4)
        .analytic_error_grid(vec![50, 50])
        .output(&output)
        .build()?;

    // Run the fixed encoding on two in-process ranks
    let reports = ThreadWorld::run(2, |comm| pipeline.run(Arc::new(comm)));
    for report in reports {
        let report = report?;
        for (_, text) in &report.descriptions {
            print!("{text}");
        }
        if !report.is_success() {
            eprintln!("{}", report.failures);
        }
    }

    // Read every block back on a single rank
    let loaded = ThreadWorld::run(1, |comm| {
        let size = comm.size();
        read_blocks(Arc::new(comm), &output, &mut ContiguousAssigner::new(size, None))
    });
    for master in loaded {
        let master = master?;
        for (gid, block) in master.iter() {
            let centre: Vec<f64> = block
                .core()
                .min()
                .iter()
                .zip(block.core().max())
                .map(|(a, b)| 0.5 * (a + b))
                .collect();
            let values = block.evaluate(&centre)?;
            let slopes = block.evaluate_derivs(&centre, &[1, 0])?;
            println!("block {gid}: values at core centre {values:?}, x slopes {slopes:?}");
        }
    }

    std::fs::remove_file(&output)?;
    Ok(())
}
