/////////////////////////////////////////////////////////////////////////////////////////////
//
// Runs the fixed-degree encoding workflow over a decomposed, distributed domain.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Fixed encoding pipeline
//!
//! [`FixedPipeline`] strings the block operations together on every rank:
//! decompose the domain, build the local blocks, generate analytic data,
//! encode, compute errors, optionally check seams between neighbours,
//! describe, and optionally write all blocks to one shared file.
//!
//! Configuration errors stop the run before any block exists. Failures of
//! individual blocks are collected and reported in the
//! [`PipelineReport`]; a failed block is skipped by later stages while its
//! siblings continue.
use crate::{
    block::{write_blocks, Block},
    config::DomainArgs,
    error::{MfaError, Result},
    error_eval::{ErrorNorm, ErrorQuery},
    progress::ProgressSink,
};
use faer::Mat;
use ferreus_blocks::{
    BlockFailures, BlockProxy, Bounds, Communicator, ContiguousAssigner, DecompositionSettings, Master,
    RegularDecomposer,
};
use std::{path::PathBuf, sync::Arc};

/// Decompose, generate, encode, check, and persist blocks of one analytic dataset.
///
/// Construct with [`FixedPipeline::builder`].
#[derive(Debug, Clone)]
pub struct FixedPipeline {
    args: DomainArgs,
    function: String,
    nblocks: usize,
    divisions: Vec<usize>,
    ghost_overlap: Vec<f64>,
    analytic_error_grid: Option<Vec<usize>>,
    decode_grid: Option<Vec<usize>>,
    output: Option<PathBuf>,
    parallel: bool,
    progress: Option<Arc<dyn ProgressSink>>,
}

/// What one rank produced.
#[derive(Debug)]
pub struct PipelineReport {
    /// The local blocks, encoded where they did not fail.
    pub master: Master<Block>,

    /// [`Block::describe`] output of every local block, by gid.
    pub descriptions: Vec<(usize, String)>,

    /// Decoded grids of every successfully encoded local block, when requested.
    pub decoded: Vec<(usize, Mat<f64>)>,

    /// Every local block failure, by gid.
    pub failures: BlockFailures<MfaError>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl FixedPipeline {
    /// Returns a new [`FixedPipelineBuilder`] for the analytic function `function`.
    pub fn builder(args: DomainArgs, function: impl Into<String>) -> FixedPipelineBuilder {
        FixedPipelineBuilder::new(args, function.into())
    }

    pub fn args(&self) -> &DomainArgs {
        &self.args
    }

    /// Runs every stage on the calling rank. Collective: every rank of
    /// `comm` must call it with the same configuration.
    ///
    /// # Errors
    /// Configuration, decomposition, exchange and file errors. Block-level
    /// failures are returned inside the report instead.
    pub fn run(&self, comm: Arc<dyn Communicator>) -> Result<PipelineReport> {
        let args = &self.args;
        args.validate()?;

        let domain = Bounds::new(args.min.clone(), args.max.clone())?;
        let settings = DecompositionSettings::new(self.nblocks)
            .divisions(self.divisions.clone())
            .ghost_overlap(self.ghost_overlap.clone());
        let decomposer = RegularDecomposer::new(domain, &settings)?;
        let assigner = ContiguousAssigner::new(comm.size(), Some(decomposer.nblocks()));

        let mut master = Master::new(comm);
        decomposer.decompose(&mut master, &assigner, |desc, domain| {
            let mut block = Block::new(desc, domain);
            block.set_progress(self.progress.clone());
            Ok::<_, MfaError>(block)
        })?;
        log::info!(
            "rank {}: {} of {} blocks, divisions {:?}",
            master.rank(),
            master.len(),
            decomposer.nblocks(),
            decomposer.divisions()
        );

        let mut failures = BlockFailures::default();

        self.stage(&mut master, &mut failures, |b, _| {
            b.generate_analytical_data(&self.function, args)
        });
        self.stage(&mut master, &mut failures, |b, _| b.encode(args));
        self.stage(&mut master, &mut failures, |b, _| {
            match &self.analytic_error_grid {
                Some(resolution) => b.evaluate_error(ErrorQuery::Grid(resolution.clone()), &ErrorNorm::ALL, true)?,
                None => b.range_error()?,
            };
            Ok(())
        });

        if args.multiblock {
            self.stage(&mut master, &mut failures, |b, proxy| b.send_seam_samples(proxy));
            master.exchange()?;
            self.stage(&mut master, &mut failures, |b, proxy| b.receive_seam_samples(proxy).map(|_| ()));
        }

        let failed = failures.gids();
        let decoded = match &self.decode_grid {
            Some(resolution) => master
                .iter()
                .filter(|(gid, _)| !failed.contains(gid))
                .map(|(gid, b)| b.decode_grid(resolution).map(|grid| (gid, grid)))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let descriptions: Vec<(usize, String)> = master.iter().map(|(gid, b)| (gid, b.describe())).collect();
        if args.verbose > 0 {
            for (_, text) in &descriptions {
                log::info!("{}", text.trim_end());
            }
        }

        if let Some(path) = &self.output {
            write_blocks(&master, path)?;
        }

        Ok(PipelineReport {
            master,
            descriptions,
            decoded,
            failures,
        })
    }

    /// Runs `f` on every block that has not failed yet and records new failures.
    fn stage<F>(&self, master: &mut Master<Block>, failures: &mut BlockFailures<MfaError>, f: F)
    where
        F: Fn(&mut Block, &mut BlockProxy<'_>) -> Result<()> + Sync,
    {
        let failed = failures.gids();
        let skip = |gid: usize| failed.binary_search(&gid).is_ok();

        let outcome = if self.parallel {
            master.foreach_par(|b, proxy| if skip(b.gid()) { Ok(()) } else { f(b, proxy) })
        } else {
            master.foreach(|b, proxy| if skip(b.gid()) { Ok(()) } else { f(b, proxy) })
        };
        if let Err(new) = outcome {
            for (gid, err) in new.iter() {
                log::warn!("block {gid} failed: {err}");
            }
            failures.merge(new);
        }
    }
}

/// A convenience builder for constructing a [`FixedPipeline`].
///
/// Defaults to a single block, automatic divisions, no ghost overlap,
/// error at the input samples, no decoding, no output file, and a serial
/// block traversal.
#[derive(Debug, Clone)]
pub struct FixedPipelineBuilder {
    pipeline: FixedPipeline,
}

impl FixedPipelineBuilder {
    fn new(args: DomainArgs, function: String) -> Self {
        Self {
            pipeline: FixedPipeline {
                args,
                function,
                nblocks: 1,
                divisions: Vec::new(),
                ghost_overlap: Vec::new(),
                analytic_error_grid: None,
                decode_grid: None,
                output: None,
                parallel: false,
                progress: None,
            },
        }
    }

    pub fn nblocks(mut self, nblocks: usize) -> Self {
        self.pipeline.nblocks = nblocks;
        self
    }

    /// Fixed blocks per axis; 0 entries are chosen automatically.
    pub fn divisions(mut self, divisions: Vec<usize>) -> Self {
        self.pipeline.divisions = divisions;
        self
    }

    pub fn ghost_overlap(mut self, ghost_overlap: Vec<f64>) -> Self {
        self.pipeline.ghost_overlap = ghost_overlap;
        self
    }

    /// Measures error against the analytic function on a grid of `ntest`
    /// points per dimension instead of at the input samples.
    pub fn analytic_error_grid(mut self, ntest: Vec<usize>) -> Self {
        self.pipeline.analytic_error_grid = Some(ntest);
        self
    }

    pub fn decode_grid(mut self, resolution: Vec<usize>) -> Self {
        self.pipeline.decode_grid = Some(resolution);
        self
    }

    /// Writes all blocks to this shared file at the end of the run.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline.output = Some(path.into());
        self
    }

    /// Visits local blocks in parallel with rayon.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.pipeline.parallel = parallel;
        self
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.pipeline.progress = Some(sink);
        self
    }

    /// Validates the arguments and returns the [`FixedPipeline`].
    pub fn build(self) -> Result<FixedPipeline> {
        self.pipeline.args.validate()?;
        Ok(self.pipeline)
    }
}
