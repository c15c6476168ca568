/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the MFA block: data generation, encoding, error evaluation, and persistence.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Block
//!
//! A [`Block`] is the unit of work managed by a
//! [`Master`](ferreus_blocks::Master). It owns the region handed out by the
//! decomposer, its input samples, one geometry model, one model per science
//! variable, and the error field of the last error evaluation. Operations
//! are meant to be called in pipeline order:
//!
//! 1. [`Block::generate_analytical_data`] or [`Block::read_csv_data`]
//! 2. [`Block::encode`]
//! 3. [`Block::range_error`] / [`Block::evaluate_error`]
//! 4. [`Block::describe`], [`Block::save`]
//!
//! Each stage replaces the results of later stages, so a block never mixes
//! models with the samples they were not fitted to.
use crate::{
    analytic::AnalyticFunction,
    common::{add_noise, create_evaluation_grid, csv_to_point_array, random_points_in, seeded_rng, warp_points},
    config::DomainArgs,
    encode::{Encoder, ModelSpec},
    error::{MfaError, Result},
    error_eval::{ErrorField, ErrorNorm, ErrorQuery},
    input::{PointSet, SampleMetadata},
    progress::{ProgressMsg, ProgressSink, Reporter},
    spline::TensorModel,
};
use faer::{Mat, MatRef};
use ferreus_blocks::{Assigner, BlockDescriptor, BlockProxy, Bounds, Communicator, Master};
use serde::{Deserialize, Serialize};
use std::{fmt::Write as _, path::Path, sync::Arc};

/// Samples per dimension of the overlap grid used by the seam check.
pub const SEAM_SAMPLES: usize = 5;

/// One block of the decomposed domain.
#[derive(Debug, Clone)]
pub struct Block {
    gid: usize,
    core: Bounds,
    bounds: Bounds,
    domain: Bounds,
    input: Option<PointSet>,
    function: Option<AnalyticFunction>,
    amplitudes: Vec<f64>,
    geometry: Option<TensorModel>,
    vars: Vec<TensorModel>,
    error: Option<ErrorField>,
    seam_error: Option<f64>,
    progress: Option<Arc<dyn ProgressSink>>,
    verbose: u8,
}

/// Everything needed to restore a [`Block`]'s models on any rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockState {
    pub gid: usize,
    pub core: Bounds,
    pub bounds: Bounds,
    pub domain: Bounds,
    pub function: Option<AnalyticFunction>,
    pub amplitudes: Vec<f64>,
    pub samples: Option<SampleMetadata>,
    pub geometry: Option<TensorModel>,
    pub vars: Vec<TensorModel>,
}

/// Model values sampled over the overlap with one neighbour.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeamSamples {
    points: Vec<Vec<f64>>,
    values: Vec<Vec<f64>>,
}

impl Block {
    /// Creates an empty block for a decomposer descriptor. Usable directly as
    /// the factory of [`RegularDecomposer::decompose`](ferreus_blocks::RegularDecomposer::decompose).
    pub fn new(desc: &BlockDescriptor, domain: &Bounds) -> Self {
        Self {
            gid: desc.gid,
            core: desc.core.clone(),
            bounds: desc.bounds.clone(),
            domain: domain.clone(),
            input: None,
            function: None,
            amplitudes: Vec::new(),
            geometry: None,
            vars: Vec::new(),
            error: None,
            seam_error: None,
            progress: None,
            verbose: 1,
        }
    }

    /// Routes encode and error progress of this block to `sink`.
    pub fn set_progress(&mut self, sink: Option<Arc<dyn ProgressSink>>) {
        self.progress = sink;
    }

    pub fn gid(&self) -> usize {
        self.gid
    }

    pub fn core(&self) -> &Bounds {
        &self.core
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// The global domain.
    pub fn domain(&self) -> &Bounds {
        &self.domain
    }

    pub fn dom_dim(&self) -> usize {
        self.core.dim()
    }

    pub fn input(&self) -> Option<&PointSet> {
        self.input.as_ref()
    }

    pub fn function(&self) -> Option<AnalyticFunction> {
        self.function
    }

    pub fn geometry(&self) -> Option<&TensorModel> {
        self.geometry.as_ref()
    }

    pub fn vars(&self) -> &[TensorModel] {
        &self.vars
    }

    pub fn error_field(&self) -> Option<&ErrorField> {
        self.error.as_ref()
    }

    /// Largest difference with a neighbour's models found by the last seam check.
    pub fn seam_error(&self) -> Option<f64> {
        self.seam_error
    }

    /// Replaces the input samples and drops every later stage.
    pub fn set_input(&mut self, input: PointSet) -> Result<()> {
        if input.dom_dim() != self.dom_dim() {
            return Err(MfaError::Data(format!(
                "block {} is {}-dimensional, input is {}-dimensional",
                self.gid,
                self.dom_dim(),
                input.dom_dim()
            )));
        }
        self.input = Some(input);
        self.function = None;
        self.amplitudes.clear();
        self.reset_models();
        Ok(())
    }

    fn reset_models(&mut self) {
        self.geometry = None;
        self.vars.clear();
        self.error = None;
        self.seam_error = None;
    }

    /// Region samples are drawn from.
    fn sample_region(&self, args: &DomainArgs) -> &Bounds {
        if args.multiblock { &self.bounds } else { &self.core }
    }

    fn reporter(&self) -> Reporter {
        Reporter::new(self.progress.clone(), self.verbose)
    }

    fn check_dim(&self, args: &DomainArgs) -> Result<()> {
        if args.dom_dim != self.dom_dim() {
            return Err(MfaError::Data(format!(
                "arguments are {}-dimensional, block {} is {}-dimensional",
                args.dom_dim,
                self.gid,
                self.dom_dim()
            )));
        }
        Ok(())
    }

    /// Samples the analytic function `name` inside the block.
    ///
    /// Structured data is a grid of `ndom_pts` points per dimension spanning
    /// the sample region; scattered data is the same number of uniform random
    /// points. The region is the core, or the ghost-padded bounds when
    /// `args.multiblock` is set. Noise of level `args.n` is added to the values.
    ///
    /// With `args.rot` or `args.twist` set the coordinates are warped before
    /// the function is sampled. Warped samples no longer line up with the
    /// axes and are kept as scattered data.
    ///
    /// # Errors
    /// - [`MfaError::Configuration`] if `args` is invalid.
    /// - [`MfaError::UnknownFunction`] if `name` is not a known function.
    /// - [`MfaError::Data`] if the function or arguments do not match the block dimension.
    pub fn generate_analytical_data(&mut self, name: &str, args: &DomainArgs) -> Result<()> {
        args.validate()?;
        let function = AnalyticFunction::from_name(name)?;
        self.check_dim(args)?;
        self.verbose = args.verbose;
        function.check_dim(args.dom_dim)?;

        let region = self.sample_region(args);
        let mut rng = seeded_rng(args.rand_seed.map(|s| s.wrapping_add(self.gid as u64)));

        let mut coords = if args.structured {
            let ranges: Vec<(f64, f64)> = region.min().iter().copied().zip(region.max().iter().copied()).collect();
            create_evaluation_grid(&ranges, &args.ndom_pts)
        } else {
            let npts: usize = args.ndom_pts.iter().product();
            random_points_in(region.min(), region.max(), npts, &mut rng)
        };

        if args.is_warped() {
            let centre: Vec<f64> = region
                .min()
                .iter()
                .zip(region.max().iter())
                .map(|(lo, hi)| 0.5 * (lo + hi))
                .collect();
            let last = args.dom_dim - 1;
            let last_range = (region.min()[last], region.max()[last]);
            warp_points(&mut coords, &centre, last_range, args.rot, args.twist);
        }
        let structured = args.structured && !args.is_warped();

        let mut values = function.evaluate_points(coords.as_ref(), &args.f);
        add_noise(&mut values, args.n, &mut rng);

        let points = concat_columns(coords.as_ref(), values.as_ref());
        let input = if structured {
            PointSet::grid(args.dom_dim, points, args.ndom_pts.clone())?
        } else {
            PointSet::scattered(args.dom_dim, points)?
        };

        log::debug!(
            "block {}: generated {} {} samples of {}",
            self.gid,
            input.npts(),
            if structured { "grid" } else { "scattered" },
            function
        );
        self.input = Some(input);
        self.function = Some(function);
        self.amplitudes = args.f.clone();
        self.reset_models();
        Ok(())
    }

    /// Loads scattered samples from a CSV file with `pt_dim` columns,
    /// keeping the rows that fall inside the sample region.
    pub fn read_csv_data<P: AsRef<Path>>(&mut self, path: P, has_headers: bool, args: &DomainArgs) -> Result<()> {
        args.validate()?;
        self.check_dim(args)?;

        let all = csv_to_point_array(path.as_ref(), has_headers, Some(args.pt_dim))?;
        let region = self.sample_region(args);
        let rows: Vec<usize> = (0..all.nrows())
            .filter(|i| {
                let x: Vec<f64> = (0..args.dom_dim).map(|k| all[(*i, k)]).collect();
                region.contains(&x)
            })
            .collect();
        if rows.is_empty() {
            return Err(MfaError::Data(format!(
                "{}: no points inside block {}",
                path.as_ref().display(),
                self.gid
            )));
        }

        let points = ferreus_mfa_utils::select_mat_rows(&all, &rows);
        self.set_input(PointSet::scattered(args.dom_dim, points)?)?;
        log::debug!("block {}: read {} samples", self.gid, rows.len());
        Ok(())
    }

    /// Model specifications for the geometry and the science variables: one
    /// model per variable, or one vector-valued model when `args.scalar` is off.
    pub fn model_specs(args: &DomainArgs) -> Vec<ModelSpec> {
        let d = args.dom_dim;
        let geometry = ModelSpec {
            name: "geometry".to_string(),
            first_column: 0,
            channels: d,
            degrees: args.geom_p.clone(),
            nctrl: args.geom_nctrl_pts.clone(),
            scale: args.s[..d].to_vec(),
            weighted: false,
        };

        let nvars = args.nvars();
        if !args.scalar && nvars > 0 {
            let vars = ModelSpec {
                name: "vars".to_string(),
                first_column: d,
                channels: nvars,
                degrees: args.vars_p[0].clone(),
                nctrl: args.vars_nctrl_pts[0].clone(),
                scale: args.s[d..].to_vec(),
                weighted: args.weighted,
            };
            return vec![geometry, vars];
        }

        std::iter::once(geometry)
            .chain((0..nvars).map(|k| ModelSpec {
                name: format!("var {k}"),
                first_column: d + k,
                channels: 1,
                degrees: args.vars_p[k].clone(),
                nctrl: args.vars_nctrl_pts[k].clone(),
                scale: vec![args.s[d + k]],
                weighted: args.weighted,
            }))
            .collect()
    }

    /// Fits the geometry and every science variable with fixed degrees and
    /// control point counts.
    ///
    /// All models are checked before any is solved, and the block's models are
    /// only replaced once every fit has succeeded.
    ///
    /// # Errors
    /// - [`MfaError::NotReady`] if the block has no input.
    /// - [`MfaError::Encoding`] for count, degree or numerical failures.
    pub fn encode(&mut self, args: &DomainArgs) -> Result<()> {
        args.validate()?;
        self.check_dim(args)?;
        self.verbose = args.verbose;
        let input = self.input.as_ref().ok_or(MfaError::NotReady {
            gid: self.gid,
            missing: "input data",
        })?;
        if input.pt_dim() != args.pt_dim {
            return Err(MfaError::Data(format!(
                "block {} input has {} columns, arguments expect {}",
                self.gid,
                input.pt_dim(),
                args.pt_dim
            )));
        }

        let settings = args.encode_settings();
        let encoder = Encoder::new(input, &settings).progress(self.gid, self.progress.clone(), args.verbose);
        let specs = Self::model_specs(args);
        for spec in &specs {
            encoder.check(spec)?;
        }

        let mut models = specs
            .iter()
            .map(|spec| encoder.encode(spec))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let vars = models.split_off(1);
        let geometry = models.pop();

        let nctrl_total = geometry.iter().chain(vars.iter()).map(|m| m.nctrl_total()).sum();
        self.reporter().emit(1, || ProgressMsg::BlockEncoded {
            gid: self.gid,
            nctrl_total,
        });
        log::info!("block {}: encoded {} models", self.gid, vars.len() + 1);

        self.geometry = geometry;
        self.vars = vars;
        self.error = None;
        self.seam_error = None;
        Ok(())
    }

    fn require_models(&self) -> Result<()> {
        if self.geometry.is_none() {
            return Err(MfaError::NotReady {
                gid: self.gid,
                missing: "encoded model",
            });
        }
        Ok(())
    }

    fn check_coordinates(&self, found: usize) -> Result<()> {
        if found != self.dom_dim() {
            return Err(MfaError::Data(format!(
                "block {} takes {} coordinates, got {found}",
                self.gid,
                self.dom_dim()
            )));
        }
        Ok(())
    }

    /// Values of every science variable at domain coordinates `x`.
    pub fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.require_models()?;
        self.check_coordinates(x.len())?;
        Ok(self.vars.iter().flat_map(|m| m.evaluate(x)).collect())
    }

    /// Partial derivatives of every science variable at domain coordinates
    /// `x`, taken `derivs[k]` times along dimension `k`.
    pub fn evaluate_derivs(&self, x: &[f64], derivs: &[usize]) -> Result<Vec<f64>> {
        self.require_models()?;
        self.check_coordinates(x.len())?;
        self.check_coordinates(derivs.len())?;
        Ok(self.vars.iter().flat_map(|m| m.derivative(x, derivs)).collect())
    }

    /// Evaluates every science variable at the rows of `points`, one column
    /// per variable channel.
    pub fn evaluate_points(&self, points: MatRef<'_, f64>) -> Result<Mat<f64>> {
        self.require_models()?;
        self.check_coordinates(points.ncols())?;
        let per_model: Vec<Mat<f64>> = self.vars.iter().map(|m| m.evaluate_points(points)).collect();
        let columns: Vec<(usize, usize)> = per_model
            .iter()
            .enumerate()
            .flat_map(|(m, values)| (0..values.ncols()).map(move |c| (m, c)))
            .collect();
        Ok(Mat::from_fn(points.nrows(), columns.len(), |i, j| {
            let (m, c) = columns[j];
            per_model[m][(i, c)]
        }))
    }

    /// Compares the models against ground truth at the query points and stores
    /// the result as the block's error field.
    ///
    /// [`ErrorQuery::Samples`] compares against the input samples;
    /// [`ErrorQuery::Grid`] compares against the analytic function the data
    /// was generated from, on a grid over the core. With `normalize` every
    /// measure is divided by the value range of the truth.
    pub fn evaluate_error(&mut self, query: ErrorQuery, norms: &[ErrorNorm], normalize: bool) -> Result<&ErrorField> {
        self.require_models()?;

        let (points, truth) = match &query {
            ErrorQuery::Samples => {
                let input = self.input.as_ref().ok_or(MfaError::NotReady {
                    gid: self.gid,
                    missing: "input data",
                })?;
                let truth = input.columns(input.dom_dim(), input.nvars()).to_owned();
                (input.domain().to_owned(), truth)
            }
            ErrorQuery::Grid(resolution) => {
                let function = self.function.ok_or(MfaError::NotReady {
                    gid: self.gid,
                    missing: "analytic function",
                })?;
                let points = self.core_grid(resolution)?;
                let truth = function.evaluate_points(points.as_ref(), &self.amplitudes);
                (points, truth)
            }
        };

        let approx = self.evaluate_points(points.as_ref())?;
        if approx.ncols() != truth.ncols() {
            return Err(MfaError::Data(format!(
                "block {} models give {} values for {} variables",
                self.gid,
                approx.ncols(),
                truth.ncols()
            )));
        }
        let field = ErrorField::compute(points, approx.as_ref(), truth.as_ref(), norms, normalize);

        let reporter = self.reporter();
        for s in &field.stats {
            reporter.emit(1, || ProgressMsg::ErrorComputed {
                gid: self.gid,
                var: s.var,
                rms: s.rms,
                max: s.max,
            });
        }
        Ok(&*self.error.insert(field))
    }

    /// Range-normalized error of every measure at the input samples.
    pub fn range_error(&mut self) -> Result<&ErrorField> {
        self.evaluate_error(ErrorQuery::Samples, &ErrorNorm::ALL, true)
    }

    fn core_grid(&self, resolution: &[usize]) -> Result<Mat<f64>> {
        if resolution.len() != self.dom_dim() || resolution.contains(&0) {
            return Err(MfaError::Data(format!(
                "grid resolution {resolution:?} does not fit a {}-dimensional block",
                self.dom_dim()
            )));
        }
        let ranges: Vec<(f64, f64)> = self
            .core
            .min()
            .iter()
            .copied()
            .zip(self.core.max().iter().copied())
            .collect();
        Ok(create_evaluation_grid(&ranges, resolution))
    }

    /// Decodes every science variable on a regular grid over the core.
    ///
    /// Rows hold the grid coordinates followed by one value per variable,
    /// dimension 0 changing fastest.
    pub fn decode_grid(&self, resolution: &[usize]) -> Result<Mat<f64>> {
        let points = self.core_grid(resolution)?;
        let values = self.evaluate_points(points.as_ref())?;
        Ok(concat_columns(points.as_ref(), values.as_ref()))
    }

    /// Raw sample values over stored control points and weights.
    pub fn compression_ratio(&self) -> Option<f64> {
        let input = self.input.as_ref()?;
        let stored: usize = self
            .geometry
            .iter()
            .chain(self.vars.iter())
            .map(|m| m.nctrl_total() * (m.channels() + usize::from(m.is_rational())))
            .sum();
        if stored == 0 {
            return None;
        }
        Some((input.npts() * input.pt_dim()) as f64 / stored as f64)
    }

    /// Human readable summary of the block, its models, and its errors.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "block {}: core {:?}..{:?}, bounds {:?}..{:?}",
            self.gid,
            self.core.min(),
            self.core.max(),
            self.bounds.min(),
            self.bounds.max()
        );
        match &self.input {
            Some(input) => {
                let layout = match input.ndom_pts() {
                    Some(ndom) => format!("grid {ndom:?}"),
                    None => "scattered".to_string(),
                };
                let source = self.function.map(|f| f.name()).unwrap_or("external");
                let _ = writeln!(out, "  input: {} points ({layout}) from {source}", input.npts());
            }
            None => {
                let _ = writeln!(out, "  input: none");
            }
        }
        for model in self.geometry.iter().chain(self.vars.iter()) {
            let _ = writeln!(
                out,
                "  {}: degree {:?}, control points {:?} ({} total){}{}",
                model.name(),
                model.degrees(),
                model.nctrl(),
                model.nctrl_total(),
                if model.channels() > 1 && model.name() != "geometry" {
                    format!(", {} channels", model.channels())
                } else {
                    String::new()
                },
                if model.is_rational() { ", rational" } else { "" }
            );
        }
        if let Some(ratio) = self.compression_ratio() {
            let _ = writeln!(out, "  compression ratio: {ratio:.2}");
        }
        if let Some(field) = &self.error {
            for s in &field.stats {
                let measures: Vec<String> = field
                    .norms
                    .iter()
                    .map(|n| format!("{n} {:.3e}", s.value(*n)))
                    .collect();
                let _ = writeln!(
                    out,
                    "  var {} error{}: {}",
                    s.var,
                    if s.normalized { " (range normalized)" } else { "" },
                    measures.join(", ")
                );
            }
        }
        if let Some(seam) = self.seam_error {
            let _ = writeln!(out, "  max seam difference: {seam:.3e}");
        }
        out
    }

    /// Sends model values over the overlap with every neighbour.
    ///
    /// Call inside a `foreach`, then [`Master::exchange`], then
    /// [`Block::receive_seam_samples`] in a second `foreach`.
    pub fn send_seam_samples(&self, proxy: &mut BlockProxy<'_>) -> Result<()> {
        self.require_models()?;
        let targets: Vec<(usize, Bounds)> = proxy
            .link()
            .iter()
            .filter_map(|n| self.bounds.intersect(&n.bounds).map(|overlap| (n.gid, overlap)))
            .collect();

        for (gid, overlap) in targets {
            let ranges: Vec<(f64, f64)> = overlap
                .min()
                .iter()
                .copied()
                .zip(overlap.max().iter().copied())
                .collect();
            let points = create_evaluation_grid(&ranges, &vec![SEAM_SAMPLES; self.dom_dim()]);
            let values = self.evaluate_points(points.as_ref())?;
            let msg = SeamSamples {
                points: rows(points.as_ref()),
                values: rows(values.as_ref()),
            };
            proxy.enqueue(gid, &msg)?;
        }
        Ok(())
    }

    /// Compares received neighbour values with this block's models and
    /// records the largest absolute difference. Returns it.
    pub fn receive_seam_samples(&mut self, proxy: &mut BlockProxy<'_>) -> Result<f64> {
        self.require_models()?;
        let mut worst = 0.0f64;
        for source in proxy.incoming_gids() {
            let Some(msg) = proxy.dequeue::<SeamSamples>(source)? else {
                continue;
            };
            for (x, theirs) in msg.points.iter().zip(msg.values.iter()) {
                let ours = self.evaluate(x)?;
                for (a, b) in ours.iter().zip(theirs.iter()) {
                    worst = worst.max((a - b).abs());
                }
            }
        }
        self.seam_error = Some(worst);
        Ok(worst)
    }

    /// Captures the block's regions and models.
    pub fn save(&self) -> BlockState {
        BlockState {
            gid: self.gid,
            core: self.core.clone(),
            bounds: self.bounds.clone(),
            domain: self.domain.clone(),
            function: self.function,
            amplitudes: self.amplitudes.clone(),
            samples: self.input.as_ref().map(|i| i.metadata()),
            geometry: self.geometry.clone(),
            vars: self.vars.clone(),
        }
    }

    /// Restores a block from [`Block::save`] output.
    ///
    /// Samples are not stored, so the restored block evaluates and describes
    /// its models but has no input until new data is generated or read.
    ///
    /// # Errors
    /// [`MfaError::Serialization`] if any region or model is inconsistent.
    /// Nothing is constructed on failure.
    pub fn load(state: BlockState) -> Result<Self> {
        let invalid = |reason: String| MfaError::Serialization(format!("block {}: {reason}", state.gid));
        let d = state.core.dim();

        if state.bounds.dim() != d || state.domain.dim() != d {
            return Err(invalid("regions disagree in dimension".into()));
        }
        if !state.bounds.contains_bounds(&state.core) {
            return Err(invalid("core is not inside bounds".into()));
        }
        for model in state.geometry.iter().chain(state.vars.iter()) {
            model.validate().map_err(&invalid)?;
            if model.dom_dim() != d {
                return Err(invalid(format!(
                    "{} is {}-dimensional, block is {d}-dimensional",
                    model.name(),
                    model.dom_dim()
                )));
            }
        }
        let nvalues: usize = state.vars.iter().map(|m| m.channels()).sum();
        if state.function.is_some() && nvalues > 0 && state.amplitudes.len() != nvalues {
            return Err(invalid(format!(
                "{} amplitudes for {nvalues} variables",
                state.amplitudes.len()
            )));
        }

        Ok(Self {
            gid: state.gid,
            core: state.core,
            bounds: state.bounds,
            domain: state.domain,
            input: None,
            function: state.function,
            amplitudes: state.amplitudes,
            geometry: state.geometry,
            vars: state.vars,
            error: None,
            seam_error: None,
            progress: None,
            verbose: 1,
        })
    }
}

/// Writes every block of every rank to one shared file. Collective.
pub fn write_blocks<P: AsRef<Path>>(master: &Master<Block>, path: P) -> Result<()> {
    master.write(path, |_, block| block.save())?;
    Ok(())
}

/// Reads the blocks `assigner` gives this rank from a file written by [`write_blocks`].
pub fn read_blocks<P: AsRef<Path>>(
    comm: Arc<dyn Communicator>,
    path: P,
    assigner: &mut dyn Assigner,
) -> Result<Master<Block>> {
    Master::read(comm, path, assigner, |gid, state: BlockState| {
        if state.gid != gid {
            return Err(MfaError::Serialization(format!(
                "record {gid} holds the state of block {}",
                state.gid
            )));
        }
        Block::load(state)
    })
}

fn concat_columns(left: MatRef<'_, f64>, right: MatRef<'_, f64>) -> Mat<f64> {
    let split = left.ncols();
    Mat::from_fn(left.nrows(), split + right.ncols(), |i, j| {
        if j < split { left[(i, j)] } else { right[(i, j - split)] }
    })
}

fn rows(m: MatRef<'_, f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferreus_blocks::{ContiguousAssigner, DecompositionSettings, RegularDecomposer};

    fn single_block(dom_dim: usize, min: f64, max: f64) -> Block {
        let domain = Bounds::new(vec![min; dom_dim], vec![max; dom_dim]).unwrap();
        let decomposer = RegularDecomposer::new(domain.clone(), &DecompositionSettings::new(1)).unwrap();
        let desc = decomposer.descriptor(0, &ContiguousAssigner::new(1, Some(1))).unwrap();
        Block::new(&desc, &domain)
    }

    fn args_1d() -> DomainArgs {
        DomainArgs::builder(1, 2)
            .ndom(40)
            .vars_degree(3)
            .vars_nctrl(12)
            .domain(vec![-1.0], vec![1.0])
            .build()
            .unwrap()
    }

    #[test]
    fn stages_must_run_in_order() {
        let mut block = single_block(1, -1.0, 1.0);
        assert!(matches!(
            block.encode(&args_1d()),
            Err(MfaError::NotReady { missing: "input data", .. })
        ));
        assert!(matches!(block.range_error(), Err(MfaError::NotReady { .. })));
    }

    #[test]
    fn generate_encode_and_check_error() {
        let mut block = single_block(1, -1.0, 1.0);
        let args = args_1d();
        block.generate_analytical_data("sine", &args).unwrap();
        assert_eq!(block.input().unwrap().npts(), 40);

        block.encode(&args).unwrap();
        assert_eq!(block.vars().len(), 1);
        assert_eq!(block.geometry().unwrap().nctrl(), &[2]);

        let rms = block.range_error().unwrap().stats[0].rms;
        assert!(rms < 1e-4);

        let grid_err = block
            .evaluate_error(ErrorQuery::Grid(vec![101]), &[ErrorNorm::Max], false)
            .unwrap()
            .stats[0]
            .max;
        assert!(grid_err < 1e-3);

        let text = block.describe();
        assert!(text.contains("block 0"));
        assert!(text.contains("var 0"));
        assert!(text.contains("compression ratio"));
    }

    #[test]
    fn unknown_function_and_wrong_dimension_are_rejected() {
        let mut block = single_block(1, -1.0, 1.0);
        assert!(matches!(
            block.generate_analytical_data("bogus", &args_1d()),
            Err(MfaError::UnknownFunction(_))
        ));
        assert!(matches!(
            block.generate_analytical_data("franke", &args_1d()),
            Err(MfaError::Data(_))
        ));
    }

    #[test]
    fn decode_grid_spans_the_core() {
        let mut block = single_block(1, -1.0, 1.0);
        let args = args_1d();
        block.generate_analytical_data("cosine", &args).unwrap();
        block.encode(&args).unwrap();

        let grid = block.decode_grid(&[5]).unwrap();
        assert_eq!(grid.shape(), (5, 2));
        assert_eq!(grid[(0, 0)], -1.0);
        assert_eq!(grid[(4, 0)], 1.0);
        assert!((grid[(2, 1)] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn load_rejects_corrupt_state() {
        let mut block = single_block(1, -1.0, 1.0);
        let args = args_1d();
        block.generate_analytical_data("sine", &args).unwrap();
        block.encode(&args).unwrap();

        let mut state = block.save();
        state.core = Bounds::new(vec![-2.0], vec![1.0]).unwrap();
        assert!(matches!(Block::load(state), Err(MfaError::Serialization(_))));
    }

    #[test]
    fn geometry_only_blocks_encode_and_report() {
        let args = DomainArgs::builder(1, 1)
            .ndom(20)
            .domain(vec![-1.0], vec![1.0])
            .build()
            .unwrap();
        let mut block = single_block(1, -1.0, 1.0);
        block.generate_analytical_data("sine", &args).unwrap();
        assert_eq!(block.input().unwrap().nvars(), 0);

        block.encode(&args).unwrap();
        assert!(block.geometry().is_some());
        assert!(block.vars().is_empty());
        assert_eq!(block.evaluate(&[0.3]).unwrap(), Vec::<f64>::new());
        assert_eq!(block.decode_grid(&[4]).unwrap().shape(), (4, 1));
        assert!(block.range_error().unwrap().stats.is_empty());

        let text = block.describe();
        assert!(text.contains("geometry"));
        assert!(!text.contains("var "));
        assert!(Block::load(block.save()).is_ok());
    }

    #[test]
    fn vector_valued_variables_share_one_model() {
        let args = DomainArgs::builder(1, 3)
            .ndom(40)
            .vars_degree(3)
            .vars_nctrl(12)
            .domain(vec![-1.0], vec![1.0])
            .f(vec![1.0, 2.0])
            .scalar(false)
            .build()
            .unwrap();
        let mut block = single_block(1, -1.0, 1.0);
        block.generate_analytical_data("sine", &args).unwrap();
        block.encode(&args).unwrap();

        assert_eq!(block.vars().len(), 1);
        assert_eq!(block.vars()[0].channels(), 2);
        let values = block.evaluate(&[0.3]).unwrap();
        assert_eq!(values.len(), 2);
        assert!((values[0] - 0.3f64.sin()).abs() < 1e-4);
        assert!((values[1] - 2.0 * 0.3f64.sin()).abs() < 1e-4);

        let stats = &block.range_error().unwrap().stats;
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.rms < 1e-4));
        assert!(block.describe().contains("vars: degree [3], control points [12] (12 total), 2 channels"));

        let restored = Block::load(block.save()).unwrap();
        assert_eq!(restored.evaluate(&[0.3]).unwrap(), values);
    }

    #[test]
    fn variable_derivatives_are_decoded() {
        let mut block = single_block(1, -1.0, 1.0);
        let args = args_1d();
        block.generate_analytical_data("sine", &args).unwrap();
        block.encode(&args).unwrap();

        for x in [-0.6, 0.2, 0.7] {
            let slope = block.evaluate_derivs(&[x], &[1]).unwrap()[0];
            assert!((slope - f64::cos(x)).abs() < 1e-3, "x = {x}: {slope}");
        }
        assert!(matches!(block.evaluate_derivs(&[0.2], &[1, 0]), Err(MfaError::Data(_))));
    }

    #[test]
    fn warped_samples_keep_their_distance_from_the_centre() {
        let n = 15;
        let args = DomainArgs::builder(2, 3)
            .ndom(n)
            .vars_degree(2)
            .vars_nctrl(4)
            .domain(vec![0.0, 0.0], vec![1.0, 1.0])
            .rot(10.0)
            .twist(0.1)
            .build()
            .unwrap();
        let mut block = single_block(2, 0.0, 1.0);
        block.generate_analytical_data("sine", &args).unwrap();

        let input = block.input().unwrap();
        assert!(!input.is_structured());
        assert_eq!(input.npts(), n * n);
        let points = input.points();
        let mut moved = 0;
        for r in 0..n * n {
            let (gx, gy) = ((r % n) as f64 / (n - 1) as f64, (r / n) as f64 / (n - 1) as f64);
            let (x, y) = (points[(r, 0)], points[(r, 1)]);
            let before = (gx - 0.5).powi(2) + (gy - 0.5).powi(2);
            let after = (x - 0.5).powi(2) + (y - 0.5).powi(2);
            assert!((before - after).abs() < 1e-12);
            assert_eq!(points[(r, 2)], x.sin() * y.sin());
            if (x - gx).abs() > 1e-6 {
                moved += 1;
            }
        }
        assert!(moved > n * n / 2);

        block.encode(&args).unwrap();
        assert!(block.range_error().unwrap().stats[0].rms < 1e-2);
    }

    #[test]
    fn scattered_samples_are_reproducible() {
        let args = DomainArgs::builder(2, 3)
            .ndom(12)
            .vars_degree(2)
            .vars_nctrl(5)
            .domain(vec![0.0, 0.0], vec![1.0, 1.0])
            .structured(false)
            .rand_seed(3)
            .build()
            .unwrap();

        let mut a = single_block(2, 0.0, 1.0);
        let mut b = single_block(2, 0.0, 1.0);
        a.generate_analytical_data("franke", &args).unwrap();
        b.generate_analytical_data("franke", &args).unwrap();
        assert_eq!(a.input().unwrap().points(), b.input().unwrap().points());
        assert!(!a.input().unwrap().is_structured());

        a.encode(&args).unwrap();
        assert!(a.range_error().unwrap().stats[0].rms < 0.05);
    }
}
