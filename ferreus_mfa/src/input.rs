/////////////////////////////////////////////////////////////////////////////////////////////
//
// Holds a block's input samples and maps their domain coordinates into parameter space.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Input samples of one block.
//!
//! A [`PointSet`] stores one row per sample: `dom_dim` domain coordinates
//! followed by one column per science variable. Samples are either a
//! structured grid, stored with dimension 0 changing fastest, or scattered.
//! Parameters in `[0, 1]` are derived from the bounding box of the domain
//! coordinates, and the same box is carried by every fitted model so that
//! evaluation maps coordinates the same way.
use crate::error::EncodingError;
use faer::{Mat, MatRef};
use ferreus_mfa_utils::{get_pointarray_extents, normalize_param};
use serde::{Deserialize, Serialize};

/// Parameters of the samples, in `[0, 1]` per dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameterization {
    /// One parameter vector per dimension, one entry per grid line.
    Grid(Vec<Vec<f64>>),

    /// One row per sample, one column per dimension.
    Scattered(Mat<f64>),
}

/// Layout summary kept with a saved block so its samples can be regenerated or checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub npts: usize,
    pub ndom_pts: Option<Vec<usize>>,
    pub param_min: Vec<f64>,
    pub param_max: Vec<f64>,
}

/// Input samples of one block.
#[derive(Debug, Clone)]
pub struct PointSet {
    dom_dim: usize,
    points: Mat<f64>,
    ndom_pts: Option<Vec<usize>>,
    param_min: Vec<f64>,
    param_max: Vec<f64>,
    params: Parameterization,
}

impl PointSet {
    /// Creates a structured point set. `points` must hold the full grid with
    /// dimension 0 changing fastest.
    pub fn grid(dom_dim: usize, points: Mat<f64>, ndom_pts: Vec<usize>) -> Result<Self, EncodingError> {
        check_columns(dom_dim, &points)?;
        if ndom_pts.len() != dom_dim {
            return Err(EncodingError::Shape(format!(
                "grid has {} dimensions, expected {dom_dim}",
                ndom_pts.len()
            )));
        }
        let total: usize = ndom_pts.iter().product();
        if total != points.nrows() {
            return Err(EncodingError::Shape(format!(
                "grid {ndom_pts:?} needs {total} points, found {}",
                points.nrows()
            )));
        }

        let (param_min, param_max) = coordinate_box(dom_dim, &points);

        // Coordinates along each axis are read from the first grid line.
        let mut stride = 1;
        let per_dim = (0..dom_dim)
            .map(|k| {
                let params = (0..ndom_pts[k])
                    .map(|i| normalize_param(points[(i * stride, k)], param_min[k], param_max[k]))
                    .collect();
                stride *= ndom_pts[k];
                params
            })
            .collect();

        Ok(Self {
            dom_dim,
            points,
            ndom_pts: Some(ndom_pts),
            param_min,
            param_max,
            params: Parameterization::Grid(per_dim),
        })
    }

    /// Creates a scattered point set.
    pub fn scattered(dom_dim: usize, points: Mat<f64>) -> Result<Self, EncodingError> {
        check_columns(dom_dim, &points)?;
        let (param_min, param_max) = coordinate_box(dom_dim, &points);

        let params = Mat::from_fn(points.nrows(), dom_dim, |i, k| {
            normalize_param(points[(i, k)], param_min[k], param_max[k])
        });

        Ok(Self {
            dom_dim,
            points,
            ndom_pts: None,
            param_min,
            param_max,
            params: Parameterization::Scattered(params),
        })
    }

    pub fn dom_dim(&self) -> usize {
        self.dom_dim
    }

    pub fn pt_dim(&self) -> usize {
        self.points.ncols()
    }

    pub fn nvars(&self) -> usize {
        self.pt_dim() - self.dom_dim
    }

    pub fn npts(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_structured(&self) -> bool {
        self.ndom_pts.is_some()
    }

    /// Grid shape for structured samples.
    pub fn ndom_pts(&self) -> Option<&[usize]> {
        self.ndom_pts.as_deref()
    }

    /// All columns: domain coordinates then variables.
    pub fn points(&self) -> &Mat<f64> {
        &self.points
    }

    /// Domain coordinate columns.
    pub fn domain(&self) -> MatRef<'_, f64> {
        self.points.as_ref().subcols(0, self.dom_dim)
    }

    /// Columns `first..first + count` counted from the first domain column.
    pub fn columns(&self, first: usize, count: usize) -> MatRef<'_, f64> {
        self.points.as_ref().subcols(first, count)
    }

    /// Value column of science variable `var`.
    pub fn values(&self, var: usize) -> MatRef<'_, f64> {
        self.points.as_ref().subcols(self.dom_dim + var, 1)
    }

    pub fn param_min(&self) -> &[f64] {
        &self.param_min
    }

    pub fn param_max(&self) -> &[f64] {
        &self.param_max
    }

    pub fn params(&self) -> &Parameterization {
        &self.params
    }

    /// Domain coordinates of sample `i`.
    pub fn coords(&self, i: usize) -> Vec<f64> {
        (0..self.dom_dim).map(|k| self.points[(i, k)]).collect()
    }

    pub fn metadata(&self) -> SampleMetadata {
        SampleMetadata {
            npts: self.npts(),
            ndom_pts: self.ndom_pts.clone(),
            param_min: self.param_min.clone(),
            param_max: self.param_max.clone(),
        }
    }
}

fn check_columns(dom_dim: usize, points: &Mat<f64>) -> Result<(), EncodingError> {
    if points.nrows() == 0 {
        return Err(EncodingError::NoData);
    }
    if dom_dim == 0 || points.ncols() < dom_dim {
        return Err(EncodingError::Shape(format!(
            "{} columns cannot hold {dom_dim} domain coordinates",
            points.ncols()
        )));
    }
    Ok(())
}

fn coordinate_box(dom_dim: usize, points: &Mat<f64>) -> (Vec<f64>, Vec<f64>) {
    let domain = points.as_ref().subcols(0, dom_dim).to_owned();
    let extents = get_pointarray_extents(&domain);
    (extents[..dom_dim].to_vec(), extents[dom_dim..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2x3() -> Mat<f64> {
        // x fastest, then y
        let xs = [0.0, 2.0];
        let ys = [10.0, 11.0, 14.0];
        Mat::from_fn(6, 3, |r, c| match c {
            0 => xs[r % 2],
            1 => ys[r / 2],
            _ => r as f64,
        })
    }

    #[test]
    fn grid_parameters_follow_each_axis() {
        let set = PointSet::grid(2, grid_2x3(), vec![2, 3]).unwrap();
        assert!(set.is_structured());
        assert_eq!(set.nvars(), 1);
        assert_eq!(set.param_min(), &[0.0, 10.0]);
        assert_eq!(set.param_max(), &[2.0, 14.0]);

        match set.params() {
            Parameterization::Grid(p) => {
                assert_eq!(p[0], vec![0.0, 1.0]);
                assert_eq!(p[1], vec![0.0, 0.25, 1.0]);
            }
            Parameterization::Scattered(_) => panic!("expected grid parameters"),
        }
    }

    #[test]
    fn grid_size_must_match_rows() {
        let err = PointSet::grid(2, grid_2x3(), vec![2, 2]).unwrap_err();
        assert!(matches!(err, EncodingError::Shape(_)));
    }

    #[test]
    fn scattered_parameters_use_the_bounding_box() {
        let points = Mat::from_fn(3, 2, |r, c| if c == 0 { [1.0, 3.0, 2.0][r] } else { 0.0 });
        let set = PointSet::scattered(1, points).unwrap();
        match set.params() {
            Parameterization::Scattered(p) => {
                assert_eq!(p[(0, 0)], 0.0);
                assert_eq!(p[(1, 0)], 1.0);
                assert_eq!(p[(2, 0)], 0.5);
            }
            Parameterization::Grid(_) => panic!("expected scattered parameters"),
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = PointSet::scattered(1, Mat::zeros(0, 2)).unwrap_err();
        assert_eq!(err, EncodingError::NoData);
    }
}
