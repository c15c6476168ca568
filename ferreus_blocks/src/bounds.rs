/////////////////////////////////////////////////////////////////////////////////////////////
//
// Axis-aligned bounding boxes for the global domain and per-block regions.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::error::{BlocksError, Result};
use serde::{Deserialize, Serialize};

/// Immutable axis-aligned box in `D` dimensions with `min[i] <= max[i]`.
///
/// All containment tests are closed: points on a face belong to the box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl Bounds {
    /// Creates a box from its corners.
    ///
    /// # Errors
    /// [`BlocksError::InvalidBounds`] if the corners are empty, differ in
    /// length, contain non-finite values, or `min[i] > max[i]` for some axis.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferreus_blocks::Bounds;
    ///
    /// let b = Bounds::new(vec![0.0, -1.0], vec![2.0, 1.0]).unwrap();
    /// assert_eq!(b.volume(), 4.0);
    /// assert!(b.contains(&[2.0, 0.0]));
    /// assert!(Bounds::new(vec![1.0], vec![0.0]).is_err());
    /// ```
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Result<Self> {
        if min.is_empty() {
            return Err(BlocksError::InvalidBounds(
                "a box needs at least one dimension".into(),
            ));
        }
        if min.len() != max.len() {
            return Err(BlocksError::InvalidBounds(format!(
                "min has {} entries but max has {}",
                min.len(),
                max.len()
            )));
        }
        for (i, (lo, hi)) in min.iter().zip(max.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(BlocksError::InvalidBounds(format!(
                    "axis {i} has a non-finite extent [{lo}, {hi}]"
                )));
            }
            if lo > hi {
                return Err(BlocksError::InvalidBounds(format!(
                    "axis {i} has min {lo} greater than max {hi}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// The unit box `[0, 1]^dim`.
    pub fn unit(dim: usize) -> Result<Self> {
        Self::new(vec![0.0; dim], vec![1.0; dim])
    }

    pub fn dim(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Width of the box along `axis`.
    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    pub fn volume(&self) -> f64 {
        (0..self.dim()).map(|i| self.extent(i)).product()
    }

    pub fn center(&self) -> Vec<f64> {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(lo, hi)| 0.5 * (lo + hi))
            .collect()
    }

    /// Flat `[mins..., maxs...]` layout used by the spatial index.
    pub fn extents(&self) -> Vec<f64> {
        self.min.iter().chain(self.max.iter()).copied().collect()
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .enumerate()
                .all(|(i, x)| *x >= self.min[i] && *x <= self.max[i])
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        other.dim() == self.dim()
            && (0..self.dim()).all(|i| other.min[i] >= self.min[i] && other.max[i] <= self.max[i])
    }

    /// Intersection of two boxes, or `None` when they are disjoint.
    /// Boxes that only touch produce a degenerate (zero-width) box.
    pub fn intersect(&self, other: &Bounds) -> Option<Bounds> {
        if other.dim() != self.dim() {
            return None;
        }
        let min: Vec<f64> = (0..self.dim()).map(|i| self.min[i].max(other.min[i])).collect();
        let max: Vec<f64> = (0..self.dim()).map(|i| self.max[i].min(other.max[i])).collect();
        if min.iter().zip(max.iter()).any(|(lo, hi)| lo > hi) {
            return None;
        }
        Some(Bounds { min, max })
    }

    /// Box from faces that are already ordered on every axis.
    pub(crate) fn from_faces(min: Vec<f64>, max: Vec<f64>) -> Bounds {
        debug_assert_eq!(min.len(), max.len());
        debug_assert!(min.iter().zip(max.iter()).all(|(lo, hi)| lo <= hi));
        Bounds { min, max }
    }

    /// Pads each face by the given per-axis margins, clamped to `limit`.
    pub(crate) fn padded(&self, lower: &[f64], upper: &[f64], limit: &Bounds) -> Bounds {
        let min = (0..self.dim())
            .map(|i| (self.min[i] - lower[i]).max(limit.min[i]))
            .collect();
        let max = (0..self.dim())
            .map(|i| (self.max[i] + upper[i]).min(limit.max[i]))
            .collect();
        Bounds { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_of_overlapping_boxes() {
        let a = Bounds::new(vec![0.0, 0.0], vec![2.0, 2.0]).unwrap();
        let b = Bounds::new(vec![1.0, -1.0], vec![3.0, 1.5]).unwrap();
        let c = a.intersect(&b).unwrap();
        assert_eq!(c.min(), &[1.0, 0.0]);
        assert_eq!(c.max(), &[2.0, 1.5]);
        assert!(a.contains_bounds(&c));
        assert!(b.contains_bounds(&c));
    }

    #[test]
    fn touching_boxes_intersect_in_a_face() {
        let a = Bounds::new(vec![0.0], vec![1.0]).unwrap();
        let b = Bounds::new(vec![1.0], vec![2.0]).unwrap();
        let face = a.intersect(&b).unwrap();
        assert_eq!(face.volume(), 0.0);

        let far = Bounds::new(vec![3.0], vec![4.0]).unwrap();
        assert!(a.intersect(&far).is_none());
    }

    #[test]
    fn rejects_malformed_corners() {
        assert!(matches!(
            Bounds::new(vec![0.0, 0.0], vec![1.0]),
            Err(BlocksError::InvalidBounds(_))
        ));
        assert!(Bounds::new(vec![], vec![]).is_err());
        assert!(Bounds::new(vec![f64::NAN], vec![1.0]).is_err());
    }

    #[test]
    fn padding_is_clamped() {
        let limit = Bounds::unit(2).unwrap();
        let core = Bounds::new(vec![0.0, 0.5], vec![0.5, 1.0]).unwrap();
        let padded = core.padded(&[0.125, 0.125], &[0.125, 0.125], &limit);
        assert_eq!(padded.min(), &[0.0, 0.375]);
        assert_eq!(padded.max(), &[0.625, 1.0]);
    }
}
