/////////////////////////////////////////////////////////////////////////////////////////////
//
// Wraps the `rstar` crate to locate blocks by point and by overlapping region.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # rtree
//!
//! Spatial index over block regions.
//!
//! Boxes are indexed with an R-tree for one to three dimensions. rstar has no
//! 1D support, so intervals are embedded as 2D rectangles with `y` in `[0, 1]`.
//! Higher dimensions fall back to a linear scan.

use crate::bounds::Bounds;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

type IndexedRect<const D: usize> = GeomWithData<Rectangle<[f64; D]>, usize>;

enum NdRTree {
    D1(RTree<IndexedRect<2>>), // 1D embedded in 2D
    D2(RTree<IndexedRect<2>>),
    D3(RTree<IndexedRect<3>>),
    Linear(Vec<(usize, Bounds)>),
}

/// Answers which blocks contain a point or intersect a region.
pub struct BlockLocator {
    dim: usize,
    tree: NdRTree,
}

impl std::fmt::Debug for BlockLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.tree {
            NdRTree::D1(_) => "rtree-1d",
            NdRTree::D2(_) => "rtree-2d",
            NdRTree::D3(_) => "rtree-3d",
            NdRTree::Linear(_) => "linear",
        };
        f.debug_struct("BlockLocator")
            .field("dim", &self.dim)
            .field("index", &kind)
            .finish()
    }
}

impl BlockLocator {
    /// Indexes `(gid, region)` pairs. Regions with a dimension other than `dim` are skipped.
    pub fn new<'a, I>(dim: usize, regions: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a Bounds)>,
    {
        let regions = regions.into_iter().filter(|(_, b)| b.dim() == dim);
        let tree = match dim {
            1 => NdRTree::D1(RTree::bulk_load(
                regions
                    .map(|(gid, b)| {
                        GeomWithData::new(
                            Rectangle::from_corners([b.min()[0], 0.0], [b.max()[0], 1.0]),
                            gid,
                        )
                    })
                    .collect(),
            )),
            2 => NdRTree::D2(RTree::bulk_load(
                regions
                    .map(|(gid, b)| GeomWithData::new(rectangle_nd::<2>(b), gid))
                    .collect(),
            )),
            3 => NdRTree::D3(RTree::bulk_load(
                regions
                    .map(|(gid, b)| GeomWithData::new(rectangle_nd::<3>(b), gid))
                    .collect(),
            )),
            _ => NdRTree::Linear(regions.map(|(gid, b)| (gid, b.clone())).collect()),
        };
        Self { dim, tree }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Blocks whose region contains `point` (faces included), ascending by gid.
    pub fn locate(&self, point: &[f64]) -> Vec<usize> {
        if point.len() != self.dim {
            return Vec::new();
        }
        let mut found: Vec<usize> = match &self.tree {
            NdRTree::D1(tree) => tree
                .locate_in_envelope_intersecting(&AABB::from_point([point[0], 0.5]))
                .map(|item| item.data)
                .collect(),
            NdRTree::D2(tree) => tree
                .locate_in_envelope_intersecting(&AABB::from_point(corner::<2>(point)))
                .map(|item| item.data)
                .collect(),
            NdRTree::D3(tree) => tree
                .locate_in_envelope_intersecting(&AABB::from_point(corner::<3>(point)))
                .map(|item| item.data)
                .collect(),
            NdRTree::Linear(all) => all
                .iter()
                .filter(|(_, b)| b.contains(point))
                .map(|(gid, _)| *gid)
                .collect(),
        };
        found.sort_unstable();
        found
    }

    /// Blocks whose region intersects (or touches) `query`, ascending, excluding `exclude`.
    pub fn intersecting(&self, query: &Bounds, exclude: Option<usize>) -> Vec<usize> {
        if query.dim() != self.dim {
            return Vec::new();
        }
        let mut found: Vec<usize> = match &self.tree {
            NdRTree::D1(tree) => {
                let envelope =
                    AABB::from_corners([query.min()[0], 0.0], [query.max()[0], 1.0]);
                tree.locate_in_envelope_intersecting(&envelope)
                    .map(|item| item.data)
                    .collect()
            }
            NdRTree::D2(tree) => tree
                .locate_in_envelope_intersecting(&envelope_nd::<2>(query))
                .map(|item| item.data)
                .collect(),
            NdRTree::D3(tree) => tree
                .locate_in_envelope_intersecting(&envelope_nd::<3>(query))
                .map(|item| item.data)
                .collect(),
            NdRTree::Linear(all) => all
                .iter()
                .filter(|(_, b)| b.intersect(query).is_some())
                .map(|(gid, _)| *gid)
                .collect(),
        };
        found.retain(|gid| Some(*gid) != exclude);
        found.sort_unstable();
        found
    }
}

#[inline(always)]
fn corner<const D: usize>(values: &[f64]) -> [f64; D] {
    std::array::from_fn(|i| values[i])
}

fn rectangle_nd<const D: usize>(bounds: &Bounds) -> Rectangle<[f64; D]> {
    Rectangle::from_corners(corner::<D>(bounds.min()), corner::<D>(bounds.max()))
}

fn envelope_nd<const D: usize>(bounds: &Bounds) -> AABB<[f64; D]> {
    AABB::from_corners(corner::<D>(bounds.min()), corner::<D>(bounds.max()))
}
