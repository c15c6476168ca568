/////////////////////////////////////////////////////////////////////////////////////////////
//
// Supplies general-purpose utilities for point matrices, sorting, and sampling ranges.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;

/// Returns an owned `Mat<T>` from a subset of row indices.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use ferreus_mfa_utils::select_mat_rows;
///
/// let matrix = mat![
///     [0.0, 1.0],
///     [1.0, 1.0],
///     [2.0, 2.0f64],
/// ];
///
/// let sub_matrix = select_mat_rows(&matrix, &[2, 0]);
///
/// assert_eq!(sub_matrix, mat![[2.0, 2.0], [0.0, 1.0f64]]);
/// ```
#[inline(always)]
pub fn select_mat_rows<T>(existing_mat: &Mat<T>, row_indices: &[usize]) -> Mat<T>
where
    T: Clone,
{
    Mat::from_fn(row_indices.len(), existing_mat.ncols(), |i, j| {
        existing_mat.get(row_indices[i], j).clone()
    })
}

/// Returns the indices that would sort the input slice.
///
/// # Examples
///
/// ```
/// use ferreus_mfa_utils::argsort;
///
/// assert_eq!(argsort(&[0.3, 0.1, 0.2]), vec![1, 2, 0]);
/// ```
#[inline(always)]
pub fn argsort<T: PartialOrd>(data: &[T]) -> Vec<usize> {
    let mut indices = (0..data.len()).collect::<Vec<_>>();
    indices.sort_by(|&i, &j| {
        data[i]
            .partial_cmp(&data[j])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices
}

/// Computes the axis aligned bounding box (AABB) extents of a matrix of points.
///
/// The result is arranged as `[min_0, ..., min_n, max_0, ..., max_n]` where
/// `n` is the number of columns in the matrix. An empty matrix yields an
/// empty vector.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use ferreus_mfa_utils::get_pointarray_extents;
///
/// let points = mat![
///     [1.0, 2.0],
///     [3.0, -1.0],
///     [0.5, 4.0f64]
/// ];
/// let extents = get_pointarray_extents(&points);
/// assert_eq!(extents, vec![0.5, -1.0, 3.0, 4.0]);
/// ```
#[inline(always)]
pub fn get_pointarray_extents<T>(points: &Mat<T>) -> Vec<T>
where
    T: PartialOrd + Clone,
{
    let ncols = points.ncols();
    if points.nrows() == 0 || ncols == 0 {
        return Vec::new();
    }

    let first = points.row(0);
    let mut extents: Vec<T> = first
        .iter()
        .chain(first.iter())
        .cloned()
        .collect();

    for row in points.row_iter() {
        for (col, item) in row.iter().enumerate() {
            if item < &extents[col] {
                extents[col] = item.clone();
            }
            if item > &extents[col + ncols] {
                extents[col + ncols] = item.clone();
            }
        }
    }

    extents
}

/// Returns `count` evenly spaced values over `[start, stop]`, both ends included.
///
/// # Examples
///
/// ```
/// use ferreus_mfa_utils::linspace;
///
/// assert_eq!(linspace(-1.0, 1.0, 5), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
/// assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
/// ```
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}
