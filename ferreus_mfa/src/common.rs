/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines shared helpers for grid and random point generation, noise, and CSV I/O.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::error::MfaError;
use csv::{ReaderBuilder, Writer};
use faer::{Mat, MatRef};
use ferreus_mfa_utils::linspace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::fs::File;
use std::path::Path;

/// Random number generator seeded from `seed`, or from the operating system when `None`.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Generate a matrix of random points in the unit hypercube.
///
/// # Parameters
/// - `n`: Number of points to generate (rows in the output matrix).
/// - `d`: Number of spatial dimensions per point (columns in the output matrix).
/// - `seed`: Optional random seed.
///   - If `Some(seed)` is provided, the same sequence of points will be generated
///     deterministically across runs and platforms (useful for reproducible tests).
///   - If `None`, the generator is seeded from the operating system's randomness source.
///
/// # Example
/// ```
/// use ferreus_mfa::generate_random_points;
///
/// let pts = generate_random_points(100, 3, Some(42));
/// assert_eq!(pts.ncols(), 3);
/// assert_eq!(pts, generate_random_points(100, 3, Some(42)));
/// ```
pub fn generate_random_points(n: usize, d: usize, seed: Option<u64>) -> Mat<f64> {
    let mut rng = seeded_rng(seed);
    Mat::from_fn(n, d, |_, _| rng.random_range(0.0..1.0))
}

/// Uniform random points inside the box `[min, max]`.
pub(crate) fn random_points_in(min: &[f64], max: &[f64], n: usize, rng: &mut StdRng) -> Mat<f64> {
    Mat::from_fn(n, min.len(), |_, k| {
        if max[k] > min[k] {
            rng.random_range(min[k]..max[k])
        } else {
            min[k]
        }
    })
}

/// Rotates the first two coordinates of every row about `centre`.
///
/// The angle is `rot` degrees plus `twist` half turns scaled by the position
/// `t` in `[0, 1]` of the row's last coordinate within `last_range`, centred
/// so that the middle of the range turns by `rot` alone. Rows need at least
/// two columns.
pub(crate) fn warp_points(points: &mut Mat<f64>, centre: &[f64], last_range: (f64, f64), rot: f64, twist: f64) {
    let last = centre.len() - 1;
    let (lo, hi) = last_range;
    let base = rot.to_radians();
    for i in 0..points.nrows() {
        let t = if hi > lo { (points[(i, last)] - lo) / (hi - lo) } else { 0.5 };
        let (sin, cos) = (base + twist * PI * (t - 0.5)).sin_cos();
        let (x, y) = (points[(i, 0)] - centre[0], points[(i, 1)] - centre[1]);
        points[(i, 0)] = centre[0] + cos * x - sin * y;
        points[(i, 1)] = centre[1] + sin * x + cos * y;
    }
}

/// Create a regular evaluation grid from per-dimension ranges and sample counts.
///
/// Dimension 0 changes fastest. A count of one places the single sample at
/// the start of its range.
///
/// # Arguments
/// * `ranges` - Inclusive `(min, max)` range for each dimension.
/// * `counts` - Number of grid samples per range; must match `ranges.len()`.
///
/// # Returns
/// A `Mat<f64>` with one row per grid point and one column per dimension.
pub fn create_evaluation_grid(ranges: &[(f64, f64)], counts: &[usize]) -> Mat<f64> {
    assert_eq!(ranges.len(), counts.len());

    let axes: Vec<Vec<f64>> = ranges
        .iter()
        .zip(counts.iter())
        .map(|((start, end), n)| linspace(*start, *end, *n))
        .collect();
    let total: usize = counts.iter().product();

    Mat::from_fn(total, ranges.len(), |row, col| {
        let stride: usize = counts[..col].iter().product();
        axes[col][(row / stride) % counts[col]]
    })
}

/// Adds `level * U(-1, 1)` to every entry.
pub(crate) fn add_noise(values: &mut Mat<f64>, level: f64, rng: &mut StdRng) {
    if level == 0.0 {
        return;
    }
    for j in 0..values.ncols() {
        for i in 0..values.nrows() {
            values[(i, j)] += level * rng.random_range(-1.0..=1.0);
        }
    }
}

/// Load every column of a CSV file into one matrix.
///
/// # Arguments
/// * `file_path` - Path to the CSV file.
/// * `has_headers` - Whether the file has a single header row to skip.
/// * `ncols` - Expected number of columns, if known.
pub fn csv_to_point_array<P: AsRef<Path>>(
    file_path: P,
    has_headers: bool,
    ncols: Option<usize>,
) -> Result<Mat<f64>, MfaError> {
    let path = file_path.as_ref();
    let file = File::open(path).map_err(|source| MfaError::Io {
        action: "opening",
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new().has_headers(has_headers).from_reader(file);

    let mut data = Vec::new();
    let mut num_rows = 0;
    let mut num_cols = ncols.unwrap_or(0);

    for result in reader.records() {
        let record = result.map_err(|source| MfaError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if num_cols == 0 {
            num_cols = record.len();
        } else if record.len() != num_cols {
            return Err(MfaError::Data(format!(
                "{}: row {} has {} columns, expected {num_cols}",
                path.display(),
                num_rows + 1,
                record.len()
            )));
        }

        for value in record.iter() {
            let parsed: f64 = value.trim().parse().map_err(|_| {
                MfaError::Data(format!(
                    "{}: row {}: cannot parse {value:?} as a number",
                    path.display(),
                    num_rows + 1
                ))
            })?;
            data.push(parsed);
        }
        num_rows += 1;
    }

    Ok(MatRef::from_row_major_slice(data.as_slice(), num_rows, num_cols).to_owned())
}

/// Write a point array to a CSV file with the given column headers.
pub fn point_array_to_csv<P: AsRef<Path>>(
    points: MatRef<'_, f64>,
    headers: &[&str],
    file_path: P,
) -> Result<(), MfaError> {
    let path = file_path.as_ref();
    let csv_err = |source| MfaError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = Writer::from_path(path).map_err(csv_err)?;
    if !headers.is_empty() {
        writer.write_record(headers).map_err(csv_err)?;
    }
    for i in 0..points.nrows() {
        let row: Vec<String> = (0..points.ncols()).map(|j| points[(i, j)].to_string()).collect();
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| MfaError::Io {
        action: "writing",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_changes_first_dimension_fastest() {
        let grid = create_evaluation_grid(&[(0.0, 1.0), (10.0, 20.0)], &[3, 2]);
        assert_eq!(grid.shape(), (6, 2));
        assert_eq!(grid[(1, 0)], 0.5);
        assert_eq!(grid[(1, 1)], 10.0);
        assert_eq!(grid[(3, 0)], 0.0);
        assert_eq!(grid[(3, 1)], 20.0);
    }

    #[test]
    fn noise_is_bounded_and_reproducible() {
        let mut a = Mat::<f64>::zeros(50, 1);
        let mut b = Mat::<f64>::zeros(50, 1);
        add_noise(&mut a, 0.1, &mut seeded_rng(Some(7)));
        add_noise(&mut b, 0.1, &mut seeded_rng(Some(7)));
        assert_eq!(a, b);
        assert!((0..50).all(|i| a[(i, 0)].abs() <= 0.1));
        assert!((0..50).any(|i| a[(i, 0)] != 0.0));
    }

    #[test]
    fn random_points_stay_in_the_box() {
        let pts = random_points_in(&[-1.0, 5.0], &[1.0, 5.0], 20, &mut seeded_rng(Some(1)));
        for i in 0..20 {
            assert!(pts[(i, 0)] >= -1.0 && pts[(i, 0)] < 1.0);
            assert_eq!(pts[(i, 1)], 5.0);
        }
    }

    #[test]
    fn rotation_turns_about_the_centre() {
        let mut pts = Mat::from_fn(2, 2, |i, k| [[2.0, 1.0], [1.0, 1.0]][i][k]);
        warp_points(&mut pts, &[1.0, 1.0], (0.0, 2.0), 90.0, 0.0);
        assert!((pts[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((pts[(0, 1)] - 2.0).abs() < 1e-12);
        // the centre stays put
        assert_eq!((pts[(1, 0)], pts[(1, 1)]), (1.0, 1.0));
    }

    #[test]
    fn twist_grows_along_the_last_dimension() {
        // z = 0 turns by -90 degrees, z = 0.5 stays, z = 1 turns by +90
        let mut pts = Mat::from_fn(3, 3, |i, k| [1.0, 0.0, 0.5 * i as f64][k]);
        warp_points(&mut pts, &[0.0, 0.0, 0.5], (0.0, 1.0), 0.0, 1.0);
        assert!((pts[(0, 0)]).abs() < 1e-12 && (pts[(0, 1)] + 1.0).abs() < 1e-12);
        assert!((pts[(1, 0)] - 1.0).abs() < 1e-12 && pts[(1, 1)].abs() < 1e-12);
        assert!((pts[(2, 0)]).abs() < 1e-12 && (pts[(2, 1)] - 1.0).abs() < 1e-12);
        for i in 0..3 {
            assert_eq!(pts[(i, 2)], 0.5 * i as f64);
        }
    }

    #[test]
    fn csv_round_trip() {
        let dir = std::env::temp_dir().join(format!("ferreus_mfa_csv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("points.csv");

        let points = Mat::from_fn(4, 3, |i, j| (i * 3 + j) as f64 * 0.5);
        point_array_to_csv(points.as_ref(), &["x", "y", "v"], &path).unwrap();
        let back = csv_to_point_array(&path, true, Some(3)).unwrap();
        assert_eq!(back, points);

        let err = csv_to_point_array(&path, true, Some(2)).unwrap_err();
        assert!(matches!(err, MfaError::Data(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
