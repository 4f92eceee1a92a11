//! Majority (modal) filter for label rasters
//!
//! Replaces each class label with the most frequent label in a square
//! window centered on the cell. Edges are handled by clamping neighbor
//! coordinates into the grid, so border cells see replicated edge labels.

use ndarray::Array2;
use terraclass_core::raster::Raster;
use terraclass_core::{Error, Result};

use crate::maybe_rayon::*;

/// Smooth a label raster with a `window x window` majority vote.
///
/// - `window` must be odd and at least 3.
/// - Nodata neighbors do not vote; a nodata center stays nodata.
/// - Ties go to the smallest label.
///
/// # Example
/// ```
/// use terraclass_algorithms::classification::majority_filter;
/// use terraclass_core::Raster;
///
/// let labels = Raster::from_vec(vec![0, 0, 0, 0, 1, 0, 0, 0, 0], 3, 3).unwrap();
/// let smoothed = majority_filter(&labels, 3).unwrap();
/// assert_eq!(smoothed.get(1, 1).unwrap(), 0);
/// ```
pub fn majority_filter(labels: &Raster<i32>, window: usize) -> Result<Raster<i32>> {
    if window < 3 || window % 2 == 0 {
        return Err(Error::invalid_parameter(
            "smoothing_window",
            window,
            "window must be an odd width >= 3",
        ));
    }

    let (rows, cols) = labels.shape();
    let half = (window / 2) as isize;
    let nodata = labels.nodata();
    let is_valid = |v: i32| nodata != Some(v);

    let output_data: Vec<i32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = Vec::with_capacity(cols);
            let mut votes: Vec<i32> = Vec::with_capacity(window * window);

            for col in 0..cols {
                let center = unsafe { labels.get_unchecked(row, col) };
                if !is_valid(center) {
                    row_data.push(center);
                    continue;
                }

                votes.clear();
                for dr in -half..=half {
                    let nr = (row as isize + dr).clamp(0, rows as isize - 1) as usize;
                    for dc in -half..=half {
                        let nc = (col as isize + dc).clamp(0, cols as isize - 1) as usize;
                        let v = unsafe { labels.get_unchecked(nr, nc) };
                        if is_valid(v) {
                            votes.push(v);
                        }
                    }
                }

                row_data.push(mode(&mut votes).unwrap_or(center));
            }

            row_data
        })
        .collect();

    let mut output = labels.with_same_meta::<i32>(0);
    output.set_nodata(nodata);
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// Most frequent value; the smallest wins a tie
fn mode(values: &mut [i32]) -> Option<i32> {
    values.sort_unstable();

    let mut best: Option<(i32, usize)> = None;
    let mut i = 0;
    while i < values.len() {
        let v = values[i];
        let run = values[i..].iter().take_while(|&&x| x == v).count();
        if best.is_none_or(|(_, count)| run > count) {
            best = Some((v, run));
        }
        i += run;
    }
    best.map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(data: Vec<i32>, rows: usize, cols: usize, nodata: Option<i32>) -> Raster<i32> {
        let mut r = Raster::from_vec(data, rows, cols).unwrap();
        r.set_nodata(nodata);
        r
    }

    #[test]
    fn test_removes_isolated_pixel() {
        let labels = raster(vec![0, 0, 0, 0, 2, 0, 0, 0, 0], 3, 3, None);
        let out = majority_filter(&labels, 3).unwrap();
        assert!(out.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_uniform_raster_unchanged() {
        let labels = raster(vec![3; 25], 5, 5, Some(-1));
        let once = majority_filter(&labels, 3).unwrap();
        assert_eq!(once.data(), labels.data());
        let twice = majority_filter(&once, 5).unwrap();
        assert_eq!(twice.data(), labels.data());
    }

    #[test]
    fn test_tie_goes_to_smallest_label() {
        // Middle cell sees three 2s, three 5s and three nodata cells
        let labels = raster(vec![2, 5, -1], 1, 3, Some(-1));
        let out = majority_filter(&labels, 3).unwrap();
        assert_eq!(out.data().iter().copied().collect::<Vec<_>>(), vec![2, 2, -1]);
    }

    #[test]
    fn test_edge_replication() {
        // Top-left corner: the clamped 3x3 window counts (0,0) four times
        let labels = raster(vec![1, 0, 0, 0, 0, 0, 0, 0, 0], 3, 3, None);
        let out = majority_filter(&labels, 3).unwrap();
        // 4 votes for 1 (replicated corner) and 5 for 0
        assert_eq!(out.get(0, 0).unwrap(), 0);

        let labels = raster(vec![1, 1, 0, 1, 0, 0, 0, 0, 0], 3, 3, None);
        let out = majority_filter(&labels, 3).unwrap();
        // Corner window: (0,0)x4, (0,1)x2, (1,0)x2, (1,1)x1 -> eight 1s
        assert_eq!(out.get(0, 0).unwrap(), 1);
    }

    #[test]
    fn test_nodata_preserved_and_ignored() {
        let nd = -9999;
        let labels = raster(vec![nd, 1, 1, nd, 0, 1, nd, nd, 1], 3, 3, Some(nd));
        let out = majority_filter(&labels, 3).unwrap();

        assert_eq!(out.nodata(), Some(nd));
        for idx in [0, 3, 6, 7] {
            assert_eq!(out.data().as_slice().unwrap()[idx], nd);
        }
        // Center votes: 1,1,0,1,1 -> 1
        assert_eq!(out.get(1, 1).unwrap(), 1);
    }

    #[test]
    fn test_all_nodata_stays_nodata() {
        let labels = raster(vec![-1; 9], 3, 3, Some(-1));
        let out = majority_filter(&labels, 3).unwrap();
        assert!(out.data().iter().all(|&v| v == -1));
    }

    #[test]
    fn test_invalid_window() {
        let labels = raster(vec![0; 4], 2, 2, None);
        for window in [0, 1, 2, 4] {
            assert!(matches!(
                majority_filter(&labels, window),
                Err(Error::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_mode() {
        assert_eq!(mode(&mut []), None);
        assert_eq!(mode(&mut [4, 1, 4, 1, 2]), Some(1));
        assert_eq!(mode(&mut [3, 3, 2]), Some(3));
    }
}
