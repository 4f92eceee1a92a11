//! K-means clustering for multi-band rasters
//!
//! Reproducible Lloyd iteration over standardized features:
//!
//! 1. Standardize every feature over all valid pixels (population statistics).
//! 2. Train on at most `sample_cap` pixels drawn without replacement.
//! 3. Seed `k` distinct centroids from training pixels drawn without replacement.
//! 4. Alternate nearest-centroid assignment and mean update; an emptied
//!    cluster is reseeded on a random training pixel. Stop when no centroid
//!    coordinate moves more than `tolerance`.
//! 5. Label every valid pixel and renumber clusters by descending size.
//!
//! All random draws come from one [`RandomStream`] on the calling thread, and
//! centroid sums are accumulated in training order, so the labels depend only
//! on the input and the parameters, not on the number of worker threads.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use terraclass_core::{Error, Result};
use tracing::{debug, info};

use super::matrix::PixelMatrix;
use super::random::{Generator, RandomStream};
use crate::maybe_rayon::*;

/// Smallest standard deviation, relative to the column magnitude, that still counts as spread
const RELATIVE_SPREAD_EPS: f64 = 1e-12;

/// Parameters for K-means clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmeansParams {
    /// Number of clusters (default: 6)
    pub n_clusters: usize,
    /// Maximum Lloyd iterations (default: 300)
    pub max_iterations: usize,
    /// Stop once no centroid coordinate moves more than this (default: 1e-4)
    pub tolerance: f64,
    /// Seed for sampling and centroid initialization (default: 42)
    pub seed: u64,
    /// Maximum number of training pixels (default: 10 000)
    pub sample_cap: usize,
    /// Random stream flavour (default: rand48)
    pub generator: Generator,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 6,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
            sample_cap: 10_000,
            generator: Generator::Rand48,
        }
    }
}

impl KmeansParams {
    /// Check every parameter, failing on the first invalid one
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(Error::invalid_parameter("n_clusters", self.n_clusters, "must be >= 1"));
        }
        if self.max_iterations == 0 {
            return Err(Error::invalid_parameter(
                "max_iterations",
                self.max_iterations,
                "must be >= 1",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(Error::invalid_parameter(
                "tolerance",
                self.tolerance,
                "must be a finite value > 0",
            ));
        }
        if self.sample_cap < self.n_clusters {
            return Err(Error::invalid_parameter(
                "sample_cap",
                self.sample_cap,
                format!("must be >= n_clusters ({})", self.n_clusters),
            ));
        }
        Ok(())
    }
}

/// Per-feature z-score transform
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    /// Feature means
    pub means: Vec<f64>,
    /// Feature population standard deviations (all > 0)
    pub stds: Vec<f64>,
}

impl Standardizer {
    /// Fit means and population standard deviations on every row.
    ///
    /// A feature whose spread is lost in rounding noise (standard deviation
    /// at most `1e-12` of its largest magnitude, or exactly zero) cannot be
    /// scaled and yields [`Error::ConstantBand`].
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        let n = data.nrows() as f64;
        let mut means = Vec::with_capacity(data.ncols());
        let mut stds = Vec::with_capacity(data.ncols());

        for (j, col) in data.axis_iter(Axis(1)).enumerate() {
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let std = var.sqrt();
            let magnitude = col.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            if !(std > RELATIVE_SPREAD_EPS * magnitude) {
                return Err(Error::ConstantBand { band: j });
            }
            means.push(mean);
            stds.push(std);
        }

        Ok(Self { means, stds })
    }

    /// Standardize every row
    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut z = data.clone();
        for (j, mut col) in z.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, std) = (self.means[j], self.stds[j]);
            col.mapv_inplace(|v| (v - mean) / std);
        }
        z
    }

    /// Map a standardized vector back to feature units
    pub fn inverse(&self, z: ArrayView1<'_, f64>) -> Array1<f64> {
        Array1::from_iter(
            z.iter()
                .enumerate()
                .map(|(j, &v)| v * self.stds[j] + self.means[j]),
        )
    }
}

/// Fitted cluster centroids
#[derive(Debug, Clone)]
pub struct ClusterModel {
    /// Centroids in standardized feature space, `k x n_features`, in canonical label order
    pub centroids: Array2<f64>,
    /// Standardization applied before distances are measured
    pub standardizer: Standardizer,
    /// Whether the tolerance was reached before `max_iterations`
    pub converged: bool,
    /// Lloyd iterations performed
    pub iterations: usize,
}

impl ClusterModel {
    /// Number of clusters
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Label of the nearest centroid for a raw feature vector
    pub fn predict(&self, sample: &[f64]) -> usize {
        let z: Array1<f64> = sample
            .iter()
            .enumerate()
            .map(|(j, &v)| (v - self.standardizer.means[j]) / self.standardizer.stds[j])
            .collect();
        nearest(&self.centroids, z.view()).0
    }

    /// Centroids expressed in the original feature units
    pub fn centroids_in_feature_units(&self) -> Array2<f64> {
        let mut out = Array2::zeros(self.centroids.dim());
        for (mut dst, src) in out.outer_iter_mut().zip(self.centroids.outer_iter()) {
            dst.assign(&self.standardizer.inverse(src));
        }
        out
    }
}

/// Outcome of [`kmeans`]
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Canonical label of every sample, in `0..k`
    pub labels: Vec<usize>,
    /// Number of samples per label; non-increasing
    pub counts: Vec<usize>,
    /// Fitted model
    pub model: ClusterModel,
    /// Number of samples used to fit the centroids
    pub training_size: usize,
}

/// Cluster the rows of a pixel matrix.
///
/// # Errors
/// - [`Error::InvalidParameter`] for invalid parameters
/// - [`Error::DegenerateInput`] for an empty matrix
/// - [`Error::ConstantBand`] if a feature is constant
/// - [`Error::InsufficientSamples`] if the training set has fewer than `k`
///   distinct feature vectors
pub fn kmeans(matrix: &PixelMatrix, params: &KmeansParams) -> Result<Clustering> {
    params.validate()?;

    let n = matrix.n_samples();
    if n == 0 {
        return Err(Error::DegenerateInput("no samples to cluster".into()));
    }
    let k = params.n_clusters;

    let standardizer = Standardizer::fit(matrix.data())?;
    let z = standardizer.transform(matrix.data());

    let mut stream = RandomStream::new(params.generator, params.seed);

    let training: Vec<usize> = if n > params.sample_cap {
        let mut sample = stream.sample_without_replacement(n, params.sample_cap)?;
        sample.sort_unstable();
        sample
    } else {
        (0..n).collect()
    };

    if k > training.len() {
        return Err(Error::InsufficientSamples {
            required: k,
            available: training.len(),
        });
    }

    let mut centroids = initial_centroids(&z, &training, k, &mut stream)?;

    let mut assignments = vec![0usize; training.len()];
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..params.max_iterations {
        iterations = iter + 1;

        assignments
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, label)| *label = nearest(&centroids, z.row(training[i])).0);

        let max_shift = update_centroids(&z, &training, &assignments, &mut centroids, &mut stream)?;

        debug!(iteration = iterations, max_shift, "k-means iteration");

        if max_shift <= params.tolerance {
            converged = true;
            break;
        }
    }

    let raw_labels: Vec<usize> = (0..n)
        .into_par_iter()
        .map(|i| nearest(&centroids, z.row(i)).0)
        .collect();

    let (labels, counts, centroids) = canonical_order(&raw_labels, &centroids);

    info!(
        "k-means: {} clusters, {} training pixels, {} iterations, converged: {} ({} stream, seed {})",
        k,
        training.len(),
        iterations,
        converged,
        params.generator.name(),
        params.seed
    );

    Ok(Clustering {
        labels,
        counts,
        model: ClusterModel {
            centroids,
            standardizer,
            converged,
            iterations,
        },
        training_size: training.len(),
    })
}

/// Move every centroid to the mean of its assigned training samples.
///
/// Sums are accumulated in training order. A cluster with no samples is
/// reseeded on a training sample drawn from the stream. Returns the largest
/// per-coordinate centroid movement.
fn update_centroids(
    z: &Array2<f64>,
    training: &[usize],
    assignments: &[usize],
    centroids: &mut Array2<f64>,
    stream: &mut RandomStream,
) -> Result<f64> {
    let k = centroids.nrows();
    let mut sums = Array2::<f64>::zeros(centroids.dim());
    let mut counts = vec![0usize; k];
    for (&idx, &label) in training.iter().zip(assignments) {
        for (s, v) in sums.row_mut(label).iter_mut().zip(z.row(idx)) {
            *s += v;
        }
        counts[label] += 1;
    }

    let mut max_shift = 0.0_f64;
    for c in 0..k {
        let updated: Array1<f64> = if counts[c] > 0 {
            sums.row(c).mapv(|s| s / counts[c] as f64)
        } else {
            let pick = stream.uniform_index(training.len())?;
            debug!(cluster = c, pixel = training[pick], "reseeding empty cluster");
            z.row(training[pick]).to_owned()
        };
        for (old, new) in centroids.row(c).iter().zip(&updated) {
            max_shift = max_shift.max((new - old).abs());
        }
        centroids.row_mut(c).assign(&updated);
    }

    Ok(max_shift)
}

/// Draw training pixels in random order until `k` distinct vectors are found
fn initial_centroids(
    z: &Array2<f64>,
    training: &[usize],
    k: usize,
    stream: &mut RandomStream,
) -> Result<Array2<f64>> {
    let mut centroids = Array2::zeros((k, z.ncols()));
    let mut chosen = 0;

    for t in stream.shuffled_indices(training.len()) {
        let candidate = z.row(training[t]);
        if (0..chosen).any(|c| centroids.row(c) == candidate) {
            continue;
        }
        centroids.row_mut(chosen).assign(&candidate);
        chosen += 1;
        if chosen == k {
            return Ok(centroids);
        }
    }

    Err(Error::InsufficientSamples {
        required: k,
        available: chosen,
    })
}

/// Index and squared distance of the closest centroid; ties go to the lower index
fn nearest(centroids: &Array2<f64>, sample: ArrayView1<'_, f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.outer_iter().enumerate() {
        let d: f64 = centroid
            .iter()
            .zip(sample.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// Renumber clusters by descending population.
///
/// Equal populations are ordered by the lexicographically smaller centroid,
/// then by the original cluster id.
fn canonical_order(
    raw_labels: &[usize],
    centroids: &Array2<f64>,
) -> (Vec<usize>, Vec<usize>, Array2<f64>) {
    let k = centroids.nrows();
    let mut counts = vec![0usize; k];
    for &l in raw_labels {
        counts[l] += 1;
    }

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| {
        counts[b]
            .cmp(&counts[a])
            .then_with(|| lexicographic(centroids.row(a), centroids.row(b)))
            .then(a.cmp(&b))
    });

    let mut remap = vec![0usize; k];
    for (new, &old) in order.iter().enumerate() {
        remap[old] = new;
    }

    let labels = raw_labels.iter().map(|&l| remap[l]).collect();
    let sorted_counts = order.iter().map(|&old| counts[old]).collect();
    (labels, sorted_counts, centroids.select(Axis(0), &order))
}

fn lexicographic(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn split_halves() -> PixelMatrix {
        // 4x4 raster [[1,1,9,9], ...] flattened row-major
        let values: Vec<f64> = (0..16).map(|i| if i % 4 < 2 { 1.0 } else { 9.0 }).collect();
        PixelMatrix::new(Array2::from_shape_vec((16, 1), values).unwrap())
    }

    fn blobs() -> PixelMatrix {
        // Three well separated groups of unequal size with a little jitter
        let mut rows = Vec::new();
        let centers = [(0.0, 0.0, 50), (10.0, 10.0, 30), (0.0, 20.0, 20)];
        for &(cx, cy, count) in &centers {
            for i in 0..count {
                let jitter = ((i * 37) % 11) as f64 / 10.0 - 0.5;
                rows.push([cx + jitter, cy - jitter * 0.5]);
            }
        }
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        PixelMatrix::new(Array2::from_shape_vec((rows.len(), 2), flat).unwrap())
    }

    #[test]
    fn test_halves_split_for_any_seed() {
        let m = split_halves();
        for seed in [0, 1, 7, 42, 12_345, u64::MAX] {
            for generator in [Generator::Rand48, Generator::Java] {
                let params = KmeansParams {
                    n_clusters: 2,
                    max_iterations: 1,
                    tolerance: 1e-6,
                    seed,
                    generator,
                    ..Default::default()
                };
                let result = kmeans(&m, &params).unwrap();

                assert!(result.model.converged, "seed {} did not converge", seed);
                assert_eq!(result.model.iterations, 1);
                // Tie on population: the lower-valued half is label 0
                let expected: Vec<usize> = (0..16).map(|i| if i % 4 < 2 { 0 } else { 1 }).collect();
                assert_eq!(result.labels, expected);
                assert_eq!(result.counts, vec![8, 8]);
            }
        }
    }

    #[test]
    fn test_halves_centroids_in_feature_units() {
        let params = KmeansParams { n_clusters: 2, tolerance: 1e-6, ..Default::default() };
        let result = kmeans(&split_halves(), &params).unwrap();
        let centroids = result.model.centroids_in_feature_units();
        assert_relative_eq!(centroids[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(centroids[(1, 0)], 9.0, epsilon = 1e-12);
        assert_eq!(result.model.predict(&[2.0]), 0);
        assert_eq!(result.model.predict(&[8.0]), 1);
    }

    #[test]
    fn test_deterministic_labels() {
        let params = KmeansParams { n_clusters: 3, seed: 99, sample_cap: 40, ..Default::default() };
        let a = kmeans(&blobs(), &params).unwrap();
        let b = kmeans(&blobs(), &params).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.model.centroids, b.model.centroids);
        assert_eq!(a.training_size, 40);
    }

    #[test]
    fn test_counts_non_increasing() {
        let params = KmeansParams { n_clusters: 3, ..Default::default() };
        let result = kmeans(&blobs(), &params).unwrap();

        assert_eq!(result.counts, vec![50, 30, 20]);
        for w in result.counts.windows(2) {
            assert!(w[0] >= w[1]);
        }
        let mut recount = vec![0; 3];
        for &l in &result.labels {
            recount[l] += 1;
        }
        assert_eq!(recount, result.counts);
        // Largest blob comes first in the data
        assert!(result.labels[..50].iter().all(|&l| l == 0));
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let m = PixelMatrix::new(array![[1.0], [2.0], [3.0]]);
        let params = KmeansParams { n_clusters: 4, sample_cap: 4, ..Default::default() };
        assert!(matches!(
            kmeans(&m, &params),
            Err(Error::InsufficientSamples { required: 4, available: 3 })
        ));
    }

    #[test]
    fn test_too_few_distinct_vectors() {
        let m = PixelMatrix::new(array![[1.0], [1.0], [1.0], [2.0]]);
        let params = KmeansParams { n_clusters: 3, ..Default::default() };
        assert!(matches!(
            kmeans(&m, &params),
            Err(Error::InsufficientSamples { required: 3, available: 2 })
        ));
    }

    #[test]
    fn test_constant_feature_rejected() {
        let m = PixelMatrix::new(array![[1.0, 4.0], [2.0, 4.0], [3.0, 4.0]]);
        let params = KmeansParams { n_clusters: 2, ..Default::default() };
        assert!(matches!(kmeans(&m, &params), Err(Error::ConstantBand { band: 1 })));
    }

    #[test]
    fn test_single_cluster() {
        let params = KmeansParams { n_clusters: 1, ..Default::default() };
        let result = kmeans(&blobs(), &params).unwrap();
        assert!(result.labels.iter().all(|&l| l == 0));
        assert_eq!(result.counts, vec![100]);
    }

    #[test]
    fn test_invalid_params() {
        let bad = [
            KmeansParams { n_clusters: 0, ..Default::default() },
            KmeansParams { max_iterations: 0, ..Default::default() },
            KmeansParams { tolerance: 0.0, ..Default::default() },
            KmeansParams { tolerance: f64::NAN, ..Default::default() },
            KmeansParams { n_clusters: 8, sample_cap: 4, ..Default::default() },
        ];
        for params in bad {
            assert!(matches!(params.validate(), Err(Error::InvalidParameter { .. })));
        }
        assert!(KmeansParams::default().validate().is_ok());
    }

    #[test]
    fn test_standardizer_population_statistics() {
        let data = array![[1.0], [1.0], [9.0], [9.0]];
        let s = Standardizer::fit(&data).unwrap();
        assert_eq!(s.means, vec![5.0]);
        assert_eq!(s.stds, vec![4.0]);
        let z = s.transform(&data);
        assert_eq!(z.column(0).to_vec(), vec![-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_rounding_noise_column_is_constant() {
        // Spread far below the precision of the column values
        let data = array![[1.0e6, 1.0], [1.0e6 + 1.0e-7, 2.0], [1.0e6, 3.0]];
        assert!(matches!(Standardizer::fit(&data), Err(Error::ConstantBand { band: 0 })));

        let data = array![[0.0, 1.0], [0.0, 2.0]];
        assert!(matches!(Standardizer::fit(&data), Err(Error::ConstantBand { band: 0 })));
    }

    #[test]
    fn test_empty_cluster_reseeded_on_training_row() {
        let z = array![[-1.5], [-0.5], [0.5], [1.5], [2.5]];
        let training = vec![0, 2, 3, 4];
        // Every sample went to cluster 0; cluster 1 sits far away and is empty
        let assignments = vec![0; training.len()];
        let start = array![[0.0], [100.0]];

        let mut centroids = start.clone();
        let mut stream = RandomStream::new(Generator::Rand48, 7);
        let shift = update_centroids(&z, &training, &assignments, &mut centroids, &mut stream).unwrap();

        let expected_pick = RandomStream::new(Generator::Rand48, 7).uniform_index(training.len()).unwrap();
        assert_eq!(centroids.row(1), z.row(training[expected_pick]));
        assert!(training.iter().any(|&i| z.row(i) == centroids.row(1)));
        assert_relative_eq!(centroids[(0, 0)], 0.75, epsilon = 1e-12);
        assert!(shift >= 100.0 - 2.5);

        // Same seed, same reseed
        let mut again = start.clone();
        let mut stream = RandomStream::new(Generator::Rand48, 7);
        update_centroids(&z, &training, &assignments, &mut again, &mut stream).unwrap();
        assert_eq!(again, centroids);
    }

    #[test]
    fn test_canonical_order_tie_breaks() {
        let centroids = array![[3.0], [-1.0], [0.5]];
        let raw = vec![0, 0, 1, 1, 2, 2, 2];
        let (labels, counts, sorted) = canonical_order(&raw, &centroids);
        assert_eq!(counts, vec![3, 2, 2]);
        // Cluster 2 is the largest; clusters 0 and 1 tie, -1.0 < 3.0
        assert_eq!(labels, vec![2, 2, 1, 1, 0, 0, 0]);
        assert_eq!(sorted.column(0).to_vec(), vec![0.5, -1.0, 3.0]);
    }
}
