//! Principal Component Analysis for multi-band rasters
//!
//! Centers (and optionally scales) the valid pixels of each band, builds the
//! band covariance matrix, and extracts its eigenpairs by Jacobi rotation.
//! The number of components kept is the smallest one whose cumulative
//! explained variance reaches `variance_threshold`.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use terraclass_core::raster::{Raster, RasterElement, RasterStack};
use terraclass_core::{Error, Result};
use tracing::{debug, info};

use super::matrix::PixelMatrix;

/// Parameters for PCA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaParams {
    /// Target cumulative explained variance in (0, 1]; 1.0 keeps every component
    pub variance_threshold: f64,
    /// Divide each centered band by its sample standard deviation
    pub scale: bool,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            variance_threshold: 0.99,
            scale: false,
        }
    }
}

impl PcaParams {
    /// Reject thresholds outside (0, 1]
    pub fn validate(&self) -> Result<()> {
        let t = self.variance_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(Error::invalid_parameter(
                "variance_threshold",
                t,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Result of PCA
#[derive(Debug, Clone)]
pub struct PcaResult {
    /// Projected samples, `n_samples x n_components`
    pub scores: Array2<f64>,
    /// Unit eigenvectors of the kept components, `n_components x n_features`
    pub loadings: Array2<f64>,
    /// Eigenvalues of the kept components, descending
    pub eigenvalues: Vec<f64>,
    /// Eigenvalues of every component, descending and clipped at zero
    pub all_eigenvalues: Vec<f64>,
    /// Eigenvalue / total variance, for every component
    pub explained_variance_ratio: Vec<f64>,
    /// Running sum of `explained_variance_ratio`
    pub cumulative_variance: Vec<f64>,
    /// Column means removed before projection
    pub means: Vec<f64>,
    /// Column standard deviations used for scaling, when requested
    pub scales: Option<Vec<f64>>,
}

impl PcaResult {
    /// Number of components kept
    pub fn n_components(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Cumulative explained variance of the kept components
    pub fn retained_variance(&self) -> f64 {
        self.cumulative_variance[self.n_components() - 1]
    }

    /// Project one raw feature vector onto the kept components
    pub fn project(&self, sample: &[f64]) -> Vec<f64> {
        let centered: Vec<f64> = sample
            .iter()
            .enumerate()
            .map(|(j, &v)| {
                let c = v - self.means[j];
                match &self.scales {
                    Some(s) => c / s[j],
                    None => c,
                }
            })
            .collect();

        self.loadings
            .outer_iter()
            .map(|l| l.iter().zip(&centered).map(|(a, b)| a * b).sum())
            .collect()
    }
}

/// Reduce a pixel matrix to the principal components covering
/// `params.variance_threshold` of its variance.
///
/// # Errors
/// - [`Error::InvalidParameter`] for a threshold outside (0, 1]
/// - [`Error::DegenerateInput`] for an empty matrix or zero total variance
/// - [`Error::ConstantBand`] when scaling a constant column
pub fn pca(matrix: &PixelMatrix, params: &PcaParams) -> Result<PcaResult> {
    params.validate()?;

    let x = matrix.data();
    let (n, p) = x.dim();
    if n == 0 || p == 0 {
        return Err(Error::DegenerateInput(format!(
            "PCA needs at least one sample and one feature, got {}x{}",
            n, p
        )));
    }

    let constant: Vec<bool> = x
        .axis_iter(Axis(1))
        .map(|col| col.iter().all(|&v| v == col[0]))
        .collect();
    if constant.iter().all(|&c| c) {
        return Err(Error::DegenerateInput(
            "every feature is constant; total variance is zero".into(),
        ));
    }

    let means: Array1<f64> = x
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::DegenerateInput("empty sample matrix".into()))?;
    let mut centered = x - &means;

    let dof = (n - 1).max(1) as f64;
    let scales = if params.scale {
        let mut stds = Vec::with_capacity(p);
        for (j, mut col) in centered.axis_iter_mut(Axis(1)).enumerate() {
            if constant[j] {
                return Err(Error::ConstantBand { band: j });
            }
            let std = (col.iter().map(|v| v * v).sum::<f64>() / dof).sqrt();
            col.mapv_inplace(|v| v / std);
            stds.push(std);
        }
        Some(stds)
    } else {
        None
    };

    let covariance = centered.t().dot(&centered) / dof;
    let (raw_values, vectors) = jacobi_eigen(&covariance);

    // Stable sort keeps equal eigenvalues in feature order
    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| raw_values[b].total_cmp(&raw_values[a]));

    let all_eigenvalues: Vec<f64> = order.iter().map(|&i| raw_values[i].max(0.0)).collect();
    let total: f64 = all_eigenvalues.iter().sum();
    if !(total > 0.0) {
        return Err(Error::DegenerateInput("total variance is zero".into()));
    }

    let explained_variance_ratio: Vec<f64> = all_eigenvalues.iter().map(|ev| ev / total).collect();
    let cumulative_variance: Vec<f64> = explained_variance_ratio
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r;
            Some(*acc)
        })
        .collect();

    let k = select_components(&cumulative_variance, params.variance_threshold);

    let mut loadings = Array2::zeros((k, p));
    for (row, &idx) in order.iter().take(k).enumerate() {
        let mut v = vectors.column(idx).to_owned();
        orient(&mut v);
        loadings.row_mut(row).assign(&v);
    }

    let scores = centered.dot(&loadings.t());

    for (i, (ratio, cum)) in explained_variance_ratio
        .iter()
        .zip(&cumulative_variance)
        .enumerate()
    {
        debug!(component = i + 1, explained = ratio, cumulative = cum, kept = i < k, "PCA component");
    }
    info!(
        "PCA kept {} of {} components ({:.2}% of variance, threshold {:.2}%)",
        k,
        p,
        cumulative_variance[k - 1] * 100.0,
        params.variance_threshold * 100.0
    );

    Ok(PcaResult {
        scores,
        loadings,
        eigenvalues: all_eigenvalues[..k].to_vec(),
        all_eigenvalues,
        explained_variance_ratio,
        cumulative_variance,
        means: means.to_vec(),
        scales,
    })
}

/// Smallest component count whose cumulative ratio reaches `threshold`.
///
/// Thresholds of 1.0 or more keep everything; the count is never below 1.
fn select_components(cumulative: &[f64], threshold: f64) -> usize {
    if threshold >= 1.0 {
        return cumulative.len();
    }
    cumulative
        .iter()
        .position(|&c| c >= threshold)
        .map_or(cumulative.len(), |i| i + 1)
        .max(1)
}

/// Flip an eigenvector so its largest-magnitude coefficient is positive
fn orient(v: &mut Array1<f64>) {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

/// Jacobi eigenvalue algorithm for symmetric matrices.
///
/// Returns the diagonal after convergence and the matrix whose columns are
/// the matching eigenvectors. Rotation stops once every off-diagonal element
/// is negligible relative to the largest diagonal magnitude.
fn jacobi_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::eye(n);

    let scale = a.diag().iter().fold(0.0_f64, |m, d| m.max(d.abs()));
    if n < 2 || scale == 0.0 {
        return (a.diag().to_vec(), v);
    }
    let tol = 1e-14 * scale;

    for _ in 0..100 * n * n {
        // Largest off-diagonal element
        let (mut p, mut q, mut max_val) = (0, 1, 0.0_f64);
        for i in 0..n {
            for j in (i + 1)..n {
                if a[(i, j)].abs() > max_val {
                    max_val = a[(i, j)].abs();
                    p = i;
                    q = j;
                }
            }
        }
        if max_val <= tol {
            break;
        }

        let apq = a[(p, q)];
        let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
        let t = if theta.abs() > 1e150 {
            0.5 / theta
        } else {
            theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
        };
        let c = 1.0 / (t * t + 1.0).sqrt();
        let s = t * c;

        a[(p, p)] -= t * apq;
        a[(q, q)] += t * apq;
        a[(p, q)] = 0.0;
        a[(q, p)] = 0.0;

        for r in 0..n {
            if r != p && r != q {
                let arp = a[(r, p)];
                let arq = a[(r, q)];
                a[(r, p)] = c * arp - s * arq;
                a[(p, r)] = a[(r, p)];
                a[(r, q)] = s * arp + c * arq;
                a[(q, r)] = a[(r, q)];
            }
            let vrp = v[(r, p)];
            let vrq = v[(r, q)];
            v[(r, p)] = c * vrp - s * vrq;
            v[(r, q)] = s * vrp + c * vrq;
        }
    }

    (a.diag().to_vec(), v)
}

/// PCA of a raster stack, with one output raster per kept component
#[derive(Debug)]
pub struct PcaRasters {
    /// Component rasters (PC1, PC2, ...); invalid pixels are NaN
    pub components: Vec<Raster<f64>>,
    /// Underlying decomposition
    pub result: PcaResult,
}

/// Compute PCA over the valid pixels of a band stack.
///
/// Pixels flagged invalid in any band are excluded from the decomposition
/// and written as NaN in every component raster.
pub fn pca_stack<T: RasterElement>(stack: &RasterStack<T>, params: &PcaParams) -> Result<PcaRasters> {
    let matrix = PixelMatrix::from_stack(stack)?;
    let result = pca(&matrix, params)?;

    let mut components = Vec::with_capacity(result.n_components());
    for scores in result.scores.axis_iter(Axis(1)) {
        let values: Vec<f64> = scores.to_vec();
        let mut raster = matrix.scatter(&values, f64::NAN)?;
        raster.set_transform(*stack.transform());
        raster.set_nodata(Some(f64::NAN));
        components.push(raster);
    }

    Ok(PcaRasters { components, result })
}
