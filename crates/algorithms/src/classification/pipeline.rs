//! End-to-end unsupervised classification of a band stack
//!
//! mask -> pixel matrix -> optional PCA -> K-means -> label raster ->
//! optional majority smoothing.

use serde::{Deserialize, Serialize};
use terraclass_core::raster::{Raster, RasterElement, RasterStack};
use terraclass_core::{Error, Result};
use tracing::info;

use super::kmeans::{kmeans, Clustering, KmeansParams};
use super::majority::majority_filter;
use super::matrix::PixelMatrix;
use super::pca::{pca, PcaParams, PcaResult};

/// Kept components with less variance than this share of the leading one carry no signal
const NULL_COMPONENT_RATIO: f64 = 1e-10;

/// Parameters for [`classify_stack`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyParams {
    /// Clustering parameters
    pub kmeans: KmeansParams,
    /// Cluster principal component scores instead of raw bands
    pub pca: Option<PcaParams>,
    /// Majority filter width; 0 disables smoothing (default: 0)
    pub smoothing_window: usize,
    /// Label written to pixels that carry no class (default: -9999)
    pub nodata_value: i32,
}

impl Default for ClassifyParams {
    fn default() -> Self {
        Self {
            kmeans: KmeansParams::default(),
            pca: None,
            smoothing_window: 0,
            nodata_value: -9999,
        }
    }
}

impl ClassifyParams {
    /// Validate every nested parameter set
    pub fn validate(&self) -> Result<()> {
        self.kmeans.validate()?;
        if let Some(pca) = &self.pca {
            pca.validate()?;
        }
        if self.smoothing_window != 0 && (self.smoothing_window < 3 || self.smoothing_window % 2 == 0) {
            return Err(Error::invalid_parameter(
                "smoothing_window",
                self.smoothing_window,
                "must be 0 (disabled) or an odd width >= 3",
            ));
        }
        let k = self.kmeans.n_clusters as i64;
        if (0..k).contains(&(self.nodata_value as i64)) {
            return Err(Error::invalid_parameter(
                "nodata_value",
                self.nodata_value,
                format!("collides with class labels 0..{}", k),
            ));
        }
        Ok(())
    }
}

/// Result of [`classify_stack`]
#[derive(Debug, Clone)]
pub struct Classification {
    /// Canonical labels before smoothing; nodata where any band was invalid
    pub labels: Raster<i32>,
    /// Majority-filtered labels, when smoothing is enabled
    pub smoothed: Option<Raster<i32>>,
    /// Cluster assignment, model and per-class counts
    pub clustering: Clustering,
    /// Principal components the clustering ran on, if any
    pub pca: Option<PcaResult>,
}

impl Classification {
    /// The final label raster: smoothed if available, raw otherwise
    pub fn output(&self) -> &Raster<i32> {
        self.smoothed.as_ref().unwrap_or(&self.labels)
    }

    /// Pixel count per class label, from the unsmoothed labels
    pub fn counts(&self) -> &[usize] {
        &self.clustering.counts
    }
}

/// Classify every valid pixel of a band stack.
///
/// Pixels that are nodata in any band are excluded from PCA and clustering
/// and receive `params.nodata_value` in both output rasters.
pub fn classify_stack<T: RasterElement>(
    stack: &RasterStack<T>,
    params: &ClassifyParams,
) -> Result<Classification> {
    params.validate()?;

    let matrix = PixelMatrix::from_stack(stack)?;
    info!(
        "classifying {} valid pixels of {} ({} bands)",
        matrix.n_samples(),
        stack.len(),
        stack.n_bands()
    );

    let (features, pca_result) = match &params.pca {
        Some(pca_params) => {
            let result = pca(&matrix, pca_params)?;
            reject_null_components(&result)?;
            let features = matrix.with_features(result.scores.clone())?;
            (features, Some(result))
        }
        None => (matrix, None),
    };

    let clustering = kmeans(&features, &params.kmeans)?;

    let labels_i32: Vec<i32> = clustering.labels.iter().map(|&l| l as i32).collect();
    let mut labels = features.scatter(&labels_i32, params.nodata_value)?;
    labels.set_transform(*stack.transform());
    labels.set_nodata(Some(params.nodata_value));

    let smoothed = match params.smoothing_window {
        0 => None,
        window => Some(majority_filter(&labels, window)?),
    };

    Ok(Classification {
        labels,
        smoothed,
        clustering,
        pca: pca_result,
    })
}

/// A kept component with (numerically) zero variance has scores made of
/// round-off noise, which standardization would blow up into a feature.
fn reject_null_components(result: &PcaResult) -> Result<()> {
    let leading = result.eigenvalues.first().copied().unwrap_or(0.0);
    match result
        .eigenvalues
        .iter()
        .position(|&ev| !(ev > NULL_COMPONENT_RATIO * leading))
    {
        Some(band) => Err(Error::ConstantBand { band }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraclass_core::GeoTransform;

    fn halves_stack() -> RasterStack<f64> {
        let data: Vec<f64> = (0..16).map(|i| if i % 4 < 2 { 1.0 } else { 9.0 }).collect();
        let mut band = Raster::from_vec(data, 4, 4).unwrap();
        band.set_transform(GeoTransform::new(500.0, 100.0, 10.0, -10.0));
        RasterStack::new(vec![band], None).unwrap()
    }

    #[test]
    fn test_classify_halves() {
        let params = ClassifyParams {
            kmeans: KmeansParams { n_clusters: 2, max_iterations: 1, tolerance: 1e-6, ..Default::default() },
            ..Default::default()
        };
        let result = classify_stack(&halves_stack(), &params).unwrap();

        for row in 0..4 {
            assert_eq!(result.labels.get(row, 0).unwrap(), 0);
            assert_eq!(result.labels.get(row, 1).unwrap(), 0);
            assert_eq!(result.labels.get(row, 2).unwrap(), 1);
            assert_eq!(result.labels.get(row, 3).unwrap(), 1);
        }
        assert_eq!(result.counts(), &[8, 8]);
        assert_eq!(result.labels.transform().origin_x, 500.0);
        assert!(result.smoothed.is_none());
        assert!(std::ptr::eq(result.output(), &result.labels));
    }

    #[test]
    fn test_nodata_pixels_keep_sentinel() {
        let nd = -1.0;
        let b1 = Raster::from_vec(vec![1.0, 1.0, nd, 9.0, 1.0, 1.0, 9.0, 9.0, 1.0, 9.0, 9.0, 9.0], 3, 4).unwrap();
        let b2 = Raster::from_vec(vec![2.0, 2.0, 8.0, 8.0, 2.0, nd, 8.0, 8.0, 2.0, 8.0, 8.0, 8.0], 3, 4).unwrap();
        let stack = RasterStack::new(vec![b1, b2], Some(nd)).unwrap();

        let params = ClassifyParams {
            kmeans: KmeansParams { n_clusters: 2, ..Default::default() },
            smoothing_window: 3,
            nodata_value: 255,
            ..Default::default()
        };
        let result = classify_stack(&stack, &params).unwrap();

        let raw = result.labels.data().as_slice().unwrap();
        let smooth = result.output().data().as_slice().unwrap();
        for idx in [2, 5] {
            assert_eq!(raw[idx], 255);
            assert_eq!(smooth[idx], 255);
        }
        assert_eq!(result.labels.nodata(), Some(255));
        assert_eq!(result.counts().iter().sum::<usize>(), 10);
        assert!(raw.iter().filter(|&&v| v != 255).all(|&v| v == 0 || v == 1));
    }

    #[test]
    fn test_classify_on_principal_components() {
        let a: Vec<f64> = (0..16).map(|i| if i % 4 < 2 { 1.0 } else { 9.0 }).collect();
        let b: Vec<f64> = a.iter().map(|v| 2.0 * v + 1.0).collect();
        let stack = RasterStack::new(
            vec![Raster::from_vec(a, 4, 4).unwrap(), Raster::from_vec(b, 4, 4).unwrap()],
            None,
        )
        .unwrap();

        let params = ClassifyParams {
            kmeans: KmeansParams { n_clusters: 2, ..Default::default() },
            pca: Some(PcaParams { variance_threshold: 0.99, scale: false }),
            ..Default::default()
        };
        let result = classify_stack(&stack, &params).unwrap();

        let pca = result.pca.as_ref().unwrap();
        assert_eq!(pca.n_components(), 1);
        assert_eq!(result.counts(), &[8, 8]);
        assert_eq!(result.labels.get(0, 0).unwrap(), result.labels.get(3, 1).unwrap());
        assert_ne!(result.labels.get(0, 0).unwrap(), result.labels.get(0, 3).unwrap());
    }

    #[test]
    fn test_all_components_of_duplicated_band_rejected() {
        let a: Vec<f64> = (0..16).map(|i| (if i % 4 < 2 { 1.0 } else { 9.0 }) + (i / 4) as f64).collect();
        let stack = RasterStack::new(
            vec![Raster::from_vec(a.clone(), 4, 4).unwrap(), Raster::from_vec(a, 4, 4).unwrap()],
            None,
        )
        .unwrap();

        for scale in [false, true] {
            let params = ClassifyParams {
                kmeans: KmeansParams { n_clusters: 2, ..Default::default() },
                pca: Some(PcaParams { variance_threshold: 1.0, scale }),
                ..Default::default()
            };
            assert!(matches!(
                classify_stack(&stack, &params),
                Err(Error::ConstantBand { band: 1 })
            ));
        }

        // Dropping the null component lets the same stack through
        let params = ClassifyParams {
            kmeans: KmeansParams { n_clusters: 2, ..Default::default() },
            pca: Some(PcaParams { variance_threshold: 0.95, scale: false }),
            ..Default::default()
        };
        let result = classify_stack(&stack, &params).unwrap();
        assert_eq!(result.pca.as_ref().unwrap().n_components(), 1);
    }

    #[test]
    fn test_invalid_classify_params() {
        let bad = [
            ClassifyParams { smoothing_window: 2, ..Default::default() },
            ClassifyParams { smoothing_window: 1, ..Default::default() },
            ClassifyParams { nodata_value: 3, ..Default::default() },
            ClassifyParams { nodata_value: 0, ..Default::default() },
            ClassifyParams {
                pca: Some(PcaParams { variance_threshold: 1.5, scale: false }),
                ..Default::default()
            },
        ];
        for params in bad {
            assert!(matches!(params.validate(), Err(Error::InvalidParameter { .. })));
        }
        assert!(ClassifyParams { nodata_value: 6, ..Default::default() }.validate().is_ok());
    }
}
