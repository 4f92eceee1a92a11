//! Unsupervised classification of raster stacks
//!
//! - **PCA**: Principal Component Analysis with variance-threshold selection
//! - **K-means**: Reproducible clustering driven by a 48-bit LCG stream
//! - **Majority filter**: Modal smoothing of label rasters
//! - **Pipeline**: mask, reduce, cluster and smooth in one call

mod kmeans;
mod majority;
mod matrix;
mod pca;
mod pipeline;
mod random;

pub use kmeans::{kmeans, ClusterModel, Clustering, KmeansParams, Standardizer};
pub use majority::majority_filter;
pub use matrix::PixelMatrix;
pub use pca::{pca, pca_stack, PcaParams, PcaRasters, PcaResult};
pub use pipeline::{classify_stack, Classification, ClassifyParams};
pub use random::{Generator, RandomStream, ShuffledIndices};
