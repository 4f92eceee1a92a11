//! # terraclass algorithms
//!
//! Unsupervised land-cover classification of multi-band rasters.
//!
//! ## Available Algorithm Categories
//!
//! - **classification**: Principal component reduction, reproducible K-means,
//!   majority smoothing and the end-to-end `classify_stack` pipeline
//!
//! Pixel-independent passes run on rayon when the `parallel` feature is
//! enabled (the default).

pub mod classification;
pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        classify_stack, kmeans, majority_filter, pca, pca_stack,
        Classification, ClassifyParams, Clustering, ClusterModel, Generator,
        KmeansParams, PcaParams, PcaRasters, PcaResult, PixelMatrix, RandomStream,
    };
    pub use terraclass_core::prelude::*;
}
