//! # terraclass core
//!
//! Core types, errors and I/O shared by the terraclass crates.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `RasterStack<T>`: Co-registered bands with one nodata sentinel
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `Error`/`Result`: the error model used by every engine
//! - Native GeoTIFF reading and writing

pub mod error;
pub mod io;
pub mod raster;

pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, RasterStack};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, RasterStack};
}
