//! # terraclass colormap
//!
//! Class palettes and label-raster rendering for terraclass.
//!
//! A [`ClassPalette`] assigns one color per class id, either explicitly or
//! sampled from one of the built-in [`ColorScheme`]s. [`labels_to_rgba`]
//! turns a classified raster into an RGBA buffer with transparent nodata.
//!
//! ## Usage
//!
//! ```
//! use terraclass_colormap::{labels_to_rgba, ClassPalette, ColorScheme};
//! use terraclass_core::Raster;
//!
//! let labels = Raster::from_vec(vec![0, 1, 1, 0], 2, 2).unwrap();
//! let palette = ClassPalette::from_scheme(ColorScheme::LandCover, 2);
//! let rgba = labels_to_rgba(&labels, &palette);
//! assert_eq!(rgba.len(), 16);
//! ```

mod palette;
mod render;
mod scheme;

pub use palette::ClassPalette;
pub use render::labels_to_rgba;
pub use scheme::{evaluate, sample, ColorScheme, ColorStop, Rgb};
