//! Pixel matrices gathered from the valid pixels of a raster stack

use ndarray::{Array2, ArrayView1};
use terraclass_core::raster::{Raster, RasterElement, RasterStack};
use terraclass_core::{Error, Result};

/// Valid pixels as an `n_samples x n_features` matrix.
///
/// Each row remembers the flat row-major index of the pixel it came from,
/// so per-sample results can be written back onto the source grid.
#[derive(Debug, Clone)]
pub struct PixelMatrix {
    data: Array2<f64>,
    pixels: Vec<usize>,
    grid: (usize, usize),
}

impl PixelMatrix {
    /// Wrap a plain sample matrix; row `i` maps to pixel `i` of an `n x 1` grid
    pub fn new(data: Array2<f64>) -> Self {
        let n = data.nrows();
        Self {
            data,
            pixels: (0..n).collect(),
            grid: (n, 1),
        }
    }

    /// Gather every valid pixel of the stack, one column per band.
    ///
    /// Fails with [`Error::DegenerateInput`] when no pixel is valid.
    pub fn from_stack<T: RasterElement>(stack: &RasterStack<T>) -> Result<Self> {
        let mask = stack.validity_mask();
        let pixels: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, &valid)| valid.then_some(idx))
            .collect();

        if pixels.is_empty() {
            return Err(Error::DegenerateInput(
                "no valid pixels across the band stack".into(),
            ));
        }

        let n_bands = stack.n_bands();
        let mut data = Array2::zeros((pixels.len(), n_bands));
        for (b, band) in stack.bands().iter().enumerate() {
            let valid_values = band
                .data()
                .iter()
                .zip(mask.iter())
                .filter_map(|(&value, &valid)| valid.then_some(value));
            for (row, value) in valid_values.enumerate() {
                data[(row, b)] = value.to_f64().ok_or_else(|| {
                    Error::UnsupportedDataType(format!("band {} value not representable as f64", b))
                })?;
            }
        }

        Ok(Self {
            data,
            pixels,
            grid: stack.shape(),
        })
    }

    /// Same pixels with a different feature set (e.g. principal component scores)
    pub fn with_features(&self, data: Array2<f64>) -> Result<Self> {
        if data.nrows() != self.n_samples() {
            return Err(Error::InvalidDimensions {
                width: data.ncols(),
                height: data.nrows(),
            });
        }
        Ok(Self {
            data,
            pixels: self.pixels.clone(),
            grid: self.grid,
        })
    }

    /// Number of samples (rows)
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of features (columns)
    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// The sample matrix
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Feature vector of one sample
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.data.row(i)
    }

    /// Flat grid index of every sample
    pub fn pixel_indices(&self) -> &[usize] {
        &self.pixels
    }

    /// Dimensions (rows, cols) of the source grid
    pub fn grid_shape(&self) -> (usize, usize) {
        self.grid
    }

    /// Write one value per sample back onto the grid; other cells get `fill`
    pub fn scatter<U: RasterElement>(&self, values: &[U], fill: U) -> Result<Raster<U>> {
        if values.len() != self.n_samples() {
            return Err(Error::InvalidDimensions {
                width: 1,
                height: values.len(),
            });
        }

        let (rows, cols) = self.grid;
        let mut out = vec![fill; rows * cols];
        for (&idx, &value) in self.pixels.iter().zip(values) {
            out[idx] = value;
        }
        Raster::from_vec(out, rows, cols)
    }
}
