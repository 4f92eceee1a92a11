//! Co-registered multi-band raster stack

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use ndarray::Array2;

/// A stack of co-registered bands sharing one grid and one no-data sentinel.
///
/// A pixel is valid when no band holds the sentinel at that position
/// (floating NaN always counts as no-data). Without a sentinel every
/// non-NaN pixel is valid.
#[derive(Debug, Clone)]
pub struct RasterStack<T: RasterElement> {
    bands: Vec<Raster<T>>,
    nodata: Option<T>,
}

impl<T: RasterElement> RasterStack<T> {
    /// Stack bands under an explicit no-data sentinel.
    ///
    /// Every band must have the dimensions of the first one.
    pub fn new(bands: Vec<Raster<T>>, nodata: Option<T>) -> Result<Self> {
        let Some(first) = bands.first() else {
            return Err(Error::DegenerateInput("raster stack has no bands".into()));
        };

        let (rows, cols) = first.shape();
        if let Some(band) = bands.iter().find(|b| b.shape() != (rows, cols)) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: band.rows(),
                ac: band.cols(),
            });
        }

        Ok(Self { bands, nodata })
    }

    /// Stack bands, taking the sentinel declared by the first band
    pub fn from_bands(bands: Vec<Raster<T>>) -> Result<Self> {
        let nodata = bands.first().and_then(|b| b.nodata());
        Self::new(bands, nodata)
    }

    /// Number of bands
    pub fn n_bands(&self) -> usize {
        self.bands.len()
    }

    /// Grid dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.bands[0].shape()
    }

    /// Number of pixels per band
    pub fn len(&self) -> usize {
        self.bands[0].len()
    }

    /// Whether the grid has no pixels
    pub fn is_empty(&self) -> bool {
        self.bands[0].is_empty()
    }

    /// Band by index
    pub fn band(&self, index: usize) -> Option<&Raster<T>> {
        self.bands.get(index)
    }

    /// All bands in stack order
    pub fn bands(&self) -> &[Raster<T>] {
        &self.bands
    }

    /// Shared no-data sentinel
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Georeferencing of the stack (taken from the first band)
    pub fn transform(&self) -> &GeoTransform {
        self.bands[0].transform()
    }

    /// Whether the pixel at flat row-major index `idx` is valid in every band
    pub fn is_valid(&self, idx: usize) -> bool {
        let cols = self.shape().1;
        let (row, col) = (idx / cols, idx % cols);
        self.bands
            .iter()
            .all(|band| !band.data()[(row, col)].is_nodata(self.nodata))
    }

    /// Boolean validity mask on the stack grid
    pub fn validity_mask(&self) -> Array2<bool> {
        let mut mask = Array2::from_elem(self.shape(), true);
        for band in &self.bands {
            ndarray::Zip::from(&mut mask)
                .and(band.data())
                .for_each(|valid, value| *valid &= !value.is_nodata(self.nodata));
        }
        mask
    }

    /// Number of valid pixels
    pub fn valid_count(&self) -> usize {
        self.validity_mask().iter().filter(|&&v| v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(values: &[u16]) -> Raster<u16> {
        Raster::from_vec(values.to_vec(), 2, 2).unwrap()
    }

    #[test]
    fn test_mask_any_band_nodata() {
        let stack = RasterStack::new(
            vec![band(&[0, 5, 6, 7]), band(&[1, 2, 0, 3])],
            Some(0),
        )
        .unwrap();

        let mask = stack.validity_mask();
        assert!(!mask[(0, 0)]);
        assert!(mask[(0, 1)]);
        assert!(!mask[(1, 0)]);
        assert!(mask[(1, 1)]);
        assert_eq!(stack.valid_count(), 2);
        assert!(stack.is_valid(3));
        assert!(!stack.is_valid(2));
    }

    #[test]
    fn test_no_sentinel_all_valid() {
        let stack = RasterStack::new(vec![band(&[0, 0, 0, 0])], None).unwrap();
        assert_eq!(stack.valid_count(), 4);
    }

    #[test]
    fn test_float_nan_invalid_without_sentinel() {
        let b = Raster::from_vec(vec![1.0, f64::NAN, 2.0, 3.0], 2, 2).unwrap();
        let stack = RasterStack::from_bands(vec![b]).unwrap();
        assert_eq!(stack.valid_count(), 3);
    }

    #[test]
    fn test_shape_mismatch() {
        let a: Raster<u16> = Raster::new(2, 2);
        let b: Raster<u16> = Raster::new(2, 3);
        let result = RasterStack::new(vec![a, b], None);
        assert!(matches!(
            result,
            Err(Error::SizeMismatch { er: 2, ec: 2, ar: 2, ac: 3 })
        ));
    }

    #[test]
    fn test_empty_stack() {
        let result = RasterStack::<u16>::new(Vec::new(), None);
        assert!(matches!(result, Err(Error::DegenerateInput(_))));
    }

    #[test]
    fn test_from_bands_uses_first_sentinel() {
        let mut a = band(&[9, 1, 2, 3]);
        a.set_nodata(Some(9));
        let stack = RasterStack::from_bands(vec![a, band(&[4, 5, 6, 7])]).unwrap();
        assert_eq!(stack.nodata(), Some(9));
        assert_eq!(stack.valid_count(), 3);
    }
}
