//! Categorical palettes for class-label rasters.

use crate::scheme::{sample, ColorScheme, Rgb};
use terraclass_core::{Error, Result};

/// One color per class id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPalette {
    entries: Vec<(i32, Rgb)>,
}

impl ClassPalette {
    /// Pair class ids with colors; the two lists must have the same length.
    pub fn new(class_ids: &[i32], colors: &[Rgb]) -> Result<Self> {
        if class_ids.len() != colors.len() {
            return Err(Error::invalid_parameter(
                "palette",
                colors.len(),
                format!("expected one color per class id ({} ids)", class_ids.len()),
            ));
        }
        let mut entries: Vec<(i32, Rgb)> = class_ids.iter().copied().zip(colors.iter().copied()).collect();
        entries.sort_by_key(|&(id, _)| id);
        if let Some(w) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(Error::invalid_parameter("class_ids", w[0].0, "duplicate class id"));
        }
        Ok(Self { entries })
    }

    /// Palette for classes `0..n_classes` sampled from a scheme.
    pub fn from_scheme(scheme: ColorScheme, n_classes: usize) -> Self {
        let entries = sample(scheme, n_classes)
            .into_iter()
            .enumerate()
            .map(|(id, color)| (id as i32, color))
            .collect();
        Self { entries }
    }

    /// Palette for classes `0..n` from hex strings such as `#1f78b4`.
    pub fn from_hex(colors: &[&str]) -> Result<Self> {
        let parsed = colors.iter().map(|c| Rgb::from_hex(c)).collect::<Result<Vec<_>>>()?;
        let ids: Vec<i32> = (0..parsed.len() as i32).collect();
        Self::new(&ids, &parsed)
    }

    /// Color of a class, if it has one.
    pub fn color(&self, class_id: i32) -> Option<Rgb> {
        self.entries
            .binary_search_by_key(&class_id, |&(id, _)| id)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the palette has no classes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(class id, color)` pairs in ascending id order.
    pub fn entries(&self) -> &[(i32, Rgb)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_mismatch_rejected() {
        let err = ClassPalette::new(&[0, 1, 2], &[Rgb::new(0, 0, 0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "palette", .. }));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let colors = [Rgb::new(0, 0, 0), Rgb::new(1, 1, 1)];
        assert!(ClassPalette::new(&[4, 4], &colors).is_err());
    }

    #[test]
    fn lookup_by_id() {
        let colors = [Rgb::new(10, 0, 0), Rgb::new(0, 20, 0)];
        let palette = ClassPalette::new(&[7, 2], &colors).unwrap();
        assert_eq!(palette.color(7), Some(Rgb::new(10, 0, 0)));
        assert_eq!(palette.color(2), Some(Rgb::new(0, 20, 0)));
        assert_eq!(palette.color(0), None);
        assert_eq!(palette.entries()[0].0, 2);
    }

    #[test]
    fn scheme_palette_covers_classes() {
        let palette = ClassPalette::from_scheme(ColorScheme::LandCover, 6);
        assert_eq!(palette.len(), 6);
        assert!((0..6).all(|id| palette.color(id).is_some()));
        assert!(palette.color(6).is_none());
    }

    #[test]
    fn hex_palette() {
        let palette = ClassPalette::from_hex(&["#000000", "#ffffff"]).unwrap();
        assert_eq!(palette.color(1), Some(Rgb::new(255, 255, 255)));
        assert!(ClassPalette::from_hex(&["nope"]).is_err());
    }
}
