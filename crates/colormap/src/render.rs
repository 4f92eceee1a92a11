//! Label-raster-to-RGBA rendering.

use crate::palette::ClassPalette;
use terraclass_core::raster::Raster;

/// Convert a label raster to an RGBA pixel buffer.
///
/// Returns a `Vec<u8>` of length `rows * cols * 4` in row-major order.
/// Nodata cells and labels missing from the palette are fully transparent.
pub fn labels_to_rgba(labels: &Raster<i32>, palette: &ClassPalette) -> Vec<u8> {
    let nodata = labels.nodata();
    let mut rgba = vec![0u8; labels.len() * 4];

    for (px, &label) in rgba.chunks_exact_mut(4).zip(labels.data().iter()) {
        if nodata == Some(label) {
            continue;
        }
        if let Some(color) = palette.color(label) {
            px.copy_from_slice(&[color.r, color.g, color.b, 255]);
        }
    }

    rgba
}
