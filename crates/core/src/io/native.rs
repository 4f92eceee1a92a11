//! Native GeoTIFF reading/writing built on the `tiff` crate.
//!
//! Georeferencing is limited to ModelPixelScale + ModelTiepoint (north-up
//! grids); the no-data sentinel travels in the GDAL_NODATA ASCII tag.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{ColorType, Gray32Float, GrayI32, RGBA8};
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: Tag = Tag::Unknown(33550);
const MODEL_TIEPOINT: Tag = Tag::Unknown(33922);
const GEO_KEY_DIRECTORY: Tag = Tag::Unknown(34735);
const GDAL_NODATA: Tag = Tag::Unknown(42113);

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Skip the GDAL_NODATA tag even when the raster declares a sentinel
    pub omit_nodata: bool,
}

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let image = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    macro_rules! cast_all {
        ($buf:expr) => {
            $buf.iter()
                .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
                .collect::<Vec<T>>()
        };
    }

    let data: Vec<T> = match image {
        DecodingResult::U8(buf) => cast_all!(buf),
        DecodingResult::U16(buf) => cast_all!(buf),
        DecodingResult::U32(buf) => cast_all!(buf),
        DecodingResult::I8(buf) => cast_all!(buf),
        DecodingResult::I16(buf) => cast_all!(buf),
        DecodingResult::I32(buf) => cast_all!(buf),
        DecodingResult::F32(buf) => cast_all!(buf),
        DecodingResult::F64(buf) => cast_all!(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".into())),
    };

    // Multi-sample images decode interleaved; only single-band files are accepted
    if data.len() != rows * cols {
        return Err(Error::UnsupportedDataType(format!(
            "expected a single-band image, got {} samples for {}x{} pixels",
            data.len(),
            cols,
            rows
        )));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    if let Ok(text) = decoder.get_tag_ascii_string(GDAL_NODATA) {
        raster.set_nodata(parse_nodata(&text));
    }

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn parse_nodata<T: RasterElement>(text: &str) -> Option<T> {
    let value: f64 = text.trim().trim_end_matches('\0').parse().ok()?;
    T::from_f64(value)
}

/// Write a Raster to a GeoTIFF file.
///
/// Float rasters are stored as 32-bit float, integer rasters (labels) as
/// 32-bit signed integers.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file), options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(
    raster: &Raster<T>,
    options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;
    let (rows, cols) = raster.shape();
    let nodata = if options.omit_nodata { None } else { raster.nodata() };

    if T::is_float() {
        let data: Vec<f32> = raster
            .data()
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
            .collect();
        let image = encoder
            .new_image::<Gray32Float>(cols as u32, rows as u32)
            .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
        finish_image(image, raster.transform(), nodata, &data)
    } else {
        let data: Vec<i32> = raster
            .data()
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(i32::MIN))
            .collect();
        let image = encoder
            .new_image::<GrayI32>(cols as u32, rows as u32)
            .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
        finish_image(image, raster.transform(), nodata, &data)
    }
}

/// Write an RGBA pixel buffer (4 bytes per pixel, row-major) as a georeferenced TIFF
pub fn write_rgba_geotiff<P: AsRef<Path>>(
    rgba: &[u8],
    rows: usize,
    cols: usize,
    transform: &GeoTransform,
    path: P,
) -> Result<()> {
    if rgba.len() != rows * cols * 4 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let file = File::create(path.as_ref())?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;
    let image = encoder
        .new_image::<RGBA8>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
    finish_image::<_, _, _, f64>(image, transform, None, rgba)
}

fn finish_image<W, C, K, N>(
    mut image: ImageEncoder<'_, W, C, K>,
    transform: &GeoTransform,
    nodata: Option<N>,
    data: &[C::Inner],
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    K: TiffKind,
    N: RasterElement,
    [C::Inner]: tiff::encoder::TiffValue,
{
    let tag_err = |e: tiff::TiffError| Error::Other(format!("Cannot write GeoTIFF tag: {}", e));

    let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(MODEL_PIXEL_SCALE, &scale[..])
        .map_err(tag_err)?;

    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    image
        .encoder()
        .write_tag(MODEL_TIEPOINT, &tiepoint[..])
        .map_err(tag_err)?;

    // Minimal key directory: projected model, pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(GEO_KEY_DIRECTORY, &geokeys[..])
        .map_err(tag_err)?;

    if let Some(nd) = nodata {
        let text = nd.to_string();
        image
            .encoder()
            .write_tag(GDAL_NODATA, text.as_str())
            .map_err(tag_err)?;
    }

    image
        .write_data(data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip_keeps_nodata_and_transform() {
        let mut labels = Raster::from_vec(vec![0, 1, -1, 2], 2, 2).unwrap();
        labels.set_nodata(Some(-1));
        labels.set_transform(GeoTransform::new(578_524.0, 7_800_187.0, 30.0, -30.0));

        let buf = write_geotiff_to_buffer(&labels, None).unwrap();
        let back: Raster<i32> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.data(), labels.data());
        assert_eq!(back.nodata(), Some(-1));
        assert_eq!(back.transform(), labels.transform());
    }

    #[test]
    fn test_float_band_roundtrip() {
        let band = Raster::from_vec(vec![0.25, 8.5, 100.0, f64::NAN], 2, 2).unwrap();
        let buf = write_geotiff_to_buffer(&band, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.get(0, 1).unwrap(), 8.5);
        assert!(back.get(1, 1).unwrap().is_nan());
        assert_eq!(back.nodata(), None);
    }

    #[test]
    fn test_omit_nodata_option() {
        let mut labels = Raster::from_vec(vec![0, 1, 2, 3], 2, 2).unwrap();
        labels.set_nodata(Some(255));
        let options = GeoTiffOptions { omit_nodata: true };
        let buf = write_geotiff_to_buffer(&labels, Some(options)).unwrap();
        let back: Raster<i32> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.nodata(), None);
    }

    #[test]
    fn test_parse_nodata() {
        assert_eq!(parse_nodata::<i32>("-9999"), Some(-9999));
        assert_eq!(parse_nodata::<u8>("0\0"), Some(0));
        assert_eq!(parse_nodata::<u8>("nan"), None);
    }
}
