use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use log::info;

use crate::render::Canvas;

const METERS_PER_INCH: f64 = 0.0254;

/// Composite a transparent canvas onto white
fn flatten_on_white(image: &RgbaImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let mut background = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut background, image, 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(background).to_rgb8())
}

/// Encode a PNG carrying the canvas resolution in its pHYs chunk
fn write_png(image: &DynamicImage, path: &Path, dpi: f64) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width(), image.height());

    let color = match image {
        DynamicImage::ImageRgb8(_) => png::ColorType::Rgb,
        _ => png::ColorType::Rgba,
    };
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);

    let pixels_per_meter = (dpi / METERS_PER_INCH).round() as u32;
    encoder.set_pixel_dims(Some(png::PixelDimensions {
        xppu: pixels_per_meter,
        yppu: pixels_per_meter,
        unit: png::Unit::Meter,
    }));

    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer
        .write_image_data(image.as_bytes())
        .context("Failed to write PNG data")?;
    writer.finish().context("Failed to finish PNG")?;
    Ok(())
}

/// Save the canvas, creating parent directories as needed.
///
/// The format follows the file extension. Unless `transparent` is set the
/// image is flattened onto a white background.
pub fn write_image(canvas: Canvas, path: &Path, transparent: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory {}", parent.display())
            })?;
        }
    }

    let format = ImageFormat::from_path(path)
        .with_context(|| format!("Unsupported output format for {}", path.display()))?;

    let dpi = canvas.dpi();
    let image = canvas.into_image();
    let (width, height) = image.dimensions();
    let image = if transparent {
        DynamicImage::ImageRgba8(image)
    } else {
        flatten_on_white(&image)
    };

    if format == ImageFormat::Png {
        write_png(&image, path, dpi)
            .with_context(|| format!("Failed to write image {}", path.display()))?;
    } else {
        image
            .save_with_format(path, format)
            .with_context(|| format!("Failed to write image {}", path.display()))?;
    }

    info!("Wrote {}x{} map to {}", width, height, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{BoundingBox, Coord};

    fn canvas_with_line() -> Canvas {
        let bounds = BoundingBox {
            min_longitude: 0.0,
            max_longitude: 1.0,
            min_latitude: 0.0,
            max_latitude: 1.0,
        };
        let mut canvas = Canvas::new(bounds, 2.0, 1.0, 40.0);
        canvas.stroke_polyline(
            &[Coord::new(0.5, 0.1), Coord::new(0.5, 0.9)],
            Rgba([0, 0, 0, 255]),
            3.0,
        );
        canvas
    }

    #[test]
    fn test_writes_white_background_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/map.png");
        write_image(canvas_with_line(), &path, false).unwrap();

        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (40, 20));
        let rgba = written.to_rgba8();
        assert_eq!(*rgba.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*rgba.get_pixel(20, 10), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_transparent_keeps_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.png");
        write_image(canvas_with_line(), &path, true).unwrap();

        let rgba = image::open(&path).unwrap().to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_png_records_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.png");
        write_image(canvas_with_line(), &path, false).unwrap();

        let decoder = png::Decoder::new(File::open(&path).unwrap());
        let reader = decoder.read_info().unwrap();
        let dims = reader.info().pixel_dims.unwrap();
        // 40 dpi is about 1575 pixels per meter
        assert_eq!((dims.xppu, dims.yppu), (1575, 1575));
        assert!(matches!(dims.unit, png::Unit::Meter));
    }

    #[test]
    fn test_other_formats_use_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.bmp");
        write_image(canvas_with_line(), &path, false).unwrap();
        assert_eq!(image::open(&path).unwrap().width(), 40);
    }

    #[test]
    fn test_unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_image(canvas_with_line(), &dir.path().join("map.xyz"), false).unwrap_err();
        assert!(format!("{:#}", err).contains("map.xyz"));
    }
}
