use image::{imageops, Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::geo::{BoundingBox, Coord};

/// Points per inch, the unit of configured line widths
const POINTS_PER_INCH: f64 = 72.0;

/// Raster drawing surface covering one bounding box.
///
/// Starts fully transparent; the writer decides the background.
pub struct Canvas {
    image: RgbaImage,
    bounds: BoundingBox,
    dpi: f64,
}

impl Canvas {
    /// The longer side is `figure_size` inches at `dpi`, the shorter side
    /// follows `aspect_ratio`.
    pub fn new(bounds: BoundingBox, aspect_ratio: f64, figure_size: f64, dpi: f64) -> Self {
        let long_side = (figure_size * dpi).round().max(1.0);
        let (width, height) = if aspect_ratio >= 1.0 {
            (long_side, (long_side / aspect_ratio).round())
        } else {
            ((long_side * aspect_ratio).round(), long_side)
        };

        Self {
            image: RgbaImage::new(width.max(1.0) as u32, height.max(1.0) as u32),
            bounds,
            dpi,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    #[cfg(test)]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Convert a width in points to pixels at this canvas' resolution
    pub fn points_to_pixels(&self, points: f64) -> f32 {
        (points * self.dpi / POINTS_PER_INCH) as f32
    }

    /// Maps geographic coordinates to pixels; y grows downward
    pub fn project(&self, coord: Coord) -> (f32, f32) {
        let (x, y) = self.project_f64(coord);
        (x as f32, y as f32)
    }

    fn project_f64(&self, coord: Coord) -> (f64, f64) {
        let x = (coord.lon - self.bounds.min_longitude) / self.bounds.width() * self.width() as f64;
        let y =
            (self.bounds.max_latitude - coord.lat) / self.bounds.height() * self.height() as f64;
        (x, y)
    }

    /// Draw a polyline `width_px` wide; returns false if nothing could be drawn
    pub fn stroke_polyline(&mut self, points: &[Coord], color: Rgba<u8>, width_px: f32) -> bool {
        if points.len() < 2 {
            return false;
        }

        let margin = width_px.max(1.0);
        let projected: Vec<(f32, f32)> = points.iter().map(|&p| self.project(p)).collect();
        for pair in projected.windows(2) {
            if self.segment_outside(pair[0], pair[1], margin) {
                continue;
            }
            draw_thick_line_segment_mut(&mut self.image, pair[0], pair[1], color, width_px);
        }
        true
    }

    /// Cohen-Sutherland style rejection of segments fully off one side
    fn segment_outside(&self, start: (f32, f32), end: (f32, f32), margin: f32) -> bool {
        let code_start = outcode(start, self.width() as f32, self.height() as f32, margin);
        let code_end = outcode(end, self.width() as f32, self.height() as f32, margin);
        code_start & code_end != 0
    }

    /// Fill rings with the even-odd rule, so inner rings become holes.
    ///
    /// Returns false if no ring had enough points to enclose an area.
    pub fn fill_rings(&mut self, rings: &[&[Coord]], color: Rgba<u8>) -> bool {
        let projected: Vec<Vec<(f64, f64)>> = rings
            .iter()
            .filter(|ring| ring.len() >= 3)
            .map(|ring| ring.iter().map(|&p| self.project_f64(p)).collect())
            .collect();
        if projected.is_empty() {
            return false;
        }

        let (width, height) = (self.width() as f64, self.height() as f64);
        let (min_y, max_y) = projected
            .iter()
            .flatten()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)));
        let first_row = min_y.floor().max(0.0) as u32;
        let last_row = max_y.ceil().min(height - 1.0).max(0.0) as u32;

        let mut crossings: Vec<f64> = Vec::new();
        for row in first_row..=last_row {
            let scan_y = row as f64 + 0.5;
            crossings.clear();

            for ring in &projected {
                let count = ring.len();
                for i in 0..count {
                    let (x1, y1) = ring[i];
                    let (x2, y2) = ring[(i + 1) % count];
                    if (y1 <= scan_y) != (y2 <= scan_y) {
                        crossings.push(x1 + (scan_y - y1) * (x2 - x1) / (y2 - y1));
                    }
                }
            }
            crossings.sort_by(f64::total_cmp);

            for span in crossings.chunks_exact(2) {
                let start = (span[0] - 0.5).ceil().max(0.0);
                let end = (span[1] - 0.5).floor().min(width - 1.0);
                if start > end {
                    continue;
                }
                for x in start as u32..=end as u32 {
                    self.image.get_pixel_mut(x, row).blend(&color);
                }
            }
        }

        true
    }

    /// Alpha-blend `icon` centered on `center`, with `alpha` scaling its opacity
    pub fn overlay_centered(&mut self, icon: &RgbaImage, center: Coord, alpha: f32) {
        let (cx, cy) = self.project(center);
        let left = (cx - icon.width() as f32 / 2.0).round() as i64;
        let top = (cy - icon.height() as f32 / 2.0).round() as i64;

        if alpha >= 1.0 {
            imageops::overlay(&mut self.image, icon, left, top);
            return;
        }

        let mut faded = icon.clone();
        for pixel in faded.pixels_mut() {
            pixel.0[3] = (pixel.0[3] as f32 * alpha).round().clamp(0.0, 255.0) as u8;
        }
        imageops::overlay(&mut self.image, &faded, left, top);
    }
}

fn outcode(point: (f32, f32), width: f32, height: f32, margin: f32) -> u8 {
    let mut code = 0;
    if point.0 < -margin {
        code |= 1; // Left
    } else if point.0 > width + margin {
        code |= 2; // Right
    }
    if point.1 < -margin {
        code |= 4; // Top
    } else if point.1 > height + margin {
        code |= 8; // Bottom
    }
    code
}

/// Helper function to draw a thick line by drawing circles along the path
fn draw_thick_line_segment_mut(
    image: &mut RgbaImage,
    start: (f32, f32),
    end: (f32, f32),
    color: Rgba<u8>,
    width: f32,
) {
    if width <= 1.0 {
        // Use the standard thin line for width 1 or less
        draw_line_segment_mut(image, start, end, color);
        return;
    }

    let radius = (width / 2.0).max(1.0) as i32;

    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let length = (dx * dx + dy * dy).sqrt();

    if length < 0.001 {
        draw_filled_circle_mut(image, (start.0 as i32, start.1 as i32), radius, color);
        return;
    }

    // Step slightly under the radius to cover without heavy overlap
    let step_size = (radius as f32 * 0.5).max(0.5);
    let num_steps = (length / step_size).ceil() as i32;
    let step_x = dx * step_size / length;
    let step_y = dy * step_size / length;

    for i in 0..=num_steps {
        let t = i as f32;
        let x = start.0 + t * step_x;
        let y = start.1 + t * step_y;
        draw_filled_circle_mut(image, (x as i32, y as i32), radius, color);
    }

    draw_filled_circle_mut(image, (end.0 as i32, end.1 as i32), radius, color);
}
