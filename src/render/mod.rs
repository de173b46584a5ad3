use std::fmt;
use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::Rgba;
use log::{debug, error, info};
use thiserror::Error;

use crate::config::{PointOfInterest, RoadStyle, RunConfig};
use crate::geo::BoundingBox;
use crate::model::{Feature, GeometryLayer, StreetNetwork};

pub mod canvas;
pub mod color;
pub mod palette;

pub use canvas::Canvas;
use color::parse_color;
pub use palette::{resolve_color, ColorTable};

/// Fill and edge of water bodies
pub const WATER_COLOR: Rgba<u8> = Rgba([0xad, 0xd8, 0xe6, 255]);
/// Fill and edge of parks
pub const PARK_COLOR: Rgba<u8> = Rgba([0x98, 0xfb, 0x98, 255]);
/// Stroke width of metro lines, in points
pub const METRO_LINE_WIDTH: f64 = 2.0;
/// Outline width of areal features, in points
const OUTLINE_WIDTH: f64 = 1.0;
/// Name used for metro features without one
pub const UNNAMED_LINE: &str = "Unnamed Line";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid color {0:?}")]
    InvalidColor(String),

    #[error("invalid line width {0}")]
    InvalidWidth(f64),

    #[error("no drawable features for {0}")]
    NoFeatures(String),

    #[error("failed to load icon {path}: {source}")]
    Icon {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// What happened to one layer of the map
#[derive(Debug)]
pub enum LayerStatus {
    Drawn { features: usize },
    Skipped(String),
    Failed(RenderError),
}

#[derive(Debug)]
pub struct LayerOutcome {
    pub layer: String,
    pub status: LayerStatus,
}

impl LayerOutcome {
    fn from_result(layer: String, result: Result<usize, RenderError>) -> Self {
        let status = match result {
            Ok(features) => LayerStatus::Drawn { features },
            Err(e) => {
                error!("Error plotting {}: {}", layer, e);
                LayerStatus::Failed(e)
            }
        };
        Self { layer, status }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, LayerStatus::Failed(_))
    }
}

impl fmt::Display for LayerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            LayerStatus::Drawn { features } => {
                write!(f, "{}: drew {} features", self.layer, features)
            }
            LayerStatus::Skipped(reason) => write!(f, "{}: skipped ({})", self.layer, reason),
            LayerStatus::Failed(e) => write!(f, "{}: failed ({})", self.layer, e),
        }
    }
}

/// Per-layer results of one render, plus the metro colors used
#[derive(Debug, Default)]
pub struct RenderReport {
    pub outcomes: Vec<LayerOutcome>,
    pub metro_colors: ColorTable,
}

impl RenderReport {
    #[cfg(test)]
    pub fn outcome(&self, layer: &str) -> Option<&LayerOutcome> {
        self.outcomes.iter().find(|o| o.layer == layer)
    }

    pub fn failures(&self) -> impl Iterator<Item = &LayerOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

/// Everything fetched for one map
#[derive(Debug, Default)]
pub struct MapLayers {
    pub network: StreetNetwork,
    pub parks: GeometryLayer,
    pub water: GeometryLayer,
    pub metro: GeometryLayer,
}

/// Raster settings
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Longer side of the image in inches
    pub figure_size: f64,
    pub dpi: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            figure_size: 10.0,
            dpi: 600.0,
        }
    }
}

/// Draw every layer in order: parks, roads, water, metro, icons
pub fn render_map(
    config: &RunConfig,
    layers: &MapLayers,
    bounds: BoundingBox,
    options: RenderOptions,
) -> (Canvas, RenderReport) {
    let mut canvas = Canvas::new(bounds, config.aspect_ratio, options.figure_size, options.dpi);
    info!("Rendering {}x{} canvas", canvas.width(), canvas.height());

    let mut outcomes = Vec::new();
    outcomes.push(plot_areas(&mut canvas, "parks", &layers.parks, PARK_COLOR));
    outcomes.extend(plot_roads(&mut canvas, &layers.network, &config.road_styles));
    outcomes.push(plot_areas(&mut canvas, "water", &layers.water, WATER_COLOR));

    let (metro_outcomes, metro_colors) = plot_metro_lines(
        &mut canvas,
        &layers.metro,
        ColorTable::new(config.metro_colors.clone()),
    );
    outcomes.extend(metro_outcomes);
    outcomes.extend(add_icons(
        &mut canvas,
        &config.points_of_interest,
        config.icon_zoom,
        config.icon_alpha,
    ));

    (canvas, RenderReport { outcomes, metro_colors })
}

fn stroke_width(canvas: &Canvas, width: f64) -> Result<f32, RenderError> {
    if !width.is_finite() || width <= 0.0 {
        return Err(RenderError::InvalidWidth(width));
    }
    Ok(canvas.points_to_pixels(width))
}

/// Draw each configured road type; one failing type does not stop the rest
pub fn plot_roads(
    canvas: &mut Canvas,
    network: &StreetNetwork,
    road_styles: &[(String, RoadStyle)],
) -> Vec<LayerOutcome> {
    road_styles
        .iter()
        .map(|(road_type, style)| {
            let result = plot_road_type(canvas, network, road_type, style);
            LayerOutcome::from_result(format!("roads:{}", road_type), result)
        })
        .collect()
}

fn plot_road_type(
    canvas: &mut Canvas,
    network: &StreetNetwork,
    road_type: &str,
    style: &RoadStyle,
) -> Result<usize, RenderError> {
    let color = parse_color(&style.color)?;
    let width = stroke_width(canvas, style.width)?;

    let mut drawn = 0;
    for edge in network.edges_of_type(road_type) {
        if canvas.stroke_polyline(&edge.geometry, color, width) {
            drawn += 1;
        }
    }

    if drawn == 0 {
        return Err(RenderError::NoFeatures(format!("{} roads", road_type)));
    }
    Ok(drawn)
}

/// Fill polygons and stroke lines of a fixed-color layer; empty layers are
/// skipped without drawing anything.
pub fn plot_areas(
    canvas: &mut Canvas,
    layer: &str,
    features: &GeometryLayer,
    color: Rgba<u8>,
) -> LayerOutcome {
    if features.is_empty() {
        info!("No {} features, skipping layer", layer);
        return LayerOutcome {
            layer: layer.to_string(),
            status: LayerStatus::Skipped("empty layer".to_string()),
        };
    }

    let outline = canvas.points_to_pixels(OUTLINE_WIDTH);
    let mut drawn = 0;
    for feature in features.iter() {
        let geometry = &feature.geometry;
        let mut visible = false;
        if geometry.is_areal() {
            visible |= canvas.fill_rings(&geometry.rings(), color);
        }
        for line in geometry.lines() {
            visible |= canvas.stroke_polyline(line, color, outline);
        }
        if visible {
            drawn += 1;
        } else {
            debug!("{} feature {} has nothing to draw", layer, feature.osm_id);
        }
    }

    LayerOutcome {
        layer: layer.to_string(),
        status: LayerStatus::Drawn { features: drawn },
    }
}

/// Group metro features by line name, in first-seen order
fn group_by_line(metro_lines: &GeometryLayer) -> Vec<(String, Vec<&Feature>)> {
    let mut groups: Vec<(String, Vec<&Feature>)> = Vec::new();
    for feature in metro_lines.iter() {
        let name = feature.name.as_deref().unwrap_or(UNNAMED_LINE);
        match groups.iter_mut().find(|(n, _)| n == name) {
            Some((_, members)) => members.push(feature),
            None => groups.push((name.to_string(), vec![feature])),
        }
    }
    groups
}

/// Draw each metro line in its color.
///
/// Takes the color table by value and hands back the table including
/// colors assigned to unknown lines.
pub fn plot_metro_lines(
    canvas: &mut Canvas,
    metro_lines: &GeometryLayer,
    mut table: ColorTable,
) -> (Vec<LayerOutcome>, ColorTable) {
    let mut outcomes = Vec::new();

    for (name, features) in group_by_line(metro_lines) {
        if !table.contains(&name) {
            info!("Unknown metro line: {}", name);
        }
        let (color, updated) = resolve_color(&name, table);
        table = updated;

        let result = plot_metro_line(canvas, &name, &features, &color);
        outcomes.push(LayerOutcome::from_result(format!("metro:{}", name), result));
    }

    (outcomes, table)
}

fn plot_metro_line(
    canvas: &mut Canvas,
    name: &str,
    features: &[&Feature],
    color: &str,
) -> Result<usize, RenderError> {
    let color = parse_color(color)?;
    let width = canvas.points_to_pixels(METRO_LINE_WIDTH);

    let mut drawn = 0;
    for feature in features {
        let mut visible = false;
        for line in feature.geometry.lines() {
            visible |= canvas.stroke_polyline(line, color, width);
        }
        if visible {
            drawn += 1;
        }
    }

    if drawn == 0 {
        return Err(RenderError::NoFeatures(format!("metro line {}", name)));
    }
    Ok(drawn)
}

/// Overlay icons at points of interest; points without an icon are skipped
pub fn add_icons(
    canvas: &mut Canvas,
    points_of_interest: &[PointOfInterest],
    zoom: f64,
    alpha: f64,
) -> Vec<LayerOutcome> {
    points_of_interest
        .iter()
        .filter_map(|poi| {
            let path = poi.icon_path()?;
            let result = add_icon(canvas, poi, path.to_path_buf(), zoom, alpha);
            Some(LayerOutcome::from_result(format!("icon:{}", poi.name), result))
        })
        .collect()
}

fn add_icon(
    canvas: &mut Canvas,
    poi: &PointOfInterest,
    path: PathBuf,
    zoom: f64,
    alpha: f64,
) -> Result<usize, RenderError> {
    let icon = match image::open(&path) {
        Ok(icon) => icon.to_rgba8(),
        Err(source) => return Err(RenderError::Icon { path, source }),
    };

    let scale = canvas.points_to_pixels(zoom) as f64;
    let width = ((icon.width() as f64 * scale).round() as u32).max(1);
    let height = ((icon.height() as f64 * scale).round() as u32).max(1);
    let scaled = imageops::resize(&icon, width, height, FilterType::Triangle);

    canvas.overlay_centered(&scaled, poi.coord(), alpha as f32);
    Ok(1)
}
