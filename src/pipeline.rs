use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::RunConfig;
use crate::geo::BoundingBox;
use crate::model::osm::TagFilter;
use crate::output::write_image;
use crate::provider::GeoProvider;
use crate::render::{render_map, MapLayers, RenderOptions, RenderReport};

/// Settings of one run that do not come from the config file
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output: PathBuf,
    pub render: RenderOptions,
    pub transparent: bool,
}

pub fn water_filter() -> TagFilter {
    TagFilter::new("natural", &["water"])
}

pub fn metro_filter() -> TagFilter {
    TagFilter::new("railway", &["subway"])
}

pub fn park_filter() -> TagFilter {
    TagFilter::new("leisure", &["park"])
}

/// Fetch every layer around the configured center
fn fetch_layers(config: &RunConfig, provider: &dyn GeoProvider) -> Result<MapLayers> {
    let center = config.center();
    let radius = config.distance;

    let network = provider
        .fetch_network(center, radius)
        .context("Failed to fetch street network")?;
    info!(
        "Street network: {} nodes, {} edges",
        network.node_count(),
        network.edge_count()
    );

    let fetch = |filter: TagFilter| {
        provider
            .fetch_geometries(center, radius, &filter)
            .with_context(|| format!("Failed to fetch {} features", filter.label()))
            .inspect(|layer| info!("Fetched {} {} features", layer.len(), filter.label()))
    };

    Ok(MapLayers {
        network,
        water: fetch(water_filter())?,
        metro: fetch(metro_filter())?,
        parks: fetch(park_filter())?,
    })
}

/// Metro lines drawn in the default color because the config does not list them
fn unlisted_metro_lines<'a>(config: &RunConfig, report: &'a RenderReport) -> Vec<&'a str> {
    let mut names: Vec<&str> = report
        .metro_colors
        .iter()
        .filter(|(name, _)| !config.metro_colors.contains_key(*name))
        .map(|(name, _)| name)
        .collect();
    names.sort_unstable();
    names
}

/// Fetch, draw and write one map
pub fn run(
    config: &RunConfig,
    provider: &dyn GeoProvider,
    options: &RunOptions,
) -> Result<RenderReport> {
    info!(
        "Rendering map around ({}, {}) with distance {} m using {}",
        config.center_latitude,
        config.center_longitude,
        config.distance,
        provider.describe()
    );
    if !config.title.is_empty() {
        info!("Title {:?} is not drawn", config.title);
    }

    let bounds = BoundingBox::around(config.center(), config.distance, config.aspect_ratio)
        .context("Failed to compute bounding box")?;
    info!(
        "Bounding box: lon {:.6}..{:.6}, lat {:.6}..{:.6}",
        bounds.min_longitude, bounds.max_longitude, bounds.min_latitude, bounds.max_latitude
    );

    let layers = fetch_layers(config, provider)?;
    let (canvas, report) = render_map(config, &layers, bounds, options.render);

    write_image(canvas, &options.output, options.transparent)?;

    let unlisted = unlisted_metro_lines(config, &report);
    if !unlisted.is_empty() {
        info!("Metro lines without a configured color: {}", unlisted.join(", "));
    }

    let failed = report.failures().count();
    if failed > 0 {
        warn!("{} of {} layers failed", failed, report.outcomes.len());
        for outcome in report.failures() {
            warn!("  {}", outcome);
        }
    }
    info!("Map saved to {}", options.output.display());

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PointOfInterest, RoadStyle};
    use crate::geo::Coord;
    use crate::model::{Edge, Feature, Geometry, GeometryLayer, HighwayTag, Polygon, StreetNetwork};
    use crate::render::LayerStatus;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves fixed layers around the center and records requested filters
    struct StubProvider {
        network: StreetNetwork,
        layers: HashMap<String, GeometryLayer>,
        requests: RefCell<Vec<String>>,
    }

    impl GeoProvider for StubProvider {
        fn describe(&self) -> String {
            "stub".to_string()
        }

        fn fetch_network(&self, _center: Coord, _radius_m: f64) -> Result<StreetNetwork> {
            Ok(self.network.clone())
        }

        fn fetch_geometries(
            &self,
            _center: Coord,
            _radius_m: f64,
            filter: &TagFilter,
        ) -> Result<GeometryLayer> {
            self.requests.borrow_mut().push(filter.label());
            Ok(self.layers.get(&filter.key).cloned().unwrap_or_default())
        }
    }

    struct FailingProvider;

    impl GeoProvider for FailingProvider {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        fn fetch_network(&self, _center: Coord, _radius_m: f64) -> Result<StreetNetwork> {
            anyhow::bail!("connection refused")
        }

        fn fetch_geometries(
            &self,
            _center: Coord,
            _radius_m: f64,
            _filter: &TagFilter,
        ) -> Result<GeometryLayer> {
            anyhow::bail!("connection refused")
        }
    }

    const CENTER: Coord = Coord { lat: 40.0, lon: -73.0 };

    fn config() -> RunConfig {
        RunConfig::from_json(
            r##"{
                "center_latitude": 40.0,
                "center_longitude": -73.0,
                "distance": 1000,
                "aspect_ratio": 1.0,
                "road_styles": {
                    "residential": {"color": "definitely-not-a-color", "width": 1},
                    "primary": {"color": "#333333", "width": 3}
                },
                "metro_colors": {"A": "#0000ff"}
            }"##,
        )
        .unwrap()
    }

    fn line_through_center(offset: f64) -> Vec<Coord> {
        vec![
            Coord::new(CENTER.lat + offset, CENTER.lon - 0.003),
            Coord::new(CENTER.lat + offset, CENTER.lon + 0.003),
        ]
    }

    fn stub(water: GeometryLayer) -> StubProvider {
        let mut network = StreetNetwork::new();
        for (id, highway) in [(1, "residential"), (2, "primary")] {
            let mut edge = Edge::new(id * 10, id * 10 + 1, id, HighwayTag::parse(highway));
            for coord in line_through_center(id as f64 * 0.001) {
                edge.add_point(coord);
            }
            network.add_edge(edge);
        }

        let metro = GeometryLayer::new(vec![
            Feature {
                osm_id: 7,
                name: Some("A".to_string()),
                geometry: Geometry::LineString(line_through_center(-0.001)),
            },
            Feature {
                osm_id: 8,
                name: Some("Z".to_string()),
                geometry: Geometry::LineString(line_through_center(-0.002)),
            },
        ]);

        StubProvider {
            network,
            layers: HashMap::from([
                ("natural".to_string(), water),
                ("railway".to_string(), metro),
            ]),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn options(output: PathBuf) -> RunOptions {
        RunOptions {
            output,
            render: RenderOptions { figure_size: 2.0, dpi: 50.0 },
            transparent: false,
        }
    }

    #[test]
    fn test_failed_road_type_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("maps/city.png");
        let lake = Feature {
            osm_id: 3,
            name: None,
            geometry: Geometry::Polygon(Polygon {
                exterior: vec![
                    Coord::new(39.997, -73.003),
                    Coord::new(39.997, -72.997),
                    Coord::new(39.999, -72.997),
                    Coord::new(39.997, -73.003),
                ],
                holes: Vec::new(),
            }),
        };
        let provider = stub(GeometryLayer::new(vec![lake]));

        let icon_path = dir.path().join("museum.png");
        image::RgbaImage::from_pixel(100, 100, image::Rgba([255, 0, 0, 255]))
            .save(&icon_path)
            .unwrap();
        let mut config = config();
        config.icon_zoom = 0.1;
        config.points_of_interest.push(PointOfInterest {
            coords: (40.003, -73.0),
            icon: Some(icon_path),
            name: "Museum".to_string(),
        });

        let report = run(&config, &provider, &options(output.clone())).unwrap();

        let residential = report.outcome("roads:residential").unwrap();
        assert!(residential.is_failed());
        assert!(matches!(
            report.outcome("roads:primary").unwrap().status,
            LayerStatus::Drawn { features: 1 }
        ));
        assert!(matches!(
            report.outcome("water").unwrap().status,
            LayerStatus::Drawn { features: 1 }
        ));
        assert!(!report.outcome("metro:A").unwrap().is_failed());
        assert!(!report.outcome("metro:Z").unwrap().is_failed());
        assert_eq!(report.failures().count(), 1);

        assert_eq!(report.metro_colors.get("Z"), Some("#FEC8D8"));
        assert_eq!(report.metro_colors.get("A"), Some("#0000ff"));
        assert_eq!(unlisted_metro_lines(&config, &report), vec!["Z"]);

        // Icons are drawn after the failed road type
        assert!(matches!(
            report.outcome("icon:Museum").unwrap().status,
            LayerStatus::Drawn { features: 1 }
        ));

        let written = image::open(&output).unwrap();
        assert_eq!((written.width(), written.height()), (100, 100));
        assert_eq!(*written.to_rgb8().get_pixel(50, 17), image::Rgb([255, 0, 0]));
    }

    #[test]
    fn test_empty_water_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = stub(GeometryLayer::default());

        let report = run(&config(), &provider, &options(dir.path().join("map.png"))).unwrap();

        assert!(matches!(report.outcome("water").unwrap().status, LayerStatus::Skipped(_)));
        assert!(matches!(report.outcome("parks").unwrap().status, LayerStatus::Skipped(_)));
        assert_eq!(
            *provider.requests.borrow(),
            vec!["natural=water", "railway=subway", "leisure=park"]
        );
    }

    #[test]
    fn test_fetch_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("map.png");
        let err = run(&config(), &FailingProvider, &options(output.clone())).unwrap_err();
        assert!(format!("{:#}", err).contains("street network"));
        assert!(!output.exists());
    }

    #[test]
    fn test_roads_only_style_order() {
        let mut config = config();
        config.road_styles = vec![(
            "primary".to_string(),
            RoadStyle {
                color: "black".to_string(),
                width: 1.0,
            },
        )];
        let dir = tempfile::tempdir().unwrap();
        let provider = stub(GeometryLayer::default());
        let report = run(&config, &provider, &options(dir.path().join("m.png"))).unwrap();
        assert!(report.outcome("roads:residential").is_none());
        assert_eq!(report.failures().count(), 0);
    }
}
