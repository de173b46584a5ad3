use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::geo::Coord;

/// Placeholder in the output path replaced by the run's start time
pub const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("distance must be positive, got {0}")]
    Distance(f64),

    #[error("aspect_ratio must be positive, got {0}")]
    AspectRatio(f64),

    #[error("center_latitude {0} must lie strictly between -90 and 90")]
    Latitude(f64),

    #[error("center_longitude {0} must lie within -180 and 180")]
    Longitude(f64),

    #[error("icon_zoom must be positive, got {0}")]
    IconZoom(f64),

    #[error("icon_alpha must lie within 0 and 1, got {0}")]
    IconAlpha(f64),
}

/// Stroke style of one road type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoadStyle {
    pub color: String,
    pub width: f64,
}

/// A named coordinate with an optional icon overlay
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointOfInterest {
    /// `[latitude, longitude]`
    pub coords: (f64, f64),
    #[serde(default)]
    pub icon: Option<PathBuf>,
    #[serde(default)]
    pub name: String,
}

impl PointOfInterest {
    pub fn coord(&self) -> Coord {
        Coord::new(self.coords.0, self.coords.1)
    }

    /// Icon path, if one was given and is not blank
    pub fn icon_path(&self) -> Option<&Path> {
        self.icon
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

fn default_icon_zoom() -> f64 {
    0.03
}

fn default_icon_alpha() -> f64 {
    1.0
}

/// Parameters of one rendering run, read from the JSON config file
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub center_latitude: f64,
    pub center_longitude: f64,
    /// Radius in meters
    pub distance: f64,
    /// Width over height
    pub aspect_ratio: f64,

    #[serde(default)]
    pub points_of_interest: Vec<PointOfInterest>,

    /// Road type to style, in file order (later types draw on top)
    #[serde(default, deserialize_with = "ordered_map")]
    pub road_styles: Vec<(String, RoadStyle)>,

    #[serde(default)]
    pub metro_colors: HashMap<String, String>,

    #[serde(default)]
    pub title: String,

    /// Accepted for compatibility, not used when drawing
    #[serde(default)]
    pub font_settings: HashMap<String, serde_json::Value>,

    #[serde(default = "default_icon_zoom")]
    pub icon_zoom: f64,

    #[serde(default = "default_icon_alpha")]
    pub icon_alpha: f64,
}

impl RunConfig {
    /// Read and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(text).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn center(&self) -> Coord {
        Coord::new(self.center_latitude, self.center_longitude)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("center_latitude", self.center_latitude),
            ("center_longitude", self.center_longitude),
            ("distance", self.distance),
            ("aspect_ratio", self.aspect_ratio),
            ("icon_zoom", self.icon_zoom),
            ("icon_alpha", self.icon_alpha),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
        }

        if self.distance <= 0.0 {
            return Err(ConfigError::Distance(self.distance));
        }
        if self.aspect_ratio <= 0.0 {
            return Err(ConfigError::AspectRatio(self.aspect_ratio));
        }
        if self.center_latitude.abs() >= 90.0 {
            return Err(ConfigError::Latitude(self.center_latitude));
        }
        if self.center_longitude.abs() > 180.0 {
            return Err(ConfigError::Longitude(self.center_longitude));
        }
        if self.icon_zoom <= 0.0 {
            return Err(ConfigError::IconZoom(self.icon_zoom));
        }
        if !(0.0..=1.0).contains(&self.icon_alpha) {
            return Err(ConfigError::IconAlpha(self.icon_alpha));
        }

        Ok(())
    }
}

/// Deserialize a JSON object into key/value pairs, keeping file order
fn ordered_map<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries: Vec<(String, T)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, T>()? {
                // Later duplicates replace earlier ones in place
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

/// Substitute `{timestamp}` in an output path with `now`
pub fn render_output_path(template: &str, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    PathBuf::from(template.replace(TIMESTAMP_PLACEHOLDER, &stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FULL: &str = r##"{
        "center_latitude": 40.0,
        "center_longitude": -73.0,
        "distance": 2000,
        "aspect_ratio": 1.5,
        "points_of_interest": [
            {"coords": [40.001, -73.002], "icon": "icons/museum.png", "name": "Museum"},
            {"coords": [40.003, -73.001], "icon": "", "name": "Plaza"}
        ],
        "road_styles": {
            "residential": {"color": "#cccccc", "width": 0.5},
            "primary": {"color": "#ffaa00", "width": 2},
            "footway": {"color": "grey", "width": 0.3}
        },
        "metro_colors": {"Line 1": "#ff0000"},
        "title": "Lower Manhattan",
        "font_settings": {"family": "serif", "size": 12}
    }"##;

    #[test]
    fn test_full_config() {
        let config = RunConfig::from_json(FULL).unwrap();
        assert_eq!(config.center(), Coord::new(40.0, -73.0));
        assert_eq!(config.distance, 2000.0);
        assert_eq!(config.points_of_interest.len(), 2);
        assert_eq!(config.points_of_interest[0].icon_path(), Some(Path::new("icons/museum.png")));
        assert_eq!(config.points_of_interest[1].icon_path(), None);
        assert_eq!(config.points_of_interest[0].coord(), Coord::new(40.001, -73.002));
        assert_eq!(config.metro_colors["Line 1"], "#ff0000");
        assert_eq!(config.title, "Lower Manhattan");
        assert_eq!(config.font_settings.len(), 2);
        assert_eq!(config.icon_zoom, 0.03);
        assert_eq!(config.icon_alpha, 1.0);
    }

    #[test]
    fn test_road_styles_keep_file_order() {
        let config = RunConfig::from_json(FULL).unwrap();
        let order: Vec<&str> = config.road_styles.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, vec!["residential", "primary", "footway"]);
        assert_eq!(config.road_styles[1].1, RoadStyle { color: "#ffaa00".to_string(), width: 2.0 });
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = RunConfig::from_json(
            r#"{"center_latitude": 1.0, "center_longitude": 2.0,
                "distance": 500, "aspect_ratio": 1}"#,
        )
        .unwrap();
        assert!(config.points_of_interest.is_empty());
        assert!(config.road_styles.is_empty());
        assert!(config.metro_colors.is_empty());
        assert_eq!(config.title, "");
    }

    #[test]
    fn test_missing_required_key() {
        let err = RunConfig::from_json(
            r#"{"center_latitude": 1.0, "center_longitude": 2.0, "distance": 500}"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("aspect_ratio"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = RunConfig::from_json(FULL).unwrap();

        let mut config = base.clone();
        config.aspect_ratio = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::AspectRatio(0.0)));

        let mut config = base.clone();
        config.distance = -5.0;
        assert_eq!(config.validate(), Err(ConfigError::Distance(-5.0)));

        let mut config = base.clone();
        config.center_latitude = -90.0;
        assert_eq!(config.validate(), Err(ConfigError::Latitude(-90.0)));

        let mut config = base.clone();
        config.icon_alpha = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::IconAlpha(1.5)));

        let mut config = base;
        config.distance = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::NotFinite { field: "distance", .. })));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.json");
        let err = RunConfig::load(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("config.json"));

        fs::write(&missing, FULL).unwrap();
        assert!(RunConfig::load(&missing).is_ok());
    }

    #[test]
    fn test_output_path_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            render_output_path("out/map_{timestamp}.png", now),
            PathBuf::from("out/map_20240309_140507.png")
        );
        assert_eq!(render_output_path("out/map.png", now), PathBuf::from("out/map.png"));
    }
}
