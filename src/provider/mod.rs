use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

use crate::cache::Cache;
use crate::geo::Coord;
use crate::model::osm::TagFilter;
use crate::model::{GeometryLayer, StreetNetwork};

pub mod overpass;
pub mod pbf;

pub use overpass::OverpassProvider;
pub use pbf::PbfProvider;

/// Public Overpass endpoints, tried in order
pub const DEFAULT_OVERPASS_URLS: [&str; 2] = [
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
];

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("all overpass endpoints failed: {0}")]
    AllEndpointsFailed(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("no street network found within {radius_m} m of ({lat}, {lon})")]
    NoNetwork { lat: f64, lon: f64, radius_m: f64 },
}

/// A source of geographic data around a point.
///
/// The renderer only depends on this interface, so any provider returning
/// the same shapes can stand in for another.
pub trait GeoProvider {
    /// Short description for log lines
    fn describe(&self) -> String;

    /// Street graph of every road type within `radius_m` of `center`
    fn fetch_network(&self, center: Coord, radius_m: f64) -> Result<StreetNetwork>;

    /// Features whose tags match `filter` within `radius_m` of `center`
    fn fetch_geometries(
        &self,
        center: Coord,
        radius_m: f64,
        filter: &TagFilter,
    ) -> Result<GeometryLayer>;
}

/// Where geographic data comes from
pub enum DataSource {
    /// Online Overpass API
    Overpass {
        urls: Vec<String>,
        timeout: Duration,
        cache: Option<Cache>,
    },
    /// Local OSM PBF extract
    LocalFile(PathBuf),
}

/// Build the provider for a data source
pub fn open(source: DataSource) -> Result<Box<dyn GeoProvider>> {
    match source {
        DataSource::Overpass { urls, timeout, cache } => {
            Ok(Box::new(OverpassProvider::new(urls, timeout, cache)?))
        }
        DataSource::LocalFile(path) => Ok(Box::new(PbfProvider::new(path))),
    }
}
