use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::cache::Cache;
use crate::geo::{BoundingBox, Coord};
use crate::model::builder::{build_features, build_street_network};
use crate::model::osm::{
    network_overpass_selector, MemberKind, OsmExtract, OsmNode, OsmRelation, OsmWay, RelationMember,
    TagFilter,
};
use crate::model::{GeometryLayer, StreetNetwork};
use crate::provider::{GeoProvider, ProviderError};

/// Longest response body excerpt kept in error messages
const ERROR_SNIPPET_LEN: usize = 256;

/// Extra time the HTTP client waits beyond the server-side query timeout
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    nodes: Option<Vec<i64>>,
    members: Option<Vec<OverpassMember>>,
    tags: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct OverpassMember {
    #[serde(rename = "type")]
    member_type: String,
    #[serde(rename = "ref")]
    id: i64,
    #[serde(default)]
    role: String,
}

/// Overpass QL for the "all" street network inside `bbox`
pub fn network_query(bbox: &BoundingBox, timeout_secs: u64) -> String {
    format!(
        "[out:json][timeout:{}];(way{}({}););out body;>;out skel qt;",
        timeout_secs,
        network_overpass_selector(),
        bbox.to_overpass()
    )
}

/// Overpass QL for nodes, ways and relations matching `filter` inside `bbox`
pub fn geometry_query(bbox: &BoundingBox, filter: &TagFilter, timeout_secs: u64) -> String {
    let selector = filter.to_overpass();
    let area = bbox.to_overpass();
    format!(
        concat!(
            "[out:json][timeout:{t}];",
            "(node{s}({a});way{s}({a});relation{s}({a}););",
            "out body;>;out skel qt;"
        ),
        t = timeout_secs,
        s = selector,
        a = area
    )
}

/// Parse an Overpass JSON response into raw OSM elements.
///
/// Elements repeated by the recursion step (`>`) arrive without tags; the
/// tagged copy wins.
pub fn parse_response(text: &str) -> Result<OsmExtract, ProviderError> {
    let parsed: OverpassResponse = serde_json::from_str(text)
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid overpass JSON: {e}")))?;

    let mut extract = OsmExtract::new();
    let mut way_positions: HashMap<i64, usize> = HashMap::new();
    let mut relation_positions: HashMap<i64, usize> = HashMap::new();

    for element in parsed.elements {
        let tags = element.tags.unwrap_or_default();
        match element.element_type.as_str() {
            "node" => {
                let (Some(lat), Some(lon)) = (element.lat, element.lon) else {
                    continue;
                };
                let node = extract.nodes.entry(element.id).or_insert_with(|| OsmNode {
                    id: element.id,
                    coord: Coord::new(lat, lon),
                    tags: HashMap::new(),
                });
                if node.tags.is_empty() {
                    node.tags = tags;
                }
            }
            "way" => {
                let Some(node_ids) = element.nodes else {
                    continue;
                };
                match way_positions.get(&element.id) {
                    Some(&index) => {
                        if extract.ways[index].tags.is_empty() {
                            extract.ways[index].tags = tags;
                        }
                    }
                    None => {
                        way_positions.insert(element.id, extract.ways.len());
                        extract.ways.push(OsmWay {
                            id: element.id,
                            node_ids,
                            tags,
                        });
                    }
                }
            }
            "relation" => {
                let members = element
                    .members
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|member| {
                        let kind = match member.member_type.as_str() {
                            "node" => MemberKind::Node,
                            "way" => MemberKind::Way,
                            "relation" => MemberKind::Relation,
                            _ => return None,
                        };
                        Some(RelationMember {
                            kind,
                            id: member.id,
                            role: member.role,
                        })
                    })
                    .collect();
                match relation_positions.get(&element.id) {
                    Some(&index) => {
                        if extract.relations[index].tags.is_empty() {
                            extract.relations[index].tags = tags;
                        }
                    }
                    None => {
                        relation_positions.insert(element.id, extract.relations.len());
                        extract.relations.push(OsmRelation {
                            id: element.id,
                            members,
                            tags,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    Ok(extract)
}

/// Provider backed by the public Overpass API
pub struct OverpassProvider {
    client: Client,
    urls: Vec<String>,
    timeout: Duration,
    cache: Option<Cache>,
}

impl OverpassProvider {
    pub fn new(urls: Vec<String>, timeout: Duration, cache: Option<Cache>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            urls,
            timeout,
            cache,
        })
    }

    /// Run a query, consulting the cache first when one is configured
    fn query(&self, query: &str) -> Result<OsmExtract> {
        if let Some(data) = self.cache.as_ref().and_then(|cache| cache.get(query, "json")) {
            info!("Using cached Overpass response");
            let text = String::from_utf8(data).context("Cached response is not UTF-8")?;
            return Ok(parse_response(&text)?);
        }

        let text = self.request(query)?;
        let extract = parse_response(&text)?;

        if let Some(cache) = &self.cache {
            let path = cache
                .save_to_cache(query, "json", text.as_bytes())
                .context("Failed to save to cache")?;
            info!("Cached Overpass response at {}", path.display());
        }

        Ok(extract)
    }

    /// POST the query to each endpoint until one answers successfully
    fn request(&self, query: &str) -> Result<String, ProviderError> {
        let mut errors = Vec::new();

        for url in &self.urls {
            info!("Querying Overpass at {}", url);
            let response = match self
                .client
                .post(url)
                .timeout(self.request_timeout())
                .form(&[("data", query)])
                .send()
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("{url}: request failed: {e}");
                    errors.push(format!("{url}: request failed: {e}"));
                    continue;
                }
            };

            let status = response.status();
            let body = match response.text() {
                Ok(body) => body,
                Err(e) => {
                    errors.push(format!("{url}: response read failed: {e}"));
                    continue;
                }
            };

            if status.is_success() {
                return Ok(body);
            }

            let snippet: String = body.chars().take(ERROR_SNIPPET_LEN).collect();
            warn!("{url}: HTTP {status}");
            errors.push(format!("{url}: HTTP {status}: {snippet}"));
        }

        Err(ProviderError::AllEndpointsFailed(errors.join(" | ")))
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }

    /// The server aborts at `[timeout:N]`; give its error response time to arrive
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs()) + CLIENT_TIMEOUT_MARGIN
    }
}

impl GeoProvider for OverpassProvider {
    fn describe(&self) -> String {
        format!("Overpass ({} endpoints)", self.urls.len())
    }

    fn fetch_network(&self, center: Coord, radius_m: f64) -> Result<StreetNetwork> {
        let bbox = BoundingBox::query_box(center, radius_m)?;
        let extract = self
            .query(&network_query(&bbox, self.timeout_secs()))
            .context("Failed to fetch street network")?;

        let network = build_street_network(&extract, &bbox);
        if network.is_empty() {
            return Err(ProviderError::NoNetwork {
                lat: center.lat,
                lon: center.lon,
                radius_m,
            }
            .into());
        }
        Ok(network)
    }

    fn fetch_geometries(
        &self,
        center: Coord,
        radius_m: f64,
        filter: &TagFilter,
    ) -> Result<GeometryLayer> {
        let bbox = BoundingBox::query_box(center, radius_m)?;
        let extract = self
            .query(&geometry_query(&bbox, filter, self.timeout_secs()))
            .with_context(|| format!("Failed to fetch {} geometries", filter.label()))?;

        Ok(build_features(&extract, filter, &bbox))
    }
}
