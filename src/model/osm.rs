use std::collections::HashMap;

use crate::geo::Coord;

/// Highway values left out of the "all" street network
const EXCLUDED_HIGHWAYS: [&str; 8] = [
    "abandoned",
    "construction",
    "no",
    "planned",
    "platform",
    "proposed",
    "raceway",
    "razed",
];

/// Raw OpenStreetMap elements as delivered by a provider, before any
/// conversion into graph or geometry form.
#[derive(Debug, Clone, Default)]
pub struct OsmExtract {
    pub nodes: HashMap<i64, OsmNode>,
    pub ways: Vec<OsmWay>,
    pub relations: Vec<OsmRelation>,
}

#[derive(Debug, Clone)]
pub struct OsmNode {
    pub id: i64,
    pub coord: Coord,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct OsmWay {
    pub id: i64,
    pub node_ids: Vec<i64>,
    pub tags: HashMap<String, String>,
}

impl OsmWay {
    pub fn is_closed(&self) -> bool {
        self.node_ids.len() >= 4 && self.node_ids.first() == self.node_ids.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone)]
pub struct RelationMember {
    pub kind: MemberKind,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct OsmRelation {
    pub id: i64,
    pub members: Vec<RelationMember>,
    pub tags: HashMap<String, String>,
}

impl OsmExtract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coord(&self, node_id: i64) -> Option<Coord> {
        self.nodes.get(&node_id).map(|node| node.coord)
    }

    pub fn way_index(&self) -> HashMap<i64, &OsmWay> {
        self.ways.iter().map(|way| (way.id, way)).collect()
    }
}

/// Selects features by one tag key and an optional set of accepted values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub values: Vec<String>,
}

impl TagFilter {
    pub fn new(key: &str, values: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        match tags.get(&self.key) {
            Some(value) => self.values.is_empty() || self.values.iter().any(|v| v == value),
            None => false,
        }
    }

    /// Overpass QL tag selector, e.g. `["natural"~"^(water)$"]`
    pub fn to_overpass(&self) -> String {
        if self.values.is_empty() {
            format!("[\"{}\"]", self.key)
        } else {
            format!("[\"{}\"~\"^({})$\"]", self.key, self.values.join("|"))
        }
    }

    /// Short label for log lines
    pub fn label(&self) -> String {
        if self.values.is_empty() {
            self.key.clone()
        } else {
            format!("{}={}", self.key, self.values.join("|"))
        }
    }
}

/// Whether a way belongs to the "all" street network
pub fn is_network_way(tags: &HashMap<String, String>) -> bool {
    let Some(highway) = tags.get("highway") else {
        return false;
    };
    let is_area = tags.get("area").is_some_and(|v| v == "yes");

    !is_area && !EXCLUDED_HIGHWAYS.contains(&highway.as_str())
}

/// Overpass QL selector matching `is_network_way`
pub fn network_overpass_selector() -> String {
    format!(
        "[\"highway\"][\"area\"!~\"yes\"][\"highway\"!~\"^({})$\"]",
        EXCLUDED_HIGHWAYS.join("|")
    )
}
