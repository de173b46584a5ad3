use std::collections::HashMap;

use crate::geo::{BoundingBox, Coord};

pub mod builder;
pub mod osm;

/// The `highway` classification of a road segment.
///
/// OSM values such as `residential;unclassified` carry more than one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighwayTag {
    One(String),
    Many(Vec<String>),
}

impl HighwayTag {
    pub fn parse(raw: &str) -> Self {
        let mut values: Vec<String> = raw
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if values.len() == 1 {
            HighwayTag::One(values.remove(0))
        } else {
            HighwayTag::Many(values)
        }
    }

    /// True if the tag is `road_type` or, for lists, contains it
    pub fn matches(&self, road_type: &str) -> bool {
        match self {
            HighwayTag::One(value) => value == road_type,
            HighwayTag::Many(values) => values.iter().any(|v| v == road_type),
        }
    }
}

/// A node represents a real-world intersection or way endpoint
#[derive(Debug, Clone)]
pub struct Node {
    /// OpenStreetMap node id
    pub id: i64,
    /// Number of way segments meeting here
    pub street_count: usize,
}

/// An edge is a directed road segment between two nodes
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: i64,
    pub target: i64,

    /// Distinguishes parallel edges between the same pair of nodes
    pub key: usize,

    /// Way identifier from OpenStreetMap
    pub osm_way_id: i64,

    pub name: Option<String>,
    pub highway: HighwayTag,

    /// Set on the twin created for the opposite direction of a two-way street
    pub reversed: bool,

    /// The geometry of the edge from source to target
    pub geometry: Vec<Coord>,
}

impl Edge {
    pub fn new(source: i64, target: i64, osm_way_id: i64, highway: HighwayTag) -> Self {
        Self {
            source,
            target,
            key: 0,
            osm_way_id,
            name: None,
            highway,
            reversed: false,
            geometry: Vec::new(),
        }
    }

    pub fn add_point(&mut self, coord: Coord) {
        self.geometry.push(coord);
    }

    /// Same segment travelled the other way
    pub fn reverse(&self) -> Self {
        let mut geometry = self.geometry.clone();
        geometry.reverse();

        Self {
            source: self.target,
            target: self.source,
            key: 0,
            osm_way_id: self.osm_way_id,
            name: self.name.clone(),
            highway: self.highway.clone(),
            reversed: !self.reversed,
            geometry,
        }
    }
}

/// Directed multigraph of the streets around the map center
#[derive(Debug, Clone, Default)]
pub struct StreetNetwork {
    pub nodes: HashMap<i64, Node>,
    pub edges: Vec<Edge>,
    parallel: HashMap<(i64, i64), usize>,
}

impl StreetNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    /// Add an edge, assigning the next free key for its node pair
    pub fn add_edge(&mut self, mut edge: Edge) {
        let count = self.parallel.entry((edge.source, edge.target)).or_insert(0);
        edge.key = *count;
        *count += 1;
        self.edges.push(edge);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Segments of one road type, each physical segment yielded once
    pub fn edges_of_type<'a>(&'a self, road_type: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |edge| !edge.reversed && edge.highway.matches(road_type))
    }
}

/// A polygon with optional holes; rings are open or closed
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub holes: Vec<Vec<Coord>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    /// All rings of areal geometries, exterior and holes alike
    pub fn rings(&self) -> Vec<&[Coord]> {
        let polygons: Vec<&Polygon> = match self {
            Geometry::Polygon(polygon) => vec![polygon],
            Geometry::MultiPolygon(polygons) => polygons.iter().collect(),
            _ => Vec::new(),
        };

        polygons
            .into_iter()
            .flat_map(|polygon| {
                std::iter::once(polygon.exterior.as_slice())
                    .chain(polygon.holes.iter().map(Vec::as_slice))
            })
            .collect()
    }

    /// Every polyline to stroke: line strings and polygon outlines
    pub fn lines(&self) -> Vec<&[Coord]> {
        match self {
            Geometry::Point(_) => Vec::new(),
            Geometry::LineString(line) => vec![line.as_slice()],
            Geometry::MultiLineString(lines) => lines.iter().map(Vec::as_slice).collect(),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => self.rings(),
        }
    }

    pub fn is_areal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }

    /// Whether any part of the geometry lies within `bbox`
    pub fn intersects(&self, bbox: &BoundingBox) -> bool {
        match self {
            Geometry::Point(point) => bbox.contains(*point),
            Geometry::LineString(line) => bbox.intersects_line(line),
            Geometry::MultiLineString(lines) => lines.iter().any(|line| bbox.intersects_line(line)),
            Geometry::Polygon(polygon) => bbox.intersects_area(&polygon.exterior, &polygon.holes),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .any(|polygon| bbox.intersects_area(&polygon.exterior, &polygon.holes)),
        }
    }
}

/// One OSM element converted to drawable geometry
#[derive(Debug, Clone)]
pub struct Feature {
    pub osm_id: i64,
    pub name: Option<String>,
    pub geometry: Geometry,
}

/// Features fetched for one tag query
#[derive(Debug, Clone, Default)]
pub struct GeometryLayer {
    pub features: Vec<Feature>,
}

impl GeometryLayer {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}
