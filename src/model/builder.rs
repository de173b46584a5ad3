use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::geo::{BoundingBox, Coord};
use crate::model::osm::{is_network_way, MemberKind, OsmExtract, OsmWay, TagFilter};
use crate::model::{
    Edge, Feature, Geometry, GeometryLayer, HighwayTag, Node, Polygon, StreetNetwork,
};

/// Keys whose closed ways describe areas rather than loops
const AREA_KEYS: [&str; 7] = [
    "natural", "leisure", "landuse", "building", "amenity", "water", "place",
];

/// Build the street graph from every network way crossing `bbox`.
///
/// Graph nodes are way endpoints and nodes shared by two or more ways; each
/// way is split into edges between consecutive graph nodes.
pub fn build_street_network(extract: &OsmExtract, bbox: &BoundingBox) -> StreetNetwork {
    let ways: Vec<&OsmWay> = extract
        .ways
        .iter()
        .filter(|way| {
            is_network_way(&way.tags) && bbox.intersects_line(&coords(extract, &way.node_ids))
        })
        .collect();

    // Count how many way positions use each node
    let mut node_way_count: HashMap<i64, usize> = HashMap::new();
    for way in &ways {
        for &node_id in &way.node_ids {
            *node_way_count.entry(node_id).or_insert(0) += 1;
        }
    }

    let mut intersection_node_ids: HashSet<i64> = node_way_count
        .iter()
        .filter(|&(_, &count)| count >= 2)
        .map(|(&node_id, _)| node_id)
        .collect();
    for way in &ways {
        intersection_node_ids.extend(way.node_ids.first());
        intersection_node_ids.extend(way.node_ids.last());
    }

    let mut network = StreetNetwork::new();
    for &node_id in &intersection_node_ids {
        if extract.coord(node_id).is_some() {
            network.add_node(Node {
                id: node_id,
                street_count: node_way_count.get(&node_id).copied().unwrap_or(0),
            });
        }
    }

    for way in &ways {
        split_way(&mut network, extract, way, &intersection_node_ids);
    }

    let junctions = network.nodes.values().filter(|node| node.street_count >= 2).count();
    info!(
        "Built street network with {} nodes ({} junctions) and {} edges from {} ways",
        network.node_count(),
        junctions,
        network.edge_count(),
        ways.len()
    );

    network
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    Forward,
    Backward,
}

fn direction(way: &OsmWay) -> Direction {
    match way.tags.get("oneway").map(String::as_str) {
        Some("yes") | Some("true") | Some("1") => Direction::Forward,
        Some("-1") | Some("reverse") => Direction::Backward,
        _ => Direction::Both,
    }
}

/// Process a way to create edges between intersections
fn split_way(
    network: &mut StreetNetwork,
    extract: &OsmExtract,
    way: &OsmWay,
    intersection_node_ids: &HashSet<i64>,
) {
    if way.node_ids.len() < 2 {
        return;
    }

    let highway = way
        .tags
        .get("highway")
        .map(|raw| HighwayTag::parse(raw))
        .unwrap_or_else(|| HighwayTag::Many(Vec::new()));
    let name = way.tags.get("name").cloned();
    let direction = direction(way);

    let mut current_path: Vec<Coord> = Vec::new();
    let mut current_source: Option<i64> = None;

    for &node_id in &way.node_ids {
        let Some(coord) = extract.coord(node_id) else {
            debug!("Way {} references missing node {}", way.id, node_id);
            continue;
        };
        current_path.push(coord);

        if !intersection_node_ids.contains(&node_id) {
            continue;
        }

        if let Some(source) = current_source {
            let mut edge = Edge::new(source, node_id, way.id, highway.clone());
            edge.name = name.clone();
            for &point in &current_path {
                edge.add_point(point);
            }

            match direction {
                Direction::Both => {
                    let twin = edge.reverse();
                    network.add_edge(edge);
                    network.add_edge(twin);
                }
                Direction::Forward => network.add_edge(edge),
                Direction::Backward => {
                    let mut backward = edge.reverse();
                    backward.reversed = false;
                    network.add_edge(backward);
                }
            }
        }

        // Start a new path from this intersection
        current_source = Some(node_id);
        current_path.clear();
        current_path.push(coord);
    }
}

/// Convert every element matching `filter` and intersecting `bbox` into a feature.
pub fn build_features(
    extract: &OsmExtract,
    filter: &TagFilter,
    bbox: &BoundingBox,
) -> GeometryLayer {
    let mut features = Vec::new();

    let mut nodes: Vec<_> = extract
        .nodes
        .values()
        .filter(|node| filter.matches(&node.tags) && bbox.contains(node.coord))
        .collect();
    nodes.sort_by_key(|node| node.id);
    for node in nodes {
        features.push(Feature {
            osm_id: node.id,
            name: node.tags.get("name").cloned(),
            geometry: Geometry::Point(node.coord),
        });
    }

    for way in &extract.ways {
        if !filter.matches(&way.tags) {
            continue;
        }
        if let Some(geometry) = way_geometry(extract, way).filter(|g| g.intersects(bbox)) {
            features.push(Feature {
                osm_id: way.id,
                name: way.tags.get("name").cloned(),
                geometry,
            });
        }
    }

    let way_index = extract.way_index();
    for relation in &extract.relations {
        if !filter.matches(&relation.tags) {
            continue;
        }

        let members: Vec<(&str, &OsmWay)> = relation
            .members
            .iter()
            .filter(|member| member.kind == MemberKind::Way)
            .filter_map(|member| way_index.get(&member.id).map(|way| (member.role.as_str(), *way)))
            .collect();

        let is_multipolygon = relation.tags.get("type").is_some_and(|t| t == "multipolygon");
        let geometry = if is_multipolygon {
            multipolygon_geometry(extract, &members)
        } else {
            let lines: Vec<Vec<Coord>> = members
                .iter()
                .map(|(_, way)| coords(extract, &way.node_ids))
                .filter(|line| line.len() >= 2)
                .collect();
            (!lines.is_empty()).then_some(Geometry::MultiLineString(lines))
        };

        match geometry.filter(|g| g.intersects(bbox)) {
            Some(geometry) => features.push(Feature {
                osm_id: relation.id,
                name: relation.tags.get("name").cloned(),
                geometry,
            }),
            None => debug!("Relation {} has no geometry inside the query box", relation.id),
        }
    }

    info!("Converted {} features for {}", features.len(), filter.label());
    GeometryLayer::new(features)
}

fn coords(extract: &OsmExtract, node_ids: &[i64]) -> Vec<Coord> {
    node_ids.iter().filter_map(|&id| extract.coord(id)).collect()
}

fn is_area(way: &OsmWay) -> bool {
    if !way.is_closed() {
        return false;
    }
    match way.tags.get("area").map(String::as_str) {
        Some("yes") => true,
        Some("no") => false,
        _ => AREA_KEYS.iter().any(|key| way.tags.contains_key(*key)),
    }
}

fn way_geometry(extract: &OsmExtract, way: &OsmWay) -> Option<Geometry> {
    let points = coords(extract, &way.node_ids);
    if is_area(way) && points.len() >= 4 {
        Some(Geometry::Polygon(Polygon {
            exterior: points,
            holes: Vec::new(),
        }))
    } else if points.len() >= 2 {
        Some(Geometry::LineString(points))
    } else {
        None
    }
}

fn multipolygon_geometry(extract: &OsmExtract, members: &[(&str, &OsmWay)]) -> Option<Geometry> {
    let outer: Vec<Vec<i64>> = members
        .iter()
        .filter(|(role, _)| *role != "inner")
        .map(|(_, way)| way.node_ids.clone())
        .collect();
    let inner: Vec<Vec<i64>> = members
        .iter()
        .filter(|(role, _)| *role == "inner")
        .map(|(_, way)| way.node_ids.clone())
        .collect();

    let holes: Vec<Vec<Coord>> = assemble_rings(inner)
        .iter()
        .map(|ring| coords(extract, ring))
        .filter(|ring| ring.len() >= 4)
        .collect();

    let mut polygons: Vec<Polygon> = assemble_rings(outer)
        .iter()
        .map(|ring| coords(extract, ring))
        .filter(|ring| ring.len() >= 4)
        .map(|exterior| Polygon {
            exterior,
            holes: Vec::new(),
        })
        .collect();

    // The even-odd fill only needs the holes to be drawn once
    match polygons.first_mut() {
        Some(first) => first.holes = holes,
        None => return None,
    }

    if polygons.len() == 1 {
        polygons.pop().map(Geometry::Polygon)
    } else {
        Some(Geometry::MultiPolygon(polygons))
    }
}

/// Join way segments end to end into closed rings of node ids.
///
/// Segments that cannot be closed are dropped.
pub fn assemble_rings(mut segments: Vec<Vec<i64>>) -> Vec<Vec<i64>> {
    segments.retain(|segment| segment.len() >= 2);
    let mut rings = Vec::new();

    while !segments.is_empty() {
        let mut ring = segments.remove(0);

        loop {
            if ring.len() >= 4 && ring.first() == ring.last() {
                rings.push(ring);
                break;
            }

            let Some(&end) = ring.last() else { break };
            let next = segments
                .iter()
                .position(|s| s.first() == Some(&end) || s.last() == Some(&end));

            match next {
                Some(index) => {
                    let mut segment = segments.remove(index);
                    if segment.first() != Some(&end) {
                        segment.reverse();
                    }
                    ring.extend(segment.into_iter().skip(1));
                }
                None => break,
            }
        }
    }

    rings
}
