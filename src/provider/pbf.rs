use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use osmpbf::{Element, ElementReader, RelMemberType};

use crate::geo::{BoundingBox, Coord};
use crate::model::builder::{build_features, build_street_network};
use crate::model::osm::{
    MemberKind, OsmExtract, OsmNode, OsmRelation, OsmWay, RelationMember, TagFilter,
};
use crate::model::{GeometryLayer, StreetNetwork};
use crate::provider::{GeoProvider, ProviderError};

/// Provider reading a local OpenStreetMap PBF extract.
///
/// The file is parsed on first use and kept for the remaining queries of the
/// run.
pub struct PbfProvider {
    path: PathBuf,
    extract: OnceCell<OsmExtract>,
}

impl PbfProvider {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            extract: OnceCell::new(),
        }
    }

    fn extract(&self) -> Result<&OsmExtract> {
        if let Some(extract) = self.extract.get() {
            return Ok(extract);
        }
        let extract = read_extract(&self.path)?;
        Ok(self.extract.get_or_init(|| extract))
    }
}

fn tag_map<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> HashMap<String, String> {
    tags.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Read every node, way and relation of a PBF file
pub fn read_extract<P: AsRef<Path>>(file_path: P) -> Result<OsmExtract> {
    let path = file_path.as_ref();
    info!("Reading OSM extract: {}", path.display());

    let reader = ElementReader::from_path(path)
        .with_context(|| format!("Failed to open PBF extract {}", path.display()))?;

    let mut extract = OsmExtract::new();
    reader
        .for_each(|element| match element {
            Element::Node(node) => {
                extract.nodes.insert(
                    node.id(),
                    OsmNode {
                        id: node.id(),
                        coord: Coord::new(node.lat(), node.lon()),
                        tags: tag_map(node.tags()),
                    },
                );
            }
            Element::DenseNode(node) => {
                extract.nodes.insert(
                    node.id(),
                    OsmNode {
                        id: node.id(),
                        coord: Coord::new(node.lat(), node.lon()),
                        tags: tag_map(node.tags()),
                    },
                );
            }
            Element::Way(way) => {
                extract.ways.push(OsmWay {
                    id: way.id(),
                    node_ids: way.refs().collect(),
                    tags: tag_map(way.tags()),
                });
            }
            Element::Relation(relation) => {
                let members = relation
                    .members()
                    .map(|member| RelationMember {
                        kind: match member.member_type {
                            RelMemberType::Node => MemberKind::Node,
                            RelMemberType::Way => MemberKind::Way,
                            RelMemberType::Relation => MemberKind::Relation,
                        },
                        id: member.member_id,
                        role: member.role().unwrap_or_default().to_string(),
                    })
                    .collect();
                extract.relations.push(OsmRelation {
                    id: relation.id(),
                    members,
                    tags: tag_map(relation.tags()),
                });
            }
        })
        .with_context(|| format!("Failed to read PBF extract {}", path.display()))?;

    info!(
        "Collected {} nodes, {} ways and {} relations",
        extract.nodes.len(),
        extract.ways.len(),
        extract.relations.len()
    );

    Ok(extract)
}

impl GeoProvider for PbfProvider {
    fn describe(&self) -> String {
        format!("PBF extract {}", self.path.display())
    }

    fn fetch_network(&self, center: Coord, radius_m: f64) -> Result<StreetNetwork> {
        let bbox = BoundingBox::query_box(center, radius_m)?;
        let network = build_street_network(self.extract()?, &bbox);
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
        Ok(build_features(self.extract()?, filter, &bbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn varint(mut value: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    fn zigzag(value: i64) -> u64 {
        ((value << 1) ^ (value >> 63)) as u64
    }

    fn field_varint(out: &mut Vec<u8>, field: u64, value: u64) {
        varint(field << 3, out);
        varint(value, out);
    }

    fn field_bytes(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
        varint((field << 3) | 2, out);
        varint(bytes.len() as u64, out);
        out.extend_from_slice(bytes);
    }

    fn packed(values: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        for value in values {
            varint(*value, &mut out);
        }
        out
    }

    fn node(id: i64, lat: f64, lon: f64) -> Vec<u8> {
        let mut out = Vec::new();
        field_varint(&mut out, 1, zigzag(id));
        // Default granularity is 100 nanodegrees
        field_varint(&mut out, 8, zigzag((lat * 1e7).round() as i64));
        field_varint(&mut out, 9, zigzag((lon * 1e7).round() as i64));
        out
    }

    /// One raw OSMData blob holding three nodes, a named way and a multipolygon
    fn tiny_extract() -> Vec<u8> {
        let strings = [
            "", "name", "Main Street", "type", "multipolygon", "outer", "highway", "residential",
        ];
        let mut table = Vec::new();
        for string in strings {
            field_bytes(&mut table, 1, string.as_bytes());
        }

        let mut nodes = Vec::new();
        for (id, lat, lon) in [(1, 52.5, 13.4), (2, 52.501, 13.4), (3, 52.501, 13.401)] {
            field_bytes(&mut nodes, 1, &node(id, lat, lon));
        }

        let mut way = Vec::new();
        field_varint(&mut way, 1, 10);
        field_bytes(&mut way, 2, &packed(&[6, 1]));
        field_bytes(&mut way, 3, &packed(&[7, 2]));
        field_bytes(&mut way, 8, &packed(&[zigzag(1), zigzag(1), zigzag(1)]));
        let mut ways = Vec::new();
        field_bytes(&mut ways, 3, &way);

        let mut relation = Vec::new();
        field_varint(&mut relation, 1, 20);
        field_bytes(&mut relation, 2, &packed(&[3]));
        field_bytes(&mut relation, 3, &packed(&[4]));
        field_bytes(&mut relation, 8, &packed(&[5]));
        field_bytes(&mut relation, 9, &packed(&[zigzag(10)]));
        field_bytes(&mut relation, 10, &packed(&[1]));
        let mut relations = Vec::new();
        field_bytes(&mut relations, 4, &relation);

        let mut block = Vec::new();
        field_bytes(&mut block, 1, &table);
        for group in [&nodes, &ways, &relations] {
            field_bytes(&mut block, 2, group);
        }

        let mut blob = Vec::new();
        field_bytes(&mut blob, 1, &block);
        field_varint(&mut blob, 2, block.len() as u64);

        let mut header = Vec::new();
        field_bytes(&mut header, 1, b"OSMData");
        field_varint(&mut header, 3, blob.len() as u64);

        let mut file = (header.len() as u32).to_be_bytes().to_vec();
        file.extend(header);
        file.extend(blob);
        file
    }

    #[test]
    fn test_read_extract_collects_elements() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&tiny_extract()).unwrap();
        file.flush().unwrap();

        let extract = read_extract(file.path()).unwrap();

        assert_eq!(extract.nodes.len(), 3);
        let corner = &extract.nodes[&3];
        assert!((corner.coord.lat - 52.501).abs() < 1e-6);
        assert!((corner.coord.lon - 13.401).abs() < 1e-6);

        assert_eq!(extract.ways.len(), 1);
        let way = &extract.ways[0];
        assert_eq!(way.id, 10);
        assert_eq!(way.node_ids, vec![1, 2, 3]);
        assert_eq!(way.tags.get("name").map(String::as_str), Some("Main Street"));
        assert_eq!(way.tags.get("highway").map(String::as_str), Some("residential"));

        assert_eq!(extract.relations.len(), 1);
        let relation = &extract.relations[0];
        assert_eq!(relation.id, 20);
        assert_eq!(relation.tags.get("type").map(String::as_str), Some("multipolygon"));
        assert_eq!(relation.members.len(), 1);
        assert_eq!(relation.members[0].kind, MemberKind::Way);
        assert_eq!(relation.members[0].id, 10);
        assert_eq!(relation.members[0].role, "outer");
    }

    #[test]
    fn test_missing_extract_is_error() {
        let provider = PbfProvider::new(PathBuf::from("does/not/exist.osm.pbf"));
        let err = provider.fetch_network(Coord::new(52.5, 13.4), 1000.0).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open PBF extract"));
    }
}
