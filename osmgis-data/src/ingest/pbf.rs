//! Parallel decoding of OSM PBF extracts.

use camino::Utf8Path;
use log::{debug, info};
use osmgis_core::{
    RelationMember, Tags,
    store::{RawNode, RawRelation, RawSnapshot, RawWay},
};
use osmpbf::{Element, ElementReader, RelMemberType};

use super::{OsmLoadError, validated_coord};

#[derive(Debug, Default)]
struct SnapshotAccumulator {
    snapshot: RawSnapshot,
    skipped_nodes: u64,
}

fn collect_tags<'a, T>(tags: T) -> Tags
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

impl SnapshotAccumulator {
    fn from_element(element: Element<'_>) -> Self {
        let mut accumulator = Self::default();
        match element {
            Element::Node(node) => {
                accumulator.push_node(node.id(), node.lon(), node.lat(), collect_tags(node.tags()));
            }
            Element::DenseNode(node) => {
                accumulator.push_node(node.id(), node.lon(), node.lat(), collect_tags(node.tags()));
            }
            Element::Way(way) => accumulator.snapshot.ways.push(RawWay {
                id: way.id(),
                nodes: way.refs().collect(),
                tags: collect_tags(way.tags()),
            }),
            Element::Relation(relation) => {
                let members = relation
                    .members()
                    .filter(|member| member.member_type == RelMemberType::Way)
                    .map(|member| {
                        RelationMember::new(member.member_id, member.role().unwrap_or_default())
                    })
                    .collect();
                accumulator.snapshot.relations.push(RawRelation {
                    id: relation.id(),
                    members,
                    tags: collect_tags(relation.tags()),
                });
            }
        }
        accumulator
    }

    fn push_node(&mut self, id: i64, lon: f64, lat: f64, tags: Tags) {
        match validated_coord(lon, lat) {
            Some(coord) => self.snapshot.nodes.push(RawNode { id, coord, tags }),
            None => {
                debug!("skipping node {id} with invalid coordinates");
                self.skipped_nodes += 1;
            }
        }
    }

    fn combine(mut self, other: Self) -> Self {
        self.snapshot.merge(other.snapshot);
        self.skipped_nodes += other.skipped_nodes;
        self
    }

    /// Element order from the parallel reader is arbitrary; restore id order.
    fn finish(mut self) -> RawSnapshot {
        self.snapshot.nodes.sort_by_key(|node| node.id);
        self.snapshot.ways.sort_by_key(|way| way.id);
        self.snapshot.relations.sort_by_key(|relation| relation.id);
        if self.skipped_nodes > 0 {
            info!("skipped {} nodes with invalid coordinates", self.skipped_nodes);
        }
        self.snapshot
    }
}

/// Decode a PBF extract into a raw snapshot, in parallel.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use osmgis_data::load_pbf;
///
/// let snapshot = load_pbf(Utf8Path::new("bretagne.osm.pbf"))?;
/// println!("{} ways", snapshot.ways.len());
/// # Ok::<(), osmgis_data::OsmLoadError>(())
/// ```
///
/// # Errors
/// Returns [`OsmLoadError::OpenPbf`] when the file cannot be opened and
/// [`OsmLoadError::Decode`] when its content is not valid PBF.
pub fn load_pbf(path: &Utf8Path) -> Result<RawSnapshot, OsmLoadError> {
    let reader =
        ElementReader::from_path(path.as_std_path()).map_err(|source| OsmLoadError::OpenPbf {
            source,
            path: path.to_path_buf(),
        })?;
    reader
        .par_map_reduce(
            SnapshotAccumulator::from_element,
            SnapshotAccumulator::default,
            SnapshotAccumulator::combine,
        )
        .map(SnapshotAccumulator::finish)
        .map_err(|source| OsmLoadError::Decode {
            source,
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[rstest]
    fn combining_restores_id_order() {
        let mut first = SnapshotAccumulator::default();
        first.push_node(9, 1.0, 1.0, Tags::new());
        let mut second = SnapshotAccumulator::default();
        second.push_node(3, 2.0, 2.0, Tags::new());
        second.push_node(4, 500.0, 2.0, Tags::new());

        let accumulated = first.combine(second);
        assert_eq!(accumulated.skipped_nodes, 1);
        let snapshot = accumulated.finish();
        let ids: Vec<i64> = snapshot.nodes.iter().map(|node| node.id).collect();
        assert_eq!(ids, [3, 9]);
        assert_eq!(snapshot.nodes[0].coord, Coord { x: 2.0, y: 2.0 });
    }

    #[rstest]
    fn reports_missing_files() {
        let path = Utf8Path::new("definitely/missing.osm.pbf");
        assert!(matches!(load_pbf(path), Err(OsmLoadError::OpenPbf { .. })));
    }

    #[rstest]
    fn rejects_invalid_payloads() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"\x00\x00\x00\x0dnot a pbf blob at all")
            .expect("write payload");
        let path = Utf8Path::from_path(file.path()).expect("utf-8 path");
        assert!(matches!(load_pbf(path), Err(OsmLoadError::Decode { .. })));
    }
}
