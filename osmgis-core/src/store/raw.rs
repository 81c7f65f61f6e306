//! In-memory form of the raw OSM schema handed to [`super::OsmStore::load_raw`].

use geo::Coord;

use crate::{ElementKind, RelationMember, Tags};

/// A node with its coordinate in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    /// OSM node id.
    pub id: i64,
    /// Longitude (`x`) and latitude (`y`).
    pub coord: Coord,
    /// Node tags.
    pub tags: Tags,
}

/// A way with its ordered node references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWay {
    /// OSM way id.
    pub id: i64,
    /// Node ids in way order.
    pub nodes: Vec<i64>,
    /// Way tags.
    pub tags: Tags,
}

/// A relation with its way members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRelation {
    /// OSM relation id.
    pub id: i64,
    /// Way members in relation order.
    pub members: Vec<RelationMember>,
    /// Relation tags.
    pub tags: Tags,
}

/// Everything a loader read from one OSM extract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    /// Nodes.
    pub nodes: Vec<RawNode>,
    /// Ways.
    pub ways: Vec<RawWay>,
    /// Relations.
    pub relations: Vec<RawRelation>,
}

impl RawSnapshot {
    /// Whether the snapshot has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }

    /// Number of elements of one kind.
    #[must_use]
    pub fn count(&self, kind: ElementKind) -> usize {
        match kind {
            ElementKind::Node => self.nodes.len(),
            ElementKind::Way => self.ways.len(),
            ElementKind::Relation => self.relations.len(),
        }
    }

    /// Append every element of `other`.
    pub fn merge(&mut self, other: Self) {
        self.nodes.extend(other.nodes);
        self.ways.extend(other.ways);
        self.relations.extend(other.relations);
    }

    /// `(id, tags)` pairs of one element kind.
    pub fn tagged(&self, kind: ElementKind) -> Box<dyn Iterator<Item = (i64, &Tags)> + '_> {
        match kind {
            ElementKind::Node => Box::new(self.nodes.iter().map(|n| (n.id, &n.tags))),
            ElementKind::Way => Box::new(self.ways.iter().map(|w| (w.id, &w.tags))),
            ElementKind::Relation => Box::new(self.relations.iter().map(|r| (r.id, &r.tags))),
        }
    }
}
