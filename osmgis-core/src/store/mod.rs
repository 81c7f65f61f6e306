//! Storage of the raw OSM schema and of produced layers.
//!
//! The [`OsmStore`] trait covers what layer assembly needs from a spatial
//! store: selecting element ids by tag filter, reading tags, coordinates and
//! topology, and writing attributed layers. Raw snapshots are written under a
//! [`TablePrefix`] and removed by [`OsmStore::drop_raw`].

use std::collections::{BTreeMap, BTreeSet};

use geo::Coord;

use crate::{ElementKind, RelationMember, TagFilter, Tags};

mod naming;
mod raw;
#[cfg(feature = "store-sqlite")]
mod sqlite;
mod table;

pub use naming::{NamingError, RawTable, TableName, TablePrefix, id_column};
pub use raw::{RawNode, RawRelation, RawSnapshot, RawWay};
#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqliteOsmStore, SqliteOsmStoreError};
pub use table::{Column, ColumnType, GEOMETRY_COLUMN, Layer, Record, Value};

/// Which tag keys to read for a set of elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeySelection {
    /// Every key.
    #[default]
    All,
    /// Only these keys.
    Only(BTreeSet<String>),
}

impl KeySelection {
    /// Whether a key is selected.
    #[must_use]
    pub fn includes(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(keys) => keys.contains(key),
        }
    }
}

/// Read and write access to raw OSM tables and output layers.
///
/// Id sets passed to the read methods may mention elements that do not
/// exist; implementations skip them.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "store-sqlite")]
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::collections::BTreeMap;
/// use geo::Coord;
/// use osmgis_core::store::{OsmStore, RawNode, RawSnapshot, SqliteOsmStore, TablePrefix};
/// use osmgis_core::{ElementKind, TagFilter};
///
/// let mut store = SqliteOsmStore::open_in_memory()?;
/// let prefix = TablePrefix::new("demo")?;
/// let snapshot = RawSnapshot {
///     nodes: vec![RawNode {
///         id: 1,
///         coord: Coord { x: 2.0, y: 48.0 },
///         tags: BTreeMap::from([("amenity".into(), "bench".into())]),
///     }],
///     ..RawSnapshot::default()
/// };
/// store.load_raw(&prefix, &snapshot)?;
/// let ids = store.matching_ids(&prefix, ElementKind::Node, &TagFilter::keys(["amenity"]))?;
/// assert!(ids.contains(&1));
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "store-sqlite"))]
/// # fn main() {}
/// ```
pub trait OsmStore {
    /// Error raised by the backing store.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write a snapshot into the raw tables of `prefix`, creating them.
    fn load_raw(&mut self, prefix: &TablePrefix, snapshot: &RawSnapshot)
    -> Result<(), Self::Error>;

    /// Remove every raw table of `prefix`. Missing tables are ignored.
    fn drop_raw(&mut self, prefix: &TablePrefix) -> Result<(), Self::Error>;

    /// Ids of elements with at least one tag row satisfying `filter`.
    fn matching_ids(
        &self,
        prefix: &TablePrefix,
        kind: ElementKind,
        filter: &TagFilter,
    ) -> Result<BTreeSet<i64>, Self::Error>;

    /// Tags of the given elements, restricted to `keys`. Elements without a
    /// selected tag are absent from the result.
    fn element_tags(
        &self,
        prefix: &TablePrefix,
        kind: ElementKind,
        ids: &BTreeSet<i64>,
        keys: &KeySelection,
    ) -> Result<BTreeMap<i64, Tags>, Self::Error>;

    /// Coordinates of the given nodes.
    fn node_coords(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Coord>, Self::Error>;

    /// Node references of the given ways, ordered by `node_order`.
    fn way_nodes(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Vec<i64>>, Self::Error>;

    /// Way members of the given relations, in member order.
    fn relation_members(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Vec<RelationMember>>, Self::Error>;

    /// Create `name` and write every record of `layer` into it.
    fn create_layer(&mut self, name: &TableName, layer: &Layer) -> Result<(), Self::Error>;

    /// Read a layer written by [`OsmStore::create_layer`].
    fn read_layer(&self, name: &TableName) -> Result<Layer, Self::Error>;

    /// Drop a table if it exists.
    fn drop_table(&mut self, name: &TableName) -> Result<(), Self::Error>;

    /// Whether a table exists.
    fn table_exists(&self, name: &TableName) -> Result<bool, Self::Error>;

    /// Attribute columns of a layer table, excluding the geometry column.
    fn table_columns(&self, name: &TableName) -> Result<Vec<Column>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn key_selection_includes() {
        assert!(KeySelection::All.includes("anything"));
        let only = KeySelection::Only(BTreeSet::from(["name".to_owned()]));
        assert!(only.includes("name"));
        assert!(!only.includes("Name"));
    }
}
