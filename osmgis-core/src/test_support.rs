//! Test-only, in-memory `OsmStore` implementation used by unit and behaviour
//! tests.

use std::collections::{BTreeMap, BTreeSet};

use geo::Coord;
use thiserror::Error;

use crate::{
    ElementKind, RelationMember, TagFilter, Tags,
    store::{
        Column, KeySelection, Layer, OsmStore, RawNode, RawSnapshot, TableName, TablePrefix,
    },
};

/// Errors raised by [`MemoryOsmStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryOsmStoreError {
    /// No raw snapshot is loaded under the prefix.
    #[error("no raw tables for prefix {prefix}")]
    MissingPrefix {
        /// Requested prefix.
        prefix: String,
    },
    /// No layer exists with this name.
    #[error("table {name} does not exist")]
    MissingTable {
        /// Requested table.
        name: String,
    },
    /// A layer with this name already exists.
    #[error("table {name} already exists")]
    DuplicateTable {
        /// Offending table.
        name: String,
    },
}

/// In-memory `OsmStore` keeping raw snapshots per prefix and layers per
/// table name.
///
/// Every query is a linear scan; it is intended only for small datasets.
#[derive(Debug, Default, Clone)]
pub struct MemoryOsmStore {
    raw: BTreeMap<String, RawSnapshot>,
    layers: BTreeMap<String, Layer>,
}

impl MemoryOsmStore {
    /// Names of the layer tables currently held, in name order.
    #[must_use]
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.keys().cloned().collect()
    }

    /// Whether raw tables exist for `prefix`.
    #[must_use]
    pub fn has_raw(&self, prefix: &TablePrefix) -> bool {
        self.raw.contains_key(prefix.as_str())
    }

    fn snapshot(&self, prefix: &TablePrefix) -> Result<&RawSnapshot, MemoryOsmStoreError> {
        self.raw
            .get(prefix.as_str())
            .ok_or_else(|| MemoryOsmStoreError::MissingPrefix {
                prefix: prefix.to_string(),
            })
    }

    fn layer(&self, name: &TableName) -> Result<&Layer, MemoryOsmStoreError> {
        self.layers
            .get(name.as_str())
            .ok_or_else(|| MemoryOsmStoreError::MissingTable {
                name: name.to_string(),
            })
    }
}

impl OsmStore for MemoryOsmStore {
    type Error = MemoryOsmStoreError;

    fn load_raw(&mut self, prefix: &TablePrefix, snapshot: &RawSnapshot) -> Result<(), Self::Error> {
        self.raw
            .entry(prefix.as_str().to_owned())
            .or_default()
            .merge(snapshot.clone());
        Ok(())
    }

    fn drop_raw(&mut self, prefix: &TablePrefix) -> Result<(), Self::Error> {
        self.raw.remove(prefix.as_str());
        Ok(())
    }

    fn matching_ids(
        &self,
        prefix: &TablePrefix,
        kind: ElementKind,
        filter: &TagFilter,
    ) -> Result<BTreeSet<i64>, Self::Error> {
        Ok(self
            .snapshot(prefix)?
            .tagged(kind)
            .filter(|(_, tags)| filter.selects(tags))
            .map(|(id, _)| id)
            .collect())
    }

    fn element_tags(
        &self,
        prefix: &TablePrefix,
        kind: ElementKind,
        ids: &BTreeSet<i64>,
        keys: &KeySelection,
    ) -> Result<BTreeMap<i64, Tags>, Self::Error> {
        Ok(self
            .snapshot(prefix)?
            .tagged(kind)
            .filter(|(id, _)| ids.contains(id))
            .filter_map(|(id, tags)| {
                let selected: Tags = tags
                    .iter()
                    .filter(|(key, _)| keys.includes(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                (!selected.is_empty()).then_some((id, selected))
            })
            .collect())
    }

    fn node_coords(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Coord>, Self::Error> {
        Ok(self
            .snapshot(prefix)?
            .nodes
            .iter()
            .filter(|node| ids.contains(&node.id))
            .map(|node| (node.id, node.coord))
            .collect())
    }

    fn way_nodes(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Vec<i64>>, Self::Error> {
        Ok(self
            .snapshot(prefix)?
            .ways
            .iter()
            .filter(|way| ids.contains(&way.id))
            .map(|way| (way.id, way.nodes.clone()))
            .collect())
    }

    fn relation_members(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Vec<RelationMember>>, Self::Error> {
        Ok(self
            .snapshot(prefix)?
            .relations
            .iter()
            .filter(|relation| ids.contains(&relation.id))
            .map(|relation| (relation.id, relation.members.clone()))
            .collect())
    }

    fn create_layer(&mut self, name: &TableName, layer: &Layer) -> Result<(), Self::Error> {
        if self.layers.contains_key(name.as_str()) {
            return Err(MemoryOsmStoreError::DuplicateTable {
                name: name.to_string(),
            });
        }
        self.layers.insert(name.as_str().to_owned(), layer.clone());
        Ok(())
    }

    fn read_layer(&self, name: &TableName) -> Result<Layer, Self::Error> {
        self.layer(name).cloned()
    }

    fn drop_table(&mut self, name: &TableName) -> Result<(), Self::Error> {
        self.layers.remove(name.as_str());
        Ok(())
    }

    fn table_exists(&self, name: &TableName) -> Result<bool, Self::Error> {
        Ok(self.layers.contains_key(name.as_str()))
    }

    fn table_columns(&self, name: &TableName) -> Result<Vec<Column>, Self::Error> {
        Ok(self.layer(name)?.columns.clone())
    }
}

/// Untagged corner nodes of an axis-aligned square, numbered from `first_id`
/// counter-clockwise starting at `(x, y)`.
#[must_use]
pub fn square_nodes(first_id: i64, x: f64, y: f64, size: f64) -> Vec<RawNode> {
    [(x, y), (x + size, y), (x + size, y + size), (x, y + size)]
        .into_iter()
        .zip(first_id..)
        .map(|((x, y), id)| RawNode {
            id,
            coord: Coord { x, y },
            tags: Tags::new(),
        })
        .collect()
}
