//! Validated table prefixes and names.
//!
//! Names end up spliced into SQL, so they are restricted to ASCII
//! identifiers: a letter or underscore followed by letters, digits or
//! underscores.

use std::fmt;

use rand::Rng;
use thiserror::Error;

use crate::ElementKind;

/// Errors raised when validating table identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    /// A prefix was not a plain identifier.
    #[error("invalid table prefix {prefix:?}: expected letters, digits and underscores")]
    InvalidPrefix {
        /// Offending prefix.
        prefix: String,
    },
    /// A table name was not a plain identifier.
    #[error("invalid table name {name:?}: expected letters, digits and underscores")]
    InvalidName {
        /// Offending name.
        name: String,
    },
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prefix shared by every raw and output table of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TablePrefix(String);

impl TablePrefix {
    /// Validate a prefix.
    ///
    /// # Errors
    /// Returns [`NamingError::InvalidPrefix`] unless `prefix` is a plain
    /// identifier.
    pub fn new(prefix: impl Into<String>) -> Result<Self, NamingError> {
        let prefix = prefix.into();
        if is_identifier(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(NamingError::InvalidPrefix { prefix })
        }
    }

    /// Prefix text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of one raw schema table under this prefix.
    #[must_use]
    pub fn raw(&self, table: RawTable) -> TableName {
        TableName(format!("{}_{}", self.0, table.suffix()))
    }
}

impl fmt::Display for TablePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tables of the raw OSM schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawTable {
    /// `id_node, the_geom`
    Node,
    /// `id_way`
    Way,
    /// `id_way, id_node, node_order`
    WayNode,
    /// `id_relation`
    Relation,
    /// `id_relation, id_way, role`
    WayMember,
    /// `id_node, tag_key, tag_value`
    NodeTag,
    /// `id_way, tag_key, tag_value`
    WayTag,
    /// `id_relation, tag_key, tag_value`
    RelationTag,
}

impl RawTable {
    /// Every raw table, parents before children.
    pub const ALL: [Self; 8] = [
        Self::Node,
        Self::Way,
        Self::WayNode,
        Self::Relation,
        Self::WayMember,
        Self::NodeTag,
        Self::WayTag,
        Self::RelationTag,
    ];

    /// Table name suffix after the prefix.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::WayNode => "way_node",
            Self::Relation => "relation",
            Self::WayMember => "way_member",
            Self::NodeTag => "node_tag",
            Self::WayTag => "way_tag",
            Self::RelationTag => "relation_tag",
        }
    }

    /// Tag table of one element kind.
    #[must_use]
    pub const fn tags_of(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Node => Self::NodeTag,
            ElementKind::Way => Self::WayTag,
            ElementKind::Relation => Self::RelationTag,
        }
    }
}

/// Id column of one element kind in the raw schema.
#[must_use]
pub const fn id_column(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Node => "id_node",
        ElementKind::Way => "id_way",
        ElementKind::Relation => "id_relation",
    }
}

/// A validated table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

impl TableName {
    /// Validate an existing table name.
    ///
    /// # Errors
    /// Returns [`NamingError::InvalidName`] unless `name` is a plain
    /// identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, NamingError> {
        let name = name.into();
        if is_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(NamingError::InvalidName { name })
        }
    }

    /// A run-unique name `<prefix>_<layer>_<8 hex digits>`.
    ///
    /// # Errors
    /// Returns [`NamingError::InvalidName`] when `layer` is not an identifier
    /// fragment.
    ///
    /// # Examples
    /// ```
    /// use osmgis_core::store::{TableName, TablePrefix};
    ///
    /// let prefix = TablePrefix::new("paris")?;
    /// let name = TableName::fresh(&prefix, "buildings")?;
    /// assert!(name.as_str().starts_with("paris_buildings_"));
    /// assert_eq!(name.as_str().len(), "paris_buildings_".len() + 8);
    /// # Ok::<(), osmgis_core::store::NamingError>(())
    /// ```
    pub fn fresh(prefix: &TablePrefix, layer: &str) -> Result<Self, NamingError> {
        let suffix: u32 = rand::thread_rng().r#gen();
        Self::new(format!("{prefix}_{layer}_{suffix:08x}"))
    }

    /// Table name text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("paris")]
    #[case("_tmp2")]
    #[case("Run_01")]
    fn accepts_identifiers(#[case] prefix: &str) {
        assert_eq!(TablePrefix::new(prefix).map(|p| p.to_string()), Ok(prefix.to_owned()));
    }

    #[rstest]
    #[case("")]
    #[case("1abc")]
    #[case("a-b")]
    #[case("x; DROP TABLE y")]
    #[case("été")]
    fn rejects_non_identifiers(#[case] prefix: &str) {
        assert!(matches!(
            TablePrefix::new(prefix),
            Err(NamingError::InvalidPrefix { .. })
        ));
    }

    #[rstest]
    fn names_raw_tables() {
        let prefix = TablePrefix::new("osm").expect("valid prefix");
        let names: Vec<String> = RawTable::ALL
            .iter()
            .map(|table| prefix.raw(*table).to_string())
            .collect();
        assert_eq!(
            names,
            [
                "osm_node",
                "osm_way",
                "osm_way_node",
                "osm_relation",
                "osm_way_member",
                "osm_node_tag",
                "osm_way_tag",
                "osm_relation_tag",
            ]
        );
    }

    #[rstest]
    fn fresh_names_differ() {
        let prefix = TablePrefix::new("osm").expect("valid prefix");
        let a = TableName::fresh(&prefix, "roads").expect("fresh");
        let b = TableName::fresh(&prefix, "roads").expect("fresh");
        assert_ne!(a, b, "random suffixes should not collide in practice");
    }

    #[rstest]
    fn fresh_rejects_bad_layer_names() {
        let prefix = TablePrefix::new("osm").expect("valid prefix");
        assert!(TableName::fresh(&prefix, "bad name").is_err());
    }
}
