//! Identifiers for OpenStreetMap elements.
//!
//! Node, way and relation ids share one numeric space in OSM extracts, so
//! every produced geometry carries the element kind as a one-letter prefix:
//! `n42`, `w42` and `r42` are three distinct features.
//!
//! # Examples
//! ```
//! use osmgis_core::{ElementId, ElementKind};
//!
//! let id = ElementId::way(42);
//! assert_eq!(id.to_string(), "w42");
//! assert_eq!("w42".parse::<ElementId>(), Ok(id));
//! assert_eq!(id.kind, ElementKind::Way);
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use thiserror::Error;

/// Free-form OSM tags keyed by tag key.
pub type Tags = BTreeMap<String, String>;

/// The three OSM element families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// A single coordinate.
    Node,
    /// An ordered list of node references.
    Way,
    /// A group of member ways with roles.
    Relation,
}

impl ElementKind {
    /// One-letter prefix used in source identifiers.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Node => 'n',
            Self::Way => 'w',
            Self::Relation => 'r',
        }
    }

    /// Lowercase name, also used to suffix raw schema table names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    const fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'n' => Some(Self::Node),
            'w' => Some(Self::Way),
            'r' => Some(Self::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-qualified OSM element identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    /// Element family.
    pub kind: ElementKind,
    /// Raw OSM id within that family.
    pub raw: i64,
}

impl ElementId {
    /// Identifier of a node.
    #[must_use]
    pub const fn node(raw: i64) -> Self {
        Self {
            kind: ElementKind::Node,
            raw,
        }
    }

    /// Identifier of a way.
    #[must_use]
    pub const fn way(raw: i64) -> Self {
        Self {
            kind: ElementKind::Way,
            raw,
        }
    }

    /// Identifier of a relation.
    #[must_use]
    pub const fn relation(raw: i64) -> Self {
        Self {
            kind: ElementKind::Relation,
            raw,
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.raw)
    }
}

/// Errors returned when parsing an [`ElementId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementIdError {
    /// The text did not start with `n`, `w` or `r`.
    #[error("element id {text:?} must start with n, w or r")]
    UnknownPrefix {
        /// Offending input.
        text: String,
    },
    /// The numeric part was not an integer.
    #[error("element id {text:?} has a non-numeric body")]
    InvalidNumber {
        /// Offending input.
        text: String,
    },
}

impl FromStr for ElementId {
    type Err = ElementIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let kind = chars
            .next()
            .and_then(ElementKind::from_prefix)
            .ok_or_else(|| ElementIdError::UnknownPrefix { text: s.to_owned() })?;
        let raw = chars
            .as_str()
            .parse::<i64>()
            .map_err(|_| ElementIdError::InvalidNumber { text: s.to_owned() })?;
        Ok(Self { kind, raw })
    }
}

/// Role of a way inside a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberRole {
    /// Boundary of a polygon.
    Outer,
    /// Hole of a polygon.
    Inner,
    /// Any other role, kept verbatim.
    Other(String),
}

impl MemberRole {
    /// Classify a raw role string. Matching is exact, as in OSM data.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "outer" => Self::Outer,
            "inner" => Self::Inner,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Raw role text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Outer => "outer",
            Self::Inner => "inner",
            Self::Other(role) => role,
        }
    }
}

/// A way referenced by a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    /// Referenced way id.
    pub way: i64,
    /// Role of the way in the relation.
    pub role: MemberRole,
}

impl RelationMember {
    /// Member with a role parsed from raw text.
    #[must_use]
    pub fn new(way: i64, role: &str) -> Self {
        Self {
            way,
            role: MemberRole::parse(role),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ElementId::node(1), "n1")]
    #[case(ElementId::way(250), "w250")]
    #[case(ElementId::relation(-3), "r-3")]
    fn renders_prefixed_ids(#[case] id: ElementId, #[case] expected: &str) {
        assert_eq!(id.to_string(), expected);
        assert_eq!(expected.parse::<ElementId>(), Ok(id));
    }

    #[rstest]
    #[case("x12")]
    #[case("")]
    fn rejects_unknown_prefix(#[case] text: &str) {
        assert!(matches!(
            text.parse::<ElementId>(),
            Err(ElementIdError::UnknownPrefix { .. })
        ));
    }

    #[rstest]
    fn rejects_non_numeric_body() {
        assert!(matches!(
            "wabc".parse::<ElementId>(),
            Err(ElementIdError::InvalidNumber { .. })
        ));
    }

    #[rstest]
    #[case("outer", MemberRole::Outer)]
    #[case("inner", MemberRole::Inner)]
    #[case("Outer", MemberRole::Other("Outer".to_owned()))]
    #[case("", MemberRole::Other(String::new()))]
    fn parses_member_roles(#[case] raw: &str, #[case] expected: MemberRole) {
        let role = MemberRole::parse(raw);
        assert_eq!(role.as_str(), raw);
        assert_eq!(role, expected);
    }

    #[rstest]
    fn same_raw_id_differs_across_kinds() {
        assert_ne!(ElementId::node(7), ElementId::way(7));
        assert_ne!(ElementId::way(7).to_string(), ElementId::relation(7).to_string());
    }
}
