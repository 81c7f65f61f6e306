//! Ordered tag mappings resolving free-form OSM tags into categories.
//!
//! A [`TagMapping`] lists target labels in priority order. Each label owns a
//! list of `osm_key → tokens` rules; a token either requires the tag value to
//! equal it, or, when prefixed with `!`, requires the tag to be present with
//! any other value.
//!
//! The first label with a satisfied token becomes the type. The first later
//! label with a satisfied token becomes the use; when none exists the use
//! repeats the type.
//!
//! # Examples
//! ```
//! use osmgis_core::{TagMapping, Tags};
//!
//! let mapping = TagMapping::default()
//!     .with_entry("residential", [("building", ["house", "apartments"])])
//!     .with_entry("education", [("amenity", ["school"])]);
//! let row = Tags::from([
//!     ("building".to_owned(), "house".to_owned()),
//!     ("amenity".to_owned(), "school".to_owned()),
//! ]);
//! let columns = ["building".to_owned(), "amenity".to_owned()];
//!
//! let class = mapping.classify(&row, &columns).expect("mapping matches");
//! assert_eq!(class.kind, "residential");
//! assert_eq!(class.usage, "education");
//! ```

use std::{collections::BTreeSet, fmt};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, SeqAccess, Visitor},
    ser::SerializeMap,
};

use crate::Tags;

const NEGATION_PREFIX: char = '!';

/// One accepted (or rejected) tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchToken {
    value: String,
    negated: bool,
}

impl MatchToken {
    /// Parse a token, treating a leading `!` as negation.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(NEGATION_PREFIX) {
            Some(value) => Self {
                value: value.to_owned(),
                negated: true,
            },
            None => Self {
                value: raw.to_owned(),
                negated: false,
            },
        }
    }

    /// Whether the tag value satisfies the token. Absent values never do.
    #[must_use]
    pub fn accepts(&self, value: Option<&str>) -> bool {
        value.is_some_and(|present| (present == self.value) != self.negated)
    }
}

impl fmt::Display for MatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "{NEGATION_PREFIX}{}", self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}

/// Tokens attached to one OSM key within a mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRule {
    /// OSM tag key, compared case-insensitively with the available columns.
    pub key: String,
    /// Tokens tested in order.
    pub tokens: Vec<MatchToken>,
}

/// A target label and the rules selecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Output category.
    pub label: String,
    /// Rules in definition order.
    pub rules: Vec<KeyRule>,
}

/// Result of [`TagMapping::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Highest-priority matched label (the feature "type").
    pub kind: String,
    /// Next distinct matched label, or `kind` again (the feature "use").
    pub usage: String,
}

/// Ordered label → rules table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagMapping {
    entries: Vec<MappingEntry>,
}

impl TagMapping {
    /// Append a label with its `(key, tokens)` rules. Later labels have lower
    /// priority.
    #[must_use]
    pub fn with_entry<L, R, K, T, S>(mut self, label: L, rules: R) -> Self
    where
        L: Into<String>,
        R: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .map(|(key, tokens)| KeyRule {
                key: key.into(),
                tokens: tokens
                    .into_iter()
                    .map(|token| MatchToken::parse(token.as_ref()))
                    .collect(),
            })
            .collect();
        self.entries.push(MappingEntry {
            label: label.into(),
            rules,
        });
        self
    }

    /// Entries in priority order.
    #[must_use]
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Whether the mapping has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every OSM key referenced by the mapping.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|entry| entry.rules.iter().map(|rule| rule.key.clone()))
            .collect()
    }

    /// Labels whose rules match the row, in priority order.
    pub fn matching_labels<'a, 'r>(
        &'a self,
        row: &'r Tags,
        available_columns: &'r [String],
    ) -> impl Iterator<Item = &'a str> + use<'a, 'r> {
        self.entries
            .iter()
            .filter(move |entry| entry_matches(entry, row, available_columns))
            .map(|entry| entry.label.as_str())
    }

    /// Resolve the row into a type and a use.
    ///
    /// Returns `None` when no entry matches.
    #[must_use]
    pub fn classify(&self, row: &Tags, available_columns: &[String]) -> Option<Classification> {
        let mut labels = self.matching_labels(row, available_columns);
        let kind = labels.next()?;
        let usage = labels.find(|label| *label != kind).unwrap_or(kind);
        Some(Classification {
            kind: kind.to_owned(),
            usage: usage.to_owned(),
        })
    }

    /// Resolve the row into a single category: the first matching label.
    #[must_use]
    pub fn classify_value(&self, row: &Tags, available_columns: &[String]) -> Option<&str> {
        self.matching_labels(row, available_columns).next()
    }
}

fn entry_matches(entry: &MappingEntry, row: &Tags, available_columns: &[String]) -> bool {
    entry.rules.iter().any(|rule| {
        let Some(column) = available_columns
            .iter()
            .find(|column| column.eq_ignore_ascii_case(&rule.key))
        else {
            return false;
        };
        let value = row.get(column).map(String::as_str);
        rule.tokens.iter().any(|token| token.accepts(value))
    })
}

impl Serialize for TagMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.label, &RulesRef(&entry.rules))?;
        }
        map.end()
    }
}

struct RulesRef<'a>(&'a [KeyRule]);

impl Serialize for RulesRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for rule in self.0 {
            let tokens: Vec<String> = rule.tokens.iter().map(ToString::to_string).collect();
            map.serialize_entry(&rule.key, &tokens)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TagMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = deserializer.deserialize_map(OrderedVisitor::<Rules>::new("a label to rules mapping"))?;
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|(label, rules)| MappingEntry {
                    label,
                    rules: rules.0,
                })
                .collect(),
        })
    }
}

struct Rules(Vec<KeyRule>);

impl<'de> Deserialize<'de> for Rules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rules = deserializer.deserialize_map(OrderedVisitor::<Tokens>::new("a key to tokens mapping"))?;
        Ok(Self(
            rules
                .into_iter()
                .map(|(key, tokens)| KeyRule {
                    key,
                    tokens: tokens.0,
                })
                .collect(),
        ))
    }
}

/// Tokens accept either a single string or a list of strings.
struct Tokens(Vec<MatchToken>);

impl<'de> Deserialize<'de> for Tokens {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TokensVisitor)
    }
}

struct TokensVisitor;

impl<'de> Visitor<'de> for TokensVisitor {
    type Value = Tokens;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a tag value or a list of tag values")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(Tokens(vec![MatchToken::parse(value)]))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut tokens = Vec::new();
        while let Some(raw) = seq.next_element::<String>()? {
            tokens.push(MatchToken::parse(&raw));
        }
        Ok(Tokens(tokens))
    }
}

/// Collects map entries in document order.
struct OrderedVisitor<V> {
    expecting: &'static str,
    marker: std::marker::PhantomData<V>,
}

impl<V> OrderedVisitor<V> {
    const fn new(expecting: &'static str) -> Self {
        Self {
            expecting,
            marker: std::marker::PhantomData,
        }
    }
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
    type Value = Vec<(String, V)>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.expecting)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, V>()? {
            entries.push((key, value));
        }
        Ok(entries)
    }
}
