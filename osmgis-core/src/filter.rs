//! Tag predicates used to select OSM elements from a tag table.
//!
//! A [`TagFilter`] is built from one of two specification shapes:
//!
//! - a flat list of keys, selecting elements carrying any of them;
//! - a mapping from key to accepted values, where each key contributes the
//!   clause `key = K AND value IN (V...)`, or `key = K` when no values are
//!   listed. Clauses are OR-combined.
//!
//! An empty specification is vacuous and selects every tagged element, which
//! is distinct from a filter that happens to match nothing.
//!
//! # Examples
//! ```
//! use osmgis_core::TagFilter;
//! use serde_json::json;
//!
//! let filter = TagFilter::from_json(&json!({"building": [], "amenity": ["school"]}))?;
//! assert!(filter.matches("building", "house"));
//! assert!(filter.matches("amenity", "school"));
//! assert!(!filter.matches("amenity", "bank"));
//! # Ok::<(), osmgis_core::TagFilterError>(())
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::Tags;

/// Errors raised while building a [`TagFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagFilterError {
    /// The specification is neither empty, a key list, nor a key mapping.
    #[error("invalid tag specification: {reason}")]
    InvalidSpecification {
        /// Human-readable description of the problem.
        reason: String,
    },
}

impl TagFilterError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidSpecification {
            reason: reason.into(),
        }
    }
}

/// Accepted values for one key of a mapping-form filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConstraint {
    /// Tag key to match.
    pub key: String,
    /// Accepted values; empty means any value.
    pub values: Vec<String>,
}

impl KeyConstraint {
    fn accepts(&self, key: &str, value: &str) -> bool {
        self.key == key && (self.values.is_empty() || self.values.iter().any(|v| v == value))
    }
}

/// Boolean predicate over `(key, value)` tag rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum TagFilter {
    /// Vacuous filter selecting every tagged element.
    #[default]
    Any,
    /// Select elements carrying any of these keys.
    Keys(Vec<String>),
    /// Select elements satisfying any of these key constraints.
    Values(Vec<KeyConstraint>),
}

/// A parameterised SQL rendering of a [`TagFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPredicate {
    /// Boolean expression using anonymous `?` placeholders.
    pub clause: String,
    /// Values bound to the placeholders, in order.
    pub params: Vec<String>,
}

impl TagFilter {
    /// Filter on a flat list of keys. An empty list yields [`TagFilter::Any`].
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            Self::Any
        } else {
            Self::Keys(keys)
        }
    }

    /// Filter on key to accepted-values pairs. An empty list yields
    /// [`TagFilter::Any`].
    pub fn values<I, K, V, S>(constraints: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let constraints: Vec<KeyConstraint> = constraints
            .into_iter()
            .map(|(key, values)| KeyConstraint {
                key: key.into(),
                values: values.into_iter().map(Into::into).collect(),
            })
            .collect();
        if constraints.is_empty() {
            Self::Any
        } else {
            Self::Values(constraints)
        }
    }

    /// Build a filter from a JSON specification.
    ///
    /// Accepts `null`, `[]` or `{}` (vacuous), an array of key strings, or an
    /// object whose values are `null`, a string, or an array of strings.
    ///
    /// # Errors
    /// Returns [`TagFilterError::InvalidSpecification`] for any other shape.
    pub fn from_json(value: &Value) -> Result<Self, TagFilterError> {
        match value {
            Value::Null => Ok(Self::Any),
            Value::Array(items) => {
                let keys = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_owned).ok_or_else(|| {
                            TagFilterError::invalid(format!(
                                "key lists may only contain strings, found {item}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::keys(keys))
            }
            Value::Object(entries) => {
                let constraints = entries
                    .iter()
                    .map(|(key, allowed)| Ok((key.clone(), allowed_values(key, allowed)?)))
                    .collect::<Result<Vec<_>, TagFilterError>>()?;
                Ok(Self::values(constraints))
            }
            other => Err(TagFilterError::invalid(format!(
                "expected a key list or a key to values mapping, found {other}"
            ))),
        }
    }

    /// Whether the filter selects every tagged element.
    #[must_use]
    pub const fn is_vacuous(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Keys named by the filter, in specification order.
    pub fn filter_keys(&self) -> impl Iterator<Item = &str> {
        let (keys, constraints): (&[String], &[KeyConstraint]) = match self {
            Self::Any => (&[], &[]),
            Self::Keys(keys) => (keys.as_slice(), &[]),
            Self::Values(constraints) => (&[], constraints.as_slice()),
        };
        keys.iter()
            .map(String::as_str)
            .chain(constraints.iter().map(|constraint| constraint.key.as_str()))
    }

    /// Whether a single tag row satisfies the predicate.
    #[must_use]
    pub fn matches(&self, key: &str, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Keys(keys) => keys.iter().any(|candidate| candidate == key),
            Self::Values(constraints) => constraints
                .iter()
                .any(|constraint| constraint.accepts(key, value)),
        }
    }

    /// Whether an element with these tags would be selected.
    ///
    /// Untagged elements are never selected: the predicate runs over tag rows.
    #[must_use]
    pub fn selects(&self, tags: &Tags) -> bool {
        tags.iter().any(|(key, value)| self.matches(key, value))
    }

    /// Render the predicate as a SQL boolean expression over the given key and
    /// value columns.
    #[must_use]
    pub fn to_sql(&self, key_column: &str, value_column: &str) -> SqlPredicate {
        match self {
            Self::Any => SqlPredicate {
                clause: "1 = 1".to_owned(),
                params: Vec::new(),
            },
            Self::Keys(keys) => SqlPredicate {
                clause: format!("{key_column} IN ({})", placeholders(keys.len())),
                params: keys.clone(),
            },
            Self::Values(constraints) => {
                let mut params = Vec::new();
                let clauses: Vec<String> = constraints
                    .iter()
                    .map(|constraint| {
                        params.push(constraint.key.clone());
                        if constraint.values.is_empty() {
                            format!("({key_column} = ?)")
                        } else {
                            params.extend(constraint.values.iter().cloned());
                            format!(
                                "({key_column} = ? AND {value_column} IN ({}))",
                                placeholders(constraint.values.len())
                            )
                        }
                    })
                    .collect();
                SqlPredicate {
                    clause: clauses.join(" OR "),
                    params,
                }
            }
        }
    }

    /// JSON form of the filter, accepted back by [`TagFilter::from_json`].
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Any => Value::Object(Map::new()),
            Self::Keys(keys) => Value::Array(keys.iter().cloned().map(Value::String).collect()),
            Self::Values(constraints) => Value::Object(
                constraints
                    .iter()
                    .map(|constraint| {
                        let values = constraint.values.iter().cloned().map(Value::String);
                        (constraint.key.clone(), Value::Array(values.collect()))
                    })
                    .collect(),
            ),
        }
    }

    /// Keys named by the filter, deduplicated.
    #[must_use]
    pub fn key_set(&self) -> BTreeSet<String> {
        self.filter_keys().map(str::to_owned).collect()
    }
}

impl TryFrom<Value> for TagFilter {
    type Error = TagFilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

impl From<TagFilter> for Value {
    fn from(filter: TagFilter) -> Self {
        filter.to_json()
    }
}

fn allowed_values(key: &str, allowed: &Value) -> Result<Vec<String>, TagFilterError> {
    match allowed {
        Value::Null => Ok(Vec::new()),
        Value::String(value) => Ok(vec![value.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_owned).ok_or_else(|| {
                    TagFilterError::invalid(format!(
                        "values for key {key:?} must be strings, found {item}"
                    ))
                })
            })
            .collect(),
        other => Err(TagFilterError::invalid(format!(
            "values for key {key:?} must be a string or a list, found {other}"
        ))),
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!([]))]
    #[case(json!({}))]
    fn empty_specifications_are_vacuous(#[case] spec: Value) {
        let filter = TagFilter::from_json(&spec).expect("empty spec is valid");
        assert!(filter.is_vacuous());
        assert!(filter.selects(&tags(&[("anything", "goes")])));
        assert!(!filter.selects(&Tags::new()), "untagged rows never match");
    }

    #[rstest]
    fn key_list_ignores_values() {
        let filter = TagFilter::from_json(&json!(["building", "highway"])).expect("valid");
        assert!(filter.matches("building", "yes"));
        assert!(filter.matches("highway", "primary"));
        assert!(!filter.matches("landuse", "forest"));
    }

    #[rstest]
    fn mapping_clauses_are_or_combined() {
        let filter = TagFilter::from_json(&json!({
            "building": null,
            "amenity": ["school", "college"],
            "leisure": "park"
        }))
        .expect("valid");
        assert!(filter.selects(&tags(&[("building", "house")])));
        assert!(filter.selects(&tags(&[("amenity", "college"), ("name", "X")])));
        assert!(filter.selects(&tags(&[("leisure", "park")])));
        assert!(!filter.selects(&tags(&[("amenity", "bank")])));
    }

    #[rstest]
    fn unmatched_mapping_selects_nothing() {
        let filter = TagFilter::from_json(&json!({"toto": "tata"})).expect("valid");
        assert!(!filter.is_vacuous());
        assert!(!filter.selects(&tags(&[("building", "yes"), ("toto", "titi")])));
    }

    #[rstest]
    #[case(json!("building"))]
    #[case(json!(12))]
    #[case(json!([1, 2]))]
    #[case(json!({"building": {"nested": true}}))]
    #[case(json!({"building": [true]}))]
    fn malformed_specifications_are_rejected(#[case] spec: Value) {
        let err = TagFilter::from_json(&spec).expect_err("spec is malformed");
        assert!(matches!(err, TagFilterError::InvalidSpecification { .. }));
    }

    #[rstest]
    fn sql_rendering_of_mapping() {
        let filter = TagFilter::values([
            ("amenity", vec!["school", "college"]),
            ("building", Vec::new()),
        ]);
        let predicate = filter.to_sql("tag_key", "tag_value");
        assert_eq!(
            predicate.clause,
            "(tag_key = ? AND tag_value IN (?, ?)) OR (tag_key = ?)"
        );
        assert_eq!(predicate.params, ["amenity", "school", "college", "building"]);
    }

    #[rstest]
    fn sql_rendering_of_keys_and_any() {
        let keys = TagFilter::keys(["a", "b"]).to_sql("k", "v");
        assert_eq!(keys.clause, "k IN (?, ?)");
        assert_eq!(keys.params, ["a", "b"]);
        let any = TagFilter::Any.to_sql("k", "v");
        assert_eq!(any.clause, "1 = 1");
        assert!(any.params.is_empty());
    }

    #[rstest]
    fn json_form_round_trips_through_serde() {
        let filter = TagFilter::values([("highway", vec!["primary"]), ("route", Vec::new())]);
        let encoded = serde_json::to_value(&filter).expect("serialise");
        let decoded: TagFilter = serde_json::from_value(encoded).expect("deserialise");
        assert_eq!(decoded, filter);
    }

    #[rstest]
    fn filter_keys_follow_specification() {
        let filter = TagFilter::keys(["height", "building"]);
        assert_eq!(filter.filter_keys().collect::<Vec<_>>(), ["height", "building"]);
        assert!(TagFilter::Any.filter_keys().next().is_none());
    }
}
