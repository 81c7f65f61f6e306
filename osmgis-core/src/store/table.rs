//! Typed output layers: columns, values and records.

use std::fmt;

use geo::Geometry;

/// Name of the geometry column of every output table.
pub const GEOMETRY_COLUMN: &str = "the_geom";

/// Storage type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    /// SQL type name.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Parse an SQL declared type, falling back to text.
    #[must_use]
    pub fn from_sql(declared: &str) -> Self {
        match declared.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" => Self::Integer,
            "REAL" | "DOUBLE" | "FLOAT" => Self::Real,
            _ => Self::Text,
        }
    }
}

/// One attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub kind: ColumnType,
}

impl Column {
    /// Column of the given name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Text column.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value.
    #[default]
    Null,
    /// Integer value.
    Integer(i64),
    /// Float value.
    Real(f64),
    /// Text value.
    Text(String),
}

impl Value {
    /// Text content, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer content, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Float content; integers widen.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Whether the value is [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// A geometry and its attribute values, aligned with the layer columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Geometry in the layer's EPSG code.
    pub geometry: Geometry,
    /// One value per layer column.
    pub values: Vec<Value>,
}

/// An attributed geometry table.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// EPSG code of every geometry.
    pub epsg: i32,
    /// Attribute columns, excluding [`GEOMETRY_COLUMN`].
    pub columns: Vec<Column>,
    /// Rows.
    pub records: Vec<Record>,
}

impl Layer {
    /// An empty layer with the given columns.
    #[must_use]
    pub const fn new(epsg: i32, columns: Vec<Column>) -> Self {
        Self {
            epsg,
            columns,
            records: Vec::new(),
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the layer has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of a column by exact name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Value of a named column in one record.
    #[must_use]
    pub fn value<'a>(&self, record: &'a Record, name: &str) -> Option<&'a Value> {
        record.values.get(self.column_index(name)?)
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Append a row. Missing trailing values are null-filled and extra values
    /// dropped.
    pub fn push(&mut self, geometry: Geometry, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.records.push(Record { geometry, values });
    }

    /// Concatenate two layers over the union of their columns.
    ///
    /// Columns keep first-seen order; a column missing on one side is null
    /// in that side's rows.
    ///
    /// # Examples
    /// ```
    /// use geo::{Geometry, Point};
    /// use osmgis_core::store::{Column, Layer, Value};
    ///
    /// let mut ways = Layer::new(4326, vec![Column::text("id"), Column::text("name")]);
    /// ways.push(Geometry::Point(Point::new(0.0, 0.0)), vec!["w1".into(), "Main".into()]);
    /// let mut relations = Layer::new(4326, vec![Column::text("id"), Column::text("ref")]);
    /// relations.push(Geometry::Point(Point::new(1.0, 1.0)), vec!["r1".into(), "A1".into()]);
    ///
    /// let merged = ways.union(relations);
    /// assert_eq!(merged.column_names(), ["id", "name", "ref"]);
    /// assert_eq!(merged.records[0].values[2], Value::Null);
    /// assert_eq!(merged.records[1].values[1], Value::Null);
    /// ```
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let mut columns = self.columns.clone();
        for column in &other.columns {
            if !columns.iter().any(|existing| existing.name == column.name) {
                columns.push(column.clone());
            }
        }
        let mut merged = Self::new(self.epsg, columns);
        for side in [self, other] {
            let positions: Vec<Option<usize>> = merged
                .columns
                .iter()
                .map(|column| side.column_index(&column.name))
                .collect();
            for record in side.records {
                let values = positions
                    .iter()
                    .map(|position| {
                        position
                            .and_then(|index| record.values.get(index).cloned())
                            .unwrap_or_default()
                    })
                    .collect();
                merged.records.push(Record {
                    geometry: record.geometry,
                    values,
                });
            }
        }
        merged
    }
}
