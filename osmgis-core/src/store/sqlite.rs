//! SQLite-backed [`OsmStore`] with geometries stored as GeoJSON text.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
};

use geo::{Coord, Geometry};
use rusqlite::{
    Connection, OptionalExtension, Transaction, params, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};
use thiserror::Error;

use crate::{ElementKind, RelationMember, TagFilter, Tags};

use super::{
    Column, ColumnType, GEOMETRY_COLUMN, KeySelection, Layer, OsmStore, RawSnapshot, RawTable,
    Record, TableName, TablePrefix, Value, id_column,
};

/// SQLite limits bound parameters per statement to 999 by default. The store
/// chunks `IN` queries to remain below that ceiling.
const SQLITE_MAX_VARIABLE_NUMBER: usize = 999;

const METADATA_TABLE: &str = "geometry_columns";

/// Error raised by [`SqliteOsmStore`].
#[derive(Debug, Error)]
pub enum SqliteOsmStoreError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}: {source}")]
    OpenDatabase {
        /// Location of the SQLite database on disk.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A stored geometry was not valid GeoJSON.
    #[error("invalid geometry in table {table}: {message}")]
    InvalidGeometry {
        /// Table holding the geometry.
        table: String,
        /// Decoding failure.
        message: String,
    },
    /// A geometry could not be encoded as GeoJSON.
    #[error("failed to encode geometry: {0}")]
    EncodeGeometry(#[source] serde_json::Error),
    /// The requested layer table does not exist.
    #[error("table {name} does not exist")]
    MissingTable {
        /// Requested table.
        name: String,
    },
    /// A layer row did not have one value per column.
    #[error("row of table {name} has {found} values for {expected} columns")]
    RowWidth {
        /// Target table.
        name: String,
        /// Column count.
        expected: usize,
        /// Value count.
        found: usize,
    },
    /// Generic SQLite error.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// [`OsmStore`] over one SQLite connection.
pub struct SqliteOsmStore {
    connection: Connection,
}

impl fmt::Debug for SqliteOsmStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteOsmStore")
            .field("path", &self.connection.path())
            .finish_non_exhaustive()
    }
}

impl SqliteOsmStore {
    /// Open or create a database file.
    ///
    /// # Errors
    /// Returns [`SqliteOsmStoreError::OpenDatabase`] when SQLite cannot open
    /// the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SqliteOsmStoreError> {
        let path = path.as_ref();
        let connection =
            Connection::open(path).map_err(|source| SqliteOsmStoreError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_connection(connection)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns [`SqliteOsmStoreError::Database`] when SQLite fails.
    pub fn open_in_memory() -> Result<Self, SqliteOsmStoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, creating the layer metadata table.
    ///
    /// # Errors
    /// Returns [`SqliteOsmStoreError::Database`] when SQLite fails.
    pub fn from_connection(connection: Connection) -> Result<Self, SqliteOsmStoreError> {
        connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (
                f_table_name TEXT PRIMARY KEY,
                f_geometry_column TEXT NOT NULL,
                srid INTEGER NOT NULL
            );"
        ))?;
        Ok(Self { connection })
    }

    /// Underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    fn ids_in_chunks<T, F>(
        &self,
        ids: &BTreeSet<i64>,
        query: impl Fn(&str) -> String,
        mut read: F,
    ) -> Result<Vec<T>, SqliteOsmStoreError>
    where
        F: FnMut(&rusqlite::Row<'_>) -> Result<T, SqliteOsmStoreError>,
    {
        let ids: Vec<i64> = ids.iter().copied().collect();
        let mut out = Vec::new();
        for chunk in ids.chunks(SQLITE_MAX_VARIABLE_NUMBER) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut statement = self.connection.prepare(&query(&placeholders))?;
            let mut rows = statement.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                out.push(read(row)?);
            }
        }
        Ok(out)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn encode_geometry(geometry: &Geometry) -> Result<String, SqliteOsmStoreError> {
    let value = geojson::Value::from(geometry);
    serde_json::to_string(&geojson::Geometry::new(value)).map_err(SqliteOsmStoreError::EncodeGeometry)
}

fn decode_geometry(table: &str, text: &str) -> Result<Geometry, SqliteOsmStoreError> {
    let invalid = |message: String| SqliteOsmStoreError::InvalidGeometry {
        table: table.to_owned(),
        message,
    };
    let parsed: geojson::Geometry =
        serde_json::from_str(text).map_err(|err| invalid(err.to_string()))?;
    Geometry::try_from(parsed).map_err(|err| invalid(err.to_string()))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
    }
}

fn create_raw_tables(tx: &Transaction<'_>, prefix: &TablePrefix) -> rusqlite::Result<()> {
    let name = |table| prefix.raw(table);
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {node} (id_node INTEGER PRIMARY KEY, the_geom TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS {way} (id_way INTEGER PRIMARY KEY);
         CREATE TABLE IF NOT EXISTS {way_node} (
             id_way INTEGER NOT NULL, id_node INTEGER NOT NULL, node_order INTEGER NOT NULL);
         CREATE INDEX IF NOT EXISTS {way_node}_id_way ON {way_node} (id_way);
         CREATE TABLE IF NOT EXISTS {relation} (id_relation INTEGER PRIMARY KEY);
         CREATE TABLE IF NOT EXISTS {way_member} (
             id_relation INTEGER NOT NULL, id_way INTEGER NOT NULL, role TEXT);
         CREATE INDEX IF NOT EXISTS {way_member}_id_relation ON {way_member} (id_relation);
         CREATE TABLE IF NOT EXISTS {node_tag} (
             id_node INTEGER NOT NULL, tag_key TEXT NOT NULL, tag_value TEXT);
         CREATE INDEX IF NOT EXISTS {node_tag}_key ON {node_tag} (tag_key);
         CREATE TABLE IF NOT EXISTS {way_tag} (
             id_way INTEGER NOT NULL, tag_key TEXT NOT NULL, tag_value TEXT);
         CREATE INDEX IF NOT EXISTS {way_tag}_key ON {way_tag} (tag_key);
         CREATE INDEX IF NOT EXISTS {way_tag}_id ON {way_tag} (id_way);
         CREATE TABLE IF NOT EXISTS {relation_tag} (
             id_relation INTEGER NOT NULL, tag_key TEXT NOT NULL, tag_value TEXT);
         CREATE INDEX IF NOT EXISTS {relation_tag}_key ON {relation_tag} (tag_key);",
        node = name(RawTable::Node),
        way = name(RawTable::Way),
        way_node = name(RawTable::WayNode),
        relation = name(RawTable::Relation),
        way_member = name(RawTable::WayMember),
        node_tag = name(RawTable::NodeTag),
        way_tag = name(RawTable::WayTag),
        relation_tag = name(RawTable::RelationTag),
    ))
}

fn insert_tags<'a>(
    tx: &Transaction<'_>,
    prefix: &TablePrefix,
    kind: ElementKind,
    elements: impl Iterator<Item = (i64, &'a Tags)>,
) -> rusqlite::Result<()> {
    let mut insert = tx.prepare(&format!(
        "INSERT INTO {} ({}, tag_key, tag_value) VALUES (?1, ?2, ?3)",
        prefix.raw(RawTable::tags_of(kind)),
        id_column(kind)
    ))?;
    for (id, tags) in elements {
        for (key, value) in tags {
            insert.execute(params![id, key, value])?;
        }
    }
    Ok(())
}

fn insert_snapshot(
    tx: &Transaction<'_>,
    prefix: &TablePrefix,
    snapshot: &RawSnapshot,
) -> Result<(), SqliteOsmStoreError> {
    {
        let mut insert = tx.prepare(&format!(
            "INSERT OR REPLACE INTO {} (id_node, the_geom) VALUES (?1, ?2)",
            prefix.raw(RawTable::Node)
        ))?;
        for node in &snapshot.nodes {
            let point = Geometry::Point(node.coord.into());
            insert.execute(params![node.id, encode_geometry(&point)?])?;
        }
    }
    {
        let mut insert_way = tx.prepare(&format!(
            "INSERT OR REPLACE INTO {} (id_way) VALUES (?1)",
            prefix.raw(RawTable::Way)
        ))?;
        let mut insert_ref = tx.prepare(&format!(
            "INSERT INTO {} (id_way, id_node, node_order) VALUES (?1, ?2, ?3)",
            prefix.raw(RawTable::WayNode)
        ))?;
        for way in &snapshot.ways {
            insert_way.execute(params![way.id])?;
            for (order, node) in (1_i64..).zip(&way.nodes) {
                insert_ref.execute(params![way.id, node, order])?;
            }
        }
    }
    {
        let mut insert_relation = tx.prepare(&format!(
            "INSERT OR REPLACE INTO {} (id_relation) VALUES (?1)",
            prefix.raw(RawTable::Relation)
        ))?;
        let mut insert_member = tx.prepare(&format!(
            "INSERT INTO {} (id_relation, id_way, role) VALUES (?1, ?2, ?3)",
            prefix.raw(RawTable::WayMember)
        ))?;
        for relation in &snapshot.relations {
            insert_relation.execute(params![relation.id])?;
            for member in &relation.members {
                insert_member.execute(params![relation.id, member.way, member.role.as_str()])?;
            }
        }
    }
    for kind in [ElementKind::Node, ElementKind::Way, ElementKind::Relation] {
        insert_tags(tx, prefix, kind, snapshot.tagged(kind))?;
    }
    Ok(())
}

impl OsmStore for SqliteOsmStore {
    type Error = SqliteOsmStoreError;

    fn load_raw(
        &mut self,
        prefix: &TablePrefix,
        snapshot: &RawSnapshot,
    ) -> Result<(), Self::Error> {
        let tx = self.connection.transaction()?;
        create_raw_tables(&tx, prefix)?;
        insert_snapshot(&tx, prefix, snapshot)?;
        tx.commit()?;
        Ok(())
    }

    fn drop_raw(&mut self, prefix: &TablePrefix) -> Result<(), Self::Error> {
        let statements: Vec<String> = RawTable::ALL
            .iter()
            .map(|table| format!("DROP TABLE IF EXISTS {};", prefix.raw(*table)))
            .collect();
        self.connection.execute_batch(&statements.join("\n"))?;
        Ok(())
    }

    fn matching_ids(
        &self,
        prefix: &TablePrefix,
        kind: ElementKind,
        filter: &TagFilter,
    ) -> Result<BTreeSet<i64>, Self::Error> {
        let predicate = filter.to_sql("tag_key", "tag_value");
        let query = format!(
            "SELECT DISTINCT {id} FROM {table} WHERE {clause}",
            id = id_column(kind),
            table = prefix.raw(RawTable::tags_of(kind)),
            clause = predicate.clause,
        );
        let mut statement = self.connection.prepare(&query)?;
        let ids = statement
            .query_map(params_from_iter(predicate.params.iter()), |row| row.get(0))?
            .collect::<Result<BTreeSet<i64>, _>>()?;
        Ok(ids)
    }

    fn element_tags(
        &self,
        prefix: &TablePrefix,
        kind: ElementKind,
        ids: &BTreeSet<i64>,
        keys: &KeySelection,
    ) -> Result<BTreeMap<i64, Tags>, Self::Error> {
        let table = prefix.raw(RawTable::tags_of(kind));
        let id = id_column(kind);
        let rows = self.ids_in_chunks(
            ids,
            |placeholders| {
                format!(
                    "SELECT {id}, tag_key, tag_value FROM {table} \
                     WHERE {id} IN ({placeholders}) ORDER BY rowid"
                )
            },
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )?;
        let mut tags: BTreeMap<i64, Tags> = BTreeMap::new();
        for (element, key, value) in rows {
            if keys.includes(&key) {
                tags.entry(element)
                    .or_default()
                    .insert(key, value.unwrap_or_default());
            }
        }
        Ok(tags)
    }

    fn node_coords(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Coord>, Self::Error> {
        let table = prefix.raw(RawTable::Node);
        let rows = self.ids_in_chunks(
            ids,
            |placeholders| {
                format!("SELECT id_node, the_geom FROM {table} WHERE id_node IN ({placeholders})")
            },
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?;
        let mut coords = BTreeMap::new();
        for (id, text) in rows {
            match decode_geometry(table.as_str(), &text)? {
                Geometry::Point(point) => {
                    coords.insert(id, point.0);
                }
                _ => {
                    return Err(SqliteOsmStoreError::InvalidGeometry {
                        table: table.to_string(),
                        message: format!("node {id} is not a point"),
                    });
                }
            }
        }
        Ok(coords)
    }

    fn way_nodes(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Vec<i64>>, Self::Error> {
        let table = prefix.raw(RawTable::WayNode);
        let rows = self.ids_in_chunks(
            ids,
            |placeholders| {
                format!(
                    "SELECT id_way, id_node FROM {table} \
                     WHERE id_way IN ({placeholders}) ORDER BY id_way, node_order"
                )
            },
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        let mut ways: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for (way, node) in rows {
            ways.entry(way).or_default().push(node);
        }
        Ok(ways)
    }

    fn relation_members(
        &self,
        prefix: &TablePrefix,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeMap<i64, Vec<RelationMember>>, Self::Error> {
        let table = prefix.raw(RawTable::WayMember);
        let rows = self.ids_in_chunks(
            ids,
            |placeholders| {
                format!(
                    "SELECT id_relation, id_way, role FROM {table} \
                     WHERE id_relation IN ({placeholders}) ORDER BY rowid"
                )
            },
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )?;
        let mut relations: BTreeMap<i64, Vec<RelationMember>> = BTreeMap::new();
        for (relation, way, role) in rows {
            relations
                .entry(relation)
                .or_default()
                .push(RelationMember::new(way, role.as_deref().unwrap_or_default()));
        }
        Ok(relations)
    }

    fn create_layer(&mut self, name: &TableName, layer: &Layer) -> Result<(), Self::Error> {
        let tx = self.connection.transaction()?;
        let definitions: Vec<String> = std::iter::once(format!("{GEOMETRY_COLUMN} TEXT NOT NULL"))
            .chain(
                layer
                    .columns
                    .iter()
                    .map(|column| format!("{} {}", quote(&column.name), column.kind.sql())),
            )
            .collect();
        tx.execute_batch(&format!("CREATE TABLE {name} ({});", definitions.join(", ")))?;
        {
            let placeholders = vec!["?"; layer.columns.len() + 1].join(", ");
            let mut insert = tx.prepare(&format!("INSERT INTO {name} VALUES ({placeholders})"))?;
            for record in &layer.records {
                if record.values.len() != layer.columns.len() {
                    return Err(SqliteOsmStoreError::RowWidth {
                        name: name.to_string(),
                        expected: layer.columns.len(),
                        found: record.values.len(),
                    });
                }
                let row: Vec<SqlValue> =
                    std::iter::once(SqlValue::Text(encode_geometry(&record.geometry)?))
                        .chain(record.values.iter().map(to_sql))
                        .collect();
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {METADATA_TABLE} (f_table_name, f_geometry_column, srid) \
                 VALUES (?1, ?2, ?3)"
            ),
            params![name.as_str(), GEOMETRY_COLUMN, layer.epsg],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn read_layer(&self, name: &TableName) -> Result<Layer, Self::Error> {
        let columns = self.table_columns(name)?;
        let epsg: i32 = self
            .connection
            .query_row(
                &format!("SELECT srid FROM {METADATA_TABLE} WHERE f_table_name = ?1"),
                params![name.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(crate::geometry::STORAGE_EPSG);
        let selected: Vec<String> = std::iter::once(GEOMETRY_COLUMN.to_owned())
            .chain(columns.iter().map(|column| quote(&column.name)))
            .collect();
        let mut statement = self.connection.prepare(&format!(
            "SELECT {} FROM {name} ORDER BY rowid",
            selected.join(", ")
        ))?;
        let mut rows = statement.query([])?;
        let mut layer = Layer::new(epsg, columns);
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            let geometry = decode_geometry(name.as_str(), &text)?;
            let values = (1..=layer.columns.len())
                .map(|index| row.get_ref(index).map(from_sql))
                .collect::<Result<Vec<_>, _>>()?;
            layer.records.push(Record { geometry, values });
        }
        Ok(layer)
    }

    fn drop_table(&mut self, name: &TableName) -> Result<(), Self::Error> {
        self.connection
            .execute_batch(&format!("DROP TABLE IF EXISTS {name};"))?;
        self.connection.execute(
            &format!("DELETE FROM {METADATA_TABLE} WHERE f_table_name = ?1"),
            params![name.as_str()],
        )?;
        Ok(())
    }

    fn table_exists(&self, name: &TableName) -> Result<bool, Self::Error> {
        let found = self
            .connection
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn table_columns(&self, name: &TableName) -> Result<Vec<Column>, Self::Error> {
        if !self.table_exists(name)? {
            return Err(SqliteOsmStoreError::MissingTable {
                name: name.to_string(),
            });
        }
        let mut statement = self
            .connection
            .prepare(&format!("PRAGMA table_info({name})"))?;
        let columns = statement
            .query_map([], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(column, _)| column != GEOMETRY_COLUMN)
            .map(|(column, declared)| Column::new(column, ColumnType::from_sql(&declared)))
            .collect();
        Ok(columns)
    }
}
