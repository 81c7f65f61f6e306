//! Layer assembly: filtered, reconstructed and attributed output tables.
//!
//! Generic extractions ([`extract_nodes_as_points`] and friends) turn the
//! elements selected by a [`TagFilter`] into geometries with one text column
//! per pivoted tag key. Thematic builders ([`build_buildings`],
//! [`build_roads`], ...) run an extraction into a staging table, derive typed
//! attributes from it and write the final layer.
//!
//! Every operation writes exactly one fresh table and returns its name.
//! [`LayerError::NoMatchingData`] means the layer is empty; callers usually
//! log it and carry on with other layers.

use std::error::Error as StdError;

use log::warn;
use serde_json::Value as Json;
use thiserror::Error;

use crate::{
    TagFilter, TagFilterError,
    geometry::{ProjectionError, validate_epsg},
    store::{Layer, NamingError, OsmStore, TableName, TablePrefix},
};

mod buildings;
mod classified;
mod extract;
mod pivot;
mod roads;

pub use buildings::build_buildings;
pub use classified::{build_rails, build_vegetation, build_water};
pub use extract::{
    extract_nodes_as_points, extract_relations_as_lines, extract_relations_as_polygons,
    extract_ways_as_lines, extract_ways_as_polygons, to_lines, to_points, to_polygons,
};
pub use pivot::{ID_COLUMN, pivot_columns};
pub use roads::build_roads;

/// Errors raised while building a layer.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The table prefix is not a plain identifier.
    #[error("invalid table prefix: {source}")]
    InvalidPrefix {
        /// Naming failure.
        #[source]
        source: NamingError,
    },
    /// The EPSG code is not positive.
    #[error("invalid projection: EPSG code must be positive, got {epsg}")]
    InvalidProjection {
        /// Offending code.
        epsg: i32,
    },
    /// The EPSG code has no known definition.
    #[error("unsupported projection EPSG:{epsg}")]
    UnsupportedProjection {
        /// Offending code.
        epsg: i32,
    },
    /// The projection library rejected a definition.
    #[error(transparent)]
    Projection(ProjectionError),
    /// The tag specification is malformed.
    #[error(transparent)]
    InvalidSpecification(#[from] TagFilterError),
    /// The filter or the reconstruction produced nothing.
    #[error("no matching data for layer {layer}")]
    NoMatchingData {
        /// Layer being built.
        layer: String,
    },
    /// The backing store failed.
    #[error("store operation failed: {source}")]
    Store {
        /// Store failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl LayerError {
    /// Wrap a store error.
    pub fn store<E: StdError + Send + Sync + 'static>(source: E) -> Self {
        Self::Store {
            source: Box::new(source),
        }
    }

    /// Whether the error only signals an empty layer.
    #[must_use]
    pub const fn is_no_matching_data(&self) -> bool {
        matches!(self, Self::NoMatchingData { .. })
    }

    fn no_match(layer: &str) -> Self {
        Self::NoMatchingData {
            layer: layer.to_owned(),
        }
    }
}

impl From<ProjectionError> for LayerError {
    fn from(error: ProjectionError) -> Self {
        match error {
            ProjectionError::Invalid { epsg } => Self::InvalidProjection { epsg },
            ProjectionError::Unsupported { epsg } => Self::UnsupportedProjection { epsg },
            other => Self::Projection(other),
        }
    }
}

impl From<NamingError> for LayerError {
    fn from(source: NamingError) -> Self {
        Self::InvalidPrefix { source }
    }
}

/// Parameters shared by every layer operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRequest {
    /// Prefix of the raw tables to read and of the table to write.
    pub prefix: TablePrefix,
    /// Target EPSG code.
    pub epsg: i32,
    /// Element selection.
    pub tags: TagFilter,
    /// Tag keys to keep as columns in addition to the filter keys.
    pub columns: Vec<String>,
}

impl LayerRequest {
    /// Request every tagged element under `prefix`, reprojected to `epsg`.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidPrefix`], [`LayerError::InvalidProjection`]
    /// or [`LayerError::UnsupportedProjection`] for unusable input.
    ///
    /// # Examples
    /// ```
    /// use osmgis_core::layer::{LayerError, LayerRequest};
    ///
    /// let request = LayerRequest::new("osm", 2154)?
    ///     .with_tag_spec(&serde_json::json!({"building": []}))?
    ///     .with_columns(["height"]);
    /// assert_eq!(request.columns, ["height"]);
    /// assert!(matches!(
    ///     LayerRequest::new("osm", -1),
    ///     Err(LayerError::InvalidProjection { epsg: -1 })
    /// ));
    /// # Ok::<(), LayerError>(())
    /// ```
    pub fn new(prefix: &str, epsg: i32) -> Result<Self, LayerError> {
        let prefix = TablePrefix::new(prefix)?;
        validate_epsg(epsg)?;
        Ok(Self {
            prefix,
            epsg,
            tags: TagFilter::Any,
            columns: Vec::new(),
        })
    }

    /// Restrict the selection.
    #[must_use]
    pub fn with_tags(mut self, tags: TagFilter) -> Self {
        self.tags = tags;
        self
    }

    /// Restrict the selection with a JSON tag specification.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidSpecification`] for malformed input.
    pub fn with_tag_spec(self, spec: &Json) -> Result<Self, LayerError> {
        Ok(self.with_tags(TagFilter::from_json(spec)?))
    }

    /// Keep these tag keys as columns.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Tables created while building a layer, dropped once it is done.
#[derive(Debug, Default)]
pub struct Staging {
    tables: Vec<TableName>,
}

impl Staging {
    /// Register a table for removal.
    pub fn register(&mut self, name: TableName) -> TableName {
        self.tables.push(name.clone());
        name
    }

    /// Registered tables.
    #[must_use]
    pub fn tables(&self) -> &[TableName] {
        &self.tables
    }
}

/// Run `body`, then drop every table it registered, whatever its outcome.
///
/// Failures to drop a staging table are logged and do not replace the
/// body's result.
///
/// # Errors
/// Returns whatever `body` returns.
pub fn run_staged<S, T, F>(store: &mut S, body: F) -> Result<T, LayerError>
where
    S: OsmStore,
    F: FnOnce(&mut S, &mut Staging) -> Result<T, LayerError>,
{
    let mut staging = Staging::default();
    let outcome = body(store, &mut staging);
    for table in staging.tables {
        if let Err(err) = store.drop_table(&table) {
            warn!("failed to drop staging table {table}: {err}");
        }
    }
    outcome
}

/// Request for a thematic builder: the preset's filter, its kept columns and
/// every extra key the builder reads.
fn preset_request<I>(
    prefix: &TablePrefix,
    epsg: i32,
    tags: &TagFilter,
    columns: I,
) -> Result<LayerRequest, LayerError>
where
    I: IntoIterator<Item = String>,
{
    validate_epsg(epsg)?;
    let mut columns: Vec<String> = columns.into_iter().collect();
    columns.sort();
    columns.dedup();
    Ok(LayerRequest {
        prefix: prefix.clone(),
        epsg,
        tags: tags.clone(),
        columns,
    })
}

type Extraction<S> = fn(&mut S, &LayerRequest) -> Result<TableName, LayerError>;

/// Run `extraction` into a staging table and read it back.
fn read_staged<S: OsmStore>(
    store: &mut S,
    staging: &mut Staging,
    extraction: Extraction<S>,
    request: &LayerRequest,
) -> Result<Layer, LayerError> {
    let table = staging.register(extraction(store, request)?);
    store.read_layer(&table).map_err(LayerError::store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RawSnapshot;
    use crate::test_support::MemoryOsmStore;
    use rstest::rstest;

    #[rstest]
    #[case(0, true)]
    #[case(9999, false)]
    fn request_validates_projection(#[case] epsg: i32, #[case] invalid: bool) {
        let err = LayerRequest::new("osm", epsg).expect_err("rejected");
        if invalid {
            assert!(matches!(err, LayerError::InvalidProjection { .. }));
        } else {
            assert!(matches!(err, LayerError::UnsupportedProjection { epsg: 9999 }));
        }
    }

    #[rstest]
    fn request_validates_prefix() {
        assert!(matches!(
            LayerRequest::new("bad prefix", 4326),
            Err(LayerError::InvalidPrefix { .. })
        ));
    }

    #[rstest]
    fn request_rejects_scalar_specifications() {
        let request = LayerRequest::new("osm", 4326).expect("valid request");
        assert!(matches!(
            request.with_tag_spec(&serde_json::json!(42)),
            Err(LayerError::InvalidSpecification(_))
        ));
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn staging_tables_are_dropped(#[case] succeed: bool) {
        let mut store = MemoryOsmStore::default();
        let prefix = TablePrefix::new("osm").expect("prefix");
        store
            .load_raw(&prefix, &RawSnapshot::default())
            .expect("load");
        let mut created = Vec::new();
        let outcome = run_staged(&mut store, |store, staging| {
            let name = staging.register(TableName::fresh(&prefix, "stage")?);
            store
                .create_layer(&name, &Layer::new(4326, Vec::new()))
                .map_err(LayerError::store)?;
            created.push(name);
            if succeed {
                Ok(())
            } else {
                Err(LayerError::no_match("stage"))
            }
        });
        assert_eq!(outcome.is_ok(), succeed);
        for name in created {
            assert!(!store.table_exists(&name).expect("query"), "{name} left behind");
        }
    }
}
