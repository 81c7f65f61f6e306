//! End-to-end pipeline: place → bbox → download → load → layers → cleanup.
//!
//! Layer failures are reported per layer and never abort the run; an empty
//! layer is reported as [`LayerStatus::Empty`]. The raw tables loaded for the
//! run are dropped before [`run_pipeline`] or [`run_snapshot`] returns.

use std::{error::Error as StdError, fmt, io, str::FromStr};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use log::{info, warn};
use osmgis_core::{
    Geocoder, LayerError, OsmDownloader, PlaceArea, ProviderError,
    config::{
        BuildingConfig, ConfigError, LayerPreset, RailConfig, RoadConfig, VegetationConfig,
        WaterConfig,
    },
    geometry::{ProjectionError, validate_epsg},
    layer::{build_buildings, build_rails, build_roads, build_vegetation, build_water},
    provider::bbox_query,
    store::{OsmStore, RawSnapshot, TableName, TablePrefix},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::{OsmLoadError, load_overpass_json};

/// Thematic layers the pipeline can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Building footprints with heights and levels.
    Buildings,
    /// Road network with type, surface, speed and direction.
    Roads,
    /// Railway lines.
    Rails,
    /// Vegetation areas.
    Vegetation,
    /// Water areas.
    Water,
}

impl LayerKind {
    /// Every layer, in build order.
    pub const ALL: [Self; 5] = [
        Self::Buildings,
        Self::Roads,
        Self::Rails,
        Self::Vegetation,
        Self::Water,
    ];

    /// Lowercase layer name, also used for output tables.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Buildings => "buildings",
            Self::Roads => "roads",
            Self::Rails => "rails",
            Self::Vegetation => "vegetation",
            Self::Water => "water",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a layer name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown layer {name:?}; expected one of buildings, roads, rails, vegetation, water")]
pub struct UnknownLayerError {
    /// Rejected name.
    pub name: String,
}

impl FromStr for LayerKind {
    type Err = UnknownLayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownLayerError { name: s.to_owned() })
    }
}

/// Errors raised while loading presets from a directory.
#[derive(Debug, Error)]
pub enum PresetError {
    /// The preset directory could not be opened.
    #[error("failed to open preset directory {path:?}: {source}")]
    OpenDirectory {
        /// Requested directory.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A preset file exists but could not be opened.
    #[error("failed to read preset {path:?}: {source}")]
    Read {
        /// Offending file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A preset document is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Presets for every layer kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPresets {
    /// Building preset.
    pub buildings: BuildingConfig,
    /// Road preset.
    pub roads: RoadConfig,
    /// Rail preset.
    pub rails: RailConfig,
    /// Vegetation preset.
    pub vegetation: VegetationConfig,
    /// Water preset.
    pub water: WaterConfig,
}

impl LayerPresets {
    /// Presets shipped with `osmgis-core`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if an embedded document is invalid.
    pub fn builtin() -> Result<Self, ConfigError> {
        Ok(Self {
            buildings: BuildingConfig::builtin()?,
            roads: RoadConfig::builtin()?,
            rails: RailConfig::builtin()?,
            vegetation: VegetationConfig::builtin()?,
            water: WaterConfig::builtin()?,
        })
    }

    /// Load `<layer>.json` files from `dir`, falling back to the built-in
    /// preset for each missing file.
    ///
    /// # Errors
    /// Returns [`PresetError`] when the directory cannot be opened, a file
    /// cannot be read or a document is invalid.
    pub fn from_dir(dir: &Utf8Path) -> Result<Self, PresetError> {
        let handle = fs_utf8::Dir::open_ambient_dir(dir, ambient_authority()).map_err(|source| {
            PresetError::OpenDirectory {
                path: dir.to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            buildings: load_preset(&handle, dir)?,
            roads: load_preset(&handle, dir)?,
            rails: load_preset(&handle, dir)?,
            vegetation: load_preset(&handle, dir)?,
            water: load_preset(&handle, dir)?,
        })
    }

    /// Build one layer with its preset.
    ///
    /// # Errors
    /// Returns the builder's [`LayerError`].
    pub fn build<S: OsmStore>(
        &self,
        kind: LayerKind,
        store: &mut S,
        prefix: &TablePrefix,
        epsg: i32,
    ) -> Result<TableName, LayerError> {
        match kind {
            LayerKind::Buildings => build_buildings(store, prefix, epsg, &self.buildings),
            LayerKind::Roads => build_roads(store, prefix, epsg, &self.roads),
            LayerKind::Rails => build_rails(store, prefix, epsg, &self.rails),
            LayerKind::Vegetation => build_vegetation(store, prefix, epsg, &self.vegetation),
            LayerKind::Water => build_water(store, prefix, epsg, &self.water),
        }
    }
}

fn load_preset<P: LayerPreset>(dir: &fs_utf8::Dir, root: &Utf8Path) -> Result<P, PresetError> {
    let file_name = format!("{}.json", P::NAME);
    match dir.open(&file_name) {
        Ok(file) => {
            info!("using {} preset from {}", P::NAME, root.join(&file_name));
            Ok(P::from_reader(io::BufReader::new(file))?)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(P::builtin()?),
        Err(source) => Err(PresetError::Read {
            path: root.join(file_name),
            source,
        }),
    }
}

/// Outcome of one layer build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    /// The layer was written to this table.
    Written(TableName),
    /// Nothing matched the layer's preset.
    Empty,
    /// The build failed; the message describes why.
    Failed(String),
}

/// A layer and how its build went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOutcome {
    /// Layer built.
    pub kind: LayerKind,
    /// Result of the build.
    pub status: LayerStatus,
}

/// Inputs of [`run_pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    /// Place name passed to the geocoder.
    pub place: String,
    /// Prefix of the raw and output tables.
    pub prefix: TablePrefix,
    /// Target EPSG code of the output layers.
    pub epsg: i32,
    /// Layers to build, in order.
    pub layers: Vec<LayerKind>,
}

impl PipelineRequest {
    /// Request building every layer of `place`.
    #[must_use]
    pub fn new(place: impl Into<String>, prefix: TablePrefix, epsg: i32) -> Self {
        Self {
            place: place.into(),
            prefix,
            epsg,
            layers: LayerKind::ALL.to_vec(),
        }
    }

    /// Restrict the run to `layers`.
    #[must_use]
    pub fn with_layers(mut self, layers: impl IntoIterator<Item = LayerKind>) -> Self {
        self.layers = layers.into_iter().collect();
        self
    }
}

/// Result of [`run_pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Area resolved by the geocoder.
    pub area: PlaceArea,
    /// One outcome per requested layer, in request order.
    pub layers: Vec<LayerOutcome>,
}

impl PipelineReport {
    /// Tables written by the run.
    pub fn written(&self) -> impl Iterator<Item = (LayerKind, &TableName)> {
        self.layers.iter().filter_map(|outcome| match &outcome.status {
            LayerStatus::Written(table) => Some((outcome.kind, table)),
            _ => None,
        })
    }
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The target projection is not usable.
    #[error("invalid target projection: {0}")]
    Projection(#[source] ProjectionError),
    /// The place could not be geocoded.
    #[error("failed to geocode {place:?}: {source}")]
    Geocode {
        /// Requested place.
        place: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// The OSM extract could not be downloaded.
    #[error("failed to download OSM data: {0}")]
    Download(#[source] ProviderError),
    /// The downloaded extract could not be decoded.
    #[error(transparent)]
    Load(#[from] OsmLoadError),
    /// Loading or dropping the raw tables failed.
    #[error("raw table operation for prefix {prefix} failed: {source}")]
    Store {
        /// Prefix of the raw tables.
        prefix: String,
        /// Store failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl PipelineError {
    fn store<E: StdError + Send + Sync + 'static>(prefix: &TablePrefix, source: E) -> Self {
        Self::Store {
            prefix: prefix.to_string(),
            source: Box::new(source),
        }
    }
}

/// Build `layers` in order from the raw tables of `prefix`.
///
/// Empty layers are logged at `info` and failed layers at `warn`; neither
/// stops the remaining builds.
pub fn run_layers<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    epsg: i32,
    layers: &[LayerKind],
    presets: &LayerPresets,
) -> Vec<LayerOutcome> {
    layers
        .iter()
        .map(|&kind| {
            let status = match presets.build(kind, store, prefix, epsg) {
                Ok(table) => {
                    info!("{kind} layer written to {table}");
                    LayerStatus::Written(table)
                }
                Err(err) if err.is_no_matching_data() => {
                    info!("{kind} layer is empty");
                    LayerStatus::Empty
                }
                Err(err) => {
                    warn!("{kind} layer failed: {err}");
                    LayerStatus::Failed(err.to_string())
                }
            };
            LayerOutcome { kind, status }
        })
        .collect()
}

/// Load `snapshot` under `prefix`, build `layers`, then drop the raw tables.
///
/// The raw tables are dropped even when loading fails part-way.
///
/// # Errors
/// Returns [`PipelineError::Projection`] for an unusable EPSG code and
/// [`PipelineError::Store`] when the raw tables cannot be written or dropped.
pub fn run_snapshot<S: OsmStore>(
    store: &mut S,
    snapshot: &RawSnapshot,
    prefix: &TablePrefix,
    epsg: i32,
    layers: &[LayerKind],
    presets: &LayerPresets,
) -> Result<Vec<LayerOutcome>, PipelineError> {
    validate_epsg(epsg).map_err(PipelineError::Projection)?;
    info!(
        "loading {} nodes, {} ways and {} relations under prefix {prefix}",
        snapshot.nodes.len(),
        snapshot.ways.len(),
        snapshot.relations.len()
    );
    let outcomes = store
        .load_raw(prefix, snapshot)
        .map_err(|err| PipelineError::store(prefix, err))
        .map(|()| run_layers(store, prefix, epsg, layers, presets));
    let dropped = store
        .drop_raw(prefix)
        .map_err(|err| PipelineError::store(prefix, err));
    let outcomes = outcomes?;
    dropped?;
    Ok(outcomes)
}

/// Geocode the requested place, download its extract and build its layers.
///
/// # Examples
/// ```
/// use osmgis_core::{store::TablePrefix, test_support::MemoryOsmStore};
/// use osmgis_data::{
///     LayerKind, LayerPresets, PipelineRequest, run_pipeline,
///     remote::test_support::{StubDownloader, StubGeocoder},
/// };
///
/// let geocoder = StubGeocoder::with_bbox("Nowhere", 0.0, 0.0, 1.0, 1.0);
/// let downloader = StubDownloader::with_body(br#"{"elements": []}"#.to_vec());
/// let mut store = MemoryOsmStore::default();
/// let request = PipelineRequest::new("Nowhere", TablePrefix::new("demo")?, 4326)
///     .with_layers([LayerKind::Water]);
///
/// let report = run_pipeline(&geocoder, &downloader, &mut store, &request, &LayerPresets::builtin()?)?;
/// assert_eq!(report.written().count(), 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Errors
/// Returns [`PipelineError`] when the request is invalid, a provider fails,
/// the response cannot be decoded or the raw tables cannot be managed.
pub fn run_pipeline<G, D, S>(
    geocoder: &G,
    downloader: &D,
    store: &mut S,
    request: &PipelineRequest,
    presets: &LayerPresets,
) -> Result<PipelineReport, PipelineError>
where
    G: Geocoder + ?Sized,
    D: OsmDownloader + ?Sized,
    S: OsmStore,
{
    validate_epsg(request.epsg).map_err(PipelineError::Projection)?;
    let area = geocoder
        .geocode(&request.place)
        .map_err(|source| PipelineError::Geocode {
            place: request.place.clone(),
            source,
        })?;
    info!("resolved {:?} to {}", request.place, area.name);
    let body = downloader
        .download(&bbox_query(&area.bbox))
        .map_err(PipelineError::Download)?;
    let snapshot = load_overpass_json(&body)?;
    let layers = run_snapshot(
        store,
        &snapshot,
        &request.prefix,
        request.epsg,
        &request.layers,
        presets,
    )?;
    Ok(PipelineReport { area, layers })
}
