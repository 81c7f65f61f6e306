//! Error types emitted by the `osmgis` CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmgis_core::{config::ConfigError, store::NamingError};
use osmgis_data::{
    DatabaseError, OsmLoadError, PipelineError, PresetError, UnknownLayerError,
    remote::ProviderBuildError,
};
use thiserror::Error;

/// Errors emitted by the `osmgis` CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The layer list names an unknown layer.
    #[error(transparent)]
    InvalidLayer(#[from] UnknownLayerError),
    /// The table prefix is not a plain identifier.
    #[error("invalid table prefix: {0}")]
    InvalidPrefix(#[from] NamingError),
    /// Loading presets from a directory failed.
    #[error(transparent)]
    Presets(#[from] PresetError),
    /// An embedded preset failed to parse.
    #[error(transparent)]
    BuiltinPresets(#[from] ConfigError),
    /// Opening the output database failed.
    #[error("failed to open database {path:?}: {source}")]
    OpenDatabase {
        path: Utf8PathBuf,
        #[source]
        source: DatabaseError,
    },
    /// Constructing an HTTP provider failed.
    #[error("failed to build provider for {base_url:?}: {source}")]
    BuildProvider {
        base_url: String,
        #[source]
        source: ProviderBuildError,
    },
    /// Reading the OSM input file failed.
    #[error(transparent)]
    Load(#[from] OsmLoadError),
    /// The pipeline aborted.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Serialising the run summary failed.
    #[error("failed to serialise summary: {0}")]
    SerializeSummary(#[source] serde_json::Error),
    /// Writing the run summary failed.
    #[error("failed to write summary: {0}")]
    WriteSummary(#[source] std::io::Error),
}
