//! Command-line interface for building GIS layers from OpenStreetMap.
#![forbid(unsafe_code)]

use std::{
    io::{self, Write},
    time::Duration,
};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use clap::{Parser, Subcommand};
use osmgis_core::{geometry::STORAGE_EPSG, store::TablePrefix};
use osmgis_data::{LayerKind, LayerOutcome, LayerPresets, LayerStatus, UnknownLayerError};
use serde::Serialize;

mod error;
mod extract;
mod load;

pub use error::CliError;

use extract::ExtractArgs;
use load::LoadArgs;

const ARG_PLACE: &str = "place";
const ARG_INPUT: &str = "input";
const ARG_DATABASE: &str = "database";
const ARG_PREFIX: &str = "prefix";
const ARG_EPSG: &str = "epsg";
const ARG_LAYERS: &str = "layers";
const ARG_PRESETS_DIR: &str = "presets-dir";
const ARG_NOMINATIM_URL: &str = "nominatim-url";
const ARG_OVERPASS_URL: &str = "overpass-url";
const ARG_TIMEOUT_SECS: &str = "timeout-secs";
const ENV_PLACE: &str = "OSMGIS_CMDS_EXTRACT_PLACE";
const ENV_INPUT: &str = "OSMGIS_CMDS_LOAD_INPUT";

const DEFAULT_DATABASE: &str = "osmgis.sqlite";
const DEFAULT_PREFIX: &str = "osm";

/// Run the `osmgis` CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let summary = match cli.command {
        Command::Extract(args) => {
            let report = extract::run_extract(args)?;
            Summary::new(Some(report.area.name.clone()), &report.layers)
        }
        Command::Load(args) => Summary::new(None, &load::run_load(args)?),
    };
    write_summary(io::stdout().lock(), &summary)
}

#[derive(Debug, Parser)]
#[command(
    name = "osmgis",
    about = "Build GIS layers (buildings, roads, rails, vegetation, water) from OpenStreetMap",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Geocode a place, download its OSM data and build layers.
    Extract(ExtractArgs),
    /// Build layers from a local Overpass JSON or PBF file.
    Load(LoadArgs),
}

/// Options shared by every subcommand once merged and defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) prefix: TablePrefix,
    pub(crate) epsg: i32,
    pub(crate) layers: Vec<LayerKind>,
    pub(crate) presets_dir: Option<Utf8PathBuf>,
}

impl OutputConfig {
    pub(crate) fn resolve(
        database: Option<Utf8PathBuf>,
        prefix: Option<String>,
        epsg: Option<i32>,
        layers: Option<&str>,
        presets_dir: Option<Utf8PathBuf>,
    ) -> Result<Self, CliError> {
        Ok(Self {
            database: database.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE)),
            prefix: TablePrefix::new(prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_owned()))?,
            epsg: epsg.unwrap_or(STORAGE_EPSG),
            layers: parse_layers(layers)?,
            presets_dir,
        })
    }

    pub(crate) fn presets(&self) -> Result<LayerPresets, CliError> {
        match &self.presets_dir {
            Some(dir) => Ok(LayerPresets::from_dir(dir)?),
            None => Ok(LayerPresets::builtin()?),
        }
    }
}

/// Parse a comma-separated layer list; `None` selects every layer.
pub(crate) fn parse_layers(raw: Option<&str>) -> Result<Vec<LayerKind>, UnknownLayerError> {
    let Some(raw) = raw else {
        return Ok(LayerKind::ALL.to_vec());
    };
    let mut layers = Vec::new();
    for name in raw.split(',').filter(|name| !name.trim().is_empty()) {
        let kind: LayerKind = name.parse()?;
        if !layers.contains(&kind) {
            layers.push(kind);
        }
    }
    Ok(layers)
}

pub(crate) fn timeout(secs: Option<u64>) -> Option<Duration> {
    secs.map(Duration::from_secs)
}

/// Require `path` to name an existing regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "path has no file name"))?;
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.metadata(name).map(|meta| meta.is_file())
}

/// Machine-readable outcome of a run, printed to stdout as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    place: Option<String>,
    layers: Vec<LayerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct LayerSummary {
    layer: LayerKind,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Summary {
    pub(crate) fn new(place: Option<String>, outcomes: &[LayerOutcome]) -> Self {
        let layers = outcomes
            .iter()
            .map(|outcome| {
                let (status, table, error) = match &outcome.status {
                    LayerStatus::Written(table) => ("written", Some(table.to_string()), None),
                    LayerStatus::Empty => ("empty", None, None),
                    LayerStatus::Failed(message) => ("failed", None, Some(message.clone())),
                };
                LayerSummary {
                    layer: outcome.kind,
                    status,
                    table,
                    error,
                }
            })
            .collect();
        Self { place, layers }
    }
}

pub(crate) fn write_summary<W: Write>(mut out: W, summary: &Summary) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut out, summary).map_err(CliError::SerializeSummary)?;
    writeln!(out).map_err(CliError::WriteSummary)
}

#[cfg(test)]
mod tests;
