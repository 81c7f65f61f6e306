//! `load` command: local OSM file to layers.

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmgis_data::{LayerOutcome, LayerStatus, load_osm_file, open_database, run_snapshot};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_EPSG, ARG_INPUT, ARG_LAYERS, ARG_PREFIX, ARG_PRESETS_DIR, CliError,
    ENV_INPUT, OutputConfig, require_existing,
};

/// CLI arguments for the `load` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Read an Overpass JSON (.json) or OSM PBF (.pbf) file and \
                 build the requested layers into a SQLite database. Options \
                 can come from CLI flags, configuration files, or OSMGIS_* \
                 environment variables.",
    about = "Build layers from a local OSM file"
)]
#[ortho_config(prefix = "OSMGIS")]
pub(crate) struct LoadArgs {
    /// Overpass JSON or PBF file to read.
    #[arg(value_name = ARG_INPUT)]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// SQLite database receiving the layers.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Prefix of the raw and output tables.
    #[arg(long = ARG_PREFIX, value_name = "name")]
    #[serde(default)]
    pub(crate) prefix: Option<String>,
    /// Target EPSG code of the output layers.
    #[arg(long = ARG_EPSG, value_name = "code")]
    #[serde(default)]
    pub(crate) epsg: Option<i32>,
    /// Comma-separated layers to build (default: all).
    #[arg(long = ARG_LAYERS, value_name = "list")]
    #[serde(default)]
    pub(crate) layers: Option<String>,
    /// Directory holding `<layer>.json` preset overrides.
    #[arg(long = ARG_PRESETS_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) presets_dir: Option<Utf8PathBuf>,
}

impl LoadArgs {
    pub(crate) fn into_config(self) -> Result<LoadConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LoadConfig::try_from(merged)
    }
}

/// Resolved `load` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadConfig {
    pub(crate) input: Utf8PathBuf,
    pub(crate) output: OutputConfig,
}

impl TryFrom<LoadArgs> for LoadConfig {
    type Error = CliError;

    fn try_from(args: LoadArgs) -> Result<Self, Self::Error> {
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_INPUT,
        })?;
        let output = OutputConfig::resolve(
            args.database,
            args.prefix,
            args.epsg,
            args.layers.as_deref(),
            args.presets_dir,
        )?;
        Ok(Self { input, output })
    }
}

pub(crate) fn run_load(args: LoadArgs) -> Result<Vec<LayerOutcome>, CliError> {
    let config = args.into_config()?;
    require_existing(&config.input, ARG_INPUT)?;
    let presets = config.output.presets()?;
    let snapshot = load_osm_file(&config.input)?;
    let output = &config.output;
    let mut store = open_database(&output.database).map_err(|source| CliError::OpenDatabase {
        path: output.database.clone(),
        source,
    })?;
    let outcomes = run_snapshot(
        &mut store,
        &snapshot,
        &output.prefix,
        output.epsg,
        &output.layers,
        &presets,
    )?;
    let written = outcomes
        .iter()
        .filter(|outcome| matches!(outcome.status, LayerStatus::Written(_)))
        .count();
    info!("{written} layer(s) from {} written to {}", config.input, output.database);
    Ok(outcomes)
}
