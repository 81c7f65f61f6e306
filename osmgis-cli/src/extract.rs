//! `extract` command: place name to layers over the network.

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmgis_data::{
    PipelineReport, PipelineRequest, open_database,
    remote::{
        DEFAULT_NOMINATIM_URL, DEFAULT_OVERPASS_URL, HttpProviderConfig, NominatimGeocoder,
        OverpassDownloader,
    },
    run_pipeline,
};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_EPSG, ARG_LAYERS, ARG_NOMINATIM_URL, ARG_OVERPASS_URL, ARG_PLACE,
    ARG_PREFIX, ARG_PRESETS_DIR, ARG_TIMEOUT_SECS, CliError, ENV_PLACE, OutputConfig, timeout,
};

/// CLI arguments for the `extract` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Geocode a place with Nominatim, download its OpenStreetMap \
                 data from Overpass and build the requested layers into a \
                 SQLite database. Options can come from CLI flags, \
                 configuration files, or OSMGIS_* environment variables.",
    about = "Build layers for a named place"
)]
#[ortho_config(prefix = "OSMGIS")]
pub(crate) struct ExtractArgs {
    /// Place name, e.g. "Vannes, France".
    #[arg(value_name = ARG_PLACE)]
    #[serde(default)]
    pub(crate) place: Option<String>,
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
    /// Nominatim base URL.
    #[arg(long = ARG_NOMINATIM_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) nominatim_url: Option<String>,
    /// Overpass API base URL.
    #[arg(long = ARG_OVERPASS_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) overpass_url: Option<String>,
    /// HTTP timeout in seconds.
    #[arg(long = ARG_TIMEOUT_SECS, value_name = "secs")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
}

impl ExtractArgs {
    pub(crate) fn into_config(self) -> Result<ExtractConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ExtractConfig::try_from(merged)
    }
}

/// Resolved `extract` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExtractConfig {
    pub(crate) place: String,
    pub(crate) output: OutputConfig,
    pub(crate) nominatim: HttpProviderConfig,
    pub(crate) overpass: HttpProviderConfig,
}

impl TryFrom<ExtractArgs> for ExtractConfig {
    type Error = CliError;

    fn try_from(args: ExtractArgs) -> Result<Self, Self::Error> {
        let place = args
            .place
            .filter(|place| !place.trim().is_empty())
            .ok_or(CliError::MissingArgument {
                field: ARG_PLACE,
                env: ENV_PLACE,
            })?;
        let output = OutputConfig::resolve(
            args.database,
            args.prefix,
            args.epsg,
            args.layers.as_deref(),
            args.presets_dir,
        )?;
        let http = |base_url: Option<String>, default: &str| {
            let config = HttpProviderConfig::new(base_url.unwrap_or_else(|| default.to_owned()));
            match timeout(args.timeout_secs) {
                Some(limit) => config.with_timeout(limit),
                None => config,
            }
        };
        Ok(Self {
            place,
            nominatim: http(args.nominatim_url, DEFAULT_NOMINATIM_URL),
            overpass: http(args.overpass_url, DEFAULT_OVERPASS_URL),
            output,
        })
    }
}

pub(crate) fn run_extract(args: ExtractArgs) -> Result<PipelineReport, CliError> {
    let config = args.into_config()?;
    let presets = config.output.presets()?;
    let geocoder = NominatimGeocoder::with_config(config.nominatim.clone()).map_err(|source| {
        CliError::BuildProvider {
            base_url: config.nominatim.base_url.clone(),
            source,
        }
    })?;
    let downloader = OverpassDownloader::with_config(config.overpass.clone()).map_err(|source| {
        CliError::BuildProvider {
            base_url: config.overpass.base_url.clone(),
            source,
        }
    })?;
    let mut store =
        open_database(&config.output.database).map_err(|source| CliError::OpenDatabase {
            path: config.output.database.clone(),
            source,
        })?;
    let output = config.output;
    let request = PipelineRequest::new(config.place, output.prefix, output.epsg)
        .with_layers(output.layers);
    let report = run_pipeline(&geocoder, &downloader, &mut store, &request, &presets)?;
    info!(
        "{} layer(s) written to {}",
        report.written().count(),
        output.database
    );
    Ok(report)
}
