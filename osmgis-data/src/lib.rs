//! Data access and pipeline wiring for `osmgis`.
//!
//! Responsibilities:
//! - Load OSM extracts (Overpass JSON, PBF) into raw snapshots.
//! - Provide HTTP implementations of the geocoding and download providers.
//! - Run the place → bbox → download → load → layers pipeline.
//!
//! Boundaries:
//! - Do not encode layer rules (live in `osmgis-core`).
//! - Network calls block on a private runtime so callers stay synchronous.
//!
//! Invariants:
//! - The raw schema loaded by a pipeline run is dropped before it returns.
//! - No global mutable state.

#![forbid(unsafe_code)]

mod database;
pub mod ingest;
pub mod pipeline;
pub mod remote;

pub use database::{DatabaseError, open_database};
pub use ingest::{OsmLoadError, load_osm_file, load_overpass_json, load_pbf};
pub use pipeline::{
    LayerKind, LayerOutcome, LayerPresets, LayerStatus, PipelineError, PipelineReport,
    PipelineRequest, PresetError, UnknownLayerError, run_layers, run_pipeline, run_snapshot,
};
