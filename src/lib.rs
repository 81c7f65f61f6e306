//! Facade crate for the `osmgis` OpenStreetMap to GIS layer pipeline.
//!
//! This crate re-exports the core domain types and exposes the SQLite store
//! and the data pipeline behind feature flags.

#![forbid(unsafe_code)]

pub use osmgis_core::{
    BuildingHeights, Classification, ElementId, ElementKind, Geocoder, LayerError, LayerRequest,
    OsmDownloader, PlaceArea, ProviderError, TagFilter, TagFilterError, TagMapping, Tags, config,
    layer, store,
};

#[cfg(feature = "store-sqlite")]
pub use osmgis_core::store::{SqliteOsmStore, SqliteOsmStoreError};

#[cfg(feature = "data")]
pub use osmgis_data::{
    LayerKind, LayerPresets, PipelineError, PipelineReport, PipelineRequest, run_pipeline,
};
