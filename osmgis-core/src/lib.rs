//! Core of the OSM to GIS layer pipeline.
//!
//! Responsibilities:
//! - Select OSM elements by tag ([`TagFilter`]) and classify them
//!   ([`TagMapping`]).
//! - Derive typed attributes such as heights, levels and speeds
//!   ([`attributes`]).
//! - Rebuild points, lines and polygons from raw topology and reproject them
//!   ([`geometry`]).
//! - Assemble attributed layers over an [`store::OsmStore`] ([`layer`]).
//!
//! Boundaries:
//! - No network or file-format code; loaders and HTTP providers live in
//!   `osmgis-data`.
//!
//! Invariants:
//! - Malformed geometry is dropped and logged, never surfaced as an error.
//! - Every layer operation writes exactly one fresh table.

#![forbid(unsafe_code)]

pub mod attributes;
pub mod config;
mod element;
mod filter;
pub mod geometry;
pub mod layer;
mod mapping;
pub mod provider;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use attributes::{BuildingHeights, LevelParameters, LevelRule};
pub use element::{ElementId, ElementIdError, ElementKind, MemberRole, RelationMember, Tags};
pub use filter::{KeyConstraint, SqlPredicate, TagFilter, TagFilterError};
pub use layer::{LayerError, LayerRequest};
pub use mapping::{Classification, KeyRule, MappingEntry, MatchToken, TagMapping};
pub use provider::{Geocoder, OsmDownloader, PlaceArea, ProviderError};
