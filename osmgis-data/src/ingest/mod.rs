//! Loaders turning OSM extracts into [`RawSnapshot`]s.

use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use geo::Coord;
use osmgis_core::store::RawSnapshot;
use thiserror::Error;

mod overpass;
mod pbf;

pub use overpass::load_overpass_json;
pub use pbf::load_pbf;

/// Errors returned when loading an OSM extract.
#[derive(Debug, Error)]
pub enum OsmLoadError {
    /// Opening or reading a file failed.
    #[error("failed to read OSM file at {path:?}")]
    Read {
        /// File being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening a PBF file failed.
    #[error("failed to open OSM PBF file at {path:?}")]
    OpenPbf {
        /// File being opened.
        path: Utf8PathBuf,
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// A PBF file could not be decoded.
    #[error("failed to decode OSM PBF data at {path:?}")]
    Decode {
        /// File being decoded.
        path: Utf8PathBuf,
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// An Overpass JSON document was malformed.
    #[error("failed to parse Overpass JSON")]
    Json {
        /// Source error returned by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// The Overpass server reported a runtime error.
    #[error("Overpass reported an error: {remark}")]
    Overpass {
        /// Remark returned alongside the (partial) result.
        remark: String,
    },
    /// The file extension names no known format.
    #[error("unsupported OSM file format for {path:?}; expected .pbf or .json")]
    UnsupportedFormat {
        /// Offending file.
        path: Utf8PathBuf,
    },
}

/// Coordinate within WGS84 bounds, else `None`.
pub(crate) fn validated_coord(lon: f64, lat: f64) -> Option<Coord> {
    (lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat))
    .then_some(Coord { x: lon, y: lat })
}

/// Load a `.pbf` extract or a saved Overpass `.json` response.
///
/// # Errors
/// Returns [`OsmLoadError::UnsupportedFormat`] for other extensions and the
/// loader's own errors otherwise.
pub fn load_osm_file(path: &Utf8Path) -> Result<RawSnapshot, OsmLoadError> {
    match path.extension() {
        Some("pbf") => load_pbf(path),
        Some("json") => load_overpass_json(&read_file(path)?),
        _ => Err(OsmLoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn read_file(path: &Utf8Path) -> Result<Vec<u8>, OsmLoadError> {
    let read_error = |source| OsmLoadError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs_utf8::File::open_ambient(path, ambient_authority()).map_err(read_error)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(read_error)?;
    Ok(bytes)
}
