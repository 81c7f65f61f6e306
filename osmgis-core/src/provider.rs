//! Remote data providers: place geocoding and OSM extract download.
//!
//! Both traits are synchronous so layer pipelines stay embeddable in
//! synchronous code; HTTP implementations live in `osmgis-data`.

use geo::Rect;
use thiserror::Error;

/// Errors from [`Geocoder::geocode`] and [`OsmDownloader::download`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The place name or query was empty.
    #[error("query must not be empty")]
    EmptyQuery,
    /// The service found nothing for the query.
    #[error("no result for {query:?}")]
    NotFound {
        /// Query that matched nothing.
        query: String,
    },
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },
    /// The service answered with a non-success HTTP status.
    #[error("request to {url} failed with HTTP {status}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },
    /// The request failed before a response was received.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Error description.
        message: String,
    },
    /// The response body could not be interpreted.
    #[error("failed to parse response: {message}")]
    Parse {
        /// Error description.
        message: String,
    },
}

/// A geocoded place and its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceArea {
    /// Display name reported by the geocoder.
    pub name: String,
    /// Bounding box in WGS84 (`x = longitude`, `y = latitude`).
    pub bbox: Rect,
    /// OSM id of the matched element, when known.
    pub osm_id: Option<i64>,
}

/// Resolve a place name into an area.
///
/// # Examples
///
/// ```rust
/// use geo::{Coord, Rect};
/// use osmgis_core::{Geocoder, PlaceArea, ProviderError};
///
/// struct Fixed;
///
/// impl Geocoder for Fixed {
///     fn geocode(&self, place: &str) -> Result<PlaceArea, ProviderError> {
///         if place.trim().is_empty() {
///             return Err(ProviderError::EmptyQuery);
///         }
///         Ok(PlaceArea {
///             name: place.to_owned(),
///             bbox: Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }),
///             osm_id: None,
///         })
///     }
/// }
///
/// let area = Fixed.geocode("Vannes")?;
/// assert_eq!(area.name, "Vannes");
/// assert_eq!(Fixed.geocode(" "), Err(ProviderError::EmptyQuery));
/// # Ok::<(), ProviderError>(())
/// ```
pub trait Geocoder {
    /// Return the best match for `place`.
    ///
    /// Implementations must return `Err(ProviderError::EmptyQuery)` for blank
    /// input.
    fn geocode(&self, place: &str) -> Result<PlaceArea, ProviderError>;
}

/// Run an Overpass QL query and return the raw response body.
pub trait OsmDownloader {
    /// Execute `query`.
    ///
    /// Implementations must return `Err(ProviderError::EmptyQuery)` for blank
    /// input.
    fn download(&self, query: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Overpass QL fetching every node, way and relation intersecting `bbox`,
/// together with the nodes and ways they reference, as JSON.
///
/// # Examples
/// ```
/// use geo::{Coord, Rect};
/// use osmgis_core::provider::bbox_query;
///
/// let bbox = Rect::new(Coord { x: -2.8, y: 47.6 }, Coord { x: -2.7, y: 47.7 });
/// let query = bbox_query(&bbox);
/// assert!(query.contains("node(47.6,-2.8,47.7,-2.7)"));
/// ```
#[must_use]
pub fn bbox_query(bbox: &Rect) -> String {
    let (min, max) = (bbox.min(), bbox.max());
    let area = format!("{},{},{},{}", min.y, min.x, max.y, max.x);
    format!(
        "[out:json][timeout:900];(node({area});way({area});relation({area}););(._;>;);out;"
    )
}
