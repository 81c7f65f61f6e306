//! HTTP implementations of the provider traits.
//!
//! [`NominatimGeocoder`] resolves place names and [`OverpassDownloader`]
//! fetches OSM extracts. Both block the calling thread on a private Tokio
//! runtime, or on the ambient multi-threaded runtime when there is one.

mod client;
mod nominatim;
mod overpass;
#[doc(hidden)]
pub mod test_support;

pub use client::{DEFAULT_USER_AGENT, HttpProviderConfig, ProviderBuildError};
pub use nominatim::{DEFAULT_NOMINATIM_URL, NominatimGeocoder, parse_search_response};
pub use overpass::{DEFAULT_OVERPASS_URL, OverpassDownloader};
