//! Nominatim-backed [`Geocoder`].

use geo::{Coord, Rect};
use log::debug;
use osmgis_core::{Geocoder, PlaceArea, ProviderError};
use serde::Deserialize;

use super::client::{BlockingClient, HttpProviderConfig, ProviderBuildError};

/// Public Nominatim instance.
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Deserialize)]
struct SearchHit {
    display_name: String,
    /// `[south, north, west, east]`, serialised as strings.
    boundingbox: [String; 4],
    #[serde(default)]
    osm_id: Option<i64>,
}

/// Geocoder querying the Nominatim `/search` endpoint.
///
/// Requests block the calling thread; see [`HttpProviderConfig`] for the
/// timeout and user agent.
#[derive(Debug)]
pub struct NominatimGeocoder {
    http: BlockingClient,
}

impl NominatimGeocoder {
    /// Create a geocoder for the service at `base_url`.
    ///
    /// # Errors
    /// Returns [`ProviderBuildError`] when the URL, HTTP client or runtime
    /// cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderBuildError> {
        Self::with_config(HttpProviderConfig::new(base_url))
    }

    /// Create a geocoder from a full configuration.
    ///
    /// # Errors
    /// See [`NominatimGeocoder::new`].
    pub fn with_config(config: HttpProviderConfig) -> Result<Self, ProviderBuildError> {
        Ok(Self {
            http: BlockingClient::new(&config)?,
        })
    }

    async fn search(&self, place: &str) -> Result<Vec<u8>, ProviderError> {
        let mut url = self.http.endpoint("search")?;
        url.query_pairs_mut()
            .append_pair("q", place)
            .append_pair("format", "jsonv2")
            .append_pair("limit", "1");
        let url_text = url.to_string();
        debug!("geocoding {place:?} via {url_text}");
        let response = self
            .http
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| self.http.convert_error(&err, &url_text))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| self.http.convert_error(&err, &url_text))?;
        Ok(body.to_vec())
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, place: &str) -> Result<PlaceArea, ProviderError> {
        let place = place.trim();
        if place.is_empty() {
            return Err(ProviderError::EmptyQuery);
        }
        let body = self.http.block_on(self.search(place))?;
        parse_search_response(place, &body)
    }
}

/// Interpret a Nominatim `jsonv2` search response for `query`.
///
/// # Errors
/// Returns [`ProviderError::NotFound`] for an empty result list and
/// [`ProviderError::Parse`] when the body or a bounding box is malformed.
pub fn parse_search_response(query: &str, body: &[u8]) -> Result<PlaceArea, ProviderError> {
    let hits: Vec<SearchHit> =
        serde_json::from_slice(body).map_err(|err| ProviderError::Parse {
            message: err.to_string(),
        })?;
    let hit = hits.into_iter().next().ok_or_else(|| ProviderError::NotFound {
        query: query.to_owned(),
    })?;
    let [south, north, west, east] = parse_bbox(&hit.boundingbox)?;
    Ok(PlaceArea {
        name: hit.display_name,
        bbox: Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north }),
        osm_id: hit.osm_id,
    })
}

fn parse_bbox(raw: &[String; 4]) -> Result<[f64; 4], ProviderError> {
    let mut parsed = [0.0; 4];
    for (slot, text) in parsed.iter_mut().zip(raw) {
        *slot = text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| ProviderError::Parse {
                message: format!("invalid bounding box component {text:?}"),
            })?;
    }
    Ok(parsed)
}
