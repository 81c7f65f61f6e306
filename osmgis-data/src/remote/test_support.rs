//! Deterministic provider doubles for tests.
//!
//! [`StubGeocoder`] and [`StubDownloader`] return pre-configured responses
//! without touching the network.

use std::cell::RefCell;

use geo::{Coord, Rect};
use osmgis_core::{Geocoder, OsmDownloader, PlaceArea, ProviderError};

#[derive(Debug, Clone)]
enum StubResponse<T> {
    Value(T),
    Error(ProviderError),
}

impl<T: Clone> StubResponse<T> {
    fn respond(&self) -> Result<T, ProviderError> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Error(error) => Err(error.clone()),
        }
    }
}

/// Stub [`Geocoder`] returning a fixed area.
///
/// # Example
///
/// ```
/// use osmgis_core::Geocoder;
/// use osmgis_data::remote::test_support::StubGeocoder;
///
/// let geocoder = StubGeocoder::with_bbox("Vannes", -2.8, 47.6, -2.7, 47.7);
/// let area = geocoder.geocode("Vannes").expect("stubbed");
/// assert_eq!(area.bbox.min().x, -2.8);
/// ```
#[derive(Debug, Clone)]
pub struct StubGeocoder {
    response: StubResponse<PlaceArea>,
}

impl StubGeocoder {
    /// Return `area` for every non-blank place.
    #[must_use]
    pub fn with_area(area: PlaceArea) -> Self {
        Self {
            response: StubResponse::Value(area),
        }
    }

    /// Return an area named `name` spanning the given WGS84 bounds.
    #[must_use]
    pub fn with_bbox(name: &str, west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::with_area(PlaceArea {
            name: name.to_owned(),
            bbox: Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north }),
            osm_id: None,
        })
    }

    /// Return `error` for every non-blank place.
    #[must_use]
    pub fn with_error(error: ProviderError) -> Self {
        Self {
            response: StubResponse::Error(error),
        }
    }
}

impl Geocoder for StubGeocoder {
    fn geocode(&self, place: &str) -> Result<PlaceArea, ProviderError> {
        if place.trim().is_empty() {
            return Err(ProviderError::EmptyQuery);
        }
        self.response.respond()
    }
}

/// Stub [`OsmDownloader`] returning a fixed body and recording queries.
#[derive(Debug)]
pub struct StubDownloader {
    response: StubResponse<Vec<u8>>,
    queries: RefCell<Vec<String>>,
}

impl StubDownloader {
    /// Return `body` for every non-blank query.
    #[must_use]
    pub fn with_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            response: StubResponse::Value(body.into()),
            queries: RefCell::new(Vec::new()),
        }
    }

    /// Return `error` for every non-blank query.
    #[must_use]
    pub fn with_error(error: ProviderError) -> Self {
        Self {
            response: StubResponse::Error(error),
            queries: RefCell::new(Vec::new()),
        }
    }

    /// Queries received so far, oldest first.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }
}

impl OsmDownloader for StubDownloader {
    fn download(&self, query: &str) -> Result<Vec<u8>, ProviderError> {
        if query.trim().is_empty() {
            return Err(ProviderError::EmptyQuery);
        }
        self.queries.borrow_mut().push(query.to_owned());
        self.response.respond()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn geocoder_rejects_blank_places() {
        let geocoder = StubGeocoder::with_bbox("x", 0.0, 0.0, 1.0, 1.0);
        assert_eq!(geocoder.geocode(""), Err(ProviderError::EmptyQuery));
    }

    #[rstest]
    fn downloader_records_queries() {
        let downloader = StubDownloader::with_body(b"{}".to_vec());
        downloader.download("q1").expect("stubbed");
        downloader.download("q2").expect("stubbed");
        assert_eq!(downloader.queries(), ["q1", "q2"]);
    }

    #[rstest]
    fn configured_errors_are_returned() {
        let downloader = StubDownloader::with_error(ProviderError::Parse {
            message: "boom".into(),
        });
        assert!(matches!(
            downloader.download("q"),
            Err(ProviderError::Parse { .. })
        ));
        assert!(downloader.queries() == ["q"]);
    }
}
