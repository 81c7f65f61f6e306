//! Overpass-backed [`OsmDownloader`].

use log::{debug, info};
use osmgis_core::{OsmDownloader, ProviderError};

use super::client::{BlockingClient, HttpProviderConfig, ProviderBuildError};

/// Public Overpass API instance.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api";

/// Downloader posting queries to an Overpass `/interpreter` endpoint.
#[derive(Debug)]
pub struct OverpassDownloader {
    http: BlockingClient,
}

impl OverpassDownloader {
    /// Create a downloader for the Overpass API at `base_url`.
    ///
    /// # Errors
    /// Returns [`ProviderBuildError`] when the URL, HTTP client or runtime
    /// cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderBuildError> {
        Self::with_config(HttpProviderConfig::new(base_url))
    }

    /// Create a downloader from a full configuration.
    ///
    /// # Errors
    /// See [`OverpassDownloader::new`].
    pub fn with_config(config: HttpProviderConfig) -> Result<Self, ProviderBuildError> {
        Ok(Self {
            http: BlockingClient::new(&config)?,
        })
    }

    async fn interpret(&self, query: &str) -> Result<Vec<u8>, ProviderError> {
        let url = self.http.endpoint("interpreter")?;
        let url_text = url.to_string();
        debug!("posting Overpass query to {url_text}: {query}");
        let response = self
            .http
            .client
            .post(url)
            .form(&[("data", query)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| self.http.convert_error(&err, &url_text))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| self.http.convert_error(&err, &url_text))?;
        info!("downloaded {} bytes from {url_text}", body.len());
        Ok(body.to_vec())
    }
}

impl OsmDownloader for OverpassDownloader {
    fn download(&self, query: &str) -> Result<Vec<u8>, ProviderError> {
        if query.trim().is_empty() {
            return Err(ProviderError::EmptyQuery);
        }
        self.http.block_on(self.interpret(query))
    }
}
