//! Shared blocking HTTP client used by the remote providers.

use std::{fmt, future::Future, time::Duration};

use osmgis_core::ProviderError;
use reqwest::Client;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Default user agent sent to remote services.
pub const DEFAULT_USER_AGENT: &str = "osmgis/0.1";

const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Errors raised while constructing a remote provider.
#[derive(Debug, Error)]
pub enum ProviderBuildError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// The base URL does not parse.
    #[error("invalid base URL {url:?}: {source}")]
    BaseUrl {
        /// Rejected URL.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// Connection settings shared by the remote providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProviderConfig {
    /// Service root, e.g. `"https://nominatim.openstreetmap.org"`.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl HttpProviderConfig {
    /// Configuration for `base_url` with default timeout and user agent.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// An async HTTP client driven to completion from synchronous code.
///
/// Outside any Tokio runtime, or inside a `current_thread` runtime, requests
/// run on a private current-thread runtime. Inside a multi-threaded runtime
/// they use that runtime through [`tokio::task::block_in_place`].
pub(crate) struct BlockingClient {
    pub(crate) client: Client,
    pub(crate) base_url: url::Url,
    timeout: Duration,
    runtime: Runtime,
}

impl fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BlockingClient {
    pub(crate) fn new(config: &HttpProviderConfig) -> Result<Self, ProviderBuildError> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ProviderBuildError::Runtime)?;
        Ok(Self {
            client,
            base_url,
            timeout: config.timeout,
            runtime,
        })
    }

    /// Endpoint below the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> Result<url::Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|err| ProviderError::Network {
                url: self.base_url.to_string(),
                message: err.to_string(),
            })
    }

    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }

    pub(crate) fn convert_error(&self, error: &reqwest::Error, url: &str) -> ProviderError {
        if error.is_timeout() {
            return ProviderError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.timeout.as_secs(),
            };
        }
        if let Some(status) = error.status() {
            return ProviderError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        ProviderError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

/// Parse a base URL so that relative endpoints append to its path.
fn parse_base_url(raw: &str) -> Result<url::Url, ProviderBuildError> {
    let normalised = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };
    url::Url::parse(&normalised).map_err(|source| ProviderBuildError::BaseUrl {
        url: raw.to_owned(),
        source,
    })
}
