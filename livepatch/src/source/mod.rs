//! # Manifest Source
//!
//! Fetches the patch manifest and the replacement bodies it points to.
//!
//! Two transports share one contract:
//!
//! - [`HttpSource`] - `GET <endpoint>/manifest.json`, bodies at
//!   `<endpoint>/<version>/<path>`
//! - [`FsSource`] - `<endpoint>/manifest.json`, bodies at `<endpoint>/<path>`
//!
//! "Nothing published" (HTTP 404, missing file) is [`Fetched::NotFound`], not
//! an error, so callers can stay quiet about it. Everything else that goes
//! wrong is a [`SourceError`] and is retried on the next poll cycle.

pub mod fs;
pub mod http;

use livepatch_common::PatchManifest;
use std::time::Duration;

pub use fs::FsSource;
pub use http::HttpSource;

use crate::domain::SourceError;

/// Result of a fetch that may legitimately find nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Found(T),
    NotFound,
}

impl<T> Fetched<T> {
    /// Convert to an `Option`, dropping the distinction from errors.
    pub fn found(self) -> Option<T> {
        match self {
            Fetched::Found(value) => Some(value),
            Fetched::NotFound => None,
        }
    }
}

/// The configured patch transport.
#[derive(Debug, Clone)]
pub enum PatchSource {
    Http(HttpSource),
    Fs(FsSource),
}

impl PatchSource {
    /// Pick the transport from the endpoint: `http://` and `https://` use HTTP,
    /// anything else is a directory.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_endpoint(endpoint: &str, connect_timeout: Duration) -> Result<Self, SourceError> {
        if is_http_endpoint(endpoint) {
            Ok(PatchSource::Http(HttpSource::new(endpoint, connect_timeout)?))
        } else {
            Ok(PatchSource::Fs(FsSource::new(endpoint)))
        }
    }

    /// Human-readable endpoint for logging.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self {
            PatchSource::Http(source) => source.base_url().to_string(),
            PatchSource::Fs(source) => source.root().display().to_string(),
        }
    }

    /// Fetch `manifest.json`.
    ///
    /// # Errors
    /// Returns an error on transport failure or an undecodable manifest.
    pub async fn fetch_manifest(&self) -> Result<Fetched<PatchManifest>, SourceError> {
        match self {
            PatchSource::Http(source) => source.fetch_manifest().await,
            PatchSource::Fs(source) => source.fetch_manifest(),
        }
    }

    /// Fetch the replacement body for one manifest entry.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    pub async fn fetch_body(&self, version: &str, path: &str) -> Result<Fetched<Vec<u8>>, SourceError> {
        match self {
            PatchSource::Http(source) => source.fetch_body(version, path).await,
            PatchSource::Fs(source) => source.fetch_body(path),
        }
    }
}

#[must_use]
pub fn is_http_endpoint(endpoint: &str) -> bool {
    let lower = endpoint.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
