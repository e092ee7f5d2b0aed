//! HTTP patch transport.

use livepatch_common::{PatchManifest, MANIFEST_FILE_NAME};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::Fetched;
use crate::domain::SourceError;

/// Fetches manifests and bodies from an HTTP base URL.
///
/// Only the connect phase is bounded; the replace step that follows is
/// assumed to be fast.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: Client,
}

impl HttpSource {
    /// # Errors
    /// Returns an error if the underlying client cannot be built (TLS backend
    /// initialization failure).
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("livepatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn manifest_url(&self) -> String {
        format!("{}/{MANIFEST_FILE_NAME}", self.base_url)
    }

    #[must_use]
    pub fn body_url(&self, version: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, version, path.trim_start_matches('/'))
    }

    /// # Errors
    /// Returns an error on transport failure, a non-2xx status other than 404,
    /// or an undecodable manifest.
    pub async fn fetch_manifest(&self) -> Result<Fetched<PatchManifest>, SourceError> {
        let url = self.manifest_url();
        let Fetched::Found(bytes) = self.get(&url).await? else {
            return Ok(Fetched::NotFound);
        };
        serde_json::from_slice(&bytes)
            .map(Fetched::Found)
            .map_err(|source| SourceError::Malformed { origin: url, source })
    }

    /// # Errors
    /// Returns an error on transport failure or a non-2xx status other than 404.
    pub async fn fetch_body(&self, version: &str, path: &str) -> Result<Fetched<Vec<u8>>, SourceError> {
        self.get(&self.body_url(version, path)).await
    }

    async fn get(&self, url: &str) -> Result<Fetched<Vec<u8>>, SourceError> {
        let request_error = |source| SourceError::Request { url: url.to_string(), source };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            return Err(SourceError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(Fetched::Found(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let source = HttpSource::new("http://localhost:8080/patches/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.manifest_url(), "http://localhost:8080/patches/manifest.json");
        assert_eq!(
            source.body_url("1.2.0", "/com/example/A.bin"),
            "http://localhost:8080/patches/1.2.0/com/example/A.bin"
        );
    }
}
