//! Material fetcher
//!
//! Retrieves the raw bytes of a stored material from its storage URL.

use crate::errors::IngestionError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Trait for fetching stored material bytes
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw bytes at the given URL
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestionError>;
}

/// HTTP fetcher over reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestionError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            IngestionError::FetchTransport {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            return Err(IngestionError::Fetch {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| IngestionError::FetchTransport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!(url = url, size = bytes.len(), "Material fetched");

        Ok(bytes.to_vec())
    }
}

/// In-memory fetcher for tests: serves canned bytes per URL
pub struct StaticFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn new(files: HashMap<String, Vec<u8>>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestionError> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| IngestionError::Fetch {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_fetcher_hit_and_miss() {
        let mut files = HashMap::new();
        files.insert("https://storage.test/a.pdf".to_string(), vec![1, 2, 3]);
        let fetcher = StaticFetcher::new(files);

        let bytes = fetcher.fetch("https://storage.test/a.pdf").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        let err = fetcher.fetch("https://storage.test/missing.pdf").await.unwrap_err();
        match err {
            IngestionError::Fetch { status, .. } => assert_eq!(status, 404),
            other => panic!("unexpected error: {other}"),
        }
        // The status must be visible in the message for diagnosability
        assert!(fetcher
            .fetch("https://storage.test/missing.pdf")
            .await
            .unwrap_err()
            .to_string()
            .contains("404"));
    }
}
