//! HTTP fetching
//!
//! The [`Fetcher`] trait is the only way the crate talks to the network.
//! [`HttpFetcher`] is the reqwest-backed implementation; tests substitute an
//! in-memory registry.

use async_trait::async_trait;
use tracing::debug;

use crate::config::MirrorConfig;
use crate::error::{OperationError, Result};

/// Trait for anything that can GET a URL and hand back the body
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the body of `url`
    ///
    /// Non-success statuses are errors; there are no retries.
    async fn get(&self, url: &str) -> Result<Vec<u8>>;

    /// Fetcher identifier for logging
    fn name(&self) -> &'static str;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout())
            .build()
            .map_err(|source| OperationError::Client { source })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);

        let transport = |source| OperationError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;

        if !response.status().is_success() {
            return Err(OperationError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        debug!("GET {} -> {} bytes", url, bytes.len());
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Mock fetcher for testing: serves a fixed map and counts requests
#[cfg(test)]
pub(crate) struct MockFetcher {
    pub responses: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
    pub requests: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockFetcher {
    pub fn new(responses: &[(&str, &str)]) -> Self {
        Self {
            responses: std::sync::Mutex::new(
                responses
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                    .collect(),
            ),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body.as_bytes().to_vec());
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| OperationError::Http {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
