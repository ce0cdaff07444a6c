//! Candidate fetching.
//!
//! [`Fetcher`] is the seam the pipeline fetches through; [`HttpFetcher`] is
//! the reqwest-backed implementation used by the CLI.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use macroharvest_shared::{DEFAULT_MAX_BODY_BYTES, HarvestConfig, HarvestError, Result};

/// Retrieves the raw bytes behind a URL.
///
/// Errors should be [`HarvestError::Network`]; the message ends up in the
/// candidate's report note.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// HTTP(S) fetcher with a bounded per-request timeout and body size.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// Build a fetcher from the runtime harvest configuration.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        Ok(Self::with_options(
            &config.user_agent,
            config.fetch_timeout,
            config.accept_invalid_certs,
        )?
        .with_max_body(config.max_body_bytes))
    }

    pub fn with_options(
        user_agent: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Cap the number of body bytes buffered per fetch.
    pub fn with_max_body(mut self, bytes: u64) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    fn too_large(&self, url: &str, len: u64) -> HarvestError {
        HarvestError::Network(format!(
            "{url}: body of {len} bytes exceeds limit of {} bytes",
            self.max_body_bytes
        ))
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url, "fetching candidate");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HarvestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{url}: HTTP {status}")));
        }

        let declared = response.content_length();
        if let Some(len) = declared.filter(|&len| len > self.max_body_bytes) {
            return Err(self.too_large(url, len));
        }

        // The declared length is advisory; the limit also applies per chunk.
        let capacity = declared.unwrap_or(0).min(self.max_body_bytes);
        let mut body = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| HarvestError::Network(format!("{url}: body read failed: {e}")))?
        {
            let len = (body.len() + chunk.len()) as u64;
            if len > self.max_body_bytes {
                return Err(self.too_large(url, len));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url, len = body.len(), "fetched candidate");
        Ok(body)
    }
}
