// # Cloudflare Range Source
//
// Fetches Cloudflare's published edge IP ranges.
//
// ## API Reference
//
// - `GET https://api.cloudflare.com/client/v4/ips` (no authentication)
//
// ```json
// {
//   "result": {
//     "ipv4_cidrs": ["173.245.48.0/20", "..."],
//     "ipv6_cidrs": ["2400:cb00::/32", "..."],
//     "etag": "..."
//   },
//   "success": true,
//   "errors": [],
//   "messages": []
// }
// ```
//
// ## Behavior
//
// - One request per call, bounded by a client timeout
// - Any failure (transport, non-2xx, `"success": false`, missing fields)
//   is an `Error::Upstream`; nothing partial is returned
// - CIDR strings are passed through verbatim
// - No retries and no caching: both belong to the engine

use async_trait::async_trait;
use mtsync_core::config::CloudflareConfig;
use mtsync_core::traits::{RangeSnapshot, RangeSource};
use mtsync_core::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

const SOURCE_NAME: &str = "cloudflare";

#[derive(Debug, Deserialize)]
struct IpsResponse {
    #[serde(default = "default_success")]
    success: bool,
    result: Option<IpsResult>,
}

#[derive(Debug, Deserialize)]
struct IpsResult {
    ipv4_cidrs: Vec<String>,
    ipv6_cidrs: Vec<String>,
}

fn default_success() -> bool {
    true
}

/// Cloudflare published ranges over HTTPS
#[derive(Debug, Clone)]
pub struct CloudflareRangeSource {
    /// Ranges endpoint
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl CloudflareRangeSource {
    /// Create a source for `url` with a request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Create a source from configuration
    pub fn from_config(config: &CloudflareConfig) -> Result<Self> {
        if config.api_url.is_empty() {
            return Err(Error::config("Cloudflare API URL cannot be empty"));
        }
        Self::new(config.api_url.clone(), config.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Turn a decoded response into a snapshot
fn into_snapshot(response: IpsResponse) -> Result<RangeSnapshot> {
    if !response.success {
        return Err(Error::upstream(SOURCE_NAME, "API reported success=false"));
    }

    let result = response
        .result
        .ok_or_else(|| Error::upstream(SOURCE_NAME, "Invalid response: missing result"))?;

    Ok(RangeSnapshot::new(result.ipv4_cidrs, result.ipv6_cidrs))
}

#[async_trait]
impl RangeSource for CloudflareRangeSource {
    async fn ranges(&self) -> Result<RangeSnapshot> {
        tracing::debug!("Fetching ranges from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::upstream(SOURCE_NAME, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::upstream(SOURCE_NAME, format!("HTTP error: {}", status)));
        }

        let body: IpsResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(SOURCE_NAME, format!("Invalid response: {}", e)))?;

        into_snapshot(body)
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}
