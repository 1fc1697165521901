//! A small outbound HTTP client, reduced to the one blocking-form GET the
//! probe binary and the Hub's producer locator actually issue.

use std::time::Duration;

use dqm_core::{NetError, NetResult};

/// Thin wrapper over `reqwest::Client` with the fabric's error type.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> NetResult<Self> {
        let inner = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| NetError::InternalFailure(format!("building http client: {e}")))?;
        Ok(Self { inner })
    }

    /// Issues a GET and returns the raw response body on success.
    pub async fn get(&self, url: &str) -> NetResult<Vec<u8>> {
        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| NetError::TransportFailure(format!("GET {url} failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::TransportFailure(format!(
                "GET {url} returned HTTP {}",
                status.as_u16()
            )));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| NetError::TransportFailure(format!("reading response from {url}: {e}")))
    }
}
