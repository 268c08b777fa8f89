//! Shared HTTP client.

use crate::error::Result;
use crate::metrics::MetricsSink;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sent with every request. Update providers answer `badagent` without one.
pub const USER_AGENT: &str = concat!("ip-updater/", env!("CARGO_PKG_VERSION"));

/// `reqwest::Client` that reports the duration of every request.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    metrics: Arc<dyn MetricsSink>,
}

impl HttpClient {
    /// Create a client with a per-request timeout.
    pub fn new(timeout: Duration, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { inner, metrics })
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.inner.get(url)
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.inner.post(url)
    }

    /// Send a request built from this client.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = request.build()?;
        let url = request.url().as_str().to_string();
        let method = request.method().to_string();

        let start = Instant::now();
        let result = self.inner.execute(request).await;
        let code = result.as_ref().ok().map(|r| r.status().as_u16());
        self.metrics.http_request(&url, &method, code, start.elapsed());

        tracing::trace!(%url, %method, ?code, "HTTP request finished");

        Ok(result?)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}
