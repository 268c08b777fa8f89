//! Public IP detection.

use crate::error::{DdnsError, Result};
use crate::http::HttpClient;
use crate::metrics::{MetricsSink, Op, OpTimer};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

/// IP-echo service; must return a body with the IP only.
pub const DEFAULT_CHECK_IP_URL: &str = "https://checkip.amazonaws.com";

/// Source of the host's current public address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressProbe: Send + Sync {
    /// Ask once; retrying is the caller's business.
    async fn probe(&self) -> Result<IpAddr>;
}

/// Asks an IP-echo service over HTTP.
pub struct IpDetector {
    client: HttpClient,
    url: String,
    domain: String,
    metrics: Arc<dyn MetricsSink>,
}

impl IpDetector {
    /// Create a detector for `domain` using the default echo service.
    pub fn new(client: HttpClient, domain: String, metrics: Arc<dyn MetricsSink>) -> Self {
        Self::with_url(client, DEFAULT_CHECK_IP_URL.to_string(), domain, metrics)
    }

    /// Create with a custom echo service URL.
    pub fn with_url(
        client: HttpClient,
        url: String,
        domain: String,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            client,
            url,
            domain,
            metrics,
        }
    }

    async fn check_ip(&self) -> Result<IpAddr> {
        let response = self.client.send(self.client.get(&self.url)).await?;

        if !response.status().is_success() {
            return Err(DdnsError::HttpStatus {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        let ip_str = text.trim();

        ip_str
            .parse()
            .map_err(|_| DdnsError::Probe(format!("Invalid IP response: {:?}", ip_str)))
    }
}

#[async_trait]
impl AddressProbe for IpDetector {
    async fn probe(&self) -> Result<IpAddr> {
        let timer = OpTimer::start(self.metrics.as_ref(), Op::Probe, &self.domain);
        let result = self.check_ip().await;
        timer.finish(&result);

        match &result {
            Ok(ip) => {
                self.metrics.op_succeeded(Op::Probe, &self.domain, None);
                tracing::debug!("Detected public IP {} from {}", ip, self.url);
            }
            Err(e) => tracing::error!("Failed to check IP via {}: {}", self.url, e),
        }

        result
    }
}
