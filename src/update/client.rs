//! Form-encoded update client (dyndns2-style, as served by dyn.dns.he.net).

use super::{parse_body, UpdateApi, UpdateOutcome};
use crate::error::{DdnsError, ProtocolError, Result};
use crate::http::HttpClient;
use crate::metrics::{MetricsSink, Op, OpTimer};
use crate::updater::UpdaterState;
use async_trait::async_trait;
use std::sync::Arc;

/// Hurricane Electric's update endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://dyn.dns.he.net/nic/update";

/// Posts `hostname`, `password` and optionally `myip` to the state's endpoint.
pub struct DynUpdateClient {
    client: HttpClient,
    metrics: Arc<dyn MetricsSink>,
}

impl DynUpdateClient {
    pub fn new(client: HttpClient, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { client, metrics }
    }

    async fn submit(&self, state: &UpdaterState) -> Result<UpdateOutcome> {
        let mut form = vec![
            ("hostname", state.domain().to_string()),
            ("password", state.api_key().to_string()),
        ];
        if let Some(ip) = state.last_known_ip() {
            form.push(("myip", ip.to_string()));
        }

        // reqwest sets the form-urlencoded content type.
        let request = self.client.post(state.endpoint()).form(&form);
        let response = self.client.send(request).await?;

        if !response.status().is_success() {
            return Err(DdnsError::HttpStatus {
                url: state.endpoint().to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        tracing::trace!(domain = state.domain(), %body, "Update response body");

        let outcome = parse_body(&body)?;

        if let (UpdateOutcome::NoChange(remote), Some(expected)) = (outcome, state.last_known_ip()) {
            if remote != expected {
                return Err(ProtocolError::UnexpectedIp { remote, expected }.into());
            }
        }

        Ok(outcome)
    }

    fn record(&self, domain: &str, outcome: &UpdateOutcome) {
        match outcome {
            UpdateOutcome::Good(ip) | UpdateOutcome::NoChange(ip) => {
                if matches!(outcome, UpdateOutcome::Good(_)) {
                    self.metrics.last_updated(domain);
                }
                self.metrics.current_ip(domain, *ip);
                self.metrics
                    .op_succeeded(Op::Update, domain, Some(outcome.status().as_str()));
            }
            UpdateOutcome::ClientFailure(status) | UpdateOutcome::ServerFailure(status) => {
                self.metrics.op_failed(Op::Update, domain, status.as_str());
            }
        }
    }
}

#[async_trait]
impl UpdateApi for DynUpdateClient {
    async fn update(&self, state: &UpdaterState) -> Result<UpdateOutcome> {
        let domain = state.domain();
        let timer = OpTimer::start(self.metrics.as_ref(), Op::Update, domain);
        let result = self.submit(state).await;

        // Provider failures arrive as Ok outcomes but count as unsuccessful.
        let success = matches!(&result, Ok(outcome) if outcome.confirmed_ip().is_some());
        timer.observe(success);

        match &result {
            Ok(outcome) => self.record(domain, outcome),
            Err(e) => {
                self.metrics.op_failed(Op::Update, domain, &e.reason());
                tracing::error!("Failed to update {}: {}", domain, e);
            }
        }

        result
    }
}
