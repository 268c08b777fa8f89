//! Metrics reporting.
//!
//! Components never touch a global registry directly. They receive an
//! `Arc<dyn MetricsSink>` at construction time; the binary decides whether
//! that sink forwards to the Prometheus exporter or discards everything.

use crate::error::{DdnsError, Result};
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// The instrumented operations of one update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Probe,
    Resolve,
    Update,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Probe => "probe",
            Op::Resolve => "resolve",
            Op::Update => "update",
        }
    }
}

/// Receiver for everything the agent reports.
pub trait MetricsSink: Send + Sync {
    /// Duration of one operation, whether it succeeded or not.
    fn observe_op(&self, op: Op, domain: &str, success: bool, elapsed: Duration);

    /// A completed operation. `status` is the provider status for updates.
    fn op_succeeded(&self, op: Op, domain: &str, status: Option<&str>);

    /// A failed operation, labeled with a short reason.
    fn op_failed(&self, op: Op, domain: &str, reason: &str);

    /// The provider confirmed `ip` for `domain`.
    fn current_ip(&self, domain: &str, ip: IpAddr);

    /// The provider accepted a new address for `domain` just now.
    fn last_updated(&self, domain: &str);

    /// One outgoing HTTP request. `code` is `None` when no response arrived.
    fn http_request(&self, url: &str, method: &str, code: Option<u16>, elapsed: Duration);
}

/// Measures one operation and reports its duration when finished.
pub struct OpTimer<'a> {
    sink: &'a dyn MetricsSink,
    op: Op,
    domain: &'a str,
    start: Instant,
}

impl<'a> OpTimer<'a> {
    pub fn start(sink: &'a dyn MetricsSink, op: Op, domain: &'a str) -> Self {
        Self {
            sink,
            op,
            domain,
            start: Instant::now(),
        }
    }

    /// Report the duration only.
    pub fn observe(self, success: bool) {
        self.sink
            .observe_op(self.op, self.domain, success, self.start.elapsed());
    }

    /// Report the duration, plus the failure counter for errors.
    pub fn finish<T>(self, result: &Result<T>) {
        let (sink, op, domain) = (self.sink, self.op, self.domain);
        self.observe(result.is_ok());
        if let Err(e) = result {
            sink.op_failed(op, domain, &e.reason());
        }
    }
}

/// Forwards to the `metrics` facade, i.e. whichever recorder is installed.
#[derive(Debug, Clone, Default)]
pub struct PrometheusMetrics;

impl PrometheusMetrics {
    /// Register metric descriptions and the build info gauge.
    pub fn new() -> Self {
        metrics::describe_histogram!("ipupdater_op_duration_seconds", Unit::Seconds, "Duration of probe, resolve and update operations.");
        metrics::describe_counter!("ipupdater_checks_total", Unit::Count, "The number of IP checks completed, labeled by domain.");
        metrics::describe_counter!("ipupdater_check_errors_total", Unit::Count, "The number of IP check errors, labeled by domain and reason.");
        metrics::describe_counter!("ipupdater_lookups_total", Unit::Count, "The number of DNS lookups completed, labeled by domain.");
        metrics::describe_counter!("ipupdater_lookup_errors_total", Unit::Count, "The number of DNS lookup errors, labeled by domain and reason.");
        metrics::describe_counter!("ipupdater_updates_total", Unit::Count, "The number of updates completed, labeled by domain and status.");
        metrics::describe_counter!("ipupdater_update_errors_total", Unit::Count, "The number of update errors, labeled by domain and status.");
        metrics::describe_gauge!("ipupdater_current_ip_info", "The current IP, labeled by domain and ip.");
        metrics::describe_gauge!("ipupdater_last_updated_seconds", Unit::Seconds, "The time the domain was last updated with a 'good' status.");
        metrics::describe_gauge!("ipupdater_build_info", "A metric with a constant '1' value labeled by the version ip-updater was built from.");
        metrics::describe_histogram!("httpclient_request_duration_seconds", Unit::Seconds, "Duration of outgoing HTTP requests.");

        metrics::gauge!("ipupdater_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

        Self
    }

    /// Install the Prometheus recorder and serve `/metrics` on `listen`.
    pub fn install(listen: SocketAddr) -> Result<Self> {
        PrometheusBuilder::new()
            .with_http_listener(listen)
            .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), DURATION_BUCKETS)
            .map_err(|e| DdnsError::Config(format!("invalid metrics buckets: {}", e)))?
            .install()
            .map_err(|e| DdnsError::Config(format!("failed to start metrics exporter on {}: {}", listen, e)))?;

        tracing::info!("Serving Prometheus metrics on http://{}/metrics", listen);

        Ok(Self::new())
    }
}

impl MetricsSink for PrometheusMetrics {
    fn observe_op(&self, op: Op, domain: &str, success: bool, elapsed: Duration) {
        metrics::histogram!(
            "ipupdater_op_duration_seconds",
            "op" => op.as_str(),
            "domain" => domain.to_string(),
            "success" => success.to_string()
        )
        .record(elapsed.as_secs_f64());
    }

    fn op_succeeded(&self, op: Op, domain: &str, status: Option<&str>) {
        let domain = domain.to_string();
        match op {
            Op::Probe => metrics::counter!("ipupdater_checks_total", "domain" => domain).increment(1),
            Op::Resolve => metrics::counter!("ipupdater_lookups_total", "domain" => domain).increment(1),
            Op::Update => metrics::counter!(
                "ipupdater_updates_total",
                "domain" => domain,
                "status" => status.unwrap_or_default().to_string()
            )
            .increment(1),
        }
    }

    fn op_failed(&self, op: Op, domain: &str, reason: &str) {
        let domain = domain.to_string();
        let reason = reason.to_string();
        match op {
            Op::Probe => metrics::counter!("ipupdater_check_errors_total", "domain" => domain, "reason" => reason).increment(1),
            Op::Resolve => metrics::counter!("ipupdater_lookup_errors_total", "domain" => domain, "reason" => reason).increment(1),
            Op::Update => metrics::counter!("ipupdater_update_errors_total", "domain" => domain, "status" => reason).increment(1),
        }
    }

    fn current_ip(&self, domain: &str, ip: IpAddr) {
        metrics::gauge!(
            "ipupdater_current_ip_info",
            "domain" => domain.to_string(),
            "ip" => ip.to_string()
        )
        .set(1.0);
    }

    fn last_updated(&self, domain: &str) {
        metrics::gauge!("ipupdater_last_updated_seconds", "domain" => domain.to_string())
            .set(chrono::Utc::now().timestamp() as f64);
    }

    fn http_request(&self, url: &str, method: &str, code: Option<u16>, elapsed: Duration) {
        let code = code.map(|c| c.to_string()).unwrap_or_else(|| "error".to_string());
        metrics::histogram!(
            "httpclient_request_duration_seconds",
            "url" => url.to_string(),
            "code" => code,
            "method" => method.to_string()
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Discards everything.
#[derive(Debug, Clone, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn observe_op(&self, _op: Op, _domain: &str, _success: bool, _elapsed: Duration) {}
    fn op_succeeded(&self, _op: Op, _domain: &str, _status: Option<&str>) {}
    fn op_failed(&self, _op: Op, _domain: &str, _reason: &str) {}
    fn current_ip(&self, _domain: &str, _ip: IpAddr) {}
    fn last_updated(&self, _domain: &str) {}
    fn http_request(&self, _url: &str, _method: &str, _code: Option<u16>, _elapsed: Duration) {}
}

/// Shorthand for a sink that records nothing.
pub fn noop() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetrics)
}
