//! The update loop.
//!
//! Every tick the loop probes the public address, resolves the hostname and
//! compares both with the address the provider last confirmed. Any mismatch
//! triggers an update request. The provider's answer decides what happens
//! next: carry on, back off for a while, or stop for good.

use crate::detector::AddressProbe;
use crate::error::{DdnsError, Result};
use crate::resolver::NameResolver;
use crate::update::{UpdateApi, UpdateOutcome};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// Default time between checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Default wait after the provider reports a server-side error.
pub const DEFAULT_SERVER_ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// Everything the loop knows about one managed hostname.
#[derive(Clone)]
pub struct UpdaterState {
    domain: String,
    api_key: String,
    endpoint: String,
    last_known_ip: Option<IpAddr>,
}

impl UpdaterState {
    pub fn new(domain: String, api_key: String, endpoint: String) -> Self {
        Self {
            domain,
            api_key,
            endpoint,
            last_known_ip: None,
        }
    }

    /// Seed the last known address, e.g. from a pinned configuration value.
    pub fn with_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.last_known_ip = ip;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The address the provider last confirmed, if any.
    pub fn last_known_ip(&self) -> Option<IpAddr> {
        self.last_known_ip
    }
}

impl fmt::Debug for UpdaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterState")
            .field("domain", &self.domain)
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("last_known_ip", &self.last_known_ip)
            .finish()
    }
}

/// Whether the provider must be told about the current address.
///
/// Covers both the ISP handing out a new address and the published record
/// drifting away from what was last set.
pub fn needs_update(last_known: Option<IpAddr>, probed: IpAddr, resolved: IpAddr) -> bool {
    match last_known {
        None => true,
        Some(last) => last != probed || resolved != probed,
    }
}

/// What the loop does after a tick.
#[derive(Debug)]
enum Step {
    Idle,
    Backoff,
    Terminate(DdnsError),
}

/// Drives probe, resolve and update for one hostname.
pub struct Updater {
    state: UpdaterState,
    prober: Arc<dyn AddressProbe>,
    resolver: Arc<dyn NameResolver>,
    client: Arc<dyn UpdateApi>,
    interval: Duration,
    backoff: Duration,
}

impl Updater {
    pub fn new(
        state: UpdaterState,
        prober: Arc<dyn AddressProbe>,
        resolver: Arc<dyn NameResolver>,
        client: Arc<dyn UpdateApi>,
    ) -> Self {
        Self {
            state,
            prober,
            resolver,
            client,
            interval: DEFAULT_INTERVAL,
            backoff: DEFAULT_SERVER_ERROR_BACKOFF,
        }
    }

    /// Set the time between checks. Must be non-zero.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the wait after a server-side provider error.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> &UpdaterState {
        &self.state
    }

    /// Submit a single update without probing first.
    ///
    /// Client and server failures both come back as errors. The last known
    /// address only changes when the provider confirms one.
    pub async fn update_once(&mut self) -> Result<UpdateOutcome> {
        let outcome = self.client.update(&self.state).await?;

        match outcome {
            UpdateOutcome::Good(ip) | UpdateOutcome::NoChange(ip) => {
                tracing::info!(
                    domain = self.state.domain(),
                    status = %outcome.status(),
                    "Provider confirmed {}",
                    ip
                );
                self.state.last_known_ip = Some(ip);
                Ok(outcome)
            }
            UpdateOutcome::ClientFailure(status) => Err(DdnsError::ClientFailure {
                domain: self.state.domain.clone(),
                status,
            }),
            UpdateOutcome::ServerFailure(status) => Err(DdnsError::ServerFailure {
                domain: self.state.domain.clone(),
                status,
            }),
        }
    }

    async fn tick(&mut self) -> Step {
        let probed = match self.prober.probe().await {
            Ok(ip) => ip,
            Err(_) => return Step::Idle,
        };

        let resolved = match self.resolver.resolve(&self.state.domain).await {
            Ok(ip) => ip,
            Err(_) => return Step::Idle,
        };

        let last_known = self.state.last_known_ip;
        if !needs_update(last_known, probed, resolved) {
            tracing::debug!(
                domain = self.state.domain(),
                %probed,
                %resolved,
                ?last_known,
                "Addresses agree, nothing to do"
            );
            return Step::Idle;
        }

        tracing::debug!(
            domain = self.state.domain(),
            %probed,
            %resolved,
            ?last_known,
            "Address drift detected, updating"
        );

        match self.update_once().await {
            Ok(_) => Step::Idle,
            Err(e) if e.is_fatal() => Step::Terminate(e),
            Err(e @ DdnsError::ServerFailure { .. }) => {
                tracing::warn!("{}", e);
                Step::Backoff
            }
            // Already logged and counted by the client; retried next tick.
            Err(_) => Step::Idle,
        }
    }

    /// Run until `shutdown` fires or the provider rejects us permanently.
    ///
    /// The first check happens immediately. Shutdown is observed while
    /// waiting for the next tick, during backoff and during in-flight
    /// requests, and always ends the loop with `Ok(())`.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<()>) -> Result<()> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Watching {} every {}s",
            self.state.domain,
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let step = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                step = self.tick() => step,
            };

            match step {
                Step::Idle => {}
                Step::Backoff => {
                    tracing::info!(
                        "Backing off {}s before the next check of {}",
                        self.backoff.as_secs(),
                        self.state.domain
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = time::sleep(self.backoff) => {}
                    }
                }
                Step::Terminate(e) => {
                    tracing::error!("Giving up on {}: {}", self.state.domain, e);
                    return Err(e);
                }
            }
        }

        tracing::info!("Stopped watching {}", self.state.domain);
        Ok(())
    }
}
