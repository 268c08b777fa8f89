//! ip-updater - keeps a dynamic DNS hostname pointed at this host.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ip_updater::config::{Config, DomainConfig, Overrides};
use ip_updater::detector::{AddressProbe, IpDetector};
use ip_updater::http::HttpClient;
use ip_updater::metrics::{self, MetricsSink, PrometheusMetrics};
use ip_updater::resolver::{DnsResolver, NameResolver};
use ip_updater::update::{DynUpdateClient, UpdateApi};
use ip_updater::updater::Updater;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ip-updater")]
#[command(about = "Periodically updates a dynamic DNS hostname with this host's public IP")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Domain to update the IP for (adds to the configured domains)
    #[arg(short, long, global = true)]
    domain: Option<String>,

    /// API key for --domain (or $ENV_VAR)
    #[arg(short, long, global = true)]
    key: Option<String>,

    /// Dynamic DNS update URL for --domain
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// Force the IP address for --domain instead of autodetecting it
    #[arg(long, global = true)]
    ip: Option<IpAddr>,

    /// Check interval in seconds
    #[arg(short, long, global = true)]
    interval: Option<u64>,

    /// Disable the Prometheus metrics endpoint
    #[arg(long, global = true)]
    no_metrics: bool,

    /// Address to serve Prometheus metrics on
    #[arg(long, global = true)]
    metrics_listen: Option<SocketAddr>,

    /// Output extra logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep every configured domain up to date until interrupted
    Run,

    /// Send one update per domain and exit
    Update,

    /// Show the public IP and the published IP of every domain
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration
    Validate,

    /// Print an example configuration file
    Example,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            domain: self.domain.clone(),
            api_key: self.key.clone(),
            endpoint: self.endpoint.clone(),
            ip: self.ip,
            interval_secs: self.interval,
            no_metrics: self.no_metrics,
            metrics_listen: self.metrics_listen,
        }
    }
}

/// Shared pieces every per-domain loop is built from.
struct Components {
    http: HttpClient,
    resolver: Arc<dyn NameResolver>,
    client: Arc<dyn UpdateApi>,
    metrics: Arc<dyn MetricsSink>,
}

impl Components {
    fn new(config: &Config, metrics: Arc<dyn MetricsSink>) -> anyhow::Result<Self> {
        let http = HttpClient::new(config.request_timeout(), metrics.clone())?;
        let resolver = Arc::new(DnsResolver::from_settings(&config.resolver, metrics.clone())?);
        let client = Arc::new(DynUpdateClient::new(http.clone(), metrics.clone()));

        Ok(Self {
            http,
            resolver,
            client,
            metrics,
        })
    }

    fn detector(&self, config: &Config, label: &str) -> IpDetector {
        IpDetector::with_url(
            self.http.clone(),
            config.check_ip_url.clone(),
            label.to_string(),
            self.metrics.clone(),
        )
    }

    fn updater(&self, config: &Config, domain: &DomainConfig) -> Updater {
        Updater::new(
            domain.state(),
            Arc::new(self.detector(config, &domain.hostname)),
            self.resolver.clone(),
            self.client.clone(),
        )
        .with_interval(config.interval())
        .with_backoff(config.server_error_backoff())
    }
}

/// Sets up the tracing subscriber for logging.
fn setup_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config_path = Config::discover(cli.config.clone());
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.apply(cli.overrides())?;

    match cli.command {
        Commands::Run => cmd_run(config).await?,
        Commands::Update => cmd_update(config).await?,
        Commands::Status { json } => cmd_status(config, json).await?,
        Commands::Validate => cmd_validate(config)?,
        Commands::Example => print!("{}", Config::example().to_toml()?),
    }

    Ok(())
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let sink: Arc<dyn MetricsSink> = if config.metrics.enabled {
        Arc::new(PrometheusMetrics::install(config.metrics.listen)?)
    } else {
        metrics::noop()
    };
    let components = Components::new(&config, sink)?;

    tracing::info!(
        "Starting ip-updater for {} domain(s) (interval: {}s)",
        config.domains.len(),
        config.interval_secs
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let mut tasks = JoinSet::new();
    for domain in &config.domains {
        let mut updater = components.updater(&config, domain);
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move { updater.run(shutdown).await });
    }
    drop(shutdown_rx);

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            // Already logged by the loop.
            Ok(Err(_)) => failures += 1,
            Err(e) => {
                tracing::error!("Updater task failed: {}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} domain(s) stopped with an error", failures);
    }

    Ok(())
}

async fn cmd_update(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let components = Components::new(&config, metrics::noop())?;
    let mut failures = 0;

    for domain in &config.domains {
        let mut updater = components.updater(&config, domain);

        print!("Updating {}... ", domain.hostname);

        match updater.update_once().await {
            Ok(outcome) => match outcome.confirmed_ip() {
                Some(ip) => println!("{} ({})", outcome.status(), ip),
                None => println!("{}", outcome.status()),
            },
            Err(e) => {
                println!("ERROR: {}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} update(s) failed", failures);
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    current_ip: Option<String>,
    domains: Vec<DomainStatus>,
}

#[derive(Debug, Serialize)]
struct DomainStatus {
    hostname: String,
    published_ip: Option<String>,
    pinned_ip: Option<String>,
    in_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn cmd_status(config: Config, json: bool) -> anyhow::Result<()> {
    let components = Components::new(&config, metrics::noop())?;

    let current_ip = match components.detector(&config, "status").probe().await {
        Ok(ip) => Some(ip),
        Err(e) => {
            if !json {
                println!("Failed to detect IP: {}", e);
            }
            None
        }
    };

    let mut domains = Vec::new();
    for domain in &config.domains {
        let (published_ip, error) = match components.resolver.resolve(&domain.hostname).await {
            Ok(ip) => (Some(ip), None),
            Err(e) => (None, Some(e.to_string())),
        };

        domains.push(DomainStatus {
            hostname: domain.hostname.clone(),
            published_ip: published_ip.map(|ip| ip.to_string()),
            pinned_ip: domain.ip.map(|ip| ip.to_string()),
            in_sync: published_ip.is_some() && published_ip == current_ip,
            error,
        });
    }

    let response = StatusResponse {
        current_ip: current_ip.map(|ip| ip.to_string()),
        domains,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("ip-updater Status");
    println!("=================\n");

    if let Some(ip) = &response.current_ip {
        println!("Current Public IP: {}", ip);
    }

    println!("\nDomains:");
    println!("--------");

    for domain in &response.domains {
        match (&domain.published_ip, &domain.error) {
            (Some(ip), _) => println!(
                "  {}: {}{}",
                domain.hostname,
                ip,
                if domain.in_sync { "" } else { " (out of date)" }
            ),
            (None, Some(e)) => println!("  {}: error: {}", domain.hostname, e),
            (None, None) => println!("  {}: (no record)", domain.hostname),
        }
    }

    Ok(())
}

fn cmd_validate(config: Config) -> anyhow::Result<()> {
    println!("Validating configuration...\n");

    if let Err(e) = config.validate() {
        println!("FAILED - {}", e);
        anyhow::bail!("configuration is invalid");
    }

    for domain in &config.domains {
        println!("  {} ({}): OK", domain.hostname, domain.endpoint);
    }

    println!("\nConfiguration is valid.");

    Ok(())
}

/// Returns a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
