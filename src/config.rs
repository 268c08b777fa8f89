//! Configuration management for ip-updater.

use crate::detector::DEFAULT_CHECK_IP_URL;
use crate::error::{DdnsError, Result};
use crate::update::DEFAULT_ENDPOINT;
use crate::updater::UpdaterState;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Check interval in seconds (default: 300 = 5 minutes).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// IP-echo service used to detect the public address.
    #[serde(default = "default_check_ip_url")]
    pub check_ip_url: String,

    /// Wait after a server-side provider error, in seconds.
    #[serde(default = "default_backoff")]
    pub server_error_backoff_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// DNS resolver settings.
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Managed hostnames.
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

fn default_interval() -> u64 {
    300
}

fn default_check_ip_url() -> String {
    DEFAULT_CHECK_IP_URL.to_string()
}

fn default_backoff() -> u64 {
    3
}

fn default_request_timeout() -> u64 {
    10
}

/// One hostname kept up to date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Fully-qualified hostname (e.g., "home.example.com").
    pub hostname: String,

    /// Dynamic DNS key (or environment variable name if prefixed with $).
    pub api_key: String,

    /// Update endpoint (default: Hurricane Electric).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Force the address instead of letting the provider use the source IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Whether to serve Prometheus metrics.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen address for `/metrics`.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

fn default_true() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_metrics_listen(),
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Nameserver as `ip:port`; the system configuration is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameserver: Option<String>,

    /// Query timeout in milliseconds.
    #[serde(default = "default_resolver_timeout")]
    pub timeout_ms: u64,
}

fn default_resolver_timeout() -> u64 {
    5000
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            nameserver: None,
            timeout_ms: default_resolver_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            check_ip_url: default_check_ip_url(),
            server_error_backoff_secs: default_backoff(),
            request_timeout_secs: default_request_timeout(),
            metrics: MetricsSettings::default(),
            resolver: ResolverSettings::default(),
            domains: Vec::new(),
        }
    }
}

/// Command-line values layered over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub domain: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub ip: Option<IpAddr>,
    pub interval_secs: Option<u64>,
    pub no_metrics: bool,
    pub metrics_listen: Option<SocketAddr>,
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DdnsError::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("ip-updater").join("config.toml"))
    }

    /// Find the config file: the explicit path, then the usual locations.
    pub fn discover(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }

        let candidates = [
            Self::default_path().ok(),
            Some(PathBuf::from("/etc/ip-updater/config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        candidates
            .into_iter()
            .flatten()
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Load configuration from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply command-line overrides. `--domain` adds a domain entry.
    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(hostname) = overrides.domain {
            let api_key = overrides.api_key.ok_or_else(|| {
                DdnsError::Config(format!("--key is required with --domain {}", hostname))
            })?;
            self.domains.push(DomainConfig {
                hostname,
                api_key,
                endpoint: overrides.endpoint.unwrap_or_else(default_endpoint),
                ip: overrides.ip,
            });
        } else if overrides.api_key.is_some() || overrides.endpoint.is_some() || overrides.ip.is_some() {
            return Err(DdnsError::Config(
                "--key, --endpoint and --ip require --domain".to_string(),
            ));
        }

        if let Some(interval) = overrides.interval_secs {
            self.interval_secs = interval;
        }
        if overrides.no_metrics {
            self.metrics.enabled = false;
        }
        if let Some(listen) = overrides.metrics_listen {
            self.metrics.listen = listen;
        }

        Ok(())
    }

    /// Check everything a running agent depends on.
    pub fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(DdnsError::Config(
                "no domains configured (use --domain or a [[domains]] table)".to_string(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(DdnsError::Config("interval_secs must be positive".to_string()));
        }
        reqwest::Url::parse(&self.check_ip_url)
            .map_err(|e| DdnsError::Config(format!("invalid check_ip_url: {}", e)))?;

        for domain in &self.domains {
            domain.validate()?;
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn server_error_backoff(&self) -> Duration {
        Duration::from_secs(self.server_error_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Generate example configuration.
    pub fn example() -> Self {
        Self {
            domains: vec![DomainConfig {
                hostname: "home.example.com".to_string(),
                api_key: "$HE_DDNS_KEY".to_string(),
                endpoint: default_endpoint(),
                ip: None,
            }],
            resolver: ResolverSettings {
                nameserver: Some("1.1.1.1:53".to_string()),
                ..ResolverSettings::default()
            },
            ..Self::default()
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl DomainConfig {
    fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(DdnsError::Config("hostname is empty".to_string()));
        }
        if self.api_key().is_empty() {
            return Err(DdnsError::Config(format!("api_key for {} is empty", self.hostname)));
        }
        reqwest::Url::parse(&self.endpoint).map_err(|e| {
            DdnsError::Config(format!("invalid endpoint for {}: {}", self.hostname, e))
        })?;
        Ok(())
    }

    /// The key with environment references resolved.
    pub fn api_key(&self) -> String {
        resolve_env(&self.api_key)
    }

    /// Initial loop state for this hostname.
    pub fn state(&self) -> UpdaterState {
        UpdaterState::new(self.hostname.clone(), self.api_key(), self.endpoint.clone())
            .with_ip(self.ip)
    }
}

/// Resolve environment variable references (values starting with $).
fn resolve_env(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!("Environment variable {} not set", var_name);
            String::new()
        })
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert_eq!(config.server_error_backoff(), Duration::from_secs(3));
        assert_eq!(config.check_ip_url, "https://checkip.amazonaws.com");
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen.port(), 8080);
        assert!(config.domains.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            interval_secs = 60

            [metrics]
            enabled = false

            [resolver]
            nameserver = "9.9.9.9:53"

            [[domains]]
            hostname = "home.example.com"
            api_key = "plain-key"
            ip = "203.0.113.5"

            [[domains]]
            hostname = "vpn.example.com"
            api_key = "other"
            endpoint = "https://ddns.example.net/nic/update"
            "#,
        )
        .unwrap();

        assert_eq!(config.interval_secs, 60);
        assert!(!config.metrics.enabled);
        assert_eq!(config.resolver.nameserver.as_deref(), Some("9.9.9.9:53"));
        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.domains[0].endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.domains[0].ip, Some("203.0.113.5".parse().unwrap()));
        assert!(config.validate().is_ok());

        let state = config.domains[0].state();
        assert_eq!(state.domain(), "home.example.com");
        assert_eq!(state.last_known_ip(), Some("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(Path::new("/nonexistent/ip-updater.toml")).unwrap();
        assert_eq!(config.interval_secs, 300);
    }

    #[test]
    fn test_overrides_add_domain() {
        let mut config = Config::default();
        config
            .apply(Overrides {
                domain: Some("home.example.com".to_string()),
                api_key: Some("key".to_string()),
                ip: Some("203.0.113.5".parse().unwrap()),
                interval_secs: Some(30),
                no_metrics: true,
                ..Overrides::default()
            })
            .unwrap();

        assert_eq!(config.domains.len(), 1);
        assert_eq!(config.domains[0].endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.interval_secs, 30);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_require_key() {
        let mut config = Config::default();
        let result = config.apply(Overrides {
            domain: Some("home.example.com".to_string()),
            ..Overrides::default()
        });
        assert!(matches!(result, Err(DdnsError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(Config::default().validate().is_err());

        let mut config = Config::example();
        config.domains[0].api_key = "key".to_string();
        config.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.domains[0].api_key = "key".to_string();
        config.domains[0].endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.domains[0].api_key = "".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_round_trips_through_toml() {
        let rendered = Config::example().to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.domains[0].hostname, "home.example.com");
    }

    #[test]
    fn test_resolve_env_with_value() {
        assert_eq!(resolve_env("plain_value"), "plain_value");
    }

    #[test]
    fn test_resolve_env_with_existing_var() {
        std::env::set_var("TEST_IP_UPDATER_VAR", "resolved_value");
        assert_eq!(resolve_env("$TEST_IP_UPDATER_VAR"), "resolved_value");
        std::env::remove_var("TEST_IP_UPDATER_VAR");
    }

    #[test]
    fn test_resolve_env_with_missing_var() {
        assert_eq!(resolve_env("$NONEXISTENT_VAR_12345"), "");
    }
}
