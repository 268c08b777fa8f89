//! Error types for ip-updater.

use crate::update::StatusCode;
use std::net::IpAddr;
use thiserror::Error;

/// Result type alias for ip-updater.
pub type Result<T> = std::result::Result<T, DdnsError>;

/// DDNS error types.
#[derive(Error, Debug)]
pub enum DdnsError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP transport error.
    #[error("Network error: {0}")]
    Network(String),

    /// A request completed with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Public IP detection error.
    #[error("IP detection failed: {0}")]
    Probe(String),

    /// DNS lookup error.
    #[error("DNS lookup failed: {0}")]
    Resolve(String),

    /// The update provider broke its response contract.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The provider rejected the request for a reason the caller must fix.
    #[error("client error for {domain}: {status}")]
    ClientFailure { domain: String, status: StatusCode },

    /// The provider is temporarily unable to process updates.
    #[error("server error for {domain}: {status}")]
    ServerFailure { domain: String, status: StatusCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Violations of the update provider's response grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unexpected status {0:?}")]
    UnknownStatus(String),

    #[error("malformed response body: {0} without an IP address")]
    MissingIp(StatusCode),

    #[error("malformed response body: {status} {value:?} is not an IP address")]
    InvalidIp { status: StatusCode, value: String },

    #[error("unexpected IP on remote end: {remote} - expected {expected}")]
    UnexpectedIp { remote: IpAddr, expected: IpAddr },
}

impl DdnsError {
    /// Whether the update loop must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DdnsError::ClientFailure { .. })
    }

    /// Short label used as the `reason`/`status` value on error counters.
    pub fn reason(&self) -> String {
        match self {
            DdnsError::Config(_) => "config".to_string(),
            DdnsError::Network(_) => "network".to_string(),
            DdnsError::HttpStatus { status, .. } => status.to_string(),
            DdnsError::Probe(_) => "invalidip".to_string(),
            DdnsError::Resolve(_) => "lookupfailed".to_string(),
            DdnsError::Protocol(e) => e.reason().to_string(),
            DdnsError::ClientFailure { status, .. } | DdnsError::ServerFailure { status, .. } => {
                status.as_str().to_string()
            }
            DdnsError::Io(_) => "io".to_string(),
            DdnsError::Serialization(_) => "serialization".to_string(),
        }
    }
}

impl ProtocolError {
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::UnknownStatus(_) => "protocol_unknown_status",
            ProtocolError::MissingIp(_) => "protocol_missing_ip",
            ProtocolError::InvalidIp { .. } => "protocol_invalid_ip",
            ProtocolError::UnexpectedIp { .. } => "protocol_unexpected_ip",
        }
    }
}

impl From<reqwest::Error> for DdnsError {
    fn from(e: reqwest::Error) -> Self {
        DdnsError::Network(e.to_string())
    }
}

impl From<toml::de::Error> for DdnsError {
    fn from(e: toml::de::Error) -> Self {
        DdnsError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for DdnsError {
    fn from(e: toml::ser::Error) -> Self {
        DdnsError::Serialization(e.to_string())
    }
}
