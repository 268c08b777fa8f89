//! # ip-updater
//!
//! A dynamic DNS update agent. It periodically compares the host's public IP
//! with the address published in DNS and the address last confirmed by the
//! update provider, and submits an update whenever they drift apart.
//!
//! ## Features
//!
//! - Public IP detection through an IP-echo service
//! - DNS lookups through the system resolver configuration
//! - dyndns2-style updates (Hurricane Electric by default)
//! - Provider status codes drive the failure policy: permanent errors stop the
//!   agent, transient ones back off
//! - Prometheus metrics
//!
//! ## Usage
//!
//! ```bash
//! # Keep a hostname up to date
//! ip-updater -d home.example.com -k "$HE_DDNS_KEY" run
//!
//! # Update once and exit
//! ip-updater -d home.example.com -k "$HE_DDNS_KEY" update
//!
//! # Show public and published addresses
//! ip-updater status
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod http;
pub mod metrics;
pub mod resolver;
pub mod update;
pub mod updater;

pub use config::Config;
pub use detector::IpDetector;
pub use error::{DdnsError, Result};
pub use updater::{Updater, UpdaterState};
