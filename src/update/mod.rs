//! Dynamic DNS update requests.

mod client;
mod status;

#[cfg(test)]
mod tests;

pub use client::{DynUpdateClient, DEFAULT_ENDPOINT};
pub use status::{parse_body, StatusClass, StatusCode, UpdateOutcome};

use crate::error::Result;
use crate::updater::UpdaterState;
use async_trait::async_trait;

/// Submits updates to the dynamic DNS provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpdateApi: Send + Sync {
    /// Submit one update for `state.domain()`.
    ///
    /// `Ok` carries the classified provider answer, including client and
    /// server failures. `Err` means the provider never produced a usable
    /// answer: transport failures, non-2xx responses and protocol errors.
    async fn update(&self, state: &UpdaterState) -> Result<UpdateOutcome>;
}
