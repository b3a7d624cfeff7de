//! Remote Telemetry Source Connectors
//!
//! ## Overview
//!
//! The refresh pipeline pulls sensor states from a remote home-automation
//! server. Everything it needs from that server fits in two calls:
//!
//! - `validate()`: is the server reachable and does it accept our credentials
//! - `fetch_states(ids)`: current state of the requested entities
//!
//! The [`TelemetrySource`] trait captures exactly that, so the orchestrator can
//! be driven by the HTTP client in production and by a scripted source in
//! tests.
//!
//! ## Failure Semantics
//!
//! Neither call returns an error. Validation reports an [`ApiStatus`] and only
//! [`ApiStatus::Ok`] counts as valid; a failed fetch yields an empty map and a
//! logged error. The caller treats "no states" as a failed cycle and tries
//! again on the next tick.
//!
//! ### Retry Logic
//!
//! Exponential backoff on transport errors, 5xx and 429:
//! ```text
//! retry_delay = 100ms * 2^attempt
//! ```
//!
//! ## Handles
//!
//! Once validated, the connection parameters are cached as a
//! [`RemoteHandle`](psychrocam_core::RemoteHandle). Any worker process turns a
//! cached handle back into a live source through a [`SourceFactory`].
//!
//! ## Example Usage
//!
//! ```no_run
//! use psychrocam_connectors::{homeassistant::{HaClient, HaConfig}, TelemetrySource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HaClient::new(
//!     HaConfig::new("http://hass.local").port(8123).password("secret").timeout_secs(10),
//! )?;
//!
//! if client.validate().await.is_valid() {
//!     let ids = vec!["sensor.livingroom_temperature".to_string()];
//!     let states = client.fetch_states(&ids).await;
//!     println!("{} states", states.len());
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "http")]
pub mod homeassistant;

// Re-export common types
#[cfg(feature = "http")]
pub use homeassistant::{HaClient, HaConfig, HaSourceFactory, HttpError};

use psychrocam_core::{RemoteHandle, States};
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Outcome of a remote API validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    /// Reachable and credentials accepted
    Ok,
    /// Reachable, credentials rejected
    InvalidPassword,
    /// Reachable, unexpected answer
    Unknown,
    /// Unreachable
    CannotConnect,
}

impl ApiStatus {
    /// Only a fully accepted connection counts as valid
    pub fn is_valid(self) -> bool {
        self == Self::Ok
    }
}

impl std::fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::InvalidPassword => "invalid_password",
            Self::Unknown => "unknown",
            Self::CannotConnect => "cannot_connect",
        };
        f.write_str(text)
    }
}

/// Remote source of entity states
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Check reachability and credentials
    async fn validate(&self) -> ApiStatus;

    /// Current states of `entity_ids`; empty on any failure
    async fn fetch_states(&self, entity_ids: &[String]) -> States;

    /// Request statistics
    fn stats(&self) -> ConnectionStats;
}

/// Builds live sources from cached handles
pub trait SourceFactory: Send + Sync {
    /// Open a source for `handle`
    fn connect(&self, handle: &RemoteHandle) -> Result<Box<dyn TelemetrySource>, ConnectorError>;
}

/// Request statistics common to all connectors
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Requests answered successfully
    pub requests_ok: u64,
    /// Requests that failed after retries
    pub requests_failed: u64,
    /// Total response bytes received
    pub bytes_received: u64,
    /// Number of retried attempts
    pub retries: u32,
    /// Last error message
    pub last_error: Option<String>,
}
