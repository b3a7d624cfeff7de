//! Home Assistant HTTP Connector
//!
//! ## Overview
//!
//! Talks to the Home Assistant REST API with the lightweight `ureq` client.
//! Only two endpoints are used:
//!
//! | Call              | Endpoint           | Result                              |
//! |-------------------|--------------------|-------------------------------------|
//! | `validate()`      | `GET /api/`        | 200 ok, 401 invalid password, ...   |
//! | `fetch_states()`  | `GET /api/states`  | every entity; filtered to requested |
//!
//! ## Authentication
//!
//! The legacy API password travels in the `X-HA-access` header on every
//! request. No password means no header.
//!
//! ## Blocking I/O
//!
//! `ureq` is synchronous. Each request runs on the blocking thread pool so an
//! async caller never stalls its executor while the remote answers.
//!
//! ## Example Usage
//!
//! ```no_run
//! use psychrocam_connectors::homeassistant::{HaClient, HaConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HaConfig::new("hass.local")
//!     .port(8123)
//!     .password("api-password")
//!     .timeout_secs(10);
//!
//! let client = HaClient::new(config)?;
//! let wanted = vec!["sensor.livingroom_temperature".to_string()];
//! let states = client.states_for(&wanted).await?;
//! println!("{} entities", states.len());
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use psychrocam_core::{EntityState, RemoteHandle, States};
use serde::Deserialize;
use thiserror::Error;

use crate::{ApiStatus, ConnectionStats, ConnectorError, SourceFactory, TelemetrySource};

/// Header carrying the legacy API password
pub const PASSWORD_HEADER: &str = "X-HA-access";

/// HTTP-specific errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<HttpError> for ConnectorError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Config(msg) => ConnectorError::ConfigError(msg),
            HttpError::Request(msg) if msg.contains("timed out") => ConnectorError::Timeout,
            HttpError::Request(_) => ConnectorError::NotConnected,
            other => ConnectorError::ProtocolError(other.to_string()),
        }
    }
}

/// Home Assistant connection configuration
#[derive(Clone, Debug)]
pub struct HaConfig {
    /// Host, with or without an `http://`/`https://` scheme
    pub host: String,
    /// Port appended to the host, if any
    pub port: Option<u16>,
    /// Use https for hosts without a scheme
    pub use_ssl: bool,
    /// Legacy API password
    pub password: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// User agent string
    pub user_agent: String,
}

impl HaConfig {
    /// Create new configuration for `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            use_ssl: false,
            password: None,
            timeout: Duration::from_secs(10),
            max_retries: 2,
            user_agent: format!("Psychrocam/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Configuration equivalent to a cached handle
    pub fn from_handle(handle: &RemoteHandle) -> Self {
        let mut config = Self::new(handle.base_url.clone());
        config.password = handle.api_password.clone();
        config
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Use https when the host has no scheme
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Set the API password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Set the number of retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Base URL: hosts with a scheme are kept, others get one from `use_ssl`
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let mut url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else if self.use_ssl {
            format!("https://{host}")
        } else {
            format!("http://{host}")
        };
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        url
    }
}

/// One entity as returned by `GET /api/states`
#[derive(Debug, Deserialize)]
struct WireState {
    entity_id: String,
    state: serde_json::Value,
    last_changed: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl WireState {
    fn into_state(self) -> EntityState {
        let state = match self.state {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        };
        EntityState {
            entity_id: self.entity_id,
            state,
            last_changed: self.last_changed,
            last_updated: self.last_updated,
        }
    }
}

/// Parse a `/api/states` body, keeping only `wanted` entities
///
/// Entries that do not parse are skipped with a warning.
pub fn parse_states(body: &str, wanted: &[String]) -> Result<States, HttpError> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(|e| HttpError::Serialization(e.to_string()))?;

    let mut states = States::new();
    for entry in entries {
        let Some(entity_id) = entry.get("entity_id").and_then(|id| id.as_str()) else {
            continue;
        };
        if !wanted.iter().any(|id| id == entity_id) {
            continue;
        }
        let entity_id = entity_id.to_string();
        match serde_json::from_value::<WireState>(entry) {
            Ok(wire) => {
                states.insert(entity_id, wire.into_state());
            }
            Err(e) => warn!("Skipping malformed state of {entity_id}: {e}"),
        }
    }
    Ok(states)
}

/// Map the answer of `GET /api/` to a validation status
pub fn api_status(result: &Result<String, HttpError>) -> ApiStatus {
    match result {
        Ok(_) => ApiStatus::Ok,
        Err(HttpError::Auth(_)) => ApiStatus::InvalidPassword,
        Err(HttpError::Request(_)) => ApiStatus::CannotConnect,
        Err(_) => ApiStatus::Unknown,
    }
}

/// Raw answer of one blocking request
enum Answer {
    Body(String),
    Status(u16, String),
    Transport(String),
}

/// Home Assistant client using the lightweight ureq agent
pub struct HaClient {
    config: HaConfig,
    base_url: String,
    agent: ureq::Agent,
    stats: Arc<Mutex<ConnectionStats>>,
}

impl HaClient {
    /// Create a new client
    pub fn new(config: HaConfig) -> Result<Self, HttpError> {
        if config.host.trim().is_empty() {
            return Err(HttpError::Config("Host must not be empty".into()));
        }
        let base_url = config.base_url();

        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();

        Ok(Self {
            config,
            base_url,
            agent,
            stats: Arc::new(Mutex::new(ConnectionStats::default())),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check the API root
    pub async fn api_status(&self) -> ApiStatus {
        let result = self.get("/api/").await;
        if let Err(e) = &result {
            debug!("API validation against {} failed: {e}", self.base_url);
        }
        api_status(&result)
    }

    /// States of the requested entities only
    pub async fn states_for(&self, entity_ids: &[String]) -> Result<States, HttpError> {
        let body = self.get("/api/states").await?;
        parse_states(&body, entity_ids)
    }

    fn build_request(&self, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .agent
            .get(&url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json");
        if let Some(password) = &self.config.password {
            request = request.set(PASSWORD_HEADER, password);
        }
        request
    }

    fn record(&self, update: impl FnOnce(&mut ConnectionStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }

    /// Send GET request with retry logic
    async fn get(&self, path: &str) -> Result<String, HttpError> {
        let request = self.build_request(path);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (1 << attempt));
                tokio::time::sleep(delay).await;
                self.record(|stats| stats.retries += 1);
            }

            let call = request.clone();
            let answer = tokio::task::spawn_blocking(move || match call.call() {
                Ok(resp) => match resp.into_string() {
                    Ok(text) => Answer::Body(text),
                    Err(e) => Answer::Transport(e.to_string()),
                },
                Err(ureq::Error::Status(code, resp)) => {
                    Answer::Status(code, resp.into_string().unwrap_or_default())
                }
                Err(ureq::Error::Transport(e)) => Answer::Transport(e.to_string()),
            })
            .await
            .map_err(|e| HttpError::Request(format!("request task failed: {e}")))?;

            match answer {
                Answer::Body(text) => {
                    self.record(|stats| {
                        stats.requests_ok += 1;
                        stats.bytes_received += text.len() as u64;
                    });
                    return Ok(text);
                }
                Answer::Status(code, message) if code >= 500 || code == 429 => {
                    // Server error or rate limit - retry
                    last_error = Some(HttpError::ServerError { status: code, message });
                }
                Answer::Status(code, message) => {
                    // Client error - don't retry
                    // Only 401 means a wrong password; 403 and the rest are unknown
                    let err = if code == 401 {
                        HttpError::Auth(format!("status {code}"))
                    } else {
                        HttpError::ServerError { status: code, message }
                    };
                    self.fail(&err);
                    return Err(err);
                }
                Answer::Transport(message) => {
                    // Network error - retry
                    last_error = Some(HttpError::Request(message));
                }
            }
        }

        // All retries exhausted
        let err = last_error.unwrap_or_else(|| HttpError::Request("Unknown error".into()));
        self.fail(&err);
        Err(err)
    }

    fn fail(&self, err: &HttpError) {
        let message = err.to_string();
        self.record(|stats| {
            stats.requests_failed += 1;
            stats.last_error = Some(message);
        });
    }
}

#[async_trait::async_trait]
impl TelemetrySource for HaClient {
    async fn validate(&self) -> ApiStatus {
        self.api_status().await
    }

    async fn fetch_states(&self, entity_ids: &[String]) -> States {
        match self.states_for(entity_ids).await {
            Ok(states) => states,
            Err(e) => {
                error!("Cannot load states from {}: {e}", self.base_url);
                States::new()
            }
        }
    }

    fn stats(&self) -> ConnectionStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}

/// Opens [`HaClient`]s for cached handles
#[derive(Debug, Clone)]
pub struct HaSourceFactory {
    timeout: Duration,
    max_retries: u32,
}

impl HaSourceFactory {
    /// Factory whose clients use `timeout` per request
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 2,
        }
    }

    /// Set the number of retries of every client
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

impl Default for HaSourceFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl SourceFactory for HaSourceFactory {
    fn connect(&self, handle: &RemoteHandle) -> Result<Box<dyn TelemetrySource>, ConnectorError> {
        let mut config = HaConfig::from_handle(handle).max_retries(self.max_retries);
        config.timeout = self.timeout;
        let client = HaClient::new(config)?;
        Ok(Box::new(client))
    }
}
