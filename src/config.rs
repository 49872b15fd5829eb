//! Configuration management for telemetry-hub.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{BatchIntervals, LOAD_SHEDDING_INTERVAL, RESPONSIVE_INTERVAL};
use crate::cli::Args;
use crate::server::ServerConfig;
use crate::transport::MAX_FRAME_LEN;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerSection,
    /// Batch publication timing.
    pub batching: BatchingSection,
    /// Session registry behavior.
    pub registry: RegistrySection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Longest inbound frame accepted from an agent, in bytes.
    pub max_frame_len: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// Batching configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingSection {
    /// Interval after an idle tick, in milliseconds.
    pub responsive_interval_ms: u64,
    /// Interval after a tick that published session changes, in milliseconds.
    pub load_shedding_interval_ms: u64,
}

impl Default for BatchingSection {
    fn default() -> Self {
        Self {
            responsive_interval_ms: RESPONSIVE_INTERVAL.as_millis() as u64,
            load_shedding_interval_ms: LOAD_SHEDDING_INTERVAL.as_millis() as u64,
        }
    }
}

/// Registry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Whether first-time registrations start with sending enabled.
    pub send_enabled_on_register: bool,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            send_enabled_on_register: true,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("TELEMETRY_HUB_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("TELEMETRY_HUB_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(level) = std::env::var("TELEMETRY_HUB_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the server's runtime configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        if self.server.max_frame_len == 0 {
            return Err(ConfigError::InvalidFrameLimit);
        }

        let batching = &self.batching;
        if batching.responsive_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("responsive_interval_ms"));
        }
        if batching.load_shedding_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("load_shedding_interval_ms"));
        }

        Ok(ServerConfig::new(host.to_string(), self.server.port)
            .with_intervals(BatchIntervals {
                responsive: Duration::from_millis(batching.responsive_interval_ms),
                load_shedding: Duration::from_millis(batching.load_shedding_interval_ms),
            })
            .with_send_enabled_on_register(self.registry.send_enabled_on_register)
            .with_max_frame_len(self.server.max_frame_len))
    }

    /// Get the log level filter string.
    ///
    /// A bare level applies to this crate only; anything else is passed
    /// through as an `EnvFilter` directive.
    pub fn log_filter(&self) -> String {
        match self.logging.level.as_str() {
            level @ ("error" | "warn" | "info" | "debug" | "trace") => {
                format!("telemetry_hub={}", level)
            }
            directive => directive.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// A batching interval of zero.
    InvalidInterval(&'static str),
    /// A frame limit of zero.
    InvalidFrameLimit,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidInterval(name) => write!(f, "batching.{} must be positive", name),
            Self::InvalidFrameLimit => write!(f, "server.max_frame_len must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {}
