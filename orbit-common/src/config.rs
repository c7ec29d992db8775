//! Configuration management for ORBIT.
//!
//! The gateway reads an optional JSON file at `~/.orbit/config.json`
//! (or the path in `ORBIT_CONFIG`) and then applies environment overrides.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (a `.env` file in the working directory is loaded first)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) → model.api_key
//! - `PORT` → server.port
//! - `ORBIT_BIND_ADDRESS` → server.host
//! - `ORBIT_MODEL` → model.name
//! - `ORBIT_GEMINI_ENDPOINT` → model.endpoint
//! - `ORBIT_LOG_LEVEL` → observability.log_level
//! - `ORBIT_LOG_FORMAT` → observability.log_format

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(
            || PathBuf::from(".orbit"),
            |dirs| dirs.home_dir().join(".orbit"),
        )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var("ORBIT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from any origin
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allow_any: true,
        }
    }
}

// ============================================================================
// Model Configuration
// ============================================================================

/// Upstream generative model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name (e.g. "gemini-1.5-flash-latest")
    #[serde(default = "default_model")]
    pub name: String,

    /// API base URL, without the `/models/...` suffix
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key. Usually supplied through `GEMINI_API_KEY` instead of the file.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Response length cap
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: i64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Upstream request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum stored turns per session (two turns per exchange)
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the ORBIT gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// What happened while loading, kept until logging is initialized.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Config file that was read, if any
    pub config_file: Option<PathBuf>,
    /// `.env` file that was read, if any
    pub dotenv_file: Option<PathBuf>,
    /// Values that were ignored
    pub warnings: Vec<String>,
}

impl LoadReport {
    /// Emit the collected notes through `tracing`.
    pub fn log(&self) {
        match &self.config_file {
            Some(path) => tracing::info!(path = %path.display(), "Loaded config file"),
            None => tracing::info!("Config file not found, using defaults"),
        }
        if let Some(path) = &self.dotenv_file {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        for warning in &self.warnings {
            tracing::warn!("{warning}");
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// Returns the path that was read, or `None` when falling back to defaults.
    pub fn load() -> Result<(Self, Option<PathBuf>)> {
        let path = config_path();
        if !path.exists() {
            return Ok((Self::default(), None));
        }

        let config = Self::load_from(&path)?;
        Ok((config, Some(path)))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str::<Self>(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with `.env` and environment variable overrides.
    ///
    /// Nothing is logged here; call [`LoadReport::log`] once logging is set up.
    pub fn load_with_env() -> Result<(Self, LoadReport)> {
        let dotenv_file = match dotenvy::dotenv() {
            Ok(path) => Some(path),
            Err(e) if e.not_found() => None,
            Err(e) => {
                return Err(Error::Config(e.to_string()).with_context("Failed to load .env file"))
            }
        };

        let (mut config, config_file) = Self::load()?;
        let warnings = config.apply_env_overrides();

        Ok((
            config,
            LoadReport {
                config_file,
                dotenv_file,
                warnings,
            },
        ))
    }

    /// Apply environment variable overrides, returning warnings for ignored values.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")) {
            self.model.api_key = Some(key);
        }

        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => warnings.push(format!("Ignoring unparsable PORT value {port:?}")),
            }
        }

        if let Some(bind) = lookup("ORBIT_BIND_ADDRESS") {
            self.server.host = bind;
        }

        if let Some(model) = lookup("ORBIT_MODEL") {
            self.model.name = model;
        }

        if let Some(endpoint) = lookup("ORBIT_GEMINI_ENDPOINT") {
            self.model.endpoint = endpoint;
        }

        if let Some(level) = lookup("ORBIT_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(format) = lookup("ORBIT_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        warnings
    }

    /// Whether an upstream credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_model() -> String {
    "gemini-1.5-flash-latest".into()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_max_output_tokens() -> i64 {
    500
}
fn default_temperature() -> f64 {
    0.7
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_turns() -> usize {
    20
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_true() -> bool {
    true
}
