//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every section is optional; missing values take the built-in defaults.

use std::path::PathBuf;

use serde::Deserialize;
use url::Url;

use crate::books::DEFAULT_BASE_URL;
use crate::error::ConfigError;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream catalogue settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Widget template settings.
    #[serde(default)]
    pub widget: WidgetConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::validation("server.port must not be 0"));
        }
        if server.host.trim().is_empty() {
            return Err(ConfigError::validation("server.host must not be empty"));
        }
        for (name, path) in [
            ("server.sse_path", &server.sse_path),
            ("server.message_path", &server.message_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::validation(format!(
                    "{name} must start with '/', got '{path}'"
                )));
            }
        }
        if server.sse_path == server.message_path {
            return Err(ConfigError::validation(
                "server.sse_path and server.message_path must differ",
            ));
        }
        if server.channel_capacity == 0 {
            return Err(ConfigError::validation(
                "server.channel_capacity must be at least 1",
            ));
        }

        match Url::parse(&self.upstream.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::validation(format!(
                    "upstream.base_url must be an absolute http(s) URL, got '{}'",
                    self.upstream.base_url
                )));
            }
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the event stream endpoint.
    #[serde(default = "default_sse_path")]
    pub sse_path: String,

    /// Path of the message endpoint.
    #[serde(default = "default_message_path")]
    pub message_path: String,

    /// Per-session buffer size for queued messages and outgoing events.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// The `host:port` pair to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sse_path: default_sse_path(),
            message_path: default_message_path(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_sse_path() -> String {
    "/mcp".to_string()
}

fn default_message_path() -> String {
    "/mcp/messages".to_string()
}

const fn default_channel_capacity() -> usize {
    32
}

/// Upstream catalogue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Search endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Widget template configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetConfig {
    /// HTML file to serve instead of the built-in widget.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
