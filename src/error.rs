//! Error types for book-search-mcp.
//!
//! Request-scoped failures (validation, upstream, unknown tool or resource) live
//! next to the code that produces them. This module holds the errors that stop
//! the process from starting.

use std::path::PathBuf;

use thiserror::Error;

use crate::books::UpstreamError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// Errors raised while building the tool and resource catalogue.
///
/// All of these are fatal: the server must not accept connections with a
/// half-built registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The widget template could not be loaded.
    #[error("failed to load widget template: {path}")]
    TemplateLoad {
        /// Path to the template file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The widget template exists but is empty.
    #[error("widget template is empty: {uri}")]
    EmptyTemplate {
        /// URI of the resource whose content is empty.
        uri: String,
    },

    /// Two tools share a name.
    #[error("duplicate tool name: {name}")]
    DuplicateTool {
        /// The repeated tool name.
        name: String,
    },

    /// Two resources share a URI.
    #[error("duplicate resource uri: {uri}")]
    DuplicateResource {
        /// The repeated URI.
        uri: String,
    },

    /// A tool's output template points at a resource that is not registered.
    #[error("tool '{tool}' references unknown output template: {uri}")]
    DanglingTemplate {
        /// Tool declaring the reference.
        tool: String,
        /// The missing resource URI.
        uri: String,
    },
}

/// Errors that stop the server from running.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The registry could not be built.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The upstream HTTP client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] UpstreamError),

    /// Binding or serving the listener failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
