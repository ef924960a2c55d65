//! MCP server lifecycle.
//!
//! 1. **Startup**: build the registry (fatal on failure) and the upstream
//!    client, then bind the listener
//! 2. **Operation**: accept streams and route messages until a shutdown
//!    signal arrives
//! 3. **Shutdown**: close every session so open streams end, then drain

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::books::UpstreamClient;
use crate::config::Config;
use crate::error::ServerError;
use crate::mcp::registry::Registry;
use crate::mcp::session::SessionManager;
use crate::mcp::transport::{self, TransportOptions};

/// The book search MCP server.
#[derive(Debug)]
pub struct McpServer {
    config: Config,
    registry: Arc<Registry>,
    sessions: SessionManager,
}

impl McpServer {
    /// Creates a server from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the widget template cannot be loaded or the
    /// upstream client cannot be built.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let registry = Arc::new(Registry::load(config.widget.template_path.as_deref())?);
        let upstream =
            UpstreamClient::with_user_agent(&config.upstream.base_url, &config.upstream.user_agent)?;
        let sessions = SessionManager::new(
            Arc::clone(&registry),
            upstream,
            config.server.channel_capacity,
        );

        tracing::debug!(
            tools = registry.list_tools().len(),
            resources = registry.list_resources().len(),
            upstream = %config.upstream.base_url,
            "Registry ready"
        );

        Ok(Self {
            config,
            registry,
            sessions,
        })
    }

    /// The session table.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The tool and resource catalogue.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Builds the HTTP router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        let options = TransportOptions {
            sse_path: self.config.server.sse_path.clone(),
            message_path: self.config.server.message_path.clone(),
            channel_capacity: self.config.server.channel_capacity,
        };
        transport::router(self.sessions.clone(), &options)
    }

    /// Binds the configured address and serves until SIGINT/SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let address = self.config.server.bind_address();
        let listener = TcpListener::bind(&address).await?;
        self.serve(listener, transport::shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local: SocketAddr = listener.local_addr()?;
        tracing::info!(
            address = %local,
            sse_path = %self.config.server.sse_path,
            message_path = %self.config.server.message_path,
            "Listening"
        );

        let sessions = self.sessions.clone();
        let drain = async move {
            shutdown.await;
            let closed = sessions.close_all();
            tracing::info!(sessions = closed, "Closed open sessions");
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(drain)
            .await?;
        Ok(())
    }
}
