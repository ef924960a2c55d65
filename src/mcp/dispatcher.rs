//! Per-session request handling.
//!
//! A [`Dispatcher`] answers one JSON-RPC message at a time against the shared
//! [`Registry`]. It keeps no state between requests; the only thing tying it to
//! a session is the cancellation token handed to upstream fetches.
//!
//! Failures inside a tool call (bad arguments, upstream errors) become an
//! `isError` tool result. Unknown tools, unknown resources and malformed
//! requests become JSON-RPC errors for that one request.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::books::{self, ResultEnvelope, UpstreamClient};
use crate::mcp::protocol::{
    parse_message, IncomingMessage, InitializeParams, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, OutgoingMessage, ReadResourceParams, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolCallResult, MCP_PROTOCOL_VERSION,
};
use crate::mcp::registry::{Registry, ToolDescriptor, SEARCH_TOOL};

/// Answers protocol requests for one session.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    upstream: UpstreamClient,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Creates a dispatcher whose upstream calls stop when `cancel` fires.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        upstream: UpstreamClient,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            upstream,
            cancel,
        }
    }

    /// Parses and handles one raw message.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<OutgoingMessage> {
        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => Some(error.into()),
        }
    }

    /// Handles a parsed message.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Option<OutgoingMessage> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(&req).await),
            IncomingMessage::Notification(notif) => {
                tracing::debug!(method = %notif.method, "Notification received");
                None
            }
        }
    }

    async fn handle_request(&self, req: &JsonRpcRequest) -> OutgoingMessage {
        tracing::debug!(id = %req.id, method = %req.method, "Dispatching request");

        let result = match req.method.as_str() {
            "initialize" => Self::handle_initialize(req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            "tools/list" => Ok(self.handle_tools_list(req)),
            "tools/call" => self.handle_tools_call(req).await,
            "resources/list" => Ok(self.handle_resources_list(req)),
            "resources/templates/list" => Ok(self.handle_resource_templates_list(req)),
            "resources/read" => self.handle_resources_read(req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        result.into()
    }

    fn handle_initialize(req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: InitializeParams = req.params_as("initialize")?;
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested_version = %params.protocol_version,
                "Client initialised"
            );
        }

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": ServerCapabilities::default(),
                "serverInfo": ServerInfo::default(),
            }),
        ))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            req.id.clone(),
            json!({ "tools": self.registry.list_tools() }),
        )
    }

    fn handle_resources_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let resources: Vec<Value> = self
            .registry
            .list_resources()
            .iter()
            .map(|r| r.listing())
            .collect();
        JsonRpcResponse::success(req.id.clone(), json!({ "resources": resources }))
    }

    fn handle_resource_templates_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let templates: Vec<Value> = self
            .registry
            .list_resource_templates()
            .iter()
            .map(|r| r.template_listing())
            .collect();
        JsonRpcResponse::success(req.id.clone(), json!({ "resourceTemplates": templates }))
    }

    fn handle_resources_read(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ReadResourceParams = req.params_as("resources/read")?;
        let resource = self.registry.resolve_resource(&params.uri).ok_or_else(|| {
            tracing::debug!(uri = %params.uri, "Unknown resource requested");
            JsonRpcError::resource_not_found(req.id.clone(), &params.uri)
        })?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "contents": [resource.contents()] }),
        ))
    }

    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ToolCallParams = req.params_as("tools/call")?;
        let tool = self
            .registry
            .resolve_tool(&params.name)
            .ok_or_else(|| JsonRpcError::tool_not_found(req.id.clone(), &params.name))?;

        let result = match tool.name.as_str() {
            SEARCH_TOOL => self.call_search(tool, &params.arguments).await,
            other => {
                tracing::error!(tool = other, "Registered tool has no handler");
                ToolCallResult::error(format!("Tool '{other}' is not available"))
            }
        };

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Runs normalise, fetch and shape for the search tool.
    ///
    /// Validation failures never reach the network; upstream failures never
    /// produce a partial result.
    pub async fn call_search(&self, tool: &ToolDescriptor, arguments: &Value) -> ToolCallResult {
        let query = match books::normalize(arguments) {
            Ok(query) => query,
            Err(e) => {
                tracing::debug!(field = %e.field, reason = %e.reason, "Rejected search arguments");
                return ToolCallResult::error(e.to_string());
            }
        };

        let payload = match self.upstream.fetch(&query, &self.cancel).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, status = ?e.status_code(), "Upstream request failed");
                return ToolCallResult::error(e.to_string());
            }
        };

        let envelope = ResultEnvelope {
            page: books::shape(&payload),
            query,
        };
        let summary = format!("Found {} books", envelope.page.count);

        match serde_json::to_value(&envelope) {
            Ok(structured) => ToolCallResult::text(summary)
                .with_structured(structured)
                .with_meta(tool.meta.clone()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise search results");
                ToolCallResult::error("Internal error: failed to serialise results")
            }
        }
    }
}
