//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes the book search tool and its widget resource to MCP clients over
//! the HTTP + Server-Sent Events transport, using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌──────────────┐     │
//! │   │  Transport  │───▶│  Sessions   │───▶│  Dispatcher  │     │
//! │   │ (HTTP+SSE)  │    │ (per-client)│    │  (handlers)  │     │
//! │   └─────────────┘    └─────────────┘    └──────────────┘     │
//! │          │                  │                  │             │
//! │          ▼                  ▼                  ▼             │
//! │   ┌──────────────────────────────────────────────────┐       │
//! │   │        JSON-RPC Messages  /  Registry            │       │
//! │   └──────────────────────────────────────────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use registry::Registry;
pub use server::McpServer;
pub use session::{SessionError, SessionEvent, SessionId, SessionManager, SessionState};
