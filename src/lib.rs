//! book-search-mcp: MCP server exposing a Project Gutenberg book search tool
//!
//! Clients connect over HTTP + Server-Sent Events, list the `search` tool and
//! its widget resource, and call the tool to query the Gutendex catalogue.
//! Results come back both as a short text summary and as structured content
//! that the widget renders.
//!
//! # Modules
//!
//! - [`books`] — Query normalisation, upstream client and result shaping
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Startup error types
//! - [`mcp`] — MCP protocol, sessions and HTTP transport

pub mod books;
pub mod config;
pub mod error;
pub mod mcp;
