//! MCP (Model Context Protocol) server for pgmcp.
//!
//! Exposes the tool catalogue over a persistent, server-pushed connection:
//! the five database tools plus read-only resources for browsing databases
//! and schema layouts.
//!
//! # Architecture
//!
//! ```text
//! MCP Client (conversational agent)
//!   ↓ call_tool(name, arguments)
//! PgMcpServer
//!   ├── ToolRegistry::validate     (typed params, bounds, side-effect class)
//!   ├── ConnectionPool::acquire    (exclusive lease, timeout)
//!   ├── QueryExecutor / SearchEngine
//!   └── structured result or kind-tagged error
//!   ↓
//! JSON rows → MCP Client
//! ```
//!
//! Sessions are independent: handlers share only the pool, the embedder,
//! and the immutable registry, all safe for concurrent use.

pub mod params;
pub mod server;
pub mod transport;

pub use server::PgMcpServer;
pub use transport::{serve_http, serve_stdio};
