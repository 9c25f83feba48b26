//! # pgmcp
//!
//! MCP server for PostgreSQL with embedding-backed semantic product search.
//!
//! A client holds one persistent, server-pushed connection (stdio or
//! streamable HTTP) and invokes a fixed catalogue of named tools:
//! metadata discovery (`list_databases`, `list_table_schemas`), raw read
//! queries (`run_query`), semantic product search (`similar_products`),
//! and guarded writes (`apply_update`).
//!
//! The crate is organized around the collaborators each invocation flows
//! through:
//!
//! - [`tools`]: the immutable tool registry (schemas, validation,
//!   side-effect classes).
//! - [`db`]: the datastore seam. Transport-safe row shapes, the
//!   [`db::pool::ConnectionPool`] with exclusive leases, and the
//!   `tokio-postgres` backend.
//! - [`embedding`]: the opaque text-to-vector collaborator with timeout,
//!   bounded retry, and dimension checking.
//! - [`executor`]: statement-kind classification and guarded, eager
//!   execution.
//! - [`search`]: the similarity-ranked product search engine.
//! - [`mcp`]: the protocol surface. Tool and resource handlers plus the
//!   stdio/HTTP transports.
//!
//! Backend and embedding services are reached only through traits, so every
//! piece is testable against the deterministic stubs in [`testing`].

pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod mcp;
pub mod search;
pub mod testing;
pub mod tools;

pub use cli::run;
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use mcp::PgMcpServer;
