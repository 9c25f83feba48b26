//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};

/// pgmcp: PostgreSQL MCP server with semantic product search.
///
/// Exposes database discovery, guarded query/update execution, and
/// embedding-backed product search as MCP tools.
#[derive(Parser, Debug)]
#[command(name = "pgmcp")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Which transport the server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// JSON-RPC over stdin/stdout (Claude Code integration).
    Stdio,
    /// Streamable HTTP at /mcp (successor to the legacy SSE transport).
    Http,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the MCP server.
    ///
    /// Backend and embedding settings come from the environment
    /// (PGHOST, PGUSER, PGPASSWORD, OPENAI_API_KEY, ...).
    #[command(after_help = r#"Examples:
  pgmcp serve                          # stdio transport (default)
  pgmcp serve -t http                  # HTTP transport on MCP_HOST:MCP_PORT
  pgmcp serve -t http --port 9000      # HTTP transport on an explicit port
"#)]
    Serve {
        /// Transport to serve on.
        #[arg(short, long, value_enum, default_value = "stdio")]
        transport: TransportKind,

        /// Listen host for the HTTP transport.
        #[arg(long, env = "MCP_HOST")]
        host: Option<String>,

        /// Listen port for the HTTP transport.
        #[arg(long, env = "MCP_PORT")]
        port: Option<u16>,
    },

    /// Print the tool catalogue as JSON.
    Tools,
}
