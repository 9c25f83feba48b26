//! pgmcp binary entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pgmcp::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr: stdout is reserved for the stdio MCP transport.
    let default_filter = if cli.verbose { "pgmcp=debug" } else { "pgmcp=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli).await
}
