//! Command execution.
//!
//! Wires parsed arguments to configuration loading and the transport layer.

use anyhow::Context;

use crate::cli::parser::{Cli, Commands, TransportKind};
use crate::config::ServerConfig;
use crate::mcp::{PgMcpServer, serve_http, serve_stdio};
use crate::tools::ToolRegistry;

/// Executes the parsed command.
///
/// # Errors
///
/// Returns configuration and transport errors to the binary entry point.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            transport,
            host,
            port,
        } => {
            let mut builder = ServerConfig::builder().from_env();
            if let Some(host) = host {
                builder = builder.listen_host(host);
            }
            if let Some(port) = port {
                builder = builder.listen_port(port);
            }
            let config = builder.build().context("loading server configuration")?;

            let server = PgMcpServer::new(&config);
            match transport {
                TransportKind::Stdio => {
                    tracing::info!("serving MCP over stdio");
                    serve_stdio(server).await
                }
                TransportKind::Http => {
                    serve_http(server, &config.listen_host, config.listen_port).await
                }
            }
        }
        Commands::Tools => {
            let registry = ToolRegistry::standard();
            let catalogue: Vec<serde_json::Value> = registry
                .definitions()
                .iter()
                .map(|def| {
                    serde_json::json!({
                        "name": def.name,
                        "description": def.description,
                        "side_effect": match def.side_effect {
                            crate::tools::SideEffect::ReadOnly => "read-only",
                            crate::tools::SideEffect::Mutating => "mutating",
                        },
                        "input_schema": def.input_schema,
                    })
                })
                .collect();
            let text = serde_json::to_string_pretty(&catalogue)
                .context("serializing tool catalogue")?;
            #[allow(clippy::print_stdout)]
            {
                println!("{text}");
            }
            Ok(())
        }
    }
}
