//! Command-line interface: argument parsing and command execution.

pub mod commands;
pub mod parser;

pub use commands::run;
pub use parser::{Cli, Commands, TransportKind};
