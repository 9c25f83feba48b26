//! Tool catalogue: definitions, resolution, and parameter validation.

pub mod registry;

pub use registry::{SearchDefaults, SideEffect, ToolDefinition, ToolInput, ToolRegistry};
