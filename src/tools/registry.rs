//! Static tool registry.
//!
//! The catalogue is built once at startup and never changes: five tools,
//! each with a unique name, a JSON Schema for its parameters, and a
//! side-effect class. [`ToolRegistry::validate`] turns raw MCP arguments
//! into typed inputs before any handler runs, naming the offending field
//! on rejection.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::error::ServerError;
use crate::mcp::params::{
    ApplyUpdateParams, RunQueryParams, SimilarProductsParams, TableSchemasParams,
};
use crate::search::SearchQuery;

/// Hard ceiling on `top_n`, preventing unbounded result sets.
pub const MAX_TOP_N: u32 = 100;

/// Raw JSON arguments as received from the transport.
pub type RawArgs = serde_json::Map<String, serde_json::Value>;

/// Side-effect class of a tool, declared at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// The tool must not change backend state.
    ReadOnly,
    /// The tool is expected to change backend state.
    Mutating,
}

/// One registered tool: identity, schema, and side-effect class.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Unique tool name, immutable after startup.
    pub name: &'static str,
    /// Human-readable description shown to clients.
    pub description: &'static str,
    /// JSON Schema object for the tool's parameters.
    pub input_schema: RawArgs,
    /// Declared side-effect class.
    pub side_effect: SideEffect,
}

/// A validated, typed tool invocation.
#[derive(Debug, Clone)]
pub enum ToolInput {
    /// `list_databases` takes no parameters.
    ListDatabases,
    /// `list_table_schemas` scoped to one schema.
    ListTableSchemas(TableSchemasParams),
    /// `run_query` with a read-only statement.
    RunQuery(RunQueryParams),
    /// `similar_products` with defaults applied and bounds checked.
    SimilarProducts(SearchQuery),
    /// `apply_update` with a mutating statement.
    ApplyUpdate(ApplyUpdateParams),
}

/// Configured defaults applied to absent search parameters.
#[derive(Debug, Clone, Copy)]
pub struct SearchDefaults {
    /// Default minimum similarity threshold.
    pub min_similarity: f64,
    /// Default result cap.
    pub top_n: u32,
}

/// The immutable tool catalogue.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Builds the standard five-tool catalogue.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            tools: vec![
                ToolDefinition {
                    name: "list_databases",
                    description: "Lists all databases on the server instance.",
                    input_schema: empty_object_schema(),
                    side_effect: SideEffect::ReadOnly,
                },
                ToolDefinition {
                    name: "list_table_schemas",
                    description: "Lists tables, columns, and column types for one schema. \
                                  Call once per schema involved in a query.",
                    input_schema: schema_object::<TableSchemasParams>(),
                    side_effect: SideEffect::ReadOnly,
                },
                ToolDefinition {
                    name: "run_query",
                    description: "Runs a read-only SQL statement and returns the rows. \
                                  Mutating statements are rejected; use apply_update for those.",
                    input_schema: schema_object::<RunQueryParams>(),
                    side_effect: SideEffect::ReadOnly,
                },
                ToolDefinition {
                    name: "similar_products",
                    description: "Finds products semantically similar to a natural-language \
                                  description, ranked by embedding similarity. Lower \
                                  min_similarity (e.g. 0.5) for broad or generic search terms.",
                    input_schema: schema_object::<SimilarProductsParams>(),
                    side_effect: SideEffect::ReadOnly,
                },
                ToolDefinition {
                    name: "apply_update",
                    description: "Executes a mutating SQL statement (insert/update/delete/DDL) \
                                  and returns the affected-row count.",
                    input_schema: schema_object::<ApplyUpdateParams>(),
                    side_effect: SideEffect::Mutating,
                },
            ],
        }
    }

    /// All registered definitions, in catalogue order.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownTool`] for unregistered names.
    pub fn resolve(&self, name: &str) -> Result<&ToolDefinition, ServerError> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ServerError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Validates raw arguments against a tool's schema and bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownTool`] or
    /// [`ServerError::InvalidParameters`] naming the offending field.
    pub fn validate(
        &self,
        name: &str,
        args: RawArgs,
        defaults: SearchDefaults,
    ) -> Result<ToolInput, ServerError> {
        let definition = self.resolve(name)?;

        match definition.name {
            "list_databases" => Ok(ToolInput::ListDatabases),
            "list_table_schemas" => {
                let params: TableSchemasParams = typed(definition.name, args)?;
                require_non_empty(definition.name, "schema", &params.schema)?;
                Ok(ToolInput::ListTableSchemas(params))
            }
            "run_query" => {
                let params: RunQueryParams = typed(definition.name, args)?;
                require_non_empty(definition.name, "sql", &params.sql)?;
                Ok(ToolInput::RunQuery(params))
            }
            "similar_products" => {
                let params: SimilarProductsParams = typed(definition.name, args)?;
                Ok(ToolInput::SimilarProducts(resolve_search_query(
                    definition.name,
                    params,
                    defaults,
                )?))
            }
            "apply_update" => {
                let params: ApplyUpdateParams = typed(definition.name, args)?;
                require_non_empty(definition.name, "sql", &params.sql)?;
                Ok(ToolInput::ApplyUpdate(params))
            }
            other => Err(ServerError::UnknownTool {
                name: other.to_string(),
            }),
        }
    }
}

/// Applies defaults and bounds to search parameters.
fn resolve_search_query(
    tool: &str,
    params: SimilarProductsParams,
    defaults: SearchDefaults,
) -> Result<SearchQuery, ServerError> {
    let min_stock = params.min_stock.unwrap_or(0);
    if min_stock < 0 {
        return Err(invalid(tool, "min_stock", "must be non-negative"));
    }

    let top_n = params.top_n.unwrap_or(defaults.top_n);
    if top_n == 0 {
        return Err(invalid(tool, "top_n", "must be positive"));
    }
    if top_n > MAX_TOP_N {
        return Err(invalid(
            tool,
            "top_n",
            &format!("must be at most {MAX_TOP_N}"),
        ));
    }

    let min_similarity = params.min_similarity.unwrap_or(defaults.min_similarity);
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(invalid(tool, "min_similarity", "must be within [0, 1]"));
    }

    Ok(SearchQuery {
        text: params.search_text,
        min_stock,
        top_n,
        min_similarity,
    })
}

/// Deserializes raw arguments into a typed param struct.
fn typed<T: DeserializeOwned>(tool: &str, args: RawArgs) -> Result<T, ServerError> {
    serde_json::from_value(serde_json::Value::Object(args)).map_err(|e| {
        ServerError::InvalidParameters {
            tool: tool.to_string(),
            field: field_from_serde_error(&e.to_string()),
            message: e.to_string(),
        }
    })
}

/// Best-effort field name out of a serde error message
/// ("missing field `sql`", "unknown field `extra`", ...).
fn field_from_serde_error(message: &str) -> String {
    message
        .split('`')
        .nth(1)
        .map_or_else(|| "<arguments>".to_string(), ToString::to_string)
}

fn require_non_empty(tool: &str, field: &str, value: &str) -> Result<(), ServerError> {
    if value.trim().is_empty() {
        return Err(invalid(tool, field, "must not be empty"));
    }
    Ok(())
}

fn invalid(tool: &str, field: &str, message: &str) -> ServerError {
    ServerError::InvalidParameters {
        tool: tool.to_string(),
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// JSON Schema for a parameterless tool.
fn empty_object_schema() -> RawArgs {
    let schema = serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    });
    match schema {
        serde_json::Value::Object(map) => map,
        _ => RawArgs::new(),
    }
}

/// JSON Schema object generated from a param struct.
fn schema_object<T: JsonSchema>() -> RawArgs {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(schema) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => RawArgs::new(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEFAULTS: SearchDefaults = SearchDefaults {
        min_similarity: 0.75,
        top_n: 20,
    };

    fn args(value: serde_json::Value) -> RawArgs {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let registry = ToolRegistry::standard();
        let mut names: Vec<&str> = registry.definitions().iter().map(|t| t.name).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
        assert_eq!(before, 5);
    }

    #[test]
    fn test_all_definitions_have_object_schemas() {
        let registry = ToolRegistry::standard();
        for def in registry.definitions() {
            assert!(!def.name.is_empty());
            assert!(!def.description.is_empty());
            assert_eq!(
                def.input_schema.get("type").and_then(|v| v.as_str()),
                Some("object"),
                "tool {} schema is not an object",
                def.name
            );
        }
    }

    #[test]
    fn test_only_apply_update_is_mutating() {
        let registry = ToolRegistry::standard();
        for def in registry.definitions() {
            let expected = if def.name == "apply_update" {
                SideEffect::Mutating
            } else {
                SideEffect::ReadOnly
            };
            assert_eq!(def.side_effect, expected, "tool {}", def.name);
        }
    }

    #[test]
    fn test_resolve_unknown_tool() {
        let registry = ToolRegistry::standard();
        let err = match registry.resolve("drop_everything") {
            Ok(_) => panic!("expected UnknownTool"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[test]
    fn test_validate_applies_search_defaults() {
        let registry = ToolRegistry::standard();
        let input = registry
            .validate(
                "similar_products",
                args(json!({ "search_text": "mountain bike" })),
                DEFAULTS,
            )
            .unwrap_or_else(|e| panic!("validate failed: {e}"));
        match input {
            ToolInput::SimilarProducts(q) => {
                assert_eq!(q.min_stock, 0);
                assert_eq!(q.top_n, 20);
                assert!((q.min_similarity - 0.75).abs() < f64::EPSILON);
            }
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_top_n_above_ceiling() {
        let registry = ToolRegistry::standard();
        let err = registry
            .validate(
                "similar_products",
                args(json!({ "search_text": "bike", "top_n": 1000 })),
                DEFAULTS,
            )
            .map(|_| ())
            .map_err(|e| e.to_string());
        let message = match err {
            Ok(()) => panic!("expected rejection"),
            Err(m) => m,
        };
        assert!(message.contains("top_n"));
    }

    #[test]
    fn test_validate_rejects_zero_top_n() {
        let registry = ToolRegistry::standard();
        assert!(
            registry
                .validate(
                    "similar_products",
                    args(json!({ "search_text": "bike", "top_n": 0 })),
                    DEFAULTS,
                )
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_negative_min_stock() {
        let registry = ToolRegistry::standard();
        let err = match registry.validate(
            "similar_products",
            args(json!({ "search_text": "bike", "min_stock": -5 })),
            DEFAULTS,
        ) {
            Ok(_) => panic!("expected rejection"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("min_stock"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_similarity() {
        let registry = ToolRegistry::standard();
        assert!(
            registry
                .validate(
                    "similar_products",
                    args(json!({ "search_text": "bike", "min_similarity": 1.2 })),
                    DEFAULTS,
                )
                .is_err()
        );
    }

    #[test]
    fn test_validate_names_missing_field() {
        let registry = ToolRegistry::standard();
        let err = match registry.validate("run_query", RawArgs::new(), DEFAULTS) {
            Ok(_) => panic!("expected rejection"),
            Err(e) => e,
        };
        match err {
            ServerError::InvalidParameters { field, .. } => assert_eq!(field, "sql"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_list_databases_ignores_arguments() {
        let registry = ToolRegistry::standard();
        let input = registry
            .validate("list_databases", RawArgs::new(), DEFAULTS)
            .unwrap_or_else(|e| panic!("validate failed: {e}"));
        assert!(matches!(input, ToolInput::ListDatabases));
    }

    #[test]
    fn test_validate_coerces_string_numbers() {
        let registry = ToolRegistry::standard();
        let input = registry
            .validate(
                "similar_products",
                args(json!({ "search_text": "bike", "top_n": "7" })),
                DEFAULTS,
            )
            .unwrap_or_else(|e| panic!("validate failed: {e}"));
        match input {
            ToolInput::SimilarProducts(q) => assert_eq!(q.top_n, 7),
            other => panic!("unexpected input: {other:?}"),
        }
    }
}
