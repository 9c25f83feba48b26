//! MCP server implementation for pgmcp.
//!
//! Implements `ServerHandler` directly over the tool registry: `list_tools`
//! serves the catalogue, `call_tool` validates then dispatches through a
//! leased pool connection. Errors carry the taxonomy kind (plus offending
//! field or tool) in the structured data payload so clients can tell user
//! error from backend outage without parsing text.

use std::sync::Arc;

use rmcp::model::{
    AnnotateAble, CallToolRequestParams, CallToolResult, Content, Implementation,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PaginatedRequestParams,
    ProtocolVersion, RawResource, RawResourceTemplate, ReadResourceRequestParams,
    ReadResourceResult, ResourceContents, ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};

use crate::config::ServerConfig;
use crate::db::pool::ConnectionPool;
use crate::db::postgres::PgConnectionFactory;
use crate::db::{ResultSet, SqlParam};
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::ServerError;
use crate::executor::QueryExecutor;
use crate::mcp::params::TableSchemasParams;
use crate::search::SearchEngine;
use crate::tools::{SearchDefaults, SideEffect, ToolInput, ToolRegistry};

/// Lists all non-template databases on the instance.
const LIST_DATABASES_SQL: &str =
    "SELECT datname FROM pg_database WHERE datistemplate = false";

/// Lists tables, columns, and types for one schema. The `::text` casts
/// keep the `sql_identifier` domain columns transport-safe.
const TABLE_SCHEMAS_SQL: &str = "SELECT table_name::text AS table_name, \
     column_name::text AS column_name, data_type::text AS data_type \
     FROM information_schema.columns WHERE table_schema = $1 \
     ORDER BY table_name, ordinal_position";

/// URI of the databases resource.
const DATABASES_URI: &str = "postgres://databases";
/// URI prefix of the per-schema resource template.
const SCHEMAS_URI_PREFIX: &str = "postgres://schemas/";

/// The pgmcp MCP server.
///
/// Cheap to clone: one instance per session shares the pool, embedder, and
/// registry through `Arc`s.
#[derive(Clone)]
pub struct PgMcpServer {
    registry: Arc<ToolRegistry>,
    pool: ConnectionPool,
    engine: SearchEngine,
    executor: QueryExecutor,
    defaults: SearchDefaults,
}

impl std::fmt::Debug for PgMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgMcpServer")
            .field("tools", &self.registry.definitions().len())
            .finish_non_exhaustive()
    }
}

impl PgMcpServer {
    /// Creates a server wired to PostgreSQL and the embedding service from
    /// configuration.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let factory = PgConnectionFactory::new(config.db.clone());
        let pool = ConnectionPool::new(
            Box::new(factory),
            config.pool_size,
            config.acquire_timeout,
        );
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(&config.embedding));
        Self::with_parts(
            pool,
            embedder,
            QueryExecutor::new(config.query_timeout),
            SearchDefaults {
                min_similarity: config.default_min_similarity,
                top_n: config.default_top_n,
            },
        )
    }

    /// Creates a server from already-built collaborators (tests inject
    /// stubs here).
    #[must_use]
    pub fn with_parts(
        pool: ConnectionPool,
        embedder: Arc<dyn Embedder>,
        executor: QueryExecutor,
        defaults: SearchDefaults,
    ) -> Self {
        Self {
            registry: Arc::new(ToolRegistry::standard()),
            engine: SearchEngine::new(embedder, executor),
            pool,
            executor,
            defaults,
        }
    }

    /// Validates and runs one invocation, returning the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the taxonomy error for the failing stage; the leased handle
    /// is returned (or discarded) on every path.
    pub async fn invoke(
        &self,
        name: &str,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, ServerError> {
        let input = self.registry.validate(name, args, self.defaults)?;
        tracing::debug!(tool = name, "dispatching tool invocation");

        let mut handle = self.pool.acquire().await?;
        let payload = match input {
            ToolInput::ListDatabases => {
                let rows = self
                    .executor
                    .query(&mut handle, LIST_DATABASES_SQL, &[])
                    .await?;
                rows_json(&rows)?
            }
            ToolInput::ListTableSchemas(TableSchemasParams { schema }) => {
                let rows = self
                    .executor
                    .query(&mut handle, TABLE_SCHEMAS_SQL, &[SqlParam::Text(schema)])
                    .await?;
                rows_json(&rows)?
            }
            ToolInput::RunQuery(params) => {
                let rows = self
                    .executor
                    .run_read(&mut handle, "run_query", &params.sql, &[])
                    .await?;
                rows_json(&rows)?
            }
            ToolInput::SimilarProducts(query) => {
                let results = self.engine.search(&mut handle, &query).await?;
                serde_json::to_string_pretty(&results).map_err(serialize_error)?
            }
            ToolInput::ApplyUpdate(params) => {
                let affected = self
                    .executor
                    .run_write(&mut handle, "apply_update", &params.sql)
                    .await?;
                serde_json::to_string_pretty(&serde_json::json!({ "rows_affected": affected }))
                    .map_err(serialize_error)?
            }
        };
        Ok(payload)
    }

    /// Runs one catalogue query for the resource endpoints.
    async fn resource_query(
        &self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<String, ServerError> {
        let mut handle = self.pool.acquire().await?;
        let rows = self.executor.query(&mut handle, sql, params).await?;
        rows_json(&rows)
    }
}

/// Serializes a result set as `{"columns": [...], "rows": [...]}`.
fn rows_json(rows: &ResultSet) -> Result<String, ServerError> {
    serde_json::to_string_pretty(rows).map_err(serialize_error)
}

fn serialize_error(e: serde_json::Error) -> ServerError {
    ServerError::Transport {
        message: format!("serialization error: {e}"),
    }
}

/// Maps taxonomy errors onto MCP structured errors, carrying the kind in
/// the data payload.
fn to_mcp_error(e: &ServerError) -> McpError {
    let data = Some(serde_json::json!({ "kind": e.kind() }));
    if e.is_user_error() {
        McpError::invalid_params(e.to_string(), data)
    } else {
        McpError::internal_error(e.to_string(), data)
    }
}

/// Builds the wire tool entry for one definition.
fn wire_tool(def: &crate::tools::ToolDefinition) -> Tool {
    let read_only = def.side_effect == SideEffect::ReadOnly;
    Tool {
        name: def.name.into(),
        title: None,
        description: Some(def.description.into()),
        input_schema: Arc::new(def.input_schema.clone()),
        output_schema: None,
        annotations: Some(ToolAnnotations {
            title: None,
            read_only_hint: Some(read_only),
            destructive_hint: Some(!read_only),
            idempotent_hint: None,
            open_world_hint: None,
        }),
        icons: None,
        meta: None,
    }
}

impl ServerHandler for PgMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "pgmcp".to_string(),
                title: Some("pgmcp PostgreSQL MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: Some("https://github.com/zircote/pgmcp".to_string()),
            },
            instructions: Some(
                "pgmcp: PostgreSQL tools over MCP. Discover structure with \
                 `list_databases` and `list_table_schemas` before writing SQL for \
                 `run_query`. Use `similar_products` for semantic product search \
                 (lower min_similarity for broad terms). `apply_update` is the only \
                 tool allowed to change data."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.registry.definitions().iter().map(wire_tool).collect(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        let payload = self
            .invoke(&request.name, args)
            .await
            .map_err(|e| to_mcp_error(&e))?;
        Ok(CallToolResult::success(vec![Content::text(payload)]))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut raw = RawResource::new(DATABASES_URI, "Databases".to_string());
        raw.description = Some("All non-template databases on the server instance.".to_string());
        raw.mime_type = Some("application/json".to_string());

        Ok(ListResourcesResult {
            resources: vec![raw.no_annotation()],
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParams { uri, .. }: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let content = if uri == DATABASES_URI {
            self.resource_query(LIST_DATABASES_SQL, &[])
                .await
                .map_err(|e| to_mcp_error(&e))?
        } else if let Some(schema) = uri.strip_prefix(SCHEMAS_URI_PREFIX) {
            if schema.trim().is_empty() {
                return Err(McpError::invalid_params(
                    format!("missing schema name in URI: {uri}"),
                    None,
                ));
            }
            self.resource_query(TABLE_SCHEMAS_SQL, &[SqlParam::Text(schema.to_string())])
                .await
                .map_err(|e| to_mcp_error(&e))?
        } else {
            return Err(McpError::resource_not_found(
                format!("unknown resource URI: {uri}"),
                None,
            ));
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(content, uri)],
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let schema_template = RawResourceTemplate {
            uri_template: format!("{SCHEMAS_URI_PREFIX}{{schema}}"),
            name: "Schema tables".to_string(),
            title: None,
            description: Some(
                "Tables, columns, and column types for one schema, ordered by table and \
                 ordinal position."
                    .to_string(),
            ),
            mime_type: Some("application/json".to_string()),
            icons: None,
        };

        Ok(ListResourceTemplatesResult {
            resource_templates: vec![schema_template.no_annotation()],
            next_cursor: None,
            meta: None,
        })
    }
}
