//! Server configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::time::Duration;

use crate::error::ServerError;

/// Default PostgreSQL port.
const DEFAULT_PG_PORT: u16 = 5432;
/// Default database to connect to.
const DEFAULT_PG_DATABASE: &str = "postgres";
/// Default listen host for the HTTP transport.
const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
/// Default listen port for the HTTP transport.
const DEFAULT_LISTEN_PORT: u16 = 8000;
/// Default fixed pool size.
const DEFAULT_POOL_SIZE: usize = 8;
/// Default pool acquisition timeout in milliseconds.
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
/// Default per-statement execution timeout in milliseconds.
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;
/// Default embedding model identifier.
const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
/// Default embedding vector dimension (matches the default model).
const DEFAULT_EMBED_DIM: usize = 1536;
/// Default embedding request timeout in milliseconds.
const DEFAULT_EMBED_TIMEOUT_MS: u64 = 10_000;
/// Default number of transient-failure retries for embedding calls.
const DEFAULT_EMBED_RETRIES: u32 = 3;
/// Default minimum similarity threshold for product search.
const DEFAULT_MIN_SIMILARITY: f64 = 0.75;
/// Default result cap for product search.
const DEFAULT_TOP_N: u32 = 20;

/// PostgreSQL backend endpoint and credentials.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Backend host name.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Role to authenticate as.
    pub user: String,
    /// Password for the role.
    pub password: String,
    /// Database to connect to.
    pub dbname: String,
}

/// Embedding service endpoint, credentials, and contract.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// API key for the embedding service.
    pub api_key: String,
    /// Optional base URL override (proxies, compatible APIs).
    pub base_url: Option<String>,
    /// Embedding model identifier.
    pub model: String,
    /// Fixed vector dimension checked against every response.
    pub dimension: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum retries for transient failures.
    pub max_retries: u32,
}

/// Configuration for the tool-invocation server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Relational backend settings.
    pub db: DbConfig,
    /// Embedding service settings.
    pub embedding: EmbeddingConfig,
    /// Listen host for the HTTP transport.
    pub listen_host: String,
    /// Listen port for the HTTP transport.
    pub listen_port: u16,
    /// Fixed connection pool size.
    pub pool_size: usize,
    /// Pool acquisition timeout.
    pub acquire_timeout: Duration,
    /// Per-statement execution timeout.
    pub query_timeout: Duration,
    /// Default minimum similarity threshold for `similar_products`.
    pub default_min_similarity: f64,
    /// Default result cap for `similar_products`.
    pub default_top_n: u32,
}

impl ServerConfig {
    /// Creates a new builder for `ServerConfig`.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if a required credential is missing
    /// or a value fails to parse.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    pg_host: Option<String>,
    pg_port: Option<u16>,
    pg_user: Option<String>,
    pg_password: Option<String>,
    pg_database: Option<String>,
    listen_host: Option<String>,
    listen_port: Option<u16>,
    pool_size: Option<usize>,
    acquire_timeout: Option<Duration>,
    query_timeout: Option<Duration>,
    embed_api_key: Option<String>,
    embed_base_url: Option<String>,
    embed_model: Option<String>,
    embed_dimension: Option<usize>,
    embed_timeout: Option<Duration>,
    embed_retries: Option<u32>,
    default_min_similarity: Option<f64>,
    default_top_n: Option<u32>,
}

/// Reads and parses an environment variable, ignoring unset/unparsable values.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl ServerConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.pg_host.is_none() {
            self.pg_host = std::env::var("PGHOST").ok();
        }
        if self.pg_port.is_none() {
            self.pg_port = env_parse("PGPORT");
        }
        if self.pg_user.is_none() {
            self.pg_user = std::env::var("PGUSER").ok();
        }
        if self.pg_password.is_none() {
            self.pg_password = std::env::var("PGPASSWORD").ok();
        }
        if self.pg_database.is_none() {
            self.pg_database = std::env::var("PGDATABASE").ok();
        }
        if self.listen_host.is_none() {
            self.listen_host = std::env::var("MCP_HOST").ok();
        }
        if self.listen_port.is_none() {
            self.listen_port = env_parse("MCP_PORT");
        }
        if self.pool_size.is_none() {
            self.pool_size = env_parse("PGMCP_POOL_SIZE");
        }
        if self.acquire_timeout.is_none() {
            self.acquire_timeout = env_parse("PGMCP_ACQUIRE_TIMEOUT_MS").map(Duration::from_millis);
        }
        if self.query_timeout.is_none() {
            self.query_timeout = env_parse("PGMCP_QUERY_TIMEOUT_MS").map(Duration::from_millis);
        }
        if self.embed_api_key.is_none() {
            self.embed_api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("PGMCP_EMBED_API_KEY"))
                .ok();
        }
        if self.embed_base_url.is_none() {
            self.embed_base_url = std::env::var("OPENAI_BASE_URL").ok();
        }
        if self.embed_model.is_none() {
            self.embed_model = std::env::var("PGMCP_EMBED_MODEL").ok();
        }
        if self.embed_dimension.is_none() {
            self.embed_dimension = env_parse("PGMCP_EMBED_DIM");
        }
        if self.embed_timeout.is_none() {
            self.embed_timeout = env_parse("PGMCP_EMBED_TIMEOUT_MS").map(Duration::from_millis);
        }
        if self.embed_retries.is_none() {
            self.embed_retries = env_parse("PGMCP_EMBED_RETRIES");
        }
        if self.default_min_similarity.is_none() {
            self.default_min_similarity = env_parse("PGMCP_MIN_SIMILARITY");
        }
        if self.default_top_n.is_none() {
            self.default_top_n = env_parse("PGMCP_TOP_N");
        }
        self
    }

    /// Sets the PostgreSQL host.
    #[must_use]
    pub fn pg_host(mut self, host: impl Into<String>) -> Self {
        self.pg_host = Some(host.into());
        self
    }

    /// Sets the PostgreSQL port.
    #[must_use]
    pub const fn pg_port(mut self, port: u16) -> Self {
        self.pg_port = Some(port);
        self
    }

    /// Sets the PostgreSQL user.
    #[must_use]
    pub fn pg_user(mut self, user: impl Into<String>) -> Self {
        self.pg_user = Some(user.into());
        self
    }

    /// Sets the PostgreSQL password.
    #[must_use]
    pub fn pg_password(mut self, password: impl Into<String>) -> Self {
        self.pg_password = Some(password.into());
        self
    }

    /// Sets the database name.
    #[must_use]
    pub fn pg_database(mut self, dbname: impl Into<String>) -> Self {
        self.pg_database = Some(dbname.into());
        self
    }

    /// Sets the listen host for the HTTP transport.
    #[must_use]
    pub fn listen_host(mut self, host: impl Into<String>) -> Self {
        self.listen_host = Some(host.into());
        self
    }

    /// Sets the listen port for the HTTP transport.
    #[must_use]
    pub const fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Sets the pool size.
    #[must_use]
    pub const fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = Some(n);
        self
    }

    /// Sets the pool acquisition timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, d: Duration) -> Self {
        self.acquire_timeout = Some(d);
        self
    }

    /// Sets the per-statement execution timeout.
    #[must_use]
    pub const fn query_timeout(mut self, d: Duration) -> Self {
        self.query_timeout = Some(d);
        self
    }

    /// Sets the embedding API key.
    #[must_use]
    pub fn embed_api_key(mut self, key: impl Into<String>) -> Self {
        self.embed_api_key = Some(key.into());
        self
    }

    /// Sets the embedding base URL override.
    #[must_use]
    pub fn embed_base_url(mut self, url: impl Into<String>) -> Self {
        self.embed_base_url = Some(url.into());
        self
    }

    /// Sets the embedding model identifier.
    #[must_use]
    pub fn embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = Some(model.into());
        self
    }

    /// Sets the embedding vector dimension.
    #[must_use]
    pub const fn embed_dimension(mut self, dim: usize) -> Self {
        self.embed_dimension = Some(dim);
        self
    }

    /// Sets the embedding request timeout.
    #[must_use]
    pub const fn embed_timeout(mut self, d: Duration) -> Self {
        self.embed_timeout = Some(d);
        self
    }

    /// Sets the maximum embedding retries.
    #[must_use]
    pub const fn embed_retries(mut self, n: u32) -> Self {
        self.embed_retries = Some(n);
        self
    }

    /// Sets the default minimum similarity threshold.
    #[must_use]
    pub const fn default_min_similarity(mut self, threshold: f64) -> Self {
        self.default_min_similarity = Some(threshold);
        self
    }

    /// Sets the default result cap for product search.
    #[must_use]
    pub const fn default_top_n(mut self, n: u32) -> Self {
        self.default_top_n = Some(n);
        self
    }

    /// Builds the [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if `PGHOST`/`PGUSER`/`PGPASSWORD`
    /// or the embedding API key were not provided, or if a bound is invalid.
    pub fn build(self) -> Result<ServerConfig, ServerError> {
        let host = self.pg_host.ok_or_else(|| ServerError::Config {
            message: "PGHOST is not set".to_string(),
        })?;
        let user = self.pg_user.ok_or_else(|| ServerError::Config {
            message: "PGUSER is not set".to_string(),
        })?;
        let password = self.pg_password.ok_or_else(|| ServerError::Config {
            message: "PGPASSWORD is not set".to_string(),
        })?;
        let api_key = self.embed_api_key.ok_or_else(|| ServerError::Config {
            message: "no embedding API key (OPENAI_API_KEY or PGMCP_EMBED_API_KEY)".to_string(),
        })?;

        let pool_size = self.pool_size.unwrap_or(DEFAULT_POOL_SIZE);
        if pool_size == 0 {
            return Err(ServerError::Config {
                message: "PGMCP_POOL_SIZE must be at least 1".to_string(),
            });
        }

        let default_min_similarity = self
            .default_min_similarity
            .unwrap_or(DEFAULT_MIN_SIMILARITY);
        if !(0.0..=1.0).contains(&default_min_similarity) {
            return Err(ServerError::Config {
                message: "PGMCP_MIN_SIMILARITY must be within [0, 1]".to_string(),
            });
        }

        Ok(ServerConfig {
            db: DbConfig {
                host,
                port: self.pg_port.unwrap_or(DEFAULT_PG_PORT),
                user,
                password,
                dbname: self
                    .pg_database
                    .unwrap_or_else(|| DEFAULT_PG_DATABASE.to_string()),
            },
            embedding: EmbeddingConfig {
                api_key,
                base_url: self.embed_base_url,
                model: self
                    .embed_model
                    .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
                dimension: self.embed_dimension.unwrap_or(DEFAULT_EMBED_DIM),
                timeout: self
                    .embed_timeout
                    .unwrap_or(Duration::from_millis(DEFAULT_EMBED_TIMEOUT_MS)),
                max_retries: self.embed_retries.unwrap_or(DEFAULT_EMBED_RETRIES),
            },
            listen_host: self
                .listen_host
                .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string()),
            listen_port: self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
            pool_size,
            acquire_timeout: self
                .acquire_timeout
                .unwrap_or(Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS)),
            query_timeout: self
                .query_timeout
                .unwrap_or(Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS)),
            default_min_similarity,
            default_top_n: self.default_top_n.unwrap_or(DEFAULT_TOP_N),
        })
    }
}
