//! Error taxonomy for the tool-invocation server.
//!
//! Every failure a tool invocation can produce maps to exactly one variant
//! here, and every variant carries a stable [`ServerError::kind`] string so
//! callers can distinguish user error from backend outage without parsing
//! free text.

use thiserror::Error;

/// Errors surfaced by tool invocations and server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A tool argument failed presence, type, or bounds validation.
    #[error("invalid parameter '{field}' for tool '{tool}': {message}")]
    InvalidParameters {
        /// Tool whose arguments were rejected.
        tool: String,
        /// The offending field.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// The requested tool name is not in the registry.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// The unrecognized tool name.
        name: String,
    },

    /// The statement's leading keyword does not match the tool's
    /// side-effect class. Rejected before any backend call.
    #[error("tool '{tool}' does not allow this statement kind: {message}")]
    DisallowedStatementKind {
        /// Tool that refused the statement.
        tool: String,
        /// Which keyword/category was found.
        message: String,
    },

    /// A result column could not be coerced to a transport-safe scalar.
    #[error("unsupported column type '{ty}' in column '{column}'")]
    UnsupportedColumnType {
        /// The column that failed to convert.
        column: String,
        /// The backend type name.
        ty: String,
    },

    /// Pool acquisition did not obtain a handle within the configured
    /// timeout.
    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// The embedding service call failed after retries were exhausted.
    #[error("embedding service error: {message}")]
    EmbeddingService {
        /// Provider-reported or transport-level failure detail.
        message: String,
    },

    /// The embedding service returned a vector of the wrong dimension.
    #[error("embedding contract violation: expected dimension {expected}, got {actual}")]
    EmbeddingContract {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },

    /// Search text was empty or whitespace-only.
    #[error("search text must not be empty")]
    InvalidSearchText,

    /// The backend rejected a well-formed statement (bad column, constraint
    /// violation, ...). The connection stays usable.
    #[error("query failed: {message}")]
    QueryFailed {
        /// Backend-reported error detail.
        message: String,
    },

    /// The backend could not be reached or the connection broke mid-flight.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// Transport-level failure detail.
        message: String,
    },

    /// A transport-level protocol failure.
    #[error("transport error: {message}")]
    Transport {
        /// What went wrong on the wire.
        message: String,
    },

    /// Startup-time configuration problem (missing credentials, bad value).
    #[error("configuration error: {message}")]
    Config {
        /// Which key/value was rejected.
        message: String,
    },
}

impl ServerError {
    /// Stable machine-readable kind, carried in structured error payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::DisallowedStatementKind { .. } => "disallowed_statement_kind",
            Self::UnsupportedColumnType { .. } => "unsupported_column_type",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::EmbeddingService { .. } => "embedding_service_error",
            Self::EmbeddingContract { .. } => "embedding_contract_violation",
            Self::InvalidSearchText => "invalid_search_text",
            Self::QueryFailed { .. } => "query_failed",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::Transport { .. } => "transport_error",
            Self::Config { .. } => "configuration_error",
        }
    }

    /// Whether the failure is local to the request (user error) rather than
    /// a backend/service outage.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameters { .. }
                | Self::UnknownTool { .. }
                | Self::DisallowedStatementKind { .. }
                | Self::InvalidSearchText
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        let err = ServerError::PoolExhausted { waited_ms: 5000 };
        assert_eq!(err.kind(), "pool_exhausted");

        let err = ServerError::InvalidParameters {
            tool: "similar_products".to_string(),
            field: "top_n".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(err.kind(), "invalid_parameters");
    }

    #[test]
    fn test_user_error_classification() {
        assert!(ServerError::InvalidSearchText.is_user_error());
        assert!(
            ServerError::UnknownTool {
                name: "nope".to_string()
            }
            .is_user_error()
        );
        assert!(
            !ServerError::BackendUnavailable {
                message: "connection refused".to_string()
            }
            .is_user_error()
        );
    }

    #[test]
    fn test_display_names_offending_field() {
        let err = ServerError::InvalidParameters {
            tool: "similar_products".to_string(),
            field: "min_similarity".to_string(),
            message: "must be within [0, 1]".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("min_similarity"));
        assert!(text.contains("similar_products"));
    }
}
