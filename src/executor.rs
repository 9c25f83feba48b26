//! Guarded statement execution.
//!
//! Classifies each statement by its leading keyword before it reaches the
//! backend: `run_query` only admits read statements, `apply_update` only
//! mutating ones. The guard is syntactic, a policy boundary between the
//! read and write tools rather than a semantic guarantee. Execution itself
//! is bounded by a mandatory timeout and materializes rows eagerly.

use std::time::Duration;

use crate::db::pool::PoolHandle;
use crate::db::{ResultSet, SqlParam};
use crate::error::ServerError;

/// Leading keywords that classify a statement as a read.
const READ_KEYWORDS: &[&str] = &["select", "with", "show", "explain", "values", "table"];

/// Leading keywords that classify a statement as mutating.
const WRITE_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "create", "drop", "alter", "truncate", "grant", "revoke",
    "merge",
];

/// Statement category derived from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Reads data without changing backend state.
    Read,
    /// Changes backend state (DML or DDL).
    Write,
    /// Unrecognized leading keyword; admitted by neither tool.
    Other,
}

/// Classifies a statement by its first keyword, ignoring leading
/// whitespace and `--` / `/* */` comments.
#[must_use]
pub fn classify(sql: &str) -> StatementKind {
    let Some(keyword) = leading_keyword(sql) else {
        return StatementKind::Other;
    };
    if READ_KEYWORDS.contains(&keyword.as_str()) {
        StatementKind::Read
    } else if WRITE_KEYWORDS.contains(&keyword.as_str()) {
        StatementKind::Write
    } else {
        StatementKind::Other
    }
}

/// Extracts the first keyword after whitespace and comments, lowercased.
fn leading_keyword(sql: &str) -> Option<String> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }

    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_lowercase())
    }
}

/// Executes guarded statements over leased pool handles.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    query_timeout: Duration,
}

impl QueryExecutor {
    /// Creates an executor with the given per-statement timeout.
    #[must_use]
    pub const fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Runs a read statement for the named tool.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DisallowedStatementKind`] without touching the
    /// backend when the statement is not a read; otherwise propagates
    /// execution failures.
    pub async fn run_read(
        &self,
        handle: &mut PoolHandle,
        tool: &str,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<ResultSet, ServerError> {
        match classify(sql) {
            StatementKind::Read => {}
            kind => {
                return Err(ServerError::DisallowedStatementKind {
                    tool: tool.to_string(),
                    message: format!("expected a read statement, found {kind:?}"),
                });
            }
        }
        self.query(handle, sql, params).await
    }

    /// Runs a mutating statement for the named tool, returning the
    /// affected-row count.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DisallowedStatementKind`] without touching the
    /// backend when the statement is not mutating.
    pub async fn run_write(
        &self,
        handle: &mut PoolHandle,
        tool: &str,
        sql: &str,
    ) -> Result<u64, ServerError> {
        match classify(sql) {
            StatementKind::Write => {}
            kind => {
                return Err(ServerError::DisallowedStatementKind {
                    tool: tool.to_string(),
                    message: format!("expected a mutating statement, found {kind:?}"),
                });
            }
        }

        let conn = handle.connection()?;
        let result = tokio::time::timeout(self.query_timeout, conn.execute(sql, &[]))
            .await
            .map_err(|_| self.timed_out())?;
        Self::mark_on_transport_error(handle, result)
    }

    /// Runs an already-trusted statement (internal catalogue queries, the
    /// similarity query) without the keyword guard.
    pub async fn query(
        &self,
        handle: &mut PoolHandle,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<ResultSet, ServerError> {
        let conn = handle.connection()?;
        let result = tokio::time::timeout(self.query_timeout, conn.query(sql, params))
            .await
            .map_err(|_| self.timed_out())?;
        Self::mark_on_transport_error(handle, result)
    }

    fn timed_out(&self) -> ServerError {
        ServerError::BackendUnavailable {
            message: format!(
                "statement timed out after {}ms",
                self.query_timeout.as_millis()
            ),
        }
    }

    /// A connection-level failure poisons the handle so the pool discards it.
    fn mark_on_transport_error<T>(
        handle: &mut PoolHandle,
        result: Result<T, ServerError>,
    ) -> Result<T, ServerError> {
        if let Err(ServerError::BackendUnavailable { .. }) = &result {
            handle.invalidate();
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::db::pool::ConnectionPool;
    use crate::testing::{StubConnection, StubFactory, single_column};
    use proptest::prelude::*;
    use test_case::test_case;

    async fn handle_for(conn: StubConnection) -> (PoolHandle, StubConnection) {
        let factory = StubFactory::with_connection(conn);
        let template = factory.connection();
        let pool = ConnectionPool::new(Box::new(factory), 1, Duration::from_millis(100));
        let handle = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));
        (handle, template)
    }

    fn executor() -> QueryExecutor {
        QueryExecutor::new(Duration::from_millis(500))
    }

    #[test_case("SELECT * FROM t", StatementKind::Read; "plain select")]
    #[test_case("  with x as (select 1) select * from x", StatementKind::Read; "cte")]
    #[test_case("EXPLAIN SELECT 1", StatementKind::Read; "explain")]
    #[test_case("INSERT INTO t VALUES (1)", StatementKind::Write; "insert")]
    #[test_case("Update t set a = 1", StatementKind::Write; "update mixed case")]
    #[test_case("DROP TABLE t", StatementKind::Write; "drop")]
    #[test_case("TRUNCATE t", StatementKind::Write; "truncate")]
    #[test_case("CREATE TABLE t (a int)", StatementKind::Write; "create")]
    #[test_case("-- a comment\nSELECT 1", StatementKind::Read; "line comment")]
    #[test_case("/* block */ DELETE FROM t", StatementKind::Write; "block comment")]
    #[test_case("COPY t FROM stdin", StatementKind::Other; "unknown keyword")]
    #[test_case("", StatementKind::Other; "empty")]
    fn test_classify(sql: &str, expected: StatementKind) {
        assert_eq!(classify(sql), expected);
    }

    proptest! {
        // Leading whitespace and comments never change the classification.
        #[test]
        fn prop_classify_ignores_leading_trivia(
            pad in "[ \t\n]{0,10}",
            comment in "[a-z ]{0,20}",
            keyword_idx in 0..WRITE_KEYWORDS.len()
        ) {
            let keyword = WRITE_KEYWORDS[keyword_idx];
            let bare = format!("{keyword} something");
            let padded = format!("{pad}-- {comment}\n{bare}");
            prop_assert_eq!(classify(&bare), classify(&padded));
        }
    }

    #[tokio::test]
    async fn test_run_read_rejects_mutation_before_backend() {
        let (mut handle, conn) = handle_for(StubConnection::new()).await;
        let err = match executor()
            .run_read(&mut handle, "run_query", "DELETE FROM products", &[])
            .await
        {
            Ok(_) => panic!("expected rejection"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "disallowed_statement_kind");
        assert_eq!(conn.calls(), 0, "the backend must not be touched");
    }

    #[tokio::test]
    async fn test_run_write_rejects_read_before_backend() {
        let (mut handle, conn) = handle_for(StubConnection::new()).await;
        let err = match executor()
            .run_write(&mut handle, "apply_update", "SELECT * FROM products")
            .await
        {
            Ok(_) => panic!("expected rejection"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "disallowed_statement_kind");
        assert_eq!(conn.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_write_rejects_unknown_keyword() {
        let (mut handle, conn) = handle_for(StubConnection::new()).await;
        let result = executor()
            .run_write(&mut handle, "apply_update", "VACUUM products")
            .await;
        assert!(result.is_err());
        assert_eq!(conn.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_read_returns_rows() {
        let scripted = StubConnection::new().with_result(single_column("name", &["a", "b"]));
        let (mut handle, _conn) = handle_for(scripted).await;
        let rs = executor()
            .run_read(&mut handle, "run_query", "SELECT name FROM t", &[])
            .await
            .unwrap_or_else(|e| panic!("query failed: {e}"));
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.columns, vec!["name".to_string()]);
    }

    #[tokio::test]
    async fn test_run_write_returns_affected_count() {
        let scripted = StubConnection::new().with_affected(3);
        let (mut handle, _conn) = handle_for(scripted).await;
        let affected = executor()
            .run_write(&mut handle, "apply_update", "UPDATE t SET a = 1")
            .await
            .unwrap_or_else(|e| panic!("execute failed: {e}"));
        assert_eq!(affected, 3);
    }

    #[tokio::test]
    async fn test_query_failure_is_structured() {
        let scripted = StubConnection::new().failing("column \"nope\" does not exist");
        let (mut handle, _conn) = handle_for(scripted).await;
        let err = match executor()
            .run_read(&mut handle, "run_query", "SELECT nope FROM t", &[])
            .await
        {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "query_failed");
    }
}
