//! Datastore seam: transport-safe row shapes and connection traits.
//!
//! The relational backend is reached exclusively through [`DbConnection`]
//! and [`ConnectionFactory`], so tests substitute deterministic stubs and
//! the pool never depends on a concrete driver.

pub mod pool;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ServerError;

/// A single transport-safe value: JSON-representable scalars only.
///
/// Backend-native types that do not fit one of these variants are rejected
/// at row-conversion time with `UnsupportedColumnType`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer width, widened to 64 bits.
    Int(i64),
    /// Any float width, widened to 64 bits.
    Float(f64),
    /// Text, or a text rendering of a string-like type (uuid, timestamp).
    Text(String),
}

/// A parameter bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Text parameter (also used for `::vector` literals).
    Text(String),
    /// 64-bit integer parameter.
    Int(i64),
    /// 64-bit float parameter.
    Float(f64),
}

/// An eagerly materialized query result.
///
/// Column order is the statement's projection order; every row has exactly
/// `columns.len()` values. No cursor outlives the invocation that produced
/// this.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// Column names in projection order.
    pub columns: Vec<String>,
    /// Row values, outer order as returned by the backend.
    pub rows: Vec<Vec<Scalar>>,
}

impl ResultSet {
    /// Creates a result set from columns and rows.
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result set holds no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the index of a named column, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Renders rows as ordered column-name → value records.
    #[must_use]
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.clone(), scalar_to_json(v)))
                    .collect()
            })
            .collect()
    }
}

/// Converts one scalar to its JSON representation.
#[must_use]
pub fn scalar_to_json(value: &Scalar) -> serde_json::Value {
    match value {
        Scalar::Null => serde_json::Value::Null,
        Scalar::Bool(b) => serde_json::Value::Bool(*b),
        Scalar::Int(i) => serde_json::Value::from(*i),
        Scalar::Float(f) => serde_json::Value::from(*f),
        Scalar::Text(s) => serde_json::Value::String(s.clone()),
    }
}

/// One live database session.
///
/// A connection is owned exclusively by the pool handle that leased it;
/// the trait is `&mut self` so that exclusivity is enforced by the type
/// system rather than by locking inside a handler.
#[async_trait]
pub trait DbConnection: Send {
    /// Executes a statement and eagerly materializes all result rows.
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<ResultSet, ServerError>;

    /// Executes a statement and returns the affected-row count.
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, ServerError>;

    /// Whether the underlying session is known to be unusable.
    fn is_broken(&self) -> bool;
}

/// Creates new database sessions for the pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Opens a new session.
    async fn connect(&self) -> Result<Box<dyn DbConnection>, ServerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_serializes_untagged() {
        let row = vec![
            Scalar::Null,
            Scalar::Bool(true),
            Scalar::Int(42),
            Scalar::Float(1.5),
            Scalar::Text("bike".to_string()),
        ];
        let json = serde_json::to_value(&row).unwrap_or_default();
        assert_eq!(json, serde_json::json!([null, true, 42, 1.5, "bike"]));
    }

    #[test]
    fn test_records_pairs_columns_with_values() {
        let rs = ResultSet::new(
            vec!["name".to_string(), "stock".to_string()],
            vec![
                vec![Scalar::Text("helmet".to_string()), Scalar::Int(12)],
                vec![Scalar::Text("pump".to_string()), Scalar::Int(0)],
            ],
        );
        let records = rs.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "helmet");
        assert_eq!(records[1]["stock"], 0);
    }

    #[test]
    fn test_column_index() {
        let rs = ResultSet::new(vec!["a".to_string(), "b".to_string()], Vec::new());
        assert_eq!(rs.column_index("b"), Some(1));
        assert_eq!(rs.column_index("c"), None);
        assert!(rs.is_empty());
    }
}
