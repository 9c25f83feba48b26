//! Semantic product search.
//!
//! Embeds the query text once, runs a single similarity-ranked SQL query
//! against the product embeddings (`similarity = 1 - cosine distance`),
//! and re-enforces the threshold, stock, and cap invariants on the rows
//! that come back so they hold regardless of backend behavior.

use std::sync::Arc;

use serde::Serialize;

use crate::db::pool::PoolHandle;
use crate::db::{Scalar, SqlParam, scalar_to_json};
use crate::embedding::Embedder;
use crate::error::ServerError;
use crate::executor::QueryExecutor;

/// One `similar_products` request with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Natural-language search text.
    pub text: String,
    /// Minimum stock filter (non-negative).
    pub min_stock: i64,
    /// Result-count cap (positive, bounded by the registry ceiling).
    pub top_n: u32,
    /// Minimum similarity threshold in [0, 1].
    pub min_similarity: f64,
}

/// One ranked search hit: similarity plus the product's columns.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityResult {
    /// Similarity in [0, 1]; 1 means identical.
    pub similarity: f64,
    /// Remaining product columns, in projection order.
    #[serde(flatten)]
    pub product: serde_json::Map<String, serde_json::Value>,
}

/// The single similarity query. The vector arrives as a `$1::vector`
/// literal so the backend needs no embedding function of its own; ordering
/// by distance ascending equals similarity descending, and backend order
/// breaks ties.
const SIMILARITY_SQL: &str = "\
SELECT p.product_id, p.name, p.description, p.list_price::float8 AS list_price, p.stock, \
(1 - (e.embedding <=> $1::vector))::float8 AS similarity \
FROM products p \
JOIN product_embeddings e ON e.product_id = p.product_id \
WHERE (1 - (e.embedding <=> $1::vector)) > $2 AND p.stock >= $3 \
ORDER BY e.embedding <=> $1::vector \
LIMIT $4";

/// Embedding-backed product search engine.
#[derive(Clone)]
pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    executor: QueryExecutor,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("dimension", &self.embedder.dimension())
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    /// Creates an engine over the given embedder and executor.
    #[must_use]
    pub const fn new(embedder: Arc<dyn Embedder>, executor: QueryExecutor) -> Self {
        Self { embedder, executor }
    }

    /// Runs one search. An embedding failure aborts the whole search with
    /// no partial results; an empty result set is a success.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidSearchText`] for empty text,
    /// [`ServerError::EmbeddingService`] /
    /// [`ServerError::EmbeddingContract`] from the embedding step, or the
    /// executor's failures.
    pub async fn search(
        &self,
        handle: &mut PoolHandle,
        query: &SearchQuery,
    ) -> Result<Vec<SimilarityResult>, ServerError> {
        if query.text.trim().is_empty() {
            return Err(ServerError::InvalidSearchText);
        }

        let vector = self.embedder.embed(&query.text).await?;
        let params = [
            SqlParam::Text(vector_literal(&vector)),
            SqlParam::Float(query.min_similarity),
            SqlParam::Int(query.min_stock),
            SqlParam::Int(i64::from(query.top_n)),
        ];

        let rows = self.executor.query(handle, SIMILARITY_SQL, &params).await?;

        let similarity_idx =
            rows.column_index("similarity")
                .ok_or_else(|| ServerError::QueryFailed {
                    message: "similarity query returned no similarity column".to_string(),
                })?;
        let stock_idx = rows.column_index("stock");

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows.rows {
            #[allow(clippy::cast_precision_loss)]
            let similarity = match row.get(similarity_idx) {
                Some(Scalar::Float(f)) => *f,
                Some(Scalar::Int(i)) => *i as f64,
                _ => continue,
            };
            if similarity <= query.min_similarity {
                continue;
            }
            if let Some(idx) = stock_idx
                && let Some(Scalar::Int(stock)) = row.get(idx)
                && *stock < query.min_stock
            {
                continue;
            }

            let product = rows
                .columns
                .iter()
                .zip(row.iter())
                .filter(|(c, _)| c.as_str() != "similarity")
                .map(|(c, v)| (c.clone(), scalar_to_json(v)))
                .collect();
            results.push(SimilarityResult {
                similarity,
                product,
            });
        }

        // Stable: equal similarities keep backend order.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(query.top_n as usize);
        Ok(results)
    }
}

/// Renders a vector as the pgvector text literal `[v1,v2,...]`.
#[must_use]
pub fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::db::ResultSet;
    use crate::db::pool::ConnectionPool;
    use crate::testing::{FailingEmbedder, StubConnection, StubEmbedder, StubFactory};
    use std::time::Duration;

    fn product_rows(entries: &[(&str, i64, f64)]) -> ResultSet {
        ResultSet::new(
            vec![
                "product_id".to_string(),
                "name".to_string(),
                "stock".to_string(),
                "similarity".to_string(),
            ],
            entries
                .iter()
                .enumerate()
                .map(|(i, (name, stock, sim))| {
                    vec![
                        Scalar::Int(i as i64 + 1),
                        Scalar::Text((*name).to_string()),
                        Scalar::Int(*stock),
                        Scalar::Float(*sim),
                    ]
                })
                .collect(),
        )
    }

    async fn handle_with(rows: ResultSet) -> (PoolHandle, StubConnection) {
        let factory = StubFactory::with_connection(StubConnection::new().with_result(rows));
        let template = factory.connection();
        let pool = ConnectionPool::new(Box::new(factory), 1, Duration::from_millis(100));
        let handle = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));
        (handle, template)
    }

    fn engine(embedder: Arc<dyn Embedder>) -> SearchEngine {
        SearchEngine::new(embedder, QueryExecutor::new(Duration::from_millis(500)))
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            min_stock: 0,
            top_n: 20,
            min_similarity: 0.75,
        }
    }

    #[tokio::test]
    async fn test_rejects_whitespace_search_text() {
        let (mut handle, conn) = handle_with(ResultSet::default()).await;
        let eng = engine(Arc::new(StubEmbedder::new(vec![0.1, 0.2])));
        let err = match eng.search(&mut handle, &query("   ")).await {
            Ok(_) => panic!("expected rejection"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "invalid_search_text");
        assert_eq!(conn.calls(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_with_no_partial_results() {
        let (mut handle, conn) = handle_with(product_rows(&[("bike", 10, 0.9)])).await;
        let eng = engine(Arc::new(FailingEmbedder));
        let err = match eng.search(&mut handle, &query("bike")).await {
            Ok(_) => panic!("expected embedding failure"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "embedding_service_error");
        assert_eq!(conn.calls(), 0, "no query may run after an embed failure");
    }

    #[tokio::test]
    async fn test_results_ordered_and_filtered() {
        let rows = product_rows(&[
            ("helmet", 10, 0.95),
            ("gloves", 5, 0.80),
            ("sticker", 100, 0.60), // below threshold
            ("pump", 0, 0.90),
        ]);
        let (mut handle, _conn) = handle_with(rows).await;
        let eng = engine(Arc::new(StubEmbedder::new(vec![0.5, 0.5])));

        let mut q = query("cycling gear");
        q.min_stock = 1;
        let results = eng
            .search(&mut handle, &q)
            .await
            .unwrap_or_else(|e| panic!("search failed: {e}"));

        let names: Vec<&str> = results
            .iter()
            .filter_map(|r| r.product.get("name").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(names, vec!["helmet", "gloves"]);
        for r in &results {
            assert!(r.similarity > q.min_similarity);
        }
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_cap_truncates_results() {
        let rows = product_rows(&[("a", 1, 0.99), ("b", 1, 0.98), ("c", 1, 0.97)]);
        let (mut handle, _conn) = handle_with(rows).await;
        let eng = engine(Arc::new(StubEmbedder::new(vec![0.5])));

        let mut q = query("things");
        q.top_n = 2;
        let results = eng
            .search(&mut handle, &q)
            .await
            .unwrap_or_else(|e| panic!("search failed: {e}"));
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_result_set_is_success() {
        let (mut handle, _conn) = handle_with(product_rows(&[])).await;
        let eng = engine(Arc::new(StubEmbedder::new(vec![0.5])));
        let results = eng
            .search(&mut handle, &query("nothing like this"))
            .await
            .unwrap_or_else(|e| panic!("search failed: {e}"));
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_identical_requests_yield_identical_output() {
        let rows = product_rows(&[("helmet", 10, 0.95), ("gloves", 5, 0.80)]);
        let eng = engine(Arc::new(StubEmbedder::new(vec![0.5, 0.5])));
        let q = query("cycling gear");

        let (mut h1, _c1) = handle_with(rows.clone()).await;
        let first = eng
            .search(&mut h1, &q)
            .await
            .unwrap_or_else(|e| panic!("search failed: {e}"));
        let (mut h2, _c2) = handle_with(rows).await;
        let second = eng
            .search(&mut h2, &q)
            .await
            .unwrap_or_else(|e| panic!("search failed: {e}"));

        let a = serde_json::to_string(&first).unwrap_or_default();
        let b = serde_json::to_string(&second).unwrap_or_default();
        assert_eq!(a, b, "repeat searches must be byte-identical");
    }

    #[test]
    fn test_vector_literal_shape() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.0]), "[0.5,-1,2]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
