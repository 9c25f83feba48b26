//! Deterministic stubs for tests.
//!
//! Provides scripted database connections, a counting connection factory,
//! and fixed/failing embedders so the executor, search engine, and pool can
//! be exercised without a live backend.
//!
//! # Example
//!
//! ```ignore
//! use pgmcp::testing::{StubConnection, StubFactory};
//!
//! let conn = StubConnection::new()
//!     .with_result(single_column("datname", &["db1", "db2"]));
//! // First query returns the scripted rows; every call is counted.
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::db::{ConnectionFactory, DbConnection, ResultSet, Scalar, SqlParam};
use crate::embedding::Embedder;
use crate::error::ServerError;

/// A scripted database session.
///
/// Queued result sets are returned in order; once the queue is empty,
/// queries return an empty result set. Every statement is captured for
/// assertions, and call counts are shared across clones.
#[derive(Clone, Default)]
pub struct StubConnection {
    results: Arc<Mutex<VecDeque<ResultSet>>>,
    affected: Arc<Mutex<VecDeque<u64>>>,
    statements: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    broken: Arc<AtomicUsize>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl StubConnection {
    /// Creates an empty stub session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a result set for the next `query` call.
    #[must_use]
    pub fn with_result(self, rs: ResultSet) -> Self {
        if let Ok(mut q) = self.results.lock() {
            q.push_back(rs);
        }
        self
    }

    /// Queues an affected-row count for the next `execute` call.
    #[must_use]
    pub fn with_affected(self, n: u64) -> Self {
        if let Ok(mut q) = self.affected.lock() {
            q.push_back(n);
        }
        self
    }

    /// Makes every call fail with `QueryFailed` carrying this message.
    #[must_use]
    pub fn failing(self, message: impl Into<String>) -> Self {
        if let Ok(mut f) = self.fail_with.lock() {
            *f = Some(message.into());
        }
        self
    }

    /// Number of statements that reached this session.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Statements captured so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Marks the session broken for subsequent health checks.
    pub fn mark_broken(&self) {
        self.broken.store(1, Ordering::SeqCst);
    }

    fn record(&self, sql: &str) -> Result<(), ServerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut s) = self.statements.lock() {
            s.push(sql.to_string());
        }
        if let Ok(f) = self.fail_with.lock()
            && let Some(message) = f.clone()
        {
            return Err(ServerError::QueryFailed { message });
        }
        Ok(())
    }
}

#[async_trait]
impl DbConnection for StubConnection {
    async fn query(&mut self, sql: &str, _params: &[SqlParam]) -> Result<ResultSet, ServerError> {
        self.record(sql)?;
        let next = self.results.lock().ok().and_then(|mut q| q.pop_front());
        Ok(next.unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, _params: &[SqlParam]) -> Result<u64, ServerError> {
        self.record(sql)?;
        let next = self.affected.lock().ok().and_then(|mut q| q.pop_front());
        Ok(next.unwrap_or(0))
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst) != 0
    }
}

/// A factory that hands out clones of one template session and counts opens.
#[derive(Clone, Default)]
pub struct StubFactory {
    template: StubConnection,
    connects: Arc<AtomicUsize>,
}

impl StubFactory {
    /// Creates a factory producing empty stub sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory whose sessions share the given template's script
    /// and counters.
    #[must_use]
    pub fn with_connection(template: StubConnection) -> Self {
        Self {
            template,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The shared template session, for assertions on captured statements.
    #[must_use]
    pub fn connection(&self) -> StubConnection {
        self.template.clone()
    }
}

#[async_trait]
impl ConnectionFactory for StubFactory {
    async fn connect(&self) -> Result<Box<dyn DbConnection>, ServerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.template.clone()))
    }
}

/// An embedder returning one fixed vector for every input.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    vector: Vec<f32>,
    calls: Arc<AtomicUsize>,
}

impl StubEmbedder {
    /// Creates a stub that always returns `vector`.
    #[must_use]
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of embed calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// An embedder that always fails with `EmbeddingService`.
#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServerError> {
        Err(ServerError::EmbeddingService {
            message: "stub embedder configured to fail".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        0
    }
}

/// Builds a one-column result set from string values.
#[must_use]
pub fn single_column(name: &str, values: &[&str]) -> ResultSet {
    ResultSet::new(
        vec![name.to_string()],
        values
            .iter()
            .map(|v| vec![Scalar::Text((*v).to_string())])
            .collect(),
    )
}
