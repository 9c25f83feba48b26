//! Bounded connection pool with exclusive-lease semantics.
//!
//! Capacity is a fixed number of permits; the idle list is guarded by a
//! sync mutex that is only held around push/pop, never across an await.
//! Handles are returned on every exit path by RAII drop; a handle flagged
//! broken is discarded instead of reused.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::db::{ConnectionFactory, DbConnection};
use crate::error::ServerError;

/// Extra attempts when opening a fresh session fails.
const CONNECT_RETRIES: u32 = 2;
/// Base backoff between connect attempts.
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

struct PoolInner {
    factory: Box<dyn ConnectionFactory>,
    idle: Mutex<Vec<Box<dyn DbConnection>>>,
    capacity: Arc<Semaphore>,
    acquire_timeout: Duration,
}

/// A bounded pool of database sessions.
///
/// Connections are created lazily, up to the fixed size, and reused across
/// invocations. Acquisition that exceeds the configured timeout fails with
/// `PoolExhausted` rather than blocking indefinitely.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("available", &self.inner.capacity.available_permits())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates a pool of `size` sessions opened through `factory`.
    #[must_use]
    pub fn new(factory: Box<dyn ConnectionFactory>, size: usize, acquire_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                idle: Mutex::new(Vec::with_capacity(size)),
                capacity: Arc::new(Semaphore::new(size)),
                acquire_timeout,
            }),
        }
    }

    /// Leases one session, suspending until capacity is available.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::PoolExhausted`] when no handle frees up within
    /// the acquisition timeout, or [`ServerError::BackendUnavailable`] when
    /// a fresh session cannot be opened.
    pub async fn acquire(&self) -> Result<PoolHandle, ServerError> {
        let timeout = self.inner.acquire_timeout;
        let permit = tokio::time::timeout(
            timeout,
            Arc::clone(&self.inner.capacity).acquire_owned(),
        )
        .await
        .map_err(|_| ServerError::PoolExhausted {
            waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })?
        .map_err(|_| ServerError::Transport {
            message: "connection pool closed".to_string(),
        })?;

        // Reuse an idle session if one exists; the lock never crosses the
        // connect await below.
        let idle = {
            let mut guard = self
                .inner
                .idle
                .lock()
                .map_err(|_| ServerError::Transport {
                    message: "pool idle list poisoned".to_string(),
                })?;
            guard.pop()
        };

        let conn = match idle {
            Some(conn) if !conn.is_broken() => conn,
            // A broken idle session (or none) means opening a new one; the
            // permit keeps total live sessions at the fixed size.
            _ => self.connect_with_retry().await?,
        };

        Ok(PoolHandle {
            conn: Some(conn),
            broken: false,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Number of handles currently available without waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.capacity.available_permits()
    }

    /// Opens a session, retrying transient failures a bounded number of
    /// times with backoff.
    async fn connect_with_retry(&self) -> Result<Box<dyn DbConnection>, ServerError> {
        let mut attempt = 0;
        loop {
            match self.inner.factory.connect().await {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt < CONNECT_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "backend connect failed, retrying");
                    tokio::time::sleep(CONNECT_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// One leased session, exclusively owned for the duration of one invocation.
///
/// Dropping the handle releases it: back to the idle list when healthy, or
/// discarded when [`PoolHandle::invalidate`] was called or the session broke.
/// Release is idempotent by construction.
pub struct PoolHandle {
    conn: Option<Box<dyn DbConnection>>,
    broken: bool,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PoolHandle {
    /// Exclusive access to the leased session.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the handle was already released.
    pub fn connection(&mut self) -> Result<&mut (dyn DbConnection + 'static), ServerError> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| ServerError::Transport {
                message: "connection handle already released".to_string(),
            })
    }

    /// Flags the session as broken; it will be dropped instead of reused.
    pub const fn invalidate(&mut self) {
        self.broken = true;
    }

    /// Returns the handle to the pool. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && !self.broken
            && !conn.is_broken()
            && let Ok(mut idle) = self.pool.idle.lock()
        {
            idle.push(conn);
        }
        // The permit drops with the handle, freeing capacity either way.
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::StubFactory;

    fn pool_of(size: usize, timeout_ms: u64) -> (ConnectionPool, StubFactory) {
        let factory = StubFactory::new();
        let pool = ConnectionPool::new(
            Box::new(factory.clone()),
            size,
            Duration::from_millis(timeout_ms),
        );
        (pool, factory)
    }

    #[tokio::test]
    async fn test_acquire_and_release_reuses_session() {
        let (pool, factory) = pool_of(2, 100);

        let handle = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));
        assert_eq!(pool.available(), 1);
        handle.release();
        assert_eq!(pool.available(), 2);

        let _again = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));
        // Idle session reused, not reopened.
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test]
    async fn test_contention_waits_for_release() {
        let (pool, _factory) = pool_of(1, 500);

        let first = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|h| drop(h)) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        first.release();

        let result = waiter
            .await
            .unwrap_or_else(|e| panic!("join failed: {e}"));
        assert!(result.is_ok(), "waiter should obtain the released handle");
    }

    #[tokio::test]
    async fn test_exhaustion_times_out_without_bypassing_limit() {
        let (pool, factory) = pool_of(1, 20);

        let _held = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));

        let err = match pool.acquire().await {
            Ok(_) => panic!("second acquire must not bypass the pool limit"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "pool_exhausted");
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test]
    async fn test_invalidated_handle_is_discarded() {
        let (pool, factory) = pool_of(1, 100);

        let mut handle = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));
        handle.invalidate();
        drop(handle);

        // Capacity is back but the session was not returned to the idle list.
        assert_eq!(pool.available(), 1);
        let _fresh = pool
            .acquire()
            .await
            .unwrap_or_else(|e| panic!("acquire failed: {e}"));
        assert_eq!(factory.connects(), 2);
    }

    #[tokio::test]
    async fn test_drop_mid_invocation_frees_capacity() {
        let (pool, _factory) = pool_of(1, 100);

        {
            let _handle = pool
                .acquire()
                .await
                .unwrap_or_else(|e| panic!("acquire failed: {e}"));
            // Simulates a cancelled handler: the handle drops without an
            // explicit release.
        }
        assert_eq!(pool.available(), 1);
    }
}
