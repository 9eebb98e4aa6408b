//! Connection pool implementation

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use sqltune_core::{Connection, ConnectionSource, Result, TuneError};

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation always returns true for open connections.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Internal wrapper for pooled connections with metadata
struct IdleConnection {
    connection: Arc<dyn Connection>,
    pooled_at: Instant,
}

impl IdleConnection {
    fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            pooled_at: Instant::now(),
        }
    }
}

/// A connection pool that manages a set of database connections
///
/// The pool hands connections out through the [`ConnectionSource`] contract:
/// callers `acquire` a connection, confine one logical sequence of work to
/// it, and `release` it on every exit path. The hypothetical-index facility
/// mutates session state, so a connection is never shared between two
/// in-flight sequences.
pub struct ConnectionPool {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory
    factory: Arc<dyn ConnectionFactory>,
    /// Available idle connections
    idle: Mutex<VecDeque<IdleConnection>>,
    /// Semaphore to limit total connections
    semaphore: Arc<Semaphore>,
    /// Number of active connections (borrowed from pool)
    active_count: AtomicUsize,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            config,
            factory: Arc::new(factory),
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
        }
    }

    /// Try to get an idle connection, validating and checking idle age
    async fn try_get_idle(&self) -> Option<Arc<dyn Connection>> {
        loop {
            let pooled = { self.idle.lock().pop_front() };

            match pooled {
                Some(inner) => {
                    // Check idle timeout
                    if inner.pooled_at.elapsed() > self.config.idle_timeout() {
                        let _ = inner.connection.close().await;
                        continue;
                    }

                    // Check max lifetime since last pooling
                    if let Some(max_lifetime) = self.config.max_lifetime() {
                        if inner.pooled_at.elapsed() > max_lifetime {
                            let _ = inner.connection.close().await;
                            continue;
                        }
                    }

                    // Validate connection
                    if !self.factory.validate(&*inner.connection).await {
                        let _ = inner.connection.close().await;
                        continue;
                    }

                    return Some(inner.connection);
                }
                None => return None,
            }
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let active = self.active_count.load(Ordering::SeqCst);
        PoolStats::new(idle + active, idle, active)
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Close all idle connections in the pool
    pub async fn close_idle(&self) {
        let connections: Vec<_> = {
            let mut idle = self.idle.lock();
            idle.drain(..).collect()
        };

        for inner in connections {
            let _ = inner.connection.close().await;
        }
    }
}

#[async_trait]
impl ConnectionSource for ConnectionPool {
    /// Acquire a connection from the pool
    ///
    /// Tries an idle connection first, creates a new one when under
    /// `max_size`, and otherwise waits for a release. Times out with a
    /// connectivity error so callers can tell "can't reach the database"
    /// apart from statement-level failures.
    async fn acquire(&self) -> Result<Arc<dyn Connection>> {
        let result = tokio::time::timeout(self.config.acquire_timeout(), async {
            // The permit stays held across the idle lookup and factory
            // call: if the timeout cancels this future mid-await, or the
            // factory fails, dropping the permit restores capacity.
            let permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|_| TuneError::Connection("Pool semaphore closed".into()))?;

            let connection = match self.try_get_idle().await {
                Some(conn) => conn,
                None => self.factory.create().await?,
            };

            // The connection is handed out; its capacity slot is returned
            // by release() via add_permits.
            permit.forget();
            self.active_count.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(active = self.active_count.load(Ordering::SeqCst), "connection acquired");
            Ok(connection)
        })
        .await;

        match result {
            Ok(conn) => conn,
            Err(_) => Err(TuneError::Timeout(format!(
                "Timed out waiting for connection (timeout: {:?})",
                self.config.acquire_timeout()
            ))),
        }
    }

    /// Return a connection to the pool
    async fn release(&self, connection: Arc<dyn Connection>) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        self.semaphore.add_permits(1);

        // Don't keep closed connections
        if connection.is_closed() {
            return;
        }

        let mut idle = self.idle.lock();
        idle.push_back(IdleConnection::new(connection));
    }
}
