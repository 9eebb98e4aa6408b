//! Connection, transaction, and connection-source traits

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A database connection
///
/// Hypothetical indexes are session-scoped in the underlying facility, so
/// any sequence that registers them must run entirely on one `Connection`
/// value; interleaving two simulations on the same physical session would
/// corrupt both results.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies state (DDL, INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT, EXPLAIN)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A database transaction
///
/// The rewrite cost check opens one of these and always rolls it back;
/// nothing executed inside the scope can outlive the request.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;
}

/// Source of database connections, injected into every engine component
///
/// The engine never creates or closes the underlying pool; it borrows a
/// connection for the shortest span correctness requires and hands it back
/// through [`ConnectionSource::release`] on every exit path.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Acquire a connection
    ///
    /// Returns [`crate::TuneError::Connection`] when no connection can be
    /// provided, so callers can distinguish "we can't reach the database"
    /// from query-level failures.
    async fn acquire(&self) -> Result<Arc<dyn Connection>>;

    /// Return a previously acquired connection
    ///
    /// The default implementation drops the connection; pooled sources
    /// override this to recycle it.
    async fn release(&self, conn: Arc<dyn Connection>) {
        let _ = conn;
    }
}

#[async_trait]
impl<T: ConnectionSource + ?Sized> ConnectionSource for Arc<T> {
    async fn acquire(&self) -> Result<Arc<dyn Connection>> {
        (**self).acquire().await
    }

    async fn release(&self, conn: Arc<dyn Connection>) {
        (**self).release(conn).await
    }
}
