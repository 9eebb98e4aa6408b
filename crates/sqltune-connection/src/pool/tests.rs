//! Tests for connection pool functionality

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqltune_core::{
    Connection, ConnectionSource, QueryResult, Result, StatementResult, Transaction, TuneError,
    Value,
};

use super::config::PoolConfig;
use super::inner::{ConnectionFactory, ConnectionPool};

/// Mock connection for testing
struct MockConnection {
    #[allow(dead_code)]
    id: usize,
    closed: AtomicBool,
}

impl MockConnection {
    fn new(id: usize) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult {
            affected_rows: 0,
            error: None,
        })
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Err(TuneError::Other("Transactions not supported in mock".into()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock factory that counts connections created
struct MockConnectionFactory {
    counter: AtomicUsize,
}

impl MockConnectionFactory {
    fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection::new(id)))
    }
}

#[test]
fn pool_config_defaults() {
    let config = PoolConfig::default();
    assert_eq!(config.max_size(), 10);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
    assert_eq!(config.idle_timeout(), Duration::from_millis(600_000));
    assert!(config.max_lifetime().is_none());
}

#[test]
fn pool_config_builders() {
    let config = PoolConfig::new(5)
        .with_acquire_timeout_ms(5000)
        .with_idle_timeout_ms(60_000)
        .with_max_lifetime_ms(3_600_000);

    assert_eq!(config.max_size(), 5);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(5000));
    assert_eq!(config.idle_timeout(), Duration::from_millis(60_000));
    assert_eq!(config.max_lifetime(), Some(Duration::from_millis(3_600_000)));
}

#[test]
#[should_panic(expected = "max_size must be greater than 0")]
fn pool_config_rejects_zero_max() {
    let _ = PoolConfig::new(0);
}

#[tokio::test]
async fn acquire_creates_connection_on_empty_pool() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(2), Arc::clone(&factory));

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.driver_name(), "mock");
    assert_eq!(factory.count(), 1);
    assert_eq!(pool.stats().active(), 1);

    pool.release(conn).await;
    assert_eq!(pool.stats().active(), 0);
    assert_eq!(pool.stats().idle(), 1);
}

#[tokio::test]
async fn released_connection_is_reused() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(2), Arc::clone(&factory));

    let conn = pool.acquire().await.unwrap();
    pool.release(conn).await;

    let _conn = pool.acquire().await.unwrap();
    assert_eq!(factory.count(), 1, "idle connection should be recycled");
}

#[tokio::test]
async fn closed_connection_is_not_pooled() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(2), Arc::clone(&factory));

    let conn = pool.acquire().await.unwrap();
    conn.close().await.unwrap();
    pool.release(conn).await;

    assert_eq!(pool.stats().idle(), 0);

    let _conn = pool.acquire().await.unwrap();
    assert_eq!(factory.count(), 2, "a fresh connection should be created");
}

#[tokio::test]
async fn acquire_times_out_at_capacity() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::new(
        PoolConfig::new(1).with_acquire_timeout_ms(50),
        Arc::clone(&factory),
    );

    let held = pool.acquire().await.unwrap();
    let err = match pool.acquire().await {
        Ok(_) => panic!("acquire beyond capacity must time out"),
        Err(e) => e,
    };
    assert!(matches!(err, TuneError::Timeout(_)));
    assert!(err.is_connectivity());

    pool.release(held).await;
    let _conn = pool.acquire().await.unwrap();
}

#[tokio::test]
async fn release_at_capacity_unblocks_waiter() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = Arc::new(ConnectionPool::new(
        PoolConfig::new(1).with_acquire_timeout_ms(5_000),
        Arc::clone(&factory),
    ));

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.release(held).await;

    let conn = waiter.await.unwrap().unwrap();
    assert_eq!(conn.driver_name(), "mock");
    assert_eq!(factory.count(), 1);
}

#[tokio::test]
async fn close_idle_drains_pool() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(3), Arc::clone(&factory));

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    pool.release(a).await;
    pool.release(b).await;
    assert_eq!(pool.stats().idle(), 2);

    pool.close_idle().await;
    assert_eq!(pool.stats().idle(), 0);
}

/// Factory whose first connection takes longer than the acquire timeout
struct StallingFactory {
    stalled_once: AtomicBool,
    counter: AtomicUsize,
}

impl StallingFactory {
    fn new() -> Self {
        Self {
            stalled_once: AtomicBool::new(false),
            counter: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConnectionFactory for StallingFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        if !self.stalled_once.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection::new(id)))
    }
}

#[tokio::test]
async fn timed_out_acquire_does_not_shrink_capacity() {
    let pool = ConnectionPool::new(
        PoolConfig::new(1).with_acquire_timeout_ms(50),
        StallingFactory::new(),
    );

    // first attempt times out while the factory stalls
    let err = match pool.acquire().await {
        Ok(_) => panic!("stalled factory must time the acquire out"),
        Err(e) => e,
    };
    assert!(matches!(err, TuneError::Timeout(_)));

    // the capacity slot must come back for the next caller
    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.driver_name(), "mock");
}
