use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sqltune_core::store::{MemoryChangeStore, MemoryRecommendationStore};
use sqltune_core::{
    ChangeStatus, ColumnMeta, Connection, ConnectionSource, FixPlan, QueryResult, Recommendation,
    RecommendationStore, Result, Row, StatementResult, Transaction, TuneError, Value,
    VerificationStatus,
};
use tokio::sync::Notify;
use uuid::Uuid;

use super::ApplyManager;

/// Tracks executed statements and maintains a fake schema catalog
struct ScopedDb {
    executed: Mutex<Vec<String>>,
    schemas: Mutex<Vec<String>>,
    fail_on: Option<String>,
    /// When set, fix statements block here until released
    gate: Option<Arc<Notify>>,
    entered_gate: Arc<Notify>,
}

impl ScopedDb {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            schemas: Mutex::new(Vec::new()),
            fail_on: None,
            gate: None,
            entered_gate: Arc::new(Notify::new()),
        })
    }

    fn failing_on(fragment: &str) -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            schemas: Mutex::new(Vec::new()),
            fail_on: Some(fragment.to_string()),
            gate: None,
            entered_gate: Arc::new(Notify::new()),
        })
    }

    fn gated_on_fix(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            schemas: Mutex::new(Vec::new()),
            fail_on: None,
            gate: Some(gate),
            entered_gate: Arc::new(Notify::new()),
        })
    }

    fn quoted_name(sql: &str) -> Option<String> {
        let start = sql.find('"')? + 1;
        let end = sql[start..].find('"')? + start;
        Some(sql[start..end].to_string())
    }
}

struct DbHandle {
    db: Arc<ScopedDb>,
}

#[async_trait]
impl Connection for DbHandle {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.db.executed.lock().push(sql.to_string());
        if sql.starts_with("CREATE INDEX") {
            if let Some(gate) = &self.db.gate {
                self.db.entered_gate.notify_one();
                gate.notified().await;
            }
        }
        if let Some(fragment) = &self.db.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(TuneError::Planning(format!("rejected: {sql}")));
            }
        }
        if sql.starts_with("CREATE SCHEMA") {
            if let Some(name) = ScopedDb::quoted_name(sql) {
                self.db.schemas.lock().push(name);
            }
        }
        if sql.starts_with("DROP SCHEMA") {
            if let Some(name) = ScopedDb::quoted_name(sql) {
                self.db.schemas.lock().retain(|s| *s != name);
            }
        }
        Ok(StatementResult {
            affected_rows: 0,
            error: None,
        })
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if sql.contains("pg_namespace") {
            let rows = self
                .db
                .schemas
                .lock()
                .iter()
                .map(|name| {
                    Row::new(
                        vec!["nspname".into()],
                        vec![Value::String(name.clone())],
                    )
                })
                .collect();
            return Ok(QueryResult {
                columns: vec![ColumnMeta::default()],
                rows,
                execution_time_ms: 0,
            });
        }
        Ok(QueryResult::empty())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        panic!("apply never opens a transaction")
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

struct MockSource {
    db: Arc<ScopedDb>,
}

#[async_trait]
impl ConnectionSource for MockSource {
    async fn acquire(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(DbHandle {
            db: self.db.clone(),
        }))
    }
}

async fn manager_with(db: Arc<ScopedDb>, fix: FixPlan) -> (ApplyManager, Uuid) {
    let recommendations = Arc::new(MemoryRecommendationStore::new());
    let recommendation = Recommendation::new(
        "SELECT * FROM orders WHERE user_id = 5678",
        fix,
        VerificationStatus::Verified,
    );
    let id = recommendation.id;
    recommendations.create(&recommendation).await.unwrap();

    let manager = ApplyManager::new(
        Arc::new(MockSource { db }),
        recommendations,
        Arc::new(MemoryChangeStore::new()),
    );
    (manager, id)
}

fn index_fix() -> FixPlan {
    FixPlan::Index {
        sql: "CREATE INDEX idx_orders_user_id ON orders (user_id)".into(),
        reasoning: "filter column has no index".into(),
    }
}

#[tokio::test]
async fn apply_records_change_in_a_fresh_scope() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db.clone(), index_fix()).await;

    let change = manager.apply(id).await.unwrap();

    assert_eq!(change.status, ChangeStatus::Applied);
    assert!(change.scope.starts_with("sqltune_"));
    assert!(change.sql.contains("CREATE INDEX"));

    let executed = db.executed.lock().clone();
    assert!(executed[0].starts_with("CREATE SCHEMA \"sqltune_"));
    assert!(executed[1].starts_with("SET search_path"));
    assert!(executed[2].starts_with("CREATE INDEX"));
    assert_eq!(db.schemas.lock().len(), 1);
}

#[tokio::test]
async fn apply_unknown_recommendation_is_not_found() {
    let db = ScopedDb::new();
    let (manager, _) = manager_with(db, index_fix()).await;

    let err = manager.apply(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, TuneError::NotFound(_)));
}

#[tokio::test]
async fn advisory_fixes_cannot_be_applied() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(
        db,
        FixPlan::Advisory {
            reasoning: "no quantitative evidence".into(),
        },
    )
    .await;

    let err = manager.apply(id).await.unwrap_err();
    assert!(matches!(err, TuneError::InvalidState(_)));
}

#[tokio::test]
async fn second_apply_is_rejected() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db.clone(), index_fix()).await;

    manager.apply(id).await.unwrap();
    let err = manager.apply(id).await.unwrap_err();
    assert!(matches!(err, TuneError::InvalidState(_)));
    assert_eq!(db.schemas.lock().len(), 1, "only one scope may exist");
}

#[tokio::test]
async fn concurrent_applies_produce_exactly_one_applied_change() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db.clone(), index_fix()).await;
    let manager = Arc::new(manager);

    let a = tokio::spawn({
        let manager = manager.clone();
        async move { manager.apply(id).await }
    });
    let b = tokio::spawn({
        let manager = manager.clone();
        async move { manager.apply(id).await }
    });

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert_eq!(
        a.is_ok() as u8 + b.is_ok() as u8,
        1,
        "exactly one apply may win"
    );
    assert_eq!(db.schemas.lock().len(), 1);
}

#[tokio::test]
async fn rollback_drops_the_scope_and_transitions_the_record() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db.clone(), index_fix()).await;

    let applied = manager.apply(id).await.unwrap();
    let rolled_back = manager.rollback(id).await.unwrap();

    assert_eq!(rolled_back.status, ChangeStatus::RolledBack);
    assert!(rolled_back.rolled_back_at.is_some());
    assert!(db.schemas.lock().is_empty(), "scope must be dropped");
    let executed = db.executed.lock().clone();
    assert!(executed
        .iter()
        .any(|s| s.contains(&applied.scope) && s.contains("CASCADE")));
}

#[tokio::test]
async fn rollback_without_apply_is_an_explicit_error() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db, index_fix()).await;

    let err = manager.rollback(id).await.unwrap_err();
    assert!(matches!(err, TuneError::NotFound(_)));
}

#[tokio::test]
async fn rollback_twice_is_rejected() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db, index_fix()).await;

    manager.apply(id).await.unwrap();
    manager.rollback(id).await.unwrap();
    let err = manager.rollback(id).await.unwrap_err();
    assert!(matches!(err, TuneError::InvalidState(_)));
}

#[tokio::test]
async fn failed_apply_records_no_applied_change() {
    let db = ScopedDb::failing_on("CREATE INDEX");
    let (manager, id) = manager_with(db.clone(), index_fix()).await;

    let err = manager.apply(id).await.unwrap_err();
    assert!(matches!(err, TuneError::Planning(_)));

    let change = manager.get(id).await.unwrap().unwrap();
    assert_eq!(change.status, ChangeStatus::Failed);
    assert!(matches!(
        manager.rollback(id).await.unwrap_err(),
        TuneError::InvalidState(_)
    ));
    // the scope leaks until cleanup reclaims it
    assert_eq!(db.schemas.lock().len(), 1);
}

#[tokio::test]
async fn cleanup_reclaims_aged_scopes() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db.clone(), index_fix()).await;
    manager.apply(id).await.unwrap();

    // a scope from a long-dead apply attempt, plus one cleanup cannot age
    db.schemas.lock().push("sqltune_1000000000_deadbeef".into());
    db.schemas.lock().push("sqltune_reporting".into());

    let removed = manager.cleanup(1).await.unwrap();
    assert_eq!(removed, 1, "only the aged scope is reclaimed");
    let schemas = db.schemas.lock().clone();
    assert!(!schemas.contains(&"sqltune_1000000000_deadbeef".to_string()));
    assert!(schemas.contains(&"sqltune_reporting".to_string()));
    assert_eq!(schemas.len(), 2);
}

#[tokio::test]
async fn cleanup_with_zero_age_reclaims_every_completed_scope() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db.clone(), index_fix()).await;
    manager.apply(id).await.unwrap();
    db.schemas.lock().push("sqltune_1000000000_deadbeef".into());

    let removed = manager.cleanup(0).await.unwrap();
    assert_eq!(removed, 2);
    assert!(db.schemas.lock().is_empty());
}

#[tokio::test]
async fn cleanup_never_reclaims_a_scope_mid_apply() {
    let gate = Arc::new(Notify::new());
    let db = ScopedDb::gated_on_fix(gate.clone());
    let (manager, id) = manager_with(db.clone(), index_fix()).await;
    let manager = Arc::new(manager);

    let applying = tokio::spawn({
        let manager = manager.clone();
        async move { manager.apply(id).await }
    });
    // the scope schema exists but the fix statement is still running
    db.entered_gate.notified().await;
    assert_eq!(db.schemas.lock().len(), 1);

    let removed = manager.cleanup(0).await.unwrap();
    assert_eq!(removed, 0, "a scope mid-apply must survive the sweep");
    assert_eq!(db.schemas.lock().len(), 1);

    gate.notify_one();
    let change = applying.await.unwrap().unwrap();
    assert_eq!(change.status, ChangeStatus::Applied);

    // once the apply has finished the same sweep reclaims it
    assert_eq!(manager.cleanup(0).await.unwrap(), 1);
}

#[tokio::test]
async fn guard_entries_are_pruned_after_use() {
    let db = ScopedDb::new();
    let (manager, id) = manager_with(db, index_fix()).await;

    manager.apply(id).await.unwrap();
    assert!(manager.guards.lock().is_empty());

    manager.rollback(id).await.unwrap();
    assert!(manager.guards.lock().is_empty());
}
