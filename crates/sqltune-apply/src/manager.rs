//! Apply, rollback, and cleanup of recommendation fixes
//!
//! Every apply runs inside a freshly created, disposable schema scope so
//! a bad fix never touches shipped objects. Rollback drops the scope
//! wholesale. Cleanup sweeps scopes that outlived their retention,
//! covering apply attempts that failed partway and left a scope behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use sqltune_core::{
    AppliedChange, ChangeStatus, ChangeStore, ConnectionSource, RecommendationStore, Result,
    TuneError,
};
use uuid::Uuid;

/// Prefix shared by every disposable scope this manager creates
const SCOPE_PREFIX: &str = "sqltune_";

/// Applies recommendation fixes inside disposable schema scopes
///
/// Concurrent applies for the same recommendation serialize on a per-id
/// mutex; the second caller observes the first one's record and gets
/// `InvalidState` instead of producing a duplicate applied row.
pub struct ApplyManager {
    source: Arc<dyn ConnectionSource>,
    recommendations: Arc<dyn RecommendationStore>,
    changes: Arc<dyn ChangeStore>,
    guards: parking_lot::Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    in_flight: Arc<parking_lot::Mutex<HashSet<String>>>,
}

impl ApplyManager {
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        recommendations: Arc<dyn RecommendationStore>,
        changes: Arc<dyn ChangeStore>,
    ) -> Self {
        Self {
            source,
            recommendations,
            changes,
            guards: parking_lot::Mutex::new(HashMap::new()),
            in_flight: Arc::new(parking_lot::Mutex::new(HashSet::new())),
        }
    }

    fn guard_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.guards.lock().entry(id).or_default().clone()
    }

    /// Drops the guard entry once nobody else holds it
    ///
    /// Guards are only ever cloned out of the map under its lock, so a
    /// strong count of two (the map's and ours) proves no other task is
    /// waiting and the entry can go.
    fn prune_guard(&self, id: Uuid, guard: Arc<tokio::sync::Mutex<()>>) {
        let mut guards = self.guards.lock();
        if Arc::strong_count(&guard) == 2 {
            guards.remove(&id);
        }
    }

    /// Apply a recommendation's fix SQL inside a new disposable scope
    ///
    /// An `AppliedChange` in `applied` state is recorded only after every
    /// statement succeeded. A scope left behind by a partial failure is
    /// not tracked as a live change; the cleanup sweep reclaims it.
    #[tracing::instrument(skip(self), fields(recommendation_id = %recommendation_id))]
    pub async fn apply(&self, recommendation_id: Uuid) -> Result<AppliedChange> {
        let guard = self.guard_for(recommendation_id);
        let result = {
            let _serialized = guard.lock().await;
            self.apply_locked(recommendation_id).await
        };
        self.prune_guard(recommendation_id, guard);
        result
    }

    async fn apply_locked(&self, recommendation_id: Uuid) -> Result<AppliedChange> {
        if let Some(existing) = self.changes.get(recommendation_id).await? {
            if existing.status == ChangeStatus::Applied {
                return Err(TuneError::InvalidState(format!(
                    "recommendation {recommendation_id} is already applied in scope {}",
                    existing.scope
                )));
            }
        }

        let recommendation = self
            .recommendations
            .get(recommendation_id)
            .await?
            .ok_or_else(|| {
                TuneError::NotFound(format!("recommendation {recommendation_id}"))
            })?;
        let sql = recommendation
            .fix
            .sql()
            .ok_or_else(|| {
                TuneError::InvalidState(
                    "advisory recommendations carry no SQL to apply".into(),
                )
            })?
            .to_string();

        let scope = new_scope(recommendation_id);
        self.in_flight.lock().insert(scope.clone());
        let outcome = self.apply_in_scope(&scope, &sql).await;
        self.in_flight.lock().remove(&scope);

        match outcome {
            Ok(()) => {
                let change = AppliedChange::new(recommendation_id, scope.clone(), sql);
                self.changes.create(&change).await?;
                tracing::info!(scope = %scope, "fix applied");
                Ok(change)
            }
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "apply failed, scope left for cleanup");
                let mut change = AppliedChange::new(recommendation_id, scope, sql);
                change.status = ChangeStatus::Failed;
                self.changes.create(&change).await?;
                Err(e)
            }
        }
    }

    async fn apply_in_scope(&self, scope: &str, sql: &str) -> Result<()> {
        let conn = self.source.acquire().await?;
        let result = async {
            conn.execute(&format!("CREATE SCHEMA \"{scope}\""), &[]).await?;
            conn.execute(&format!("SET search_path TO \"{scope}\", public"), &[])
                .await?;
            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                conn.execute(statement, &[]).await?;
            }
            Ok(())
        }
        .await;
        self.source.release(conn).await;
        result
    }

    /// Roll back a previously applied change by dropping its scope
    ///
    /// Only a change in `applied` state can be rolled back; anything else
    /// is an explicit error, never a silent success.
    #[tracing::instrument(skip(self), fields(recommendation_id = %recommendation_id))]
    pub async fn rollback(&self, recommendation_id: Uuid) -> Result<AppliedChange> {
        let guard = self.guard_for(recommendation_id);
        let result = {
            let _serialized = guard.lock().await;
            self.rollback_locked(recommendation_id).await
        };
        self.prune_guard(recommendation_id, guard);
        result
    }

    async fn rollback_locked(&self, recommendation_id: Uuid) -> Result<AppliedChange> {
        let mut change = self
            .changes
            .get(recommendation_id)
            .await?
            .ok_or_else(|| {
                TuneError::NotFound(format!("no applied change for recommendation {recommendation_id}"))
            })?;
        if change.status != ChangeStatus::Applied {
            return Err(TuneError::InvalidState(format!(
                "change for recommendation {recommendation_id} is {:?}, not applied",
                change.status
            )));
        }

        let conn = self.source.acquire().await?;
        let dropped = conn
            .execute(
                &format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", change.scope),
                &[],
            )
            .await;
        self.source.release(conn).await;

        match dropped {
            Ok(_) => {
                change.status = ChangeStatus::RolledBack;
                change.rolled_back_at = Some(Utc::now());
                self.changes.update(&change).await?;
                tracing::info!(scope = %change.scope, "change rolled back");
                Ok(change)
            }
            Err(e) => {
                change.status = ChangeStatus::Failed;
                self.changes.update(&change).await?;
                Err(e)
            }
        }
    }

    /// Reclaim disposable scopes older than `max_age_hours`
    ///
    /// Age is read from the epoch segment of the scope name, so leaked
    /// scopes from crashed applies are reclaimable without a tracking
    /// row. A scope mid-apply is never reclaimed. Returns the number of
    /// scopes dropped.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup(&self, max_age_hours: u64) -> Result<usize> {
        let conn = self.source.acquire().await?;
        let result = async {
            let scopes = conn
                .query(
                    "SELECT nspname FROM pg_namespace WHERE nspname LIKE 'sqltune\\_%'",
                    &[],
                )
                .await?;

            let now = Utc::now().timestamp();
            let cutoff = (max_age_hours as i64).saturating_mul(3600);
            let mut removed = 0usize;
            for row in &scopes.rows {
                let Some(name) = row.get(0).and_then(|v| v.as_str()) else {
                    continue;
                };
                let Some(created) = scope_epoch(name) else {
                    tracing::debug!(scope = %name, "scope name carries no epoch, skipping");
                    continue;
                };
                if now - created < cutoff {
                    continue;
                }
                if self.in_flight.lock().contains(name) {
                    tracing::debug!(scope = %name, "scope is mid-apply, skipping");
                    continue;
                }
                match conn
                    .execute(&format!("DROP SCHEMA IF EXISTS \"{name}\" CASCADE"), &[])
                    .await
                {
                    Ok(_) => removed += 1,
                    Err(e) => tracing::warn!(scope = %name, error = %e, "scope drop failed"),
                }
            }
            Ok(removed)
        }
        .await;
        self.source.release(conn).await;
        if let Ok(removed) = &result {
            tracing::info!(removed, "cleanup sweep finished");
        }
        result
    }

    /// All tracked changes, oldest first
    pub async fn list(&self) -> Result<Vec<AppliedChange>> {
        self.changes.list().await
    }

    /// The tracked change for a recommendation, if any
    pub async fn get(&self, recommendation_id: Uuid) -> Result<Option<AppliedChange>> {
        self.changes.get(recommendation_id).await
    }
}

/// Scope names embed creation time so cleanup can age them without a
/// tracking row: `sqltune_<epoch-secs>_<id-prefix>`.
fn new_scope(recommendation_id: Uuid) -> String {
    let id = recommendation_id.simple().to_string();
    format!("{SCOPE_PREFIX}{}_{}", Utc::now().timestamp(), &id[..8])
}

fn scope_epoch(scope: &str) -> Option<i64> {
    scope
        .strip_prefix(SCOPE_PREFIX)?
        .split('_')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests;
