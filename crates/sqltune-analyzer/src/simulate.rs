//! Cost simulation against a live planner
//!
//! Two simulation paths, both plan-only: index candidates are costed with
//! hypothetical indexes (the hypopg extension) so nothing is ever built,
//! and rewrite candidates are costed inside a transaction that is always
//! rolled back. Each simulation confines its session state to a single
//! acquired connection.

use std::sync::Arc;

use async_trait::async_trait;
use sqltune_core::{
    Connection, ConnectionSource, Result, SimulationResult, Transaction, TuneError, Value,
};

use crate::candidates::candidate_queries;
use crate::plan::{parse_plan, PlanDocument};
use crate::statement::ensure_read_only;

/// Outcome of an index simulation
///
/// Unavailability of the hypothetical-index facility is an expected
/// condition, not an error; callers downgrade to advisory evidence.
#[derive(Debug, Clone)]
pub enum IndexSimulation {
    Simulated(SimulationResult),
    Unavailable { reason: String },
}

/// Plan-only cost simulator bound to a connection source
pub struct CostSimulator {
    source: Arc<dyn ConnectionSource>,
}

impl CostSimulator {
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self { source }
    }

    /// Costs a query before and after registering hypothetical indexes
    ///
    /// Hypothetical indexes are session-scoped; the whole simulation runs
    /// on one acquired connection and the session is reset before the
    /// connection is released, whether or not costing succeeded.
    #[tracing::instrument(skip(self, query, index_sql), fields(sql_preview = %preview(query)))]
    pub async fn simulate_index(&self, query: &str, index_sql: &str) -> Result<IndexSimulation> {
        let conn = self.source.acquire().await?;
        let outcome = self.simulate_index_on(conn.as_ref(), query, index_sql).await;
        self.source.release(conn).await;
        outcome
    }

    async fn simulate_index_on(
        &self,
        conn: &(dyn Connection + 'static),
        query: &str,
        index_sql: &str,
    ) -> Result<IndexSimulation> {
        if let Err(reason) = ensure_hypopg(conn).await {
            tracing::info!(reason = %reason, "hypothetical index facility unavailable");
            return Ok(IndexSimulation::Unavailable { reason });
        }

        let costed = resolve_costed_candidate(conn, query).await?;

        let mut registered = 0usize;
        for statement in split_statements(index_sql) {
            let call = format!(
                "SELECT hypopg_create_index('{}')",
                statement.replace('\'', "''")
            );
            match conn.query(&call, &[]).await {
                Ok(_) => registered += 1,
                Err(e) => {
                    tracing::warn!(error = %e, index = %statement, "skipping hypothetical index")
                }
            }
        }
        tracing::debug!(registered, "hypothetical indexes in place");

        let simulated = plan_document(conn, &costed.candidate).await;

        // Session reset must happen even when re-costing failed; the
        // connection goes back to the pool afterwards.
        if let Err(e) = conn.query("SELECT hypopg_reset()", &[]).await {
            tracing::warn!(error = %e, "hypopg_reset failed");
        }

        let simulated = simulated?;
        let new_cost = simulated.total_cost().ok_or_else(|| {
            TuneError::Planning("plan with hypothetical indexes carried no total cost".into())
        })?;

        Ok(IndexSimulation::Simulated(SimulationResult::new(
            costed.cost,
            new_cost,
            index_sql,
        )))
    }

    /// Costs a replacement query against the original, plan-only
    ///
    /// The replacement must pass the read-only gate before any I/O
    /// happens. Costing runs inside a transaction that is always rolled
    /// back, so even planner side effects are discarded.
    #[tracing::instrument(skip(self, original_sql, new_sql), fields(sql_preview = %preview(new_sql)))]
    pub async fn simulate_rewrite(
        &self,
        original_sql: &str,
        new_sql: &str,
    ) -> Result<SimulationResult> {
        ensure_read_only(new_sql)?;

        let conn = self.source.acquire().await?;
        let outcome = self
            .simulate_rewrite_on(conn.clone(), original_sql, new_sql)
            .await;
        self.source.release(conn).await;
        outcome
    }

    async fn simulate_rewrite_on(
        &self,
        conn: Arc<dyn Connection>,
        original_sql: &str,
        new_sql: &str,
    ) -> Result<SimulationResult> {
        let original = resolve_costed_candidate(conn.as_ref(), original_sql).await?;

        let tx = conn.begin_transaction().await?;
        let rewritten = resolve_costed_candidate(tx.as_ref(), new_sql).await;
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "rollback of plan-only transaction failed");
        }
        let rewritten = rewritten?;

        Ok(SimulationResult::new(
            original.cost,
            rewritten.cost,
            &rewritten.candidate,
        ))
    }

    /// Baseline plan for a query, resolving placeholders as needed
    pub async fn baseline(&self, query: &str) -> Result<CostedPlan> {
        let conn = self.source.acquire().await?;
        let costed = resolve_costed_candidate(conn.as_ref(), query).await;
        self.source.release(conn).await;
        costed
    }
}

/// A plannable candidate together with its plan and total cost
#[derive(Debug, Clone)]
pub struct CostedPlan {
    pub candidate: String,
    pub cost: f64,
    pub plan: PlanDocument,
}

/// Anything that can run a planner round trip
///
/// Lets candidate resolution work both on a bare connection and inside
/// the rolled-back rewrite transaction.
#[async_trait]
trait PlanRunner: Send + Sync {
    async fn run(&self, sql: &str) -> Result<sqltune_core::QueryResult>;
}

#[async_trait]
impl PlanRunner for dyn Connection {
    async fn run(&self, sql: &str) -> Result<sqltune_core::QueryResult> {
        self.query(sql, &[]).await
    }
}

#[async_trait]
impl PlanRunner for dyn Transaction {
    async fn run(&self, sql: &str) -> Result<sqltune_core::QueryResult> {
        self.query(sql, &[]).await
    }
}

async fn plan_document(runner: &(impl PlanRunner + ?Sized), sql: &str) -> Result<PlanDocument> {
    let bare = sql.trim().trim_end_matches(';');
    let result = runner.run(&format!("EXPLAIN (FORMAT JSON) {bare}")).await?;
    let doc = result
        .scalar()
        .and_then(Value::as_json)
        .ok_or_else(|| TuneError::Planning("planner returned no plan document".into()))?;
    Ok(parse_plan(&doc))
}

/// Finds a candidate form of `sql` the planner can actually cost
///
/// Candidates are tried in order; the first one with a positive total
/// cost wins. A candidate that plans but costs to zero is kept as a
/// fallback so a degenerate plan still beats an outright failure.
async fn resolve_costed_candidate(
    runner: &(impl PlanRunner + ?Sized),
    sql: &str,
) -> Result<CostedPlan> {
    let mut fallback: Option<CostedPlan> = None;
    let mut last_error: Option<TuneError> = None;

    for candidate in candidate_queries(sql) {
        match plan_document(runner, &candidate).await {
            Ok(plan) => match plan.total_cost() {
                Some(cost) if cost > 0.0 => {
                    return Ok(CostedPlan {
                        candidate,
                        cost,
                        plan,
                    })
                }
                Some(cost) => {
                    fallback = Some(CostedPlan {
                        candidate,
                        cost,
                        plan,
                    });
                }
                None => {
                    last_error =
                        Some(TuneError::Planning("plan carried no total cost".into()));
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "candidate did not plan, trying next");
                last_error = Some(e);
            }
        }
    }

    fallback.ok_or_else(|| {
        last_error
            .unwrap_or_else(|| TuneError::Planning("no plannable candidate for query".into()))
    })
}

async fn ensure_hypopg(conn: &dyn Connection) -> std::result::Result<(), String> {
    let probe = conn
        .query(
            "SELECT extname FROM pg_extension WHERE extname = 'hypopg'",
            &[],
        )
        .await;
    match probe {
        Ok(result) if result.has_rows() => Ok(()),
        Ok(_) => match conn
            .execute("CREATE EXTENSION IF NOT EXISTS hypopg", &[])
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => Err(format!("hypopg extension could not be installed: {e}")),
        },
        Err(e) => Err(format!("could not probe for the hypopg extension: {e}")),
    }
}

fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
