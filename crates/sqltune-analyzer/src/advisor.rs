//! Statement classification and recommendation orchestration
//!
//! Single-request pipeline: classify the statement, gather schema context
//! for the tables it touches, cost the baseline plan, ask the suggestion
//! source for a fix, then verify the fix at the strongest evidence tier
//! the simulators can support. No state persists across calls.

use std::sync::Arc;

use serde_json::json;
use sqltune_core::{
    ConnectionSource, FixPlan, Recommendation, RecommendationStore, Result, SchemaContext,
    SchemaContextSource, SuggestionSource, TuneError, VerificationStatus,
};

use crate::simulate::{CostSimulator, IndexSimulation};
use crate::statement::{classify_plannable, referenced_tables};

/// Orchestrates classification, baseline costing, suggestion, and
/// verification for one query at a time
///
/// All collaborators are injected; the advisor holds no mutable state of
/// its own and is safe to share across tasks.
pub struct QueryAdvisor {
    schema: Arc<dyn SchemaContextSource>,
    suggestions: Arc<dyn SuggestionSource>,
    store: Option<Arc<dyn RecommendationStore>>,
    simulator: CostSimulator,
}

impl QueryAdvisor {
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        schema: Arc<dyn SchemaContextSource>,
        suggestions: Arc<dyn SuggestionSource>,
    ) -> Self {
        Self {
            schema,
            suggestions,
            store: None,
            simulator: CostSimulator::new(source),
        }
    }

    /// Persist every produced recommendation to the given store
    pub fn with_store(mut self, store: Arc<dyn RecommendationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Analyze a query and produce a recommendation at the strongest
    /// supportable evidence tier
    ///
    /// Verification status is decided exactly once, here; nothing
    /// downstream upgrades it. Every downgrade from the tier the fix
    /// category implies carries a reason in the recommendation note.
    #[tracing::instrument(skip(self, query), fields(sql_preview = %preview(query)))]
    pub async fn analyze(&self, query: &str) -> Result<Recommendation> {
        let keyword = classify_plannable(query)?;
        tracing::debug!(statement = %keyword, "statement accepted for analysis");

        let tables = referenced_tables(query);
        let context = match self.schema.context_for_tables(&tables).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "schema context unavailable, continuing without");
                SchemaContext::empty()
            }
        };

        let baseline = self.simulator.baseline(query).await?;
        tracing::debug!(cost = baseline.cost, "baseline plan costed");

        let plan_features = json!({
            "total_cost": baseline.cost,
            "has_sequential_scans": baseline.plan.has_sequential_scans(),
            "referenced_tables": baseline.plan.referenced_tables(),
            "join_dependencies": baseline.plan.join_dependencies(),
        });
        let fix = self
            .suggestions
            .suggest(query, &context, &plan_features)
            .await?;

        let recommendation = self.verify(query, fix).await?;
        tracing::info!(
            id = %recommendation.id,
            status = %recommendation.verification,
            "recommendation produced"
        );

        if let Some(store) = &self.store {
            store.create(&recommendation).await?;
        }
        Ok(recommendation)
    }

    async fn verify(&self, query: &str, fix: FixPlan) -> Result<Recommendation> {
        match fix {
            FixPlan::Index { ref sql, .. } => {
                let sql = sql.clone();
                match self.simulator.simulate_index(query, &sql).await {
                    Ok(IndexSimulation::Simulated(sim)) => {
                        Ok(Recommendation::new(query, fix, VerificationStatus::Verified)
                            .with_simulation(sim))
                    }
                    Ok(IndexSimulation::Unavailable { reason }) => {
                        tracing::info!(reason = %reason, "downgrading index fix to advisory");
                        Ok(
                            Recommendation::new(query, fix, VerificationStatus::Advisory)
                                .with_note(format!(
                                    "hypothetical-index verification unavailable: {reason}"
                                )),
                        )
                    }
                    Err(e) if e.is_connectivity() => Err(e),
                    Err(e) => Ok(Recommendation::new(
                        query,
                        fix,
                        VerificationStatus::Failed,
                    )
                    .with_note(format!("index simulation failed: {e}"))),
                }
            }
            FixPlan::Rewrite { ref sql, .. } => {
                let sql = sql.clone();
                match self.simulator.simulate_rewrite(query, &sql).await {
                    Ok(sim) => Ok(Recommendation::new(
                        query,
                        fix,
                        VerificationStatus::Estimated,
                    )
                    .with_simulation(sim)),
                    Err(e @ TuneError::SafetyRejected(_)) => Err(e),
                    Err(e) if e.is_connectivity() => Err(e),
                    Err(e) => Ok(Recommendation::new(
                        query,
                        fix,
                        VerificationStatus::Failed,
                    )
                    .with_note(format!("rewrite simulation failed: {e}"))),
                }
            }
            FixPlan::Advisory { .. } => Ok(Recommendation::new(
                query,
                fix,
                VerificationStatus::Advisory,
            )),
        }
    }
}

fn preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
