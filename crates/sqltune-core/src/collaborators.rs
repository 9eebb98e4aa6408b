//! External collaborator contracts
//!
//! The engine consumes these traits by constructor injection and carries no
//! process-wide mutable state of its own. Suggestion generation, schema
//! introspection, replica selection, and persistence are all implemented
//! elsewhere; the traits here pin down exactly what the core needs.

use crate::{AppliedChange, BenchmarkJob, ConnectionSource, FixPlan, Recommendation, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Schema description for one table, as provided to the suggestion source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableContext {
    /// Table name, schema-qualified where present
    pub name: String,
    /// Column names with their data types
    pub columns: Vec<(String, String)>,
    /// Estimated row count, if the source knows it
    pub row_estimate: Option<u64>,
    /// Existing index definitions
    pub indexes: Vec<String>,
}

/// Structured schema description for the tables a statement references
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaContext {
    /// One entry per referenced table
    pub tables: Vec<TableContext>,
}

impl SchemaContext {
    /// Context with no tables (statement referenced none we could resolve)
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Provides schema metadata for a set of tables
#[async_trait]
pub trait SchemaContextSource: Send + Sync {
    /// Describe the given tables
    async fn context_for_tables(&self, table_names: &[String]) -> Result<SchemaContext>;
}

/// Produces a typed fix proposal for a slow statement
///
/// Backed elsewhere by a language-model call; the core only sees the typed
/// result. An error indicator from the source is propagated unchanged.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    /// Suggest a fix for `query` given its schema context and baseline plan
    async fn suggest(
        &self,
        query: &str,
        schema_context: &SchemaContext,
        baseline_plan: &serde_json::Value,
    ) -> Result<FixPlan>;
}

/// Kind of target benchmark work ran against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Secondary read-oriented copy of the monitored data
    Replica,
    /// Disposable sandbox with synthetic data
    Sandbox,
}

impl TargetKind {
    /// Display string matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Replica => "replica",
            TargetKind::Sandbox => "sandbox",
        }
    }
}

/// Decides where benchmark work runs
#[async_trait]
pub trait ReplicaCheck: Send + Sync {
    /// Whether a healthy read replica is currently available
    async fn is_available(&self) -> bool;

    /// Pick the benchmark target
    ///
    /// Returns the replica when one is available and the caller prefers it,
    /// otherwise a disposable sandbox target.
    async fn benchmark_target(
        &self,
        prefer_replica: bool,
    ) -> Result<(TargetKind, Arc<dyn ConnectionSource>)>;
}

/// Durable store of recommendations, keyed by id
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Persist a recommendation
    async fn create(&self, recommendation: &Recommendation) -> Result<()>;

    /// Fetch a recommendation by id
    async fn get(&self, id: Uuid) -> Result<Option<Recommendation>>;
}

/// Durable store of applied-change audit records, keyed by recommendation id
#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Persist a new change record
    async fn create(&self, change: &AppliedChange) -> Result<()>;

    /// Fetch the change record for a recommendation
    async fn get(&self, recommendation_id: Uuid) -> Result<Option<AppliedChange>>;

    /// Replace the change record for a recommendation
    async fn update(&self, change: &AppliedChange) -> Result<()>;

    /// All change records, latest transition reflected
    async fn list(&self) -> Result<Vec<AppliedChange>>;
}

/// Durable store of benchmark job records, keyed by job id
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job record
    async fn create(&self, job: &BenchmarkJob) -> Result<()>;

    /// Fetch a job by id
    async fn get(&self, id: Uuid) -> Result<Option<BenchmarkJob>>;

    /// Replace a job record
    async fn update(&self, job: &BenchmarkJob) -> Result<()>;
}
