//! Recommendation, simulation, applied-change, and benchmark-job records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A typed fix proposal
///
/// Closed sum over the three fix categories; each variant carries only the
/// fields relevant to it, so a rewrite can never be confused with an index
/// suggestion by convention alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum FixPlan {
    /// A new index, proven or estimated via hypothetical-index costing
    Index {
        /// One or more `CREATE INDEX` statements
        sql: String,
        /// Free-text rationale from the suggestion source
        reasoning: String,
    },
    /// A rewritten replacement query
    Rewrite {
        /// The replacement query text
        sql: String,
        /// Free-text rationale from the suggestion source
        reasoning: String,
    },
    /// Text guidance only, nothing to execute
    Advisory {
        /// Free-text rationale from the suggestion source
        reasoning: String,
    },
}

impl FixPlan {
    /// The fix SQL, if this plan carries any
    pub fn sql(&self) -> Option<&str> {
        match self {
            FixPlan::Index { sql, .. } | FixPlan::Rewrite { sql, .. } => Some(sql),
            FixPlan::Advisory { .. } => None,
        }
    }

    /// The rationale text
    pub fn reasoning(&self) -> &str {
        match self {
            FixPlan::Index { reasoning, .. }
            | FixPlan::Rewrite { reasoning, .. }
            | FixPlan::Advisory { reasoning } => reasoning,
        }
    }

    /// Category name for display and audit records
    pub fn category(&self) -> &'static str {
        match self {
            FixPlan::Index { .. } => "index",
            FixPlan::Rewrite { .. } => "rewrite",
            FixPlan::Advisory { .. } => "advisory",
        }
    }
}

/// Evidence tier of a recommendation
///
/// Strict ladder: `Verified` (hypothetical-index-proven cost delta) >
/// `Estimated` (plan-cost-proven rewrite) > `Advisory` (text only).
/// A status is never upgraded after the recommendation is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Improvement proven via hypothetical-index cost comparison
    Verified,
    /// Plan cost of the rewrite obtained, not independently benchmarked
    Estimated,
    /// No quantitative evidence
    Advisory,
    /// The verification attempt itself failed
    Failed,
}

impl VerificationStatus {
    /// Display string matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Estimated => "estimated",
            VerificationStatus::Advisory => "advisory",
            VerificationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after plan cost pair for a simulated fix
///
/// Costs are planner cost units as reported by the optimizer, not
/// wall-clock time. Transient: computed per request, persisted (if at all)
/// by an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Plan cost of the original query
    pub original_cost: f64,
    /// Plan cost with the fix in place
    pub new_cost: f64,
    /// `(original - new) / original * 100`, rounded to two decimals;
    /// zero when the original cost is zero
    pub improvement_percent: f64,
    /// The exact SQL the planner was asked to cost
    pub simulated_sql: String,
}

impl SimulationResult {
    /// Build a result, computing and rounding the improvement percentage
    pub fn new(original_cost: f64, new_cost: f64, simulated_sql: impl Into<String>) -> Self {
        let improvement_percent = if original_cost == 0.0 {
            0.0
        } else {
            round2((original_cost - new_cost) / original_cost * 100.0)
        };
        Self {
            original_cost,
            new_cost,
            improvement_percent,
            simulated_sql: simulated_sql.into(),
        }
    }
}

/// Round to two decimal places
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// A proposed fix with its verification evidence
///
/// Immutable once returned to the caller; later application state lives in
/// [`AppliedChange`], keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommendation id
    pub id: Uuid,
    /// The statement that was analyzed
    pub query: String,
    /// The typed fix
    pub fix: FixPlan,
    /// Evidence tier
    pub verification: VerificationStatus,
    /// Improvement percentage where measurable
    pub improvement_percent: Option<f64>,
    /// The cost comparison backing the verification, when one was run
    pub simulation: Option<SimulationResult>,
    /// Reason for a downgrade or failure, populated on every downgrade
    pub note: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    /// Create a recommendation in the given tier
    pub fn new(query: impl Into<String>, fix: FixPlan, verification: VerificationStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            fix,
            verification,
            improvement_percent: None,
            simulation: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a simulation result, copying its improvement percentage
    pub fn with_simulation(mut self, simulation: SimulationResult) -> Self {
        self.improvement_percent = Some(simulation.improvement_percent);
        self.simulation = Some(simulation);
        self
    }

    /// Attach a downgrade/failure note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Lifecycle state of an applied change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// The fix SQL executed successfully inside its scope
    Applied,
    /// The change was reversed
    RolledBack,
    /// An apply or rollback attempt failed
    Failed,
}

/// Audit record of a recommendation that was executed for real
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedChange {
    /// The recommendation this change executed
    pub recommendation_id: Uuid,
    /// Disposable scope (schema) the change ran in
    pub scope: String,
    /// The exact SQL that was executed
    pub sql: String,
    /// Current lifecycle state
    pub status: ChangeStatus,
    /// When the change was applied
    pub applied_at: DateTime<Utc>,
    /// When the change was rolled back, if it was
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl AppliedChange {
    /// Record a freshly applied change
    pub fn new(recommendation_id: Uuid, scope: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            recommendation_id,
            scope: scope.into(),
            sql: sql.into(),
            status: ChangeStatus::Applied,
            applied_at: Utc::now(),
            rolled_back_at: None,
        }
    }
}

/// Kind of work a benchmark job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Cost simulation of the recommendation's fix
    Simulation,
    /// Apply-style verification inside a disposable scope
    ApplyVerification,
}

/// Status of an asynchronous benchmark job
///
/// `Pending -> Running -> {Completed | Failed | Error | Cancelled}`,
/// terminal states are final; a new job must be submitted to re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, not yet picked up
    Pending,
    /// Work in progress
    Running,
    /// Work finished and produced a result payload
    Completed,
    /// The work itself reported a failure (e.g. safety rejection)
    Failed,
    /// Infrastructure error (connectivity, store)
    Error,
    /// Cancelled before or during execution (cooperative)
    Cancelled,
}

impl JobStatus {
    /// True for states a job can never leave
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

/// Asynchronous unit of benchmark/verification work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkJob {
    /// Job id
    pub id: Uuid,
    /// The recommendation being verified
    pub recommendation_id: Uuid,
    /// Kind of work
    pub job_type: JobType,
    /// Current status
    pub status: JobStatus,
    /// Structured result payload, set on completion
    pub result: Option<serde_json::Value>,
    /// Error message, set on failure
    pub error: Option<String>,
    /// When the job was submitted
    pub created_at: DateTime<Utc>,
    /// When the job transitioned to running
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl BenchmarkJob {
    /// Create a pending job
    pub fn new(recommendation_id: Uuid, job_type: JobType) -> Self {
        Self {
            id: Uuid::new_v4(),
            recommendation_id,
            job_type,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
