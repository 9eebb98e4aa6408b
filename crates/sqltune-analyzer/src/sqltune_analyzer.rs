//! Query analysis for sqltune
//!
//! Plan reading, candidate substitution, plan-only cost simulation, and
//! the recommendation orchestrator. Everything here is plan-only: no
//! user data is read and no candidate query is ever executed to
//! completion.

pub mod advisor;
pub mod candidates;
pub mod plan;
pub mod simulate;
pub mod statement;

pub use advisor::QueryAdvisor;
pub use candidates::{candidate_queries, PlaceholderFill};
pub use plan::{parse_plan, PlanDocument, PlanNode};
pub use simulate::{CostSimulator, CostedPlan, IndexSimulation};
pub use statement::{classify_plannable, ensure_read_only, referenced_tables};
