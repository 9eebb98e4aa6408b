//! sqltune Core - shared traits and record types for the verification engine
//!
//! This crate provides the fundamental traits and types that all other
//! sqltune crates depend on. It defines:
//!
//! - `Connection` / `Transaction` / `ConnectionSource` - database access traits
//! - `FixPlan` / `Recommendation` / `SimulationResult` - the recommendation model
//! - `AppliedChange` / `BenchmarkJob` - apply and benchmark lifecycle records
//! - Collaborator contracts (suggestion source, schema context, replica
//!   check, persistence stores) consumed by injection
//! - Common types like `Value`, `Row`, `QueryResult`

mod collaborators;
mod connection;
mod error;
mod recommendation;
pub mod store;
mod types;

pub use collaborators::*;
pub use connection::*;
pub use error::*;
pub use recommendation::*;
pub use types::*;
