//! Background benchmark jobs for sqltune
//!
//! A scheduler that runs benchmark work as spawned tasks against the
//! read replica when one is healthy, the sandbox otherwise.

pub mod scheduler;

pub use scheduler::{JobContext, JobRunner, JobScheduler};
