//! sqltune Connection - pooling and benchmark-target routing
//!
//! This crate provides the in-repo implementation of the `ConnectionSource`
//! collaborator contract: a bounded connection pool with idle recycling, and
//! a replica router that decides whether benchmark work runs against a read
//! replica or a disposable sandbox.

pub mod pool;
mod replica;

pub use pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats};
pub use replica::ReplicaRouter;
