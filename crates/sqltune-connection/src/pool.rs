//! Connection pool

mod config;
mod inner;
mod stats;

pub use config::PoolConfig;
pub use inner::{ConnectionFactory, ConnectionPool};
pub use stats::PoolStats;

#[cfg(test)]
mod tests;
