//! Safe application of verified fixes for sqltune
//!
//! Fixes run inside disposable schema scopes with full rollback and a
//! cleanup sweep for scopes leaked by failed attempts.

pub mod manager;

pub use manager::ApplyManager;
