//! Error types for sqltune

use thiserror::Error;

/// Core error type for sqltune operations
///
/// Every public operation in the engine returns `Result<T>`; callers always
/// receive one of these variants rather than a bare internal panic. The
/// variants follow the failure taxonomy of the verification pipeline:
/// unsupported input, connectivity, planning, safety, simulator availability,
/// and lifecycle-state errors are each distinguishable.
#[derive(Error, Debug)]
pub enum TuneError {
    /// The statement type cannot be planned at all (DDL, maintenance
    /// commands). Carries a remediation hint for the caller.
    #[error("Unsupported statement type '{kind}': {hint}")]
    UnsupportedStatement { kind: String, hint: String },

    /// No usable connection to the target database
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected or could not cost a candidate query
    #[error("Planning error: {0}")]
    Planning(String),

    /// A proposed rewrite contains a disallowed mutating construct
    #[error("Safety rejection: {0}")]
    SafetyRejected(String),

    /// The hypothetical-index facility is absent or uninstallable
    #[error("Simulator unavailable: {0}")]
    SimulatorUnavailable(String),

    /// A lifecycle transition was requested from the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl TuneError {
    /// True if the failure means the target database could not be reached,
    /// as opposed to anything being wrong with the caller's query.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TuneError::Connection(_) | TuneError::Timeout(_))
    }
}

/// Result type alias for sqltune operations
pub type Result<T> = std::result::Result<T, TuneError>;
