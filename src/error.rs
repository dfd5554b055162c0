// src/error.rs

//! Error types for the goalpost engine
//!
//! Resolution problems (missing packages, conflicts, protected removals) are
//! not errors: they are returned as [`crate::problem::Problem`] values. This
//! module covers everything else: storage and I/O failures, lock contention,
//! history inversion failures and misuse of the engine's state machines.

use crate::transaction::TransactionState;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the engine
#[derive(Error, Debug)]
pub enum Error {
    /// History database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decoding error
    #[error("TOML parse error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    /// TOML encoding error
    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// Malformed version, constraint or package string
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another transaction holds the execution lock
    #[error("Execution lock unavailable: {0}")]
    LockUnavailable(String),

    /// A package needed to invert a history record is gone from the index
    #[error("History package unavailable: {0}")]
    HistoryPackageUnavailable(String),

    /// History record cannot be used for the requested operation
    #[error("Invalid history record: {0}")]
    InvalidHistoryRecord(String),

    /// Logger level queried while unset
    #[error("Logging level is not set")]
    LevelNotSet,

    /// Engine misuse (programming error, not a package-state issue)
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

/// Internal invariant violations caused by misusing the engine API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    /// `Goal::resolve` entered while another call on the same goal is running
    #[error("resolve() called concurrently on the same goal")]
    ConcurrentResolve,

    /// Transaction asked to move backwards or skip a state
    #[error("invalid transaction state transition {from} -> {to}")]
    InvalidTransition {
        from: TransactionState,
        to: TransactionState,
    },

    /// `finish` called on a transaction that already reached a final state
    #[error("transaction {id} already finished as {state}")]
    AlreadyFinished { id: u64, state: TransactionState },

    /// `start` called on a transaction that is not in the CREATED state
    #[error("transaction {id} cannot start from state {state}")]
    NotCreated { id: u64, state: TransactionState },
}

impl Error {
    /// True if this error reports engine misuse rather than a runtime failure
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::Contract(_))
    }
}
