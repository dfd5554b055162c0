// src/lib.rs

//! Goalpost: goal resolution and transactions for package-based systems
//!
//! A caller describes what it wants (install, remove, upgrade...) as a
//! [`Goal`] over a [`PackageIndex`], resolves it into an ordered
//! [`Transaction`] or a list of [`Problem`]s, executes the transaction
//! under an exclusive lock and keeps an append-only history that can be
//! inverted to undo past changes.
//!
//! # Architecture
//!
//! - Resolution is all-or-nothing: a transaction or problems, never both
//! - Problems are data, rendered by [`ProblemReporter`]; misuse of the API
//!   is a [`ContractViolation`]
//! - Deterministic: identical inputs give identical transactions
//! - History in SQLite, one record per executed transaction

pub mod config;
mod error;
pub mod goal;
pub mod history;
pub mod index;
pub mod logger;
pub mod package;
pub mod problem;
pub mod progress;
pub mod transaction;
pub mod version;

pub use config::EngineConfig;
pub use error::{ContractViolation, Error, Result};
pub use goal::{Goal, GoalPolicy, Job, JobAction, JobFlags, JobTarget, Resolution};
pub use history::{HistoryItem, HistoryRecord, HistoryStore, ItemOutcome, TimeRange};
pub use index::{MemoryIndex, PackageFilter, PackageIndex};
pub use logger::{Level, LevelSetting, Logger};
pub use package::{PackageMetadata, PackageRef, Requirement};
pub use problem::{Problem, ProblemKind, ProblemReporter};
pub use progress::{CallbackProgress, ItemPhase, LogProgress, SilentProgress, TransactionProgress};
pub use transaction::{
    ExecutionLock, InstallError, Installer, Reason, Transaction, TransactionAction,
    TransactionExecutor, TransactionPackage, TransactionPlanner, TransactionState,
};
pub use version::Evr;
