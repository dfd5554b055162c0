// src/transaction/executor.rs

//! Transaction execution
//!
//! [`TransactionExecutor::start`] takes exclusive ownership of a CREATED
//! transaction, acquires the execution lock and moves it to IN_PROGRESS.
//! [`Execution::run`] then applies items in order. The first failing item
//! stops the run: earlier items stay applied, later ones are recorded as
//! unattempted, and the transaction ends FAILED. Either way the outcome is
//! persisted to the history store before the lock is released. A failed
//! history write is reported on the [`ExecutionReport`] rather than as an
//! error, since the items have already been applied.

use super::{ExecutionLock, Installer, Transaction, TransactionState};
use crate::error::{ContractViolation, Error, Result};
use crate::history::{HistoryItem, HistoryRecord, HistoryStore, ItemOutcome};
use crate::progress::{ItemPhase, TransactionProgress};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default bounded wait for the execution lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1500);

/// Applies transactions under the process-wide execution lock
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl TransactionExecutor {
    pub fn new<P: AsRef<Path>>(lock_path: P) -> Self {
        Self {
            lock_path: lock_path.as_ref().to_path_buf(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Take the transaction, acquire the lock and enter IN_PROGRESS
    ///
    /// Fails with a contract violation if the transaction is not CREATED and
    /// with [`crate::Error::LockUnavailable`] if another transaction holds the
    /// lock past the timeout.
    pub fn start(&self, mut transaction: Transaction) -> Result<Execution> {
        if transaction.state() != TransactionState::Created {
            return Err(ContractViolation::NotCreated {
                id: transaction.id(),
                state: transaction.state(),
            }
            .into());
        }

        let lock = ExecutionLock::acquire(&self.lock_path, self.lock_timeout)?;
        let start_epoch = Utc::now().timestamp();

        transaction.advance(TransactionState::Started)?;
        transaction.advance(TransactionState::InProgress)?;
        info!(
            "Transaction {} started ({} items)",
            transaction.id(),
            transaction.len()
        );

        Ok(Execution {
            abandoned: AbandonWarning {
                id: transaction.id(),
                armed: true,
            },
            transaction,
            start_epoch,
            _lock: lock,
        })
    }
}

/// A transaction being executed; holds the execution lock until dropped
///
/// Dropping it without calling [`Execution::run`] releases the lock but
/// records nothing, and is logged as a warning.
#[derive(Debug)]
#[must_use = "an execution does nothing until `run` is called"]
pub struct Execution {
    transaction: Transaction,
    start_epoch: i64,
    abandoned: AbandonWarning,
    _lock: ExecutionLock,
}

/// Warns on drop unless disarmed by `run`
#[derive(Debug)]
struct AbandonWarning {
    id: u64,
    armed: bool,
}

impl Drop for AbandonWarning {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Transaction {} dropped while in progress; nothing was applied or recorded",
                self.id
            );
        }
    }
}

impl Execution {
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn start_epoch(&self) -> i64 {
        self.start_epoch
    }

    /// Apply every item in order and record the outcome
    ///
    /// Progress callbacks run synchronously while the lock is held and must
    /// not block indefinitely.
    pub fn run(
        mut self,
        installer: &mut dyn Installer,
        progress: &dyn TransactionProgress,
        history: &mut HistoryStore,
    ) -> Result<ExecutionReport> {
        self.abandoned.armed = false;
        let total = self.transaction.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut failure = None;

        for (done, item) in self.transaction.items().iter().enumerate() {
            if failure.is_some() {
                outcomes.push((ItemOutcome::Unattempted, None));
                continue;
            }

            progress.item(item, ItemPhase::Starting, percent(done, total));
            match installer.apply(item) {
                Ok(()) => {
                    progress.item(item, ItemPhase::Applied, percent(done + 1, total));
                    outcomes.push((ItemOutcome::Applied, None));
                }
                Err(e) => {
                    warn!("{} failed: {}", item, e);
                    progress.item(item, ItemPhase::Failed, percent(done, total));
                    let cause = e.to_string();
                    failure = Some(format!("{}: {}", item.package, cause));
                    outcomes.push((ItemOutcome::Failed, Some(cause)));
                }
            }
        }

        let final_state = if failure.is_some() {
            TransactionState::Failed
        } else {
            TransactionState::Done
        };
        self.transaction.finish(final_state)?;

        let items = self
            .transaction
            .items()
            .iter()
            .zip(outcomes)
            .map(|(item, (outcome, cause))| HistoryItem::from_package(item, outcome, cause))
            .collect();
        let record = HistoryRecord {
            id: self.transaction.id(),
            start_epoch: self.start_epoch,
            end_epoch: Utc::now().timestamp(),
            state: final_state,
            items,
        };
        // Items are already applied; a history failure must not hide that
        let history_error = history.record(&record).err();
        if let Some(ref e) = history_error {
            warn!("Failed to record transaction {}: {}", record.id, e);
        }

        match failure {
            Some(ref cause) => warn!("Transaction {} failed: {}", record.id, cause),
            None => info!("Transaction {} done", record.id),
        }

        Ok(ExecutionReport {
            transaction: self.transaction,
            record,
            failure,
            history_error,
        })
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((done * 100) / total) as u8
    }
}

/// Outcome of a run
#[derive(Debug)]
pub struct ExecutionReport {
    pub transaction: Transaction,
    pub record: HistoryRecord,
    /// Failing item and cause, if any
    pub failure: Option<String>,
    /// Set when the record could not be written to the history store
    pub history_error: Option<Error>,
}

impl ExecutionReport {
    /// Every item applied; says nothing about the history write
    pub fn is_success(&self) -> bool {
        self.transaction.state() == TransactionState::Done
    }

    pub fn is_recorded(&self) -> bool {
        self.history_error.is_none()
    }
}
