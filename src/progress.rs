// src/progress.rs

//! Per-item progress reporting during transaction execution
//!
//! The executor calls [`TransactionProgress::item`] synchronously from its own
//! thread while it holds the execution lock, so implementations must return
//! promptly.
//!
//! Implementations:
//! - `SilentProgress`: no-op for scripted/quiet modes
//! - `LogProgress`: logs each step to tracing
//! - `CallbackProgress`: forwards to a closure
//!
//! The command-line front end adds an indicatif progress bar on top of this.

use crate::transaction::TransactionPackage;
use std::fmt;
use tracing::{info, warn};

/// Where an item is in its application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemPhase {
    /// About to call the installer
    Starting,
    /// Installer returned success
    Applied,
    /// Installer returned an error
    Failed,
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Applied => write!(f, "applied"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Progress callback for transaction execution
pub trait TransactionProgress: Send + Sync {
    /// `percent` is overall completion of the transaction (0-100)
    fn item(&self, item: &TransactionPackage, phase: ItemPhase, percent: u8);
}

/// Silent progress (no-op)
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl TransactionProgress for SilentProgress {
    fn item(&self, _item: &TransactionPackage, _phase: ItemPhase, _percent: u8) {}
}

/// Logs progress to tracing at info level
///
/// Useful for non-interactive environments or when you want progress in logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl TransactionProgress for LogProgress {
    fn item(&self, item: &TransactionPackage, phase: ItemPhase, percent: u8) {
        match phase {
            ItemPhase::Starting => info!("[{:>3}%] {} {}", percent, item.action.label(), item.package),
            ItemPhase::Applied => info!("[{:>3}%] {} done", percent, item.package),
            ItemPhase::Failed => warn!("[{:>3}%] {} failed", percent, item.package),
        }
    }
}

/// Forwards every update to a closure
pub struct CallbackProgress<F>
where
    F: Fn(&TransactionPackage, ItemPhase, u8) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackProgress<F>
where
    F: Fn(&TransactionPackage, ItemPhase, u8) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> TransactionProgress for CallbackProgress<F>
where
    F: Fn(&TransactionPackage, ItemPhase, u8) + Send + Sync,
{
    fn item(&self, item: &TransactionPackage, phase: ItemPhase, percent: u8) {
        (self.callback)(item, phase, percent);
    }
}
