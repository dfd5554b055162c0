// src/transaction/installer.rs

//! Installer collaborator used by the executor

use super::TransactionPackage;
use thiserror::Error;

/// Failure applying a single transaction item
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("payload of {0} is corrupt")]
    PayloadCorrupt(String),

    #[error("insufficient space to apply {0}")]
    InsufficientSpace(String),

    #[error("{hook} hook of {package} exited with status {status}")]
    HookFailed {
        package: String,
        hook: String,
        status: i32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Applies one package action to the system
///
/// Each call must be near-atomic for its own item: the executor never rolls
/// back items that returned `Ok`.
pub trait Installer {
    fn apply(&mut self, item: &TransactionPackage) -> Result<(), InstallError>;
}

impl<F> Installer for F
where
    F: FnMut(&TransactionPackage) -> Result<(), InstallError>,
{
    fn apply(&mut self, item: &TransactionPackage) -> Result<(), InstallError> {
        self(item)
    }
}
