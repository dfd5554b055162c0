// src/transaction/mod.rs

//! Transactions: ordered package actions and their lifecycle
//!
//! A [`Transaction`] is produced by [`crate::goal::Goal::resolve`] (through the
//! [`TransactionPlanner`]) and applied by the [`TransactionExecutor`].
//!
//! # Transaction Lifecycle
//!
//! ```text
//! CREATED -> STARTED -> IN_PROGRESS -> DONE
//!    |                              \-> FAILED
//!    \-> CANCELED
//! ```
//!
//! States only move forward; no state is ever revisited.

mod executor;
mod installer;
mod lock;
mod planner;

pub use executor::{Execution, ExecutionReport, TransactionExecutor};
pub use installer::{InstallError, Installer};
pub use lock::ExecutionLock;
pub use planner::{OrderedPlan, TransactionPlanner};

use crate::error::{ContractViolation, Result};
use crate::package::{NameArch, PackageRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-wide transaction id
pub fn next_transaction_id() -> u64 {
    NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst)
}

/// Make sure ids handed out from now on are greater than `last`
pub fn advance_transaction_ids(last: u64) {
    NEXT_TRANSACTION_ID.fetch_max(last.saturating_add(1), Ordering::SeqCst);
}

/// What happens to a package in a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionAction {
    Install,
    Upgrade,
    Downgrade,
    Reinstall,
    Remove,
    /// Removed because a package in the transaction obsoletes it
    Obsolete,
    /// Removed because another build of the same name takes its place
    Replaced,
}

impl TransactionAction {
    /// Tie-break rank used when ordering otherwise unconstrained items
    pub fn priority(&self) -> u8 {
        match self {
            Self::Install => 0,
            Self::Upgrade => 1,
            Self::Reinstall => 2,
            Self::Downgrade => 3,
            Self::Remove | Self::Obsolete | Self::Replaced => 4,
        }
    }

    /// Does the action put a package onto the system?
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            Self::Install | Self::Upgrade | Self::Downgrade | Self::Reinstall
        )
    }

    /// Does the action take a package off the system?
    pub fn is_removal(&self) -> bool {
        !self.is_inbound()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "INSTALL",
            Self::Upgrade => "UPGRADE",
            Self::Downgrade => "DOWNGRADE",
            Self::Reinstall => "REINSTALL",
            Self::Remove => "REMOVE",
            Self::Obsolete => "OBSOLETE",
            Self::Replaced => "REPLACED",
        }
    }

    /// Verb used in transaction tables
    pub fn label(&self) -> &'static str {
        match self {
            Self::Install => "Installing",
            Self::Upgrade => "Upgrading",
            Self::Downgrade => "Downgrading",
            Self::Reinstall => "Reinstalling",
            Self::Remove => "Removing",
            Self::Obsolete => "Obsoleting",
            Self::Replaced => "Replacing",
        }
    }
}

impl fmt::Display for TransactionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "INSTALL" => Ok(Self::Install),
            "UPGRADE" => Ok(Self::Upgrade),
            "DOWNGRADE" => Ok(Self::Downgrade),
            "REINSTALL" => Ok(Self::Reinstall),
            "REMOVE" => Ok(Self::Remove),
            "OBSOLETE" => Ok(Self::Obsolete),
            "REPLACED" => Ok(Self::Replaced),
            _ => Err(format!("Invalid transaction action: {s}")),
        }
    }
}

/// Why a package is part of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// Named by a job
    User,
    /// Needed (or broken) by another package in the transaction
    Dependency,
    /// Orphan swept by `clean_deps`
    Clean,
    /// Pulled in by a weak dependency
    WeakDependency,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Dependency => "DEPENDENCY",
            Self::Clean => "CLEAN",
            Self::WeakDependency => "WEAK_DEPENDENCY",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "DEPENDENCY" => Ok(Self::Dependency),
            "CLEAN" => Ok(Self::Clean),
            "WEAK_DEPENDENCY" => Ok(Self::WeakDependency),
            _ => Err(format!("Invalid reason: {s}")),
        }
    }
}

/// Transaction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Produced by the planner, nothing applied
    Created,
    /// Execution lock acquired
    Started,
    /// Items are being applied
    InProgress,
    /// Every item applied
    Done,
    /// An item failed; later items were not attempted
    Failed,
    /// Abandoned before start
    Canceled,
}

impl TransactionState {
    /// Position in the forward-only lifecycle
    fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Started => 1,
            Self::InProgress => 2,
            Self::Done | Self::Failed | Self::Canceled => 3,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }

    /// Is `self -> next` a legal transition?
    pub fn can_advance_to(&self, next: TransactionState) -> bool {
        match (self, next) {
            (Self::Created, Self::Started) => true,
            (Self::Created, Self::Canceled) => true,
            (Self::Started, Self::InProgress) => true,
            (Self::InProgress, Self::Done | Self::Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Started => "STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "STARTED" => Ok(Self::Started),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            _ => Err(format!("Invalid transaction state: {s}")),
        }
    }
}

/// One package action within a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPackage {
    pub package: PackageRef,
    pub action: TransactionAction,
    pub reason: Reason,
    /// Position in execution order
    pub order_index: usize,
    /// Installed build this item takes the place of (upgrade, downgrade, reinstall)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<PackageRef>,
    /// Package responsible for removing this one (obsolete, replaced)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<PackageRef>,
}

impl TransactionPackage {
    pub fn name_arch(&self) -> NameArch {
        self.package.name_arch()
    }
}

impl fmt::Display for TransactionPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.package)?;
        if let Some(ref old) = self.replaces
            && old.evr() != self.package.evr()
        {
            write!(f, " (from {})", old.evr())?;
        }
        Ok(())
    }
}

/// Ordered set of package actions with a lifecycle state
#[derive(Debug, Clone)]
pub struct Transaction {
    id: u64,
    state: TransactionState,
    items: Vec<TransactionPackage>,
}

impl Transaction {
    /// Create a transaction in the CREATED state with a fresh id
    ///
    /// Items must already carry contiguous `order_index` values; they are
    /// stored sorted by that index.
    pub(crate) fn new(mut items: Vec<TransactionPackage>) -> Self {
        items.sort_by_key(|item| item.order_index);
        Self {
            id: next_transaction_id(),
            state: TransactionState::Created,
            items,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Items in execution order
    pub fn items(&self) -> &[TransactionPackage] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the item acting on `name`
    pub fn find(&self, name: &str) -> Option<&TransactionPackage> {
        self.items.iter().find(|item| item.package.name() == name)
    }

    /// Abandon the transaction before it starts
    pub fn cancel(&mut self) -> Result<()> {
        self.advance(TransactionState::Canceled)
    }

    /// Move to `next`, rejecting anything but a single forward step
    pub(crate) fn advance(&mut self, next: TransactionState) -> Result<()> {
        if self.state.is_final() {
            return Err(ContractViolation::AlreadyFinished {
                id: self.id,
                state: self.state,
            }
            .into());
        }
        if next == TransactionState::Started && self.state != TransactionState::Created {
            return Err(ContractViolation::NotCreated {
                id: self.id,
                state: self.state,
            }
            .into());
        }
        if !self.state.can_advance_to(next) || next.rank() <= self.state.rank() {
            return Err(ContractViolation::InvalidTransition {
                from: self.state,
                to: next,
            }
            .into());
        }
        self.state = next;
        Ok(())
    }

    /// Enter a final state
    pub(crate) fn finish(&mut self, state: TransactionState) -> Result<()> {
        if !state.is_final() {
            return Err(ContractViolation::InvalidTransition {
                from: self.state,
                to: state,
            }
            .into());
        }
        self.advance(state)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transaction {} [{}]", self.id, self.state)?;
        for item in &self.items {
            writeln!(f, "  {:>3}. {} ({})", item.order_index, item, item.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::version::Evr;

    fn item(name: &str, action: TransactionAction, order_index: usize) -> TransactionPackage {
        TransactionPackage {
            package: PackageRef::new(name, "x86_64", Evr::parse("1.0-1").unwrap(), "fedora"),
            action,
            reason: Reason::User,
            order_index,
            replaces: None,
            replaced_by: None,
        }
    }

    #[test]
    fn test_action_priority_order() {
        assert!(TransactionAction::Install.priority() < TransactionAction::Upgrade.priority());
        assert!(TransactionAction::Upgrade.priority() < TransactionAction::Reinstall.priority());
        assert!(TransactionAction::Reinstall.priority() < TransactionAction::Downgrade.priority());
        assert!(TransactionAction::Downgrade.priority() < TransactionAction::Remove.priority());
        assert_eq!(
            TransactionAction::Obsolete.priority(),
            TransactionAction::Remove.priority()
        );
    }

    #[test]
    fn test_string_round_trips() {
        for state in [
            TransactionState::Created,
            TransactionState::Started,
            TransactionState::InProgress,
            TransactionState::Done,
            TransactionState::Failed,
            TransactionState::Canceled,
        ] {
            assert_eq!(state.as_str().parse::<TransactionState>().unwrap(), state);
        }
        assert_eq!("OBSOLETE".parse::<TransactionAction>().unwrap(), TransactionAction::Obsolete);
        assert_eq!("CLEAN".parse::<Reason>().unwrap(), Reason::Clean);
        assert!("SIDEWAYS".parse::<TransactionState>().is_err());
    }

    #[test]
    fn test_items_sorted_by_order_index() {
        let txn = Transaction::new(vec![
            item("b", TransactionAction::Install, 1),
            item("a", TransactionAction::Install, 0),
        ]);
        assert_eq!(txn.items()[0].package.name(), "a");
        assert_eq!(txn.state(), TransactionState::Created);
    }

    #[test]
    fn test_ids_increase() {
        let a = Transaction::new(Vec::new());
        let b = Transaction::new(Vec::new());
        assert!(b.id() > a.id());

        advance_transaction_ids(b.id() + 100);
        let c = Transaction::new(Vec::new());
        assert!(c.id() > b.id() + 100);
    }

    #[test]
    fn test_forward_only_lifecycle() {
        let mut txn = Transaction::new(vec![item("a", TransactionAction::Install, 0)]);
        txn.advance(TransactionState::Started).unwrap();
        txn.advance(TransactionState::InProgress).unwrap();

        let err = txn.advance(TransactionState::Started).unwrap_err();
        assert!(err.is_contract_violation());

        txn.finish(TransactionState::Done).unwrap();
        assert_eq!(txn.state(), TransactionState::Done);
    }

    #[test]
    fn test_double_finish_is_contract_violation() {
        let mut txn = Transaction::new(vec![item("a", TransactionAction::Install, 0)]);
        txn.advance(TransactionState::Started).unwrap();
        txn.advance(TransactionState::InProgress).unwrap();
        txn.finish(TransactionState::Failed).unwrap();

        match txn.finish(TransactionState::Done) {
            Err(Error::Contract(ContractViolation::AlreadyFinished { state, .. })) => {
                assert_eq!(state, TransactionState::Failed);
            }
            other => panic!("expected AlreadyFinished, got {:?}", other),
        }
    }

    #[test]
    fn test_cancel_only_before_start() {
        let mut txn = Transaction::new(Vec::new());
        txn.cancel().unwrap();
        assert_eq!(txn.state(), TransactionState::Canceled);

        let mut started = Transaction::new(Vec::new());
        started.advance(TransactionState::Started).unwrap();
        assert!(started.cancel().unwrap_err().is_contract_violation());
        assert_eq!(started.state(), TransactionState::Started);
    }

    #[test]
    fn test_cannot_finish_from_created() {
        let mut txn = Transaction::new(Vec::new());
        let err = txn.finish(TransactionState::Done).unwrap_err();
        assert!(matches!(
            err,
            Error::Contract(ContractViolation::InvalidTransition { .. })
        ));
    }
}
