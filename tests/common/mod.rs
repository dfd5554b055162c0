// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use goalpost::index::UniverseFile;
use goalpost::{
    HistoryStore, MemoryIndex, PackageIndex, Resolution, SilentProgress, Transaction,
    TransactionExecutor,
};
use goalpost::transaction::ExecutionReport;
use std::collections::BTreeSet;
use std::time::Duration;
use tempfile::TempDir;

/// foo-1.0 installed; foo-2.0 and bar-1.0 (requiring foo >= 2.0) available
pub const SCENARIO_A: &str = r#"
[[installed]]
nevra = "foo-1.0-1.x86_64"
repo = "fedora"

[[available]]
nevra = "foo-1.0-1.x86_64"
repo = "fedora"

[[available]]
nevra = "foo-2.0-1.x86_64"
repo = "updates"

[[available]]
nevra = "bar-1.0-1.x86_64"
repo = "updates"
requires = ["foo >= 2.0"]
"#;

/// A small base system with a protected core and an obsoleting replacement
pub const BASE_SYSTEM: &str = r#"
[[installed]]
nevra = "glibc-2.38-1.x86_64"
repo = "fedora"

[[installed]]
nevra = "bash-5.2-1.x86_64"
repo = "fedora"
requires = ["glibc"]

[[installed]]
nevra = "net-tools-2.0-1.x86_64"
repo = "fedora"
requires = ["glibc"]

[[available]]
nevra = "glibc-2.38-1.x86_64"
repo = "fedora"

[[available]]
nevra = "iproute-6.4-1.x86_64"
repo = "fedora"
requires = ["glibc"]
obsoletes = ["net-tools < 3"]
provides = ["net-tools = 3.0"]

[[available]]
nevra = "postfix-3.8-1.x86_64"
repo = "fedora"
conflicts = ["sendmail"]

[[available]]
nevra = "sendmail-8.17-1.x86_64"
repo = "fedora"
"#;

/// Build an index from universe TOML
pub fn universe(toml: &str) -> MemoryIndex {
    MemoryIndex::from_universe(UniverseFile::parse(toml).unwrap()).unwrap()
}

/// Installed NEVRAs, sorted
pub fn installed_set(index: &MemoryIndex) -> BTreeSet<String> {
    index.installed().iter().map(|pkg| pkg.nevra()).collect()
}

/// `ACTION nevra` for every item, in execution order
pub fn summary(transaction: &Transaction) -> Vec<String> {
    transaction
        .items()
        .iter()
        .map(|item| format!("{} {}", item.action, item.package.nevra()))
        .collect()
}

/// Unwrap a solved resolution
pub fn solved(resolution: Resolution) -> Transaction {
    match resolution {
        Resolution::Solved { transaction, .. } => transaction,
        Resolution::Problems(problems) => panic!("expected a transaction, got {:?}", problems),
    }
}

/// Temp directory with a lock path and an on-disk history database
pub struct Workspace {
    pub dir: TempDir,
    pub history: HistoryStore,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::open(dir.path().join("history.db")).unwrap();
        Self { dir, history }
    }

    pub fn executor(&self) -> TransactionExecutor {
        TransactionExecutor::new(self.dir.path().join("goalpost.lock"))
            .with_lock_timeout(Duration::from_millis(300))
    }

    /// Execute against the index itself as installer
    pub fn execute(&mut self, index: &mut MemoryIndex, transaction: Transaction) -> ExecutionReport {
        self.executor()
            .start(transaction)
            .unwrap()
            .run(index, &SilentProgress, &mut self.history)
            .unwrap()
    }
}
