// src/index/mod.rs

//! Package index contract
//!
//! The index is the queryable universe of installed and available packages.
//! Goal resolution only consumes it through [`PackageIndex`]: pattern queries,
//! per-package metadata and the `solve` primitive. [`MemoryIndex`] is the
//! in-process implementation used by the command-line front end and tests.

mod memory;
mod solver;
mod universe;

pub use memory::MemoryIndex;
pub use universe::{UniverseEntry, UniverseFile};

use crate::package::{PackageMetadata, PackageRef};
use crate::problem::Problem;
use crate::transaction::{Reason, TransactionAction};
use glob::Pattern;
use std::cmp::Ordering;

/// Selection criteria for [`PackageIndex::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    /// Glob matched against name, `name-version`, `name-evr` and NEVRA
    pub pattern: Option<String>,
    /// `Some(true)`: installed only, `Some(false)`: available only
    pub installed: Option<bool>,
    pub arch: Option<String>,
    /// Also return available packages hidden by exclusion policy
    pub include_excluded: bool,
}

impl PackageFilter {
    /// Everything visible
    pub fn all() -> Self {
        Self::default()
    }

    /// Packages matching a user pattern
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Restrict to installed packages
    pub fn installed(mut self) -> Self {
        self.installed = Some(true);
        self
    }

    /// Restrict to packages offered by repositories
    pub fn available(mut self) -> Self {
        self.installed = Some(false);
        self
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn including_excluded(mut self) -> Self {
        self.include_excluded = true;
        self
    }

    /// Does `pkg` satisfy the pattern and architecture parts of this filter?
    pub fn matches(&self, pkg: &PackageRef) -> bool {
        if let Some(ref arch) = self.arch
            && pkg.arch() != arch
        {
            return false;
        }
        match self.pattern {
            Some(ref pattern) => pattern_matches(pattern, pkg),
            None => true,
        }
    }
}

/// Match a user pattern the way package managers do
///
/// `foo`, `foo-2.0`, `foo-2.0-1`, `foo-1:2.0-1`, `foo-2.0-1.x86_64` and
/// globs such as `lib*` all select `foo`-style packages.
pub fn pattern_matches(pattern: &str, pkg: &PackageRef) -> bool {
    let evr = pkg.evr();
    let mut forms = vec![
        pkg.name().to_string(),
        format!("{}.{}", pkg.name(), pkg.arch()),
        format!("{}-{}", pkg.name(), evr.version),
        format!("{}-{}", pkg.name(), evr),
        pkg.nevra(),
    ];
    if let Some(ref release) = evr.release {
        forms.push(format!("{}-{}-{}", pkg.name(), evr.version, release));
        forms.push(format!(
            "{}-{}-{}.{}",
            pkg.name(),
            evr.version,
            release,
            pkg.arch()
        ));
    }

    match Pattern::new(pattern) {
        Ok(glob) => forms.iter().any(|form| glob.matches(form)),
        Err(_) => forms.iter().any(|form| form == pattern),
    }
}

/// Candidate preference used everywhere a single package must be picked
///
/// Highest EVR first, then a build from the repository the installed copy
/// came from, then the lexicographically smallest repository id.
pub fn candidate_order(a: &PackageRef, b: &PackageRef, installed_repo: Option<&str>) -> Ordering {
    b.evr()
        .cmp(a.evr())
        .then_with(|| {
            let a_origin = installed_repo == Some(a.repo());
            let b_origin = installed_repo == Some(b.repo());
            b_origin.cmp(&a_origin)
        })
        .then_with(|| a.repo().cmp(b.repo()))
        .then_with(|| a.arch().cmp(b.arch()))
        .then_with(|| a.name().cmp(b.name()))
}

/// Global knobs the solve primitive honors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolvePolicy {
    /// Erase installed packages to resolve conflicts and broken requires
    pub allow_erasing: bool,
    /// Only consider the best provider for dependencies
    pub best: bool,
}

/// What a solve job asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveJobKind {
    /// Make one of the candidates present; they are tried in order
    Install { candidates: Vec<PackageRef> },
    /// Replace an installed build with an identical available copy
    Reinstall { package: PackageRef },
    /// Erase installed packages along with everything that requires them
    Remove { targets: Vec<PackageRef> },
}

/// One request handed to the solve primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveJob {
    /// Index of the goal job this request came from
    pub job: usize,
    pub kind: SolveJobKind,
    /// Skip instead of failing when unsatisfiable
    pub weak: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveRequest {
    pub jobs: Vec<SolveJob>,
    pub policy: SolvePolicy,
}

/// One change in a solve result, before ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAction {
    pub package: PackageRef,
    pub action: TransactionAction,
    pub reason: Reason,
    pub replaces: Option<PackageRef>,
    pub replaced_by: Option<PackageRef>,
    /// Goal job whose processing introduced the change
    pub job: Option<usize>,
}

impl CandidateAction {
    pub fn new(package: PackageRef, action: TransactionAction, reason: Reason) -> Self {
        Self {
            package,
            action,
            reason,
            replaces: None,
            replaced_by: None,
            job: None,
        }
    }
}

/// Result of the solve primitive
///
/// `actions` always reflects the jobs that succeeded, so callers can check
/// policy against them even when `problems` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveOutcome {
    pub actions: Vec<CandidateAction>,
    pub problems: Vec<Problem>,
}

/// Queryable package universe with a solve primitive
///
/// Implementations must be deterministic: the same request against the same
/// snapshot yields the same outcome. Resolution never mutates the index, so
/// shared references may be used from several threads.
pub trait PackageIndex: Send + Sync {
    /// Packages matching `filter`, sorted, one entry per (package, repository)
    fn query(&self, filter: &PackageFilter) -> Vec<PackageRef>;

    /// Metadata for a package (installed or available)
    fn metadata(&self, pkg: &PackageRef) -> Option<&PackageMetadata>;

    /// The installed build with this package's name and architecture
    fn installed_instance(&self, name: &str, arch: &str) -> Option<PackageRef>;

    /// Is the package hidden by exclusion policy?
    fn is_excluded(&self, pkg: &PackageRef) -> bool;

    /// Compute a satisfying action set for the request
    fn solve(&self, request: &SolveRequest) -> SolveOutcome;

    /// Is this exact build installed?
    fn is_installed(&self, pkg: &PackageRef) -> bool {
        self.installed_instance(pkg.name(), pkg.arch())
            .is_some_and(|installed| &installed == pkg)
    }

    /// All installed packages
    fn installed(&self) -> Vec<PackageRef> {
        self.query(&PackageFilter::all().installed())
    }
}
