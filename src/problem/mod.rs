// src/problem/mod.rs

//! Resolution problems
//!
//! Problems are data, not errors. A goal that cannot be satisfied returns a
//! list of problems describing why; advisories (ordering cycles, already
//! installed packages) may ride along with a valid transaction.

mod report;

pub use report::ProblemReporter;

use crate::package::PackageRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of resolution problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProblemKind {
    /// Removal of a package listed in the protected set
    ProtectedPackage,
    /// Two resolved packages explicitly exclude each other
    Conflicts,
    /// A required capability has no acceptable provider
    BrokenDependency,
    /// A job pattern matched no candidates
    NotFound,
    /// Every candidate was filtered out by exclusion policy
    Excluded,
    /// The ordering graph had a cycle that was broken (advisory)
    OrderingCycle,
    /// The requested version is already installed (advisory)
    AlreadyInstalled,
}

impl ProblemKind {
    /// Does this problem prevent a transaction from being produced?
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::OrderingCycle | Self::AlreadyInstalled)
    }

    /// Report ordering rank, lower is more severe
    pub fn severity(&self) -> u8 {
        match self {
            Self::ProtectedPackage | Self::Conflicts | Self::BrokenDependency => 0,
            Self::NotFound | Self::Excluded => 1,
            Self::OrderingCycle | Self::AlreadyInstalled => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProtectedPackage => "PROTECTED_PACKAGE",
            Self::Conflicts => "CONFLICTS",
            Self::BrokenDependency => "BROKEN_DEPENDENCY",
            Self::NotFound => "NOT_FOUND",
            Self::Excluded => "EXCLUDED",
            Self::OrderingCycle => "ORDERING_CYCLE",
            Self::AlreadyInstalled => "ALREADY_INSTALLED",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROTECTED_PACKAGE" => Ok(Self::ProtectedPackage),
            "CONFLICTS" => Ok(Self::Conflicts),
            "BROKEN_DEPENDENCY" => Ok(Self::BrokenDependency),
            "NOT_FOUND" => Ok(Self::NotFound),
            "EXCLUDED" => Ok(Self::Excluded),
            "ORDERING_CYCLE" => Ok(Self::OrderingCycle),
            "ALREADY_INSTALLED" => Ok(Self::AlreadyInstalled),
            _ => Err(format!("Invalid problem kind: {s}")),
        }
    }
}

/// One resolution problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub kind: ProblemKind,
    /// Packages involved, in the order they were encountered
    pub implicated: Vec<PackageRef>,
    pub message: String,
}

impl Problem {
    pub fn new(kind: ProblemKind, implicated: Vec<PackageRef>, message: impl Into<String>) -> Self {
        Self {
            kind,
            implicated,
            message: message.into(),
        }
    }

    /// Problem with no implicated package (e.g. a pattern that matched nothing)
    pub fn bare(kind: ProblemKind, message: impl Into<String>) -> Self {
        Self::new(kind, Vec::new(), message)
    }

    pub fn is_blocking(&self) -> bool {
        self.kind.is_blocking()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Append `problem` unless an identical one is already present
pub(crate) fn push_unique(problems: &mut Vec<Problem>, problem: Problem) {
    if !problems.contains(&problem) {
        problems.push(problem);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ProblemKind::ProtectedPackage,
            ProblemKind::Conflicts,
            ProblemKind::BrokenDependency,
            ProblemKind::NotFound,
            ProblemKind::Excluded,
            ProblemKind::OrderingCycle,
            ProblemKind::AlreadyInstalled,
        ] {
            assert_eq!(kind.as_str().parse::<ProblemKind>().unwrap(), kind);
        }
        assert!("BOGUS".parse::<ProblemKind>().is_err());
    }

    #[test]
    fn test_advisories_do_not_block() {
        assert!(!ProblemKind::OrderingCycle.is_blocking());
        assert!(!ProblemKind::AlreadyInstalled.is_blocking());
        assert!(ProblemKind::Excluded.is_blocking());
        assert!(ProblemKind::ProtectedPackage.is_blocking());
    }

    #[test]
    fn test_push_unique() {
        let mut problems = Vec::new();
        push_unique(&mut problems, Problem::bare(ProblemKind::NotFound, "no foo"));
        push_unique(&mut problems, Problem::bare(ProblemKind::NotFound, "no foo"));
        push_unique(&mut problems, Problem::bare(ProblemKind::NotFound, "no bar"));
        assert_eq!(problems.len(), 2);
    }
}
