// src/goal/mod.rs

//! Goals: user change requests resolved into transactions
//!
//! A [`Goal`] collects [`Job`]s and a [`GoalPolicy`]. [`Goal::resolve`] runs
//! in these steps:
//!
//! 1. Select candidates for each job: pattern lookup, exclusion, the
//!    already-installed short-circuit and the tie-break.
//! 2. Hand the selections to the index's solve primitive.
//! 3. Reject removals of protected packages.
//! 4. Sweep orphans for `clean_deps` removals.
//! 5. Order the result with the [`TransactionPlanner`].
//!
//! Resolution is all-or-nothing: a transaction or a problem list, never both.
//! Advisory problems (already installed, ordering cycles) may accompany a
//! transaction.

mod select;
mod sweep;

use crate::error::{ContractViolation, Result};
use crate::index::{CandidateAction, PackageIndex, SolvePolicy, SolveRequest};
use crate::package::PackageRef;
use crate::problem::{Problem, ProblemKind, push_unique};
use crate::transaction::{Transaction, TransactionPlanner};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// What a job asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobAction {
    Install,
    Remove,
    Upgrade,
    Downgrade,
    Reinstall,
    DistroSync,
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
            Self::Reinstall => "reinstall",
            Self::DistroSync => "distro-sync",
        })
    }
}

/// What a job applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTarget {
    /// User pattern (`foo`, `foo-2.0`, `lib*`, full NEVRA)
    Pattern(String),
    /// Exact packages
    Packages(Vec<PackageRef>),
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(pattern) => f.write_str(pattern),
            Self::Packages(packages) => {
                let names: Vec<String> = packages.iter().map(PackageRef::nevra).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}

/// Per-job switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFlags {
    /// Install may pick a lower version than the installed one
    pub allow_downgrade: bool,
    /// Remove dependencies left without dependents
    pub clean_deps: bool,
    /// Skip the job instead of failing the goal if it cannot be satisfied
    pub weak: bool,
    /// Reinstall even if the exact version is installed
    pub force: bool,
}

/// One user request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub action: JobAction,
    pub target: JobTarget,
    pub flags: JobFlags,
}

impl Job {
    pub fn new(action: JobAction, target: JobTarget) -> Self {
        Self {
            action,
            target,
            flags: JobFlags::default(),
        }
    }

    pub fn pattern(action: JobAction, pattern: impl Into<String>) -> Self {
        Self::new(action, JobTarget::Pattern(pattern.into()))
    }

    pub fn packages(action: JobAction, packages: Vec<PackageRef>) -> Self {
        Self::new(action, JobTarget::Packages(packages))
    }

    pub fn with_flags(mut self, flags: JobFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.target)
    }
}

/// Global resolution policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalPolicy {
    /// Package names that may never be removed
    pub protected_packages: BTreeSet<String>,
    /// Require the newest candidate instead of any satisfying one
    pub best: bool,
    /// Allow removing installed packages to resolve conflicts
    pub allow_erasing: bool,
}

impl GoalPolicy {
    pub fn protect(mut self, name: impl Into<String>) -> Self {
        self.protected_packages.insert(name.into());
        self
    }
}

/// Outcome of [`Goal::resolve`]
#[derive(Debug)]
pub enum Resolution {
    /// A transaction, with advisory problems that did not block it
    Solved {
        transaction: Transaction,
        advisories: Vec<Problem>,
    },
    /// Nothing can be done; at least one entry explains why
    Problems(Vec<Problem>),
}

impl Resolution {
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved { .. })
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Solved { transaction, .. } => Some(transaction),
            Self::Problems(_) => None,
        }
    }

    /// Advisories for a solved goal, or the blocking problem list
    pub fn problems(&self) -> &[Problem] {
        match self {
            Self::Solved { advisories, .. } => advisories,
            Self::Problems(problems) => problems,
        }
    }

    pub fn into_transaction(self) -> Option<Transaction> {
        match self {
            Self::Solved { transaction, .. } => Some(transaction),
            Self::Problems(_) => None,
        }
    }
}

/// Clears the resolving flag when a resolve call ends
struct ResolveGuard<'g>(&'g AtomicBool);

impl<'g> ResolveGuard<'g> {
    fn enter(flag: &'g AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ContractViolation::ConcurrentResolve)?;
        Ok(Self(flag))
    }
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Jobs plus policy, resolved against a package index
pub struct Goal<'a> {
    index: &'a dyn PackageIndex,
    jobs: Vec<Job>,
    policy: GoalPolicy,
    resolving: AtomicBool,
}

impl<'a> Goal<'a> {
    pub fn new(index: &'a dyn PackageIndex) -> Self {
        Self::with_policy(index, GoalPolicy::default())
    }

    pub fn with_policy(index: &'a dyn PackageIndex, policy: GoalPolicy) -> Self {
        Self {
            index,
            jobs: Vec::new(),
            policy,
            resolving: AtomicBool::new(false),
        }
    }

    pub fn add_job(&mut self, job: Job) -> &mut Self {
        self.jobs.push(job);
        self
    }

    pub fn install(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.add_job(Job::pattern(JobAction::Install, pattern))
    }

    pub fn remove(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.add_job(Job::pattern(JobAction::Remove, pattern))
    }

    pub fn upgrade(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.add_job(Job::pattern(JobAction::Upgrade, pattern))
    }

    pub fn downgrade(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.add_job(Job::pattern(JobAction::Downgrade, pattern))
    }

    pub fn reinstall(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.add_job(Job::pattern(JobAction::Reinstall, pattern))
    }

    pub fn distro_sync(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.add_job(Job::pattern(JobAction::DistroSync, pattern))
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn policy(&self) -> &GoalPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut GoalPolicy {
        &mut self.policy
    }

    pub fn index(&self) -> &'a dyn PackageIndex {
        self.index
    }

    /// Resolve the jobs into a transaction or a list of problems
    ///
    /// Deterministic for unchanged jobs, policy and index. Calling this while
    /// another call on the same goal is running is a contract violation.
    pub fn resolve(&self) -> Result<Resolution> {
        let _guard = ResolveGuard::enter(&self.resolving)?;
        debug!("Resolving goal with {} jobs", self.jobs.len());

        let mut selection = select::Selection::default();
        for (idx, job) in self.jobs.iter().enumerate() {
            select::select(self.index, &self.policy, idx, job, &mut selection);
        }

        let request = SolveRequest {
            jobs: selection.solve_jobs,
            policy: SolvePolicy {
                allow_erasing: self.policy.allow_erasing,
                best: self.policy.best,
            },
        };
        let outcome = self.index.solve(&request);

        let mut problems = selection.problems;
        for problem in outcome.problems {
            push_unique(&mut problems, problem);
        }
        for problem in self.protected_problems(&outcome.actions) {
            push_unique(&mut problems, problem);
        }
        let mut advisories = selection.advisories;

        if !problems.is_empty() {
            debug!("Goal has {} blocking problems", problems.len());
            problems.extend(advisories);
            return Ok(Resolution::Problems(problems));
        }

        let mut actions = outcome.actions;
        let clean_jobs: Vec<usize> = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.action == JobAction::Remove && job.flags.clean_deps)
            .map(|(idx, _)| idx)
            .collect();
        for job in clean_jobs {
            let swept = sweep::sweep_orphans(
                self.index,
                &actions,
                &self.policy.protected_packages,
                job,
            );
            debug!("Orphan sweep for job {} removes {} packages", job + 1, swept.len());
            actions.extend(swept);
        }

        if actions.is_empty() && !advisories.is_empty() {
            return Ok(Resolution::Problems(advisories));
        }

        match TransactionPlanner::new(self.index).order(actions) {
            Ok(plan) => {
                advisories.extend(plan.warnings);
                Ok(Resolution::Solved {
                    transaction: plan.transaction,
                    advisories,
                })
            }
            Err(problem) => {
                let mut problems = vec![problem];
                problems.extend(advisories);
                Ok(Resolution::Problems(problems))
            }
        }
    }

    /// Removals of protected packages, attributed to the job that caused them
    fn protected_problems(&self, actions: &[CandidateAction]) -> Vec<Problem> {
        actions
            .iter()
            .filter(|a| {
                a.action.is_removal()
                    && self
                        .policy
                        .protected_packages
                        .contains(a.package.name())
            })
            .map(|a| {
                let cause = match a.job.and_then(|idx| self.jobs.get(idx).map(|job| (idx, job))) {
                    Some((idx, job)) => format!(" (job {}: {})", idx + 1, job),
                    None => String::new(),
                };
                Problem::new(
                    ProblemKind::ProtectedPackage,
                    vec![a.package.clone()],
                    format!(
                        "The operation would result in removing the following protected packages: {}{}",
                        a.package.name(),
                        cause
                    ),
                )
            })
            .collect()
    }
}
