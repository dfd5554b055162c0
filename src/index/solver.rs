// src/index/solver.rs

//! Deterministic backtracking solve primitive
//!
//! The solver works on a model of the system after the transaction: a map
//! from (name, arch) to the build that will be present. Jobs are applied to
//! that model one at a time, each followed by a settle pass that restores
//! consistency (obsoletes, conflicts, requires). Alternatives are explored
//! depth first on cloned models, and the surviving model is diffed against
//! the installed set to produce the action list.
//!
//! Every collection is ordered (`BTreeMap`, sorted vectors), so the same
//! request against the same index always yields the same outcome.

use super::{
    CandidateAction, PackageFilter, PackageIndex, SolveJob, SolveJobKind, SolveOutcome,
    SolvePolicy, SolveRequest, candidate_order,
};
use crate::package::{NameArch, PackageMetadata, PackageRef, Requirement};
use crate::problem::{Problem, ProblemKind, push_unique};
use crate::transaction::{Reason, TransactionAction};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

type SolveResult<T> = std::result::Result<T, Vec<Problem>>;

/// Model of the post-transaction system
#[derive(Debug, Clone, Default)]
struct Model {
    present: BTreeMap<NameArch, PackageRef>,
    /// Slots decided during this solve; never changed again
    locked: BTreeSet<NameArch>,
    reasons: BTreeMap<NameArch, Reason>,
    origins: BTreeMap<NameArch, usize>,
    reinstall: BTreeSet<NameArch>,
    obsoleted_by: BTreeMap<NameArch, PackageRef>,
    replaced_by: BTreeMap<NameArch, PackageRef>,
    /// Erase installed packages whose requires break instead of repairing them
    erase_dependents: bool,
}

pub(super) struct Solver<'a> {
    index: &'a dyn PackageIndex,
    policy: SolvePolicy,
    installed: BTreeMap<NameArch, PackageRef>,
    universe: Vec<PackageRef>,
    job: usize,
}

impl<'a> Solver<'a> {
    pub(super) fn new(index: &'a dyn PackageIndex, policy: SolvePolicy) -> Self {
        let installed = index
            .installed()
            .into_iter()
            .map(|pkg| (pkg.name_arch(), pkg))
            .collect();
        Self {
            index,
            policy,
            installed,
            universe: index.query(&PackageFilter::all()),
            job: 0,
        }
    }

    pub(super) fn solve(mut self, request: &SolveRequest) -> SolveOutcome {
        let mut model = Model {
            present: self.installed.clone(),
            ..Model::default()
        };
        let mut problems = Vec::new();

        for job in &request.jobs {
            self.job = job.job;
            match self.apply_job(&model, job) {
                Ok(next) => model = next,
                Err(job_problems) if job.weak => {
                    for problem in job_problems {
                        debug!("Skipping weak job {}: {}", job.job, problem);
                    }
                }
                Err(job_problems) => {
                    for problem in job_problems {
                        push_unique(&mut problems, problem);
                    }
                }
            }
        }

        // Jobs that failed left the model untouched
        let actions = self.diff(&model);
        SolveOutcome { actions, problems }
    }

    fn apply_job(&self, model: &Model, job: &SolveJob) -> SolveResult<Model> {
        match &job.kind {
            SolveJobKind::Install { candidates } => {
                let mut rejected = Vec::new();
                for candidate in candidates {
                    let mut trial = model.clone();
                    let attempt = self
                        .place(&mut trial, candidate, Reason::User)
                        .and_then(|()| self.settle(&mut trial))
                        .map(|()| self.weak_pass(&mut trial));
                    match attempt {
                        Ok(()) => return Ok(trial),
                        Err(problems) => {
                            debug!("Candidate {} rejected", candidate);
                            for problem in problems {
                                push_unique(&mut rejected, problem);
                            }
                        }
                    }
                }
                Err(rejected)
            }
            SolveJobKind::Reinstall { package } => {
                let mut trial = model.clone();
                let slot = package.name_arch();
                if trial.locked.contains(&slot) {
                    return Err(vec![Problem::new(
                        ProblemKind::Conflicts,
                        vec![package.clone()],
                        format!("cannot reinstall {}: it is changed by another job", package),
                    )]);
                }
                trial.present.insert(slot.clone(), package.clone());
                trial.reinstall.insert(slot.clone());
                self.mark(&mut trial, slot, Reason::User, true);
                self.settle(&mut trial)?;
                Ok(trial)
            }
            SolveJobKind::Remove { targets } => {
                let mut trial = model.clone();
                trial.erase_dependents = true;
                for target in targets {
                    let slot = target.name_arch();
                    if trial.present.get(&slot) == Some(target) {
                        self.erase(&mut trial, slot, Reason::User);
                    }
                }
                self.settle(&mut trial)?;
                trial.erase_dependents = false;
                Ok(trial)
            }
        }
    }

    /// Put `pkg` into its slot, replacing whatever unlocked build was there
    fn place(&self, model: &mut Model, pkg: &PackageRef, reason: Reason) -> SolveResult<()> {
        let slot = pkg.name_arch();
        if let Some(current) = model.present.get(&slot) {
            if current == pkg {
                self.mark(model, slot, reason, false);
                return Ok(());
            }
            if model.locked.contains(&slot) {
                return Err(vec![Problem::new(
                    ProblemKind::Conflicts,
                    vec![current.clone(), pkg.clone()],
                    format!("cannot install both {} and {}", current, pkg),
                )]);
            }
        } else if model.locked.contains(&slot) {
            return Err(vec![Problem::new(
                ProblemKind::Conflicts,
                vec![pkg.clone()],
                format!("{} is being removed by this transaction", pkg.name()),
            )]);
        }

        // A noarch build and an arch-specific build of one name replace each other
        let displaced: Vec<NameArch> = model
            .present
            .keys()
            .filter(|other| {
                other.name == slot.name
                    && other.arch != slot.arch
                    && (other.arch == "noarch" || slot.arch == "noarch")
            })
            .cloned()
            .collect();
        for other in displaced {
            if model.locked.contains(&other) {
                let existing = model.present[&other].clone();
                return Err(vec![Problem::new(
                    ProblemKind::Conflicts,
                    vec![existing.clone(), pkg.clone()],
                    format!("cannot install both {} and {}", existing, pkg),
                )]);
            }
            model.present.remove(&other);
            model.replaced_by.insert(other.clone(), pkg.clone());
            self.mark(model, other, Reason::Dependency, false);
        }

        model.present.insert(slot.clone(), pkg.clone());
        self.mark(model, slot, reason, reason == Reason::User);
        Ok(())
    }

    fn erase(&self, model: &mut Model, slot: NameArch, reason: Reason) {
        model.present.remove(&slot);
        self.mark(model, slot, reason, reason == Reason::User);
    }

    fn mark(&self, model: &mut Model, slot: NameArch, reason: Reason, overwrite: bool) {
        if overwrite {
            model.reasons.insert(slot.clone(), reason);
        } else {
            model.reasons.entry(slot.clone()).or_insert(reason);
        }
        model.origins.entry(slot.clone()).or_insert(self.job);
        model.locked.insert(slot);
    }

    /// Is the present build in `slot` something other than the untouched installed build?
    fn is_changed(&self, model: &Model, slot: &NameArch) -> bool {
        match (model.present.get(slot), self.installed.get(slot)) {
            (Some(present), Some(installed)) => {
                present != installed || model.reinstall.contains(slot)
            }
            _ => true,
        }
    }

    fn metadata(&self, pkg: &PackageRef) -> Option<&'a PackageMetadata> {
        self.index.metadata(pkg)
    }

    fn provides(&self, pkg: &PackageRef, req: &Requirement) -> bool {
        match self.metadata(pkg) {
            Some(meta) => meta.provides_match(pkg, req),
            None => req.matches(pkg.name(), Some(pkg.evr())),
        }
    }

    fn satisfied<'m>(&self, mut world: impl Iterator<Item = &'m PackageRef>, req: &Requirement) -> bool {
        world.any(|pkg| self.provides(pkg, req))
    }

    /// Restore consistency after a change, exploring alternatives as needed
    fn settle(&self, model: &mut Model) -> SolveResult<()> {
        loop {
            if self.apply_obsoletes(model)? {
                continue;
            }
            if self.resolve_conflicts(model)? {
                continue;
            }
            if self.repair_requires(model)? {
                continue;
            }
            return Ok(());
        }
    }

    /// Remove installed packages obsoleted by planned ones; true if the model changed
    fn apply_obsoletes(&self, model: &mut Model) -> SolveResult<bool> {
        let planned: Vec<PackageRef> = model
            .present
            .iter()
            .filter(|(slot, _)| self.is_changed(model, slot))
            .map(|(_, pkg)| pkg.clone())
            .collect();

        for pkg in &planned {
            let Some(meta) = self.metadata(pkg) else {
                continue;
            };
            for obsolete in &meta.obsoletes {
                let victim = model
                    .present
                    .iter()
                    .find(|(_, other)| {
                        other.name() != pkg.name() && obsolete.matches(other.name(), Some(other.evr()))
                    })
                    .map(|(slot, other)| (slot.clone(), other.clone()));

                if let Some((slot, other)) = victim {
                    if model.locked.contains(&slot) {
                        return Err(vec![Problem::new(
                            ProblemKind::Conflicts,
                            vec![pkg.clone(), other.clone()],
                            format!("package {} obsoletes {} provided by {}", pkg, obsolete, other),
                        )]);
                    }
                    debug!("{} obsoletes {}", pkg, other);
                    model.present.remove(&slot);
                    model.obsoleted_by.insert(slot.clone(), pkg.clone());
                    self.mark(model, slot, Reason::Dependency, false);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Handle explicit conflicts involving at least one planned package
    ///
    /// Erases one side of the first erasable conflict. When nothing can be
    /// erased, every conflicting pair is reported.
    fn resolve_conflicts(&self, model: &mut Model) -> SolveResult<bool> {
        let present: Vec<(NameArch, PackageRef)> = model
            .present
            .iter()
            .map(|(slot, pkg)| (slot.clone(), pkg.clone()))
            .collect();
        let mut problems = Vec::new();

        for (slot, pkg) in &present {
            let Some(meta) = self.metadata(pkg) else {
                continue;
            };
            for conflict in &meta.conflicts {
                for (other_slot, other) in &present {
                    if other_slot == slot || !self.provides(other, conflict) {
                        continue;
                    }
                    if !self.is_changed(model, slot) && !self.is_changed(model, other_slot) {
                        continue;
                    }

                    let erasable = |s: &NameArch| {
                        !model.locked.contains(s)
                            && (self.policy.allow_erasing || model.erase_dependents)
                    };
                    let victim = if erasable(other_slot) {
                        Some(other_slot.clone())
                    } else if erasable(slot) {
                        Some(slot.clone())
                    } else {
                        None
                    };

                    match victim {
                        Some(victim) => {
                            debug!("Erasing {} to resolve conflict {} / {}", victim, pkg, other);
                            self.erase(model, victim, Reason::Dependency);
                            return Ok(true);
                        }
                        None => push_unique(
                            &mut problems,
                            Problem::new(
                                ProblemKind::Conflicts,
                                vec![pkg.clone(), other.clone()],
                                format!(
                                    "package {} conflicts with {} provided by {}",
                                    pkg, conflict, other
                                ),
                            ),
                        ),
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(false)
        } else {
            Err(problems)
        }
    }

    /// Fix the first unmet hard requirement; true if the model changed
    fn repair_requires(&self, model: &mut Model) -> SolveResult<bool> {
        let present: Vec<(NameArch, PackageRef)> = model
            .present
            .iter()
            .map(|(slot, pkg)| (slot.clone(), pkg.clone()))
            .collect();

        for (slot, pkg) in &present {
            let Some(meta) = self.metadata(pkg) else {
                continue;
            };
            let changed = self.is_changed(model, slot);
            for req in &meta.requires {
                if self.satisfied(model.present.values(), req) {
                    continue;
                }
                // Breakage that predates this transaction is not ours to fix
                if !changed && !self.satisfied(self.installed.values(), req) {
                    continue;
                }
                self.repair(model, slot, pkg, req, changed, Reason::Dependency)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn repair(
        &self,
        model: &mut Model,
        slot: &NameArch,
        pkg: &PackageRef,
        req: &Requirement,
        changed: bool,
        reason: Reason,
    ) -> SolveResult<()> {
        if !changed && model.erase_dependents && !model.locked.contains(slot) {
            debug!("Erasing {} (requires {})", pkg, req);
            self.erase(model, slot.clone(), Reason::Dependency);
            return Ok(());
        }

        let providers = self.providers(model, req);
        let mut nested = None;
        for provider in &providers {
            let mut trial = model.clone();
            let attempt = self
                .place(&mut trial, provider, reason)
                .and_then(|()| self.settle(&mut trial));
            match attempt {
                Ok(()) => {
                    debug!("{} satisfies '{}' for {}", provider, req, pkg);
                    *model = trial;
                    return Ok(());
                }
                Err(problems) => {
                    nested.get_or_insert(problems);
                }
            }
        }

        if !changed && !model.locked.contains(slot) {
            if let Some(upgraded) = self.upgrade_broken(model, slot, pkg) {
                *model = upgraded;
                return Ok(());
            }
            if self.policy.allow_erasing {
                debug!("Erasing {} (requires {})", pkg, req);
                self.erase(model, slot.clone(), Reason::Dependency);
                return Ok(());
            }
        }

        let message = if providers.is_empty() && !changed {
            format!("problem with installed package {}: requires {}", pkg, req)
        } else if providers.is_empty() {
            format!("nothing provides {} needed by {}", req, pkg)
        } else {
            format!(
                "package {} requires {}, but none of the providers can be installed",
                pkg, req
            )
        };
        let mut problems = vec![Problem::new(
            ProblemKind::BrokenDependency,
            vec![pkg.clone()],
            message,
        )];
        for problem in nested.unwrap_or_default() {
            push_unique(&mut problems, problem);
        }
        Err(problems)
    }

    /// Try newer builds of an installed package whose requires broke
    fn upgrade_broken(&self, model: &Model, slot: &NameArch, pkg: &PackageRef) -> Option<Model> {
        let mut candidates: Vec<&PackageRef> = self
            .universe
            .iter()
            .filter(|c| &c.name_arch() == slot && c.evr() > pkg.evr())
            .collect();
        candidates.sort_by(|a, b| candidate_order(a, b, Some(pkg.repo())));

        candidates.into_iter().find_map(|candidate| {
            let mut trial = model.clone();
            self.place(&mut trial, candidate, Reason::Dependency)
                .and_then(|()| self.settle(&mut trial))
                .ok()
                .map(|()| trial)
        })
    }

    /// Visible packages that could satisfy `req` given the locked slots
    fn providers(&self, model: &Model, req: &Requirement) -> Vec<PackageRef> {
        let mut providers: Vec<&PackageRef> = self
            .universe
            .iter()
            .filter(|candidate| {
                let slot = candidate.name_arch();
                let free = !model.locked.contains(&slot)
                    || model.present.get(&slot) == Some(*candidate);
                free && self.provides(candidate, req)
            })
            .collect();

        providers.sort_by(|a, b| self.provider_order(a, b));
        providers.dedup_by(|a, b| a == b);
        if self.policy.best {
            providers.truncate(1);
        }
        providers.into_iter().cloned().collect()
    }

    fn provider_order(&self, a: &PackageRef, b: &PackageRef) -> Ordering {
        // Providers already on the system first, then by name
        let a_installed = self.installed.contains_key(&a.name_arch());
        let b_installed = self.installed.contains_key(&b.name_arch());
        b_installed
            .cmp(&a_installed)
            .then_with(|| a.name().cmp(b.name()))
            .then_with(|| a.arch().cmp(b.arch()))
            .then_with(|| {
                let origin = self.installed.get(&a.name_arch()).map(PackageRef::repo);
                candidate_order(a, b, origin)
            })
    }

    /// Satisfy weak requires of planned packages where possible
    fn weak_pass(&self, model: &mut Model) {
        loop {
            let planned: Vec<(NameArch, PackageRef)> = model
                .present
                .iter()
                .filter(|(slot, _)| self.is_changed(model, slot))
                .map(|(slot, pkg)| (slot.clone(), pkg.clone()))
                .collect();

            let mut progressed = false;
            'packages: for (_, pkg) in &planned {
                let Some(meta) = self.metadata(pkg) else {
                    continue;
                };
                for req in &meta.weak_requires {
                    if self.satisfied(model.present.values(), req) {
                        continue;
                    }
                    for provider in self.providers(model, req) {
                        let mut trial = model.clone();
                        let attempt = self
                            .place(&mut trial, &provider, Reason::WeakDependency)
                            .and_then(|()| self.settle(&mut trial));
                        if attempt.is_ok() {
                            debug!("{} recommended by {}", provider, pkg);
                            *model = trial;
                            progressed = true;
                            break 'packages;
                        }
                    }
                    debug!("Weak dependency '{}' of {} skipped", req, pkg);
                }
            }

            if !progressed {
                return;
            }
        }
    }

    /// Turn the final model into actions relative to the installed set
    fn diff(&self, model: &Model) -> Vec<CandidateAction> {
        let mut actions = Vec::new();

        for (slot, pkg) in &model.present {
            let action = match self.installed.get(slot) {
                None => TransactionAction::Install,
                Some(old) if old == pkg => {
                    if !model.reinstall.contains(slot) {
                        continue;
                    }
                    TransactionAction::Reinstall
                }
                Some(old) if pkg.evr() > old.evr() => TransactionAction::Upgrade,
                Some(_) => TransactionAction::Downgrade,
            };
            let mut candidate = CandidateAction::new(
                pkg.clone(),
                action,
                model.reasons.get(slot).copied().unwrap_or(Reason::Dependency),
            );
            candidate.replaces = self.installed.get(slot).cloned();
            candidate.job = model.origins.get(slot).copied();
            actions.push(candidate);
        }

        for (slot, old) in &self.installed {
            if model.present.contains_key(slot) {
                continue;
            }
            let (action, replaced_by) = if let Some(by) = model.obsoleted_by.get(slot) {
                (TransactionAction::Obsolete, Some(by.clone()))
            } else if let Some(by) = model.replaced_by.get(slot) {
                (TransactionAction::Replaced, Some(by.clone()))
            } else {
                (TransactionAction::Remove, None)
            };
            let mut candidate = CandidateAction::new(
                old.clone(),
                action,
                model.reasons.get(slot).copied().unwrap_or(Reason::Dependency),
            );
            candidate.replaced_by = replaced_by;
            candidate.job = model.origins.get(slot).copied();
            actions.push(candidate);
        }

        actions
    }
}
