// src/goal/select.rs

//! Candidate selection
//!
//! Turns each goal job into solve jobs for the index. Pattern lookup,
//! exclusion, the already-installed short-circuit and the repository
//! tie-break all happen here, so the solve primitive only sees concrete
//! candidate lists.

use super::{GoalPolicy, Job, JobAction, JobTarget};
use crate::index::{PackageFilter, PackageIndex, SolveJob, SolveJobKind, candidate_order};
use crate::package::PackageRef;
use crate::problem::{Problem, ProblemKind, push_unique};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Accumulated output of selecting every job of a goal
#[derive(Debug, Default)]
pub(super) struct Selection {
    pub solve_jobs: Vec<SolveJob>,
    pub problems: Vec<Problem>,
    pub advisories: Vec<Problem>,
}

impl Selection {
    fn fail(&mut self, job: &Job, problem: Problem) {
        if job.flags.weak {
            debug!("Skipping weak job '{}': {}", job, problem);
        } else {
            push_unique(&mut self.problems, problem);
        }
    }

    fn advise(&mut self, problem: Problem) {
        push_unique(&mut self.advisories, problem);
    }

    fn push(&mut self, idx: usize, job: &Job, kind: SolveJobKind) {
        self.solve_jobs.push(SolveJob {
            job: idx,
            kind,
            weak: job.flags.weak,
        });
    }
}

/// Packages a job target refers to, split by exclusion
struct Matches {
    visible: Vec<PackageRef>,
    excluded: Vec<PackageRef>,
}

fn lookup(index: &dyn PackageIndex, target: &JobTarget) -> Matches {
    let all: Vec<PackageRef> = match target {
        JobTarget::Pattern(pattern) => {
            index.query(&PackageFilter::pattern(pattern.as_str()).including_excluded())
        }
        JobTarget::Packages(packages) => packages
            .iter()
            .flat_map(|wanted| {
                index
                    .query(
                        &PackageFilter::pattern(wanted.name())
                            .with_arch(wanted.arch())
                            .including_excluded(),
                    )
                    .into_iter()
                    .filter(move |candidate| candidate == wanted)
            })
            .collect(),
    };

    let (excluded, visible) = all
        .into_iter()
        .partition(|pkg| index.is_excluded(pkg) && !index.is_installed(pkg));
    Matches { visible, excluded }
}

fn unmatched(job: &Job, matches: &Matches) -> Problem {
    if matches.excluded.is_empty() {
        Problem::bare(
            ProblemKind::NotFound,
            format!("No match for argument: {}", job.target),
        )
    } else {
        Problem::new(
            ProblemKind::Excluded,
            matches.excluded.clone(),
            format!(
                "All matches for argument '{}' are excluded by configuration",
                job.target
            ),
        )
    }
}

fn arch_compatible(candidate: &PackageRef, installed: &PackageRef) -> bool {
    candidate.arch() == installed.arch() || candidate.arch() == "noarch" || installed.arch() == "noarch"
}

/// Available copies of exactly this build, best repository first
fn available_copy(index: &dyn PackageIndex, pkg: &PackageRef, origin: Option<&str>) -> Option<PackageRef> {
    let mut copies: Vec<PackageRef> = index
        .query(&PackageFilter::pattern(pkg.name()).with_arch(pkg.arch()).available())
        .into_iter()
        .filter(|copy| copy == pkg)
        .collect();
    copies.sort_by(|a, b| candidate_order(a, b, origin));
    copies.into_iter().next()
}

/// Translate one goal job, appending to `selection`
pub(super) fn select(
    index: &dyn PackageIndex,
    policy: &GoalPolicy,
    idx: usize,
    job: &Job,
    selection: &mut Selection,
) {
    match job.action {
        JobAction::Install => select_install(index, policy, idx, job, selection),
        JobAction::Remove => select_remove(index, idx, job, selection),
        JobAction::Upgrade | JobAction::Downgrade | JobAction::Reinstall | JobAction::DistroSync => {
            select_installed(index, policy, idx, job, selection)
        }
    }
}

fn select_install(
    index: &dyn PackageIndex,
    policy: &GoalPolicy,
    idx: usize,
    job: &Job,
    selection: &mut Selection,
) {
    let matches = lookup(index, &job.target);
    if matches.visible.is_empty() {
        selection.fail(job, unmatched(job, &matches));
        return;
    }

    let mut groups: BTreeMap<String, Vec<PackageRef>> = BTreeMap::new();
    for pkg in matches.visible {
        groups.entry(pkg.name().to_string()).or_default().push(pkg);
    }

    for (name, group) in groups {
        let mut installed: Vec<PackageRef> = Vec::new();
        for candidate in &group {
            if let Some(inst) = index.installed_instance(candidate.name(), candidate.arch())
                && !installed.contains(&inst)
            {
                installed.push(inst);
            }
        }
        let origin = installed.first().map(|pkg| pkg.repo().to_string());

        let mut eligible: Vec<PackageRef> = group
            .into_iter()
            .filter(|candidate| {
                match index.installed_instance(candidate.name(), candidate.arch()) {
                    Some(inst) => job.flags.allow_downgrade || candidate.evr() >= inst.evr(),
                    None => true,
                }
            })
            .collect();
        eligible.sort_by(|a, b| candidate_order(a, b, origin.as_deref()));

        let Some(top) = eligible.first().cloned() else {
            if let Some(inst) = installed.first() {
                selection.advise(Problem::new(
                    ProblemKind::AlreadyInstalled,
                    vec![inst.clone()],
                    format!("Package {} of higher version already installed.", inst),
                ));
            }
            continue;
        };

        if index.is_installed(&top) {
            let inst = index
                .installed_instance(top.name(), top.arch())
                .unwrap_or_else(|| top.clone());
            if job.flags.force {
                match available_copy(index, &inst, Some(inst.repo())) {
                    Some(package) => selection.push(idx, job, SolveJobKind::Reinstall { package }),
                    None => selection.fail(
                        job,
                        Problem::new(
                            ProblemKind::NotFound,
                            vec![inst.clone()],
                            format!("Installed package {} not available.", inst),
                        ),
                    ),
                }
            } else {
                debug!("{} already installed for '{}'", inst, name);
                selection.advise(Problem::new(
                    ProblemKind::AlreadyInstalled,
                    vec![inst.clone()],
                    format!("Package {} is already installed.", inst),
                ));
            }
            continue;
        }

        if policy.best {
            eligible.truncate(1);
        }
        selection.push(idx, job, SolveJobKind::Install { candidates: eligible });
    }
}

fn select_remove(index: &dyn PackageIndex, idx: usize, job: &Job, selection: &mut Selection) {
    let targets: Vec<PackageRef> = match &job.target {
        JobTarget::Pattern(pattern) => {
            index.query(&PackageFilter::pattern(pattern.as_str()).installed())
        }
        JobTarget::Packages(packages) => packages
            .iter()
            .filter_map(|pkg| {
                index
                    .installed_instance(pkg.name(), pkg.arch())
                    .filter(|inst| inst == pkg)
            })
            .collect(),
    };

    if targets.is_empty() {
        selection.fail(
            job,
            Problem::bare(
                ProblemKind::NotFound,
                format!("No packages to remove for argument: {}", job.target),
            ),
        );
        return;
    }
    selection.push(idx, job, SolveJobKind::Remove { targets });
}

/// Upgrade, downgrade, reinstall and distro-sync: jobs about installed slots
fn select_installed(
    index: &dyn PackageIndex,
    policy: &GoalPolicy,
    idx: usize,
    job: &Job,
    selection: &mut Selection,
) {
    let matches = lookup(index, &job.target);
    if matches.visible.is_empty() {
        selection.fail(job, unmatched(job, &matches));
        return;
    }

    let names: BTreeSet<&str> = matches.visible.iter().map(PackageRef::name).collect();
    let installed: Vec<PackageRef> = names
        .iter()
        .flat_map(|name| {
            index
                .query(&PackageFilter::pattern(*name).installed())
                .into_iter()
                .filter(move |pkg| pkg.name() == *name)
        })
        .collect();

    if installed.is_empty() {
        let name = matches.visible[0].name();
        selection.fail(
            job,
            Problem::bare(
                ProblemKind::NotFound,
                format!("Package {} available, but not installed.", name),
            ),
        );
        return;
    }

    for inst in installed {
        let mut offered: Vec<PackageRef> = index
            .query(&PackageFilter::pattern(inst.name()).available())
            .into_iter()
            .filter(|pkg| {
                pkg.name() == inst.name()
                    && arch_compatible(pkg, &inst)
                    && matches.visible.iter().any(|v| v.same_build_as(pkg))
            })
            .collect();
        offered.sort_by(|a, b| candidate_order(a, b, Some(inst.repo())));

        match job.action {
            JobAction::Upgrade => {
                let mut candidates: Vec<PackageRef> = offered
                    .into_iter()
                    .filter(|pkg| pkg.evr() > inst.evr())
                    .collect();
                if candidates.is_empty() {
                    debug!("No upgrade available for {}", inst);
                    continue;
                }
                if policy.best {
                    candidates.truncate(1);
                }
                selection.push(idx, job, SolveJobKind::Install { candidates });
            }
            JobAction::Downgrade => {
                let mut candidates: Vec<PackageRef> = offered
                    .into_iter()
                    .filter(|pkg| pkg.evr() < inst.evr())
                    .collect();
                if candidates.is_empty() {
                    selection.advise(Problem::new(
                        ProblemKind::AlreadyInstalled,
                        vec![inst.clone()],
                        format!(
                            "Package {} of lowest version already installed, cannot downgrade it.",
                            inst
                        ),
                    ));
                    continue;
                }
                if policy.best {
                    candidates.truncate(1);
                }
                selection.push(idx, job, SolveJobKind::Install { candidates });
            }
            JobAction::Reinstall => {
                match offered
                    .into_iter()
                    .find(|pkg| pkg == &inst && pkg.arch() == inst.arch())
                {
                    Some(package) => selection.push(idx, job, SolveJobKind::Reinstall { package }),
                    None => selection.fail(
                        job,
                        Problem::new(
                            ProblemKind::NotFound,
                            vec![inst.clone()],
                            format!("Installed package {} not available.", inst),
                        ),
                    ),
                }
            }
            JobAction::DistroSync => match offered.into_iter().next() {
                Some(top) if top != inst => {
                    selection.push(idx, job, SolveJobKind::Install { candidates: vec![top] })
                }
                _ => debug!("{} already in sync", inst),
            },
            JobAction::Install | JobAction::Remove => {}
        }
    }
}
