// src/goal/sweep.rs

//! Orphan sweep for `clean_deps` removals

use crate::index::{CandidateAction, PackageIndex};
use crate::package::{NameArch, PackageRef};
use crate::transaction::{Reason, TransactionAction};
use std::collections::BTreeSet;
use tracing::debug;

/// Does `dependent` require (or weakly require) something `dependency` provides?
fn depends_on(index: &dyn PackageIndex, dependent: &PackageRef, dependency: &PackageRef) -> bool {
    let (Some(meta), Some(dep_meta)) = (index.metadata(dependent), index.metadata(dependency)) else {
        return false;
    };
    meta.requires
        .iter()
        .chain(meta.weak_requires.iter())
        .any(|req| dep_meta.provides_match(dependency, req))
}

/// Extra removals for packages left behind by the removals of `job`
///
/// A package is swept when it was installed as a dependency, lost a
/// dependent to `job` (or to an earlier sweep step) and nothing that remains
/// installed still needs it. Sweeping repeats until no more packages qualify.
/// Protected packages and packages already touched by `actions` are never
/// swept. Removals made by other jobs only count as gone, never as seeds.
pub(super) fn sweep_orphans(
    index: &dyn PackageIndex,
    actions: &[CandidateAction],
    protected: &BTreeSet<String>,
    job: usize,
) -> Vec<CandidateAction> {
    let touched: BTreeSet<NameArch> = actions.iter().map(|a| a.package.name_arch()).collect();
    let gone: Vec<&PackageRef> = actions
        .iter()
        .filter(|a| a.action.is_removal())
        .map(|a| &a.package)
        .collect();
    let mut removed: Vec<PackageRef> = actions
        .iter()
        .filter(|a| a.action.is_removal() && a.job == Some(job))
        .map(|a| a.package.clone())
        .collect();

    let mut present: Vec<PackageRef> = index
        .installed()
        .into_iter()
        .filter(|pkg| !gone.contains(&pkg))
        .collect();
    present.extend(
        actions
            .iter()
            .filter(|a| a.action.is_inbound())
            .map(|a| a.package.clone()),
    );

    let mut swept = Vec::new();
    loop {
        let orphan = present.iter().position(|pkg| {
            if touched.contains(&pkg.name_arch()) || protected.contains(pkg.name()) {
                return false;
            }
            let from_dependency = index
                .metadata(pkg)
                .and_then(|meta| meta.install_reason)
                .is_some_and(|reason| reason != Reason::User);
            from_dependency
                && removed.iter().any(|gone| depends_on(index, gone, pkg))
                && !present
                    .iter()
                    .any(|other| other != pkg && depends_on(index, other, pkg))
        });

        let Some(position) = orphan else {
            break;
        };
        let pkg = present.remove(position);
        debug!("Sweeping orphaned dependency {}", pkg);
        let mut action = CandidateAction::new(pkg.clone(), TransactionAction::Remove, Reason::Clean);
        action.job = Some(job);
        swept.push(action);
        removed.push(pkg);
    }

    swept
}
