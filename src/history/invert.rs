// src/history/invert.rs

//! Undo: turn a recorded transaction into a goal that reverses it

use super::{HistoryItem, HistoryRecord, ItemOutcome};
use crate::error::{Error, Result};
use crate::goal::{Goal, GoalPolicy, Job, JobAction, JobFlags};
use crate::index::{PackageFilter, PackageIndex, candidate_order};
use crate::package::PackageRef;
use crate::transaction::{TransactionAction, TransactionState};
use crate::version::Evr;
use tracing::debug;

/// Build a goal reversing `record`
///
/// Items are inverted last to first: upgrades become downgrades to the
/// previous build (and vice versa), installs become removals, removals of
/// any kind become installs of the recorded build, and reinstalls stay
/// reinstalls. Builds that must come back are looked up among the available
/// packages; a build no repository offers any more makes the record
/// irreversible.
pub fn invert<'a>(
    record: &HistoryRecord,
    index: &'a dyn PackageIndex,
    policy: GoalPolicy,
) -> Result<Goal<'a>> {
    if record.state != TransactionState::Done {
        return Err(Error::InvalidHistoryRecord(format!(
            "transaction {} ended {}, only DONE transactions can be undone",
            record.id, record.state
        )));
    }

    let mut goal = Goal::with_policy(index, policy);
    let restore = JobFlags {
        allow_downgrade: true,
        ..Default::default()
    };

    for item in record.items.iter().rev() {
        if item.outcome != ItemOutcome::Applied {
            continue;
        }

        let job = match item.action {
            TransactionAction::Install => Job::packages(JobAction::Remove, vec![item.package()]),
            TransactionAction::Upgrade | TransactionAction::Downgrade => {
                let previous = item.previous_evr.as_ref().ok_or_else(|| {
                    Error::InvalidHistoryRecord(format!(
                        "transaction {}: {} has no previous version",
                        record.id,
                        item.package()
                    ))
                })?;
                let target = available_build(index, item, previous)?;
                let action = if item.action == TransactionAction::Upgrade {
                    JobAction::Downgrade
                } else {
                    JobAction::Upgrade
                };
                Job::packages(action, vec![target])
            }
            TransactionAction::Reinstall => {
                let target = available_build(index, item, &item.evr)?;
                Job::packages(JobAction::Reinstall, vec![target])
            }
            TransactionAction::Remove | TransactionAction::Obsolete | TransactionAction::Replaced => {
                let target = available_build(index, item, &item.evr)?;
                Job::packages(JobAction::Install, vec![target]).with_flags(restore)
            }
        };
        debug!("Undo of transaction {}: {}", record.id, job);
        goal.add_job(job);
    }

    Ok(goal)
}

/// The available copy of `item`'s package at version `evr`
fn available_build(index: &dyn PackageIndex, item: &HistoryItem, evr: &Evr) -> Result<PackageRef> {
    let mut copies: Vec<PackageRef> = index
        .query(
            &PackageFilter::pattern(item.name.as_str())
                .with_arch(item.arch.as_str())
                .available(),
        )
        .into_iter()
        .filter(|pkg| pkg.name() == item.name && pkg.evr() == evr)
        .collect();
    copies.sort_by(|a, b| candidate_order(a, b, Some(item.repo.as_str())));

    copies.into_iter().next().ok_or_else(|| {
        Error::HistoryPackageUnavailable(format!("{}-{}.{}", item.name, evr, item.arch))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::package::PackageMetadata;
    use crate::transaction::Reason;

    fn item(action: TransactionAction, evr: &str, previous: Option<&str>) -> HistoryItem {
        HistoryItem {
            name: "foo".to_string(),
            arch: "x86_64".to_string(),
            evr: Evr::parse(evr).unwrap(),
            action,
            reason: Reason::User,
            outcome: ItemOutcome::Applied,
            repo: "fedora".to_string(),
            previous_evr: previous.map(|p| Evr::parse(p).unwrap()),
            cause: None,
        }
    }

    fn record(state: TransactionState, items: Vec<HistoryItem>) -> HistoryRecord {
        HistoryRecord {
            id: 7,
            start_epoch: 0,
            end_epoch: 1,
            state,
            items,
        }
    }

    #[test]
    fn test_failed_record_is_rejected() {
        let index = MemoryIndex::new();
        let failed = record(TransactionState::Failed, vec![]);
        assert!(matches!(
            invert(&failed, &index, GoalPolicy::default()),
            Err(Error::InvalidHistoryRecord(_))
        ));
    }

    #[test]
    fn test_upgrade_becomes_downgrade() {
        let mut index = MemoryIndex::new();
        index.add_available(
            PackageRef::new("foo", "x86_64", Evr::parse("1.0-1").unwrap(), "fedora"),
            PackageMetadata::default(),
        );

        let done = record(
            TransactionState::Done,
            vec![item(TransactionAction::Upgrade, "2.0-1", Some("1.0-1"))],
        );
        let goal = invert(&done, &index, GoalPolicy::default()).unwrap();
        assert_eq!(goal.jobs().len(), 1);
        assert_eq!(goal.jobs()[0].action, JobAction::Downgrade);
        assert_eq!(goal.jobs()[0].to_string(), "downgrade foo-1.0-1.x86_64");
    }

    #[test]
    fn test_missing_build_is_unavailable() {
        let index = MemoryIndex::new();
        let done = record(
            TransactionState::Done,
            vec![item(TransactionAction::Remove, "1.0-1", None)],
        );
        match invert(&done, &index, GoalPolicy::default()) {
            Err(Error::HistoryPackageUnavailable(nevra)) => assert_eq!(nevra, "foo-1.0-1.x86_64"),
            other => panic!("unexpected {:?}", other.map(|g| g.jobs().len())),
        }
    }
}
