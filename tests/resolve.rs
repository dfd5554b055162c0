// tests/resolve.rs

//! Goal resolution: scenarios, determinism and planner ordering.

mod common;

use common::{BASE_SYSTEM, SCENARIO_A, solved, summary, universe};
use goalpost::{
    Goal, GoalPolicy, Job, JobAction, JobFlags, PackageFilter, PackageIndex, ProblemKind,
    ProblemReporter, Reason, Resolution, TransactionAction,
};
use std::collections::BTreeSet;

#[test]
fn test_scenario_a_dependency_upgrade() {
    let index = universe(SCENARIO_A);
    let mut goal = Goal::new(&index);
    goal.install("bar");

    let transaction = solved(goal.resolve().unwrap());
    assert_eq!(
        summary(&transaction),
        vec!["UPGRADE foo-2.0-1.x86_64", "INSTALL bar-1.0-1.x86_64"]
    );

    let foo = transaction.find("foo").unwrap();
    assert_eq!(foo.reason, Reason::Dependency);
    assert_eq!(foo.replaces.as_ref().unwrap().evr().version, "1.0");
    assert!(foo.order_index < transaction.find("bar").unwrap().order_index);
    assert_eq!(transaction.find("bar").unwrap().reason, Reason::User);
}

#[test]
fn test_scenario_b_protected_package() {
    let index = universe(BASE_SYSTEM);
    let policy = GoalPolicy::default().protect("glibc");
    let mut goal = Goal::with_policy(&index, policy);
    goal.remove("glibc");

    let resolution = goal.resolve().unwrap();
    assert!(resolution.transaction().is_none());
    let problems = resolution.problems();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].kind, ProblemKind::ProtectedPackage);
    assert_eq!(problems[0].implicated[0].name(), "glibc");

    let report = ProblemReporter::format(problems);
    assert!(report.starts_with("Problem 1 [PROTECTED_PACKAGE]"));
}

#[test]
fn test_resolution_is_deterministic() {
    let index = universe(BASE_SYSTEM);
    let mut goal = Goal::new(&index);
    goal.install("iproute").install("postfix").remove("bash");

    let first = solved(goal.resolve().unwrap());
    let second = solved(goal.resolve().unwrap());
    assert_eq!(first.items(), second.items());
    assert_eq!(format!("{:?}", first.items()), format!("{:?}", second.items()));

    // A fresh goal over the same snapshot agrees too
    let mut again = Goal::new(&index);
    again.install("iproute").install("postfix").remove("bash");
    assert_eq!(summary(&solved(again.resolve().unwrap())), summary(&first));
}

#[test]
fn test_no_two_items_share_a_slot() {
    let index = universe(BASE_SYSTEM);
    let goals: Vec<Vec<Job>> = vec![
        vec![Job::pattern(JobAction::Install, "iproute")],
        vec![
            Job::pattern(JobAction::Install, "postfix"),
            Job::pattern(JobAction::Remove, "net-tools"),
        ],
        vec![Job::pattern(JobAction::Remove, "bash")],
    ];

    for jobs in goals {
        let mut goal = Goal::new(&index);
        for job in jobs {
            goal.add_job(job);
        }
        let transaction = solved(goal.resolve().unwrap());
        let mut slots = BTreeSet::new();
        for item in transaction.items() {
            assert!(slots.insert(item.name_arch()), "{} appears twice", item.name_arch());
        }
    }
}

#[test]
fn test_obsoleting_install_precedes_removal() {
    let index = universe(BASE_SYSTEM);
    let mut goal = Goal::new(&index);
    goal.install("iproute");

    let transaction = solved(goal.resolve().unwrap());
    let iproute = transaction.find("iproute").unwrap();
    let net_tools = transaction.find("net-tools").unwrap();
    assert_eq!(net_tools.action, TransactionAction::Obsolete);
    assert_eq!(net_tools.replaced_by.as_ref().unwrap().name(), "iproute");
    assert!(iproute.order_index < net_tools.order_index);
}

#[test]
fn test_install_of_installed_version_is_idempotent() {
    let index = universe(BASE_SYSTEM);
    let mut goal = Goal::new(&index);
    goal.install("glibc");

    match goal.resolve().unwrap() {
        Resolution::Problems(problems) => {
            assert_eq!(problems.len(), 1);
            assert_eq!(problems[0].kind, ProblemKind::AlreadyInstalled);
            assert!(!problems[0].is_blocking());
        }
        Resolution::Solved { transaction, .. } => {
            panic!("unexpected transaction {:?}", summary(&transaction))
        }
    }

    // Alongside real work the advisory rides with the transaction
    let mut goal = Goal::new(&index);
    goal.install("glibc").install("postfix");
    match goal.resolve().unwrap() {
        Resolution::Solved {
            transaction,
            advisories,
        } => {
            assert_eq!(summary(&transaction), vec!["INSTALL postfix-3.8-1.x86_64"]);
            assert_eq!(advisories[0].kind, ProblemKind::AlreadyInstalled);
        }
        Resolution::Problems(problems) => panic!("unexpected problems {:?}", problems),
    }
}

#[test]
fn test_conflicting_jobs_fail_whole_goal() {
    let index = universe(BASE_SYSTEM);
    let mut goal = Goal::new(&index);
    goal.install("postfix").install("sendmail").install("iproute");

    let resolution = goal.resolve().unwrap();
    assert!(resolution.transaction().is_none());
    assert_eq!(resolution.problems().len(), 1);
    let problem = &resolution.problems()[0];
    assert_eq!(problem.kind, ProblemKind::Conflicts);
    let names: Vec<&str> = problem.implicated.iter().map(|p| p.name()).collect();
    assert!(names.contains(&"postfix") && names.contains(&"sendmail"));
}

#[test]
fn test_problems_are_collected_across_jobs() {
    let index = universe(BASE_SYSTEM);
    let mut goal = Goal::new(&index);
    goal.install("no-such-thing").remove("not-installed");

    let resolution = goal.resolve().unwrap();
    let kinds: Vec<ProblemKind> = resolution.problems().iter().map(|p| p.kind).collect();
    assert_eq!(kinds, vec![ProblemKind::NotFound, ProblemKind::NotFound]);
}

#[test]
fn test_weak_job_does_not_block() {
    let index = universe(BASE_SYSTEM);
    let mut goal = Goal::new(&index);
    goal.add_job(Job::pattern(JobAction::Install, "no-such-thing").with_flags(JobFlags {
        weak: true,
        ..Default::default()
    }));
    goal.install("postfix");

    let transaction = solved(goal.resolve().unwrap());
    assert_eq!(summary(&transaction), vec!["INSTALL postfix-3.8-1.x86_64"]);
}

#[test]
fn test_ordering_cycle_is_advisory() {
    let index = universe(
        r#"
[[available]]
nevra = "alpha-1.0-1.noarch"
repo = "fedora"
install_before = ["beta"]

[[available]]
nevra = "beta-1.0-1.noarch"
repo = "fedora"
install_before = ["alpha"]
"#,
    );
    let mut goal = Goal::new(&index);
    goal.install("alpha").install("beta");

    match goal.resolve().unwrap() {
        Resolution::Solved {
            transaction,
            advisories,
        } => {
            assert_eq!(
                summary(&transaction),
                vec!["INSTALL alpha-1.0-1.noarch", "INSTALL beta-1.0-1.noarch"]
            );
            assert_eq!(advisories.len(), 1);
            assert_eq!(advisories[0].kind, ProblemKind::OrderingCycle);
            assert!(advisories[0].message.ends_with("ignoring beta -> alpha"));
        }
        Resolution::Problems(problems) => panic!("unexpected problems {:?}", problems),
    }
}

#[test]
fn test_allow_erasing_resolves_conflict() {
    let mut index = universe(BASE_SYSTEM);
    let sendmail = index
        .query(&PackageFilter::pattern("sendmail").available())
        .pop()
        .unwrap();
    index.add_installed(sendmail, Default::default());

    let mut goal = Goal::new(&index);
    goal.install("postfix");
    assert_eq!(
        goal.resolve().unwrap().problems()[0].kind,
        ProblemKind::Conflicts
    );

    goal.policy_mut().allow_erasing = true;
    let transaction = solved(goal.resolve().unwrap());
    assert_eq!(
        transaction.find("sendmail").unwrap().action,
        TransactionAction::Remove
    );
}

#[test]
fn test_every_conflicting_package_is_reported() {
    let index = universe(
        r#"
[[installed]]
nevra = "sendmail-8.17-1.x86_64"
repo = "fedora"

[[installed]]
nevra = "exim-4.97-1.x86_64"
repo = "fedora"

[[available]]
nevra = "postfix-3.8-1.x86_64"
repo = "fedora"
conflicts = ["sendmail", "exim"]
"#,
    );
    let mut goal = Goal::new(&index);
    goal.install("postfix");

    let resolution = goal.resolve().unwrap();
    assert!(resolution.transaction().is_none());
    let mut blocked: Vec<&str> = resolution
        .problems()
        .iter()
        .filter(|p| p.kind == ProblemKind::Conflicts)
        .map(|p| p.implicated[1].name())
        .collect();
    blocked.sort();
    assert_eq!(blocked, vec!["exim", "sendmail"]);
}

#[test]
fn test_protected_removal_reported_beside_other_failures() {
    let index = universe(
        r#"
[[installed]]
nevra = "glibc-2.38-1.x86_64"
repo = "fedora"

[[installed]]
nevra = "bash-5.2-1.x86_64"
repo = "fedora"
requires = ["glibc"]

[[available]]
nevra = "app-1.0-1.x86_64"
repo = "fedora"
requires = ["libmissing.so.1"]
"#,
    );
    let mut goal = Goal::with_policy(&index, GoalPolicy::default().protect("glibc"));
    goal.remove("glibc").install("app");

    let resolution = goal.resolve().unwrap();
    let kinds: Vec<ProblemKind> = resolution.problems().iter().map(|p| p.kind).collect();
    assert!(kinds.contains(&ProblemKind::BrokenDependency), "{:?}", kinds);
    assert!(kinds.contains(&ProblemKind::ProtectedPackage), "{:?}", kinds);

    let protected = resolution
        .problems()
        .iter()
        .find(|p| p.kind == ProblemKind::ProtectedPackage)
        .unwrap();
    assert!(protected.message.ends_with("glibc (job 1: remove glibc)"));
}

#[test]
fn test_clean_deps_only_sweeps_its_own_job() {
    let index = universe(
        r#"
[[installed]]
nevra = "a-1.0-1.x86_64"
repo = "fedora"
requires = ["liba"]

[[installed]]
nevra = "liba-1.0-1.x86_64"
repo = "fedora"
reason = "DEPENDENCY"

[[installed]]
nevra = "b-1.0-1.x86_64"
repo = "fedora"
requires = ["libb"]

[[installed]]
nevra = "libb-1.0-1.x86_64"
repo = "fedora"
reason = "DEPENDENCY"
"#,
    );
    let mut goal = Goal::new(&index);
    goal.remove("a");
    goal.add_job(Job::pattern(JobAction::Remove, "b").with_flags(JobFlags {
        clean_deps: true,
        ..Default::default()
    }));

    let transaction = solved(goal.resolve().unwrap());
    let items: Vec<(&str, Reason)> = transaction
        .items()
        .iter()
        .map(|item| (item.package.name(), item.reason))
        .collect();
    assert_eq!(
        items,
        vec![("a", Reason::User), ("b", Reason::User), ("libb", Reason::Clean)]
    );
    assert!(transaction.find("liba").is_none());
}

#[test]
fn test_best_upgrade_fails_when_newest_is_uninstallable() {
    let index = universe(
        r#"
[[installed]]
nevra = "app-1.0-1.x86_64"
repo = "fedora"

[[available]]
nevra = "app-1.5-1.x86_64"
repo = "updates"

[[available]]
nevra = "app-2.0-1.x86_64"
repo = "updates"
requires = ["libnew"]
"#,
    );
    let mut goal = Goal::new(&index);
    goal.upgrade("app");
    let transaction = solved(goal.resolve().unwrap());
    assert_eq!(summary(&transaction), vec!["UPGRADE app-1.5-1.x86_64"]);

    goal.policy_mut().best = true;
    let resolution = goal.resolve().unwrap();
    assert!(resolution.transaction().is_none());
    let problem = &resolution.problems()[0];
    assert_eq!(problem.kind, ProblemKind::BrokenDependency);
    assert!(problem.message.contains("libnew"), "{}", problem.message);
}
