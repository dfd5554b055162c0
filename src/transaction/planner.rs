// src/transaction/planner.rs

//! Transaction ordering
//!
//! Turns the unordered action set from the solver into a [`Transaction`] with
//! a total, dependency-safe execution order. Nodes live in an arena indexed by
//! position; edges `a -> b` mean "apply a before b". Edges come from:
//!
//! - obsoletes/replacements: the replacing install precedes the removal
//! - package ordering hints (`install_before`, `remove_after`)
//! - requires: providers are installed before their dependents, and
//!   dependents are removed before what they depend on
//!
//! Kahn's algorithm picks among ready nodes by `(name, arch, action priority)`.
//! A cycle is broken by dropping the cycle edge whose source has the
//! lexicographically largest name, reported as an `ORDERING_CYCLE` warning.

use super::{Transaction, TransactionPackage};
use crate::index::{CandidateAction, PackageIndex};
use crate::package::{NameArch, PackageRef};
use crate::problem::{Problem, ProblemKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Ordered transaction plus non-blocking warnings
#[derive(Debug)]
pub struct OrderedPlan {
    pub transaction: Transaction,
    pub warnings: Vec<Problem>,
}

/// Computes execution order for solved action sets
pub struct TransactionPlanner<'a> {
    index: &'a dyn PackageIndex,
}

/// Arena graph over the actions
struct OrderGraph {
    nodes: Vec<CandidateAction>,
    edges: Vec<BTreeSet<usize>>,
}

impl OrderGraph {
    fn new(mut nodes: Vec<CandidateAction>) -> Self {
        // Node index order is the tie-break order
        nodes.sort_by(|a, b| {
            a.package
                .name()
                .cmp(b.package.name())
                .then_with(|| a.package.arch().cmp(b.package.arch()))
                .then_with(|| a.action.priority().cmp(&b.action.priority()))
                .then_with(|| a.package.evr().cmp(b.package.evr()))
        });
        let edges = vec![BTreeSet::new(); nodes.len()];
        Self { nodes, edges }
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if from != to {
            self.edges[from].insert(to);
        }
    }

    /// Kahn's algorithm; returns the order and any nodes left on cycles
    fn sort(&self) -> (Vec<usize>, BTreeSet<usize>) {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for targets in &self.edges {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&n| in_degree[n] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &next in &self.edges[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let leftover = (0..self.nodes.len())
            .filter(|n| !placed.contains(n))
            .collect();
        (order, leftover)
    }

    /// Find one cycle among nodes Kahn's algorithm could not place
    ///
    /// Every leftover node has a leftover predecessor, so walking smallest
    /// predecessors must revisit a node. Returned in edge order, starting
    /// from the smallest node index.
    fn find_cycle(&self, leftover: &BTreeSet<usize>) -> Vec<usize> {
        let mut predecessors: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (from, targets) in self.edges.iter().enumerate() {
            if !leftover.contains(&from) {
                continue;
            }
            for &to in targets {
                if leftover.contains(&to) {
                    predecessors.entry(to).or_default().insert(from);
                }
            }
        }

        let Some(&start) = leftover.first() else {
            return Vec::new();
        };
        let mut walk = vec![start];
        let mut seen = BTreeMap::from([(start, 0usize)]);
        let mut current = start;
        loop {
            let Some(&prev) = predecessors.get(&current).and_then(|p| p.first()) else {
                return Vec::new();
            };
            if let Some(&pos) = seen.get(&prev) {
                let mut cycle: Vec<usize> = walk[pos..].to_vec();
                cycle.reverse();
                if let Some(min_pos) = cycle
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, n)| **n)
                    .map(|(i, _)| i)
                {
                    cycle.rotate_left(min_pos);
                }
                return cycle;
            }
            seen.insert(prev, walk.len());
            walk.push(prev);
            current = prev;
        }
    }

    /// Cycle edge whose source has the largest (name, arch, index)
    fn edge_to_break(&self, cycle: &[usize]) -> Option<(usize, usize)> {
        (0..cycle.len())
            .map(|i| (cycle[i], cycle[(i + 1) % cycle.len()]))
            .max_by(|(a, _), (b, _)| {
                let pa = &self.nodes[*a].package;
                let pb = &self.nodes[*b].package;
                pa.name()
                    .cmp(pb.name())
                    .then_with(|| pa.arch().cmp(pb.arch()))
                    .then_with(|| a.cmp(b))
            })
    }
}

impl<'a> TransactionPlanner<'a> {
    pub fn new(index: &'a dyn PackageIndex) -> Self {
        Self { index }
    }

    /// Order an action set into a transaction
    ///
    /// Fails with a `CONFLICTS` problem if two actions touch the same
    /// (name, arch); ordering cycles never fail the plan.
    pub fn order(&self, actions: Vec<CandidateAction>) -> Result<OrderedPlan, Problem> {
        check_exclusive(&actions)?;

        let mut graph = OrderGraph::new(actions);
        self.add_edges(&mut graph);

        let mut warnings = Vec::new();
        let order = loop {
            let (order, leftover) = graph.sort();
            if leftover.is_empty() {
                break order;
            }

            let cycle = graph.find_cycle(&leftover);
            let Some((from, to)) = graph.edge_to_break(&cycle) else {
                // Unreachable for a well-formed graph; fall back to index order
                break (0..graph.nodes.len()).collect();
            };

            let members: Vec<PackageRef> = cycle
                .iter()
                .map(|&n| graph.nodes[n].package.clone())
                .collect();
            let path = members
                .iter()
                .chain(members.first())
                .map(|p| p.name().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            let message = format!(
                "ordering cycle {}; ignoring {} -> {}",
                path,
                graph.nodes[from].package.name(),
                graph.nodes[to].package.name()
            );
            warn!("{}", message);
            warnings.push(Problem::new(ProblemKind::OrderingCycle, members, message));

            graph.edges[from].remove(&to);
        };

        let items = order
            .into_iter()
            .enumerate()
            .map(|(order_index, node)| {
                let action = &graph.nodes[node];
                TransactionPackage {
                    package: action.package.clone(),
                    action: action.action,
                    reason: action.reason,
                    order_index,
                    replaces: action.replaces.clone(),
                    replaced_by: action.replaced_by.clone(),
                }
            })
            .collect();

        let transaction = Transaction::new(items);
        debug!(
            "Planned transaction {} with {} items",
            transaction.id(),
            transaction.len()
        );
        Ok(OrderedPlan {
            transaction,
            warnings,
        })
    }

    fn add_edges(&self, graph: &mut OrderGraph) {
        let count = graph.nodes.len();
        let mut edges = Vec::new();

        for a in 0..count {
            let node = &graph.nodes[a];
            let meta = self.index.metadata(&node.package);

            // (a) replacing install before the removal it causes
            if node.action.is_removal()
                && let Some(ref by) = node.replaced_by
            {
                for b in 0..count {
                    let other = &graph.nodes[b];
                    if other.action.is_inbound() && &other.package == by {
                        edges.push((b, a));
                    }
                }
            }

            let Some(meta) = meta else {
                continue;
            };

            for b in 0..count {
                if a == b {
                    continue;
                }
                let other = &graph.nodes[b];

                // (b) declared ordering hints
                if node.action.is_inbound()
                    && other.action.is_inbound()
                    && meta.hints.install_before.iter().any(|n| n == other.package.name())
                {
                    edges.push((a, b));
                }
                if node.action.is_removal()
                    && other.action.is_removal()
                    && meta.hints.remove_after.iter().any(|n| n == other.package.name())
                {
                    edges.push((b, a));
                }

                // (d) requires: provider in first, dependent out first
                let depends = meta.requires.iter().any(|req| {
                    match self.index.metadata(&other.package) {
                        Some(other_meta) => other_meta.provides_match(&other.package, req),
                        None => req.matches(other.package.name(), Some(other.package.evr())),
                    }
                });
                if depends {
                    if node.action.is_inbound() && other.action.is_inbound() {
                        edges.push((b, a));
                    } else if node.action.is_removal() && other.action.is_removal() {
                        edges.push((a, b));
                    }
                }
            }
        }

        for (from, to) in edges {
            graph.add_edge(from, to);
        }
    }
}

/// Reject action sets that touch one (name, arch) more than once
fn check_exclusive(actions: &[CandidateAction]) -> Result<(), Problem> {
    let mut seen: BTreeMap<NameArch, &CandidateAction> = BTreeMap::new();
    for action in actions {
        if let Some(first) = seen.insert(action.package.name_arch(), action) {
            return Err(Problem::new(
                ProblemKind::Conflicts,
                vec![first.package.clone(), action.package.clone()],
                format!(
                    "conflicting actions on {}: {} {} and {} {}",
                    action.package.name_arch(),
                    first.action,
                    first.package,
                    action.action,
                    action.package
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::package::{OrderingHints, PackageMetadata, Requirement};
    use crate::transaction::{Reason, TransactionAction};
    use crate::version::Evr;

    fn pkg(name: &str) -> PackageRef {
        PackageRef::new(name, "x86_64", Evr::parse("1.0-1").unwrap(), "fedora")
    }

    fn action(name: &str, action: TransactionAction) -> CandidateAction {
        CandidateAction::new(pkg(name), action, Reason::User)
    }

    fn names(plan: &OrderedPlan) -> Vec<&str> {
        plan.transaction
            .items()
            .iter()
            .map(|item| item.package.name())
            .collect()
    }

    #[test]
    fn test_tie_break_by_name_then_priority() {
        let index = MemoryIndex::new();
        let plan = TransactionPlanner::new(&index)
            .order(vec![
                action("zeta", TransactionAction::Install),
                action("alpha", TransactionAction::Remove),
                action("mid", TransactionAction::Upgrade),
            ])
            .unwrap();
        assert_eq!(names(&plan), vec!["alpha", "mid", "zeta"]);
        let indexes: Vec<_> = plan.transaction.items().iter().map(|i| i.order_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_obsoleting_install_comes_first() {
        let index = MemoryIndex::new();
        let mut obsolete = action("aaa-old", TransactionAction::Obsolete);
        obsolete.replaced_by = Some(pkg("zzz-new"));

        let plan = TransactionPlanner::new(&index)
            .order(vec![obsolete, action("zzz-new", TransactionAction::Install)])
            .unwrap();
        assert_eq!(names(&plan), vec!["zzz-new", "aaa-old"]);
    }

    #[test]
    fn test_requires_order_installs_and_removals() {
        let mut index = MemoryIndex::new();
        let needs_lib = PackageMetadata {
            requires: vec![Requirement::any("zlib")],
            ..Default::default()
        };
        index.add_available(pkg("app"), needs_lib.clone());
        index.add_available(pkg("zlib"), PackageMetadata::default());

        let plan = TransactionPlanner::new(&index)
            .order(vec![
                action("app", TransactionAction::Install),
                action("zlib", TransactionAction::Install),
            ])
            .unwrap();
        assert_eq!(names(&plan), vec!["zlib", "app"]);

        let mut installed = MemoryIndex::new();
        installed.add_installed(pkg("app"), needs_lib);
        installed.add_installed(pkg("zlib"), PackageMetadata::default());
        let plan = TransactionPlanner::new(&installed)
            .order(vec![
                action("zlib", TransactionAction::Remove),
                action("app", TransactionAction::Remove),
            ])
            .unwrap();
        assert_eq!(names(&plan), vec!["app", "zlib"]);
    }

    #[test]
    fn test_cycle_broken_at_largest_source_name() {
        let mut index = MemoryIndex::new();
        let before = |name: &str| PackageMetadata {
            hints: OrderingHints {
                install_before: vec![name.to_string()],
                remove_after: Vec::new(),
            },
            ..Default::default()
        };
        // a -> b -> c -> a
        index.add_available(pkg("a"), before("b"));
        index.add_available(pkg("b"), before("c"));
        index.add_available(pkg("c"), before("a"));

        let actions = vec![
            action("c", TransactionAction::Install),
            action("a", TransactionAction::Install),
            action("b", TransactionAction::Install),
        ];
        let plan = TransactionPlanner::new(&index).order(actions.clone()).unwrap();

        // Dropping c -> a leaves a -> b -> c
        assert_eq!(names(&plan), vec!["a", "b", "c"]);
        assert_eq!(plan.warnings.len(), 1);
        let warning = &plan.warnings[0];
        assert_eq!(warning.kind, ProblemKind::OrderingCycle);
        let members: Vec<_> = warning.implicated.iter().map(|p| p.name()).collect();
        assert_eq!(members, vec!["a", "b", "c"]);
        assert!(warning.message.contains("ignoring c -> a"));

        // Same input, same plan
        let again = TransactionPlanner::new(&index).order(actions).unwrap();
        assert_eq!(names(&again), names(&plan));
        assert_eq!(again.warnings, plan.warnings);
    }

    #[test]
    fn test_same_slot_twice_is_conflict() {
        let index = MemoryIndex::new();
        let problem = TransactionPlanner::new(&index)
            .order(vec![
                action("foo", TransactionAction::Install),
                action("foo", TransactionAction::Remove),
            ])
            .unwrap_err();
        assert_eq!(problem.kind, ProblemKind::Conflicts);
        assert_eq!(problem.implicated.len(), 2);
    }
}
