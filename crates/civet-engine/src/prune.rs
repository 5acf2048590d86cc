//! Graph pruning: unsatisfiable initial rules, unreachable locations,
//! constant-cost leaf rules, dead rhs branches, duplicates, and dominated
//! parallel rules. Every operation reports whether it changed the store.

use std::collections::{BTreeMap, BTreeSet};

use civet_expr::{Complexity, Expr, Rel};
use civet_ir::{LocationIdx, Rhs, RuleIdx, RuleStore, VarId};
use civet_smt::{check_guard, guard_implies, Implication, SatResult};

use crate::settings::AnalysisSettings;

/// Removes initial rules whose guard the solver refutes. `Unknown`
/// answers keep the rule.
pub fn remove_unsat_initial_rules(store: &mut RuleStore) -> bool {
    let initial = store.initial_location();
    let mut changed = false;
    for idx in store.rules_from(initial) {
        let result = check_guard(&store.rule(idx).guard, store.vars());
        if result == SatResult::Unsat {
            tracing::debug!(rule = idx.0, "removing unsatisfiable initial rule");
            store.remove_rule(idx);
            changed = true;
        }
    }
    changed
}

fn reachable_locations(store: &RuleStore) -> BTreeSet<LocationIdx> {
    let mut reachable = BTreeSet::new();
    let mut queue = vec![store.initial_location()];
    while let Some(loc) = queue.pop() {
        if !reachable.insert(loc) {
            continue;
        }
        for succ in store.successor_locations(loc) {
            if !reachable.contains(&succ) {
                queue.push(succ);
            }
        }
    }
    reachable
}

/// Removes (a) rules whose source is unreachable from the initial
/// location and (b) constant-cost linear rules into locations without
/// outgoing rules. Iterates to a fixpoint; the dropped constant cost is
/// subsumed by the final result being at least `O(1)`.
pub fn remove_leafs_and_unreachable(store: &mut RuleStore) -> bool {
    let initial = store.initial_location();
    let mut changed = false;
    loop {
        let mut round = false;
        let reachable = reachable_locations(store);
        for loc in store.locations() {
            if reachable.contains(&loc) {
                continue;
            }
            for idx in store.rules_from(loc) {
                store.remove_rule(idx);
                round = true;
            }
        }
        for loc in store.locations() {
            if loc == initial || store.has_rules_from(loc) {
                continue;
            }
            for idx in store.rules_to(loc) {
                if !store.has_rule(idx) {
                    continue;
                }
                let rule = store.rule(idx);
                if rule.is_linear() && rule.cost.complexity() <= Complexity::Const {
                    store.remove_rule(idx);
                    round = true;
                }
            }
        }
        if !round {
            return changed;
        }
        changed = true;
    }
}

/// For nonlinear rules only: drops rhs branches calling into locations
/// without outgoing rules, since no further cost can accrue there. A rule
/// never loses its last branch.
pub fn remove_sink_rhss(store: &mut RuleStore) -> bool {
    let mut changed = false;
    for idx in store.rule_indices() {
        let rule = store.rule(idx);
        if rule.rhs.calls().len() < 2 {
            continue;
        }
        let mut kept: Vec<_> = rule
            .rhs
            .calls()
            .iter()
            .filter(|call| store.has_rules_from(call.target))
            .cloned()
            .collect();
        if kept.len() == rule.rhs.calls().len() {
            continue;
        }
        if kept.is_empty() {
            kept.push(rule.rhs.calls()[0].clone());
        }
        let mut new_rule = rule.clone();
        new_rule.rhs = Rhs::branch(kept);
        store.replace_rule(idx, new_rule);
        changed = true;
    }
    changed
}

type RuleKey = (
    LocationIdx,
    Vec<Rel>,
    Expr,
    Vec<(LocationIdx, Option<Vec<(VarId, Expr)>>)>,
);

fn rule_key(store: &RuleStore, idx: RuleIdx, compare_updates: bool) -> RuleKey {
    let rule = store.rule(idx);
    let mut guard: Vec<Rel> = rule.guard.iter().map(Rel::canonical).collect();
    guard.sort();
    guard.dedup();
    let rhs = rule
        .rhs
        .calls()
        .iter()
        .map(|call| {
            let update = compare_updates.then(|| {
                let mut entries: Vec<(VarId, Expr)> = call
                    .update
                    .iter()
                    .map(|(var, image)| (*var, image.canonical()))
                    .collect();
                entries.sort();
                entries
            });
            (call.target, update)
        })
        .collect();
    (rule.lhs, guard, rule.cost.canonical(), rhs)
}

/// Removes duplicates among the given rules: same source, same rhs
/// structure, same guard modulo order, identical cost, and (when
/// `compare_updates`) identical updates. Keeps the lowest index.
pub fn remove_duplicate_rules(
    store: &mut RuleStore,
    rules: &[RuleIdx],
    compare_updates: bool,
) -> bool {
    let mut seen: BTreeMap<RuleKey, RuleIdx> = BTreeMap::new();
    let mut changed = false;
    let mut ordered: Vec<RuleIdx> = rules.to_vec();
    ordered.sort();
    for idx in ordered {
        if !store.has_rule(idx) {
            continue;
        }
        let key = rule_key(store, idx, compare_updates);
        if seen.contains_key(&key) {
            store.remove_rule(idx);
            changed = true;
        } else {
            seen.insert(key, idx);
        }
    }
    changed
}

/// Prunes parallel rules between location pairs: over the `max_parallel`
/// cap the cheapest (by cost class) are dropped greedily; within the cap
/// a rule dominated by a parallel sibling — guard implied, cost class no
/// better — is dropped.
pub fn prune_parallel_rules(store: &mut RuleStore, settings: &AnalysisSettings) -> bool {
    let mut changed = false;
    for from in store.locations() {
        for to in store.successor_locations(from) {
            let parallel: Vec<RuleIdx> = store
                .rules_between(from, to)
                .into_iter()
                .filter(|idx| store.rule(*idx).is_linear())
                .collect();
            if parallel.len() < 2 {
                continue;
            }

            let mut ranked = parallel.clone();
            if ranked.len() > settings.max_parallel {
                // Highest cost class first; ties keep older rules.
                ranked.sort_by_key(|idx| {
                    (std::cmp::Reverse(store.rule(*idx).cost.complexity()), *idx)
                });
                for idx in ranked.split_off(settings.max_parallel) {
                    store.remove_rule(idx);
                    changed = true;
                }
                ranked.sort();
            }

            for &a in &ranked {
                if !store.has_rule(a) {
                    continue;
                }
                for &b in &ranked {
                    if a == b || !store.has_rule(b) || !store.has_rule(a) {
                        continue;
                    }
                    if dominates(store, a, b) {
                        store.remove_rule(b);
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}

/// `a` dominates `b` iff `a`'s cost class is at least `b`'s and `b`'s
/// guard implies every constraint of `a`'s guard.
fn dominates(store: &RuleStore, a: RuleIdx, b: RuleIdx) -> bool {
    let rule_a = store.rule(a);
    let rule_b = store.rule(b);
    if rule_a.cost.complexity() < rule_b.cost.complexity() {
        return false;
    }
    rule_a
        .guard
        .iter()
        .all(|rel| guard_implies(&rule_b.guard, rel, store.vars()) == Implication::Holds)
}
