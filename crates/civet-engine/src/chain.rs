//! Sequential composition of rules and the chaining strategies that
//! eliminate intermediate locations: linear paths, tree-shaped paths, the
//! post-acceleration chaining of loops with their incoming rules, and the
//! last-resort elimination of a single location.

use std::collections::{BTreeMap, BTreeSet};

use civet_ir::{compose_updates, LocationIdx, Rhs, RhsCall, Rule, RuleIdx, RuleStore, Subst};
use civet_smt::{check_guard, SatResult};

use crate::settings::AnalysisSettings;

fn update_as_subst(update: &civet_ir::Update) -> Subst {
    update.iter().map(|(v, e)| (*v, e.clone())).collect()
}

/// Composes `second` into the call of `first` at position `pos` (which
/// must target `second`'s source): the guard picks up `second`'s guard
/// under `first`'s update, the cost adds `second`'s cost under the same
/// update, and the call is replaced by `second`'s calls with composed
/// updates. No satisfiability filtering here.
fn chain_on_call(first: &Rule, pos: usize, second: &Rule) -> Rule {
    let call = &first.rhs.calls()[pos];
    debug_assert_eq!(call.target, second.lhs);
    let sub = update_as_subst(&call.update);

    let mut guard = first.guard.clone();
    for rel in &second.guard {
        let imported = rel.subst(&sub);
        if !guard.contains(&imported) {
            guard.push(imported);
        }
    }

    let cost = first.cost.clone().plus(second.cost.subst(&sub));

    let mut calls: Vec<RhsCall> = first.rhs.calls().to_vec();
    let spliced: Vec<RhsCall> = second
        .rhs
        .calls()
        .iter()
        .map(|next| RhsCall {
            target: next.target,
            update: compose_updates(&call.update, &next.update),
        })
        .collect();
    calls.splice(pos..=pos, spliced);

    Rule::new(first.lhs, guard, cost, Rhs::branch(calls))
}

/// Drops a chained candidate whose combined guard is decided
/// unsatisfiable. `Unknown` keeps the rule.
fn satisfiable(store: &RuleStore, rule: Rule) -> Option<Rule> {
    if rule.guard.iter().any(|rel| rel.is_trivially_false()) {
        return None;
    }
    match check_guard(&rule.guard, store.vars()) {
        SatResult::Unsat => None,
        _ => Some(rule),
    }
}

/// Chains `second` onto every call of `first` into `second`'s source.
/// `None` when no call matches or the combined guard is unsatisfiable.
pub fn chain_rules(store: &RuleStore, first: &Rule, second: &Rule) -> Option<Rule> {
    let positions: Vec<usize> = first
        .rhs
        .calls()
        .iter()
        .enumerate()
        .filter(|(_, call)| call.target == second.lhs)
        .map(|(pos, _)| pos)
        .collect();
    if positions.is_empty() {
        return None;
    }
    let mut result = first.clone();
    for pos in positions.into_iter().rev() {
        result = chain_on_call(&result, pos, second);
    }
    satisfiable(store, result)
}

/// Eliminates locations on linear paths: a non-initial location with
/// exactly one incoming and one outgoing rule, both linear, is contracted
/// by chaining the pair. Repeats to a fixpoint.
pub fn chain_linear_paths(store: &mut RuleStore) -> bool {
    let mut changed = false;
    loop {
        let mut round = false;
        for loc in store.locations() {
            if store.is_initial_location(loc) {
                continue;
            }
            let ins = store.rules_to(loc);
            let outs = store.rules_from(loc);
            if ins.len() != 1 || outs.len() != 1 || ins[0] == outs[0] {
                continue;
            }
            let (i, o) = (ins[0], outs[0]);
            let in_rule = store.rule(i);
            let out_rule = store.rule(o);
            if !in_rule.is_linear() || !out_rule.is_linear() || out_rule.is_simple_loop() {
                continue;
            }
            match chain_rules(store, in_rule, out_rule) {
                Some(chained) => {
                    tracing::debug!(location = store.location_name(loc), "chained linear path");
                    store.add_rule(chained);
                    store.remove_rule(i);
                    store.remove_rule(o);
                }
                None => {
                    // The composition can never fire, so the outgoing rule
                    // is unreachable through its only predecessor.
                    store.remove_rule(o);
                }
            }
            round = true;
        }
        if !round {
            return changed;
        }
        changed = true;
    }
}

/// Expands every rule entering `loc` with every rule leaving it, then
/// removes all of `loc`'s incident rules. Branching rules are expanded
/// one call at a time so that different branches may take different
/// continuations. Aborts (without touching the store) when the expansion
/// exceeds `budget` rules.
fn eliminate_location_by_chaining(store: &mut RuleStore, loc: LocationIdx, budget: usize) -> bool {
    let outs: Vec<RuleIdx> = store
        .rules_from(loc)
        .into_iter()
        .filter(|o| store.rule(*o).rhs.calls().iter().all(|c| c.target != loc))
        .collect();
    let ins: Vec<RuleIdx> = store
        .rules_to(loc)
        .into_iter()
        .filter(|i| store.rule(*i).lhs != loc)
        .collect();
    if outs.is_empty() || ins.is_empty() {
        return false;
    }

    let mut new_rules = Vec::new();
    for i in &ins {
        let mut queue = vec![store.rule(*i).clone()];
        while let Some(rule) = queue.pop() {
            match rule.rhs.calls().iter().position(|c| c.target == loc) {
                Some(pos) => {
                    for o in &outs {
                        let candidate = chain_on_call(&rule, pos, store.rule(*o));
                        if let Some(ok) = satisfiable(store, candidate) {
                            queue.push(ok);
                        }
                    }
                    if queue.len() + new_rules.len() > budget {
                        return false;
                    }
                }
                None => new_rules.push(rule),
            }
        }
    }

    for rule in new_rules {
        store.add_rule(rule);
    }
    for i in ins {
        store.remove_rule(i);
    }
    for o in store.rules_from(loc) {
        store.remove_rule(o);
    }
    true
}

/// Contracts tree-shaped paths: every non-initial location without
/// self-loops whose in/out product stays within the fan-out budget is
/// eliminated by chaining all incoming/outgoing pairs.
pub fn chain_tree_paths(store: &mut RuleStore, settings: &AnalysisSettings) -> bool {
    let mut changed = false;
    for loc in store.locations() {
        if store.is_initial_location(loc) {
            continue;
        }
        let outs = store.rules_from(loc);
        let ins = store.rules_to(loc);
        if outs.is_empty() || ins.is_empty() {
            continue;
        }
        let has_self_loop = outs
            .iter()
            .any(|o| store.rule(*o).rhs.calls().iter().any(|c| c.target == loc));
        if has_self_loop || ins.len() * outs.len() > settings.max_chain_fanout {
            continue;
        }
        if eliminate_location_by_chaining(store, loc, settings.max_chain_fanout * 8) {
            tracing::debug!(location = store.location_name(loc), "chained tree paths");
            changed = true;
        }
    }
    changed
}

/// Chains every accelerated loop with the rules entering its location
/// (other accelerated loops excepted), consuming the accelerated rules
/// and, unless `keep_incoming`, the incoming rules that chained.
pub fn chain_accelerated_rules(
    store: &mut RuleStore,
    accelerated: &BTreeSet<RuleIdx>,
    keep_incoming: bool,
) -> bool {
    let mut changed = false;
    let mut by_loc: BTreeMap<LocationIdx, Vec<RuleIdx>> = BTreeMap::new();
    for idx in accelerated {
        if store.has_rule(*idx) {
            by_loc.entry(store.rule(*idx).lhs).or_default().push(*idx);
        }
    }
    for (loc, accel_rules) in by_loc {
        let incoming: Vec<RuleIdx> = store
            .rules_to(loc)
            .into_iter()
            .filter(|i| !accelerated.contains(i))
            .collect();
        for i in incoming {
            let mut additions = Vec::new();
            for a in &accel_rules {
                if let Some(chained) = chain_rules(store, store.rule(i), store.rule(*a)) {
                    additions.push(chained);
                }
            }
            let chained_any = !additions.is_empty();
            for rule in additions {
                store.add_rule(rule);
            }
            if chained_any && !keep_incoming {
                store.remove_rule(i);
            }
            changed |= chained_any;
        }
        for a in accel_rules {
            store.remove_rule(a);
            changed = true;
        }
    }
    changed
}

/// Last-resort heuristic: eliminate the non-initial location minimizing
/// `|In|·|Out|` plus a penalty for self-loops, even where the tree
/// strategy's budget would refuse. Returns the eliminated location's name.
pub fn eliminate_a_location(
    store: &mut RuleStore,
    settings: &AnalysisSettings,
) -> Option<String> {
    let mut best: Option<(usize, LocationIdx)> = None;
    for loc in store.locations() {
        if store.is_initial_location(loc) {
            continue;
        }
        let outs = store.rules_from(loc);
        if outs.is_empty() {
            continue;
        }
        let ins: Vec<RuleIdx> = store
            .rules_to(loc)
            .into_iter()
            .filter(|i| store.rule(*i).lhs != loc)
            .collect();
        if ins.is_empty() {
            continue;
        }
        let self_loops = outs
            .iter()
            .filter(|o| store.rule(**o).rhs.calls().iter().any(|c| c.target == loc))
            .count();
        let non_self = outs.len() - self_loops;
        if non_self == 0 {
            continue;
        }
        let score = ins.len() * non_self + 10 * self_loops;
        if best.map_or(true, |(s, _)| score < s) {
            best = Some((score, loc));
        }
    }
    let (_, loc) = best?;
    let name = store.location_name(loc).to_string();
    eliminate_location_by_chaining(store, loc, settings.max_chain_fanout * 64).then(|| {
        tracing::debug!(location = name.as_str(), "eliminated location as a last resort");
        name
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use civet_expr::{Expr, Rel, VarId};
    use civet_ir::Update;

    fn setup() -> (RuleStore, Vec<LocationIdx>, VarId) {
        let mut store = RuleStore::new();
        let locs = vec![
            store.add_named_location("a"),
            store.add_named_location("b"),
            store.add_named_location("c"),
        ];
        store.set_initial_location(locs[0]);
        let x = store.vars_mut().add_fresh_variable("x");
        (store, locs, x)
    }

    #[test]
    fn chaining_composes_guard_update_and_cost() {
        let (store, locs, x) = setup();
        let mut inc = Update::new();
        inc.insert(x, Expr::var(x).plus(Expr::one()));
        let first = Rule::new_linear(
            locs[0],
            vec![Rel::gt(Expr::var(x), Expr::zero())],
            Expr::one(),
            locs[1],
            inc,
        );
        let mut dbl = Update::new();
        dbl.insert(x, Expr::int(2).times(Expr::var(x)));
        let second = Rule::new_linear(
            locs[1],
            vec![Rel::gt(Expr::var(x), Expr::one())],
            Expr::var(x),
            locs[2],
            dbl,
        );

        let chained = chain_rules(&store, &first, &second).expect("chains");
        assert_eq!(chained.lhs, locs[0]);
        assert_eq!(chained.linear_target(), Some(locs[2]));
        // guard: x > 0  and  (x+1) > 1
        assert_eq!(chained.guard.len(), 2);
        assert!(chained.guard[1]
            .lhs
            .equals_mod_arith(&Expr::var(x).plus(Expr::one())));
        // cost: 1 + (x+1)
        assert!(chained
            .cost
            .equals_mod_arith(&Expr::var(x).plus(Expr::int(2))));
        // update: x <- 2(x+1)
        let update = chained.linear_update().unwrap();
        assert!(update[&x]
            .equals_mod_arith(&Expr::int(2).times(Expr::var(x).plus(Expr::one()))));
    }

    #[test]
    fn unsatisfiable_compositions_are_rejected() {
        let (store, locs, x) = setup();
        let mut set5 = Update::new();
        set5.insert(x, Expr::int(5));
        let first = Rule::new_linear(locs[0], vec![], Expr::one(), locs[1], set5);
        let second = Rule::new_linear(
            locs[1],
            vec![Rel::lt(Expr::var(x), Expr::zero())],
            Expr::one(),
            locs[2],
            Update::new(),
        );
        assert!(chain_rules(&store, &first, &second).is_none());
    }

    #[test]
    fn linear_paths_contract_to_a_single_rule() {
        let (mut store, locs, x) = setup();
        store.add_rule(Rule::new_linear(
            locs[0],
            vec![],
            Expr::one(),
            locs[1],
            Update::new(),
        ));
        store.add_rule(Rule::new_linear(
            locs[1],
            vec![],
            Expr::var(x),
            locs[2],
            Update::new(),
        ));
        assert!(chain_linear_paths(&mut store));
        let rules = store.rule_indices();
        assert_eq!(rules.len(), 1);
        let rule = store.rule(rules[0]);
        assert_eq!(rule.lhs, locs[0]);
        assert_eq!(rule.linear_target(), Some(locs[2]));
        assert!(rule.cost.equals_mod_arith(&Expr::var(x).plus(Expr::one())));
        // Idempotent once it reports no change.
        assert!(!chain_linear_paths(&mut store));
    }

    #[test]
    fn tree_paths_expand_all_pairs_and_remove_the_location() {
        let (mut store, locs, x) = setup();
        let d = store.add_named_location("d");
        for guard in [
            vec![Rel::gt(Expr::var(x), Expr::zero())],
            vec![Rel::le(Expr::var(x), Expr::zero())],
        ] {
            store.add_rule(Rule::new_linear(
                locs[0],
                guard,
                Expr::one(),
                locs[1],
                Update::new(),
            ));
        }
        store.add_rule(Rule::new_linear(
            locs[1],
            vec![],
            Expr::one(),
            locs[2],
            Update::new(),
        ));
        store.add_rule(Rule::new_linear(
            locs[1],
            vec![],
            Expr::one(),
            d,
            Update::new(),
        ));
        assert!(chain_tree_paths(&mut store, &AnalysisSettings::default()));
        assert!(!store.has_rules_from(locs[1]));
        assert!(!store.has_rules_to(locs[1]));
        // 2 incoming × 2 outgoing
        assert_eq!(store.rules_from(locs[0]).len(), 4);
    }

    #[test]
    fn accelerated_loops_consume_their_incoming_rules() {
        let (mut store, locs, x) = setup();
        let entry = store.add_rule(Rule::new_linear(
            locs[0],
            vec![],
            Expr::one(),
            locs[1],
            Update::new(),
        ));
        let mut drained = Update::new();
        drained.insert(x, Expr::zero());
        let accel = store.add_rule(Rule::new_linear(
            locs[1],
            vec![Rel::ge(Expr::var(x), Expr::one())],
            Expr::var(x),
            locs[1],
            drained,
        ));
        let accel_set: BTreeSet<RuleIdx> = [accel].into_iter().collect();
        assert!(chain_accelerated_rules(&mut store, &accel_set, false));
        assert!(!store.has_rule(entry));
        assert!(!store.has_rule(accel));
        let remaining = store.rules_from(locs[0]);
        assert_eq!(remaining.len(), 1);
        let chained = store.rule(remaining[0]);
        assert_eq!(chained.linear_target(), Some(locs[1]));
        assert!(chained.cost.equals_mod_arith(&Expr::var(x).plus(Expr::one())));
    }

    #[test]
    fn last_resort_elimination_picks_the_cheapest_location() {
        let (mut store, locs, _) = setup();
        store.add_rule(Rule::new_linear(
            locs[0],
            vec![],
            Expr::one(),
            locs[1],
            Update::new(),
        ));
        store.add_rule(Rule::new_linear(
            locs[1],
            vec![],
            Expr::one(),
            locs[2],
            Update::new(),
        ));
        let name = eliminate_a_location(&mut store, &AnalysisSettings::default());
        assert_eq!(name.as_deref(), Some("b"));
        assert!(!store.has_rules_from(locs[1]));
    }
}
