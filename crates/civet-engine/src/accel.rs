//! Loop acceleration: replaces a simple loop by a closed-form rule whose
//! update and cost stand for `m` iterations, where `m` is the loop's
//! metering function. Per-loop failures (no metering function, unsolved
//! recurrence, nonlinear arithmetic) keep the original loop and are never
//! fatal.

use std::collections::BTreeSet;

use civet_expr::{recurrence, Expr, Rel, Subst, VarId};
use civet_ir::{Rule, RuleIdx, RuleStore, Update, VariableSet};

use crate::meter::{find_instantiations, find_metering_function, MeterOutcome};
use crate::preprocess::simplify_rule;
use crate::settings::AnalysisSettings;
use crate::timeout::Timeouts;

enum LoopAcceleration {
    Accelerated(Rule),
    /// The template search failed; instantiation heuristics may help.
    NoMetering,
    /// Acceleration is off the table for this variant.
    Failed,
}

/// Topological order of updated variables by "depends on". Cycles are
/// broken by equating the cyclic variables in the guard of the
/// accelerated rule (never on the original store) and rewriting the
/// update accordingly.
fn dependency_order(update: &mut Update, added_guard: &mut Vec<Rel>) -> Vec<VarId> {
    let mut ordered = Vec::new();
    let mut done: BTreeSet<VarId> = BTreeSet::new();
    while ordered.len() < update.len() {
        let mut progressed = false;
        let keys: Vec<VarId> = update.keys().copied().collect();
        for var in keys {
            if done.contains(&var) {
                continue;
            }
            let blocked = update[&var]
                .vars()
                .into_iter()
                .any(|w| w != var && update.contains_key(&w) && !done.contains(&w));
            if !blocked {
                done.insert(var);
                ordered.push(var);
                progressed = true;
            }
        }
        if progressed {
            continue;
        }
        let unresolved: Vec<VarId> = update
            .keys()
            .copied()
            .filter(|v| !done.contains(v))
            .collect();
        let target = unresolved[0];
        let mut map = Subst::new();
        for other in &unresolved[1..] {
            added_guard.push(Rel::eq(Expr::var(target), Expr::var(*other)));
            map.insert(*other, Expr::var(target));
        }
        for (_, image) in update.iter_mut() {
            *image = image.subst(&map);
        }
    }
    ordered
}

/// Accelerates one simple-loop variant. The rule must have a single rhs
/// call back to its source.
fn accelerate_loop(
    vars: &mut VariableSet,
    rule: &Rule,
    settings: &AnalysisSettings,
    smt_dumps: &mut Vec<String>,
) -> LoopAcceleration {
    let update = rule.rhs.calls()[0].update.clone();
    let outcome =
        find_metering_function(vars, &rule.guard, &[update.clone()], settings, smt_dumps);
    let (meter, integral_constraint) = match outcome {
        MeterOutcome::Metered {
            meter,
            integral_constraint,
        } => (meter, integral_constraint),
        MeterOutcome::NoMetering => return LoopAcceleration::NoMetering,
        // A loop with no limiting constraint has no finite iteration
        // bound; there is nothing a closed form could witness.
        MeterOutcome::Unbounded | MeterOutcome::Nonlinear => return LoopAcceleration::Failed,
    };

    let mut work = update.clone();
    let mut added_guard = Vec::new();
    let order = dependency_order(&mut work, &mut added_guard);

    let n = vars.add_fresh_temporary_variable("n");
    let mut known_pre = Subst::new();
    let mut new_update = Update::new();
    for var in order {
        let todo = work[&var].subst(&known_pre);
        let init = todo.subst_var(n, &Expr::one());
        let Some(closed) = recurrence::iterated_update(&todo, var, n, &init) else {
            return LoopAcceleration::Failed;
        };
        known_pre.insert(
            var,
            closed.subst_var(n, &Expr::var(n).minus(Expr::one())),
        );
        new_update.insert(var, closed.subst_var(n, &meter));
    }

    let cost_step = rule.cost.subst(&known_pre);
    let Some(closed_cost) = recurrence::iterated_cost(&cost_step, n) else {
        return LoopAcceleration::Failed;
    };
    let new_cost = closed_cost.subst_var(n, &meter);

    let mut guard = rule.guard.clone();
    guard.extend(added_guard);
    guard.extend(integral_constraint);
    guard.push(Rel::ge(meter, Expr::one()));

    LoopAcceleration::Accelerated(Rule::new_linear(
        rule.lhs,
        guard,
        new_cost,
        rule.lhs,
        new_update,
    ))
}

/// Tries to accelerate every simple loop at `loc`, replacing successes
/// and recording the fresh indices in `accelerated`. When the template
/// search fails, bounded instantiation of temporaries is attempted and
/// may yield several accelerated variants of the same loop.
pub fn accelerate_simple_loops(
    store: &mut RuleStore,
    loc: civet_ir::LocationIdx,
    settings: &AnalysisSettings,
    timeouts: &Timeouts,
    accelerated: &mut BTreeSet<RuleIdx>,
    smt_dumps: &mut Vec<String>,
) -> bool {
    let mut changed = false;
    for idx in store.rules_between(loc, loc) {
        if timeouts.soft() {
            return changed;
        }
        if !store.has_rule(idx) || !store.rule(idx).is_simple_loop() {
            continue;
        }
        let mut rule = store.rule(idx).clone();
        simplify_rule(store.vars(), &mut rule);

        match accelerate_loop(store.vars_mut(), &rule, settings, smt_dumps) {
            LoopAcceleration::Accelerated(accel) => {
                let new_idx = store.add_rule(accel);
                accelerated.insert(new_idx);
                store.remove_rule(idx);
                tracing::debug!(rule = idx.0, accelerated = new_idx.0, "accelerated loop");
                changed = true;
            }
            LoopAcceleration::NoMetering => {
                let combos = find_instantiations(
                    store.vars(),
                    &rule.guard,
                    settings.freevar_instantiate_maxbounds,
                    24,
                );
                let mut variants = Vec::new();
                for sub in combos {
                    if timeouts.soft() {
                        break;
                    }
                    let variant = rule.subst(&sub);
                    if let LoopAcceleration::Accelerated(accel) =
                        accelerate_loop(store.vars_mut(), &variant, settings, smt_dumps)
                    {
                        variants.push(accel);
                    }
                }
                if !variants.is_empty() {
                    for accel in variants {
                        let new_idx = store.add_rule(accel);
                        accelerated.insert(new_idx);
                    }
                    store.remove_rule(idx);
                    changed = true;
                }
            }
            LoopAcceleration::Failed => {}
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use civet_expr::Complexity;
    use civet_ir::LocationIdx;

    fn loop_store() -> (RuleStore, LocationIdx, VarId) {
        let mut store = RuleStore::new();
        let l = store.add_named_location("l");
        store.set_initial_location(l);
        let x = store.vars_mut().add_fresh_variable("x");
        (store, l, x)
    }

    fn accelerate_all(store: &mut RuleStore, loc: LocationIdx) -> BTreeSet<RuleIdx> {
        let mut accelerated = BTreeSet::new();
        let mut dumps = Vec::new();
        accelerate_simple_loops(
            store,
            loc,
            &AnalysisSettings::default(),
            &Timeouts::unlimited(),
            &mut accelerated,
            &mut dumps,
        );
        accelerated
    }

    #[test]
    fn counting_loop_accelerates_to_a_linear_cost() {
        let (mut store, l, x) = loop_store();
        let mut update = Update::new();
        update.insert(x, Expr::var(x).minus(Expr::one()));
        let original = store.add_rule(Rule::new_linear(
            l,
            vec![Rel::gt(Expr::var(x), Expr::zero())],
            Expr::one(),
            l,
            update,
        ));

        let accelerated = accelerate_all(&mut store, l);
        assert_eq!(accelerated.len(), 1);
        assert!(!store.has_rule(original));

        let accel = store.rule(*accelerated.first().unwrap());
        assert!(accel.is_simple_loop());
        assert_eq!(accel.cost.complexity(), Complexity::Poly(1));
        // The guard gained the m >= 1 constraint.
        assert!(accel.guard.len() > 1);
        // The update subtracts exactly the iteration count the cost pays
        // for: x' + cost = x, whichever metering function was found.
        let sum = accel.linear_update().unwrap()[&x]
            .clone()
            .plus(accel.cost.clone());
        assert!(sum.equals_mod_arith(&Expr::var(x)));
    }

    #[test]
    fn doubling_loop_is_left_alone() {
        let (mut store, l, x) = loop_store();
        let mut update = Update::new();
        update.insert(x, Expr::int(2).times(Expr::var(x)));
        let original = store.add_rule(Rule::new_linear(
            l,
            vec![Rel::gt(Expr::var(x), Expr::zero())],
            Expr::one(),
            l,
            update,
        ));
        let accelerated = accelerate_all(&mut store, l);
        assert!(accelerated.is_empty());
        assert!(store.has_rule(original));
    }

    #[test]
    fn coupled_updates_solve_in_dependency_order() {
        // y counts down and x accumulates y: quadratic total growth.
        let (mut store, l, x) = loop_store();
        let y = store.vars_mut().add_fresh_variable("y");
        let mut update = Update::new();
        update.insert(x, Expr::var(x).plus(Expr::var(y)));
        update.insert(y, Expr::var(y).minus(Expr::one()));
        store.add_rule(Rule::new_linear(
            l,
            vec![Rel::gt(Expr::var(y), Expr::zero())],
            Expr::one(),
            l,
            update,
        ));
        let accelerated = accelerate_all(&mut store, l);
        assert_eq!(accelerated.len(), 1);
        let accel = store.rule(*accelerated.first().unwrap());
        let new_x = &accel.linear_update().unwrap()[&x];
        assert_eq!(new_x.as_poly().unwrap().degree_in(y), 2);
    }

    #[test]
    fn cyclic_updates_add_equalities_instead_of_failing() {
        let mut update = Update::new();
        update.insert(VarId(0), Expr::var(VarId(1)));
        update.insert(VarId(1), Expr::var(VarId(0)));
        let mut added = Vec::new();
        let order = dependency_order(&mut update, &mut added);
        assert_eq!(order.len(), 2);
        assert_eq!(added.len(), 1);
        assert!(added[0].is_equality());
        // After equating, both updates read from the representative.
        assert!(update[&VarId(0)].equals_mod_arith(&Expr::var(VarId(0))));
    }

    #[test]
    fn accelerated_guard_still_contains_the_original_constraints() {
        let (mut store, l, x) = loop_store();
        let mut update = Update::new();
        update.insert(x, Expr::var(x).minus(Expr::int(2)));
        let guard = vec![Rel::gt(Expr::var(x), Expr::int(3))];
        store.add_rule(Rule::new_linear(l, guard.clone(), Expr::one(), l, update));
        let accelerated = accelerate_all(&mut store, l);
        let accel = store.rule(*accelerated.first().unwrap());
        assert!(accel.guard.contains(&guard[0]));
    }
}
