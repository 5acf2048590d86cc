//! Rule-level simplification: trivial and duplicate guard constraints,
//! constraints subsumed by stronger ones, trivial updates, and equality
//! propagation to eliminate temporary variables.

use civet_expr::{Expr, Rel, Subst, VarId};
use civet_ir::{Guard, Rule, VariableSet};
use civet_smt::{guard_implies, Implication};

/// Applies all rule-level simplifications. Returns true iff the rule
/// changed.
pub fn simplify_rule(vars: &VariableSet, rule: &mut Rule) -> bool {
    let mut changed = remove_trivial_guards(&mut rule.guard);
    changed |= remove_duplicate_guards(&mut rule.guard);
    changed |= eliminate_temp_var_equalities(vars, rule);
    changed |= remove_weaker_guards(vars, &mut rule.guard);
    changed |= remove_trivial_updates(rule);
    changed
}

/// Removes constraints that hold for every state, like `42 <= 1337` or
/// `x <= x + 1`. No solver queries involved.
pub fn remove_trivial_guards(guard: &mut Guard) -> bool {
    let before = guard.len();
    guard.retain(|rel| !rel.is_trivially_true());
    guard.len() != before
}

/// Removes syntactic duplicates modulo arithmetic and inequality
/// direction, keeping the first occurrence.
pub fn remove_duplicate_guards(guard: &mut Guard) -> bool {
    let mut seen = Vec::new();
    let before = guard.len();
    guard.retain(|rel| {
        let canon = rel.canonical();
        if seen.contains(&canon) {
            false
        } else {
            seen.push(canon);
            true
        }
    });
    guard.len() != before
}

/// Removes constraints for which a strictly stronger sibling exists, e.g.
/// `x >= 0` next to `x > 0`. Involves one implication query per ordered
/// pair.
pub fn remove_weaker_guards(vars: &VariableSet, guard: &mut Guard) -> bool {
    let mut removed = vec![false; guard.len()];
    for i in 0..guard.len() {
        if removed[i] {
            continue;
        }
        for j in 0..guard.len() {
            if i == j || removed[j] {
                continue;
            }
            let premise = std::slice::from_ref(&guard[i]);
            if guard_implies(premise, &guard[j], vars) == Implication::Holds {
                removed[j] = true;
            }
        }
    }
    if removed.iter().any(|r| *r) {
        let mut keep = removed.iter().map(|r| !*r);
        guard.retain(|_| keep.next().unwrap_or(true));
        true
    } else {
        false
    }
}

/// Drops update entries of the shape `x <- x`.
pub fn remove_trivial_updates(rule: &mut Rule) -> bool {
    let mut changed = false;
    for call in rule.rhs.calls_mut() {
        let before = call.update.len();
        call.update.retain(|var, image| *image != Expr::var(*var));
        changed |= call.update.len() != before;
    }
    changed
}

/// Finds a guard equality that solves a temporary variable, returning the
/// constraint index, the variable and its solution.
pub fn find_temp_equality(vars: &VariableSet, guard: &[Rel]) -> Option<(usize, VarId, Expr)> {
    for (idx, rel) in guard.iter().enumerate() {
        if !rel.is_equality() {
            continue;
        }
        let Some(diff) = rel.lhs.clone().minus(rel.rhs.clone()).as_poly() else {
            continue;
        };
        let Some((coeffs, _)) = diff.affine_parts() else {
            continue;
        };
        for (var, coeff) in &coeffs {
            if !vars.is_temp(*var) {
                continue;
            }
            let one = num_rational::Rational64::from_integer(1);
            if *coeff != one && *coeff != -one {
                continue;
            }
            // c·t + rest = 0  ~~>  t = -rest/c
            let rest = diff.sub(&civet_expr::Poly::var(*var).scale(*coeff));
            let solution = rest.scale(-one / coeff).to_expr();
            return Some((idx, *var, solution));
        }
    }
    None
}

/// Propagates guard equalities to eliminate temporary variables from the
/// whole rule. Repeats until no solvable equality is left.
pub fn eliminate_temp_var_equalities(vars: &VariableSet, rule: &mut Rule) -> bool {
    let mut changed = false;
    while let Some((idx, var, solution)) = find_temp_equality(vars, &rule.guard) {
        rule.guard.remove(idx);
        let mut map = Subst::new();
        map.insert(var, solution);
        *rule = rule.subst(&map);
        changed = true;
    }
    changed
}

/// Tries to remove the trailing cost constraint of a guard (appended
/// during lowering for user-specified costs) when the rest of the guard
/// already implies it.
pub fn try_to_remove_cost(vars: &VariableSet, guard: &mut Guard) -> bool {
    let Some((last, rest)) = guard.split_last() else {
        return false;
    };
    if guard_implies(rest, last, vars) == Implication::Holds {
        guard.pop();
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civet_ir::Update;
    use civet_ir::{LocationIdx, RuleStore};

    fn setup() -> (RuleStore, VarId, VarId) {
        let mut store = RuleStore::new();
        store.add_named_location("f");
        let x = store.vars_mut().add_fresh_variable("x");
        let t = store.vars_mut().add_fresh_temporary_variable("t");
        (store, x, t)
    }

    fn loop_rule(guard: Guard, update: Update) -> Rule {
        Rule::new_linear(LocationIdx(0), guard, Expr::one(), LocationIdx(0), update)
    }

    #[test]
    fn trivial_and_duplicate_constraints_are_removed() {
        let (store, x, _) = setup();
        let mut rule = loop_rule(
            vec![
                Rel::le(Expr::int(1), Expr::int(2)),
                Rel::gt(Expr::var(x), Expr::zero()),
                Rel::lt(Expr::zero(), Expr::var(x)),
            ],
            Update::new(),
        );
        assert!(simplify_rule(store.vars(), &mut rule));
        assert_eq!(rule.guard.len(), 1);
    }

    #[test]
    fn weaker_constraints_yield_to_stronger_ones() {
        let (store, x, _) = setup();
        let mut guard = vec![
            Rel::gt(Expr::var(x), Expr::int(5)),
            Rel::ge(Expr::var(x), Expr::zero()),
        ];
        assert!(remove_weaker_guards(store.vars(), &mut guard));
        assert_eq!(guard, vec![Rel::gt(Expr::var(x), Expr::int(5))]);
    }

    #[test]
    fn temporary_equalities_propagate_through_the_rule() {
        let (store, x, t) = setup();
        let mut update = Update::new();
        update.insert(x, Expr::var(t).plus(Expr::one()));
        let mut rule = loop_rule(
            vec![
                Rel::eq(Expr::var(t), Expr::var(x).minus(Expr::one())),
                Rel::gt(Expr::var(t), Expr::zero()),
            ],
            update,
        );
        assert!(eliminate_temp_var_equalities(store.vars(), &mut rule));
        assert!(!rule.vars().contains(&t));
        // t > 0 became x - 1 > 0, and the update became x <- x.
        assert_eq!(rule.guard.len(), 1);
        let img = &rule.linear_update().unwrap()[&x];
        assert!(img.equals_mod_arith(&Expr::var(x)));
    }

    #[test]
    fn implied_cost_constraints_are_stripped() {
        let (store, x, _) = setup();
        let mut guard = vec![
            Rel::gt(Expr::var(x), Expr::int(3)),
            Rel::gt(Expr::var(x), Expr::zero()),
        ];
        assert!(try_to_remove_cost(store.vars(), &mut guard));
        assert_eq!(guard.len(), 1);

        let mut kept = vec![Rel::gt(Expr::var(x), Expr::zero())];
        assert!(!try_to_remove_cost(store.vars(), &mut kept));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn trivial_updates_are_stripped() {
        let (store, x, _) = setup();
        let mut update = Update::new();
        update.insert(x, Expr::var(x));
        let mut rule = loop_rule(vec![], update);
        assert!(simplify_rule(store.vars(), &mut rule));
        assert!(rule.linear_update().unwrap().is_empty());
    }
}
