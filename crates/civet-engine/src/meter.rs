//! Metering-function synthesis for simple loops.
//!
//! A metering function `m` for a loop with guard `g` and update `u` is an
//! affine expression over the loop's relevant variables with
//!
//!   1. `g ⊨ m ≥ 0`, and
//!   2. `g ∧ x' = u(x) ⊨ m(x') ≤ m(x) − 1`,
//!
//! so `m` bounds the number of consecutive iterations. The search poses
//! both conditions as Farkas certificates over a coefficient template and
//! discharges them through the built-in solver with rational multipliers;
//! fractional solutions are made integral by introducing a fresh
//! temporary tied to the function by a guard equation.

use std::collections::{BTreeMap, BTreeSet};

use num_integer::Integer;
use num_rational::Rational64;
use num_traits::{One, Zero};

use civet_expr::{Expr, Poly, Rel, Subst, VarId, VarNames};
use civet_ir::{Guard, Update, VariableSet};
use civet_smt::backends::smtlib_printer;
use civet_smt::{guard_implies, FmSolver, Implication, LinComb, SatResult, SmtSolver, SmtSort};

use crate::farkas::{assert_farkas_implication, FarkasRow};
use crate::preprocess::find_temp_equality;
use crate::settings::AnalysisSettings;

/// Outcome of the metering search for one loop variant.
#[derive(Clone, Debug)]
pub enum MeterOutcome {
    /// A metering function was found. The accelerated rule's guard must
    /// pick up the integral-scaling constraint, if any.
    Metered {
        meter: Expr,
        integral_constraint: Option<Rel>,
    },
    /// No guard constraint limits the loop: it can iterate forever.
    Unbounded,
    /// Guard or update outside the affine fragment.
    Nonlinear,
    /// The template has no certificate.
    NoMetering,
}

fn update_as_subst(update: &Update) -> Subst {
    update.iter().map(|(v, e)| (*v, e.clone())).collect()
}

/// Equality propagation on a guard/update pair, eliminating temporaries.
fn eliminate_temp_vars(vars: &VariableSet, guard: &mut Guard, updates: &mut [Update]) {
    while let Some((idx, var, solution)) = find_temp_equality(vars, guard) {
        guard.remove(idx);
        let mut map = Subst::new();
        map.insert(var, solution);
        for rel in guard.iter_mut() {
            *rel = rel.subst(&map);
        }
        for update in updates.iter_mut() {
            for (_, image) in update.iter_mut() {
                *image = image.subst(&map);
            }
        }
    }
}

/// Replaces equalities by their `≤`/`≥` halves.
fn replace_equalities(guard: &Guard) -> Guard {
    let mut out = Guard::new();
    for rel in guard {
        match rel.split_equality() {
            Some((le, ge)) => {
                out.push(le);
                out.push(ge);
            }
            None => out.push(rel.clone()),
        }
    }
    out
}

/// Keeps the constraints that can limit the loop: those mentioning a
/// temporary, and those on updated variables that are not implied by the
/// guard after some update. Dropping a constraint is only sound when it
/// stays implied under every update.
fn reduce_guard(vars: &VariableSet, guard: &Guard, updates: &[Update]) -> Guard {
    let updated: BTreeSet<VarId> = updates
        .iter()
        .flat_map(|u| u.keys().copied())
        .collect();
    let mut reduced = Guard::new();
    for rel in guard {
        let rel_vars = rel.vars();
        if rel_vars.iter().any(|v| vars.is_temp(*v)) {
            reduced.push(rel.clone());
            continue;
        }
        if rel_vars.iter().all(|v| !updated.contains(v)) {
            continue;
        }
        let violable = updates.iter().any(|update| {
            let post = rel.subst(&update_as_subst(update));
            guard_implies(guard, &post, vars) != Implication::Holds
        });
        if violable {
            reduced.push(rel.clone());
        }
    }
    reduced
}

/// Transitive closure of variable relevance: everything in the reduced
/// guard, plus whatever feeds the update of an already-relevant variable.
fn find_relevant_vars(
    reduced_guard: &Guard,
    updates: &[Update],
) -> BTreeSet<VarId> {
    let mut relevant: BTreeSet<VarId> = reduced_guard.iter().flat_map(|rel| rel.vars()).collect();
    loop {
        let mut grew = false;
        for update in updates {
            for (var, image) in update {
                if relevant.contains(var) {
                    for used in image.vars() {
                        grew |= relevant.insert(used);
                    }
                }
            }
        }
        if !grew {
            return relevant;
        }
    }
}

/// Propagates constant updates into the guard: for `v <- e` with `e` free
/// of updated variables, every constraint on `v` is added with `v`
/// replaced by `e`.
fn strengthen_guard(guard: &mut Guard, updates: &[Update]) {
    let updated: BTreeSet<VarId> = updates
        .iter()
        .flat_map(|u| u.keys().copied())
        .collect();
    let mut additions = Vec::new();
    for update in updates {
        for (var, image) in update {
            if image.vars().iter().any(|v| updated.contains(v)) {
                continue;
            }
            for rel in guard.iter() {
                if !rel.has_var(*var) {
                    continue;
                }
                let mut map = Subst::new();
                map.insert(*var, image.clone());
                let strengthened = rel.subst(&map);
                if !guard.contains(&strengthened) && !additions.contains(&strengthened) {
                    additions.push(strengthened);
                }
            }
        }
    }
    guard.extend(additions);
}

fn solver_name(vars: &VariableSet, var: VarId) -> String {
    vars.var_name(var).unwrap_or("?").to_string()
}

fn primed_name(vars: &VariableSet, var: VarId) -> String {
    format!("p${}", solver_name(vars, var))
}

fn guard_rows(guard: &Guard, vars: &VariableSet) -> Option<Vec<FarkasRow>> {
    let mut rows = Vec::new();
    for rel in guard {
        let affine = rel.as_affine_le()?;
        rows.push(FarkasRow {
            coeffs: affine
                .coeffs
                .iter()
                .map(|(v, c)| (solver_name(vars, *v), *c))
                .collect(),
            bound: affine.bound,
        });
    }
    Some(rows)
}

fn update_rows(update: &Update, vars: &VariableSet) -> Option<Vec<FarkasRow>> {
    let mut rows = Vec::new();
    for (var, image) in update {
        let poly = image.as_poly()?;
        let (coeffs, constant) = poly.affine_parts()?;
        // x' - e <= 0  and  e - x' <= 0
        let mut forward: BTreeMap<String, Rational64> = coeffs
            .iter()
            .map(|(v, c)| (solver_name(vars, *v), -c))
            .collect();
        forward.insert(primed_name(vars, *var), Rational64::one());
        let backward: BTreeMap<String, Rational64> =
            forward.iter().map(|(n, c)| (n.clone(), -c)).collect();
        rows.push(FarkasRow {
            coeffs: forward,
            bound: constant,
        });
        rows.push(FarkasRow {
            coeffs: backward,
            bound: -constant,
        });
    }
    Some(rows)
}

/// Searches for a metering function of the loop `(guard, updates)`.
/// Multiple updates (one per rhs call of a branching loop) must all obey
/// the decrease condition.
pub fn find_metering_function(
    vars: &mut VariableSet,
    guard: &Guard,
    updates: &[Update],
    settings: &AnalysisSettings,
    smt_dumps: &mut Vec<String>,
) -> MeterOutcome {
    let mut guard = guard.clone();
    let mut updates = updates.to_vec();
    eliminate_temp_vars(vars, &mut guard, &mut updates);
    guard = replace_equalities(&guard);

    let reduced = reduce_guard(vars, &guard, &updates);
    let relevant = find_relevant_vars(&reduced, &updates);
    guard.retain(|rel| rel.vars().iter().any(|v| relevant.contains(v)));
    for update in &mut updates {
        update.retain(|var, _| relevant.contains(var));
    }
    strengthen_guard(&mut guard, &updates);

    if reduced.is_empty() {
        return MeterOutcome::Unbounded;
    }

    let Some(rows) = guard_rows(&guard, vars) else {
        return MeterOutcome::Nonlinear;
    };
    let update_row_sets: Option<Vec<Vec<FarkasRow>>> =
        updates.iter().map(|u| update_rows(u, vars)).collect();
    let Some(update_row_sets) = update_row_sets else {
        return MeterOutcome::Nonlinear;
    };

    let template: Vec<VarId> = relevant.iter().copied().collect();
    let coeff_name = |i: usize| format!("c${i}");
    let abs_name = "c$abs";

    let mut solver = FmSolver::new();
    solver.declare_var(abs_name, SmtSort::Real);
    for i in 0..template.len() {
        solver.declare_var(&coeff_name(i), SmtSort::Real);
    }

    // (1)  g ⊨ m ≥ 0, i.e.  Σ (-c_i)·x_i ≤ c_abs.
    let mut nonneg = BTreeMap::new();
    for (i, var) in template.iter().enumerate() {
        nonneg.insert(
            solver_name(vars, *var),
            LinComb::scaled_var(coeff_name(i), Rational64::from_integer(-1)),
        );
    }
    assert_farkas_implication(&mut solver, &rows, &nonneg, &LinComb::var(abs_name), "l$g");

    // (2)  g ∧ x' = u(x) ⊨ m(x') - m(x) ≤ -1, per update.
    for (u_idx, (update, u_rows)) in updates.iter().zip(&update_row_sets).enumerate() {
        let mut premise = rows.clone();
        premise.extend(u_rows.iter().cloned());
        let mut decrease = BTreeMap::new();
        for (i, var) in template.iter().enumerate() {
            if update.contains_key(var) {
                decrease.insert(primed_name(vars, *var), LinComb::var(coeff_name(i)));
                decrease.insert(
                    solver_name(vars, *var),
                    LinComb::scaled_var(coeff_name(i), Rational64::from_integer(-1)),
                );
            }
        }
        assert_farkas_implication(
            &mut solver,
            &premise,
            &decrease,
            &LinComb::int(-1),
            &format!("l$u{u_idx}_"),
        );
    }

    if settings.dump_smt {
        smt_dumps.push(smtlib_printer::render_solver(&solver));
    }

    match solver.check_sat() {
        SatResult::Sat => {
            let model = solver.model().expect("model after sat");
            let mut poly =
                Poly::constant(model.get_rat(abs_name).unwrap_or_else(Rational64::zero));
            for (i, var) in template.iter().enumerate() {
                let coeff = model
                    .get_rat(&coeff_name(i))
                    .unwrap_or_else(Rational64::zero);
                poly = poly.add(&Poly::var(*var).scale(coeff));
            }
            build_metering_result(vars, poly)
        }
        _ => MeterOutcome::NoMetering,
    }
}

/// Turns the solved template into an expression, forcing integrality by
/// substituting a fresh temporary when coefficients are fractional.
fn build_metering_result(vars: &mut VariableSet, poly: Poly) -> MeterOutcome {
    let mut denom_lcm: i64 = 1;
    for (_, coeff) in poly.terms() {
        denom_lcm = denom_lcm.lcm(coeff.denom());
    }
    if denom_lcm == 1 {
        return MeterOutcome::Metered {
            meter: poly.to_expr(),
            integral_constraint: None,
        };
    }
    let temp = vars.add_fresh_temporary_variable("meter");
    let scaled = poly.scale(Rational64::from_integer(denom_lcm)).to_expr();
    let constraint = Rel::eq(
        Expr::int(denom_lcm).times(Expr::var(temp)),
        scaled,
    );
    MeterOutcome::Metered {
        meter: Expr::var(temp),
        integral_constraint: Some(constraint),
    }
}

/// Candidate instantiations for the temporaries of a guard, derived from
/// their unit-coefficient bounds. At most `max_per_var` candidates per
/// temporary, at most `max_total` combined substitutions.
pub fn find_instantiations(
    vars: &VariableSet,
    guard: &Guard,
    max_per_var: usize,
    max_total: usize,
) -> Vec<Subst> {
    let temps: Vec<VarId> = guard
        .iter()
        .flat_map(|rel| rel.vars())
        .filter(|v| vars.is_temp(*v))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut combos: Vec<Subst> = vec![Subst::new()];
    for temp in temps {
        let mut candidates: Vec<Expr> = Vec::new();
        for rel in guard {
            if !rel.has_var(temp) {
                continue;
            }
            let bounds = match rel.split_equality() {
                Some((le, ge)) => vec![le, ge],
                None => vec![rel.clone()],
            };
            for bound in bounds {
                let Some(affine) = bound.as_affine_le() else {
                    continue;
                };
                let coeff = affine
                    .coeffs
                    .get(&temp)
                    .copied()
                    .unwrap_or_else(Rational64::zero);
                let one = Rational64::one();
                if coeff != one && coeff != -one {
                    continue;
                }
                // c·t + Σ rest ≤ b  ~~>  t ⋚ (b - Σ rest)/c
                let mut rest = Poly::constant(affine.bound);
                for (var, c) in &affine.coeffs {
                    if *var != temp {
                        rest = rest.sub(&Poly::var(*var).scale(*c));
                    }
                }
                let candidate = rest.scale(one / coeff).to_expr();
                if !candidates
                    .iter()
                    .any(|c| c.equals_mod_arith(&candidate))
                {
                    candidates.push(candidate);
                }
                if candidates.len() >= max_per_var {
                    break;
                }
            }
            if candidates.len() >= max_per_var {
                break;
            }
        }
        if candidates.is_empty() {
            continue;
        }
        let mut extended = Vec::new();
        for combo in &combos {
            for candidate in &candidates {
                let mut next = combo.clone();
                next.insert(temp, candidate.clone());
                extended.push(next);
                if extended.len() >= max_total {
                    break;
                }
            }
            if extended.len() >= max_total {
                break;
            }
        }
        combos = extended;
    }
    combos.retain(|subst| !subst.is_empty());
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn setup() -> (VariableSet, VarId, VarId) {
        let mut vars = VariableSet::new();
        let x = vars.add_fresh_variable("x");
        let y = vars.add_fresh_variable("y");
        (vars, x, y)
    }

    fn decrement(x: VarId) -> Update {
        let mut update = Update::new();
        update.insert(x, Expr::var(x).minus(Expr::one()));
        update
    }

    fn eval(meter: &Expr, x: VarId, value: i64) -> Rational64 {
        let mut assignment = Map::new();
        assignment.insert(x, Rational64::from_integer(value));
        meter.as_poly().unwrap().eval(&assignment).unwrap()
    }

    #[test]
    fn counting_loop_has_a_metering_function() {
        let (mut vars, x, _) = setup();
        let guard = vec![Rel::gt(Expr::var(x), Expr::zero())];
        let updates = vec![decrement(x)];
        let mut dumps = Vec::new();
        let outcome = find_metering_function(
            &mut vars,
            &guard,
            &updates,
            &AnalysisSettings::default(),
            &mut dumps,
        );
        let MeterOutcome::Metered { meter, integral_constraint } = outcome else {
            panic!("expected a metering function");
        };
        assert!(integral_constraint.is_none());
        // m is affine in x, nonnegative on the guard, and decreases by at
        // least one per iteration.
        for sample in [1i64, 2, 10] {
            let here = eval(&meter, x, sample);
            let next = eval(&meter, x, sample - 1);
            assert!(here >= Rational64::from_integer(0));
            assert!(next <= here - Rational64::from_integer(1));
        }
    }

    #[test]
    fn doubling_loop_has_no_linear_metering_function() {
        let (mut vars, x, _) = setup();
        let guard = vec![Rel::gt(Expr::var(x), Expr::zero())];
        let mut update = Update::new();
        update.insert(x, Expr::int(2).times(Expr::var(x)));
        let mut dumps = Vec::new();
        let outcome = find_metering_function(
            &mut vars,
            &guard,
            &[update],
            &AnalysisSettings::default(),
            &mut dumps,
        );
        assert!(matches!(outcome, MeterOutcome::NoMetering));
    }

    #[test]
    fn loops_without_limiting_constraints_are_unbounded() {
        let (mut vars, x, y) = setup();
        // The guard only constrains y, which the update never touches.
        let guard = vec![Rel::gt(Expr::var(y), Expr::zero())];
        let updates = vec![decrement(x)];
        let mut dumps = Vec::new();
        let outcome = find_metering_function(
            &mut vars,
            &guard,
            &updates,
            &AnalysisSettings::default(),
            &mut dumps,
        );
        assert!(matches!(outcome, MeterOutcome::Unbounded));
    }

    #[test]
    fn nonlinear_updates_are_reported_as_such() {
        let (mut vars, x, _) = setup();
        let guard = vec![Rel::gt(Expr::var(x), Expr::zero())];
        let mut update = Update::new();
        update.insert(x, Expr::var(x).times(Expr::var(x)).minus(Expr::one()));
        let mut dumps = Vec::new();
        let outcome = find_metering_function(
            &mut vars,
            &guard,
            &[update],
            &AnalysisSettings::default(),
            &mut dumps,
        );
        assert!(matches!(outcome, MeterOutcome::Nonlinear));
    }

    #[test]
    fn reduced_guard_drops_constraints_preserved_by_the_update() {
        let (vars, x, y) = setup();
        // y >= 0 is untouched; x >= 0 survives since x decreases.
        let guard = vec![
            Rel::ge(Expr::var(y), Expr::zero()),
            Rel::gt(Expr::var(x), Expr::zero()),
        ];
        let reduced = reduce_guard(&vars, &guard, &[decrement(x)]);
        assert_eq!(reduced.len(), 1);
        assert!(reduced[0].has_var(x));
    }

    #[test]
    fn instantiation_candidates_come_from_unit_bounds() {
        let (mut vars, x, _) = setup();
        let t = vars.add_fresh_temporary_variable("t");
        let guard = vec![
            Rel::le(Expr::var(t), Expr::var(x)),
            Rel::gt(Expr::var(t), Expr::zero()),
        ];
        let combos = find_instantiations(&vars, &guard, 4, 16);
        assert!(!combos.is_empty());
        assert!(combos.iter().all(|s| s.contains_key(&t)));
        // x itself must be among the candidate images.
        assert!(combos
            .iter()
            .any(|s| s[&t].equals_mod_arith(&Expr::var(x))));
    }

    #[test]
    fn guard_strengthening_propagates_constant_updates() {
        let (_, x, y) = setup();
        let mut update = Update::new();
        update.insert(x, Expr::var(y));
        let mut guard = vec![Rel::gt(Expr::var(x), Expr::zero())];
        strengthen_guard(&mut guard, &[update]);
        assert_eq!(guard.len(), 2);
        assert!(guard[1].has_var(y) && !guard[1].has_var(x));
    }
}
