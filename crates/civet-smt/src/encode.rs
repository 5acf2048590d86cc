//! Bridges the analyzer's guards onto the solver: affine expressions
//! become linear combinations over the registry's variable names, and the
//! two oracle queries of the core — guard satisfiability and single
//! constraint implication — are answered here.
//!
//! Nonlinear constraints do not encode; every query involving one answers
//! `Unknown`, which callers treat as "keep the rule" / "no change".

use civet_expr::{Expr, Poly, Rel, VarNames};
use civet_ir::VariableSet;

use crate::backends::fm::FmSolver;
use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::{CmpOp, LinComb, SmtFormula};

/// Outcome of an implication query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Implication {
    Holds,
    DoesNotHold,
    Unknown,
}

pub fn lincomb_of_poly(poly: &Poly, vars: &VariableSet) -> Option<LinComb> {
    let (coeffs, constant) = poly.affine_parts()?;
    let mut lc = LinComb::num(constant);
    for (var, coeff) in coeffs {
        let name = vars.var_name(var)?;
        lc.add_assign(&LinComb::scaled_var(name, coeff));
    }
    Some(lc)
}

pub fn lincomb_of_expr(expr: &Expr, vars: &VariableSet) -> Option<LinComb> {
    lincomb_of_poly(&expr.as_poly()?, vars)
}

/// A single constraint as a solver atom. `None` for nonlinear constraints.
pub fn formula_of_rel(rel: &Rel, vars: &VariableSet) -> Option<SmtFormula> {
    let diff = rel.lhs.clone().minus(rel.rhs.clone());
    let lhs = lincomb_of_expr(&diff, vars)?;
    let op = match rel.op {
        civet_expr::RelOp::Eq => CmpOp::Eq,
        civet_expr::RelOp::Lt => CmpOp::Lt,
        civet_expr::RelOp::Le => CmpOp::Le,
        civet_expr::RelOp::Gt => CmpOp::Gt,
        civet_expr::RelOp::Ge => CmpOp::Ge,
    };
    Some(SmtFormula::atom(lhs, op))
}

/// The integer negation of a constraint, as a disjunction.
pub fn negation_of_rel(rel: &Rel, vars: &VariableSet) -> Option<SmtFormula> {
    let disjuncts = rel
        .negated()
        .iter()
        .map(|neg| formula_of_rel(neg, vars))
        .collect::<Option<Vec<_>>>()?;
    Some(SmtFormula::or(disjuncts))
}

fn solver_for(guard: &[Rel], vars: &VariableSet) -> Option<FmSolver> {
    let mut solver = FmSolver::new();
    for rel in guard {
        let formula = formula_of_rel(rel, vars)?;
        for name in formula.var_names() {
            solver.declare_var(name, SmtSort::Int);
        }
        solver.assert_formula(formula);
    }
    Some(solver)
}

/// Satisfiability of a guard over the integers.
pub fn check_guard(guard: &[Rel], vars: &VariableSet) -> SatResult {
    match solver_for(guard, vars) {
        Some(mut solver) => solver.check_sat(),
        None => SatResult::Unknown("nonlinear constraint in guard".to_string()),
    }
}

/// Satisfiability plus an integral witness state.
pub fn check_guard_with_model(guard: &[Rel], vars: &VariableSet) -> (SatResult, Option<Model>) {
    match solver_for(guard, vars) {
        Some(mut solver) => {
            let result = solver.check_sat();
            let model = solver.model().cloned();
            (result, model)
        }
        None => (
            SatResult::Unknown("nonlinear constraint in guard".to_string()),
            None,
        ),
    }
}

/// Does the premise guard entail a single constraint? Decided by refuting
/// `premise ∧ ¬conclusion`; only definite answers are returned as such.
pub fn guard_implies(premise: &[Rel], conclusion: &Rel, vars: &VariableSet) -> Implication {
    let Some(mut solver) = solver_for(premise, vars) else {
        return Implication::Unknown;
    };
    let Some(negated) = negation_of_rel(conclusion, vars) else {
        return Implication::Unknown;
    };
    for name in negated.var_names() {
        solver.declare_var(name, SmtSort::Int);
    }
    solver.assert_formula(negated);
    match solver.check_sat() {
        SatResult::Unsat => Implication::Holds,
        SatResult::Sat => Implication::DoesNotHold,
        SatResult::Unknown(_) => Implication::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civet_expr::VarId;

    fn setup() -> (VariableSet, VarId, VarId) {
        let mut vars = VariableSet::new();
        let x = vars.add_fresh_variable("x");
        let y = vars.add_fresh_variable("y");
        (vars, x, y)
    }

    #[test]
    fn satisfiable_guards_are_recognized() {
        let (vars, x, y) = setup();
        let guard = vec![
            Rel::gt(Expr::var(x), Expr::zero()),
            Rel::ge(Expr::var(y), Expr::var(x)),
        ];
        assert_eq!(check_guard(&guard, &vars), SatResult::Sat);
    }

    #[test]
    fn unsatisfiable_guards_are_refuted() {
        let (vars, x, _) = setup();
        let guard = vec![
            Rel::gt(Expr::var(x), Expr::zero()),
            Rel::lt(Expr::var(x), Expr::zero()),
        ];
        assert_eq!(check_guard(&guard, &vars), SatResult::Unsat);
    }

    #[test]
    fn nonlinear_guards_answer_unknown() {
        let (vars, x, y) = setup();
        let guard = vec![Rel::gt(Expr::var(x).times(Expr::var(y)), Expr::zero())];
        assert!(matches!(
            check_guard(&guard, &vars),
            SatResult::Unknown(_)
        ));
    }

    #[test]
    fn empty_guards_are_trivially_satisfiable() {
        let (vars, _, _) = setup();
        assert_eq!(check_guard(&[], &vars), SatResult::Sat);
    }

    #[test]
    fn guard_models_satisfy_the_constraints() {
        let (vars, x, y) = setup();
        let guard = vec![
            Rel::ge(Expr::var(x), Expr::int(5)),
            Rel::gt(Expr::var(y), Expr::var(x)),
        ];
        let (result, model) = check_guard_with_model(&guard, &vars);
        assert_eq!(result, SatResult::Sat);
        let model = model.unwrap();
        let xv = model.get_int("x").unwrap();
        let yv = model.get_int("y").unwrap();
        assert!(xv >= 5 && yv > xv);
    }

    #[test]
    fn implications_are_decided_by_refutation() {
        let (vars, x, _) = setup();
        let premise = vec![Rel::gt(Expr::var(x), Expr::int(1))];
        // x > 1 implies x > 0
        assert_eq!(
            guard_implies(&premise, &Rel::gt(Expr::var(x), Expr::zero()), &vars),
            Implication::Holds
        );
        // x > 1 does not imply x > 5
        assert_eq!(
            guard_implies(&premise, &Rel::gt(Expr::var(x), Expr::int(5)), &vars),
            Implication::DoesNotHold
        );
    }

    #[test]
    fn equality_conclusions_negate_to_disjunctions() {
        let (vars, x, _) = setup();
        let premise = vec![
            Rel::ge(Expr::var(x), Expr::int(3)),
            Rel::le(Expr::var(x), Expr::int(3)),
        ];
        assert_eq!(
            guard_implies(&premise, &Rel::eq(Expr::var(x), Expr::int(3)), &vars),
            Implication::Holds
        );
    }
}
