//! Asymptotic bound prover for a single rule: given the guard and cost of
//! a rule leaving the initial location, certify a complexity class by
//! exhibiting a direction of the guard's recession cone along which the
//! cost grows without bound.
//!
//! Growth that only needs temporary variables is unbounded for fixed
//! program inputs and yields `Infty`. The prover is deliberately modest:
//! it handles conjunctions of affine constraints and polynomial or
//! ground-exponential costs, and answers `Unknown` (never a wrong class)
//! outside that fragment.

use std::collections::BTreeMap;

use num_rational::Rational64;
use num_traits::{Signed, Zero};

use civet_expr::{Complexity, Expr, Rel, Subst, VarId, VarNames};
use civet_ir::{Guard, VariableSet};
use civet_smt::{
    check_guard_with_model, CmpOp, FmSolver, LinComb, SatResult, SmtFormula, SmtSolver, SmtSort,
};

/// Verdict of the prover, passed through to the final result.
#[derive(Clone, Debug)]
pub struct AsymptoticResult {
    pub cpx: Complexity,
    pub reduced_cpx: Complexity,
    pub cost: Expr,
    pub reason: String,
}

impl AsymptoticResult {
    fn unknown(cost: &Expr, reason: impl Into<String>) -> Self {
        AsymptoticResult {
            cpx: Complexity::Unknown,
            reduced_cpx: Complexity::Unknown,
            cost: cost.clone(),
            reason: reason.into(),
        }
    }

    fn of(cpx: Complexity, cost: &Expr, reason: impl Into<String>) -> Self {
        AsymptoticResult {
            cpx,
            reduced_cpx: cpx,
            cost: cost.clone(),
            reason: reason.into(),
        }
    }
}

/// Determines the asymptotic class of `cost` under `guard`.
///
/// With `final_check` unset only the structural cost estimate is
/// reported, without certification; the extractor always runs the final
/// check.
pub fn determine_complexity(
    vars: &VariableSet,
    guard: &Guard,
    cost: &Expr,
    final_check: bool,
) -> AsymptoticResult {
    // Split the guard into its affine part (which shapes the recession
    // cone) and nonlinear atoms (verified along the witness ray later).
    let mut linear: Guard = Guard::new();
    let mut nonlinear: Vec<Rel> = Vec::new();
    for rel in guard {
        if is_affine_rel(rel) {
            linear.push(rel.clone());
        } else {
            nonlinear.push(rel.clone());
        }
    }

    let (sat, model) = check_guard_with_model(guard, vars);
    let model = match sat {
        SatResult::Unsat => return AsymptoticResult::unknown(cost, "guard is unsatisfiable"),
        SatResult::Sat => model,
        SatResult::Unknown(_) => {
            // Fall back to a model of the affine part; the nonlinear
            // atoms only need to hold eventually along the chosen ray.
            let (lin_sat, lin_model) = check_guard_with_model(&linear, vars);
            match lin_sat {
                SatResult::Unsat => {
                    return AsymptoticResult::unknown(cost, "guard is unsatisfiable")
                }
                SatResult::Sat => lin_model,
                SatResult::Unknown(reason) => {
                    return AsymptoticResult::unknown(
                        cost,
                        format!("guard satisfiability undecided: {reason}"),
                    )
                }
            }
        }
    };

    if cost.is_infty() {
        return AsymptoticResult::of(
            Complexity::Infty,
            cost,
            "infinite cost on a satisfiable guard",
        );
    }

    if !final_check {
        return AsymptoticResult::of(
            cost.complexity(),
            cost,
            "structural estimate, asymptotic check skipped",
        );
    }

    if let Some(poly) = cost.as_poly() {
        if poly.as_const().is_some() {
            return AsymptoticResult::of(Complexity::Const, cost, "constant cost");
        }
    }

    // Recession-cone rows of the affine guard part.
    let mut rows = Vec::new();
    for rel in &linear {
        if let Some((le, ge)) = rel.split_equality() {
            if let (Some(a), Some(b)) = (le.as_affine_le(), ge.as_affine_le()) {
                rows.push(a);
                rows.push(b);
            }
        } else if let Some(affine) = rel.as_affine_le() {
            rows.push(affine);
        }
    }

    let model = model.unwrap_or_default();
    let mut base: BTreeMap<VarId, Rational64> = BTreeMap::new();
    for var in cost.vars().into_iter().chain(guard.iter().flat_map(|r| r.vars())) {
        let name = vars.var_name(var).unwrap_or("?");
        base.insert(
            var,
            model.get_rat(name).unwrap_or_else(Rational64::zero),
        );
    }

    let mut best: Option<AsymptoticResult> = None;
    for candidate in cost.vars() {
        let Some(direction) = recession_direction(vars, &rows, candidate, &base) else {
            continue;
        };
        let Some(result) = classify_along(vars, cost, &base, &direction, &nonlinear) else {
            continue;
        };
        if result.cpx == Complexity::Infty {
            return result;
        }
        if best.as_ref().map_or(true, |b| result.cpx > b.cpx) {
            best = Some(result);
        }
    }

    best.unwrap_or_else(|| {
        AsymptoticResult::of(
            Complexity::Const,
            cost,
            "cost is bounded on the guard",
        )
    })
}

/// A direction `d` of the recession cone with `d_candidate ≥ 1`, i.e. an
/// unbounded ray of the guard polyhedron along which `candidate` grows.
fn recession_direction(
    vars: &VariableSet,
    rows: &[civet_expr::AffineIneq],
    candidate: VarId,
    base: &BTreeMap<VarId, Rational64>,
) -> Option<BTreeMap<VarId, Rational64>> {
    let name = |v: VarId| format!("d${}", vars.var_name(v).unwrap_or("?"));
    let mut solver = FmSolver::new();
    for var in base.keys() {
        solver.declare_var(&name(*var), SmtSort::Real);
    }
    for row in rows {
        let mut lhs = LinComb::zero();
        for (var, coeff) in &row.coeffs {
            lhs.add_assign(&LinComb::scaled_var(name(*var), *coeff));
        }
        solver.assert_formula(SmtFormula::atom(lhs, CmpOp::Le));
    }
    solver.assert_formula(SmtFormula::cmp(
        LinComb::var(name(candidate)),
        CmpOp::Ge,
        LinComb::int(1),
    ));
    if solver.check_sat() != SatResult::Sat {
        return None;
    }
    let model = solver.model()?;
    let mut direction = BTreeMap::new();
    for var in base.keys() {
        let value = model.get_rat(&name(*var)).unwrap_or_else(Rational64::zero);
        if !value.is_zero() {
            direction.insert(*var, value);
        }
    }
    Some(direction)
}

/// Whether the constraint belongs to the affine fragment.
fn is_affine_rel(rel: &Rel) -> bool {
    if rel.is_equality() {
        match rel.split_equality() {
            Some((le, ge)) => le.as_affine_le().is_some() && ge.as_affine_le().is_some(),
            None => false,
        }
    } else {
        rel.as_affine_le().is_some()
    }
}

/// Whether a constraint over the single variable `t` holds for all large
/// enough `t`.
fn eventually_holds(rel: &Rel, t: VarId) -> bool {
    if rel.is_equality() {
        return rel
            .lhs
            .clone()
            .minus(rel.rhs.clone())
            .as_poly()
            .is_some_and(|p| p.is_zero());
    }
    let Some(gt) = rel.normalized_gt() else {
        return false;
    };
    let Some(poly) = gt.lhs.as_poly() else {
        return false;
    };
    let degree = poly.degree_in(t);
    if degree == 0 {
        return poly.as_const().is_some_and(|c| c.is_positive());
    }
    let leading = poly
        .terms()
        .filter(|(mono, _)| mono.degree_in(t) == degree)
        .map(|(_, coeff)| *coeff)
        .fold(Rational64::zero(), |acc, c| acc + c);
    leading.is_positive()
}

/// Classifies the cost along the ray `base + t·direction`, requiring the
/// nonlinear guard atoms to hold for all large `t` on the ray.
fn classify_along(
    vars: &VariableSet,
    cost: &Expr,
    base: &BTreeMap<VarId, Rational64>,
    direction: &BTreeMap<VarId, Rational64>,
    nonlinear: &[Rel],
) -> Option<AsymptoticResult> {
    // A synthetic parameter index above every registered variable.
    let t = VarId(vars.len() as u32);
    let mut ray = Subst::new();
    for (var, start) in base {
        let slope = direction.get(var).copied().unwrap_or_else(Rational64::zero);
        ray.insert(
            *var,
            Expr::num(*start).plus(Expr::num(slope).times(Expr::var(t))),
        );
    }
    for rel in nonlinear {
        if !eventually_holds(&rel.subst(&ray), t) {
            return None;
        }
    }
    let on_ray = cost.subst(&ray);

    let temps_only = direction.keys().all(|v| vars.is_temp(*v));
    let witness_vars: Vec<&str> = direction
        .keys()
        .filter_map(|v| vars.var_name(*v))
        .collect();

    if let Some(poly) = on_ray.as_poly() {
        let degree = poly.degree_in(t);
        if degree == 0 {
            return None;
        }
        let leading = poly
            .terms()
            .filter(|(mono, _)| mono.degree_in(t) == degree)
            .map(|(_, coeff)| *coeff)
            .fold(Rational64::zero(), |acc, c| acc + c);
        if !leading.is_positive() {
            return None;
        }
        let cpx = if temps_only {
            Complexity::Infty
        } else {
            Complexity::poly(degree)
        };
        let reason = if temps_only {
            format!(
                "cost grows unboundedly along the temporaries {}",
                witness_vars.join(", ")
            )
        } else {
            format!(
                "cost grows with degree {degree} along {}",
                witness_vars.join(", ")
            )
        };
        return Some(AsymptoticResult::of(cpx, cost, reason));
    }

    if exponential_growth_in(&on_ray, t) {
        let cpx = if temps_only {
            Complexity::Infty
        } else {
            Complexity::Exp
        };
        return Some(AsymptoticResult::of(
            cpx,
            cost,
            format!(
                "cost grows exponentially along {}",
                witness_vars.join(", ")
            ),
        ));
    }
    None
}

/// Detects a factor `b^e` with constant `b ≥ 2` whose exponent grows
/// linearly in `t` along the ray.
fn exponential_growth_in(expr: &Expr, t: VarId) -> bool {
    match expr {
        Expr::Const(_) | Expr::Var(_) | Expr::Infty => false,
        Expr::Add(terms) | Expr::Mul(terms) => {
            terms.iter().any(|term| exponential_growth_in(term, t))
        }
        Expr::Pow(base, exp) => {
            if let Some(b) = base.as_const() {
                if b >= Rational64::from_integer(2) {
                    if let Some(poly) = exp.as_poly() {
                        if poly.degree_in(t) == 1 && poly.linear_coeff(t).is_positive() {
                            return true;
                        }
                    }
                }
            }
            exponential_growth_in(base, t) || exponential_growth_in(exp, t)
        }
    }
}
