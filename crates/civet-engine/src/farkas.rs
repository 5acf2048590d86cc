//! Farkas-lemma encoding of universally quantified affine implications.
//!
//! `A·x ≤ b ⊨ d·x ≤ e` holds (over the rationals, hence soundly over the
//! integers) iff there are multipliers `λ ≥ 0` with `λᵀA = d` and
//! `λᵀb ≤ e`. The conclusion coefficients `d` and bound `e` may mention
//! solver unknowns (the metering template coefficients), which keeps the
//! whole encoding linear.

use std::collections::{BTreeMap, BTreeSet};

use num_rational::Rational64;

use civet_smt::{CmpOp, FmSolver, LinComb, SmtFormula, SmtSolver, SmtSort};

/// One premise row `Σ coeffs·x ≤ bound` over named variables.
#[derive(Clone, Debug)]
pub struct FarkasRow {
    pub coeffs: BTreeMap<String, Rational64>,
    pub bound: Rational64,
}

/// Asserts the Farkas certificate constraints for
/// `rows ⊨ Σ conclusion_coeffs·x ≤ conclusion_bound` into `solver`.
/// Multiplier variables are named `{lambda_prefix}{k}`.
pub fn assert_farkas_implication(
    solver: &mut FmSolver,
    rows: &[FarkasRow],
    conclusion_coeffs: &BTreeMap<String, LinComb>,
    conclusion_bound: &LinComb,
    lambda_prefix: &str,
) {
    let lambda_names: Vec<String> = (0..rows.len())
        .map(|k| format!("{lambda_prefix}{k}"))
        .collect();
    for name in &lambda_names {
        solver.declare_var(name, SmtSort::Real);
        solver.assert_formula(SmtFormula::atom(LinComb::var(name.clone()), CmpOp::Ge));
    }

    let mut universe: BTreeSet<&String> = conclusion_coeffs.keys().collect();
    for row in rows {
        universe.extend(row.coeffs.keys());
    }

    // λᵀA = d, one equation per variable column.
    for var in universe {
        let mut lhs = LinComb::zero();
        for (row, lambda) in rows.iter().zip(&lambda_names) {
            if let Some(coeff) = row.coeffs.get(var) {
                lhs.add_assign(&LinComb::scaled_var(lambda.clone(), *coeff));
            }
        }
        if let Some(d) = conclusion_coeffs.get(var) {
            lhs.add_assign(&d.scale(Rational64::from_integer(-1)));
        }
        solver.assert_formula(SmtFormula::atom(lhs, CmpOp::Eq));
    }

    // λᵀb ≤ e.
    let mut bound = LinComb::zero();
    for (row, lambda) in rows.iter().zip(&lambda_names) {
        bound.add_assign(&LinComb::scaled_var(lambda.clone(), row.bound));
    }
    bound.add_assign(&conclusion_bound.scale(Rational64::from_integer(-1)));
    solver.assert_formula(SmtFormula::atom(bound, CmpOp::Le));
}
