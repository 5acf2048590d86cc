//! Closed forms for the first-order recurrences produced by loop
//! acceleration.
//!
//! Updates are solved as `x(n) = a·x(n−1) + r(n)` with rational constant
//! `a`: the `a = 1` case by symbolic summation of the inhomogeneity, the
//! integer `a ≥ 2` case geometrically when the inhomogeneity does not
//! depend on the iteration counter. Cost recurrences `c(n) = c(n−1) + q(n)`
//! with `c(0) = 0` reduce to the same summation. Anything outside these
//! shapes reports failure and the caller keeps the unaccelerated loop.

use num_rational::Rational64;
use num_traits::{One, Signed, Zero};

use crate::expr::{Expr, VarId};
use crate::poly::Poly;

/// Closed form of `x(n) = rhs[target ↦ x(n−1)]` with `x(1) = init`.
///
/// Occurrences of `n` in `rhs` refer to the current step (the caller has
/// already shifted previously solved recurrences). Returns `None` when the
/// recurrence is outside the supported fragment.
pub fn iterated_update(rhs: &Expr, target: VarId, n: VarId, init: &Expr) -> Option<Expr> {
    let (factor, inhomogeneity) = decompose_affine_in(rhs, target)?;
    if factor.is_one() {
        let total = symbolic_sum(&inhomogeneity, n)?;
        let at_one = total.subst_var(n, &Expr::one());
        return Some(Expr::sum(vec![init.clone(), total, at_one.neg()]));
    }
    if factor.is_integer() && factor >= Rational64::from_integer(2) {
        if inhomogeneity.has_var(n) {
            return None;
        }
        // x(n) = a^(n-1)·x(1) + r·(a^(n-1) - 1)/(a - 1)
        let power = Expr::pow(
            Expr::num(factor),
            Expr::var(n).minus(Expr::one()),
        );
        let homogeneous = power.clone().times(init.clone());
        let geometric = inhomogeneity
            .times(power.minus(Expr::one()))
            .times(Expr::num(
                Rational64::one() / (factor - Rational64::one()),
            ));
        return Some(homogeneous.plus(geometric));
    }
    None
}

/// Closed form of `c(n) = c(n−1) + step(n)` with `c(0) = 0`, i.e. the sum
/// of the per-iteration cost over all iterations.
pub fn iterated_cost(step: &Expr, n: VarId) -> Option<Expr> {
    symbolic_sum(step, n)
}

/// Symbolic `Σ_{k=1}^{n} term[n ↦ k]`.
pub fn symbolic_sum(term: &Expr, n: VarId) -> Option<Expr> {
    let addends: Vec<Expr> = match term {
        Expr::Add(terms) => terms.clone(),
        other => vec![other.clone()],
    };
    let mut contributions = Vec::with_capacity(addends.len());
    for addend in addends {
        contributions.push(sum_addend(&addend, n)?);
    }
    Some(Expr::sum(contributions))
}

fn sum_addend(term: &Expr, n: VarId) -> Option<Expr> {
    if !term.has_var(n) {
        return Some(term.clone().times(Expr::var(n)));
    }
    if let Some(poly) = term.as_poly() {
        let mut acc = Poly::zero();
        for (mono, coeff) in poly.terms() {
            let exp = mono.degree_in(n);
            let rest = Poly::monomial(mono.without(n), *coeff);
            acc = acc.add(&rest.mul(&faulhaber(exp, n)));
        }
        return Some(acc.to_expr());
    }
    sum_geometric_addend(term, n)
}

/// Sums addends of the shape `c · b^(s·n + t)` with constant integer base
/// `b ≥ 2` and positive integer slope `s`; `c` and `t` may mention other
/// variables but not `n`.
fn sum_geometric_addend(term: &Expr, n: VarId) -> Option<Expr> {
    let factors: Vec<Expr> = match term {
        Expr::Mul(factors) => factors.clone(),
        other => vec![other.clone()],
    };
    let mut coefficient = Vec::new();
    let mut power: Option<(Rational64, Expr)> = None;
    for factor in factors {
        match &factor {
            Expr::Pow(base, exp) if exp.has_var(n) => {
                if power.is_some() {
                    return None;
                }
                let base = base.as_const()?;
                power = Some((base, (**exp).clone()));
            }
            _ if factor.has_var(n) => return None,
            _ => coefficient.push(factor),
        }
    }
    let (base, exponent) = power?;
    if !base.is_integer() || base < Rational64::from_integer(2) {
        return None;
    }
    let exp_poly = exponent.as_poly()?;
    let slope = exp_poly.linear_coeff(n);
    if exp_poly.degree_in(n) > 1 || !slope.is_integer() || !slope.is_positive() {
        return None;
    }
    let slope_int = i32::try_from(*slope.numer()).ok()?;
    if slope_int > 16 {
        return None;
    }
    let shift = exp_poly.sub(&Poly::var(n).scale(slope)).to_expr();
    // Σ_{k=1}^{n} b^(s·k + t) = b^t · q/(q-1) · (q^n - 1)  with q = b^s
    let q = base.pow(slope_int);
    let scale = q / (q - Rational64::one());
    Some(Expr::product(vec![
        Expr::product(coefficient),
        Expr::pow(Expr::num(base), shift),
        Expr::num(scale),
        Expr::pow(Expr::num(q), Expr::var(n)).minus(Expr::one()),
    ]))
}

/// `S_d(n) = Σ_{k=1}^{n} k^d` as a polynomial in `n`, via the recursive
/// binomial identity `(n+1)^(d+1) − 1 = Σ_j C(d+1, j)·S_j(n)`.
pub fn faulhaber(degree: u32, n: VarId) -> Poly {
    let mut sums: Vec<Poly> = vec![Poly::var(n)];
    for d in 1..=degree {
        let n_plus_one = Poly::var(n).add(&Poly::int(1));
        let mut acc = n_plus_one.pow(d + 1).sub(&Poly::int(1));
        for (j, sum) in sums.iter().enumerate() {
            let coeff = Rational64::from_integer(binomial(d + 1, j as u32));
            acc = acc.sub(&sum.scale(coeff));
        }
        sums.push(acc.scale(Rational64::new(1, i64::from(d) + 1)));
    }
    sums[degree as usize].clone()
}

fn binomial(n: u32, k: u32) -> i64 {
    let mut result: i64 = 1;
    for i in 0..k.min(n - k) {
        result = result * i64::from(n - i) / (i64::from(i) + 1);
    }
    result
}

/// Writes `e` as `a·v + rest` with a constant `a` and `v`-free `rest`.
fn decompose_affine_in(e: &Expr, v: VarId) -> Option<(Rational64, Expr)> {
    if !e.has_var(v) {
        return Some((Rational64::zero(), e.clone()));
    }
    if let Some(poly) = e.as_poly() {
        for (mono, _) in poly.terms() {
            if mono.degree_in(v) > 0 && *mono != crate::poly::Monomial::var(v) {
                return None;
            }
        }
        let coeff = poly.linear_coeff(v);
        let rest = poly.sub(&Poly::var(v).scale(coeff)).to_expr();
        return Some((coeff, rest));
    }
    // Non-polynomial terms: pull a scalar multiple of v out of a flat sum.
    let addends: Vec<Expr> = match e {
        Expr::Add(terms) => terms.clone(),
        other => vec![other.clone()],
    };
    let mut coeff = Rational64::zero();
    let mut rest = Vec::new();
    for addend in addends {
        if !addend.has_var(v) {
            rest.push(addend);
            continue;
        }
        coeff += scalar_multiple_of(&addend, v)?;
    }
    Some((coeff, Expr::sum(rest)))
}

fn scalar_multiple_of(term: &Expr, v: VarId) -> Option<Rational64> {
    match term {
        Expr::Var(var) if *var == v => Some(Rational64::one()),
        Expr::Mul(factors) => {
            let mut coeff = Rational64::one();
            let mut seen = false;
            for factor in factors {
                match factor {
                    Expr::Var(var) if *var == v && !seen => seen = true,
                    Expr::Const(c) => coeff *= c,
                    _ => return None,
                }
            }
            seen.then_some(coeff)
        }
        _ => None,
    }
}
