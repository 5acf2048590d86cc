use std::collections::{BTreeMap, BTreeSet};

use num_rational::Rational64;
use num_traits::{One, Zero};

use crate::expr::{Expr, VarId};

/// A power product of variables. The map never stores zero exponents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Monomial(BTreeMap<VarId, u32>);

impl Monomial {
    pub fn unit() -> Self {
        Monomial(BTreeMap::new())
    }

    pub fn var(var: VarId) -> Self {
        let mut exps = BTreeMap::new();
        exps.insert(var, 1);
        Monomial(exps)
    }

    pub fn is_unit(&self) -> bool {
        self.0.is_empty()
    }

    pub fn degree(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn degree_in(&self, var: VarId) -> u32 {
        self.0.get(&var).copied().unwrap_or(0)
    }

    pub fn mul(&self, other: &Monomial) -> Monomial {
        let mut exps = self.0.clone();
        for (var, exp) in &other.0 {
            *exps.entry(*var).or_insert(0) += exp;
        }
        Monomial(exps)
    }

    /// The monomial with `var` removed entirely.
    pub fn without(&self, var: VarId) -> Monomial {
        let mut exps = self.0.clone();
        exps.remove(&var);
        Monomial(exps)
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.0.keys().copied()
    }

    pub fn exponents(&self) -> impl Iterator<Item = (VarId, u32)> + '_ {
        self.0.iter().map(|(v, e)| (*v, *e))
    }
}

/// Sparse multivariate polynomial over rationals, in normal form: no zero
/// coefficients, monomials keyed canonically. Two polynomials are equal iff
/// they denote the same function over the rationals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Poly {
    terms: BTreeMap<Monomial, Rational64>,
}

impl Poly {
    pub fn zero() -> Self {
        Poly::default()
    }

    pub fn constant(value: Rational64) -> Self {
        let mut terms = BTreeMap::new();
        if !value.is_zero() {
            terms.insert(Monomial::unit(), value);
        }
        Poly { terms }
    }

    pub fn int(value: i64) -> Self {
        Poly::constant(Rational64::from_integer(value))
    }

    pub fn var(var: VarId) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(Monomial::var(var), Rational64::one());
        Poly { terms }
    }

    pub fn monomial(mono: Monomial, coeff: Rational64) -> Self {
        let mut terms = BTreeMap::new();
        if !coeff.is_zero() {
            terms.insert(mono, coeff);
        }
        Poly { terms }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn as_const(&self) -> Option<Rational64> {
        if self.terms.is_empty() {
            return Some(Rational64::zero());
        }
        if self.terms.len() == 1 {
            if let Some(coeff) = self.terms.get(&Monomial::unit()) {
                return Some(*coeff);
            }
        }
        None
    }

    pub fn add(&self, other: &Poly) -> Poly {
        let mut terms = self.terms.clone();
        for (mono, coeff) in &other.terms {
            let entry = terms.entry(mono.clone()).or_insert_with(Rational64::zero);
            *entry += coeff;
            if entry.is_zero() {
                terms.remove(mono);
            }
        }
        Poly { terms }
    }

    pub fn neg(&self) -> Poly {
        Poly {
            terms: self.terms.iter().map(|(m, c)| (m.clone(), -c)).collect(),
        }
    }

    pub fn sub(&self, other: &Poly) -> Poly {
        self.add(&other.neg())
    }

    pub fn scale(&self, factor: Rational64) -> Poly {
        if factor.is_zero() {
            return Poly::zero();
        }
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.clone(), c * factor))
                .collect(),
        }
    }

    pub fn mul(&self, other: &Poly) -> Poly {
        let mut acc = Poly::zero();
        for (lm, lc) in &self.terms {
            for (rm, rc) in &other.terms {
                acc = acc.add(&Poly::monomial(lm.mul(rm), lc * rc));
            }
        }
        acc
    }

    pub fn pow(&self, exp: u32) -> Poly {
        let mut acc = Poly::constant(Rational64::one());
        for _ in 0..exp {
            acc = acc.mul(self);
        }
        acc
    }

    pub fn total_degree(&self) -> u32 {
        self.terms.keys().map(Monomial::degree).max().unwrap_or(0)
    }

    pub fn degree_in(&self, var: VarId) -> u32 {
        self.terms
            .keys()
            .map(|m| m.degree_in(var))
            .max()
            .unwrap_or(0)
    }

    pub fn constant_term(&self) -> Rational64 {
        self.terms
            .get(&Monomial::unit())
            .copied()
            .unwrap_or_else(Rational64::zero)
    }

    /// Coefficient of the pure linear monomial of `var`.
    pub fn linear_coeff(&self, var: VarId) -> Rational64 {
        self.terms
            .get(&Monomial::var(var))
            .copied()
            .unwrap_or_else(Rational64::zero)
    }

    pub fn vars(&self) -> BTreeSet<VarId> {
        self.terms.keys().flat_map(Monomial::vars).collect()
    }

    pub fn is_affine(&self) -> bool {
        self.terms.keys().all(|m| m.degree() <= 1)
    }

    /// No monomial contains more than one variable from `vars` (counting
    /// multiplicity); other variables act as symbolic constants.
    pub fn is_linear(&self, vars: &BTreeSet<VarId>) -> bool {
        self.terms.keys().all(|m| {
            m.exponents()
                .filter(|(v, _)| vars.contains(v))
                .map(|(_, e)| e)
                .sum::<u32>()
                <= 1
        })
    }

    /// Decomposes an affine polynomial into linear coefficients and the
    /// constant term. `None` if any monomial has degree above one.
    pub fn affine_parts(&self) -> Option<(BTreeMap<VarId, Rational64>, Rational64)> {
        if !self.is_affine() {
            return None;
        }
        let mut coeffs = BTreeMap::new();
        let mut constant = Rational64::zero();
        for (mono, coeff) in &self.terms {
            if mono.is_unit() {
                constant = *coeff;
            } else {
                let var = mono.vars().next().expect("degree-one monomial");
                coeffs.insert(var, *coeff);
            }
        }
        Some((coeffs, constant))
    }

    /// Substitutes a polynomial for a variable.
    pub fn subst_var(&self, var: VarId, image: &Poly) -> Poly {
        let mut acc = Poly::zero();
        for (mono, coeff) in &self.terms {
            let exp = mono.degree_in(var);
            let rest = Poly::monomial(mono.without(var), *coeff);
            if exp == 0 {
                acc = acc.add(&rest);
            } else {
                acc = acc.add(&rest.mul(&image.pow(exp)));
            }
        }
        acc
    }

    /// Evaluates the polynomial under a total assignment of its variables.
    pub fn eval(&self, assignment: &BTreeMap<VarId, Rational64>) -> Option<Rational64> {
        let mut total = Rational64::zero();
        for (mono, coeff) in &self.terms {
            let mut value = *coeff;
            for (var, exp) in mono.exponents() {
                let v = assignment.get(&var)?;
                value *= v.pow(exp as i32);
            }
            total += value;
        }
        Some(total)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &Rational64)> + '_ {
        self.terms.iter()
    }

    pub fn to_expr(&self) -> Expr {
        if self.terms.is_empty() {
            return Expr::zero();
        }
        let terms = self
            .terms
            .iter()
            .map(|(mono, coeff)| {
                let mut factors = vec![Expr::num(*coeff)];
                for (var, exp) in mono.exponents() {
                    factors.push(Expr::pow(Expr::var(var), Expr::int(exp as i64)));
                }
                Expr::product(factors)
            })
            .collect();
        Expr::sum(terms)
    }
}
