use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use num_rational::Rational64;
use serde::Serialize;

use crate::expr::{Expr, Subst, VarId, VarNames};

/// Comparison operator of an atomic constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RelOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        }
    }
}

/// An atomic integer-arithmetic constraint `lhs ⋈ rhs`.
///
/// The normalization helpers mirror the usual integer rewrites: strict and
/// non-strict inequalities convert into each other by shifting one side by
/// one, equalities split into a `≤`/`≥` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Rel {
    pub lhs: Expr,
    pub op: RelOp,
    pub rhs: Expr,
}

/// An affine constraint in solved form: `Σ coeffs·x ≤ bound`, interpreted
/// over the integers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffineIneq {
    pub coeffs: BTreeMap<VarId, Rational64>,
    pub bound: Rational64,
}

impl Rel {
    pub fn new(lhs: Expr, op: RelOp, rhs: Expr) -> Self {
        Rel { lhs, op, rhs }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Rel::new(lhs, RelOp::Eq, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Rel::new(lhs, RelOp::Lt, rhs)
    }

    pub fn le(lhs: Expr, rhs: Expr) -> Self {
        Rel::new(lhs, RelOp::Le, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Rel::new(lhs, RelOp::Gt, rhs)
    }

    pub fn ge(lhs: Expr, rhs: Expr) -> Self {
        Rel::new(lhs, RelOp::Ge, rhs)
    }

    pub fn is_equality(&self) -> bool {
        self.op == RelOp::Eq
    }

    pub fn subst(&self, map: &Subst) -> Rel {
        Rel::new(self.lhs.subst(map), self.op, self.rhs.subst(map))
    }

    pub fn vars(&self) -> BTreeSet<VarId> {
        let mut out = self.lhs.vars();
        out.extend(self.rhs.vars());
        out
    }

    pub fn has_var(&self, var: VarId) -> bool {
        self.lhs.has_var(var) || self.rhs.has_var(var)
    }

    /// Equivalent `≤`-constraint over the integers; `None` for equalities
    /// (use [`Rel::split_equality`]).
    pub fn to_less_eq(&self) -> Option<Rel> {
        match self.op {
            RelOp::Eq => None,
            RelOp::Le => Some(self.clone()),
            RelOp::Lt => Some(Rel::le(
                self.lhs.clone(),
                self.rhs.clone().minus(Expr::one()),
            )),
            RelOp::Ge => Some(Rel::le(self.rhs.clone(), self.lhs.clone())),
            RelOp::Gt => Some(Rel::le(
                self.rhs.clone(),
                self.lhs.clone().minus(Expr::one()),
            )),
        }
    }

    /// Equivalent strict `>`-constraint over the integers.
    pub fn to_greater(&self) -> Option<Rel> {
        match self.op {
            RelOp::Eq => None,
            RelOp::Gt => Some(self.clone()),
            RelOp::Ge => Some(Rel::gt(
                self.lhs.clone().plus(Expr::one()),
                self.rhs.clone(),
            )),
            RelOp::Lt => Some(Rel::gt(self.rhs.clone(), self.lhs.clone())),
            RelOp::Le => Some(Rel::gt(
                self.rhs.clone().plus(Expr::one()),
                self.lhs.clone(),
            )),
        }
    }

    /// Normal form `e > 0` for inequalities.
    pub fn normalized_gt(&self) -> Option<Rel> {
        let gt = self.to_greater()?;
        Some(Rel::gt(gt.lhs.minus(gt.rhs), Expr::zero()))
    }

    /// Splits an equality into its `≤`/`≥` halves.
    pub fn split_equality(&self) -> Option<(Rel, Rel)> {
        if self.op != RelOp::Eq {
            return None;
        }
        Some((
            Rel::le(self.lhs.clone(), self.rhs.clone()),
            Rel::ge(self.lhs.clone(), self.rhs.clone()),
        ))
    }

    /// Solved affine `≤`-form, when both sides are affine polynomials.
    /// Equalities are rejected.
    pub fn as_affine_le(&self) -> Option<AffineIneq> {
        let le = self.to_less_eq()?;
        let diff = le.lhs.minus(le.rhs).as_poly()?;
        let (coeffs, constant) = diff.affine_parts()?;
        Some(AffineIneq {
            coeffs,
            bound: -constant,
        })
    }

    /// The integer negation as a disjunction of constraints.
    pub fn negated(&self) -> Vec<Rel> {
        match self.op {
            RelOp::Eq => vec![
                Rel::lt(self.lhs.clone(), self.rhs.clone()),
                Rel::gt(self.lhs.clone(), self.rhs.clone()),
            ],
            RelOp::Lt => vec![Rel::ge(self.lhs.clone(), self.rhs.clone())],
            RelOp::Le => vec![Rel::gt(self.lhs.clone(), self.rhs.clone())],
            RelOp::Gt => vec![Rel::le(self.lhs.clone(), self.rhs.clone())],
            RelOp::Ge => vec![Rel::lt(self.lhs.clone(), self.rhs.clone())],
        }
    }

    /// Constant truth value, when both sides reduce to constants.
    pub fn const_truth(&self) -> Option<bool> {
        let diff = self.lhs.clone().minus(self.rhs.clone());
        let value = diff.as_poly()?.as_const()?;
        Some(match self.op {
            RelOp::Eq => value == Rational64::from_integer(0),
            RelOp::Lt => value < Rational64::from_integer(0),
            RelOp::Le => value <= Rational64::from_integer(0),
            RelOp::Gt => value > Rational64::from_integer(0),
            RelOp::Ge => value >= Rational64::from_integer(0),
        })
    }

    pub fn is_trivially_true(&self) -> bool {
        self.const_truth() == Some(true)
    }

    pub fn is_trivially_false(&self) -> bool {
        self.const_truth() == Some(false)
    }

    /// Canonical representative for comparisons modulo arithmetic and
    /// inequality direction.
    pub fn canonical(&self) -> Rel {
        match self.op {
            RelOp::Eq => Rel::eq(
                self.lhs
                    .clone()
                    .minus(self.rhs.clone())
                    .canonical(),
                Expr::zero(),
            ),
            _ => {
                let gt = self.normalized_gt().expect("inequality");
                Rel::gt(gt.lhs.canonical(), Expr::zero())
            }
        }
    }

    pub fn display<'a>(&'a self, names: &'a dyn VarNames) -> DisplayRel<'a> {
        DisplayRel { rel: self, names }
    }
}

pub struct DisplayRel<'a> {
    rel: &'a Rel,
    names: &'a dyn VarNames,
}

impl fmt::Display for DisplayRel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.rel.lhs.display(self.names),
            self.rel.op.symbol(),
            self.rel.rhs.display(self.names)
        )
    }
}
