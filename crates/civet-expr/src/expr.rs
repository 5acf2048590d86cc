use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use num_rational::Rational64;
use num_traits::{One, Signed, Zero};
use serde::Serialize;

use crate::poly::Poly;

/// Index of a variable in the analysis-wide registry.
///
/// The registry itself (names, program/temporary kinds) lives with the rule
/// store; expressions only carry indices so that terms stay cheap to clone
/// and compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VarId(pub u32);

/// A simultaneous substitution: every mapped variable is replaced by its
/// image evaluated over the *pre*-substitution state.
pub type Subst = IndexMap<VarId, Expr>;

/// Resolves variable indices to display names.
pub trait VarNames {
    fn var_name(&self, var: VarId) -> Option<&str>;
}

/// Fallback name source that prints raw indices.
pub struct NoNames;

impl VarNames for NoNames {
    fn var_name(&self, _var: VarId) -> Option<&str> {
        None
    }
}

/// An immutable arithmetic term over integer variables.
///
/// Terms are kept flattened, constant-folded and deterministically ordered
/// by the smart constructors ([`Expr::sum`], [`Expr::product`],
/// [`Expr::pow`]); full normalization (combining like terms) goes through
/// [`Poly`]. The distinguished [`Expr::Infty`] term marks the cost of a
/// non-terminating run and absorbs addition and (nonzero) multiplication.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Expr {
    Const(Rational64),
    Var(VarId),
    Infty,
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Const(Rational64::from_integer(value))
    }

    pub fn num(value: Rational64) -> Self {
        Expr::Const(value)
    }

    pub fn var(var: VarId) -> Self {
        Expr::Var(var)
    }

    pub fn zero() -> Self {
        Expr::int(0)
    }

    pub fn one() -> Self {
        Expr::int(1)
    }

    /// Flattening, constant-folding sum. `Infty` absorbs the whole sum.
    pub fn sum(terms: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        let mut constant = Rational64::zero();
        for term in terms {
            match term {
                Expr::Infty => return Expr::Infty,
                Expr::Const(c) => constant += c,
                Expr::Add(inner) => {
                    for sub in inner {
                        match sub {
                            Expr::Infty => return Expr::Infty,
                            Expr::Const(c) => constant += c,
                            other => flat.push(other),
                        }
                    }
                }
                other => flat.push(other),
            }
        }
        if !constant.is_zero() || flat.is_empty() {
            flat.push(Expr::Const(constant));
        }
        flat.sort();
        if flat.len() == 1 {
            flat.pop().expect("nonempty")
        } else {
            Expr::Add(flat)
        }
    }

    /// Flattening, constant-folding product. A zero factor annihilates the
    /// product; `Infty` absorbs any product without a zero factor.
    pub fn product(factors: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(factors.len());
        let mut constant = Rational64::one();
        let mut saw_infty = false;
        for factor in factors {
            match factor {
                Expr::Infty => saw_infty = true,
                Expr::Const(c) => constant *= c,
                Expr::Mul(inner) => {
                    for sub in inner {
                        match sub {
                            Expr::Infty => saw_infty = true,
                            Expr::Const(c) => constant *= c,
                            other => flat.push(other),
                        }
                    }
                }
                other => flat.push(other),
            }
        }
        if constant.is_zero() {
            return Expr::zero();
        }
        if saw_infty {
            return Expr::Infty;
        }
        if !constant.is_one() || flat.is_empty() {
            flat.push(Expr::Const(constant));
        }
        flat.sort();
        if flat.len() == 1 {
            flat.pop().expect("nonempty")
        } else {
            Expr::Mul(flat)
        }
    }

    pub fn pow(base: Expr, exp: Expr) -> Self {
        if let Expr::Const(e) = &exp {
            if e.is_zero() {
                return Expr::one();
            }
            if e.is_one() {
                return base;
            }
            if let Expr::Const(b) = &base {
                if e.is_integer() {
                    if let Ok(small) = i32::try_from(*e.numer()) {
                        return Expr::Const(b.pow(small));
                    }
                }
            }
        }
        if let Expr::Const(b) = &base {
            if b.is_one() {
                return Expr::one();
            }
        }
        Expr::Pow(Box::new(base), Box::new(exp))
    }

    pub fn neg(self) -> Self {
        Expr::product(vec![Expr::int(-1), self])
    }

    pub fn plus(self, other: Expr) -> Self {
        Expr::sum(vec![self, other])
    }

    pub fn minus(self, other: Expr) -> Self {
        Expr::sum(vec![self, other.neg()])
    }

    pub fn times(self, other: Expr) -> Self {
        Expr::product(vec![self, other])
    }

    pub fn is_infty(&self) -> bool {
        matches!(self, Expr::Infty)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(c) if c.is_zero())
    }

    pub fn as_const(&self) -> Option<Rational64> {
        match self {
            Expr::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// All variables occurring in the term.
    pub fn vars(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<VarId>) {
        match self {
            Expr::Const(_) | Expr::Infty => {}
            Expr::Var(v) => {
                out.insert(*v);
            }
            Expr::Add(terms) | Expr::Mul(terms) => {
                for term in terms {
                    term.collect_vars(out);
                }
            }
            Expr::Pow(base, exp) => {
                base.collect_vars(out);
                exp.collect_vars(out);
            }
        }
    }

    pub fn has_var(&self, var: VarId) -> bool {
        match self {
            Expr::Const(_) | Expr::Infty => false,
            Expr::Var(v) => *v == var,
            Expr::Add(terms) | Expr::Mul(terms) => terms.iter().any(|t| t.has_var(var)),
            Expr::Pow(base, exp) => base.has_var(var) || exp.has_var(var),
        }
    }

    pub fn has_var_in(&self, vars: &BTreeSet<VarId>) -> bool {
        match self {
            Expr::Const(_) | Expr::Infty => false,
            Expr::Var(v) => vars.contains(v),
            Expr::Add(terms) | Expr::Mul(terms) => terms.iter().any(|t| t.has_var_in(vars)),
            Expr::Pow(base, exp) => base.has_var_in(vars) || exp.has_var_in(vars),
        }
    }

    /// Simultaneous substitution. Images are not substituted into again.
    pub fn subst(&self, map: &Subst) -> Expr {
        match self {
            Expr::Const(_) | Expr::Infty => self.clone(),
            Expr::Var(v) => map.get(v).cloned().unwrap_or_else(|| self.clone()),
            Expr::Add(terms) => Expr::sum(terms.iter().map(|t| t.subst(map)).collect()),
            Expr::Mul(terms) => Expr::product(terms.iter().map(|t| t.subst(map)).collect()),
            Expr::Pow(base, exp) => Expr::pow(base.subst(map), exp.subst(map)),
        }
    }

    pub fn subst_var(&self, var: VarId, image: &Expr) -> Expr {
        let mut map = Subst::new();
        map.insert(var, image.clone());
        self.subst(&map)
    }

    /// Polynomial normal form, when the term is a polynomial.
    pub fn as_poly(&self) -> Option<Poly> {
        match self {
            Expr::Const(c) => Some(Poly::constant(*c)),
            Expr::Var(v) => Some(Poly::var(*v)),
            Expr::Infty => None,
            Expr::Add(terms) => {
                let mut acc = Poly::zero();
                for term in terms {
                    acc = acc.add(&term.as_poly()?);
                }
                Some(acc)
            }
            Expr::Mul(terms) => {
                let mut acc = Poly::constant(Rational64::one());
                for term in terms {
                    acc = acc.mul(&term.as_poly()?);
                }
                Some(acc)
            }
            Expr::Pow(base, exp) => {
                let e = exp.as_const()?;
                if !e.is_integer() || e.is_negative() {
                    return None;
                }
                let e = u32::try_from(*e.numer()).ok()?;
                if e > 64 {
                    return None;
                }
                Some(base.as_poly()?.pow(e))
            }
        }
    }

    pub fn is_polynomial(&self) -> bool {
        self.as_poly().is_some()
    }

    /// Total degree, when polynomial.
    pub fn degree(&self) -> Option<u32> {
        self.as_poly().map(|p| p.total_degree())
    }

    /// Linearity with respect to a variable set: no monomial multiplies two
    /// of the given variables or squares one of them. Variables outside the
    /// set are treated as symbolic constants.
    pub fn is_linear(&self, vars: &BTreeSet<VarId>) -> bool {
        match self.as_poly() {
            Some(poly) => poly.is_linear(vars),
            None => false,
        }
    }

    /// True if the term contains a power with a non-constant exponent.
    pub fn has_variable_exponent(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Var(_) | Expr::Infty => false,
            Expr::Add(terms) | Expr::Mul(terms) => {
                terms.iter().any(Expr::has_variable_exponent)
            }
            Expr::Pow(base, exp) => {
                exp.as_const().is_none() || base.has_variable_exponent()
            }
        }
    }

    /// Canonical representative for equality modulo arithmetic: polynomial
    /// terms are rebuilt from their normal form, everything else keeps its
    /// constructor normalization.
    pub fn canonical(&self) -> Expr {
        match self.as_poly() {
            Some(poly) => poly.to_expr(),
            None => self.clone(),
        }
    }

    pub fn equals_mod_arith(&self, other: &Expr) -> bool {
        self == other || self.canonical() == other.canonical()
    }

    pub fn display<'a>(&'a self, names: &'a dyn VarNames) -> DisplayExpr<'a> {
        DisplayExpr { expr: self, names }
    }
}

/// Pretty-printer for expressions with resolved variable names.
pub struct DisplayExpr<'a> {
    expr: &'a Expr,
    names: &'a dyn VarNames,
}

impl DisplayExpr<'_> {
    fn fmt_expr(&self, expr: &Expr, f: &mut fmt::Formatter<'_>, parent_prec: u8) -> fmt::Result {
        let prec = match expr {
            Expr::Add(_) => 1,
            Expr::Mul(_) => 2,
            Expr::Pow(..) => 3,
            _ => 4,
        };
        let needs_parens = prec < parent_prec
            || matches!(expr, Expr::Const(c) if c.is_negative() && parent_prec > 1);
        if needs_parens {
            write!(f, "(")?;
        }
        match expr {
            Expr::Const(c) => {
                if c.is_integer() {
                    write!(f, "{}", c.numer())?;
                } else {
                    write!(f, "{}/{}", c.numer(), c.denom())?;
                }
            }
            Expr::Var(v) => match self.names.var_name(*v) {
                Some(name) => write!(f, "{name}")?,
                None => write!(f, "x{}", v.0)?,
            },
            Expr::Infty => write!(f, "INF")?,
            Expr::Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    self.fmt_expr(term, f, 1)?;
                }
            }
            Expr::Mul(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    self.fmt_expr(term, f, 2)?;
                }
            }
            Expr::Pow(base, exp) => {
                self.fmt_expr(base, f, 4)?;
                write!(f, "^")?;
                self.fmt_expr(exp, f, 4)?;
            }
        }
        if needs_parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for DisplayExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_expr(self.expr, f, 0)
    }
}
