use indexmap::IndexMap;
use num_rational::Rational64;
use num_traits::Zero;

/// A linear combination `Σ coeffs·x + constant` over named solver
/// variables. Zero coefficients are never stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinComb {
    coeffs: IndexMap<String, Rational64>,
    constant: Rational64,
}

impl LinComb {
    pub fn zero() -> Self {
        LinComb::default()
    }

    pub fn num(value: Rational64) -> Self {
        LinComb {
            coeffs: IndexMap::new(),
            constant: value,
        }
    }

    pub fn int(value: i64) -> Self {
        LinComb::num(Rational64::from_integer(value))
    }

    pub fn var(name: impl Into<String>) -> Self {
        LinComb::scaled_var(name, Rational64::from_integer(1))
    }

    pub fn scaled_var(name: impl Into<String>, coeff: Rational64) -> Self {
        let mut coeffs = IndexMap::new();
        if !coeff.is_zero() {
            coeffs.insert(name.into(), coeff);
        }
        LinComb {
            coeffs,
            constant: Rational64::zero(),
        }
    }

    pub fn add(&self, other: &LinComb) -> LinComb {
        let mut out = self.clone();
        out.add_assign(other);
        out
    }

    pub fn add_assign(&mut self, other: &LinComb) {
        for (name, coeff) in &other.coeffs {
            let entry = self
                .coeffs
                .entry(name.clone())
                .or_insert_with(Rational64::zero);
            *entry += coeff;
            if entry.is_zero() {
                self.coeffs.shift_remove(name);
            }
        }
        self.constant += other.constant;
    }

    pub fn sub(&self, other: &LinComb) -> LinComb {
        self.add(&other.scale(Rational64::from_integer(-1)))
    }

    pub fn scale(&self, factor: Rational64) -> LinComb {
        if factor.is_zero() {
            return LinComb::zero();
        }
        LinComb {
            coeffs: self
                .coeffs
                .iter()
                .map(|(n, c)| (n.clone(), c * factor))
                .collect(),
            constant: self.constant * factor,
        }
    }

    pub fn constant(&self) -> Rational64 {
        self.constant
    }

    pub fn coeffs(&self) -> impl Iterator<Item = (&str, Rational64)> + '_ {
        self.coeffs.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn coeff(&self, name: &str) -> Rational64 {
        self.coeffs.get(name).copied().unwrap_or_else(Rational64::zero)
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn var_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.coeffs.keys().map(String::as_str)
    }
}

/// Comparison against zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Le,
    Lt,
    Ge,
    Gt,
}

/// Atomic constraint `lhs ⋈ 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Atom {
    pub lhs: LinComb,
    pub op: CmpOp,
}

/// Quantifier-free formula over linear atoms. Negation is not needed:
/// callers push negations onto atoms (integer-exact) before building the
/// formula.
#[derive(Clone, Debug, PartialEq)]
pub enum SmtFormula {
    Atom(Atom),
    And(Vec<SmtFormula>),
    Or(Vec<SmtFormula>),
}

impl SmtFormula {
    pub fn atom(lhs: LinComb, op: CmpOp) -> Self {
        SmtFormula::Atom(Atom { lhs, op })
    }

    /// `lhs ⋈ rhs` as an atom against zero.
    pub fn cmp(lhs: LinComb, op: CmpOp, rhs: LinComb) -> Self {
        SmtFormula::atom(lhs.sub(&rhs), op)
    }

    pub fn and(formulas: Vec<SmtFormula>) -> Self {
        SmtFormula::And(formulas)
    }

    pub fn or(formulas: Vec<SmtFormula>) -> Self {
        SmtFormula::Or(formulas)
    }

    pub fn var_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_var_names(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_var_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SmtFormula::Atom(atom) => out.extend(atom.lhs.var_names()),
            SmtFormula::And(fs) | SmtFormula::Or(fs) => {
                for f in fs {
                    f.collect_var_names(out);
                }
            }
        }
    }
}
