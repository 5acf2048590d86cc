use std::fmt;

use serde::Serialize;

use crate::expr::Expr;

/// Asymptotic complexity class.
///
/// Totally ordered: `Unknown < Const < Poly(1) < Poly(2) < … < Exp < Infty`.
/// `Unknown` is the bottom element and the identity of the max reducer.
/// Degree-zero polynomials are represented as `Const`; use
/// [`Complexity::poly`] rather than constructing `Poly(0)` directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Complexity {
    Unknown,
    Const,
    Poly(u32),
    Exp,
    Infty,
}

impl Complexity {
    pub fn poly(degree: u32) -> Self {
        if degree == 0 {
            Complexity::Const
        } else {
            Complexity::Poly(degree)
        }
    }

    pub fn is_unknown(self) -> bool {
        self == Complexity::Unknown
    }

    /// Pointwise addition: the cost of running both parts in sequence.
    /// `Unknown` acts as the identity so partial information is kept.
    pub fn plus(self, other: Complexity) -> Complexity {
        self.max(other)
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Unknown => write!(f, "?"),
            Complexity::Const => write!(f, "O(1)"),
            Complexity::Poly(1) => write!(f, "O(n)"),
            Complexity::Poly(d) => write!(f, "O(n^{d})"),
            Complexity::Exp => write!(f, "EXP"),
            Complexity::Infty => write!(f, "INF"),
        }
    }
}

impl Expr {
    /// Structural complexity estimate of the term, viewed as a cost.
    ///
    /// This is an upper estimate obtained without consulting the guard:
    /// polynomials map to their total degree, terms with non-constant
    /// exponents to `Exp`, the infinite-cost marker to `Infty`.
    pub fn complexity(&self) -> Complexity {
        if self.is_infty() {
            return Complexity::Infty;
        }
        if let Some(poly) = self.as_poly() {
            return Complexity::poly(poly.total_degree());
        }
        if self.has_variable_exponent() {
            return Complexity::Exp;
        }
        Complexity::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::VarId;

    #[test]
    fn lattice_is_totally_ordered() {
        let chain = [
            Complexity::Unknown,
            Complexity::Const,
            Complexity::poly(1),
            Complexity::poly(2),
            Complexity::Exp,
            Complexity::Infty,
        ];
        for pair in chain.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn poly_constructor_collapses_degree_zero() {
        assert_eq!(Complexity::poly(0), Complexity::Const);
        assert_eq!(Complexity::poly(3), Complexity::Poly(3));
    }

    #[test]
    fn unknown_is_identity_for_plus() {
        assert_eq!(Complexity::Unknown.plus(Complexity::Poly(2)), Complexity::Poly(2));
        assert_eq!(Complexity::Const.plus(Complexity::Unknown), Complexity::Const);
    }

    #[test]
    fn estimator_classifies_costs() {
        let x = Expr::var(VarId(0));
        assert_eq!(Expr::int(7).complexity(), Complexity::Const);
        assert_eq!(x.clone().complexity(), Complexity::Poly(1));
        assert_eq!(
            x.clone().times(x.clone()).complexity(),
            Complexity::Poly(2)
        );
        assert_eq!(
            Expr::pow(Expr::int(2), x.clone()).complexity(),
            Complexity::Exp
        );
        assert_eq!(Expr::Infty.complexity(), Complexity::Infty);
    }
}
