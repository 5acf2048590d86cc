//! Symbolic integer algebra for the civet analyzer.
//!
//! This crate provides the algebraic substrate the rest of the analyzer is
//! built on: immutable arithmetic terms over registered variables
//! ([`Expr`]), a sparse polynomial normal form ([`Poly`]), atomic
//! integer-arithmetic constraints ([`Rel`]), the complexity lattice
//! ([`Complexity`]) together with the structural complexity estimator, and a
//! closed-form solver for the first-order recurrences produced by loop
//! acceleration.

pub mod complexity;
pub mod expr;
pub mod poly;
pub mod recurrence;
pub mod rel;

pub use complexity::Complexity;
pub use expr::{Expr, Subst, VarId, VarNames};
pub use poly::{Monomial, Poly};
pub use rel::{AffineIneq, Rel, RelOp};

pub use num_rational::Rational64;
