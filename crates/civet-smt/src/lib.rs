//! SMT-style decision procedure for the civet analyzer.
//!
//! The solver interface is a trait ([`SmtSolver`]) so backends stay
//! pluggable; the crate ships a deterministic built-in backend
//! ([`backends::fm::FmSolver`]) based on rational Fourier–Motzkin
//! elimination with integer tightening, plus an SMT-LIB2 printer for
//! dumping queries. The [`encode`] module answers the analyzer's two
//! oracle questions — guard satisfiability and constraint implication —
//! over the rule store's variable registry.

pub mod backends;
pub mod encode;
pub mod solver;
pub mod sorts;
pub mod terms;

pub use backends::fm::FmSolver;
pub use encode::{check_guard, check_guard_with_model, guard_implies, Implication};
pub use solver::{Model, SatResult, SmtSolver};
pub use sorts::SmtSort;
pub use terms::{Atom, CmpOp, LinComb, SmtFormula};
