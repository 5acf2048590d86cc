use indexmap::IndexMap;
use num_rational::Rational64;

use crate::sorts::SmtSort;
use crate::terms::SmtFormula;

/// Result of a satisfiability check.
///
/// `Unknown` is a first-class answer: the built-in procedure refuses to
/// guess on nonlinear input and on integer systems where it cannot exhibit
/// an integral witness. Callers treat `Unknown` conservatively.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

impl SatResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SatResult::Sat)
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SatResult::Unsat)
    }
}

/// A satisfying assignment extracted after a `Sat` answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub values: IndexMap<String, Rational64>,
}

impl Model {
    pub fn get_rat(&self, name: &str) -> Option<Rational64> {
        self.values.get(name).copied()
    }

    /// The value of an integer-sorted variable. `None` when the variable
    /// is unassigned or the model value is fractional.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        let value = self.values.get(name)?;
        value.is_integer().then(|| *value.numer())
    }
}

/// Abstract solver interface.
///
/// Follows the SMT-LIB assertion-stack model: implementations keep a stack
/// of scopes that `push`/`pop` save and restore. Variables declared once
/// stay declared.
pub trait SmtSolver {
    /// Declare a variable. Undeclared variables default to `Int`.
    fn declare_var(&mut self, name: &str, sort: SmtSort);

    /// Assert a formula in the current scope.
    fn assert_formula(&mut self, formula: SmtFormula);

    /// Push a new assertion scope.
    fn push(&mut self);

    /// Pop the most recent assertion scope.
    fn pop(&mut self);

    /// Check satisfiability of the asserted conjunction.
    fn check_sat(&mut self) -> SatResult;

    /// The model of the last `Sat` answer, if any.
    fn model(&self) -> Option<&Model>;

    /// Drop all assertions and declarations.
    fn reset(&mut self);
}
