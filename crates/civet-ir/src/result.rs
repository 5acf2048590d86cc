use serde::Serialize;

use civet_expr::{Complexity, Expr};

use crate::rule::Guard;

/// Final outcome of an analysis: the complexity class, a witnessing cost
/// expression and the guard under which it is attained.
///
/// `reduced_cpx` is the class reported by the asymptotic prover after its
/// own reductions and is passed through verbatim. Serializes for the
/// machine-readable output of the command line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuntimeResult {
    pub cpx: Complexity,
    pub bound: Expr,
    pub reduced_cpx: Complexity,
    pub guard: Guard,
}

impl Default for RuntimeResult {
    fn default() -> Self {
        RuntimeResult {
            cpx: Complexity::Unknown,
            bound: Expr::zero(),
            reduced_cpx: Complexity::Unknown,
            guard: Guard::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civet_expr::{Rel, VarId};

    #[test]
    fn default_result_is_unknown() {
        let result = RuntimeResult::default();
        assert!(result.cpx.is_unknown());
        assert!(result.guard.is_empty());
        assert!(result.bound.is_zero());
    }

    #[test]
    fn results_serialize_with_their_structure_intact() {
        let result = RuntimeResult {
            cpx: Complexity::Poly(2),
            bound: Expr::var(VarId(0)).times(Expr::var(VarId(1))),
            reduced_cpx: Complexity::Poly(2),
            guard: vec![Rel::gt(Expr::var(VarId(0)), Expr::zero())],
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["cpx"], serde_json::json!({ "Poly": 2 }));
        // The bound stays an expression tree, not display text.
        assert!(json["bound"].get("Mul").is_some());
        assert_eq!(json["guard"][0]["op"], "Gt");
    }
}
