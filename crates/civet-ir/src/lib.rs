//! Integer transition system data model.
//!
//! A problem is a multigraph of locations connected by rules carrying a
//! guard, a cost and a (possibly branching) right-hand side. The
//! [`RuleStore`] owns the graph together with the variable registry and the
//! rule-index allocator; all analysis passes read and mutate it through its
//! interface. Lowering from the parsed dialect and export back into it live
//! here as well.

pub mod export;
pub mod lowering;
pub mod result;
pub mod rule;
pub mod rule_store;
pub mod variables;

pub use civet_expr::{Complexity, Expr, Rel, RelOp, Subst, VarId};
pub use lowering::{lower, LoweringError};
pub use result::RuntimeResult;
pub use rule::{compose_updates, Guard, LocationIdx, Rhs, RhsCall, Rule, RuleIdx, Update};
pub use rule_store::RuleStore;
pub use variables::VariableSet;
