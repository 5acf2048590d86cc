use std::collections::BTreeSet;
use std::slice;

use indexmap::IndexMap;

use civet_expr::{Expr, Rel, Subst, VarId};

/// Index of a location (a node of the transition graph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationIdx(pub u32);

/// Index of a rule. Indices are allocated monotonically by the store and
/// never reused, so they double as an insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleIdx(pub u32);

/// A conjunction of atomic constraints. Order is irrelevant to the
/// semantics but preserved for deterministic output.
pub type Guard = Vec<Rel>;

/// Simultaneous assignment of program variables; absent variables are
/// unchanged. Right-hand sides are evaluated over the pre-state.
pub type Update = IndexMap<VarId, Expr>;

/// One call of a rule's right-hand side.
#[derive(Clone, Debug, PartialEq)]
pub struct RhsCall {
    pub target: LocationIdx,
    pub update: Update,
}

/// Right-hand side of a rule: a single successor for ordinary control
/// flow, or an ordered sequence of calls for nonlinear recursion (every
/// execution fires all branches).
#[derive(Clone, Debug, PartialEq)]
pub enum Rhs {
    Linear(RhsCall),
    Branch(Vec<RhsCall>),
}

impl Rhs {
    pub fn linear(target: LocationIdx, update: Update) -> Self {
        Rhs::Linear(RhsCall { target, update })
    }

    /// Builds a branching rhs, collapsing a single call to the linear form.
    pub fn branch(mut calls: Vec<RhsCall>) -> Self {
        if calls.len() == 1 {
            Rhs::Linear(calls.pop().expect("single call"))
        } else {
            Rhs::Branch(calls)
        }
    }

    pub fn calls(&self) -> &[RhsCall] {
        match self {
            Rhs::Linear(call) => slice::from_ref(call),
            Rhs::Branch(calls) => calls,
        }
    }

    pub fn calls_mut(&mut self) -> &mut [RhsCall] {
        match self {
            Rhs::Linear(call) => slice::from_mut(call),
            Rhs::Branch(calls) => calls,
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Rhs::Linear(_))
    }
}

/// One edge of the transition graph: executable iff the guard holds,
/// updating variables and accruing `cost`.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub lhs: LocationIdx,
    pub guard: Guard,
    pub cost: Expr,
    pub rhs: Rhs,
}

impl Rule {
    pub fn new(lhs: LocationIdx, guard: Guard, cost: Expr, rhs: Rhs) -> Self {
        Rule {
            lhs,
            guard,
            cost,
            rhs,
        }
    }

    pub fn new_linear(
        lhs: LocationIdx,
        guard: Guard,
        cost: Expr,
        target: LocationIdx,
        update: Update,
    ) -> Self {
        Rule::new(lhs, guard, cost, Rhs::linear(target, update))
    }

    /// Trivially-true, zero-cost rule used for initial-location grooming.
    pub fn dummy(from: LocationIdx, to: LocationIdx) -> Self {
        Rule::new_linear(from, Guard::new(), Expr::zero(), to, Update::new())
    }

    pub fn is_linear(&self) -> bool {
        self.rhs.is_linear()
    }

    /// A simple loop: a single-call rhs that returns to the source.
    pub fn is_simple_loop(&self) -> bool {
        let calls = self.rhs.calls();
        calls.len() == 1 && calls[0].target == self.lhs
    }

    /// Target of a linear rule.
    pub fn linear_target(&self) -> Option<LocationIdx> {
        match &self.rhs {
            Rhs::Linear(call) => Some(call.target),
            Rhs::Branch(_) => None,
        }
    }

    /// Update of a linear rule.
    pub fn linear_update(&self) -> Option<&Update> {
        match &self.rhs {
            Rhs::Linear(call) => Some(&call.update),
            Rhs::Branch(_) => None,
        }
    }

    /// All variables mentioned by the rule.
    pub fn vars(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        for rel in &self.guard {
            out.extend(rel.vars());
        }
        out.extend(self.cost.vars());
        for call in self.rhs.calls() {
            for (var, image) in &call.update {
                out.insert(*var);
                out.extend(image.vars());
            }
        }
        out
    }

    /// Applies a substitution to guard, cost and update images (update
    /// keys are left alone).
    pub fn subst(&self, map: &Subst) -> Rule {
        let rhs = match &self.rhs {
            Rhs::Linear(call) => Rhs::Linear(subst_call(call, map)),
            Rhs::Branch(calls) => {
                Rhs::Branch(calls.iter().map(|c| subst_call(c, map)).collect())
            }
        };
        Rule {
            lhs: self.lhs,
            guard: self.guard.iter().map(|rel| rel.subst(map)).collect(),
            cost: self.cost.subst(map),
            rhs,
        }
    }
}

fn subst_call(call: &RhsCall, map: &Subst) -> RhsCall {
    RhsCall {
        target: call.target,
        update: call
            .update
            .iter()
            .map(|(var, image)| (*var, image.subst(map)))
            .collect(),
    }
}

/// Sequential composition of updates: `(first; second)(v)` is
/// `second(v)` evaluated over the post-state of `first`, extended by
/// `first` on variables `second` leaves alone.
pub fn compose_updates(first: &Update, second: &Update) -> Update {
    let first_subst: Subst = first.iter().map(|(v, e)| (*v, e.clone())).collect();
    let mut composed = Update::new();
    for (var, image) in second {
        composed.insert(*var, image.subst(&first_subst));
    }
    for (var, image) in first {
        if !composed.contains_key(var) {
            composed.insert(*var, image.clone());
        }
    }
    composed
}
