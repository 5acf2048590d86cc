//! Lowering from the parsed dialect into a [`RuleStore`].
//!
//! Function symbols become locations; the argument variables of a symbol's
//! first left-hand side occurrence become its canonical parameters, and a
//! call `g(e₁, …, eₘ)` becomes the update assigning `eᵢ` to `g`'s i-th
//! parameter. Variables not bound by a rule's left-hand side are
//! nondeterministic and are replaced by fresh temporaries, one per rule.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;

use civet_dsl::{CmpAst, CondAst, ExprAst, Program, StartTerm, TermAst};
use civet_expr::{Expr, Rel, VarId};

use crate::rule::{Guard, LocationIdx, Rhs, RhsCall, Rule, Update};
use crate::rule_store::RuleStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoweringError {
    #[error("unknown start symbol '{0}'")]
    UnknownStartSymbol(String),

    #[error("function symbol '{symbol}' used with arity {found}, expected {expected}")]
    ArityMismatch {
        symbol: String,
        expected: usize,
        found: usize,
    },

    #[error("left-hand side of '{symbol}' must apply the symbol to distinct variables")]
    MalformedLhs { symbol: String },
}

/// Escapes a raw dialect name into the identifier alphabet used
/// internally: non-alphanumeric characters become `_`, the letter `I` is
/// rewritten to `Q`, and a leading non-letter is prefixed with `q`.
pub fn escape_name(raw: &str) -> String {
    let escaped: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let escaped = escaped.replace('I', "Q");
    match escaped.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => escaped,
        _ => format!("q{escaped}"),
    }
}

struct LocationData {
    idx: LocationIdx,
    params: Vec<VarId>,
}

/// Converts a parsed program into a rule store.
pub fn lower(program: &Program) -> Result<RuleStore, LoweringError> {
    let mut store = RuleStore::new();
    let mut locations: IndexMap<String, LocationData> = IndexMap::new();

    for declared in &program.declared_vars {
        let name = escape_name(declared);
        if store.vars().find(&name).is_none() {
            store.vars_mut().add_fresh_variable(&name);
        }
    }

    // Left-hand sides fix each symbol's canonical parameters.
    for decl in &program.rules {
        register_lhs(&mut store, &mut locations, &decl.lhs)?;
    }
    // Symbols only ever called get fresh parameters of their own.
    for decl in &program.rules {
        for term in &decl.rhs {
            register_rhs_only(&mut store, &mut locations, term)?;
        }
    }

    for decl in &program.rules {
        let rule = lower_rule(&mut store, &locations, decl)?;
        store.add_rule(rule);
    }

    let initial = match &program.start {
        StartTerm::FunctionSymbol(name) => {
            let escaped = escape_name(name);
            locations
                .get(&escaped)
                .map(|data| data.idx)
                .ok_or(LoweringError::UnknownStartSymbol(escaped))?
        }
        StartTerm::ConstructorBased | StartTerm::Unspecified => match program.rules.first() {
            Some(first) => locations[&escape_name(&first.lhs.name)].idx,
            None => store.add_named_location("start"),
        },
    };
    store.set_initial_location(initial);
    Ok(store)
}

fn register_lhs(
    store: &mut RuleStore,
    locations: &mut IndexMap<String, LocationData>,
    lhs: &TermAst,
) -> Result<(), LoweringError> {
    let name = escape_name(&lhs.name);
    if let Some(data) = locations.get(&name) {
        if data.params.len() != lhs.args.len() {
            return Err(LoweringError::ArityMismatch {
                symbol: name,
                expected: data.params.len(),
                found: lhs.args.len(),
            });
        }
        return Ok(());
    }

    let mut params = Vec::with_capacity(lhs.args.len());
    let mut seen = Vec::new();
    for arg in &lhs.args {
        let ExprAst::Var(raw) = arg else {
            return Err(LoweringError::MalformedLhs {
                symbol: name.clone(),
            });
        };
        let var_name = escape_name(raw);
        if seen.contains(&var_name) {
            return Err(LoweringError::MalformedLhs {
                symbol: name.clone(),
            });
        }
        seen.push(var_name.clone());
        let var = match store.vars().find(&var_name) {
            Some(var) if !store.vars().is_temp(var) => var,
            _ => store.vars_mut().add_fresh_variable(&var_name),
        };
        params.push(var);
    }
    let idx = store.add_named_location(name.clone());
    locations.insert(name, LocationData { idx, params });
    Ok(())
}

fn register_rhs_only(
    store: &mut RuleStore,
    locations: &mut IndexMap<String, LocationData>,
    term: &TermAst,
) -> Result<(), LoweringError> {
    let name = escape_name(&term.name);
    if let Some(data) = locations.get(&name) {
        if data.params.len() != term.args.len() {
            return Err(LoweringError::ArityMismatch {
                symbol: name,
                expected: data.params.len(),
                found: term.args.len(),
            });
        }
        return Ok(());
    }
    let params = (0..term.args.len())
        .map(|_| store.vars_mut().add_fresh_variable("arg"))
        .collect();
    let idx = store.add_named_location(name.clone());
    locations.insert(name, LocationData { idx, params });
    Ok(())
}

fn lower_rule(
    store: &mut RuleStore,
    locations: &IndexMap<String, LocationData>,
    decl: &civet_dsl::RuleDecl,
) -> Result<Rule, LoweringError> {
    let lhs_data = &locations[&escape_name(&decl.lhs.name)];

    // Bind this rule's lhs variable names to the symbol's canonical
    // parameters; everything else resolves to a fresh temporary.
    let mut env: HashMap<String, VarId> = HashMap::new();
    for (arg, param) in decl.lhs.args.iter().zip(&lhs_data.params) {
        let ExprAst::Var(raw) = arg else {
            unreachable!("checked during registration");
        };
        env.insert(escape_name(raw), *param);
    }

    let mut resolver = Resolver { env, store };

    let mut guard: Guard = decl
        .guard
        .iter()
        .map(|cond| resolver.cond(cond))
        .collect();

    let cost = match &decl.cost {
        Some(ast) => {
            let cost = resolver.expr(ast);
            // User-specified costs must be positive for the rule to fire.
            guard.push(Rel::gt(cost.clone(), Expr::zero()));
            cost
        }
        None => Expr::one(),
    };

    let mut calls = Vec::with_capacity(decl.rhs.len());
    for term in &decl.rhs {
        let target = &locations[&escape_name(&term.name)];
        if target.params.len() != term.args.len() {
            return Err(LoweringError::ArityMismatch {
                symbol: escape_name(&term.name),
                expected: target.params.len(),
                found: term.args.len(),
            });
        }
        let mut update = Update::new();
        for (param, arg) in target.params.iter().zip(&term.args) {
            let image = resolver.expr(arg);
            if image != Expr::var(*param) {
                update.insert(*param, image);
            }
        }
        calls.push(RhsCall {
            target: target.idx,
            update,
        });
    }

    Ok(Rule::new(lhs_data.idx, guard, cost, Rhs::branch(calls)))
}

struct Resolver<'a> {
    env: HashMap<String, VarId>,
    store: &'a mut RuleStore,
}

impl Resolver<'_> {
    fn var(&mut self, raw: &str) -> VarId {
        let name = escape_name(raw);
        if let Some(var) = self.env.get(&name) {
            return *var;
        }
        let temp = self.store.vars_mut().add_fresh_temporary_variable(&name);
        self.env.insert(name, temp);
        temp
    }

    fn expr(&mut self, ast: &ExprAst) -> Expr {
        match ast {
            ExprAst::Num(n) => Expr::int(*n),
            ExprAst::Var(raw) => Expr::var(self.var(raw)),
            ExprAst::Neg(inner) => self.expr(inner).neg(),
            ExprAst::Add(lhs, rhs) => self.expr(lhs).plus(self.expr(rhs)),
            ExprAst::Sub(lhs, rhs) => self.expr(lhs).minus(self.expr(rhs)),
            ExprAst::Mul(lhs, rhs) => self.expr(lhs).times(self.expr(rhs)),
            ExprAst::Pow(base, exp) => Expr::pow(self.expr(base), self.expr(exp)),
        }
    }

    fn cond(&mut self, cond: &CondAst) -> Rel {
        let lhs = self.expr(&cond.lhs);
        let rhs = self.expr(&cond.rhs);
        match cond.op {
            CmpAst::Eq => Rel::eq(lhs, rhs),
            CmpAst::Lt => Rel::lt(lhs, rhs),
            CmpAst::Le => Rel::le(lhs, rhs),
            CmpAst::Gt => Rel::gt(lhs, rhs),
            CmpAst::Ge => Rel::ge(lhs, rhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civet_expr::RelOp;

    fn lower_source(src: &str) -> RuleStore {
        let program = civet_dsl::parse(src, "test.its").expect("parse");
        lower(&program).expect("lower")
    }

    #[test]
    fn escaping_rewrites_hostile_names() {
        assert_eq!(escape_name("f"), "f");
        assert_eq!(escape_name("eval'1"), "eval_1");
        assert_eq!(escape_name("42start"), "q42start");
        assert_eq!(escape_name("I"), "Q");
        assert_eq!(escape_name("_f"), "q_f");
    }

    #[test]
    fn lowers_the_canonical_loop() {
        let store = lower_source(
            r#"
            (GOAL COMPLEXITY)
            (STARTTERM (FUNCTIONSYMBOLS start))
            (VAR x)
            (RULES
              start(x) -> f(x)
              f(x) -> f(x - 1) [ x > 0 ]
            )
            "#,
        );
        assert_eq!(store.locations().len(), 2);
        assert_eq!(store.location_name(store.initial_location()), "start");
        assert_eq!(store.rule_count(), 2);
        assert!(store.is_linear());

        let x = store.vars().find("x").expect("program variable");
        assert!(!store.vars().is_temp(x));

        let loop_idx = store.rules_from(store.initial_location())[0];
        let loop_rule = store.rule(store.rules_from(store.rule(loop_idx).linear_target().unwrap())[0]);
        assert!(loop_rule.is_simple_loop());
        assert_eq!(loop_rule.cost, Expr::one());
        assert_eq!(loop_rule.guard.len(), 1);
        assert_eq!(loop_rule.guard[0].op, RelOp::Gt);
        let update = loop_rule.linear_update().unwrap();
        assert!(update[&x].equals_mod_arith(&Expr::var(x).minus(Expr::one())));
    }

    #[test]
    fn user_costs_append_a_positivity_constraint() {
        let store = lower_source("(GOAL COMPLEXITY) (RULES f(x) -{ x }> g(x))");
        let idx = store.rules_from(store.initial_location())[0];
        let rule = store.rule(idx);
        let x = store.vars().find("x").unwrap();
        assert_eq!(rule.cost, Expr::var(x));
        assert_eq!(rule.guard.len(), 1);
        assert_eq!(rule.guard[0], Rel::gt(Expr::var(x), Expr::zero()));
    }

    #[test]
    fn unbound_right_hand_side_variables_become_temporaries() {
        let store = lower_source("(GOAL COMPLEXITY) (RULES f(x) -> f(fresh))");
        let fresh = store.vars().find("fresh").expect("temp variable");
        assert!(store.vars().is_temp(fresh));
    }

    #[test]
    fn left_hand_sides_unify_onto_canonical_parameters() {
        let store = lower_source(
            r#"
            (GOAL COMPLEXITY)
            (RULES
              f(A) -> f(A - 1) [ A > 0 ]
              f(B) -> g(B + 1)
            )
            "#,
        );
        let a = store.vars().find("A").expect("canonical parameter");
        assert!(store.vars().find("B").is_none());
        let rules: Vec<_> = store.rules_from(store.initial_location());
        let second = store.rule(rules[1]);
        let update = second.linear_update().unwrap();
        assert!(update[&a].equals_mod_arith(&Expr::var(a).plus(Expr::one())));
    }

    #[test]
    fn trivial_self_assignments_are_stripped_from_updates() {
        let store = lower_source("(GOAL COMPLEXITY) (RULES f(x, y) -> f(x, y - 1))");
        let idx = store.rules_from(store.initial_location())[0];
        let update = store.rule(idx).linear_update().unwrap();
        assert_eq!(update.len(), 1);
    }

    #[test]
    fn branching_rules_lower_to_branch_rhs() {
        let store =
            lower_source("(GOAL COMPLEXITY) (RULES f(x) -> Com_2(f(x - 1), f(x - 2)) [ x > 1 ])");
        let idx = store.rules_from(store.initial_location())[0];
        assert!(!store.rule(idx).is_linear());
        assert_eq!(store.rule(idx).rhs.calls().len(), 2);
        assert!(!store.is_linear());
    }

    #[test]
    fn unknown_start_symbols_are_rejected() {
        let program = civet_dsl::parse(
            "(GOAL COMPLEXITY) (STARTTERM (FUNCTIONSYMBOLS nope)) (RULES f(x) -> f(x))",
            "test.its",
        )
        .unwrap();
        assert!(matches!(
            lower(&program),
            Err(LoweringError::UnknownStartSymbol(name)) if name == "nope"
        ));
    }

    #[test]
    fn empty_rule_sections_still_produce_an_initial_location() {
        let store = lower_source("(GOAL COMPLEXITY) (RULES )");
        assert!(store.is_empty());
    }
}
