//! Boundary behaviors of the driver: empty problems, single rules,
//! acceleration failures, timeout handling, and the invariants the
//! simplification must maintain.

use civet_engine::{analyze, analyze_with_timeouts, AnalysisSettings, Timeouts};
use civet_expr::Complexity;
use civet_ir::RuleStore;

fn lower_source(source: &str) -> RuleStore {
    let program = civet_dsl::parse(source, "test.its").expect("parse");
    civet_ir::lower(&program).expect("lower")
}

#[test]
fn empty_problem_yields_the_trivial_constant_bound() {
    let mut store = lower_source("(GOAL COMPLEXITY) (RULES )");
    let outcome = analyze(&mut store, AnalysisSettings::default());
    assert_eq!(outcome.runtime.cpx, Complexity::Const);
    assert!(outcome.runtime.bound.equals_mod_arith(&civet_expr::Expr::one()));
    assert!(outcome.runtime.guard.is_empty());
}

#[test]
fn single_rule_without_loops_is_constant() {
    let mut store = lower_source(
        "(GOAL COMPLEXITY) (STARTTERM (FUNCTIONSYMBOLS start)) (RULES start(x) -> sink(x))",
    );
    let outcome = analyze(&mut store, AnalysisSettings::default());
    assert_eq!(outcome.runtime.cpx, Complexity::Const);
}

#[test]
fn plain_doubling_loop_fails_acceleration_and_falls_back() {
    // x <- 2x under x > 0 admits no affine metering function; with no
    // other simplification available the result degrades to the trivial
    // constant bound.
    let mut store = lower_source(
        r#"
        (GOAL COMPLEXITY)
        (VAR x)
        (RULES l(x) -> l(2 * x) [ x > 0 ])
        "#,
    );
    let outcome = analyze(&mut store, AnalysisSettings::default());
    assert_eq!(outcome.runtime.cpx, Complexity::Const);
}

#[test]
fn initial_location_with_incoming_rules_gets_a_fresh_start() {
    // The initial location sits on a loop, so the driver must introduce
    // a stand-in without incoming rules before simplifying.
    let mut store = lower_source(
        r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS f))
        (VAR x)
        (RULES
          f(x) -> g(x - 1) [ x > 0 ]
          g(x) -> f(x)
        )
        "#,
    );
    let outcome = analyze(&mut store, AnalysisSettings::default());
    assert!(!store.has_rules_to(store.initial_location()));
    assert!(outcome.runtime.cpx >= Complexity::Const);
}

#[test]
fn expired_soft_budget_still_produces_a_result() {
    let mut store = lower_source(
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
    let outcome = analyze_with_timeouts(
        &mut store,
        AnalysisSettings::default(),
        Timeouts::already_expired(),
    );
    // Nothing was simplified, but the extractor must still report at
    // least the best individual rule class present at the timeout.
    assert!(outcome.runtime.cpx >= Complexity::Const);
    assert!(outcome.proof.contains("partial result"));
}

#[test]
fn partial_extraction_chains_from_the_start_to_find_loop_costs() {
    // An accelerated rule is already present when the budget expires;
    // chaining from the start must surface its non-constant cost even
    // without running the full fixpoint.
    let mut store = lower_source(
        r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x y)
        (RULES
          start(x, y) -{ x }> mid(x, y) [ x > 0 ]
          mid(x, y) -{ x * y }> sink(x, y) [ y > 0 ]
        )
        "#,
    );
    let outcome = analyze_with_timeouts(
        &mut store,
        AnalysisSettings::default(),
        Timeouts::already_expired(),
    );
    // The x·y rule is reachable after one level of chaining from start.
    assert_eq!(outcome.runtime.cpx, Complexity::Poly(2));
}

#[test]
fn fully_simplified_stores_have_no_non_initial_outgoing_rules() {
    let mut store = lower_source(
        r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x)
        (RULES
          start(x) -> f(x)
          f(x) -> f(x - 1) [ x > 0 ]
          f(x) -> sink(x) [ x <= 0 ]
        )
        "#,
    );
    analyze(&mut store, AnalysisSettings::default());
    for loc in store.locations() {
        if !store.is_initial_location(loc) {
            assert!(
                !store.has_rules_from(loc),
                "location {} still has outgoing rules",
                store.location_name(loc)
            );
        }
    }
}

#[test]
fn disabling_preprocessing_does_not_change_the_class() {
    let source = r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x)
        (RULES
          start(x) -> f(x)
          f(x) -> f(x - 1) [ x > 0 && x > 0 ]
        )
    "#;
    let mut with = lower_source(source);
    let with_outcome = analyze(&mut with, AnalysisSettings::default());
    let mut without = lower_source(source);
    let without_outcome = analyze(
        &mut without,
        AnalysisSettings {
            do_preprocessing: false,
            ..AnalysisSettings::default()
        },
    );
    assert_eq!(with_outcome.runtime.cpx, without_outcome.runtime.cpx);
    assert_eq!(with_outcome.runtime.cpx, Complexity::Poly(1));
}
