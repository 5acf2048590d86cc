//! End-to-end analyses of small problems, from source text through
//! lowering, simplification and complexity extraction.

use civet_engine::{analyze, AnalysisOutcome, AnalysisSettings};
use civet_expr::Complexity;
use civet_ir::RuleStore;

fn load_demo(name: &str) -> String {
    let path = format!("{}/../../demos/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {path}: {e}"))
}

fn analyze_source(source: &str) -> (AnalysisOutcome, RuleStore) {
    let program = civet_dsl::parse(source, "test.its").expect("parse");
    let mut store = civet_ir::lower(&program).expect("lower");
    let outcome = analyze(&mut store, AnalysisSettings::default());
    (outcome, store)
}

#[test]
fn constant_chain_reports_constant_complexity() {
    let (outcome, _) = analyze_source(&load_demo("constant.its"));
    assert_eq!(outcome.runtime.cpx, Complexity::Const);
    // The witnessed bound is a positive constant; the exact value has
    // been absorbed by constant-leaf pruning.
    let bound = outcome.runtime.bound.as_poly().expect("constant bound");
    assert!(bound.as_const().expect("constant") >= 1.into());
}

#[test]
fn counting_loop_is_linear() {
    let (outcome, store) = analyze_source(&load_demo("linear_loop.its"));
    assert_eq!(outcome.runtime.cpx, Complexity::Poly(1));
    let x = store.vars().find("x").expect("program variable");
    assert!(outcome.runtime.bound.vars().contains(&x));
}

#[test]
fn nested_loops_are_quadratic() {
    let (outcome, _) = analyze_source(&load_demo("nested_loops.its"));
    assert_eq!(outcome.runtime.cpx, Complexity::Poly(2));
}

#[test]
fn doubling_loop_with_upper_bound_falls_back_to_constant() {
    // No affine metering function exists without a lower bound on x, so
    // acceleration fails and the stalled analysis reports the trivial
    // bound.
    let (outcome, _) = analyze_source(
        r#"
        (GOAL COMPLEXITY)
        (VAR x n)
        (RULES
          l(x, n) -> l(2 * x + 1, n) [ x < n ]
        )
        "#,
    );
    assert_eq!(outcome.runtime.cpx, Complexity::Const);
}

#[test]
fn doubling_loop_with_lower_bound_accelerates() {
    // With 0 <= x < n the difference n - x meters the loop (a coarse but
    // sound bound; the engine does not attempt logarithmic classes), and
    // the iterated update is a closed exponential form. The surviving
    // cost is at least linear in n.
    let (outcome, _) = analyze_source(
        r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x n)
        (RULES
          start(x, n) -> l(0, n)
          l(x, n) -> l(2 * x + 1, n) [ x < n && x >= 0 ]
        )
        "#,
    );
    assert!(outcome.runtime.cpx >= Complexity::Poly(1));
}

#[test]
fn unreachable_components_do_not_affect_the_result() {
    let connected = r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x)
        (RULES
          start(x) -> f(x)
          f(x) -> f(x - 1) [ x > 0 ]
        )
    "#;
    let with_island = r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x)
        (RULES
          start(x) -> f(x)
          f(x) -> f(x - 1) [ x > 0 ]
          island(x) -> island(x * x) [ x > 1 ]
        )
    "#;
    let (base, _) = analyze_source(connected);
    let (extended, _) = analyze_source(with_island);
    assert_eq!(base.runtime.cpx, extended.runtime.cpx);
    assert_eq!(base.runtime.cpx, Complexity::Poly(1));
}

#[test]
fn unbounded_temporary_cost_is_infinite() {
    // The rule's cost is a fresh nondeterministic value with no bound in
    // the guard, so no finite class covers it.
    let (outcome, _) = analyze_source(
        r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x)
        (RULES
          start(x) -{ fresh }> sink(x) [ fresh > 0 ]
        )
        "#,
    );
    assert_eq!(outcome.runtime.cpx, Complexity::Infty);
}

#[test]
fn branching_recursion_is_simplified_to_the_initial_location() {
    let (outcome, _) = analyze_source(
        r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x)
        (RULES
          start(x) -> f(x)
          f(x) -> Com_2(g(x - 1), g(x - 2)) [ x > 1 ]
          g(x) -> g(x - 1) [ x > 0 ]
        )
        "#,
    );
    // Both branches run a linear loop.
    assert!(outcome.runtime.cpx >= Complexity::Poly(1));
}

#[test]
fn proof_log_documents_the_pipeline_stages() {
    let (outcome, _) = analyze_source(&load_demo("linear_loop.its"));
    assert!(outcome.proof.contains("Pre-processing the ITS problem"));
    assert!(outcome
        .proof
        .contains("Simplification by acceleration and chaining"));
    assert!(outcome.proof.contains("Computing asymptotic complexity"));
    assert!(outcome.proof.contains("Final complexity: O(n)"));
}

#[test]
fn dot_output_traces_every_snapshot() {
    let program =
        civet_dsl::parse(&load_demo("linear_loop.its"), "linear_loop.its").expect("parse");
    let mut store = civet_ir::lower(&program).expect("lower");
    let settings = AnalysisSettings {
        dot_output: true,
        ..AnalysisSettings::default()
    };
    let outcome = analyze(&mut store, settings);
    let dot = outcome.dot.expect("dot trace requested");
    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("cluster_0"));
    assert!(dot.ends_with("}\n"));
}

#[test]
fn simplified_export_round_trips_through_the_parser() {
    let program =
        civet_dsl::parse(&load_demo("linear_loop.its"), "linear_loop.its").expect("parse");
    let mut store = civet_ir::lower(&program).expect("lower");
    let settings = AnalysisSettings {
        print_simplified_as_input_format: true,
        ..AnalysisSettings::default()
    };
    let outcome = analyze(&mut store, settings);
    let rendered = outcome.simplified.expect("export requested");
    civet_dsl::parse(&rendered, "simplified.its").expect("reparse simplified output");
}
