//! Rendering of a rule store for proof output, for re-export in the input
//! dialect, and as dot graph snapshots.

use std::fmt::Write;

use civet_expr::VarNames;

use crate::rule::{LocationIdx, Rule};
use crate::rule_store::RuleStore;

/// One line per rule, indented, for the human-readable proof log.
pub fn print_for_proof(store: &RuleStore) -> String {
    let mut out = String::new();
    let initial = store.initial_location();
    let _ = writeln!(out, "Start location: {}", store.location_name(initial));
    for (idx, rule) in store.rules() {
        let _ = writeln!(out, "  {}: {}", idx.0, render_rule(store, rule));
    }
    out
}

/// A rule in `f -> g : updates, [guard], cost` form.
pub fn render_rule(store: &RuleStore, rule: &Rule) -> String {
    let vars = store.vars();
    let mut out = String::new();
    let _ = write!(out, "{} -> ", store.location_name(rule.lhs));
    let targets: Vec<String> = rule
        .rhs
        .calls()
        .iter()
        .map(|call| store.location_name(call.target).to_string())
        .collect();
    let _ = write!(out, "{}", targets.join(","));
    let _ = write!(out, " :");
    for call in rule.rhs.calls() {
        for (var, image) in &call.update {
            let _ = write!(
                out,
                " {}'={}",
                vars.var_name(*var).unwrap_or("?"),
                image.display(vars)
            );
        }
    }
    let guard: Vec<String> = rule
        .guard
        .iter()
        .map(|rel| rel.display(vars).to_string())
        .collect();
    let _ = write!(out, " [{}]", guard.join(" && "));
    let _ = write!(out, ", cost: {}", rule.cost.display(vars));
    out
}

/// The store in the input dialect. Every location is rendered with the
/// full program-variable list as its parameters, which is a faithful if
/// verbose presentation of the lowered semantics.
pub fn print_koat(store: &RuleStore) -> String {
    let vars = store.vars();
    let params: Vec<&str> = vars
        .program_vars()
        .filter_map(|v| vars.var_name(v))
        .collect();
    let mut out = String::new();
    let _ = writeln!(out, "(GOAL COMPLEXITY)");
    let _ = writeln!(
        out,
        "(STARTTERM (FUNCTIONSYMBOLS {}))",
        store.location_name(store.initial_location())
    );
    let _ = writeln!(out, "(VAR {})", params.join(" "));
    let _ = writeln!(out, "(RULES");
    for (_, rule) in store.rules() {
        let lhs_args = params.join(", ");
        let _ = write!(out, "  {}({})", store.location_name(rule.lhs), lhs_args);
        let _ = write!(out, " -{{ {} }}> ", rule.cost.display(vars));

        let calls: Vec<String> = rule
            .rhs
            .calls()
            .iter()
            .map(|call| {
                let args: Vec<String> = vars
                    .program_vars()
                    .map(|v| match call.update.get(&v) {
                        Some(image) => image.display(vars).to_string(),
                        None => vars.var_name(v).unwrap_or("?").to_string(),
                    })
                    .collect();
                format!(
                    "{}({})",
                    store.location_name(call.target),
                    args.join(", ")
                )
            })
            .collect();
        if calls.len() == 1 {
            let _ = write!(out, "{}", calls[0]);
        } else {
            let _ = write!(out, "Com_{}({})", calls.len(), calls.join(", "));
        }

        if rule.guard.is_empty() {
            let _ = writeln!(out, " [ TRUE ]");
        } else {
            let guard: Vec<String> = rule
                .guard
                .iter()
                .map(|rel| rel.display(vars).to_string())
                .collect();
            let _ = writeln!(out, " [ {} ]", guard.join(" && "));
        }
    }
    let _ = writeln!(out, ")");
    out
}

/// A dot subgraph snapshot of the current store, labeled with the
/// transformation step that produced it.
pub fn print_dot_subgraph(store: &RuleStore, step: usize, label: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "subgraph cluster_{step} {{");
    let _ = writeln!(out, "  label=\"{step}: {label}\";");
    for loc in store.locations() {
        if !store.has_rules_from(loc) && !store.has_rules_to(loc) && !store.is_initial_location(loc)
        {
            continue;
        }
        let shape = if store.is_initial_location(loc) {
            "doublecircle"
        } else {
            "circle"
        };
        let _ = writeln!(
            out,
            "  n{step}_{} [label=\"{}\",shape={shape}];",
            loc.0,
            store.location_name(loc)
        );
    }
    for (idx, rule) in store.rules() {
        for call in rule.rhs.calls() {
            let _ = writeln!(
                out,
                "  n{step}_{} -> n{step}_{} [label=\"{}\"];",
                rule.lhs.0, call.target.0, idx.0
            );
        }
    }
    let _ = writeln!(out, "}}");
    out
}

/// Helper shared by the dot trace: a terminal node announcing the result.
pub fn print_dot_text(step: usize, text: &str) -> String {
    format!("subgraph cluster_{step} {{\nlabel=\"{step}: result\";\nresult [label=\"{text}\",shape=box];\n}}\n")
}
