//! The top-level fixpoint driver: interleaves pruning, simple-loop
//! acceleration and chaining until only rules leaving the initial
//! location remain (or the time budget runs out), then extracts the
//! maximum complexity among the surviving rules.

use std::collections::BTreeSet;

use civet_expr::{Complexity, Expr};
use civet_ir::{export, LocationIdx, Rule, RuleStore, RuntimeResult};

use crate::accel;
use crate::asymptotic;
use crate::chain;
use crate::preprocess;
use crate::proof::ProofLog;
use crate::prune;
use crate::settings::AnalysisSettings;
use crate::timeout::Timeouts;

/// Everything a run produces besides the mutated store: the result, the
/// proof log, and the optional export artifacts.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub runtime: RuntimeResult,
    pub proof: String,
    pub dot: Option<String>,
    pub simplified: Option<String>,
    pub smt_dumps: Vec<String>,
}

/// Analyzes the store under the given settings.
pub fn analyze(store: &mut RuleStore, settings: AnalysisSettings) -> AnalysisOutcome {
    let timeouts = Timeouts::from_settings(&settings);
    Analysis::new(store, settings, timeouts).run()
}

/// Like [`analyze`], with externally constructed deadlines. Used by tests
/// to drive the partial-result path deterministically.
pub fn analyze_with_timeouts(
    store: &mut RuleStore,
    settings: AnalysisSettings,
    timeouts: Timeouts,
) -> AnalysisOutcome {
    Analysis::new(store, settings, timeouts).run()
}

pub struct Analysis<'a> {
    store: &'a mut RuleStore,
    settings: AnalysisSettings,
    timeouts: Timeouts,
    proof: ProofLog,
    dot: String,
    dot_counter: usize,
    simplified: Option<String>,
    smt_dumps: Vec<String>,
}

impl<'a> Analysis<'a> {
    fn new(store: &'a mut RuleStore, settings: AnalysisSettings, timeouts: Timeouts) -> Self {
        Analysis {
            store,
            settings,
            timeouts,
            proof: ProofLog::new(),
            dot: String::new(),
            dot_counter: 0,
            simplified: None,
            smt_dumps: Vec::new(),
        }
    }

    fn snapshot(&mut self, label: &str) {
        self.proof.block(&export::print_for_proof(self.store));
        if self.settings.dot_output {
            self.dot
                .push_str(&export::print_dot_subgraph(self.store, self.dot_counter, label));
            self.dot_counter += 1;
        }
    }

    fn fully_simplified(&self) -> bool {
        self.store
            .locations()
            .into_iter()
            .filter(|loc| !self.store.is_initial_location(*loc))
            .all(|loc| !self.store.has_rules_from(loc))
    }

    /// Gives the initial location a fresh, incoming-free stand-in when
    /// rules point back at it.
    fn ensure_proper_initial_location(&mut self) -> bool {
        let initial = self.store.initial_location();
        if !self.store.has_rules_to(initial) {
            return false;
        }
        let fresh = self.store.add_location();
        self.store.add_rule(Rule::dummy(fresh, initial));
        self.store.set_initial_location(fresh);
        true
    }

    fn preprocess_rules(&mut self) -> bool {
        let mut changed = prune::remove_leafs_and_unreachable(self.store);
        for loc in self.store.locations() {
            for idx in self.store.rules_from(loc) {
                if self.timeouts.soft() {
                    return changed;
                }
                let mut rule = self.store.rule(idx).clone();
                let mut rule_changed = false;
                if self.settings.eliminate_cost_constraints {
                    rule_changed |=
                        preprocess::try_to_remove_cost(self.store.vars(), &mut rule.guard);
                }
                rule_changed |= preprocess::simplify_rule(self.store.vars(), &mut rule);
                if rule_changed {
                    self.store.replace_rule(idx, rule);
                    changed = true;
                }
            }
        }
        for loc in self.store.locations() {
            for succ in self.store.successor_locations(loc) {
                if self.timeouts.soft() {
                    return changed;
                }
                let between = self.store.rules_between(loc, succ);
                changed |= prune::remove_duplicate_rules(self.store, &between, true);
            }
        }
        changed
    }

    fn accelerate_simple_loops(
        &mut self,
        accelerated: &mut BTreeSet<civet_ir::RuleIdx>,
    ) -> bool {
        let mut changed = false;
        for loc in self.store.locations() {
            changed |= accel::accelerate_simple_loops(
                self.store,
                loc,
                &self.settings,
                &self.timeouts,
                accelerated,
                &mut self.smt_dumps,
            );
            if self.timeouts.soft() {
                return changed;
            }
        }
        changed
    }

    fn prune_rules(&mut self) -> bool {
        let mut changed = prune::remove_leafs_and_unreachable(self.store);
        if cfg!(feature = "pruning") {
            changed |= prune::prune_parallel_rules(self.store, &self.settings);
        }
        changed
    }

    pub fn run(mut self) -> AnalysisOutcome {
        self.proof.section("Pre-processing the ITS problem");
        self.proof.headline("Initial problem");
        self.snapshot("Initial");

        if self.ensure_proper_initial_location() {
            self.proof
                .headline("Added a fresh start location (such that it has no incoming rules):");
            self.snapshot("Fresh start");
        }

        if prune::remove_unsat_initial_rules(self.store) {
            self.proof.headline("Removed unsatisfiable initial rules:");
            self.snapshot("Reduced initial");
        }

        let mut runtime = RuntimeResult::default();

        if self.store.is_empty() {
            self.proof
                .headline("The problem has no rules leaving the initial location.");
            return self.finalize(runtime);
        }

        if self.settings.do_preprocessing && self.preprocess_rules() {
            self.proof.headline("Simplified all rules, resulting in:");
            self.snapshot("Simplify");
        }

        self.proof
            .section("Simplification by acceleration and chaining");

        let mut accelerated_once = false;
        let mut nonlinear = !self.store.is_linear();

        'outer: while !self.fully_simplified() {
            // Repeat linear chaining and simple loop acceleration.
            loop {
                let mut changed = false;

                if nonlinear && prune::remove_sink_rhss(self.store) {
                    changed = true;
                    self.proof.headline(
                        "Removed locations with no outgoing rules from right-hand sides:",
                    );
                    self.snapshot("Removed sinks");
                }
                if self.timeouts.soft() {
                    break 'outer;
                }

                let mut accel_set = BTreeSet::new();
                if self.accelerate_simple_loops(&mut accel_set) {
                    changed = true;
                    accelerated_once = true;
                    self.proof.headline(
                        "Accelerated all simple loops using metering functions (where possible):",
                    );
                    self.snapshot("Accelerate simple loops");
                }
                if self.timeouts.soft() {
                    break 'outer;
                }

                // Incoming rules are kept: consuming them would drop the
                // zero-iteration paths past a loop and lose compositions
                // like the nested-loop quadratic (see DESIGN.md).
                if chain::chain_accelerated_rules(self.store, &accel_set, true) {
                    changed = true;
                    self.proof
                        .headline("Chained accelerated rules (with incoming rules):");
                    self.snapshot("Chain accelerated rules");
                }
                if self.timeouts.soft() {
                    break 'outer;
                }

                if prune::remove_leafs_and_unreachable(self.store) {
                    changed = true;
                    self.proof.headline(
                        "Removed unreachable locations (and leaf rules with constant cost):",
                    );
                    self.snapshot("Remove unreachable");
                }
                if self.timeouts.soft() {
                    break 'outer;
                }

                if chain::chain_linear_paths(self.store) {
                    changed = true;
                    self.proof.headline("Eliminated locations (on linear paths):");
                    self.snapshot("Chain linear paths");
                }
                if self.timeouts.soft() {
                    break 'outer;
                }

                if changed && nonlinear {
                    nonlinear = !self.store.is_linear();
                    if !nonlinear {
                        self.proof.section(
                            "Obtained a tail recursive problem, continuing simplification",
                        );
                    }
                }
                if !changed {
                    break;
                }
            }

            // Avoid wasting time on chaining/pruning if we are done.
            if self.fully_simplified() {
                break;
            }

            // More involved strategies once the cheap ones stall.
            if chain::chain_tree_paths(self.store, &self.settings) {
                self.proof
                    .headline("Eliminated locations (on tree-shaped paths):");
                self.snapshot("Chain tree paths");
            } else if let Some(name) = chain::eliminate_a_location(self.store, &self.settings) {
                self.proof
                    .headline(&format!("Eliminated location {name} (as a last resort):"));
                self.snapshot("Eliminate location");
            } else {
                // Nothing makes progress anymore; report what is there.
                self.proof
                    .warning("Simplification stalled, reporting a partial result");
                break;
            }
            if self.timeouts.soft() {
                break;
            }

            // Rule explosion guard; complexities are only meaningful after
            // the first acceleration.
            if accelerated_once && self.prune_rules() {
                self.proof
                    .headline("Applied pruning (of leafs and parallel rules):");
                self.snapshot("Prune");
            }
            if self.timeouts.soft() {
                break;
            }
        }

        if self.timeouts.soft() {
            self.proof.warning("Aborted due to lack of remaining time");
        }

        if self.fully_simplified() {
            // Updates are irrelevant for the asymptotic check of the
            // surviving rules.
            let initial_rules = self.store.rules_from(self.store.initial_location());
            prune::remove_duplicate_rules(self.store, &initial_rules, false);
        }

        if self.settings.print_simplified_as_input_format {
            let rendered = export::print_koat(self.store);
            self.proof.headline("Fully simplified program in input format:");
            self.proof.block(&rendered);
            self.simplified = Some(rendered);
        }

        self.proof.section("Computing asymptotic complexity");
        self.proof.headline("Fully simplified ITS problem");
        self.snapshot("Final");

        if !self.fully_simplified() {
            self.proof
                .warning("This is only a partial result (probably due to a timeout).");
            self.proof
                .line("Trying to find the maximal complexity that has already been derived.");

            // Cut down the rule count before any further prover calls.
            self.remove_constant_paths();
            self.proof
                .headline("Removed rules with constant/unknown complexity:");
            self.snapshot("Removed constant");

            runtime = self.max_partial_result();
        } else {
            runtime = self.max_runtime();
        }

        self.finalize(runtime)
    }

    fn finalize(mut self, mut runtime: RuntimeResult) -> AnalysisOutcome {
        // The graph was non-empty, so O(1) is always witnessed.
        if runtime.cpx == Complexity::Unknown {
            runtime.cpx = Complexity::Const;
            runtime.bound = Expr::one();
            runtime.reduced_cpx = Complexity::Const;
            runtime.guard.clear();
        }

        self.proof.section("Result");
        self.proof
            .line(format!("Final complexity: {}", runtime.cpx));
        self.proof.line(format!(
            "Cost bound: {}",
            runtime.bound.display(self.store.vars())
        ));

        let dot = if self.settings.dot_output {
            let mut out = String::from("digraph {\n");
            out.push_str(&self.dot);
            out.push_str(&export::print_dot_text(
                self.dot_counter,
                &runtime.cpx.to_string(),
            ));
            out.push_str("}\n");
            Some(out)
        } else {
            None
        };

        AnalysisOutcome {
            runtime,
            proof: self.proof.render(),
            dot,
            simplified: self.simplified,
            smt_dumps: self.smt_dumps,
        }
    }

    /// Greatest structural cost estimate among the given rules; used when
    /// the asymptotic check is compiled out.
    fn max_complexity_estimate(&self, rules: &[civet_ir::RuleIdx]) -> RuntimeResult {
        let mut res = RuntimeResult::default();
        for idx in rules {
            let rule = self.store.rule(*idx);
            let cpx = rule.cost.complexity();
            if cpx > res.cpx {
                res.cpx = cpx;
                res.reduced_cpx = cpx;
                res.bound = rule.cost.clone();
                res.guard = rule.guard.clone();
            }
        }
        res
    }

    /// Maximum certified complexity among the initial location's rules.
    fn max_runtime(&mut self) -> RuntimeResult {
        let rules = self.store.rules_from(self.store.initial_location());

        if !cfg!(feature = "asymptotic-check") {
            self.proof
                .warning("The asymptotic check is disabled, the result might be unsound!");
            return self.max_complexity_estimate(&rules);
        }

        let mut res = RuntimeResult::default();
        for idx in rules {
            let rule = self.store.rule(idx);
            // The structural estimate is an upper bound, so rules that
            // cannot beat the current best are skipped. Temporaries may
            // hide unbounded cost and disable the shortcut.
            let upper = rule.cost.complexity();
            let has_temp =
                !rule.cost.is_infty() && self.store.vars().contains_temp(&rule.cost.vars());
            if upper <= res.cpx && !has_temp {
                self.proof.line(format!(
                    "Skipping rule {} since it cannot improve the complexity",
                    idx.0
                ));
                continue;
            }

            self.proof.headline(&format!(
                "Computing asymptotic complexity for rule {}",
                idx.0
            ));
            let check =
                asymptotic::determine_complexity(self.store.vars(), &rule.guard, &rule.cost, true);
            self.proof.line(format!(
                "Resulting cost {} has complexity {}",
                check.cost.display(self.store.vars()),
                check.cpx
            ));

            if check.cpx > res.cpx {
                self.proof
                    .line(format!("Found new complexity {}, because: {}.", check.cpx, check.reason));
                res.cpx = check.cpx;
                res.bound = check.cost;
                res.reduced_cpx = check.reduced_cpx;
                res.guard = self.store.rule(idx).guard.clone();
                if res.cpx >= Complexity::Infty {
                    break;
                }
            }
            if self.timeouts.hard() {
                break;
            }
        }
        res
    }

    /// Deletes constant-cost rules entering locations from which only
    /// constant-or-unknown cost is reachable.
    fn remove_constant_paths(&mut self) {
        let initial = self.store.initial_location();
        let mut visited = BTreeSet::new();
        self.remove_constant_paths_impl(initial, &mut visited);
    }

    fn remove_constant_paths_impl(
        &mut self,
        current: LocationIdx,
        visited: &mut BTreeSet<LocationIdx>,
    ) -> bool {
        if !visited.insert(current) {
            // Already seen: cut transitions forming a loop.
            return true;
        }
        for next in self.store.successor_locations(current) {
            if self.timeouts.hard() {
                return false;
            }
            if self.remove_constant_paths_impl(next, visited) {
                for idx in self.store.rules_between(current, next) {
                    if self.store.rule(idx).cost.complexity() <= Complexity::Const {
                        self.store.remove_rule(idx);
                    }
                }
            }
        }
        !self.store.has_rules_from(current)
    }

    /// Post-timeout fallback: alternately scan the initial rules for the
    /// best certified complexity and contract one level of the graph by
    /// chaining from the start.
    fn max_partial_result(&mut self) -> RuntimeResult {
        let mut res = RuntimeResult::default();
        let initial = self.store.initial_location();
        // Each level consumes the initial rules, so the depth of the
        // remaining graph bounds useful iterations.
        let max_levels = self.store.locations().len().max(16) * 4;

        for _level in 0..max_levels {
            if self.timeouts.hard() {
                self.proof.line("Aborting due to timeout");
                return res;
            }

            for idx in self.store.rules_from(initial) {
                let rule = self.store.rule(idx);
                let has_temp = !rule.cost.is_infty()
                    && self.store.vars().contains_temp(&rule.cost.vars());
                if rule.cost.complexity() <= res.cpx.max(Complexity::Const) && !has_temp {
                    continue;
                }
                let check = asymptotic::determine_complexity(
                    self.store.vars(),
                    &rule.guard,
                    &rule.cost,
                    true,
                );
                if check.cpx > res.cpx {
                    self.proof.line(format!(
                        "Found new complexity {}, because: {}.",
                        check.cpx, check.reason
                    ));
                    res.cpx = check.cpx;
                    res.bound = check.cost;
                    res.reduced_cpx = check.reduced_cpx;
                    res.guard = self.store.rule(idx).guard.clone();
                    if res.cpx >= Complexity::Infty {
                        return res;
                    }
                }
                if self.timeouts.hard() {
                    return res;
                }
            }

            let succs = self.store.successor_locations(initial);
            if succs.is_empty() {
                return res;
            }
            for succ in succs {
                for first in self.store.rules_between(initial, succ) {
                    // A branching rule shows up once per successor it
                    // calls but is spent after the first pass.
                    if !self.store.has_rule(first) {
                        continue;
                    }
                    for second in self.store.rules_from(succ) {
                        if first == second {
                            continue;
                        }
                        let chained = chain::chain_rules(
                            self.store,
                            self.store.rule(first),
                            self.store.rule(second),
                        );
                        if let Some(rule) = chained {
                            self.store.add_rule(rule);
                        }
                        if self.timeouts.hard() {
                            return res;
                        }
                    }
                    // Its complexity was extracted above; the rule is spent.
                    self.store.remove_rule(first);
                }
            }
            self.proof
                .headline("Performed chaining from the start location:");
            self.snapshot("Chaining from start");
        }
        res
    }
}
