use std::collections::{BTreeMap, BTreeSet};

use crate::rule::{LocationIdx, Rule, RuleIdx};
use crate::variables::VariableSet;

/// The mutable transition graph together with the variable registry and
/// the rule-index allocator.
///
/// Rule indices are allocated monotonically and never reused, so indices
/// also order rules by creation time, which all passes rely on for
/// deterministic iteration. Locations are added but never removed; a
/// location whose rules were all deleted simply becomes an orphan node.
#[derive(Clone, Debug, Default)]
pub struct RuleStore {
    vars: VariableSet,
    location_names: BTreeMap<LocationIdx, String>,
    next_location: u32,
    initial: Option<LocationIdx>,
    rules: BTreeMap<RuleIdx, Rule>,
    next_rule: u32,
    outgoing: BTreeMap<LocationIdx, BTreeSet<RuleIdx>>,
    incoming: BTreeMap<LocationIdx, BTreeSet<RuleIdx>>,
}

impl RuleStore {
    pub fn new() -> Self {
        RuleStore::default()
    }

    pub fn vars(&self) -> &VariableSet {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableSet {
        &mut self.vars
    }

    // ## Locations

    pub fn add_location(&mut self) -> LocationIdx {
        let name = format!("loc{}", self.next_location);
        self.add_named_location(name)
    }

    pub fn add_named_location(&mut self, name: impl Into<String>) -> LocationIdx {
        let idx = LocationIdx(self.next_location);
        self.next_location += 1;
        self.location_names.insert(idx, name.into());
        idx
    }

    pub fn location_name(&self, loc: LocationIdx) -> &str {
        self.location_names
            .get(&loc)
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn locations(&self) -> Vec<LocationIdx> {
        self.location_names.keys().copied().collect()
    }

    pub fn has_location(&self, loc: LocationIdx) -> bool {
        self.location_names.contains_key(&loc)
    }

    pub fn set_initial_location(&mut self, loc: LocationIdx) {
        debug_assert!(self.has_location(loc));
        self.initial = Some(loc);
    }

    pub fn initial_location(&self) -> LocationIdx {
        self.initial.expect("initial location not set")
    }

    pub fn is_initial_location(&self, loc: LocationIdx) -> bool {
        self.initial == Some(loc)
    }

    // ## Rules

    pub fn add_rule(&mut self, rule: Rule) -> RuleIdx {
        debug_assert!(self.has_location(rule.lhs));
        debug_assert!(rule.rhs.calls().iter().all(|c| self.has_location(c.target)));
        let idx = RuleIdx(self.next_rule);
        self.next_rule += 1;
        self.outgoing.entry(rule.lhs).or_default().insert(idx);
        for call in rule.rhs.calls() {
            self.incoming.entry(call.target).or_default().insert(idx);
        }
        self.rules.insert(idx, rule);
        idx
    }

    /// Removes a rule. Removing an index twice is a programmer error and
    /// panics.
    pub fn remove_rule(&mut self, idx: RuleIdx) -> Rule {
        let rule = self.rules.remove(&idx).expect("rule already removed");
        if let Some(out) = self.outgoing.get_mut(&rule.lhs) {
            out.remove(&idx);
        }
        for call in rule.rhs.calls() {
            if let Some(inc) = self.incoming.get_mut(&call.target) {
                inc.remove(&idx);
            }
        }
        rule
    }

    /// Replaces a rule's body in place, keeping its index. Used by passes
    /// that rewrite guards or drop rhs branches.
    pub fn replace_rule(&mut self, idx: RuleIdx, rule: Rule) {
        self.remove_rule(idx);
        debug_assert!(self.has_location(rule.lhs));
        self.outgoing.entry(rule.lhs).or_default().insert(idx);
        for call in rule.rhs.calls() {
            self.incoming.entry(call.target).or_default().insert(idx);
        }
        self.rules.insert(idx, rule);
    }

    pub fn rule(&self, idx: RuleIdx) -> &Rule {
        &self.rules[&idx]
    }

    pub fn get_rule(&self, idx: RuleIdx) -> Option<&Rule> {
        self.rules.get(&idx)
    }

    pub fn has_rule(&self, idx: RuleIdx) -> bool {
        self.rules.contains_key(&idx)
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleIdx, &Rule)> + '_ {
        self.rules.iter().map(|(idx, rule)| (*idx, rule))
    }

    pub fn rule_indices(&self) -> Vec<RuleIdx> {
        self.rules.keys().copied().collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Rules outgoing from a location, ordered by index.
    pub fn rules_from(&self, loc: LocationIdx) -> Vec<RuleIdx> {
        self.outgoing
            .get(&loc)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rules with a right-hand side call into a location, ordered by index.
    pub fn rules_to(&self, loc: LocationIdx) -> Vec<RuleIdx> {
        self.incoming
            .get(&loc)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rules from `from` with at least one call into `to`.
    pub fn rules_between(&self, from: LocationIdx, to: LocationIdx) -> Vec<RuleIdx> {
        self.rules_from(from)
            .into_iter()
            .filter(|idx| {
                self.rule(*idx)
                    .rhs
                    .calls()
                    .iter()
                    .any(|call| call.target == to)
            })
            .collect()
    }

    pub fn has_rules_from(&self, loc: LocationIdx) -> bool {
        self.outgoing.get(&loc).is_some_and(|set| !set.is_empty())
    }

    pub fn has_rules_to(&self, loc: LocationIdx) -> bool {
        self.incoming.get(&loc).is_some_and(|set| !set.is_empty())
    }

    /// Distinct successor locations, in index order.
    pub fn successor_locations(&self, loc: LocationIdx) -> Vec<LocationIdx> {
        let mut out = BTreeSet::new();
        for idx in self.rules_from(loc) {
            for call in self.rule(idx).rhs.calls() {
                out.insert(call.target);
            }
        }
        out.into_iter().collect()
    }

    /// Distinct predecessor locations, in index order.
    pub fn predecessor_locations(&self, loc: LocationIdx) -> Vec<LocationIdx> {
        let mut out = BTreeSet::new();
        for idx in self.rules_to(loc) {
            out.insert(self.rule(idx).lhs);
        }
        out.into_iter().collect()
    }

    /// True iff every rule has a single-call right-hand side.
    pub fn is_linear(&self) -> bool {
        self.rules.values().all(Rule::is_linear)
    }

    /// True iff the initial location has no outgoing rules.
    pub fn is_empty(&self) -> bool {
        !self.has_rules_from(self.initial_location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Rhs, RhsCall, Update};
    use civet_expr::Expr;

    fn linear(from: LocationIdx, to: LocationIdx) -> Rule {
        Rule::new_linear(from, vec![], Expr::one(), to, Update::new())
    }

    fn store_with_locations(n: u32) -> (RuleStore, Vec<LocationIdx>) {
        let mut store = RuleStore::new();
        let locs: Vec<_> = (0..n).map(|_| store.add_location()).collect();
        store.set_initial_location(locs[0]);
        (store, locs)
    }

    #[test]
    fn rule_indices_are_never_reused() {
        let (mut store, locs) = store_with_locations(2);
        let a = store.add_rule(linear(locs[0], locs[1]));
        store.remove_rule(a);
        let b = store.add_rule(linear(locs[0], locs[1]));
        assert!(b > a);
    }

    #[test]
    #[should_panic(expected = "rule already removed")]
    fn double_removal_panics() {
        let (mut store, locs) = store_with_locations(2);
        let a = store.add_rule(linear(locs[0], locs[1]));
        store.remove_rule(a);
        store.remove_rule(a);
    }

    #[test]
    fn incidence_queries_are_consistent() {
        let (mut store, locs) = store_with_locations(3);
        let a = store.add_rule(linear(locs[0], locs[1]));
        let b = store.add_rule(linear(locs[1], locs[2]));
        let c = store.add_rule(linear(locs[1], locs[2]));

        assert_eq!(store.rules_from(locs[0]), vec![a]);
        assert_eq!(store.rules_to(locs[2]), vec![b, c]);
        assert_eq!(store.rules_between(locs[1], locs[2]), vec![b, c]);
        assert_eq!(store.successor_locations(locs[1]), vec![locs[2]]);
        assert_eq!(store.predecessor_locations(locs[1]), vec![locs[0]]);

        store.remove_rule(b);
        assert_eq!(store.rules_to(locs[2]), vec![c]);
    }

    #[test]
    fn branch_rules_appear_in_all_target_incidence_sets() {
        let (mut store, locs) = store_with_locations(3);
        let branch = Rule::new(
            locs[0],
            vec![],
            Expr::one(),
            Rhs::Branch(vec![
                RhsCall {
                    target: locs[1],
                    update: Update::new(),
                },
                RhsCall {
                    target: locs[2],
                    update: Update::new(),
                },
            ]),
        );
        let idx = store.add_rule(branch);
        assert_eq!(store.rules_to(locs[1]), vec![idx]);
        assert_eq!(store.rules_to(locs[2]), vec![idx]);
        assert!(!store.is_linear());
        assert_eq!(store.successor_locations(locs[0]), vec![locs[1], locs[2]]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Random add/remove interleavings never reuse an index and keep
            // the incidence maps consistent with the rule map.
            #[test]
            fn index_allocation_survives_arbitrary_churn(
                ops in prop::collection::vec((0u32..3, 0u32..3, prop::bool::ANY), 1..40)
            ) {
                let (mut store, locs) = store_with_locations(3);
                let mut live: Vec<RuleIdx> = Vec::new();
                let mut seen: Vec<RuleIdx> = Vec::new();
                for (from, to, remove) in ops {
                    if remove && !live.is_empty() {
                        let idx = live.remove(live.len() / 2);
                        store.remove_rule(idx);
                    } else {
                        let idx = store.add_rule(linear(locs[from as usize], locs[to as usize]));
                        prop_assert!(!seen.contains(&idx));
                        seen.push(idx);
                        live.push(idx);
                    }
                }
                for loc in store.locations() {
                    for idx in store.rules_from(loc) {
                        prop_assert_eq!(store.rule(idx).lhs, loc);
                    }
                    for idx in store.rules_to(loc) {
                        prop_assert!(store
                            .rule(idx)
                            .rhs
                            .calls()
                            .iter()
                            .any(|call| call.target == loc));
                    }
                }
            }
        }
    }

    #[test]
    fn emptiness_is_judged_from_the_initial_location() {
        let (mut store, locs) = store_with_locations(2);
        assert!(store.is_empty());
        store.add_rule(linear(locs[1], locs[1]));
        assert!(store.is_empty());
        store.add_rule(linear(locs[0], locs[1]));
        assert!(!store.is_empty());
    }
}
