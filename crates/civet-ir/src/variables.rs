use std::collections::{BTreeSet, HashMap};

use civet_expr::{VarId, VarNames};

/// The analysis-wide variable registry.
///
/// Maps between indices and names and tracks which variables are
/// *temporary* (nondeterministic, not bound by rule left-hand sides).
/// Variables are only ever appended; indices stay valid for the lifetime
/// of the store. The registry is an explicit field of the rule store so
/// several analyses can run in one process without interaction.
#[derive(Clone, Debug, Default)]
pub struct VariableSet {
    names: Vec<String>,
    by_name: HashMap<String, VarId>,
    temps: BTreeSet<VarId>,
}

impl VariableSet {
    pub fn new() -> Self {
        VariableSet::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Adds a program variable, adjusting the name if `base` is taken.
    pub fn add_fresh_variable(&mut self, base: &str) -> VarId {
        let name = self.fresh_name(base);
        self.insert(name)
    }

    /// Adds a temporary variable, adjusting the name if `base` is taken.
    pub fn add_fresh_temporary_variable(&mut self, base: &str) -> VarId {
        let var = self.add_fresh_variable(base);
        self.temps.insert(var);
        var
    }

    pub fn is_temp(&self, var: VarId) -> bool {
        self.temps.contains(&var)
    }

    pub fn name(&self, var: VarId) -> &str {
        &self.names[var.0 as usize]
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.names.len() as u32).map(VarId)
    }

    pub fn temp_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.temps.iter().copied()
    }

    pub fn program_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.iter().filter(|v| !self.is_temp(*v))
    }

    pub fn contains_temp(&self, vars: &BTreeSet<VarId>) -> bool {
        vars.iter().any(|v| self.is_temp(*v))
    }

    fn insert(&mut self, name: String) -> VarId {
        let var = VarId(self.names.len() as u32);
        self.by_name.insert(name.clone(), var);
        self.names.push(name);
        var
    }

    fn fresh_name(&self, base: &str) -> String {
        let base = if base.is_empty() { "v" } else { base };
        if !self.by_name.contains_key(base) {
            return base.to_string();
        }
        let mut counter = 1u32;
        loop {
            let candidate = format!("{base}{counter}");
            if !self.by_name.contains_key(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

impl VarNames for VariableSet {
    fn var_name(&self, var: VarId) -> Option<&str> {
        self.names.get(var.0 as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_avoid_collisions() {
        let mut vars = VariableSet::new();
        let x = vars.add_fresh_variable("x");
        let x1 = vars.add_fresh_variable("x");
        let x2 = vars.add_fresh_temporary_variable("x");
        assert_eq!(vars.name(x), "x");
        assert_eq!(vars.name(x1), "x1");
        assert_eq!(vars.name(x2), "x2");
        assert_ne!(x, x1);
    }

    #[test]
    fn temporaries_are_tracked_separately() {
        let mut vars = VariableSet::new();
        let x = vars.add_fresh_variable("x");
        let t = vars.add_fresh_temporary_variable("t");
        assert!(!vars.is_temp(x));
        assert!(vars.is_temp(t));
        assert_eq!(vars.program_vars().collect::<Vec<_>>(), vec![x]);
        assert_eq!(vars.temp_vars().collect::<Vec<_>>(), vec![t]);
    }

    #[test]
    fn lookup_by_name_round_trips() {
        let mut vars = VariableSet::new();
        let x = vars.add_fresh_variable("counter");
        assert_eq!(vars.find("counter"), Some(x));
        assert_eq!(vars.find("missing"), None);
    }
}
