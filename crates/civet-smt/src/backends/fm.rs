//! Built-in decision procedure: rational Fourier–Motzkin elimination with
//! integer tightening and model reconstruction.
//!
//! The procedure is deterministic and complete over the rationals. Over
//! the integers it is sound but incomplete: `Unsat` answers are exact
//! (integer tightening only removes rational-but-not-integer slack), and
//! `Sat` is only reported together with an integral witness for every
//! `Int`-sorted variable. Everything else is `Unknown`.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use num_integer::Integer;
use num_rational::Rational64;
use num_traits::{One, Signed, Zero};

use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::{Atom, CmpOp, SmtFormula};

const DEFAULT_ROW_BUDGET: usize = 4096;
const DEFAULT_SPLIT_BUDGET: usize = 256;

/// `Σ coeffs·x ≤ bound` (`<` when `strict`).
#[derive(Clone, Debug)]
struct Row {
    coeffs: BTreeMap<String, Rational64>,
    bound: Rational64,
    strict: bool,
}

impl Row {
    fn new(coeffs: BTreeMap<String, Rational64>, bound: Rational64, strict: bool) -> Self {
        let coeffs = coeffs.into_iter().filter(|(_, c)| !c.is_zero()).collect();
        Row {
            coeffs,
            bound,
            strict,
        }
    }

    fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// A constant row that cannot be satisfied.
    fn is_contradiction(&self) -> bool {
        debug_assert!(self.is_constant());
        self.bound.is_negative() || (self.strict && self.bound <= Rational64::zero())
    }

    fn scale(&self, factor: Rational64) -> Row {
        debug_assert!(factor.is_positive());
        Row {
            coeffs: self
                .coeffs
                .iter()
                .map(|(n, c)| (n.clone(), c * factor))
                .collect(),
            bound: self.bound * factor,
            strict: self.strict,
        }
    }

    fn add(&self, other: &Row) -> Row {
        let mut coeffs = self.coeffs.clone();
        for (name, coeff) in &other.coeffs {
            let entry = coeffs.entry(name.clone()).or_insert_with(Rational64::zero);
            *entry += coeff;
            if entry.is_zero() {
                coeffs.remove(name);
            }
        }
        Row {
            coeffs,
            bound: self.bound + other.bound,
            strict: self.strict || other.strict,
        }
    }

    /// Integer tightening for rows over `Int`-sorted variables only:
    /// scale to integer coefficients, round the bound, divide by the
    /// coefficient gcd. Preserves the integer solution set exactly.
    fn tighten(&mut self, sorts: &IndexMap<String, SmtSort>) {
        if self.coeffs.is_empty() {
            return;
        }
        let all_int = self
            .coeffs
            .keys()
            .all(|name| sorts.get(name).copied().unwrap_or(SmtSort::Int) == SmtSort::Int);
        if !all_int {
            return;
        }
        let denom_lcm = self
            .coeffs
            .values()
            .fold(1i64, |acc, c| acc.lcm(c.denom()));
        if denom_lcm != 1 {
            let factor = Rational64::from_integer(denom_lcm);
            self.coeffs.values_mut().for_each(|c| *c *= factor);
            self.bound *= factor;
        }
        if self.strict {
            // Σ a·x < b  over the integers is  Σ a·x ≤ ⌈b⌉ - 1.
            self.bound = self.bound.ceil() - Rational64::one();
            self.strict = false;
        } else {
            self.bound = self.bound.floor();
        }
        let gcd = self
            .coeffs
            .values()
            .fold(0i64, |acc, c| acc.gcd(c.numer()));
        if gcd > 1 {
            let factor = Rational64::from_integer(gcd);
            self.coeffs.values_mut().for_each(|c| *c /= factor);
            self.bound = (self.bound / factor).floor();
        }
    }
}

enum Decision {
    Sat(Model),
    Unsat,
    Unknown(String),
}

/// The built-in Fourier–Motzkin backend.
pub struct FmSolver {
    sorts: IndexMap<String, SmtSort>,
    assertions: Vec<SmtFormula>,
    scopes: Vec<usize>,
    model: Option<Model>,
    row_budget: usize,
    split_budget: usize,
}

impl Default for FmSolver {
    fn default() -> Self {
        FmSolver {
            sorts: IndexMap::new(),
            assertions: Vec::new(),
            scopes: Vec::new(),
            model: None,
            row_budget: DEFAULT_ROW_BUDGET,
            split_budget: DEFAULT_SPLIT_BUDGET,
        }
    }
}

impl FmSolver {
    pub fn new() -> Self {
        FmSolver::default()
    }

    pub fn sorts(&self) -> &IndexMap<String, SmtSort> {
        &self.sorts
    }

    pub fn assertions(&self) -> &[SmtFormula] {
        &self.assertions
    }

    fn atom_rows(&self, atom: &Atom) -> Vec<Row> {
        let mut forward = BTreeMap::new();
        for (name, coeff) in atom.lhs.coeffs() {
            forward.insert(name.to_string(), coeff);
        }
        let constant = atom.lhs.constant();
        let negated: BTreeMap<String, Rational64> =
            forward.iter().map(|(n, c)| (n.clone(), -c)).collect();
        match atom.op {
            CmpOp::Le => vec![Row::new(forward, -constant, false)],
            CmpOp::Lt => vec![Row::new(forward, -constant, true)],
            CmpOp::Ge => vec![Row::new(negated, constant, false)],
            CmpOp::Gt => vec![Row::new(negated, constant, true)],
            CmpOp::Eq => vec![
                Row::new(forward, -constant, false),
                Row::new(negated, constant, false),
            ],
        }
    }

    fn decide_conjunction(&self, atoms: &[&Atom]) -> Decision {
        let mut rows = Vec::new();
        for atom in atoms {
            rows.extend(self.atom_rows(atom));
        }
        for row in &mut rows {
            row.tighten(&self.sorts);
        }

        // Eliminate real-sorted variables first so that integer variables
        // are assigned first (over concrete intervals) during model
        // reconstruction.
        let mut vars: Vec<String> = rows
            .iter()
            .flat_map(|row| row.coeffs.keys().cloned())
            .collect();
        vars.sort_unstable();
        vars.dedup();
        vars.sort_by_key(|name| {
            match self.sorts.get(name).copied().unwrap_or(SmtSort::Int) {
                SmtSort::Real => 0u8,
                SmtSort::Int => 1u8,
            }
        });

        let mut stages: Vec<(String, Vec<Row>)> = Vec::new();
        for var in vars {
            let (with_var, mut rest): (Vec<Row>, Vec<Row>) =
                rows.into_iter().partition(|row| row.coeffs.contains_key(&var));
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for row in &with_var {
                if row.coeffs[&var].is_positive() {
                    pos.push(row.clone());
                } else {
                    neg.push(row.clone());
                }
            }
            for p in &pos {
                for n in &neg {
                    let a_p = p.coeffs[&var];
                    let a_n = n.coeffs[&var];
                    let mut combined = p.scale(-a_n).add(&n.scale(a_p));
                    debug_assert!(!combined.coeffs.contains_key(&var));
                    combined.tighten(&self.sorts);
                    if combined.is_constant() {
                        if combined.is_contradiction() {
                            return Decision::Unsat;
                        }
                    } else {
                        rest.push(combined);
                    }
                }
            }
            if rest.len() > self.row_budget {
                return Decision::Unknown("elimination budget exceeded".to_string());
            }
            stages.push((var, with_var));
            rows = rest;
        }

        for row in &rows {
            if row.is_constant() && row.is_contradiction() {
                return Decision::Unsat;
            }
        }

        // Rationally satisfiable; reconstruct a model, insisting on
        // integral values for Int-sorted variables.
        let mut values: BTreeMap<String, Rational64> = BTreeMap::new();
        for (var, var_rows) in stages.iter().rev() {
            let mut lower: Option<(Rational64, bool)> = None;
            let mut upper: Option<(Rational64, bool)> = None;
            for row in var_rows {
                let a = row.coeffs[var];
                let mut rest = row.bound;
                for (name, coeff) in &row.coeffs {
                    if name != var {
                        rest -= coeff * values[name];
                    }
                }
                let limit = rest / a;
                if a.is_positive() {
                    let tighter = match &upper {
                        None => true,
                        Some((u, u_strict)) => limit < *u || (limit == *u && !u_strict),
                    };
                    if tighter {
                        upper = Some((limit, row.strict));
                    }
                } else {
                    let tighter = match &lower {
                        None => true,
                        Some((l, l_strict)) => limit > *l || (limit == *l && !l_strict),
                    };
                    if tighter {
                        lower = Some((limit, row.strict));
                    }
                }
            }
            let sort = self.sorts.get(var).copied().unwrap_or(SmtSort::Int);
            let value = match pick_value(sort, lower, upper) {
                Some(value) => value,
                None => {
                    return Decision::Unknown(format!(
                        "no integral witness for '{var}'"
                    ))
                }
            };
            values.insert(var.clone(), value);
        }

        let mut model = Model::default();
        for (name, value) in values {
            model.values.insert(name, value);
        }
        Decision::Sat(model)
    }

    fn explore<'a>(
        &self,
        atoms: &mut Vec<&'a Atom>,
        pending: &[&'a SmtFormula],
        leaves: &mut usize,
        unknown: &mut Option<String>,
    ) -> Option<Model> {
        let Some((first, rest)) = pending.split_first() else {
            *leaves += 1;
            if *leaves > self.split_budget {
                *unknown = Some("case-split budget exceeded".to_string());
                return None;
            }
            return match self.decide_conjunction(atoms) {
                Decision::Sat(model) => Some(model),
                Decision::Unsat => None,
                Decision::Unknown(reason) => {
                    *unknown = Some(reason);
                    None
                }
            };
        };
        match first {
            SmtFormula::Atom(atom) => {
                atoms.push(atom);
                let result = self.explore(atoms, rest, leaves, unknown);
                atoms.pop();
                result
            }
            SmtFormula::And(fs) => {
                let mut pending: Vec<&SmtFormula> = fs.iter().collect();
                pending.extend_from_slice(rest);
                self.explore(atoms, &pending, leaves, unknown)
            }
            SmtFormula::Or(fs) => {
                for f in fs {
                    let mut pending: Vec<&SmtFormula> = vec![f];
                    pending.extend_from_slice(rest);
                    if let Some(model) = self.explore(atoms, &pending, leaves, unknown) {
                        return Some(model);
                    }
                    if unknown
                        .as_deref()
                        .is_some_and(|r| r == "case-split budget exceeded")
                    {
                        break;
                    }
                }
                None
            }
        }
    }
}

fn pick_value(
    sort: SmtSort,
    lower: Option<(Rational64, bool)>,
    upper: Option<(Rational64, bool)>,
) -> Option<Rational64> {
    match sort {
        SmtSort::Int => {
            let lo = lower.map(|(value, strict)| {
                if strict {
                    value.floor() + Rational64::one()
                } else {
                    value.ceil()
                }
            });
            let hi = upper.map(|(value, strict)| {
                if strict {
                    value.ceil() - Rational64::one()
                } else {
                    value.floor()
                }
            });
            match (lo, hi) {
                (None, None) => Some(Rational64::zero()),
                (Some(lo), None) => Some(lo.max(Rational64::zero())),
                (None, Some(hi)) => Some(hi.min(Rational64::zero())),
                (Some(lo), Some(hi)) => {
                    if lo > hi {
                        None
                    } else if lo <= Rational64::zero() && Rational64::zero() <= hi {
                        Some(Rational64::zero())
                    } else {
                        Some(lo)
                    }
                }
            }
        }
        SmtSort::Real => match (lower, upper) {
            (None, None) => Some(Rational64::zero()),
            (Some((lo, _)), None) => Some(lo.floor() + Rational64::one()),
            (None, Some((hi, _))) => Some(hi.ceil() - Rational64::one()),
            (Some((lo, lo_strict)), Some((hi, hi_strict))) => {
                if lo == hi {
                    return (!lo_strict && !hi_strict).then_some(lo);
                }
                // Prefer an integral witness when the interval admits one.
                let candidate = if lo_strict {
                    lo.floor() + Rational64::one()
                } else {
                    lo.ceil()
                };
                let fits = if hi_strict {
                    candidate < hi
                } else {
                    candidate <= hi
                };
                if fits {
                    Some(candidate)
                } else {
                    Some((lo + hi) / Rational64::from_integer(2))
                }
            }
        },
    }
}

impl SmtSolver for FmSolver {
    fn declare_var(&mut self, name: &str, sort: SmtSort) {
        self.sorts.insert(name.to_string(), sort);
    }

    fn assert_formula(&mut self, formula: SmtFormula) {
        self.assertions.push(formula);
    }

    fn push(&mut self) {
        self.scopes.push(self.assertions.len());
    }

    fn pop(&mut self) {
        if let Some(len) = self.scopes.pop() {
            self.assertions.truncate(len);
        }
    }

    fn check_sat(&mut self) -> SatResult {
        self.model = None;
        let mut atoms = Vec::new();
        let pending: Vec<&SmtFormula> = self.assertions.iter().collect();
        let mut leaves = 0usize;
        let mut unknown = None;
        match self.explore(&mut atoms, &pending, &mut leaves, &mut unknown) {
            Some(model) => {
                self.model = Some(model);
                SatResult::Sat
            }
            None => match unknown {
                Some(reason) => SatResult::Unknown(reason),
                None => SatResult::Unsat,
            },
        }
    }

    fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    fn reset(&mut self) {
        self.sorts.clear();
        self.assertions.clear();
        self.scopes.clear();
        self.model = None;
    }
}
