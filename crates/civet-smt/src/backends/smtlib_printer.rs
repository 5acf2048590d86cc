//! Renders assertion sets as SMT-LIB2 text, for the `--dump-smt`
//! debugging option and for replaying queries in an external solver.

use std::fmt::Write;

use indexmap::IndexMap;
use num_rational::Rational64;
use num_traits::{Signed, Zero};

use crate::backends::fm::FmSolver;
use crate::sorts::SmtSort;
use crate::terms::{Atom, CmpOp, LinComb, SmtFormula};

pub fn render_solver(solver: &FmSolver) -> String {
    render(solver.sorts(), solver.assertions())
}

pub fn render(sorts: &IndexMap<String, SmtSort>, assertions: &[SmtFormula]) -> String {
    let mut out = String::new();
    let mixed = sorts.values().any(|s| *s == SmtSort::Real);
    let logic = if mixed { "QF_LIRA" } else { "QF_LIA" };
    let _ = writeln!(out, "(set-logic {logic})");
    let mut declared: Vec<&String> = sorts.keys().collect();
    declared.sort();
    for name in declared {
        let _ = writeln!(
            out,
            "(declare-fun {name} () {})",
            sorts[name].smtlib_name()
        );
    }
    for formula in assertions {
        let _ = writeln!(out, "(assert {})", render_formula(formula));
    }
    let _ = writeln!(out, "(check-sat)");
    out
}

fn render_formula(formula: &SmtFormula) -> String {
    match formula {
        SmtFormula::Atom(atom) => render_atom(atom),
        SmtFormula::And(fs) => render_junction("and", fs),
        SmtFormula::Or(fs) => render_junction("or", fs),
    }
}

fn render_junction(op: &str, formulas: &[SmtFormula]) -> String {
    match formulas.len() {
        0 => {
            if op == "and" {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        1 => render_formula(&formulas[0]),
        _ => {
            let parts: Vec<String> = formulas.iter().map(render_formula).collect();
            format!("({op} {})", parts.join(" "))
        }
    }
}

fn render_atom(atom: &Atom) -> String {
    let op = match atom.op {
        CmpOp::Eq => "=",
        CmpOp::Le => "<=",
        CmpOp::Lt => "<",
        CmpOp::Ge => ">=",
        CmpOp::Gt => ">",
    };
    format!("({op} {} 0)", render_lincomb(&atom.lhs))
}

fn render_lincomb(lc: &LinComb) -> String {
    let mut parts: Vec<String> = lc
        .coeffs()
        .map(|(name, coeff)| {
            if coeff == Rational64::from_integer(1) {
                name.to_string()
            } else {
                format!("(* {} {name})", render_rational(coeff))
            }
        })
        .collect();
    if !lc.constant().is_zero() || parts.is_empty() {
        parts.push(render_rational(lc.constant()));
    }
    if parts.len() == 1 {
        parts.pop().expect("nonempty")
    } else {
        format!("(+ {})", parts.join(" "))
    }
}

fn render_rational(value: Rational64) -> String {
    if value.is_negative() {
        format!("(- {})", render_rational(-value))
    } else if value.is_integer() {
        value.numer().to_string()
    } else {
        format!("(/ {} {})", value.numer(), value.denom())
    }
}
