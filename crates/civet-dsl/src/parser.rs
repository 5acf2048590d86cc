// ParseError carries diagnostic spans and source fragments; boxing would
// lose the labeled-span ergonomics at every call site.
#![allow(clippy::result_large_err)]

use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct ItsParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

/// Helper to extract the next child from a pest iterator, returning a
/// descriptive error instead of panicking. The grammar guarantees the
/// structure, but graceful errors beat unwinding on a grammar drift.
fn next_child<'a>(
    iter: &mut pest::iterators::Pairs<'a, Rule>,
    context: &str,
) -> Result<Pair<'a>, ParseError> {
    iter.next().ok_or_else(|| ParseError::MissingSection {
        section: format!("expected child in {context}"),
    })
}

/// Parse an ITS problem file into its AST.
///
/// # Parameters
/// - `source`: UTF-8 problem text.
/// - `filename`: Logical filename used in diagnostics.
pub fn parse(source: &str, filename: &str) -> Result<Program, ParseError> {
    let pairs = ItsParser::parse(Rule::program, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p + 1),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        ParseError::syntax(format!("{e}"), Span::new(start, end), source, filename)
    })?;

    let program_pair = pairs
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::MissingSection {
            section: "program".into(),
        })?;

    let mut start = StartTerm::Unspecified;
    let mut declared_vars = Vec::new();
    let mut rules = Vec::new();
    let mut saw_rules_section = false;

    for section in program_pair.into_inner() {
        match section.as_rule() {
            Rule::goal_decl => {
                let mut inner = section.into_inner();
                let goal = next_child(&mut inner, "goal")?;
                if goal.as_str() != "COMPLEXITY" {
                    return Err(ParseError::UnsupportedGoal {
                        goal: goal.as_str().to_string(),
                        span: span_from(&goal).into(),
                        src: miette::NamedSource::new(filename, source.to_string()),
                    });
                }
            }
            Rule::start_decl => {
                let mut inner = section.into_inner();
                let spec = next_child(&mut inner, "start term")?;
                let spec = next_child(&mut spec.into_inner(), "start spec")?;
                start = match spec.as_rule() {
                    Rule::fun_symbols => {
                        let name = next_child(&mut spec.into_inner(), "start symbol")?;
                        StartTerm::FunctionSymbol(name.as_str().to_string())
                    }
                    _ => StartTerm::ConstructorBased,
                };
            }
            Rule::var_decl => {
                for ident in section.into_inner() {
                    declared_vars.push(ident.as_str().to_string());
                }
            }
            Rule::rules_decl => {
                saw_rules_section = true;
                for rule in section.into_inner() {
                    rules.push(parse_rule(rule, source, filename)?);
                }
            }
            Rule::EOI => {}
            other => {
                return Err(ParseError::MissingSection {
                    section: format!("unexpected section {other:?}"),
                })
            }
        }
    }

    if !saw_rules_section {
        return Err(ParseError::MissingSection {
            section: "(RULES ...)".into(),
        });
    }

    Ok(Program {
        start,
        declared_vars,
        rules,
    })
}

fn parse_rule(pair: Pair<'_>, source: &str, filename: &str) -> Result<RuleDecl, ParseError> {
    let rule_span = span_from(&pair);
    let mut inner = pair.into_inner();

    let lhs = parse_term(next_child(&mut inner, "rule lhs")?, source, filename)?;

    let arrow = next_child(&mut inner, "rule arrow")?;
    let arrow_kind = next_child(&mut arrow.into_inner(), "arrow kind")?;
    let cost = match arrow_kind.as_rule() {
        Rule::cost_arrow => Some(parse_expr(
            next_child(&mut arrow_kind.into_inner(), "cost")?,
            source,
            filename,
        )?),
        _ => None,
    };

    let rhs_pair = next_child(&mut inner, "rule rhs")?;
    let rhs_inner = next_child(&mut rhs_pair.into_inner(), "rhs term")?;
    let rhs = match rhs_inner.as_rule() {
        Rule::com_term => parse_com_term(rhs_inner, source, filename)?,
        _ => vec![parse_term(rhs_inner, source, filename)?],
    };

    let mut guard = Vec::new();
    if let Some(guard_pair) = inner.next() {
        let body = next_child(&mut guard_pair.into_inner(), "guard body")?;
        for item in body.into_inner() {
            match item.as_rule() {
                Rule::true_lit => {}
                Rule::cond => guard.push(parse_cond(item, source, filename)?),
                _ => {}
            }
        }
    }

    Ok(RuleDecl {
        lhs,
        cost,
        rhs,
        guard,
        span: rule_span,
    })
}

fn parse_com_term(
    pair: Pair<'_>,
    source: &str,
    filename: &str,
) -> Result<Vec<TermAst>, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let head = next_child(&mut inner, "Com head")?;
    let declared: usize = head
        .as_str()
        .trim_start_matches("Com_")
        .parse()
        .unwrap_or(0);
    let terms: Vec<TermAst> = inner
        .map(|t| parse_term(t, source, filename))
        .collect::<Result<_, _>>()?;
    if declared != terms.len() {
        return Err(ParseError::ComArityMismatch {
            declared,
            found: terms.len(),
            span: span.into(),
            src: miette::NamedSource::new(filename, source.to_string()),
        });
    }
    Ok(terms)
}

fn parse_term(pair: Pair<'_>, source: &str, filename: &str) -> Result<TermAst, ParseError> {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = next_child(&mut inner, "term name")?.as_str().to_string();
    let mut args = Vec::new();
    if let Some(arg_list) = inner.next() {
        for arg in arg_list.into_inner() {
            args.push(parse_expr(arg, source, filename)?);
        }
    }
    Ok(TermAst { name, args, span })
}

fn parse_cond(pair: Pair<'_>, source: &str, filename: &str) -> Result<CondAst, ParseError> {
    let mut inner = pair.into_inner();
    let lhs = parse_expr(next_child(&mut inner, "condition lhs")?, source, filename)?;
    let op = match next_child(&mut inner, "comparison")?.as_str() {
        "==" | "=" => CmpAst::Eq,
        "<=" => CmpAst::Le,
        ">=" => CmpAst::Ge,
        "<" => CmpAst::Lt,
        _ => CmpAst::Gt,
    };
    let rhs = parse_expr(next_child(&mut inner, "condition rhs")?, source, filename)?;
    Ok(CondAst { lhs, op, rhs })
}

fn parse_expr(pair: Pair<'_>, source: &str, filename: &str) -> Result<ExprAst, ParseError> {
    debug_assert_eq!(pair.as_rule(), Rule::expr);
    let mut inner = pair.into_inner();
    let mut acc = parse_product(next_child(&mut inner, "summand")?, source, filename)?;
    while let Some(op) = inner.next() {
        let rhs = parse_product(next_child(&mut inner, "summand")?, source, filename)?;
        acc = match op.as_str() {
            "+" => ExprAst::Add(Box::new(acc), Box::new(rhs)),
            _ => ExprAst::Sub(Box::new(acc), Box::new(rhs)),
        };
    }
    Ok(acc)
}

fn parse_product(pair: Pair<'_>, source: &str, filename: &str) -> Result<ExprAst, ParseError> {
    let mut inner = pair.into_inner();
    let mut acc = parse_factor(next_child(&mut inner, "factor")?, source, filename)?;
    while let Some(_op) = inner.next() {
        let rhs = parse_factor(next_child(&mut inner, "factor")?, source, filename)?;
        acc = ExprAst::Mul(Box::new(acc), Box::new(rhs));
    }
    Ok(acc)
}

fn parse_factor(pair: Pair<'_>, source: &str, filename: &str) -> Result<ExprAst, ParseError> {
    let inner = next_child(&mut pair.into_inner(), "factor body")?;
    match inner.as_rule() {
        Rule::neg_factor => {
            let body = parse_factor(
                next_child(&mut inner.into_inner(), "negated factor")?,
                source,
                filename,
            )?;
            Ok(ExprAst::Neg(Box::new(body)))
        }
        _ => parse_power(inner, source, filename),
    }
}

fn parse_power(pair: Pair<'_>, source: &str, filename: &str) -> Result<ExprAst, ParseError> {
    let mut inner = pair.into_inner();
    let base = parse_primary(next_child(&mut inner, "power base")?, source, filename)?;
    match inner.next() {
        Some(exp) => {
            let exp = parse_primary(exp, source, filename)?;
            Ok(ExprAst::Pow(Box::new(base), Box::new(exp)))
        }
        None => Ok(base),
    }
}

fn parse_primary(pair: Pair<'_>, source: &str, filename: &str) -> Result<ExprAst, ParseError> {
    let span = span_from(&pair);
    let inner = next_child(&mut pair.into_inner(), "primary")?;
    match inner.as_rule() {
        Rule::num => inner
            .as_str()
            .parse::<i64>()
            .map(ExprAst::Num)
            .map_err(|_| ParseError::NumberOutOfRange {
                span: span.into(),
                src: miette::NamedSource::new(filename, source.to_string()),
            }),
        Rule::ident => Ok(ExprAst::Var(inner.as_str().to_string())),
        _ => parse_expr(inner, source, filename),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: &str = r#"
        (GOAL COMPLEXITY)
        (STARTTERM (FUNCTIONSYMBOLS start))
        (VAR x)
        (RULES
          start(x) -> f(x)
          f(x) -{ x + 1 }> f(x - 1) [ x > 0 ]
        )
    "#;

    #[test]
    fn parses_a_complete_problem() {
        let program = parse(LOOP, "loop.its").expect("parse");
        assert_eq!(
            program.start,
            StartTerm::FunctionSymbol("start".to_string())
        );
        assert_eq!(program.declared_vars, vec!["x".to_string()]);
        assert_eq!(program.rules.len(), 2);

        let plain = &program.rules[0];
        assert!(plain.cost.is_none());
        assert!(plain.guard.is_empty());
        assert_eq!(plain.lhs.name, "start");

        let costed = &program.rules[1];
        assert!(costed.cost.is_some());
        assert_eq!(costed.guard.len(), 1);
        assert_eq!(costed.guard[0].op, CmpAst::Gt);
    }

    #[test]
    fn parses_branching_com_wrappers() {
        let src = r#"
            (GOAL COMPLEXITY)
            (RULES f(x) -> Com_2(g(x - 1), g(x - 2)) [ x > 1 ])
        "#;
        let program = parse(src, "com.its").expect("parse");
        assert_eq!(program.rules[0].rhs.len(), 2);
        assert_eq!(program.rules[0].rhs[1].name, "g");
    }

    #[test]
    fn com_arity_mismatch_is_rejected() {
        let src = "(GOAL COMPLEXITY) (RULES f(x) -> Com_2(g(x)))";
        assert!(matches!(
            parse(src, "bad.its"),
            Err(ParseError::ComArityMismatch { declared: 2, found: 1, .. })
        ));
    }

    #[test]
    fn true_guard_parses_to_empty_conjunction() {
        let src = "(GOAL COMPLEXITY) (RULES f(x) -> g(x) [ TRUE ])";
        let program = parse(src, "true.its").expect("parse");
        assert!(program.rules[0].guard.is_empty());
    }

    #[test]
    fn guards_accept_both_conjunction_spellings() {
        let src = r#"(GOAL COMPLEXITY) (RULES f(x, y) -> g(x, y) [ x > 0 && y >= x /\ y < 10 ])"#;
        let program = parse(src, "conj.its").expect("parse");
        assert_eq!(program.rules[0].guard.len(), 3);
    }

    #[test]
    fn goals_other_than_complexity_are_rejected() {
        let src = "(GOAL TERMINATION) (RULES f(x) -> f(x))";
        assert!(matches!(
            parse(src, "goal.its"),
            Err(ParseError::UnsupportedGoal { .. })
        ));
    }

    #[test]
    fn missing_rules_section_is_rejected() {
        assert!(matches!(
            parse("(GOAL COMPLEXITY)", "empty.its"),
            Err(ParseError::MissingSection { .. })
        ));
    }

    #[test]
    fn division_is_not_part_of_the_dialect() {
        let src = "(GOAL COMPLEXITY) (RULES f(x) -> f(x / 2))";
        assert!(parse(src, "div.its").is_err());
    }

    #[test]
    fn nested_arithmetic_respects_precedence() {
        let src = "(GOAL COMPLEXITY) (RULES f(x) -> f(2 * (x + 1) - 3))";
        let program = parse(src, "arith.its").expect("parse");
        let arg = &program.rules[0].rhs[0].args[0];
        // (2 * (x + 1)) - 3
        assert!(matches!(arg, ExprAst::Sub(lhs, _) if matches!(**lhs, ExprAst::Mul(..))));
    }
}
