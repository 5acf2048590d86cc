//! Parser for the textual ITS dialect.
//!
//! Turns `(GOAL COMPLEXITY)` problem files into a spanned AST; the lowering
//! pass in `civet-ir` converts the AST into a rule store.

pub mod ast;
pub mod errors;
pub mod parser;

pub use ast::{CmpAst, CondAst, ExprAst, Program, RuleDecl, Span, StartTerm, TermAst};
pub use errors::ParseError;
pub use parser::parse;
