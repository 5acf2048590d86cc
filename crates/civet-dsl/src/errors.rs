use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(civet::parse::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unsupported goal '{goal}'")]
    #[diagnostic(
        code(civet::parse::goal),
        help("only (GOAL COMPLEXITY) problems are supported")
    )]
    UnsupportedGoal {
        goal: String,
        #[label("unsupported goal")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Missing required section: {section}")]
    #[diagnostic(code(civet::parse::missing_section))]
    MissingSection { section: String },

    #[error("Integer literal out of range")]
    #[diagnostic(code(civet::parse::number))]
    NumberOutOfRange {
        #[label("does not fit a 64-bit integer")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Malformed Com wrapper: declared {declared} calls, found {found}")]
    #[diagnostic(code(civet::parse::com_arity))]
    ComArityMismatch {
        declared: usize,
        found: usize,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl ParseError {
    pub fn syntax(
        message: impl Into<String>,
        span: Span,
        source: &str,
        filename: &str,
    ) -> Self {
        ParseError::Syntax {
            message: message.into(),
            span: span.into(),
            src: miette::NamedSource::new(filename, source.to_string()),
        }
    }
}
