/// Byte span into the source text, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.len()).into()
    }
}

/// A parsed problem file.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub start: StartTerm,
    pub declared_vars: Vec<String>,
    pub rules: Vec<RuleDecl>,
}

/// How the initial location is selected.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum StartTerm {
    /// `(STARTTERM (FUNCTIONSYMBOLS f))`
    FunctionSymbol(String),
    /// `(STARTTERM CONSTRUCTOR-BASED)` — defaults to the first rule's lhs.
    ConstructorBased,
    /// No `STARTTERM` section — also defaults to the first rule's lhs.
    #[default]
    Unspecified,
}

/// One rule of the `(RULES …)` section.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleDecl {
    pub lhs: TermAst,
    /// `None` for the plain `->` arrow; `Some` for `-{ cost }>`.
    pub cost: Option<ExprAst>,
    /// One entry for a plain rhs or `Com_1`, several for `Com_k`.
    pub rhs: Vec<TermAst>,
    pub guard: Vec<CondAst>,
    pub span: Span,
}

/// A function-symbol application `f(e₁, …, eₙ)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TermAst {
    pub name: String,
    pub args: Vec<ExprAst>,
    pub span: Span,
}

/// Arithmetic over variables and non-negative integer literals. Division
/// is not part of the dialect.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprAst {
    Num(i64),
    Var(String),
    Neg(Box<ExprAst>),
    Add(Box<ExprAst>, Box<ExprAst>),
    Sub(Box<ExprAst>, Box<ExprAst>),
    Mul(Box<ExprAst>, Box<ExprAst>),
    Pow(Box<ExprAst>, Box<ExprAst>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpAst {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One atomic guard constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct CondAst {
    pub lhs: ExprAst,
    pub op: CmpAst,
    pub rhs: ExprAst,
}
