//! Expression tree produced by the parser.

/// Prefix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    /// Boolean negation (`!` or `not`).
    Not,
    /// Numeric negation.
    Neg,
}

/// Infix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
}

impl BinaryOp {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::In => "in",
            BinaryOp::Contains => "contains",
            BinaryOp::StartsWith => "startsWith",
            BinaryOp::EndsWith => "endsWith",
            BinaryOp::Matches => "matches",
        }
    }
}

/// Parsed expression node. Identifiers stay by-name; the typechecker
/// validates them against the snapshot environment before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    Ident(String),
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    /// Whether this tree calls the named helper anywhere.
    pub(crate) fn calls(&self, wanted: &str) -> bool {
        match self {
            Expr::Call { name, args } => {
                name == wanted || args.iter().any(|arg| arg.calls(wanted))
            }
            Expr::Unary { operand, .. } => operand.calls(wanted),
            Expr::Binary { lhs, rhs, .. } => lhs.calls(wanted) || rhs.calls(wanted),
            Expr::List(items) => items.iter().any(|item| item.calls(wanted)),
            _ => false,
        }
    }

    /// Whether this tree reads the named field anywhere.
    pub(crate) fn reads(&self, wanted: &str) -> bool {
        match self {
            Expr::Ident(name) => name == wanted,
            Expr::Call { args, .. } => args.iter().any(|arg| arg.reads(wanted)),
            Expr::Unary { operand, .. } => operand.reads(wanted),
            Expr::Binary { lhs, rhs, .. } => lhs.reads(wanted) || rhs.reads(wanted),
            Expr::List(items) => items.iter().any(|item| item.reads(wanted)),
            _ => false,
        }
    }
}
