//! Error types for rule compilation and evaluation.

use thiserror::Error;

/// Failure while lexing, parsing, or typechecking a single expression.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A character outside the language's alphabet was encountered.
    #[error("unexpected character `{found}` at offset {offset}")]
    UnexpectedCharacter {
        /// The offending character.
        found: char,
        /// Byte offset into the expression.
        offset: usize,
    },
    /// A string literal was not closed before the end of input.
    #[error("unterminated string literal at offset {offset}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        offset: usize,
    },
    /// A numeric literal did not fit its representation.
    #[error("invalid number `{raw}` at offset {offset}")]
    InvalidNumber {
        /// Literal text as written.
        raw: String,
        /// Byte offset of the literal.
        offset: usize,
    },
    /// The token stream did not form a valid expression.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset of the offending token.
        offset: usize,
        /// Human-readable description.
        message: String,
    },
    /// An identifier does not name a snapshot field.
    #[error("unknown identifier `{name}`")]
    UnknownIdentifier {
        /// The identifier as written.
        name: String,
    },
    /// A call does not name a known helper.
    #[error("unknown function `{name}`")]
    UnknownFunction {
        /// The function name as written.
        name: String,
    },
    /// Operand or argument types do not fit the operator or helper.
    #[error("{message}")]
    TypeMismatch {
        /// Human-readable description.
        message: String,
    },
    /// A regex literal failed to compile.
    #[error("invalid regex `{pattern}`: {message}")]
    InvalidRegex {
        /// The pattern as written.
        pattern: String,
        /// Compiler diagnostic.
        message: String,
    },
    /// The expression does not evaluate to a boolean.
    #[error("expression must evaluate to a boolean, found {found}")]
    NotBoolean {
        /// Name of the inferred type.
        found: &'static str,
    },
}

/// Failure while compiling one expression of a filter, carrying the
/// group and source text so the operator can find the offending rule.
#[derive(Debug, Error)]
#[error("compile {group} expression `{text}`")]
pub struct CompileError {
    /// Filter group the expression came from (`ignore`, `remove`, ...).
    pub group: String,
    /// Source text as configured.
    pub text: String,
    /// Underlying failure.
    #[source]
    pub source: RuleError,
}

/// Runtime failure while evaluating a compiled expression.
///
/// These are rare by construction: the typechecker eliminates type
/// errors ahead of time, so only value-dependent failures remain.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Defensive catch-all for states the typechecker should prevent.
    #[error("internal evaluation failure: {0}")]
    Internal(String),
}
