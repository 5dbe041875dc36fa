use std::fmt;

/// Lexical token of the rule language.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    KwAnd,
    KwOr,
    KwNot,
    KwIn,
    KwContains,
    KwStartsWith,
    KwEndsWith,
    KwMatches,
    AndAnd,
    OrOr,
    Bang,
    EqEq,
    NotEq,
    Gte,
    Lte,
    Gt,
    Lt,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            Token::Int(value) => write!(f, "integer `{value}`"),
            Token::Float(value) => write!(f, "float `{value}`"),
            Token::Str(value) => write!(f, "string {value:?}"),
            Token::True => f.write_str("`true`"),
            Token::False => f.write_str("`false`"),
            Token::KwAnd => f.write_str("`and`"),
            Token::KwOr => f.write_str("`or`"),
            Token::KwNot => f.write_str("`not`"),
            Token::KwIn => f.write_str("`in`"),
            Token::KwContains => f.write_str("`contains`"),
            Token::KwStartsWith => f.write_str("`startsWith`"),
            Token::KwEndsWith => f.write_str("`endsWith`"),
            Token::KwMatches => f.write_str("`matches`"),
            Token::AndAnd => f.write_str("`&&`"),
            Token::OrOr => f.write_str("`||`"),
            Token::Bang => f.write_str("`!`"),
            Token::EqEq => f.write_str("`==`"),
            Token::NotEq => f.write_str("`!=`"),
            Token::Gte => f.write_str("`>=`"),
            Token::Lte => f.write_str("`<=`"),
            Token::Gt => f.write_str("`>`"),
            Token::Lt => f.write_str("`<`"),
            Token::Plus => f.write_str("`+`"),
            Token::Minus => f.write_str("`-`"),
            Token::Star => f.write_str("`*`"),
            Token::Slash => f.write_str("`/`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::LBracket => f.write_str("`[`"),
            Token::RBracket => f.write_str("`]`"),
            Token::Comma => f.write_str("`,`"),
        }
    }
}
