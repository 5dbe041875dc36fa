//! Pratt parser over the lexed token stream.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::RuleError;
use crate::lexer::lex;
use crate::tokens::Token;

/// Parse a rule expression into its tree.
pub(crate) fn parse(source: &str) -> Result<Expr, RuleError> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.expression(0)?;
    if let Some((token, offset)) = parser.peek_with_offset() {
        return Err(RuleError::Parse {
            offset,
            message: format!("unexpected trailing {token}"),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_with_offset(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(token, offset)| (token, *offset))
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn expect(&mut self, wanted: &Token, context: &str) -> Result<(), RuleError> {
        match self.advance() {
            Some((token, _)) if token == *wanted => Ok(()),
            Some((token, offset)) => Err(RuleError::Parse {
                offset,
                message: format!("expected {wanted} {context}, found {token}"),
            }),
            None => Err(RuleError::Parse {
                offset: self.end,
                message: format!("expected {wanted} {context}, found end of input"),
            }),
        }
    }

    /// Pratt loop: parse a prefix expression, then fold infix operators
    /// with binding power at or above `min_bp`.
    fn expression(&mut self, min_bp: u8) -> Result<Expr, RuleError> {
        let mut lhs = self.prefix()?;

        while let Some(token) = self.peek() {
            let Some((op, bp)) = infix_binding(token) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.expression(bp + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, RuleError> {
        let Some((token, offset)) = self.advance() else {
            return Err(RuleError::Parse {
                offset: self.end,
                message: "expected expression, found end of input".to_string(),
            });
        };

        match token {
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Int(value) => Ok(Expr::Int(value)),
            Token::Float(value) => Ok(Expr::Float(value)),
            Token::Str(value) => Ok(Expr::Str(value)),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let args = self.call_arguments()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Token::Bang | Token::KwNot => {
                // Binds looser than comparisons: `not A contains B`
                // negates the comparison, not the operand.
                let operand = self.expression(NOT_BP)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                let operand = self.expression(NEG_BP)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(&Token::RParen, "to close group")?;
                Ok(inner)
            }
            Token::LBracket => {
                let items = self.list_items()?;
                Ok(Expr::List(items))
            }
            other => Err(RuleError::Parse {
                offset,
                message: format!("expected expression, found {other}"),
            }),
        }
    }

    fn call_arguments(&mut self) -> Result<Vec<Expr>, RuleError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }

        loop {
            args.push(self.expression(0)?);
            match self.advance() {
                Some((Token::Comma, _)) => {}
                Some((Token::RParen, _)) => return Ok(args),
                Some((token, offset)) => {
                    return Err(RuleError::Parse {
                        offset,
                        message: format!("expected `,` or `)` in argument list, found {token}"),
                    })
                }
                None => {
                    return Err(RuleError::Parse {
                        offset: self.end,
                        message: "unclosed argument list".to_string(),
                    })
                }
            }
        }
    }

    fn list_items(&mut self) -> Result<Vec<Expr>, RuleError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.advance();
            return Ok(items);
        }

        loop {
            items.push(self.expression(0)?);
            match self.advance() {
                Some((Token::Comma, _)) => {}
                Some((Token::RBracket, _)) => return Ok(items),
                Some((token, offset)) => {
                    return Err(RuleError::Parse {
                        offset,
                        message: format!("expected `,` or `]` in list, found {token}"),
                    })
                }
                None => {
                    return Err(RuleError::Parse {
                        offset: self.end,
                        message: "unclosed list literal".to_string(),
                    })
                }
            }
        }
    }
}

const NOT_BP: u8 = 4;
const NEG_BP: u8 = 10;

fn infix_binding(token: &Token) -> Option<(BinaryOp, u8)> {
    let mapped = match token {
        Token::OrOr | Token::KwOr => (BinaryOp::Or, 1),
        Token::AndAnd | Token::KwAnd => (BinaryOp::And, 3),
        Token::EqEq => (BinaryOp::Eq, 5),
        Token::NotEq => (BinaryOp::Ne, 5),
        Token::Lt => (BinaryOp::Lt, 5),
        Token::Lte => (BinaryOp::Le, 5),
        Token::Gt => (BinaryOp::Gt, 5),
        Token::Gte => (BinaryOp::Ge, 5),
        Token::KwIn => (BinaryOp::In, 5),
        Token::KwContains => (BinaryOp::Contains, 5),
        Token::KwStartsWith => (BinaryOp::StartsWith, 5),
        Token::KwEndsWith => (BinaryOp::EndsWith, 5),
        Token::KwMatches => (BinaryOp::Matches, 5),
        Token::Plus => (BinaryOp::Add, 7),
        Token::Minus => (BinaryOp::Sub, 7),
        Token::Star => (BinaryOp::Mul, 9),
        Token::Slash => (BinaryOp::Div, 9),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("Downloaded || Seeding && IsPrivate").expect("parse");
        let Expr::Binary { op: BinaryOp::Or, rhs, .. } = expr else {
            panic!("expected top-level or");
        };
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn comparison_binds_tighter_than_and() {
        let expr = parse("Ratio > 2 && Seeds < 5").expect("parse");
        let Expr::Binary { op: BinaryOp::And, lhs, rhs } = expr else {
            panic!("expected top-level and");
        };
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Gt, .. }));
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Lt, .. }));
    }

    #[test]
    fn arithmetic_precedence_over_comparison() {
        let expr = parse("TotalBytes / 1024 > 100 + 1").expect("parse");
        let Expr::Binary { op: BinaryOp::Gt, lhs, rhs } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Div, .. }));
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn parses_calls_lists_and_membership() {
        let expr = parse(r#"HasAnyTag("a", 'b') && Label in ["tv", "movies"]"#).expect("parse");
        let Expr::Binary { op: BinaryOp::And, lhs, rhs } = expr else {
            panic!("expected and");
        };
        match *lhs {
            Expr::Call { ref name, ref args } => {
                assert_eq!(name, "HasAnyTag");
                assert_eq!(args.len(), 2);
            }
            ref other => panic!("expected call, got {other:?}"),
        }
        match *rhs {
            Expr::Binary { op: BinaryOp::In, ref rhs, .. } => {
                assert!(matches!(**rhs, Expr::List(ref items) if items.len() == 2));
            }
            ref other => panic!("expected in, got {other:?}"),
        }
    }

    #[test]
    fn not_spellings_are_equivalent() {
        let bang = parse("!Downloaded").expect("parse");
        let word = parse("not Downloaded").expect("parse");
        assert_eq!(bang, word);
    }

    #[test]
    fn unary_not_applies_before_and() {
        let expr = parse("not Downloaded && Seeding").expect("parse");
        let Expr::Binary { op: BinaryOp::And, lhs, .. } = expr else {
            panic!("expected and");
        };
        assert!(matches!(*lhs, Expr::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn rejects_trailing_tokens_and_unclosed_groups() {
        assert!(matches!(parse("Seeds > 1 2"), Err(RuleError::Parse { .. })));
        assert!(matches!(parse("(Seeds > 1"), Err(RuleError::Parse { .. })));
        assert!(matches!(parse("[1, 2"), Err(RuleError::Parse { .. })));
        assert!(matches!(parse(""), Err(RuleError::Parse { .. })));
    }

    #[test]
    fn not_negates_comparisons_without_parentheses() {
        let expr = parse("not Name contains \"1080p\"").expect("parse");
        let Expr::Unary { op: UnaryOp::Not, operand } = expr else {
            panic!("expected not");
        };
        assert!(matches!(*operand, Expr::Binary { op: BinaryOp::Contains, .. }));
    }

    #[test]
    fn parses_nested_parentheses() {
        let expr = parse("not (Name contains \"1080p\")").expect("parse");
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Not, .. }));
    }
}
