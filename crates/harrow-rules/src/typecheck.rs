//! Static validation of parsed expressions.
//!
//! Unknown identifiers, ill-typed operands, and invalid regex literals
//! are all rejected here, before any torrent is touched. Regex literals
//! encountered during the walk are collected so the compiler can build
//! them once per program.

use regex::Regex;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::RuleError;

/// Inferred expression type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Type {
    Bool,
    Int,
    Float,
    Str,
    StrList,
    NumList,
}

impl Type {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::Int => "int",
            Type::Float => "float",
            Type::Str => "string",
            Type::StrList => "string list",
            Type::NumList => "number list",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }
}

/// Snapshot fields visible to rule expressions, with their types.
const FIELDS: &[(&str, Type)] = &[
    ("Hash", Type::Str),
    ("Name", Type::Str),
    ("Path", Type::Str),
    ("TotalBytes", Type::Int),
    ("DownloadedBytes", Type::Int),
    ("State", Type::Str),
    ("Files", Type::StrList),
    ("Tags", Type::StrList),
    ("Downloaded", Type::Bool),
    ("Seeding", Type::Bool),
    ("Ratio", Type::Float),
    ("AddedSeconds", Type::Int),
    ("AddedHours", Type::Float),
    ("AddedDays", Type::Float),
    ("SeedingSeconds", Type::Int),
    ("SeedingHours", Type::Float),
    ("SeedingDays", Type::Float),
    ("Label", Type::Str),
    ("Seeds", Type::Int),
    ("Peers", Type::Int),
    ("IsPrivate", Type::Bool),
    ("IsPublic", Type::Bool),
    ("UpLimit", Type::Int),
    ("TrackerName", Type::Str),
    ("TrackerStatus", Type::Str),
    ("Comment", Type::Str),
    ("HardlinkedOutsideClient", Type::Bool),
    ("FreeSpaceSet", Type::Bool),
];

pub(crate) fn field_type(name: &str) -> Option<Type> {
    FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, ty)| *ty)
}

/// Validate the whole tree and require a boolean at the top level.
///
/// Regex literals reachable through `matches` and the `RegexMatch*`
/// helpers are appended to `patterns` for ahead-of-time compilation.
pub(crate) fn check_program(expr: &Expr, patterns: &mut Vec<String>) -> Result<(), RuleError> {
    let ty = check(expr, patterns)?;
    if ty != Type::Bool {
        return Err(RuleError::NotBoolean { found: ty.name() });
    }
    Ok(())
}

fn check(expr: &Expr, patterns: &mut Vec<String>) -> Result<Type, RuleError> {
    match expr {
        Expr::Bool(_) => Ok(Type::Bool),
        Expr::Int(_) => Ok(Type::Int),
        Expr::Float(_) => Ok(Type::Float),
        Expr::Str(_) => Ok(Type::Str),
        Expr::List(items) => check_list(items, patterns),
        Expr::Ident(name) => {
            field_type(name).ok_or_else(|| RuleError::UnknownIdentifier { name: name.clone() })
        }
        Expr::Call { name, args } => check_call(name, args, patterns),
        Expr::Unary { op, operand } => check_unary(*op, operand, patterns),
        Expr::Binary { op, lhs, rhs } => check_binary(*op, lhs, rhs, patterns),
    }
}

fn check_list(items: &[Expr], patterns: &mut Vec<String>) -> Result<Type, RuleError> {
    let mut list_ty: Option<Type> = None;
    for item in items {
        let ty = check(item, patterns)?;
        let as_list = match ty {
            Type::Str => Type::StrList,
            ty if ty.is_numeric() => Type::NumList,
            other => {
                return Err(RuleError::TypeMismatch {
                    message: format!("list literals may not contain {} values", other.name()),
                })
            }
        };
        match list_ty {
            None => list_ty = Some(as_list),
            Some(previous) if previous == as_list => {}
            Some(previous) => {
                return Err(RuleError::TypeMismatch {
                    message: format!(
                        "list literal mixes {} and {} elements",
                        previous.name(),
                        as_list.name()
                    ),
                })
            }
        }
    }
    // an empty list matches nothing; treat it as a string list
    Ok(list_ty.unwrap_or(Type::StrList))
}

fn check_unary(op: UnaryOp, operand: &Expr, patterns: &mut Vec<String>) -> Result<Type, RuleError> {
    let ty = check(operand, patterns)?;
    match op {
        UnaryOp::Not => {
            if ty == Type::Bool {
                Ok(Type::Bool)
            } else {
                Err(RuleError::TypeMismatch {
                    message: format!("`!` expects a bool operand, found {}", ty.name()),
                })
            }
        }
        UnaryOp::Neg => {
            if ty.is_numeric() {
                Ok(ty)
            } else {
                Err(RuleError::TypeMismatch {
                    message: format!("unary `-` expects a numeric operand, found {}", ty.name()),
                })
            }
        }
    }
}

fn check_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    patterns: &mut Vec<String>,
) -> Result<Type, RuleError> {
    let lhs_ty = check(lhs, patterns)?;
    let rhs_ty = check(rhs, patterns)?;

    let mismatch = |message: String| Err(RuleError::TypeMismatch { message });

    match op {
        BinaryOp::Or | BinaryOp::And => {
            if lhs_ty == Type::Bool && rhs_ty == Type::Bool {
                Ok(Type::Bool)
            } else {
                mismatch(format!(
                    "`{}` expects bool operands, found {} and {}",
                    op.describe(),
                    lhs_ty.name(),
                    rhs_ty.name()
                ))
            }
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let comparable = (lhs_ty.is_numeric() && rhs_ty.is_numeric())
                || (lhs_ty == rhs_ty && matches!(lhs_ty, Type::Bool | Type::Str));
            if comparable {
                Ok(Type::Bool)
            } else {
                mismatch(format!(
                    "`{}` cannot compare {} with {}",
                    op.describe(),
                    lhs_ty.name(),
                    rhs_ty.name()
                ))
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
                Ok(Type::Bool)
            } else {
                mismatch(format!(
                    "`{}` expects numeric operands, found {} and {}",
                    op.describe(),
                    lhs_ty.name(),
                    rhs_ty.name()
                ))
            }
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
                if lhs_ty == Type::Int && rhs_ty == Type::Int {
                    Ok(Type::Int)
                } else {
                    Ok(Type::Float)
                }
            } else {
                mismatch(format!(
                    "`{}` expects numeric operands, found {} and {}",
                    op.describe(),
                    lhs_ty.name(),
                    rhs_ty.name()
                ))
            }
        }
        BinaryOp::Div => {
            if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
                Ok(Type::Float)
            } else {
                mismatch(format!(
                    "`/` expects numeric operands, found {} and {}",
                    lhs_ty.name(),
                    rhs_ty.name()
                ))
            }
        }
        BinaryOp::In => match (lhs_ty, rhs_ty) {
            (Type::Str, Type::StrList) => Ok(Type::Bool),
            (lhs_ty, Type::NumList) if lhs_ty.is_numeric() => Ok(Type::Bool),
            _ => mismatch(format!(
                "`in` expects a {} element on the left of a {}, found {}",
                match rhs_ty {
                    Type::NumList => "numeric",
                    _ => "string",
                },
                rhs_ty.name(),
                lhs_ty.name()
            )),
        },
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => {
            if lhs_ty == Type::Str && rhs_ty == Type::Str {
                Ok(Type::Bool)
            } else {
                mismatch(format!(
                    "`{}` expects string operands, found {} and {}",
                    op.describe(),
                    lhs_ty.name(),
                    rhs_ty.name()
                ))
            }
        }
        BinaryOp::Matches => {
            if lhs_ty != Type::Str || rhs_ty != Type::Str {
                return mismatch(format!(
                    "`matches` expects string operands, found {} and {}",
                    lhs_ty.name(),
                    rhs_ty.name()
                ));
            }
            if let Expr::Str(pattern) = rhs {
                validate_regex(pattern)?;
                patterns.push(pattern.clone());
            }
            Ok(Type::Bool)
        }
    }
}

fn check_call(name: &str, args: &[Expr], patterns: &mut Vec<String>) -> Result<Type, RuleError> {
    let arg_types: Vec<Type> = args
        .iter()
        .map(|arg| check(arg, patterns))
        .collect::<Result<_, _>>()?;

    let arity = |expected: usize| -> Result<(), RuleError> {
        if arg_types.len() == expected {
            Ok(())
        } else {
            Err(RuleError::TypeMismatch {
                message: format!(
                    "`{name}` expects {expected} argument(s), found {}",
                    arg_types.len()
                ),
            })
        }
    };

    match name {
        "IsUnregistered" | "IsTrackerDown" | "HasMissingFiles" => {
            arity(0)?;
            Ok(Type::Bool)
        }
        "FreeSpaceGB" => {
            arity(0)?;
            Ok(Type::Float)
        }
        "HasAllTags" | "HasAnyTag" => {
            if arg_types.is_empty() {
                return Err(RuleError::TypeMismatch {
                    message: format!("`{name}` expects at least one tag argument"),
                });
            }
            if let Some(bad) = arg_types.iter().find(|ty| **ty != Type::Str) {
                return Err(RuleError::TypeMismatch {
                    message: format!("`{name}` expects string arguments, found {}", bad.name()),
                });
            }
            Ok(Type::Bool)
        }
        "Log" => {
            arity(1)?;
            if arg_types[0].is_numeric() {
                Ok(Type::Float)
            } else {
                Err(RuleError::TypeMismatch {
                    message: format!(
                        "`Log` expects a numeric argument, found {}",
                        arg_types[0].name()
                    ),
                })
            }
        }
        "len" => {
            arity(1)?;
            if matches!(arg_types[0], Type::StrList | Type::NumList) {
                Ok(Type::Int)
            } else {
                Err(RuleError::TypeMismatch {
                    message: format!("`len` expects a sequence, found {}", arg_types[0].name()),
                })
            }
        }
        "RegexMatch" | "RegexMatchAny" | "RegexMatchAll" => {
            arity(1)?;
            if arg_types[0] != Type::Str {
                return Err(RuleError::TypeMismatch {
                    message: format!(
                        "`{name}` expects a string pattern, found {}",
                        arg_types[0].name()
                    ),
                });
            }
            if let Some(Expr::Str(raw)) = args.first() {
                if name == "RegexMatch" {
                    validate_regex(raw)?;
                    patterns.push(raw.clone());
                } else {
                    for piece in raw.split(',') {
                        let piece = piece.trim();
                        if piece.is_empty() {
                            continue;
                        }
                        validate_regex(piece)?;
                        patterns.push(piece.to_string());
                    }
                }
            }
            Ok(Type::Bool)
        }
        _ => Err(RuleError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

fn validate_regex(pattern: &str) -> Result<(), RuleError> {
    Regex::new(pattern).map(|_| ()).map_err(|err| RuleError::InvalidRegex {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check_source(source: &str) -> Result<(), RuleError> {
        let expr = parse(source)?;
        check_program(&expr, &mut Vec::new())
    }

    #[test]
    fn accepts_representative_rules() {
        for source in [
            "Ratio >= 2.0 && SeedingDays > 14.0",
            "IsUnregistered()",
            "IsTrackerDown() || HasMissingFiles()",
            r#"Label in ["sonarr", "radarr"] && !IsPrivate"#,
            r#""cross-seed" in Tags"#,
            "len(Files) > 1",
            "Log(4) > 1.0",
            r#"Name matches "(?i)\\bS\\d+\\b""#,
            r#"HasAllTags("a", "b") || HasAnyTag("c")"#,
            "UpLimit / 1024 != 50",
            "FreeSpaceSet && FreeSpaceGB() < 100.0",
            "Seeds in [0, 1, 2]",
            "not (Name contains \"1080p\")",
        ] {
            check_source(source).unwrap_or_else(|err| panic!("{source}: {err}"));
        }
    }

    #[test]
    fn rejects_unknown_identifier_statically() {
        let err = check_source("Ratioz > 1").expect_err("should fail");
        assert!(matches!(err, RuleError::UnknownIdentifier { name } if name == "Ratioz"));
    }

    #[test]
    fn rejects_unknown_function_statically() {
        let err = check_source("Frobnicate()").expect_err("should fail");
        assert!(matches!(err, RuleError::UnknownFunction { .. }));
    }

    #[test]
    fn rejects_type_confusion() {
        assert!(matches!(
            check_source("Name > 3"),
            Err(RuleError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check_source("Downloaded + 1 > 0"),
            Err(RuleError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check_source("Seeds in [\"a\"]"),
            Err(RuleError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check_source("Name contains 3"),
            Err(RuleError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check_source("HasAllTags(1)"),
            Err(RuleError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_non_boolean_top_level() {
        let err = check_source("Seeds + 1").expect_err("should fail");
        assert!(matches!(err, RuleError::NotBoolean { found: "int" }));
    }

    #[test]
    fn rejects_invalid_regex_literal_statically() {
        let err = check_source(r#"Name matches "[unclosed""#).expect_err("should fail");
        assert!(matches!(err, RuleError::InvalidRegex { .. }));

        let err = check_source(r#"RegexMatchAny("ok.*, [bad")"#).expect_err("should fail");
        assert!(matches!(err, RuleError::InvalidRegex { .. }));
    }

    #[test]
    fn collects_regex_literals_for_precompilation() {
        let expr = parse(r#"Name matches "abc" || RegexMatchAny("x, y")"#).expect("parse");
        let mut patterns = Vec::new();
        check_program(&expr, &mut patterns).expect("check");
        assert_eq!(patterns, vec!["abc".to_string(), "x".to_string(), "y".to_string()]);
    }

    #[test]
    fn mixed_literal_lists_are_rejected() {
        assert!(matches!(
            check_source(r#"Label in ["a", 1]"#),
            Err(RuleError::TypeMismatch { .. })
        ));
    }
}
