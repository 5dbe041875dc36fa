//! Evaluation of typechecked expressions against one snapshot.
//!
//! Evaluation is pure: it reads the torrent, the status matcher, and the
//! free-space accountant, and touches nothing else. The tracker oracle
//! is never called from here; the engine resolves registration ahead of
//! time and the `IsUnregistered()` helper reads the cached state.

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

use harrow_core::{FreeSpaceAccountant, RegistrationState, StatusMatcher, Torrent};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::EvalError;

/// Environment a program runs against.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Snapshot under evaluation.
    pub torrent: &'a Torrent,
    /// Announce-message matcher for `IsTrackerDown` / fallback decisions.
    pub matcher: &'a StatusMatcher,
    /// Free-space accountant, when the run obtained a figure.
    pub free_space: Option<&'a FreeSpaceAccountant>,
    /// Forces `IsTrackerDown()` to true; set by the engine when the
    /// tracker's API plugin degraded during the run.
    pub force_tracker_down: bool,
}

impl<'a> EvalContext<'a> {
    /// Context with no free-space figure and no tracker override.
    #[must_use]
    pub fn new(torrent: &'a Torrent, matcher: &'a StatusMatcher) -> Self {
        Self {
            torrent,
            matcher,
            free_space: None,
            force_tracker_down: false,
        }
    }
}

/// Runtime value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    StrList(Vec<String>),
    NumList(Vec<f64>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::StrList(_) => "string list",
            Value::NumList(_) => "number list",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }
}

/// Evaluate a typechecked program to its boolean result.
pub(crate) fn run(
    expr: &Expr,
    ctx: &EvalContext<'_>,
    regexes: &HashMap<String, Regex>,
) -> Result<bool, EvalError> {
    match eval(expr, ctx, regexes)? {
        Value::Bool(result) => Ok(result),
        other => Err(EvalError::Internal(format!(
            "program produced {} instead of bool",
            other.kind()
        ))),
    }
}

fn eval(
    expr: &Expr,
    ctx: &EvalContext<'_>,
    regexes: &HashMap<String, Regex>,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Bool(value) => Ok(Value::Bool(*value)),
        Expr::Int(value) => Ok(Value::Int(*value)),
        Expr::Float(value) => Ok(Value::Float(*value)),
        Expr::Str(value) => Ok(Value::Str(value.clone())),
        Expr::List(items) => eval_list(items, ctx, regexes),
        Expr::Ident(name) => field_value(name, ctx),
        Expr::Call { name, args } => eval_call(name, args, ctx, regexes),
        Expr::Unary { op, operand } => {
            let value = eval(operand, ctx, regexes)?;
            match (op, value) {
                (UnaryOp::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
                (UnaryOp::Neg, Value::Int(value)) => Ok(Value::Int(-value)),
                (UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
                (_, other) => Err(EvalError::Internal(format!(
                    "unary operator applied to {}",
                    other.kind()
                ))),
            }
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx, regexes),
    }
}

fn eval_list(
    items: &[Expr],
    ctx: &EvalContext<'_>,
    regexes: &HashMap<String, Regex>,
) -> Result<Value, EvalError> {
    let mut strings = Vec::new();
    let mut numbers = Vec::new();
    for item in items {
        match eval(item, ctx, regexes)? {
            Value::Str(value) => strings.push(value),
            Value::Int(value) => numbers.push(value as f64),
            Value::Float(value) => numbers.push(value),
            other => {
                return Err(EvalError::Internal(format!(
                    "list element of type {}",
                    other.kind()
                )))
            }
        }
    }
    if strings.is_empty() && !numbers.is_empty() {
        Ok(Value::NumList(numbers))
    } else {
        Ok(Value::StrList(strings))
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &EvalContext<'_>,
    regexes: &HashMap<String, Regex>,
) -> Result<Value, EvalError> {
    // short-circuit the boolean connectives
    match op {
        BinaryOp::And => {
            return match eval(lhs, ctx, regexes)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => eval(rhs, ctx, regexes),
                other => Err(EvalError::Internal(format!(
                    "`&&` applied to {}",
                    other.kind()
                ))),
            };
        }
        BinaryOp::Or => {
            return match eval(lhs, ctx, regexes)? {
                Value::Bool(true) => Ok(Value::Bool(true)),
                Value::Bool(false) => eval(rhs, ctx, regexes),
                other => Err(EvalError::Internal(format!(
                    "`||` applied to {}",
                    other.kind()
                ))),
            };
        }
        _ => {}
    }

    let lhs = eval(lhs, ctx, regexes)?;
    let rhs = eval(rhs, ctx, regexes)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (a, b) = numeric_pair(&lhs, &rhs)?;
            let result = match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
                let result = match op {
                    BinaryOp::Add => a.wrapping_add(*b),
                    BinaryOp::Sub => a.wrapping_sub(*b),
                    _ => a.wrapping_mul(*b),
                };
                return Ok(Value::Int(result));
            }
            let (a, b) = numeric_pair(&lhs, &rhs)?;
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => a * b,
            };
            Ok(Value::Float(result))
        }
        BinaryOp::Div => {
            let (a, b) = numeric_pair(&lhs, &rhs)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Float(a / b))
        }
        BinaryOp::In => match (&lhs, &rhs) {
            (Value::Str(needle), Value::StrList(haystack)) => {
                Ok(Value::Bool(haystack.iter().any(|item| item == needle)))
            }
            (element, Value::NumList(haystack)) => {
                let needle = element.as_f64().ok_or_else(|| {
                    EvalError::Internal(format!("`in` applied to {}", element.kind()))
                })?;
                Ok(Value::Bool(haystack.iter().any(|item| *item == needle)))
            }
            _ => Err(EvalError::Internal(format!(
                "`in` applied to {} and {}",
                lhs.kind(),
                rhs.kind()
            ))),
        },
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => {
            match (&lhs, &rhs) {
                (Value::Str(a), Value::Str(b)) => {
                    let result = match op {
                        BinaryOp::Contains => a.contains(b.as_str()),
                        BinaryOp::StartsWith => a.starts_with(b.as_str()),
                        _ => a.ends_with(b.as_str()),
                    };
                    Ok(Value::Bool(result))
                }
                _ => Err(EvalError::Internal(format!(
                    "`{}` applied to {} and {}",
                    op.describe(),
                    lhs.kind(),
                    rhs.kind()
                ))),
            }
        }
        BinaryOp::Matches => match (&lhs, &rhs) {
            (Value::Str(subject), Value::Str(pattern)) => {
                Ok(Value::Bool(regex_is_match(pattern, subject, regexes)))
            }
            _ => Err(EvalError::Internal(format!(
                "`matches` applied to {} and {}",
                lhs.kind(),
                rhs.kind()
            ))),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn numeric_pair(lhs: &Value, rhs: &Value) -> Result<(f64, f64), EvalError> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::Internal(format!(
            "numeric operator applied to {} and {}",
            lhs.kind(),
            rhs.kind()
        ))),
    }
}

fn field_value(name: &str, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let torrent = ctx.torrent;
    let value = match name {
        "Hash" => Value::Str(torrent.hash.clone()),
        "Name" => Value::Str(torrent.name.clone()),
        "Path" => Value::Str(torrent.path.clone()),
        "TotalBytes" => Value::Int(torrent.total_bytes),
        "DownloadedBytes" => Value::Int(torrent.downloaded_bytes),
        "State" => Value::Str(torrent.state.clone()),
        "Files" => Value::StrList(torrent.files.clone()),
        "Tags" => Value::StrList(torrent.tags.clone()),
        "Downloaded" => Value::Bool(torrent.downloaded),
        "Seeding" => Value::Bool(torrent.seeding),
        "Ratio" => Value::Float(torrent.ratio),
        "AddedSeconds" => Value::Int(torrent.added_seconds),
        "AddedHours" => Value::Float(torrent.added_hours()),
        "AddedDays" => Value::Float(torrent.added_days()),
        "SeedingSeconds" => Value::Int(torrent.seeding_seconds),
        "SeedingHours" => Value::Float(torrent.seeding_hours()),
        "SeedingDays" => Value::Float(torrent.seeding_days()),
        "Label" => Value::Str(torrent.label.clone()),
        "Seeds" => Value::Int(torrent.seeds),
        "Peers" => Value::Int(torrent.peers),
        "IsPrivate" => Value::Bool(torrent.is_private),
        "IsPublic" => Value::Bool(torrent.is_public()),
        "UpLimit" => Value::Int(torrent.up_limit),
        "TrackerName" => Value::Str(torrent.tracker_name.clone()),
        "TrackerStatus" => Value::Str(torrent.tracker_status.clone()),
        "Comment" => Value::Str(torrent.comment.clone()),
        "HardlinkedOutsideClient" => Value::Bool(torrent.hardlinked_outside_client),
        "FreeSpaceSet" => Value::Bool(ctx.free_space.is_some_and(FreeSpaceAccountant::is_known)),
        other => {
            return Err(EvalError::Internal(format!(
                "unresolved identifier `{other}`"
            )))
        }
    };
    Ok(value)
}

fn eval_call(
    name: &str,
    args: &[Expr],
    ctx: &EvalContext<'_>,
    regexes: &HashMap<String, Regex>,
) -> Result<Value, EvalError> {
    match name {
        "IsUnregistered" => Ok(Value::Bool(match ctx.torrent.registration {
            RegistrationState::Unregistered => true,
            RegistrationState::Registered => false,
            // no oracle pre-pass ran; fall back to the status tables
            RegistrationState::Unknown => ctx.matcher.unregistered_by_status(ctx.torrent),
        })),
        "IsTrackerDown" => Ok(Value::Bool(
            ctx.force_tracker_down || ctx.matcher.is_tracker_down(ctx.torrent),
        )),
        "HasMissingFiles" => Ok(Value::Bool(ctx.torrent.has_missing_files())),
        "FreeSpaceGB" => Ok(Value::Float(
            ctx.free_space.map_or(0.0, FreeSpaceAccountant::gb),
        )),
        "HasAllTags" | "HasAnyTag" => {
            let mut wanted = Vec::with_capacity(args.len());
            for arg in args {
                match eval(arg, ctx, regexes)? {
                    Value::Str(tag) => wanted.push(tag),
                    other => {
                        return Err(EvalError::Internal(format!(
                            "`{name}` argument of type {}",
                            other.kind()
                        )))
                    }
                }
            }
            let result = if name == "HasAllTags" {
                ctx.torrent.has_all_tags(&wanted)
            } else {
                ctx.torrent.has_any_tag(&wanted)
            };
            Ok(Value::Bool(result))
        }
        "Log" => {
            let arg = args
                .first()
                .ok_or_else(|| EvalError::Internal("`Log` called without arguments".into()))?;
            let value = eval(arg, ctx, regexes)?;
            let value = value.as_f64().ok_or_else(|| {
                EvalError::Internal(format!("`Log` argument of type {}", value.kind()))
            })?;
            Ok(Value::Float(value.ln()))
        }
        "len" => {
            let arg = args
                .first()
                .ok_or_else(|| EvalError::Internal("`len` called without arguments".into()))?;
            match eval(arg, ctx, regexes)? {
                Value::StrList(items) => Ok(Value::Int(items.len() as i64)),
                Value::NumList(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(EvalError::Internal(format!(
                    "`len` applied to {}",
                    other.kind()
                ))),
            }
        }
        "RegexMatch" => {
            let arg = args
                .first()
                .ok_or_else(|| EvalError::Internal("`RegexMatch` called without arguments".into()))?;
            match eval(arg, ctx, regexes)? {
                Value::Str(pattern) => Ok(Value::Bool(regex_is_match(
                    &pattern,
                    &ctx.torrent.name,
                    regexes,
                ))),
                other => Err(EvalError::Internal(format!(
                    "`RegexMatch` argument of type {}",
                    other.kind()
                ))),
            }
        }
        "RegexMatchAny" | "RegexMatchAll" => {
            let arg = args
                .first()
                .ok_or_else(|| EvalError::Internal(format!("`{name}` called without arguments")))?;
            match eval(arg, ctx, regexes)? {
                Value::Str(raw) => {
                    let patterns: Vec<&str> = raw
                        .split(',')
                        .map(str::trim)
                        .filter(|piece| !piece.is_empty())
                        .collect();
                    let result = if name == "RegexMatchAny" {
                        patterns
                            .iter()
                            .any(|pattern| regex_is_match(pattern, &ctx.torrent.name, regexes))
                    } else {
                        !patterns.is_empty()
                            && patterns
                                .iter()
                                .all(|pattern| regex_is_match(pattern, &ctx.torrent.name, regexes))
                    };
                    Ok(Value::Bool(result))
                }
                other => Err(EvalError::Internal(format!(
                    "`{name}` argument of type {}",
                    other.kind()
                ))),
            }
        }
        other => Err(EvalError::Internal(format!(
            "unresolved function `{other}`"
        ))),
    }
}

/// Match with the program's precompiled set, compiling on the fly for
/// patterns that only exist at runtime. A pattern that fails to compile
/// matches nothing.
fn regex_is_match(pattern: &str, subject: &str, regexes: &HashMap<String, Regex>) -> bool {
    if let Some(compiled) = regexes.get(pattern) {
        return compiled.is_match(subject);
    }
    match Regex::new(pattern) {
        Ok(compiled) => compiled.is_match(subject),
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "failed compiling regex during evaluation");
            false
        }
    }
}
