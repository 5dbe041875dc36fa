#![forbid(unsafe_code)]

//! Boolean rule language evaluated against torrent snapshots.
//!
//! Filters are compiled once per run; compilation statically rejects
//! unknown identifiers, ill-typed operands, and invalid regex literals
//! before any torrent is touched. Each compiled element keeps its source
//! text so the engine can report which rule triggered a decision.

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;
mod tokens;
mod typecheck;

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

pub use error::{CompileError, EvalError, RuleError};
pub use eval::EvalContext;

use ast::Expr;

/// Tag reconciliation mode for a tag rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMode {
    /// Only ever add the tag.
    Add,
    /// Only ever remove the tag.
    Remove,
    /// Keep the tag in lockstep with the rule outcome.
    #[default]
    Full,
}

impl TagMode {
    /// Whether this mode permits adding the tag.
    #[must_use]
    pub fn allows_add(self) -> bool {
        matches!(self, TagMode::Add | TagMode::Full)
    }

    /// Whether this mode permits removing the tag.
    #[must_use]
    pub fn allows_remove(self) -> bool {
        matches!(self, TagMode::Remove | TagMode::Full)
    }
}

/// Source form of a filter, decoupled from the configuration layer.
#[derive(Debug, Clone, Default)]
pub struct FilterSource {
    /// Ignore disjunction.
    pub ignore: Vec<String>,
    /// Remove disjunction.
    pub remove: Vec<String>,
    /// Pause disjunction.
    pub pause: Vec<String>,
    /// Label rules in declaration order.
    pub labels: Vec<LabelSource>,
    /// Tag rules in declaration order.
    pub tags: Vec<TagSource>,
}

/// Source form of one label rule.
#[derive(Debug, Clone)]
pub struct LabelSource {
    /// Label to apply when every update expression matches.
    pub name: String,
    /// Conjunction of update expressions.
    pub update: Vec<String>,
}

/// Source form of one tag rule.
#[derive(Debug, Clone)]
pub struct TagSource {
    /// Tag the rule manages.
    pub name: String,
    /// Reconciliation mode.
    pub mode: TagMode,
    /// Optional per-torrent upload limit in KiB/s; −1 means unlimited.
    pub upload_kb: Option<i64>,
    /// Conjunction of update expressions.
    pub update: Vec<String>,
}

/// One compiled expression and the text it was compiled from.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    text: String,
    program: Expr,
    regexes: HashMap<String, Regex>,
}

impl CompiledExpression {
    /// Source text as configured.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluate against one snapshot. The result is always boolean; any
    /// runtime failure surfaces as an [`EvalError`].
    pub fn run(&self, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
        eval::run(&self.program, ctx, &self.regexes)
    }

    fn calls(&self, name: &str) -> bool {
        self.program.calls(name)
    }

    fn reads(&self, name: &str) -> bool {
        self.program.reads(name)
    }
}

/// Compiled label rule.
#[derive(Debug, Clone)]
pub struct LabelExpression {
    /// Label to apply.
    pub name: String,
    /// Conjunction of compiled update expressions.
    pub updates: Vec<CompiledExpression>,
}

/// Compiled tag rule.
#[derive(Debug, Clone)]
pub struct TagExpression {
    /// Tag the rule manages.
    pub name: String,
    /// Reconciliation mode.
    pub mode: TagMode,
    /// Optional per-torrent upload limit in KiB/s.
    pub upload_kb: Option<i64>,
    /// Conjunction of compiled update expressions.
    pub updates: Vec<CompiledExpression>,
}

/// A fully compiled filter.
#[derive(Debug, Clone, Default)]
pub struct Expressions {
    /// Ignore disjunction.
    pub ignores: Vec<CompiledExpression>,
    /// Remove disjunction.
    pub removes: Vec<CompiledExpression>,
    /// Pause disjunction.
    pub pauses: Vec<CompiledExpression>,
    /// Label rules in declaration order.
    pub labels: Vec<LabelExpression>,
    /// Tag rules in declaration order.
    pub tags: Vec<TagExpression>,
}

impl Expressions {
    /// Compile every expression of a filter, failing on the first error.
    pub fn compile(filter: &FilterSource) -> Result<Self, CompileError> {
        let mut compiled = Expressions::default();

        for text in &filter.ignore {
            compiled.ignores.push(compile_one("ignore", text)?);
        }
        for text in &filter.remove {
            compiled.removes.push(compile_one("remove", text)?);
        }
        for text in &filter.pause {
            compiled.pauses.push(compile_one("pause", text)?);
        }
        for label in &filter.labels {
            let mut updates = Vec::with_capacity(label.update.len());
            for text in &label.update {
                updates.push(compile_one(&format!("label `{}` update", label.name), text)?);
            }
            compiled.labels.push(LabelExpression {
                name: label.name.clone(),
                updates,
            });
        }
        for tag in &filter.tags {
            let mut updates = Vec::with_capacity(tag.update.len());
            for text in &tag.update {
                updates.push(compile_one(&format!("tag `{}` update", tag.name), text)?);
            }
            compiled.tags.push(TagExpression {
                name: tag.name.clone(),
                mode: tag.mode,
                upload_kb: tag.upload_kb,
                updates,
            });
        }

        Ok(compiled)
    }

    fn all_programs(&self) -> impl Iterator<Item = &CompiledExpression> {
        self.ignores
            .iter()
            .chain(&self.removes)
            .chain(&self.pauses)
            .chain(self.labels.iter().flat_map(|label| label.updates.iter()))
            .chain(self.tags.iter().flat_map(|tag| tag.updates.iter()))
    }

    /// Whether any rule consults the tracker oracle.
    #[must_use]
    pub fn references_unregistered(&self) -> bool {
        self.all_programs()
            .any(|program| program.calls("IsUnregistered"))
    }

    /// Whether any rule reads the free-space figures.
    #[must_use]
    pub fn references_free_space(&self) -> bool {
        self.all_programs()
            .any(|program| program.calls("FreeSpaceGB") || program.reads("FreeSpaceSet"))
    }

    /// Whether any rule reads hardlink state.
    #[must_use]
    pub fn references_hardlinks(&self) -> bool {
        self.all_programs()
            .any(|program| program.reads("HardlinkedOutsideClient"))
    }
}

fn compile_one(group: &str, text: &str) -> Result<CompiledExpression, CompileError> {
    compile_expression(text).map_err(|source| CompileError {
        group: group.to_string(),
        text: text.to_string(),
        source,
    })
}

fn compile_expression(text: &str) -> Result<CompiledExpression, RuleError> {
    let program = parser::parse(text)?;
    let mut patterns = Vec::new();
    typecheck::check_program(&program, &mut patterns)?;

    let mut regexes = HashMap::with_capacity(patterns.len());
    for pattern in patterns {
        // validated during typecheck; a failure here would be a regex
        // crate version skew, so fall through to runtime compilation
        if let Ok(compiled) = Regex::new(&pattern) {
            regexes.insert(pattern, compiled);
        }
    }

    Ok(CompiledExpression {
        text: text.to_string(),
        program,
        regexes,
    })
}

/// Outcome of running a disjunction, carrying the matching rule's text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOutcome<'a> {
    /// Whether any expression matched.
    pub matched: bool,
    /// Source text of the first matching expression.
    pub reason: Option<&'a str>,
    /// Number of expressions that failed to evaluate.
    pub eval_errors: usize,
}

/// Run a disjunction: the first matching expression wins.
///
/// An expression that fails to evaluate is logged and treated as a
/// non-match; it never poisons the rest of the filter.
#[must_use]
pub fn any_match<'a>(
    programs: &'a [CompiledExpression],
    ctx: &EvalContext<'_>,
) -> MatchOutcome<'a> {
    let mut outcome = MatchOutcome::default();
    for program in programs {
        match program.run(ctx) {
            Ok(true) => {
                outcome.matched = true;
                outcome.reason = Some(program.text());
                return outcome;
            }
            Ok(false) => {}
            Err(err) => {
                outcome.eval_errors += 1;
                warn!(rule = program.text(), error = %err, "rule evaluation failed; treating as non-match");
            }
        }
    }
    outcome
}

/// Outcome of running a conjunction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllMatchOutcome {
    /// Whether every expression matched.
    pub matched: bool,
    /// Number of expressions that failed to evaluate.
    pub eval_errors: usize,
}

/// Run a conjunction: every expression must match.
///
/// An evaluation failure counts as a non-match for that expression, so
/// the conjunction as a whole fails closed.
#[must_use]
pub fn all_match(programs: &[CompiledExpression], ctx: &EvalContext<'_>) -> AllMatchOutcome {
    let mut outcome = AllMatchOutcome {
        matched: true,
        eval_errors: 0,
    };
    for program in programs {
        match program.run(ctx) {
            Ok(true) => {}
            Ok(false) => outcome.matched = false,
            Err(err) => {
                outcome.eval_errors += 1;
                outcome.matched = false;
                warn!(rule = program.text(), error = %err, "rule evaluation failed; treating as non-match");
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use harrow_core::{RegistrationState, StatusMatcher, Torrent};

    fn sample_torrent() -> Torrent {
        Torrent {
            hash: "f".repeat(40),
            name: "Show S01 1080p WEB-DL".into(),
            label: "sonarr-imported".into(),
            tags: vec!["low-seed".into(), "x".into()],
            files: vec!["/downloads/show/e1.mkv".into(), "/downloads/show/e2.mkv".into()],
            downloaded: true,
            seeding: true,
            ratio: 1.5,
            added_seconds: 3 * 86_400,
            seeding_seconds: 2 * 86_400,
            seeds: 10,
            peers: 2,
            total_bytes: 4_000_000_000,
            downloaded_bytes: 4_000_000_000,
            up_limit: 100 * 1024,
            tracker_name: "landof.tv".into(),
            tracker_status: "Working".into(),
            ..Torrent::default()
        }
    }

    fn run_rule(source: &str, torrent: &Torrent) -> bool {
        let matcher = StatusMatcher::default();
        let filter = FilterSource {
            remove: vec![source.to_string()],
            ..FilterSource::default()
        };
        let compiled = Expressions::compile(&filter).expect("compile");
        let ctx = EvalContext::new(torrent, &matcher);
        any_match(&compiled.removes, &ctx).matched
    }

    #[test]
    fn numeric_and_string_rules_evaluate() {
        let torrent = sample_torrent();
        assert!(run_rule("Ratio >= 1.0 && SeedingDays >= 2.0", &torrent));
        assert!(run_rule("Name contains \"1080p\"", &torrent));
        assert!(run_rule("Name startsWith \"Show\"", &torrent));
        assert!(run_rule("Name endsWith \"WEB-DL\"", &torrent));
        assert!(!run_rule("Label == \"radarr\"", &torrent));
        assert!(run_rule("UpLimit / 1024 == 100", &torrent));
        assert!(run_rule("len(Files) == 2", &torrent));
        assert!(run_rule("\"low-seed\" in Tags", &torrent));
        assert!(run_rule("Label in [\"sonarr-imported\", \"tv\"]", &torrent));
        assert!(run_rule("Seeds in [5, 10]", &torrent));
        assert!(run_rule("TotalBytes > 3 * 1000 * 1000 * 1000", &torrent));
        assert!(run_rule("Log(2.718281828) > 0.99", &torrent));
    }

    #[test]
    fn regex_rules_evaluate_with_flags_and_boundaries() {
        let torrent = sample_torrent();
        assert!(run_rule(r#"Name matches "(?i)\\bs01\\b""#, &torrent));
        assert!(run_rule(r#"RegexMatch("S\\d+")"#, &torrent));
        assert!(run_rule(r#"RegexMatchAny("nomatch, 1080p")"#, &torrent));
        assert!(run_rule(r#"RegexMatchAll("Show, 1080p")"#, &torrent));
        assert!(!run_rule(r#"RegexMatchAll("Show, 2160p")"#, &torrent));
    }

    #[test]
    fn helper_predicates_read_cached_registration() {
        let mut torrent = sample_torrent();
        assert!(!run_rule("IsUnregistered()", &torrent));

        torrent.registration = RegistrationState::Unregistered;
        assert!(run_rule("IsUnregistered()", &torrent));

        torrent.registration = RegistrationState::Registered;
        torrent.tracker_status = "unregistered torrent".into();
        assert!(!run_rule("IsUnregistered()", &torrent));
    }

    #[test]
    fn unknown_registration_falls_back_to_status_tables() {
        let mut torrent = sample_torrent();
        torrent.tracker_status = "Unregistered torrent".into();
        assert!(run_rule("IsUnregistered()", &torrent));

        torrent.tracker_status = "connection failed: unregistered".into();
        assert!(!run_rule("IsUnregistered()", &torrent));
        assert!(run_rule("IsTrackerDown()", &torrent));
    }

    #[test]
    fn evaluation_is_deterministic_over_the_snapshot() {
        let torrent = sample_torrent();
        let matcher = StatusMatcher::default();
        let filter = FilterSource {
            remove: vec![
                "Ratio > 1.0".into(),
                "IsTrackerDown()".into(),
                "Name matches \"Show\"".into(),
            ],
            ..FilterSource::default()
        };
        let compiled = Expressions::compile(&filter).expect("compile");
        let ctx = EvalContext::new(&torrent, &matcher);
        let first = any_match(&compiled.removes, &ctx);
        let second = any_match(&compiled.removes, &ctx);
        assert_eq!(first.matched, second.matched);
        assert_eq!(first.reason, second.reason);
    }

    #[test]
    fn match_outcome_reports_triggering_rule_text() {
        let torrent = sample_torrent();
        let matcher = StatusMatcher::default();
        let filter = FilterSource {
            remove: vec!["Ratio > 99.0".into(), "Seeds >= 10".into()],
            ..FilterSource::default()
        };
        let compiled = Expressions::compile(&filter).expect("compile");
        let ctx = EvalContext::new(&torrent, &matcher);
        let outcome = any_match(&compiled.removes, &ctx);
        assert!(outcome.matched);
        assert_eq!(outcome.reason, Some("Seeds >= 10"));
    }

    #[test]
    fn eval_error_degrades_to_non_match() {
        let torrent = sample_torrent();
        let matcher = StatusMatcher::default();
        let filter = FilterSource {
            remove: vec!["Ratio / (Seeds - 10) > 1.0".into(), "Seeds == 10".into()],
            ..FilterSource::default()
        };
        let compiled = Expressions::compile(&filter).expect("compile");
        let ctx = EvalContext::new(&torrent, &matcher);
        let outcome = any_match(&compiled.removes, &ctx);
        assert!(outcome.matched, "later rule still evaluated");
        assert_eq!(outcome.eval_errors, 1);
    }

    #[test]
    fn compile_error_carries_group_and_text() {
        let filter = FilterSource {
            ignore: vec!["Bogus > 1".into()],
            ..FilterSource::default()
        };
        let err = Expressions::compile(&filter).expect_err("should fail");
        assert_eq!(err.group, "ignore");
        assert_eq!(err.text, "Bogus > 1");
        assert!(matches!(err.source, RuleError::UnknownIdentifier { .. }));
    }

    #[test]
    fn compile_rejects_bad_label_update() {
        let filter = FilterSource {
            labels: vec![LabelSource {
                name: "tv".into(),
                update: vec!["Name matches \"[bad\"".into()],
            }],
            ..FilterSource::default()
        };
        let err = Expressions::compile(&filter).expect_err("should fail");
        assert!(err.group.contains("tv"));
        assert!(matches!(err.source, RuleError::InvalidRegex { .. }));
    }

    #[test]
    fn reference_scans_see_all_groups() {
        let filter = FilterSource {
            ignore: vec!["IsTrackerDown()".into()],
            tags: vec![TagSource {
                name: "unregistered".into(),
                mode: TagMode::Full,
                upload_kb: None,
                update: vec!["IsUnregistered()".into()],
            }],
            labels: vec![LabelSource {
                name: "full-disk".into(),
                update: vec!["FreeSpaceSet && FreeSpaceGB() < 50.0".into()],
            }],
            ..FilterSource::default()
        };
        let compiled = Expressions::compile(&filter).expect("compile");
        assert!(compiled.references_unregistered());
        assert!(compiled.references_free_space());
        assert!(!compiled.references_hardlinks());
    }

    #[test]
    fn conjunction_requires_every_update() {
        let torrent = sample_torrent();
        let matcher = StatusMatcher::default();
        let filter = FilterSource {
            labels: vec![LabelSource {
                name: "keep".into(),
                update: vec!["Ratio > 1.0".into(), "Seeds >= 100".into()],
            }],
            ..FilterSource::default()
        };
        let compiled = Expressions::compile(&filter).expect("compile");
        let ctx = EvalContext::new(&torrent, &matcher);
        let outcome = all_match(&compiled.labels[0].updates, &ctx);
        assert!(!outcome.matched);
    }

    #[test]
    fn free_space_reads_accountant() {
        use harrow_core::FreeSpaceAccountant;

        let torrent = sample_torrent();
        let matcher = StatusMatcher::default();
        let filter = FilterSource {
            remove: vec!["FreeSpaceSet && FreeSpaceGB() < 100.0".into()],
            ..FilterSource::default()
        };
        let compiled = Expressions::compile(&filter).expect("compile");

        let ctx = EvalContext::new(&torrent, &matcher);
        assert!(!any_match(&compiled.removes, &ctx).matched);

        let mut accountant = FreeSpaceAccountant::default();
        accountant.set_bytes(50 * 1_073_741_824);
        let ctx = EvalContext {
            free_space: Some(&accountant),
            ..EvalContext::new(&torrent, &matcher)
        };
        assert!(any_match(&compiled.removes, &ctx).matched);
    }
}
