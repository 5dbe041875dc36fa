//! Per-torrent decisions derived from a compiled filter.

use harrow_core::{FreeSpaceAccountant, StatusMatcher, Torrent};
use harrow_rules::{all_match, any_match, EvalContext, Expressions};

/// Compiled filter plus the evaluation environment pieces.
pub(crate) struct RuleSet<'a> {
    pub(crate) expressions: &'a Expressions,
    pub(crate) matcher: &'a StatusMatcher,
}

/// Tag and upload-limit changes scheduled for one torrent.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetagPlan {
    /// Tags to add.
    pub add: Vec<String>,
    /// Tags to remove.
    pub remove: Vec<String>,
    /// Upload limit to apply in KiB/s; −1 means unlimited.
    pub upload_kb: Option<i64>,
}

impl RetagPlan {
    /// Whether the plan changes anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.upload_kb.is_none()
    }
}

impl<'a> RuleSet<'a> {
    pub(crate) fn context<'b>(
        &'b self,
        torrent: &'b Torrent,
        free_space: Option<&'b FreeSpaceAccountant>,
        force_tracker_down: bool,
    ) -> EvalContext<'b> {
        EvalContext {
            torrent,
            matcher: self.matcher,
            free_space,
            force_tracker_down,
        }
    }

    /// Ignore disjunction.
    pub(crate) fn should_ignore(&self, ctx: &EvalContext<'_>) -> bool {
        any_match(&self.expressions.ignores, ctx).matched
    }

    /// Remove disjunction, with the matching rule's text as the reason.
    pub(crate) fn should_remove(&self, ctx: &EvalContext<'_>) -> Option<String> {
        let outcome = any_match(&self.expressions.removes, ctx);
        if outcome.matched {
            Some(outcome.reason.unwrap_or_default().to_string())
        } else {
            None
        }
    }

    /// Pause disjunction.
    pub(crate) fn should_pause(&self, ctx: &EvalContext<'_>) -> bool {
        any_match(&self.expressions.pauses, ctx).matched
    }

    /// First label rule whose every update expression matches.
    pub(crate) fn should_relabel(&self, ctx: &EvalContext<'_>) -> Option<&'a str> {
        self.expressions
            .labels
            .iter()
            .find(|label| all_match(&label.updates, ctx).matched)
            .map(|label| label.name.as_str())
    }

    /// Walk the tag rules and accumulate the changes for one torrent.
    ///
    /// At most one rule per run may set the upload limit, and only when
    /// the torrent's current limit differs from the rule's.
    pub(crate) fn retag_plan(&self, torrent: &Torrent, ctx: &EvalContext<'_>) -> RetagPlan {
        let mut plan = RetagPlan::default();
        let mut limit_scheduled = false;

        for rule in &self.expressions.tags {
            let matched = all_match(&rule.updates, ctx).matched;
            let present = torrent.tags.iter().any(|tag| tag == &rule.name);

            if present && !matched && rule.mode.allows_remove() {
                plan.remove.push(rule.name.clone());
            }
            if !present && matched && rule.mode.allows_add() {
                plan.add.push(rule.name.clone());
            }

            if matched && !limit_scheduled {
                if let Some(wanted_kb) = rule.upload_kb {
                    let current_kb = if torrent.up_limit < 0 {
                        -1
                    } else {
                        torrent.up_limit / 1024
                    };
                    if current_kb != wanted_kb {
                        plan.upload_kb = Some(wanted_kb);
                        limit_scheduled = true;
                    }
                }
            }
        }

        plan
    }
}
