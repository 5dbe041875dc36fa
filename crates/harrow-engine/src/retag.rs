//! The `retag` action (tag-capable clients only).

use tracing::{debug, info, warn};

use harrow_client::{ClientAdapter, ClientError};
use harrow_config::{Config, FilterConfig};
use harrow_core::FreeSpaceAccountant;
use harrow_rules::Expressions;

use crate::decide::RuleSet;
use crate::error::EngineResult;
use crate::Engine;

/// Counters reported by a `retag` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetagSummary {
    /// Torrents with no tag actions.
    pub ignored: usize,
    /// Torrents whose tags or upload limit changed.
    pub retagged: usize,
    /// Torrents where at least one call failed.
    pub failures: usize,
}

impl Engine {
    /// Reconcile tags and per-torrent upload limits against the tag
    /// rules.
    pub async fn retag(
        &self,
        adapter: &dyn ClientAdapter,
        cfg: &Config,
        client_name: &str,
        filter: &FilterConfig,
    ) -> EngineResult<RetagSummary> {
        let client_cfg = cfg.client(client_name)?;
        let expressions = Expressions::compile(&filter.to_source())?;

        adapter.connect().await?;
        info!(client = client_name, plugins = self.oracle.plugins_loaded(), "connected");

        let Some(tagger) = adapter.tag_adapter() else {
            return Err(ClientError::TagsUnsupported.into());
        };

        let mut accountant = FreeSpaceAccountant::default();
        self.query_free_space(adapter, client_cfg, &expressions, &mut accountant)
            .await?;

        // every tag a rule manages must exist before the first change
        let rule_tags: Vec<String> = expressions
            .tags
            .iter()
            .map(|rule| rule.name.clone())
            .collect();
        if !rule_tags.is_empty() && !self.dry_run {
            tagger.create_tags(&rule_tags).await?;
        }

        let mut torrents = adapter.get_torrents().await?;
        info!(count = torrents.len(), "retrieved torrents");

        let rules = RuleSet {
            expressions: &expressions,
            matcher: self.oracle.matcher(),
        };
        let needs_oracle = expressions.references_unregistered();

        let mut summary = RetagSummary::default();

        let hashes: Vec<String> = torrents.keys().cloned().collect();
        for hash in hashes {
            if self.cancelled() {
                warn!("run cancelled; stopping before further retags");
                break;
            }
            let Some(torrent) = torrents.get_mut(&hash) else {
                continue;
            };
            let mut torrent = torrent.clone();
            self.resolve_registration(&mut torrent, needs_oracle).await;
            let force_down = self.oracle.is_degraded_for(&torrent.tracker_name);

            let ctx = rules.context(&torrent, Some(&accountant), force_down);
            let plan = rules.retag_plan(&torrent, &ctx);

            if plan.is_empty() {
                debug!(name = %torrent.name, "no tag actions");
                summary.ignored += 1;
                continue;
            }

            let mut final_tags: Vec<String> = torrent
                .tags
                .iter()
                .filter(|tag| !plan.remove.contains(tag))
                .cloned()
                .collect();
            final_tags.extend(plan.add.iter().cloned());

            info!(
                name = %torrent.name,
                tags = %final_tags.join(", "),
                upload_kb = plan.upload_kb,
                "tag actions"
            );

            if self.dry_run {
                warn!("dry-run enabled, skipping actions");
                summary.retagged += 1;
                continue;
            }

            let mut failed = false;
            match tagger.set_tags(&hash, &final_tags).await {
                Ok(()) => debug!(tags = %final_tags.join(", "), "set tags"),
                Err(ClientError::UnsupportedVersion) => {
                    debug!("client version lacks tag replacement; using add/remove");
                    if !plan.add.is_empty() {
                        if let Err(err) = tagger.add_tags(&hash, &plan.add).await {
                            warn!(name = %torrent.name, error = %err, "failed adding tags");
                            failed = true;
                        }
                    }
                    if !plan.remove.is_empty() && !failed {
                        if let Err(err) = tagger.remove_tags(&hash, &plan.remove).await {
                            warn!(name = %torrent.name, error = %err, "failed removing tags");
                            failed = true;
                        }
                    }
                }
                Err(err) => {
                    warn!(name = %torrent.name, error = %err, "failed setting tags");
                    failed = true;
                }
            }

            if let Some(limit_kb) = plan.upload_kb {
                if !failed {
                    let bytes = if limit_kb < 0 { -1 } else { limit_kb * 1024 };
                    if let Err(err) = adapter.set_upload_limit(&hash, bytes).await {
                        warn!(
                            name = %torrent.name,
                            limit_kb,
                            error = %err,
                            "failed setting upload limit"
                        );
                        failed = true;
                    } else {
                        debug!(limit_kb, "set upload limit");
                    }
                }
            }

            if failed {
                summary.failures += 1;
            } else {
                summary.retagged += 1;
            }
        }

        info!(
            ignored = summary.ignored,
            retagged = summary.retagged,
            failures = summary.failures,
            "retag finished"
        );
        Ok(summary)
    }
}
