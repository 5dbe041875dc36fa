//! The `pause` action.

use tracing::{debug, info, warn};

use harrow_client::ClientAdapter;
use harrow_config::{Config, FilterConfig};
use harrow_core::FreeSpaceAccountant;
use harrow_rules::Expressions;

use crate::decide::RuleSet;
use crate::error::EngineResult;
use crate::Engine;

/// Counters reported by a `pause` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PauseSummary {
    /// Torrents skipped by the ignore rules.
    pub ignored: usize,
    /// Torrents submitted for pausing (or that would have been, in
    /// dry-run mode).
    pub paused: usize,
}

impl Engine {
    /// Collect every torrent matching the pause rules and submit one
    /// batch pause.
    pub async fn pause(
        &self,
        adapter: &dyn ClientAdapter,
        cfg: &Config,
        client_name: &str,
        filter: &FilterConfig,
    ) -> EngineResult<PauseSummary> {
        let client_cfg = cfg.client(client_name)?;
        let expressions = Expressions::compile(&filter.to_source())?;

        adapter.connect().await?;
        info!(client = client_name, plugins = self.oracle.plugins_loaded(), "connected");

        let mut accountant = FreeSpaceAccountant::default();
        self.query_free_space(adapter, client_cfg, &expressions, &mut accountant)
            .await?;

        let torrents = adapter.get_torrents().await?;
        info!(count = torrents.len(), "retrieved torrents");

        let rules = RuleSet {
            expressions: &expressions,
            matcher: self.oracle.matcher(),
        };
        let needs_oracle = expressions.references_unregistered();

        let mut summary = PauseSummary::default();
        let mut pause_list: Vec<String> = Vec::new();

        for (hash, torrent) in &torrents {
            if self.cancelled() {
                warn!("run cancelled; stopping pause collection");
                break;
            }
            let mut torrent = torrent.clone();
            self.resolve_registration(&mut torrent, needs_oracle).await;
            let force_down = self.oracle.is_degraded_for(&torrent.tracker_name);

            let ctx = rules.context(&torrent, Some(&accountant), force_down);

            if rules.should_ignore(&ctx) {
                debug!(name = %torrent.name, "ignoring torrent");
                summary.ignored += 1;
                continue;
            }

            if rules.should_pause(&ctx) {
                info!(name = %torrent.name, "adding torrent to pause list");
                pause_list.push(hash.clone());
            }
        }

        summary.paused = pause_list.len();

        if self.dry_run {
            warn!(count = pause_list.len(), "dry-run enabled, skipping pause");
        } else if pause_list.is_empty() {
            info!("no torrents to pause");
        } else {
            adapter.pause_torrents(&pause_list).await?;
            info!(count = pause_list.len(), "paused torrents");
        }

        Ok(summary)
    }
}
