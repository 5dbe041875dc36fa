//! The `relabel` action.

use std::time::Duration;

use tracing::{debug, info, warn};

use harrow_client::ClientAdapter;
use harrow_config::{Config, FilterConfig};
use harrow_core::FreeSpaceAccountant;
use harrow_filemap::TorrentFileMap;
use harrow_rules::Expressions;

use crate::decide::RuleSet;
use crate::error::EngineResult;
use crate::Engine;

/// Counters reported by a `relabel` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelabelSummary {
    /// Torrents with no matching label rule or already labelled right.
    pub ignored: usize,
    /// Torrents skipped because their files are shared and cross-seed
    /// relabeling was not enabled.
    pub non_unique: usize,
    /// Torrents relabelled.
    pub relabeled: usize,
    /// Failed relabel attempts.
    pub failures: usize,
}

impl Engine {
    /// Apply the first fully matching label rule to every torrent.
    ///
    /// `experimental_cross_seed` permits relabeling torrents whose files
    /// other torrents share, by hardlink-cloning the payload into the
    /// label's directory.
    pub async fn relabel(
        &self,
        adapter: &dyn ClientAdapter,
        cfg: &Config,
        client_name: &str,
        filter: &FilterConfig,
        experimental_cross_seed: bool,
    ) -> EngineResult<RelabelSummary> {
        let client_cfg = cfg.client(client_name)?;
        let expressions = Expressions::compile(&filter.to_source())?;

        adapter.connect().await?;
        info!(client = client_name, plugins = self.oracle.plugins_loaded(), "connected");

        let mut accountant = FreeSpaceAccountant::default();
        self.query_free_space(adapter, client_cfg, &expressions, &mut accountant)
            .await?;

        adapter.load_label_path_map().await?;

        let mut torrents = adapter.get_torrents().await?;
        info!(count = torrents.len(), "retrieved torrents");

        let foi = TorrentFileMap::new(torrents.values());
        info!(files = foi.len(), "mapped torrents to unique torrent files");

        let rules = RuleSet {
            expressions: &expressions,
            matcher: self.oracle.matcher(),
        };
        let needs_oracle = expressions.references_unregistered();

        let mut summary = RelabelSummary::default();

        let hashes: Vec<String> = torrents.keys().cloned().collect();
        for hash in hashes {
            if self.cancelled() {
                warn!("run cancelled; stopping before further relabels");
                break;
            }
            let Some(mut torrent) = torrents.get(&hash).cloned() else {
                continue;
            };
            self.resolve_registration(&mut torrent, needs_oracle).await;
            let force_down = self.oracle.is_degraded_for(&torrent.tracker_name);

            let ctx = rules.context(&torrent, Some(&accountant), force_down);
            let Some(label) = rules.should_relabel(&ctx) else {
                debug!(name = %torrent.name, "no label rule matched");
                summary.ignored += 1;
                continue;
            };

            if label == torrent.label {
                debug!(name = %torrent.name, label, "torrent already has the correct label");
                summary.ignored += 1;
                continue;
            }

            let mut hardlink = false;
            if !foi.is_unique(&torrent) {
                if !experimental_cross_seed {
                    // shared payload; an automatic move could pull the
                    // data out from under the other torrents
                    summary.non_unique += 1;
                    warn!(
                        name = %torrent.name,
                        label = %torrent.label,
                        tracker = %torrent.tracker_name,
                        "skipping non-unique torrent"
                    );
                    continue;
                }
                hardlink = true;
            }

            if hardlink {
                let label_path = adapter.label_path_map().get(label).cloned().unwrap_or_default();
                info!(
                    name = %torrent.name,
                    label,
                    label_path = %label_path,
                    "relabeling with hardlinks"
                );
            } else {
                info!(name = %torrent.name, label, "relabeling");
            }

            if self.dry_run {
                warn!("dry-run enabled, skipping relabel");
            } else {
                if let Err(err) = adapter.set_torrent_label(&hash, label, hardlink).await {
                    warn!(name = %torrent.name, error = %err, "failed relabeling torrent");
                    summary.failures += 1;
                    continue;
                }
                info!("relabeled");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }

            summary.relabeled += 1;
        }

        info!(
            ignored = summary.ignored,
            non_unique = summary.non_unique,
            relabeled = summary.relabeled,
            failures = summary.failures,
            "relabel finished"
        );
        Ok(summary)
    }
}
