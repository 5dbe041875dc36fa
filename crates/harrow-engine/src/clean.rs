//! The `clean` action: cross-seed-aware two-phase removal.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use harrow_client::ClientAdapter;
use harrow_config::{Config, FilterConfig};
use harrow_core::{FreeSpaceAccountant, RegistrationState, Torrent};
use harrow_filemap::{
    HardlinkFileMap, HardlinkIndex, NoopHardlinkFileMap, PathMappings, TorrentFileMap,
};
use harrow_rules::Expressions;

use crate::decide::RuleSet;
use crate::error::EngineResult;
use crate::Engine;

/// Counters reported by a `clean` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanSummary {
    /// Torrents skipped by the ignore rules.
    pub ignored: usize,
    /// Torrents removed (including phase-2 candidates).
    pub removed: usize,
    /// Hardlinked candidates seen in phase 1.
    pub hardlinked_candidates: usize,
    /// File-overlap candidates seen in phase 1.
    pub file_overlap_candidates: usize,
    /// Candidates that became removable in phase 2.
    pub removed_candidates: usize,
    /// Failed removal attempts.
    pub failures: usize,
    /// Bytes of payload belonging to removed torrents.
    pub reclaimed_bytes: i64,
}

/// Candidate class from the uniqueness check. When both indexes flag a
/// torrent, file overlap wins and its data is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateClass {
    FileOverlap,
    Hardlinked,
}

struct RemovalContext<'a> {
    adapter: &'a dyn ClientAdapter,
    foi: &'a TorrentFileMap,
}

impl Engine {
    /// Remove every torrent matching the filter, never deleting data
    /// another torrent still needs unless the tracker has already
    /// dropped the listing.
    pub async fn clean(
        &self,
        adapter: &dyn ClientAdapter,
        cfg: &Config,
        client_name: &str,
        filter: &FilterConfig,
    ) -> EngineResult<CleanSummary> {
        let client_cfg = cfg.client(client_name)?;
        let expressions = Expressions::compile(&filter.to_source())?;

        adapter.connect().await?;
        info!(client = client_name, plugins = self.oracle.plugins_loaded(), "connected");

        let mut accountant = FreeSpaceAccountant::default();
        self.query_free_space(adapter, client_cfg, &expressions, &mut accountant)
            .await?;

        let mut torrents = adapter.get_torrents().await?;
        info!(count = torrents.len(), "retrieved torrents");

        let foi = TorrentFileMap::new(torrents.values());
        info!(files = foi.len(), "mapped torrents to unique torrent files");

        let mappings = PathMappings::new(client_cfg.download_path_mapping.clone());
        let mut hli: Box<dyn HardlinkIndex> = if filter.maps_hardlinks_for("clean") {
            let index = HardlinkFileMap::new(torrents.values(), mappings);
            info!(identities = index.len(), "mapped torrent files to file identities");
            Box::new(index)
        } else {
            warn!(
                "not mapping hardlinks; add `clean` to MapHardlinksFor if torrents share files via hardlinks"
            );
            Box::new(NoopHardlinkFileMap)
        };

        for torrent in torrents.values_mut() {
            torrent.hardlinked_outside_client = hli.hardlinked_outside_client(torrent);
        }

        let delete_data = filter.delete_data.unwrap_or(true);
        let rules = RuleSet {
            expressions: &expressions,
            matcher: self.oracle.matcher(),
        };

        let mut summary = CleanSummary::default();
        let mut overlap_candidates: HashMap<String, (Torrent, String)> = HashMap::new();
        let mut hardlink_candidates: HashMap<String, (Torrent, String)> = HashMap::new();

        let hashes: Vec<String> = torrents.keys().cloned().collect();
        for hash in hashes {
            if self.cancelled() {
                warn!("run cancelled; stopping before further removals");
                break;
            }
            let Some(mut torrent) = torrents.get(&hash).cloned() else {
                continue;
            };

            self.resolve_registration(&mut torrent, true).await;
            if let Some(stored) = torrents.get_mut(&hash) {
                stored.registration = torrent.registration;
            }
            let unregistered = torrent.registration == RegistrationState::Unregistered;
            let force_down = self.oracle.is_degraded_for(&torrent.tracker_name);

            let ctx = rules.context(&torrent, Some(&accountant), force_down);

            if rules.should_ignore(&ctx)
                && !(cfg.bypass_ignore_if_unregistered && unregistered)
            {
                debug!(name = %torrent.name, "ignoring torrent");
                torrents.remove(&hash);
                summary.ignored += 1;
                continue;
            }

            let Some(reason) = rules.should_remove(&ctx) else {
                continue;
            };

            let foi_unique = foi.is_unique(&torrent);
            let hli_unique = hli.is_torrent_unique(&torrent);

            let removal = RemovalContext { adapter, foi: &foi };

            if foi_unique && hli_unique {
                self.remove_one(
                    &removal,
                    &mut *hli,
                    &mut torrents,
                    &mut accountant,
                    &mut summary,
                    &torrent,
                    &reason,
                    delete_data,
                )
                .await;
                continue;
            }

            let class = if foi_unique {
                CandidateClass::Hardlinked
            } else {
                CandidateClass::FileOverlap
            };

            if unregistered {
                // safety checks do not protect a listing the tracker
                // already dropped; hardlinked data survives through the
                // remaining links, overlap data must be kept
                let with_data = delete_data && class == CandidateClass::Hardlinked;
                info!(
                    name = %torrent.name,
                    class = ?class,
                    "removing unregistered non-unique torrent"
                );
                self.remove_one(
                    &removal,
                    &mut *hli,
                    &mut torrents,
                    &mut accountant,
                    &mut summary,
                    &torrent,
                    &reason,
                    with_data,
                )
                .await;
                continue;
            }

            match class {
                CandidateClass::Hardlinked => {
                    warn!(name = %torrent.name, tracker = %torrent.tracker_name, "skipping non-unique torrent (hardlinked)");
                    summary.hardlinked_candidates += 1;
                    hardlink_candidates.insert(hash, (torrent, reason));
                }
                CandidateClass::FileOverlap => {
                    warn!(name = %torrent.name, tracker = %torrent.tracker_name, "skipping non-unique torrent (file overlap)");
                    summary.file_overlap_candidates += 1;
                    overlap_candidates.insert(hash, (torrent, reason));
                }
            }
        }

        info!(
            hardlinked = summary.hardlinked_candidates,
            file_overlap = summary.file_overlap_candidates,
            "finished initial check"
        );

        // phase 2: pretend every candidate is gone, then re-test each
        for (torrent, _) in overlap_candidates.values() {
            foi.remove(torrent);
            hli.remove_torrent(torrent);
        }
        for (torrent, _) in hardlink_candidates.values() {
            foi.remove(torrent);
            hli.remove_torrent(torrent);
        }

        for (_hash, (torrent, reason)) in &overlap_candidates {
            if self.cancelled() {
                break;
            }
            if !(foi.no_instances(torrent) && hli.no_instances(torrent)) {
                debug!(name = %torrent.name, "still not unique after virtual removal");
                continue;
            }
            let removal = RemovalContext { adapter, foi: &foi };
            // pure overlap: the other torrent's bytes stay on disk
            self.remove_one(
                &removal,
                &mut *hli,
                &mut torrents,
                &mut accountant,
                &mut summary,
                torrent,
                reason,
                false,
            )
            .await;
            summary.removed_candidates += 1;
        }

        for (_hash, (torrent, reason)) in &hardlink_candidates {
            if self.cancelled() {
                break;
            }
            if !(foi.no_instances(torrent) && hli.no_instances(torrent)) {
                debug!(name = %torrent.name, "still not unique after virtual removal");
                continue;
            }
            let removal = RemovalContext { adapter, foi: &foi };
            self.remove_one(
                &removal,
                &mut *hli,
                &mut torrents,
                &mut accountant,
                &mut summary,
                torrent,
                reason,
                delete_data,
            )
            .await;
            summary.removed_candidates += 1;
        }

        info!(
            ignored = summary.ignored,
            removed = summary.removed,
            removed_candidates = summary.removed_candidates,
            failures = summary.failures,
            reclaimed_bytes = summary.reclaimed_bytes,
            "clean finished"
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn remove_one(
        &self,
        removal: &RemovalContext<'_>,
        hli: &mut dyn HardlinkIndex,
        torrents: &mut HashMap<String, Torrent>,
        accountant: &mut FreeSpaceAccountant,
        summary: &mut CleanSummary,
        torrent: &Torrent,
        reason: &str,
        delete_data: bool,
    ) {
        if accountant.is_known() {
            info!(
                name = %torrent.name,
                bytes = torrent.downloaded_bytes,
                free_gb = accountant.gb(),
                "removing torrent"
            );
        } else {
            info!(name = %torrent.name, bytes = torrent.downloaded_bytes, "removing torrent");
        }
        debug!(reason, "removal reason");

        // keep the identity index current before the client forgets the
        // torrent
        hli.remove_torrent(torrent);

        if self.dry_run {
            warn!("dry-run enabled, skipping remove");
        } else {
            match removal.adapter.remove_torrent(torrent, delete_data).await {
                Ok(true) => {
                    if delete_data {
                        info!("removed with data");
                    } else {
                        info!("removed (kept data on disk)");
                    }
                    if delete_data && accountant.is_known() {
                        accountant.add_bytes(torrent.downloaded_bytes);
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok(false) => {
                    warn!(name = %torrent.name, "client did not remove torrent");
                    torrents.remove(&torrent.hash);
                    summary.failures += 1;
                    return;
                }
                Err(err) => {
                    warn!(name = %torrent.name, error = %err, "failed removing torrent");
                    torrents.remove(&torrent.hash);
                    summary.failures += 1;
                    return;
                }
            }
        }

        summary.reclaimed_bytes += torrent.downloaded_bytes;
        summary.removed += 1;

        removal.foi.remove(torrent);
        torrents.remove(&torrent.hash);
    }
}
