//! The `orphan` action: delete files and directories no torrent owns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use harrow_client::ClientAdapter;
use harrow_config::{Config, FilterConfig};
use harrow_filemap::{PathMappings, TorrentFileMap};

use crate::error::{EngineError, EngineResult};
use crate::Engine;

const MAX_WORKERS: usize = 10;
const BATCH_SIZE: usize = 50;

/// Counters reported by an `orphan` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrphanSummary {
    /// Orphan files removed (or counted in dry-run mode).
    pub removed_files: u32,
    /// Files skipped by the configured ignore prefixes.
    pub ignored_files: u32,
    /// Empty orphan directories removed.
    pub removed_dirs: u32,
    /// Failed delete attempts.
    pub failures: u32,
    /// Bytes belonging to removed files.
    pub reclaimed_bytes: u64,
}

struct ScanShared {
    foi: TorrentFileMap,
    mappings: PathMappings,
    ignore_paths: Vec<String>,
    grace_period: Duration,
    dry_run: bool,
    removed_files: AtomicU32,
    ignored_files: AtomicU32,
    failures: AtomicU32,
    reclaimed_bytes: AtomicU64,
}

impl Engine {
    /// Walk the download root once and delete everything no torrent
    /// claims, subject to the grace period and ignore prefixes.
    pub async fn orphan(
        &self,
        adapter: &dyn ClientAdapter,
        cfg: &Config,
        client_name: &str,
        filter: &FilterConfig,
    ) -> EngineResult<OrphanSummary> {
        let client_cfg = cfg.client(client_name)?;
        let download_path = client_cfg
            .download_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or(EngineError::DownloadPathRequired)?
            .to_string();

        adapter.connect().await?;
        info!(client = client_name, "connected");

        let torrents = adapter.get_torrents().await?;
        info!(count = torrents.len(), "retrieved torrents");

        let foi = TorrentFileMap::new(torrents.values());
        info!(files = foi.len(), "mapped torrents to unique torrent files");

        let mappings = PathMappings::new(client_cfg.download_path_mapping.clone());
        let grace_period = cfg.orphan_grace_period(filter);
        debug!(grace_secs = grace_period.as_secs(), "using grace period");

        // one walk collects both maps; symlinks are not followed and
        // the root itself is excluded
        let mut files: HashMap<PathBuf, u64> = HashMap::new();
        let mut dirs: Vec<PathBuf> = Vec::new();
        let root = Path::new(&download_path);
        for entry in walkdir::WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // an unreadable root aborts; anything deeper is
                    // logged and walked around
                    if err.depth() == 0 {
                        return Err(EngineError::Scan {
                            path: root.to_path_buf(),
                            source: err,
                        });
                    }
                    warn!(error = %err, "failed reading entry during walk");
                    continue;
                }
            };
            if entry.path() == root {
                continue;
            }
            if entry.file_type().is_dir() {
                dirs.push(entry.path().to_path_buf());
            } else {
                let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                files.insert(entry.path().to_path_buf(), size);
            }
        }
        info!(
            files = files.len(),
            dirs = dirs.len(),
            root = %root.display(),
            "retrieved paths from download root"
        );

        let shared = Arc::new(ScanShared {
            foi,
            mappings,
            ignore_paths: filter.orphan.ignore_paths.clone(),
            grace_period,
            dry_run: self.dry_run,
            removed_files: AtomicU32::new(0),
            ignored_files: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            reclaimed_bytes: AtomicU64::new(0),
        });

        let semaphore = Arc::new(Semaphore::new(MAX_WORKERS));
        let mut handles = Vec::new();
        let file_list: Vec<(PathBuf, u64)> = files.into_iter().collect();

        for batch in file_list.chunks(BATCH_SIZE) {
            if self.cancelled() {
                warn!("run cancelled; stopping file submission");
                break;
            }
            for (path, size) in batch.iter().cloned() {
                let shared = shared.clone();
                let semaphore = semaphore.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    process_file(&shared, &path, size);
                }));
            }
        }
        for handle in handles {
            let _ = handle.await;
        }

        // deepest directories first, so children go before parents
        let mut orphan_dirs: Vec<PathBuf> = dirs
            .into_iter()
            .filter(|dir| {
                !shared
                    .foi
                    .has_path(&dir.to_string_lossy(), &shared.mappings)
                    && !is_ignored(&shared.ignore_paths, dir)
            })
            .collect();
        orphan_dirs.sort_by(|a, b| {
            b.as_os_str()
                .len()
                .cmp(&a.as_os_str().len())
        });
        debug!(count = orphan_dirs.len(), "processing potential orphan directories");

        let mut removed_dirs = 0_u32;
        for dir in orphan_dirs {
            match is_dir_empty(&dir) {
                Ok(false) => {
                    warn!(path = %dir.display(), "orphan directory is not empty, skipping removal");
                }
                Ok(true) => {
                    info!(path = %dir.display(), "removing empty orphan directory");
                    if self.dry_run {
                        warn!("dry-run enabled, skipping remove");
                        removed_dirs += 1;
                    } else if let Err(err) = std::fs::remove_dir(&dir) {
                        warn!(path = %dir.display(), error = %err, "failed removing orphan directory");
                        shared.failures.fetch_add(1, Ordering::Relaxed);
                    } else {
                        removed_dirs += 1;
                    }
                }
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "could not check directory, skipping removal");
                }
            }
        }

        let summary = OrphanSummary {
            removed_files: shared.removed_files.load(Ordering::Relaxed),
            ignored_files: shared.ignored_files.load(Ordering::Relaxed),
            removed_dirs,
            failures: shared.failures.load(Ordering::Relaxed),
            reclaimed_bytes: shared.reclaimed_bytes.load(Ordering::Relaxed),
        };
        info!(
            removed_files = summary.removed_files,
            removed_dirs = summary.removed_dirs,
            ignored_files = summary.ignored_files,
            failures = summary.failures,
            reclaimed_bytes = summary.reclaimed_bytes,
            "orphan scan finished"
        );
        Ok(summary)
    }
}

fn process_file(shared: &ScanShared, path: &Path, size: u64) {
    let path_str = path.to_string_lossy();

    if shared.foi.has_path(&path_str, &shared.mappings) {
        return;
    }
    if is_ignored(&shared.ignore_paths, path) {
        shared.ignored_files.fetch_add(1, Ordering::Relaxed);
        return;
    }

    // a zero grace period disables the age check
    if !shared.grace_period.is_zero() {
        let modified = match std::fs::symlink_metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not stat file, skipping removal check");
                return;
            }
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age < shared.grace_period {
            warn!(path = %path.display(), "file is within the grace period, skipping removal");
            return;
        }
    }

    info!(path = %path.display(), "removing orphan");

    if shared.dry_run {
        warn!("dry-run enabled, skipping remove");
    } else if let Err(err) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "failed removing orphan");
        shared.failures.fetch_add(1, Ordering::Relaxed);
        return;
    }

    shared.removed_files.fetch_add(1, Ordering::Relaxed);
    shared.reclaimed_bytes.fetch_add(size, Ordering::Relaxed);
}

fn is_ignored(ignore_paths: &[String], path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    ignore_paths
        .iter()
        .any(|prefix| path_str.starts_with(prefix.as_str()))
}

fn is_dir_empty(path: &Path) -> std::io::Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}
