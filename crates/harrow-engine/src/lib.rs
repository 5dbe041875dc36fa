#![forbid(unsafe_code)]

//! Reconciliation engine.
//!
//! Each action is a one-shot batch over the client's current state:
//! compile the filter, snapshot every torrent, build the overlap
//! indexes, then walk torrents sequentially applying decisions. Fatal
//! errors abort the run; per-torrent failures are logged and counted.

mod clean;
mod decide;
mod error;
mod orphan;
mod pause;
mod relabel;
mod retag;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use clean::CleanSummary;
pub use decide::RetagPlan;
pub use error::{EngineError, EngineResult};
pub use orphan::OrphanSummary;
pub use pause::PauseSummary;
pub use relabel::RelabelSummary;
pub use retag::RetagSummary;

use harrow_client::ClientAdapter;
use harrow_config::{ClientConfig, ClientKind};
use harrow_core::{FreeSpaceAccountant, RegistrationState, Torrent};
use harrow_rules::Expressions;
use harrow_trackers::Oracle;
use tracing::{error, info};

/// Shared state driving every action.
pub struct Engine {
    oracle: Oracle,
    dry_run: bool,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    /// Build an engine around a configured oracle.
    #[must_use]
    pub fn new(oracle: Oracle, dry_run: bool) -> Self {
        Self {
            oracle,
            dry_run,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that aborts the run cooperatively; hand it to a signal
    /// handler. No further work is enqueued once set, and in-flight
    /// per-torrent calls finish or fail on their own.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Resolve the oracle for one torrent when the action needs it,
    /// caching the outcome on the snapshot.
    async fn resolve_registration(&self, torrent: &mut Torrent, needed: bool) {
        if needed && torrent.registration == RegistrationState::Unknown {
            torrent.registration = self.oracle.resolve(torrent).await;
        }
    }

    /// Query free space per client kind. qBittorrent knows its own
    /// volume and a failure is survivable; Deluge needs a configured
    /// path, which is only fatal when some rule reads the figures.
    async fn query_free_space(
        &self,
        adapter: &dyn ClientAdapter,
        client_cfg: &ClientConfig,
        expressions: &Expressions,
        accountant: &mut FreeSpaceAccountant,
    ) -> EngineResult<()> {
        match client_cfg.kind {
            ClientKind::Qbittorrent => {
                match adapter.get_current_free_space("").await {
                    Ok(bytes) => {
                        accountant.set_bytes(bytes);
                        info!(free_gb = accountant.gb(), "retrieved free space");
                    }
                    Err(err) => error!(error = %err, "failed retrieving free space"),
                }
            }
            ClientKind::Deluge => {
                if let Some(path) = client_cfg.free_space_path.as_deref() {
                    let bytes = adapter.get_current_free_space(path).await?;
                    accountant.set_bytes(bytes);
                    info!(
                        path,
                        free_gb = accountant.gb(),
                        "retrieved free space"
                    );
                } else if expressions.references_free_space() {
                    return Err(EngineError::FreeSpacePathRequired);
                }
            }
        }
        Ok(())
    }
}
