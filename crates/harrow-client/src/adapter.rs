//! The contract every torrent client adapter satisfies.

use std::collections::HashMap;

use async_trait::async_trait;

use harrow_core::Torrent;

use crate::error::ClientResult;

/// Single interface abstracting qBittorrent and Deluge.
///
/// All mutating calls are expected to be idempotent from the engine's
/// point of view: the engine never retries, it only logs and moves on.
#[async_trait]
pub trait ClientAdapter: Send + Sync {
    /// Human-readable client type, e.g. `qBittorrent`.
    fn client_type(&self) -> &str;

    /// Establish and verify the session.
    async fn connect(&self) -> ClientResult<()>;

    /// Snapshot every torrent known to the client, keyed by infohash.
    async fn get_torrents(&self) -> ClientResult<HashMap<String, Torrent>>;

    /// Remove one torrent, optionally deleting its data.
    ///
    /// Implementations perform the full pause → resume → reannounce →
    /// delete ladder with the prescribed sleeps, so the tracker observes
    /// a final announce before the listing disappears.
    async fn remove_torrent(&self, torrent: &Torrent, delete_data: bool) -> ClientResult<bool>;

    /// Apply a label/category; `hardlink` requests the experimental
    /// cross-seed move that clones files into the label path first.
    async fn set_torrent_label(&self, hash: &str, label: &str, hardlink: bool) -> ClientResult<()>;

    /// Set the per-torrent upload limit in bytes per second; −1 lifts it.
    async fn set_upload_limit(&self, hash: &str, bytes_per_sec: i64) -> ClientResult<()>;

    /// Free bytes on the volume behind `path` (empty for clients that
    /// know their own download volume).
    async fn get_current_free_space(&self, path: &str) -> ClientResult<i64>;

    /// Load the label → directory map used by hardlink relabels.
    async fn load_label_path_map(&self) -> ClientResult<()>;

    /// The label → directory map loaded by [`Self::load_label_path_map`].
    fn label_path_map(&self) -> HashMap<String, String>;

    /// Pause every torrent in one batch call.
    async fn pause_torrents(&self, hashes: &[String]) -> ClientResult<()>;

    /// Tag operations, for clients that have tags.
    fn tag_adapter(&self) -> Option<&dyn TagAdapter> {
        None
    }
}

/// Tag operations exposed by tag-capable clients (qBittorrent).
#[async_trait]
pub trait TagAdapter: Send + Sync {
    /// Replace the torrent's tag set in one call.
    ///
    /// Returns [`crate::ClientError::UnsupportedVersion`] when the
    /// server predates the call; callers then fall back to separate
    /// add/remove calls.
    async fn set_tags(&self, hash: &str, tags: &[String]) -> ClientResult<()>;

    /// Add tags to a torrent.
    async fn add_tags(&self, hash: &str, tags: &[String]) -> ClientResult<()>;

    /// Remove tags from a torrent.
    async fn remove_tags(&self, hash: &str, tags: &[String]) -> ClientResult<()>;

    /// Create tags server-side; existing tags are left untouched.
    async fn create_tags(&self, tags: &[String]) -> ClientResult<()>;

    /// Delete tags server-side.
    async fn delete_tags(&self, tags: &[String]) -> ClientResult<()>;
}
