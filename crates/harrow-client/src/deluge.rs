//! Deluge adapter over the web UI's JSON-RPC endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use harrow_core::Torrent;

use crate::adapter::ClientAdapter;
use crate::error::{ClientError, ClientResult};

/// Torrent status fields requested from the daemon.
const STATUS_FIELDS: &[&str] = &[
    "name",
    "save_path",
    "total_size",
    "total_done",
    "state",
    "files",
    "label",
    "ratio",
    "time_added",
    "seeding_time",
    "total_seeds",
    "total_peers",
    "private",
    "max_upload_speed",
    "tracker_host",
    "tracker_status",
    "comment",
    "is_finished",
];

/// Connection settings for one Deluge web UI.
#[derive(Debug, Clone)]
pub struct DelugeSettings {
    /// Web UI host.
    pub host: String,
    /// Web UI port.
    pub port: u16,
    /// Web UI password.
    pub password: String,
    /// Whether the daemon speaks the v2 protocol; v2 batches pause calls.
    pub v2: bool,
}

/// Adapter over the Deluge web JSON-RPC API (cookie session auth).
pub struct Deluge {
    settings: DelugeSettings,
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
}

impl Deluge {
    /// Build an adapter; no I/O happens until [`ClientAdapter::connect`].
    #[must_use]
    pub fn new(settings: DelugeSettings) -> Self {
        let endpoint = format!("http://{}:{}/json", settings.host, settings.port);
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            settings,
            endpoint,
            http,
            next_id: AtomicU64::new(1),
        }
    }

    /// One JSON-RPC round trip; `None` when the daemon answered null,
    /// which is how Deluge acknowledges void methods.
    async fn call_opt<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> ClientResult<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "method": method, "params": params, "id": id }))
            .send()
            .await
            .map_err(|source| ClientError::Request { operation, source })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ClientError::Status { operation, status });
        }

        let envelope: RpcEnvelope<T> =
            response.json().await.map_err(|source| ClientError::Decode {
                operation,
                source: Box::new(source),
            })?;

        if let Some(error) = envelope.error {
            return Err(ClientError::Api {
                message: error.message,
            });
        }

        Ok(envelope.result)
    }

    /// One JSON-RPC round trip whose result must be present.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> ClientResult<T> {
        self.call_opt(operation, method, params)
            .await?
            .ok_or(ClientError::Api {
                message: "missing result".to_string(),
            })
    }

    async fn pause_hashes(&self, hashes: &[String]) -> ClientResult<()> {
        let method = if self.settings.v2 {
            "core.pause_torrents"
        } else {
            "core.pause_torrent"
        };
        self.call_opt::<Value>("deluge.pause", method, json!([hashes]))
            .await
            .map(|_| ())
    }

    async fn resume_hashes(&self, hashes: &[String]) -> ClientResult<()> {
        let method = if self.settings.v2 {
            "core.resume_torrents"
        } else {
            "core.resume_torrent"
        };
        self.call_opt::<Value>("deluge.resume", method, json!([hashes]))
            .await
            .map(|_| ())
    }
}

#[derive(Deserialize)]
struct StatusEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    total_done: i64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    files: Vec<StatusFile>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    ratio: f64,
    #[serde(default)]
    time_added: f64,
    #[serde(default)]
    seeding_time: i64,
    #[serde(default)]
    total_seeds: i64,
    #[serde(default)]
    total_peers: i64,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    max_upload_speed: f64,
    #[serde(default)]
    tracker_host: String,
    #[serde(default)]
    tracker_status: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    is_finished: bool,
}

#[derive(Deserialize)]
struct StatusFile {
    #[serde(default)]
    path: String,
}

fn status_to_torrent(hash: String, status: StatusEntry) -> Torrent {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64);
    let added_seconds = (now - status.time_added as i64).max(0);

    let save_path = status.save_path.trim_end_matches('/').to_string();
    let files = status
        .files
        .iter()
        .map(|file| format!("{save_path}/{}", file.path.trim_start_matches('/')))
        .collect();

    // max_upload_speed is KiB/s with -1 meaning unlimited
    let up_limit = if status.max_upload_speed < 0.0 {
        -1
    } else {
        (status.max_upload_speed * 1024.0) as i64
    };

    Torrent {
        hash,
        name: status.name,
        path: save_path,
        total_bytes: status.total_size,
        downloaded_bytes: status.total_done,
        state: status.state.clone(),
        files,
        tags: Vec::new(),
        downloaded: status.is_finished,
        seeding: status.state == "Seeding",
        ratio: status.ratio,
        added_seconds,
        seeding_seconds: status.seeding_time,
        label: status.label,
        seeds: status.total_seeds,
        peers: status.total_peers,
        is_private: status.private,
        up_limit,
        tracker_name: status.tracker_host,
        tracker_status: status.tracker_status,
        all_tracker_statuses: None,
        comment: status.comment,
        ..Torrent::default()
    }
}

#[async_trait]
impl ClientAdapter for Deluge {
    fn client_type(&self) -> &str {
        "Deluge"
    }

    async fn connect(&self) -> ClientResult<()> {
        let authed: bool = self
            .call(
                "deluge.login",
                "auth.login",
                json!([self.settings.password]),
            )
            .await?;
        if !authed {
            return Err(ClientError::Unauthorized);
        }

        let connected: bool = self.call("deluge.connected", "web.connected", json!([])).await?;
        if !connected {
            // attach the web UI to the first configured daemon host
            let hosts: Vec<Vec<Value>> =
                self.call("deluge.get_hosts", "web.get_hosts", json!([])).await?;
            let host_id = hosts
                .first()
                .and_then(|host| host.first())
                .and_then(Value::as_str)
                .ok_or(ClientError::Connect {
                    operation: "deluge.connect",
                    source: None,
                })?
                .to_string();
            self.call_opt::<Value>("deluge.connect", "web.connect", json!([host_id]))
                .await?;
        }

        debug!("connected to Deluge web API");
        Ok(())
    }

    async fn get_torrents(&self) -> ClientResult<HashMap<String, Torrent>> {
        let statuses: HashMap<String, StatusEntry> = self
            .call(
                "deluge.torrents_status",
                "core.get_torrents_status",
                json!([{}, STATUS_FIELDS]),
            )
            .await?;

        Ok(statuses
            .into_iter()
            .map(|(hash, status)| {
                let torrent = status_to_torrent(hash.clone(), status);
                (hash, torrent)
            })
            .collect())
    }

    async fn remove_torrent(&self, torrent: &Torrent, delete_data: bool) -> ClientResult<bool> {
        let hashes = [torrent.hash.clone()];

        // final-announce ladder; Deluge's tracker plugin skips the
        // "torrent removed" announce without it
        self.pause_hashes(&hashes).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        self.resume_hashes(&hashes).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        self.call_opt::<Value>(
            "deluge.reannounce",
            "core.force_reannounce",
            json!([[&torrent.hash]]),
        )
        .await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let removed: bool = self
            .call(
                "deluge.remove",
                "core.remove_torrent",
                json!([&torrent.hash, delete_data]),
            )
            .await?;
        Ok(removed)
    }

    async fn set_torrent_label(&self, hash: &str, label: &str, hardlink: bool) -> ClientResult<()> {
        if hardlink {
            // the label plugin has no per-label paths to clone into
            return Err(ClientError::LabelPathMissing {
                label: label.to_string(),
            });
        }

        self.call_opt::<Value>(
            "deluge.set_label",
            "label.set_torrent",
            json!([hash, label]),
        )
        .await
        .map(|_| ())
    }

    async fn set_upload_limit(&self, hash: &str, bytes_per_sec: i64) -> ClientResult<()> {
        let kib = if bytes_per_sec < 0 {
            -1.0
        } else {
            bytes_per_sec as f64 / 1024.0
        };
        self.call_opt::<Value>(
            "deluge.set_upload_limit",
            "core.set_torrent_options",
            json!([[hash], { "max_upload_speed": kib }]),
        )
        .await
        .map(|_| ())
    }

    async fn get_current_free_space(&self, path: &str) -> ClientResult<i64> {
        self.call(
            "deluge.free_space",
            "core.get_free_space",
            json!([path]),
        )
        .await
    }

    async fn load_label_path_map(&self) -> ClientResult<()> {
        // Deluge labels carry no per-label directory
        Ok(())
    }

    fn label_path_map(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    async fn pause_torrents(&self, hashes: &[String]) -> ClientResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        self.pause_hashes(hashes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> StatusEntry {
        StatusEntry {
            name: "demo".into(),
            save_path: "/downloads/".into(),
            total_size: 100,
            total_done: 100,
            state: "Seeding".into(),
            files: vec![StatusFile {
                path: "demo/a.mkv".into(),
            }],
            label: "tv".into(),
            ratio: 1.25,
            time_added: 0.0,
            seeding_time: 3600,
            total_seeds: 4,
            total_peers: 2,
            private: true,
            max_upload_speed: 50.0,
            tracker_host: "landof.tv".into(),
            tracker_status: "Announce OK".into(),
            comment: String::new(),
            is_finished: true,
        }
    }

    #[test]
    fn status_maps_into_snapshot() {
        let torrent = status_to_torrent("abc".into(), entry());
        assert_eq!(torrent.hash, "abc");
        assert_eq!(torrent.files, vec!["/downloads/demo/a.mkv".to_string()]);
        assert!(torrent.downloaded);
        assert!(torrent.seeding);
        assert!(torrent.is_private);
        assert_eq!(torrent.up_limit, 50 * 1024);
        assert_eq!(torrent.label, "tv");
    }

    #[test]
    fn unlimited_upload_speed_round_trips() {
        let mut status = entry();
        status.max_upload_speed = -1.0;
        let torrent = status_to_torrent("abc".into(), status);
        assert_eq!(torrent.up_limit, -1);
    }
}
