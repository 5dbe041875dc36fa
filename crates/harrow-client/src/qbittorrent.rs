//! qBittorrent Web API adapter.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use harrow_core::Torrent;

use crate::adapter::{ClientAdapter, TagAdapter};
use crate::domain::{is_pseudo_tracker, registrable_domain};
use crate::error::{ClientError, ClientResult};

/// States in which the payload is still incomplete.
const IN_PROGRESS_STATES: &[&str] = &[
    "allocating",
    "checkingDL",
    "checkingResumeData",
    "downloading",
    "forcedDL",
    "metaDL",
    "moving",
    "pausedDL",
    "queuedDL",
    "stalledDL",
    "stoppedDL",
];

/// States in which the torrent is actively seeding.
const SEEDING_STATES: &[&str] = &["uploading", "stalledUP"];

/// Connection settings for one qBittorrent instance.
#[derive(Debug, Clone)]
pub struct QbittorrentSettings {
    /// Web UI base URL, e.g. `http://localhost:8080`.
    pub url: String,
    /// Web UI user.
    pub user: String,
    /// Web UI password.
    pub password: String,
    /// Re-enable automatic torrent management after a plain relabel.
    pub enable_auto_tmm_after_relabel: bool,
}

/// Adapter over the qBittorrent Web API (cookie session auth).
pub struct Qbittorrent {
    settings: QbittorrentSettings,
    base: String,
    http: reqwest::Client,
    label_paths: RwLock<HashMap<String, String>>,
}

impl Qbittorrent {
    /// Build an adapter; no I/O happens until [`ClientAdapter::connect`].
    #[must_use]
    pub fn new(settings: QbittorrentSettings) -> Self {
        let base = settings.url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_default();

        Self {
            settings,
            base,
            http,
            label_paths: RwLock::new(HashMap::new()),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.base)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<T> {
        let response = self
            .http
            .get(self.api(path))
            .query(query)
            .send()
            .await
            .map_err(|source| ClientError::Request { operation, source })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ClientError::Status { operation, status });
        }

        response.json::<T>().await.map_err(|source| ClientError::Decode {
            operation,
            source: Box::new(source),
        })
    }

    async fn get_text(
        &self,
        operation: &'static str,
        path: &str,
    ) -> ClientResult<String> {
        let response = self
            .http
            .get(self.api(path))
            .send()
            .await
            .map_err(|source| ClientError::Request { operation, source })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ClientError::Status { operation, status });
        }

        response.text().await.map_err(|source| ClientError::Decode {
            operation,
            source: Box::new(source),
        })
    }

    async fn post_form(
        &self,
        operation: &'static str,
        path: &str,
        form: &[(&str, &str)],
    ) -> ClientResult<()> {
        let response = self
            .http
            .post(self.api(path))
            .form(form)
            .send()
            .await
            .map_err(|source| ClientError::Request { operation, source })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ClientError::Status { operation, status });
        }
        Ok(())
    }

    /// POST to `preferred`, retrying against `fallback` when the server
    /// does not know the endpoint (qBittorrent 5 renamed pause/resume).
    async fn post_form_compat(
        &self,
        operation: &'static str,
        preferred: &str,
        fallback: &str,
        form: &[(&str, &str)],
    ) -> ClientResult<()> {
        match self.post_form(operation, preferred, form).await {
            Err(ClientError::Status { status: 404, .. }) => {
                self.post_form(operation, fallback, form).await
            }
            other => other,
        }
    }

    async fn build_torrent(&self, info: InfoEntry) -> ClientResult<Torrent> {
        let properties: Properties = self
            .get_json("qbit.properties", "torrents/properties", &[("hash", info.hash.as_str())])
            .await?;

        let trackers: Vec<TrackerEntry> = self
            .get_json("qbit.trackers", "torrents/trackers", &[("hash", info.hash.as_str())])
            .await?;

        let files: Vec<FileEntry> = self
            .get_json("qbit.files", "torrents/files", &[("hash", info.hash.as_str())])
            .await?;

        let save_path = if info.save_path.is_empty() {
            properties.save_path.clone().unwrap_or_default()
        } else {
            info.save_path.clone()
        };

        let file_paths = files
            .into_iter()
            .map(|file| join_client_path(&save_path, &file.name))
            .collect();

        let mut tracker_name = String::new();
        let mut tracker_status = String::new();
        let mut all_statuses = BTreeMap::new();
        for tracker in &trackers {
            if is_pseudo_tracker(&tracker.url) {
                continue;
            }
            if tracker_name.is_empty() {
                tracker_name = registrable_domain(&tracker.url);
                tracker_status = tracker.msg.clone();
            }
            all_statuses.insert(tracker.url.clone(), tracker.msg.clone());
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64);
        let added_seconds = (now - info.added_on).max(0);

        let tags: Vec<String> = info
            .tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(ToString::to_string)
            .collect();

        let is_private = info
            .private
            .or(properties.is_private)
            .unwrap_or(false);

        Ok(Torrent {
            hash: info.hash,
            name: info.name,
            path: save_path,
            total_bytes: info.total_size,
            downloaded_bytes: info.downloaded,
            state: info.state.clone(),
            files: file_paths,
            tags,
            downloaded: !IN_PROGRESS_STATES.contains(&info.state.as_str()),
            seeding: SEEDING_STATES.contains(&info.state.as_str()),
            ratio: info.ratio,
            added_seconds,
            seeding_seconds: info.seeding_time,
            label: info.category,
            seeds: info.num_complete,
            peers: info.num_incomplete,
            is_private,
            up_limit: info.up_limit,
            tracker_name,
            tracker_status,
            all_tracker_statuses: Some(all_statuses),
            comment: properties.comment.unwrap_or_default(),
            ..Torrent::default()
        })
    }
}

#[derive(Deserialize)]
struct InfoEntry {
    hash: String,
    name: String,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    downloaded: i64,
    state: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    ratio: f64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    seeding_time: i64,
    #[serde(default)]
    num_complete: i64,
    #[serde(default)]
    num_incomplete: i64,
    #[serde(default = "unlimited")]
    up_limit: i64,
    #[serde(default)]
    private: Option<bool>,
}

fn unlimited() -> i64 {
    -1
}

#[derive(Deserialize)]
struct Properties {
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    save_path: Option<String>,
    #[serde(default)]
    is_private: Option<bool>,
}

#[derive(Deserialize)]
struct TrackerEntry {
    #[serde(default)]
    url: String,
    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
struct FileEntry {
    name: String,
}

#[derive(Deserialize)]
struct MainData {
    #[serde(default)]
    server_state: ServerState,
}

#[derive(Deserialize, Default)]
struct ServerState {
    #[serde(default)]
    free_space_on_disk: i64,
}

#[derive(Deserialize)]
struct Category {
    #[serde(default, rename = "savePath")]
    save_path: String,
}

#[async_trait]
impl ClientAdapter for Qbittorrent {
    fn client_type(&self) -> &str {
        "qBittorrent"
    }

    async fn connect(&self) -> ClientResult<()> {
        let response = self
            .http
            .post(self.api("auth/login"))
            .form(&[
                ("username", self.settings.user.as_str()),
                ("password", self.settings.password.as_str()),
            ])
            .send()
            .await
            .map_err(|source| ClientError::Connect {
                operation: "qbit.login",
                source: Some(source),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status != 200 || !body.starts_with("Ok") {
            return Err(ClientError::Unauthorized);
        }

        let version = self.get_text("qbit.webapi_version", "app/webapiVersion").await?;
        debug!(version = %version, "connected to qBittorrent Web API");
        Ok(())
    }

    async fn get_torrents(&self) -> ClientResult<HashMap<String, Torrent>> {
        let entries: Vec<InfoEntry> = self
            .get_json("qbit.torrents_info", "torrents/info", &[])
            .await?;

        let mut torrents = HashMap::with_capacity(entries.len());
        for entry in entries {
            let hash = entry.hash.clone();
            match self.build_torrent(entry).await {
                Ok(torrent) => {
                    torrents.insert(hash, torrent);
                }
                Err(err) => {
                    warn!(hash = %hash, error = %err, "failed hydrating torrent; skipping");
                }
            }
        }
        Ok(torrents)
    }

    async fn remove_torrent(&self, torrent: &Torrent, delete_data: bool) -> ClientResult<bool> {
        let hash = torrent.hash.as_str();

        // this ladder makes the tracker observe one final announce
        // before the listing disappears
        self.post_form_compat("qbit.pause", "torrents/stop", "torrents/pause", &[("hashes", hash)])
            .await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        self.post_form_compat(
            "qbit.resume",
            "torrents/start",
            "torrents/resume",
            &[("hashes", hash)],
        )
        .await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        self.post_form("qbit.reannounce", "torrents/reannounce", &[("hashes", hash)])
            .await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        self.post_form(
            "qbit.delete",
            "torrents/delete",
            &[
                ("hashes", hash),
                ("deleteFiles", if delete_data { "true" } else { "false" }),
            ],
        )
        .await?;

        Ok(true)
    }

    async fn set_torrent_label(&self, hash: &str, label: &str, hardlink: bool) -> ClientResult<()> {
        if hardlink {
            let label_path = self
                .label_path_map()
                .get(label)
                .cloned()
                .filter(|path| !path.is_empty())
                .ok_or_else(|| ClientError::LabelPathMissing {
                    label: label.to_string(),
                })?;

            let properties: Properties = self
                .get_json("qbit.properties", "torrents/properties", &[("hash", hash)])
                .await?;
            let save_path = properties.save_path.unwrap_or_default();

            if Path::new(&save_path) != Path::new(&label_path) {
                let files: Vec<FileEntry> = self
                    .get_json("qbit.files", "torrents/files", &[("hash", hash)])
                    .await?;

                for file in &files {
                    let source = join_client_path(&save_path, &file.name);
                    let target = join_client_path(&label_path, &file.name);

                    std::fs::metadata(&source).map_err(|source_err| ClientError::Fs {
                        operation: "stat",
                        path: source.clone(),
                        source: source_err,
                    })?;

                    if let Some(parent) = Path::new(&target).parent() {
                        std::fs::create_dir_all(parent).map_err(|source_err| ClientError::Fs {
                            operation: "mkdir",
                            path: parent.display().to_string(),
                            source: source_err,
                        })?;
                    }

                    std::fs::hard_link(&source, &target).map_err(|source_err| ClientError::Fs {
                        operation: "link",
                        path: target.clone(),
                        source: source_err,
                    })?;
                    trace!(source = %source, target = %target, "hardlinked file into label path");
                }
            }

            // setting the location first makes the client recheck instead
            // of force-moving over the fresh links
            self.post_form(
                "qbit.set_auto_management",
                "torrents/setAutoManagement",
                &[("hashes", hash), ("enable", "false")],
            )
            .await?;
            self.post_form(
                "qbit.set_location",
                "torrents/setLocation",
                &[("hashes", hash), ("location", &label_path)],
            )
            .await?;
        }

        self.post_form(
            "qbit.set_category",
            "torrents/setCategory",
            &[("hashes", hash), ("category", label)],
        )
        .await?;

        if self.settings.enable_auto_tmm_after_relabel && !hardlink {
            self.post_form(
                "qbit.set_auto_management",
                "torrents/setAutoManagement",
                &[("hashes", hash), ("enable", "true")],
            )
            .await?;
        }

        Ok(())
    }

    async fn set_upload_limit(&self, hash: &str, bytes_per_sec: i64) -> ClientResult<()> {
        self.post_form(
            "qbit.set_upload_limit",
            "torrents/setUploadLimit",
            &[("hashes", hash), ("limit", &bytes_per_sec.to_string())],
        )
        .await
    }

    async fn get_current_free_space(&self, _path: &str) -> ClientResult<i64> {
        let data: MainData = self.get_json("qbit.maindata", "sync/maindata", &[]).await?;
        Ok(data.server_state.free_space_on_disk)
    }

    async fn load_label_path_map(&self) -> ClientResult<()> {
        let categories: HashMap<String, Category> = self
            .get_json("qbit.categories", "torrents/categories", &[])
            .await?;

        let default_save_path = self
            .get_text("qbit.default_save_path", "app/defaultSavePath")
            .await
            .unwrap_or_default();

        let mut map = HashMap::with_capacity(categories.len());
        for (name, category) in categories {
            let path = if category.save_path.is_empty() {
                join_client_path(&default_save_path, &name)
            } else {
                category.save_path
            };
            map.insert(name, path);
        }

        *self.label_paths.write().expect("label path lock poisoned") = map;
        Ok(())
    }

    fn label_path_map(&self) -> HashMap<String, String> {
        self.label_paths
            .read()
            .expect("label path lock poisoned")
            .clone()
    }

    async fn pause_torrents(&self, hashes: &[String]) -> ClientResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let joined = hashes.join("|");
        self.post_form_compat(
            "qbit.pause",
            "torrents/stop",
            "torrents/pause",
            &[("hashes", &joined)],
        )
        .await
    }

    fn tag_adapter(&self) -> Option<&dyn TagAdapter> {
        Some(self)
    }
}

#[async_trait]
impl TagAdapter for Qbittorrent {
    async fn set_tags(&self, hash: &str, tags: &[String]) -> ClientResult<()> {
        let joined = tags.join(",");
        match self
            .post_form(
                "qbit.set_tags",
                "torrents/setTags",
                &[("hashes", hash), ("tags", &joined)],
            )
            .await
        {
            Err(ClientError::Status { status: 404, .. }) => Err(ClientError::UnsupportedVersion),
            other => other,
        }
    }

    async fn add_tags(&self, hash: &str, tags: &[String]) -> ClientResult<()> {
        let joined = tags.join(",");
        self.post_form(
            "qbit.add_tags",
            "torrents/addTags",
            &[("hashes", hash), ("tags", &joined)],
        )
        .await
    }

    async fn remove_tags(&self, hash: &str, tags: &[String]) -> ClientResult<()> {
        let joined = tags.join(",");
        self.post_form(
            "qbit.remove_tags",
            "torrents/removeTags",
            &[("hashes", hash), ("tags", &joined)],
        )
        .await
    }

    async fn create_tags(&self, tags: &[String]) -> ClientResult<()> {
        let joined = tags.join(",");
        self.post_form("qbit.create_tags", "torrents/createTags", &[("tags", &joined)])
            .await
    }

    async fn delete_tags(&self, tags: &[String]) -> ClientResult<()> {
        let joined = tags.join(",");
        self.post_form("qbit.delete_tags", "torrents/deleteTags", &[("tags", &joined)])
            .await
    }
}

fn join_client_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        return name.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches(['/', '\\']),
        name.trim_start_matches(['/', '\\'])
    )
}
