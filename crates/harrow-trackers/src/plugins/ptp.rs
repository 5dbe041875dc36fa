//! PassThePopcorn: lazily fetched batch list of unregistered torrents.
//!
//! PTP exposes the caller's entire unregistered set in one call, so the
//! first query of a run fetches it once under a mutex and every later
//! query answers from memory.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{TrackerError, TrackerResult};
use crate::http::ApiTransport;
use crate::registry::TrackerApi;
use crate::{PtpConfig, TrackerTorrent};

pub(crate) struct Ptp {
    cfg: PtpConfig,
    transport: ApiTransport,
    unregistered: Mutex<Option<HashSet<String>>>,
}

impl Ptp {
    pub(crate) fn new(cfg: PtpConfig) -> Self {
        Self {
            cfg,
            transport: ApiTransport::new(),
            unregistered: Mutex::new(None),
        }
    }

    fn headers(&self) -> TrackerResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "ApiUser",
            self.cfg.api_user.parse().map_err(|_| TrackerError::Api {
                message: "invalid ApiUser header".to_string(),
            })?,
        );
        headers.insert(
            "ApiKey",
            self.cfg.api_key.parse().map_err(|_| TrackerError::Api {
                message: "invalid ApiKey header".to_string(),
            })?,
        );
        Ok(headers)
    }

    async fn fetch_unregistered(&self) -> TrackerResult<HashSet<String>> {
        #[derive(Deserialize)]
        struct Entry {
            #[serde(rename = "InfoHash", default)]
            info_hash: String,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ListResponse {
            Keyed {
                #[serde(rename = "UnregisteredTorrents", default)]
                unregistered_torrents: Vec<Entry>,
            },
            Bare(Vec<Entry>),
        }

        let response: ListResponse = self
            .transport
            .get_json(
                "ptp.unregistered_list",
                "https://passthepopcorn.me/torrents.php?action=unregistered",
                self.headers()?,
                &[200],
            )
            .await?;

        let entries = match response {
            ListResponse::Keyed {
                unregistered_torrents,
            } => unregistered_torrents,
            ListResponse::Bare(entries) => entries,
        };

        Ok(entries
            .into_iter()
            .map(|entry| entry.info_hash.to_uppercase())
            .filter(|hash| !hash.is_empty())
            .collect())
    }
}

#[async_trait]
impl TrackerApi for Ptp {
    fn name(&self) -> &str {
        "PTP"
    }

    fn check(&self, host: &str) -> bool {
        host.contains("passthepopcorn.me")
    }

    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        let mut cache = self.unregistered.lock().await;

        if cache.is_none() {
            // first caller fetches; a failure marks the plugin degraded
            // so the engine stays on the safe branch for this tracker
            debug!("fetching PTP unregistered torrent list");
            let fetched = self.fetch_unregistered().await.map_err(|err| {
                self.transport.mark_degraded("ptp.unregistered_list");
                err
            })?;
            debug!(count = fetched.len(), "cached PTP unregistered torrents");
            *cache = Some(fetched);
        }

        trace!(name = %torrent.name, hash = %torrent.hash, "answering from PTP set");
        let set = cache.as_ref().expect("cache filled above");
        Ok(set.contains(&torrent.hash.to_uppercase()))
    }

    fn is_degraded(&self) -> bool {
        self.transport.is_degraded()
    }
}
