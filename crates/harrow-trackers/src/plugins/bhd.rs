//! Beyond-HD: hash search through the torrents API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{TrackerError, TrackerResult};
use crate::http::{json_headers, ApiTransport};
use crate::registry::TrackerApi;
use crate::{BhdConfig, TrackerTorrent};

pub(crate) struct Bhd {
    cfg: BhdConfig,
    transport: ApiTransport,
}

impl Bhd {
    pub(crate) fn new(cfg: BhdConfig) -> Self {
        Self {
            cfg,
            transport: ApiTransport::new(),
        }
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    info_hash: &'a str,
    action: &'static str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    page: i64,
    #[serde(default)]
    total_results: i64,
    #[serde(default)]
    success: bool,
}

#[async_trait]
impl TrackerApi for Bhd {
    fn name(&self) -> &str {
        "BHD"
    }

    fn check(&self, host: &str) -> bool {
        host.contains("beyond-hd.me")
    }

    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        trace!(name = %torrent.name, hash = %torrent.hash, "querying BHD API");

        let url = format!("https://beyond-hd.me/api/torrents/{}", self.cfg.api_key);
        let payload = SearchRequest {
            info_hash: &torrent.hash,
            action: "search",
        };

        let response: SearchResponse = self
            .transport
            .post_json("bhd.search", &url, json_headers(), &payload)
            .await?;

        if !response.success || response.status_code == 0 || response.page == 0 {
            return Err(TrackerError::Api {
                message: "unexpected BHD response structure".to_string(),
            });
        }

        Ok(response.total_results < 1)
    }

    fn is_degraded(&self) -> bool {
        self.transport.is_degraded()
    }
}
