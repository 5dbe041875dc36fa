//! BroadcasTheNet: JSON-RPC lookup by the web ID parsed from the
//! torrent comment.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{TrackerError, TrackerResult};
use crate::http::{json_headers, ApiTransport};
use crate::registry::TrackerApi;
use crate::{BtnConfig, TrackerTorrent};

static TORRENT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[^/]*broadcasthe\.net/torrents\.php\?action=reqlink&id=(\d+)")
        .expect("static regex")
});

pub(crate) struct Btn {
    cfg: BtnConfig,
    transport: ApiTransport,
}

impl Btn {
    pub(crate) fn new(cfg: BtnConfig) -> Self {
        Self {
            cfg,
            transport: ApiTransport::new(),
        }
    }

    fn extract_torrent_id(comment: &str) -> TrackerResult<String> {
        if comment.is_empty() {
            return Err(TrackerError::MissingComment);
        }
        TORRENT_ID
            .captures(comment)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
            .ok_or(TrackerError::MissingTorrentId)
    }
}

#[derive(Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: [String; 2],
    id: u32,
}

#[derive(Deserialize)]
struct RpcResult {
    #[serde(rename = "InfoHash", default)]
    info_hash: String,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
    error: Option<RpcError>,
}

#[async_trait]
impl TrackerApi for Btn {
    fn name(&self) -> &str {
        "BTN"
    }

    fn check(&self, host: &str) -> bool {
        host.eq_ignore_ascii_case("landof.tv")
    }

    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        trace!(name = %torrent.name, hash = %torrent.hash, "querying BTN API");

        let torrent_id = Self::extract_torrent_id(&torrent.comment)?;
        let payload = RpcRequest {
            jsonrpc: "2.0",
            method: "getTorrentById",
            params: [self.cfg.api_key.clone(), torrent_id],
            id: 1,
        };

        let response: RpcResponse = self
            .transport
            .post_json(
                "btn.get_torrent_by_id",
                "https://api.broadcasthe.net",
                json_headers(),
                &payload,
            )
            .await?;

        if let Some(error) = response.error {
            return Err(TrackerError::Api {
                message: format!("{} (code: {})", error.message, error.code),
            });
        }

        let Some(result) = response.result else {
            return Ok(true);
        };

        if result.info_hash.eq_ignore_ascii_case(&torrent.hash) {
            return Ok(false);
        }

        // the web ID exists but belongs to a different swarm now
        debug!(
            expected = %torrent.hash,
            got = %result.info_hash,
            "BTN torrent ID exists with a different hash"
        );
        Ok(true)
    }

    fn is_degraded(&self) -> bool {
        self.transport.is_degraded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_web_id_from_comment() {
        let id = Btn::extract_torrent_id(
            "https://broadcasthe.net/torrents.php?action=reqlink&id=123456",
        )
        .expect("id");
        assert_eq!(id, "123456");
    }

    #[test]
    fn rejects_empty_or_foreign_comments() {
        assert!(matches!(
            Btn::extract_torrent_id(""),
            Err(TrackerError::MissingComment)
        ));
        assert!(matches!(
            Btn::extract_torrent_id("https://other.example/torrents/1"),
            Err(TrackerError::MissingTorrentId)
        ));
    }

    #[test]
    fn check_matches_exact_host() {
        let plugin = Btn::new(BtnConfig {
            api_key: "k".into(),
        });
        assert!(plugin.check("landof.tv"));
        assert!(plugin.check("LANDOF.TV"));
        assert!(!plugin.check("notlandof.tv"));
    }
}
