//! Redacted: hash lookup through the ajax API.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::trace;

use crate::error::{TrackerError, TrackerResult};
use crate::http::ApiTransport;
use crate::registry::TrackerApi;
use crate::{RedConfig, TrackerTorrent};

pub(crate) struct Red {
    cfg: RedConfig,
    transport: ApiTransport,
}

impl Red {
    pub(crate) fn new(cfg: RedConfig) -> Self {
        Self {
            cfg,
            transport: ApiTransport::new(),
        }
    }
}

#[derive(Deserialize)]
struct AjaxResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: String,
}

#[async_trait]
impl TrackerApi for Red {
    fn name(&self) -> &str {
        "RED"
    }

    fn check(&self, host: &str) -> bool {
        host.contains("flacsfor.me")
    }

    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        trace!(name = %torrent.name, hash = %torrent.hash, "querying RED API");

        let url = format!(
            "https://redacted.sh/ajax.php?action=torrent&hash={}",
            torrent.hash.to_uppercase()
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            self.cfg.api_key.parse().map_err(|_| TrackerError::Api {
                message: "invalid authorization header".to_string(),
            })?,
        );

        // RED answers 400 for an unknown hash; the body still decodes
        let response: AjaxResponse = self
            .transport
            .get_json("red.torrent", &url, headers, &[200, 400])
            .await?;

        Ok(response.status == "failure" && response.error == "bad hash parameter")
    }

    fn is_degraded(&self) -> bool {
        self.transport.is_degraded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_matches_announce_domain() {
        let plugin = Red::new(RedConfig {
            api_key: "k".into(),
        });
        assert!(plugin.check("flacsfor.me"));
        assert!(!plugin.check("redacted.sh"));
    }
}
