//! Orpheus: hash lookup through the ajax API.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::trace;

use crate::error::{TrackerError, TrackerResult};
use crate::http::ApiTransport;
use crate::registry::TrackerApi;
use crate::{OpsConfig, TrackerTorrent};

pub(crate) struct Ops {
    cfg: OpsConfig,
    transport: ApiTransport,
}

impl Ops {
    pub(crate) fn new(cfg: OpsConfig) -> Self {
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
impl TrackerApi for Ops {
    fn name(&self) -> &str {
        "OPS"
    }

    fn check(&self, host: &str) -> bool {
        host.contains("opsfet.ch")
    }

    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        trace!(name = %torrent.name, hash = %torrent.hash, "querying OPS API");

        let url = format!(
            "https://orpheus.network/ajax.php?action=torrent&hash={}",
            torrent.hash.to_uppercase()
        );

        let mut headers = HeaderMap::new();
        let value = format!("token {}", self.cfg.api_key);
        headers.insert(
            "Authorization",
            value.parse().map_err(|_| TrackerError::Api {
                message: "invalid authorization header".to_string(),
            })?,
        );

        let response: AjaxResponse = self
            .transport
            .get_json("ops.torrent", &url, headers, &[200])
            .await?;

        Ok(response.status == "failure" && response.error == "bad parameters")
    }

    fn is_degraded(&self) -> bool {
        self.transport.is_degraded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_matches_domain_substring() {
        let plugin = Ops::new(OpsConfig {
            api_key: "k".into(),
        });
        assert!(plugin.check("home.opsfet.ch"));
        assert!(!plugin.check("orpheus.network.example"));
    }
}
