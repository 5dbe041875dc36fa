//! HDBits: hash lookup through the torrents API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::TrackerResult;
use crate::http::{json_headers, ApiTransport};
use crate::registry::TrackerApi;
use crate::{HdbConfig, TrackerTorrent};

pub(crate) struct Hdb {
    cfg: HdbConfig,
    transport: ApiTransport,
}

impl Hdb {
    pub(crate) fn new(cfg: HdbConfig) -> Self {
        Self {
            cfg,
            transport: ApiTransport::new(),
        }
    }
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    username: &'a str,
    passkey: &'a str,
    hash: String,
}

#[derive(Deserialize)]
struct LookupData {}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    data: Vec<LookupData>,
}

#[async_trait]
impl TrackerApi for Hdb {
    fn name(&self) -> &str {
        "HDB"
    }

    fn check(&self, host: &str) -> bool {
        host.contains("hdbits.org")
    }

    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        trace!(name = %torrent.name, hash = %torrent.hash, "querying HDB API");

        let payload = LookupRequest {
            username: &self.cfg.username,
            passkey: &self.cfg.passkey,
            hash: torrent.hash.to_uppercase(),
        };

        let response: LookupResponse = self
            .transport
            .post_json(
                "hdb.torrents",
                "https://hdbits.org/api/torrents",
                json_headers(),
                &payload,
            )
            .await?;

        // status 0 is success; an empty result set for a valid hash
        // means the listing is gone
        Ok(response.status == 0 && response.data.is_empty())
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
        let plugin = Hdb::new(HdbConfig {
            username: "u".into(),
            passkey: "p".into(),
        });
        assert!(plugin.check("hdbits.org"));
        assert!(!plugin.check("hdbits.example"));
    }
}
