//! UNIT3D family: one capability instantiated per configured domain.
//!
//! The torrent's web ID is parsed from the comment, which UNIT3D sites
//! format as "This torrent was downloaded from <domain>. <detail URL>".

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{TrackerError, TrackerResult};
use crate::http::ApiTransport;
use crate::registry::TrackerApi;
use crate::{TrackerTorrent, Unit3dConfig};

pub(crate) struct Unit3d {
    name: String,
    cfg: Unit3dConfig,
    transport: ApiTransport,
    id_pattern: Option<Regex>,
}

impl Unit3d {
    pub(crate) fn new(name: String, cfg: Unit3dConfig) -> Self {
        let id_pattern = Regex::new(&format!(
            r"https?://[^/]*{}/(?:torrents|details)/(\d+)",
            regex::escape(&cfg.domain)
        ))
        .ok();

        Self {
            name,
            cfg,
            transport: ApiTransport::new(),
            id_pattern,
        }
    }

    fn extract_torrent_id(&self, comment: &str) -> TrackerResult<String> {
        if comment.is_empty() {
            return Err(TrackerError::MissingComment);
        }
        self.id_pattern
            .as_ref()
            .and_then(|pattern| pattern.captures(comment))
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
            .ok_or(TrackerError::MissingTorrentId)
    }
}

#[derive(Deserialize, Default)]
struct Attributes {
    #[serde(default)]
    info_hash: String,
}

#[derive(Deserialize, Default)]
struct TorrentData {
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Deserialize)]
struct DetailResponse {
    #[serde(default)]
    data: TorrentData,
}

#[async_trait]
impl TrackerApi for Unit3d {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, host: &str) -> bool {
        host.eq_ignore_ascii_case(&self.cfg.domain)
    }

    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        if !torrent.tracker_name.eq_ignore_ascii_case(&self.cfg.domain) {
            return Ok(false);
        }

        // Deluge exposes no comment; skip rather than guess
        let torrent_id = match self.extract_torrent_id(&torrent.comment) {
            Ok(id) => id,
            Err(TrackerError::MissingComment | TrackerError::MissingTorrentId) => {
                debug!(name = %torrent.name, "no detail URL in comment; skipping API check");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        trace!(name = %torrent.name, domain = %self.cfg.domain, "querying UNIT3D API");

        let url = format!("https://{}/api/torrents/{torrent_id}", self.cfg.domain);
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", self.cfg.api_key);
        headers.insert(
            "Authorization",
            bearer.parse().map_err(|_| TrackerError::Api {
                message: "invalid authorization header".to_string(),
            })?,
        );
        headers.insert("Accept", "application/json".parse().expect("static header"));

        // a 404 is a definite answer: the listing no longer exists
        let response: DetailResponse = match self
            .transport
            .get_json("unit3d.torrent", &url, headers, &[200])
            .await
        {
            Ok(response) => response,
            Err(TrackerError::Status { status: 404, .. }) => return Ok(true),
            Err(err) => return Err(err),
        };

        let listed = response.data.attributes.info_hash;
        if listed.is_empty() {
            return Ok(true);
        }
        Ok(!listed.eq_ignore_ascii_case(&torrent.hash))
    }

    fn is_degraded(&self) -> bool {
        self.transport.is_degraded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> Unit3d {
        Unit3d::new(
            "aither".into(),
            Unit3dConfig {
                api_key: "k".into(),
                domain: "aither.cc".into(),
            },
        )
    }

    #[test]
    fn extracts_id_from_detail_url() {
        let plugin = plugin();
        let id = plugin
            .extract_torrent_id(
                "This torrent was downloaded from aither.cc. https://aither.cc/torrents/123456",
            )
            .expect("id");
        assert_eq!(id, "123456");

        let id = plugin
            .extract_torrent_id("https://aither.cc/details/99")
            .expect("id");
        assert_eq!(id, "99");
    }

    #[test]
    fn foreign_domains_do_not_match() {
        let plugin = plugin();
        assert!(matches!(
            plugin.extract_torrent_id("https://other.cc/torrents/1"),
            Err(TrackerError::MissingTorrentId)
        ));
        assert!(plugin.check("aither.cc"));
        assert!(!plugin.check("sub.aither.cc"));
    }
}
