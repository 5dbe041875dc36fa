#![forbid(unsafe_code)]

//! Tracker oracle: per-tracker API plugins answering "is this infohash
//! unregistered?", plus the combined liveness/registration decision tree
//! consulted during classification.

mod error;
mod http;
mod limiter;
mod oracle;
mod plugins;
mod registry;

pub use error::{TrackerError, TrackerResult};
pub use limiter::RateLimiter;
pub use oracle::Oracle;
pub use registry::{Registry, TrackerApi};

use serde::Deserialize;
use std::collections::HashMap;

use harrow_core::Torrent;

/// Credentials for every supported tracker API.
///
/// A plugin is only instantiated when its credentials are complete, so
/// an empty section simply disables that tracker's API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase", deny_unknown_fields)]
pub struct TrackersConfig {
    /// Beyond-HD.
    #[serde(default)]
    pub bhd: BhdConfig,
    /// BroadcasTheNet.
    #[serde(default)]
    pub btn: BtnConfig,
    /// HDBits.
    #[serde(default)]
    pub hdb: HdbConfig,
    /// Orpheus.
    #[serde(default)]
    pub ops: OpsConfig,
    /// PassThePopcorn.
    #[serde(default)]
    pub ptp: PtpConfig,
    /// Redacted.
    #[serde(default)]
    pub red: RedConfig,
    /// UNIT3D instances, keyed by a free-form name.
    #[serde(default)]
    pub unit3d: HashMap<String, Unit3dConfig>,
}

/// Beyond-HD credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BhdConfig {
    /// API key.
    #[serde(default)]
    pub api_key: String,
}

/// BroadcasTheNet credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BtnConfig {
    /// API key.
    #[serde(default)]
    pub api_key: String,
}

/// HDBits credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HdbConfig {
    /// Account name.
    #[serde(default)]
    pub username: String,
    /// Passkey.
    #[serde(default)]
    pub passkey: String,
}

/// Orpheus credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpsConfig {
    /// API key.
    #[serde(default)]
    pub api_key: String,
}

/// PassThePopcorn credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PtpConfig {
    /// API user.
    #[serde(default)]
    pub api_user: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
}

/// Redacted credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedConfig {
    /// API key.
    #[serde(default)]
    pub api_key: String,
}

/// One UNIT3D-family tracker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Unit3dConfig {
    /// API key (bearer token).
    #[serde(default)]
    pub api_key: String,
    /// Tracker domain, e.g. `aither.cc`.
    #[serde(default)]
    pub domain: String,
}

/// The slice of a snapshot that tracker plugins are allowed to see.
#[derive(Debug, Clone, Default)]
pub struct TrackerTorrent {
    /// 40-hex infohash.
    pub hash: String,
    /// Display name, for logging.
    pub name: String,
    /// Registrable tracker domain.
    pub tracker_name: String,
    /// Latest announce message.
    pub tracker_status: String,
    /// Metainfo comment; several plugins parse their web ID out of it.
    pub comment: String,
}

impl From<&Torrent> for TrackerTorrent {
    fn from(torrent: &Torrent) -> Self {
        Self {
            hash: torrent.hash.clone(),
            name: torrent.name.clone(),
            tracker_name: torrent.tracker_name.clone(),
            tracker_status: torrent.tracker_status.clone(),
            comment: torrent.comment.clone(),
        }
    }
}
