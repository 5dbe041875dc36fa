//! Plugin capability set and the registry that selects one per host.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TrackerResult;
use crate::plugins::{Bhd, Btn, Hdb, Ops, Ptp, Red, Unit3d};
use crate::{TrackerTorrent, TrackersConfig};

/// Capability set implemented by every tracker API plugin.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Short plugin name for logs.
    fn name(&self) -> &str;

    /// Whether this plugin serves the given tracker host.
    fn check(&self, host: &str) -> bool;

    /// Ask the tracker whether the infohash is still listed.
    ///
    /// `Ok(true)` and `Ok(false)` are authoritative; any error is not.
    async fn is_unregistered(&self, torrent: &TrackerTorrent) -> TrackerResult<bool>;

    /// Tracker-specific liveness probe; most trackers have none.
    async fn is_tracker_down(&self, torrent: &TrackerTorrent) -> TrackerResult<bool> {
        let _ = torrent;
        Ok(false)
    }

    /// Whether the plugin observed a transport failure this run and has
    /// stopped answering.
    fn is_degraded(&self) -> bool;
}

/// The set of configured plugins, selected by tracker host.
#[derive(Clone, Default)]
pub struct Registry {
    plugins: Vec<Arc<dyn TrackerApi>>,
}

impl Registry {
    /// Instantiate every plugin whose credentials are complete.
    #[must_use]
    pub fn from_config(config: &TrackersConfig) -> Self {
        let mut plugins: Vec<Arc<dyn TrackerApi>> = Vec::new();

        if !config.bhd.api_key.is_empty() {
            plugins.push(Arc::new(Bhd::new(config.bhd.clone())));
        }
        if !config.btn.api_key.is_empty() {
            plugins.push(Arc::new(Btn::new(config.btn.clone())));
        }
        if !config.ptp.api_user.is_empty() && !config.ptp.api_key.is_empty() {
            plugins.push(Arc::new(Ptp::new(config.ptp.clone())));
        }
        if !config.red.api_key.is_empty() {
            plugins.push(Arc::new(Red::new(config.red.clone())));
        }
        if !config.ops.api_key.is_empty() {
            plugins.push(Arc::new(Ops::new(config.ops.clone())));
        }
        if !config.hdb.username.is_empty() && !config.hdb.passkey.is_empty() {
            plugins.push(Arc::new(Hdb::new(config.hdb.clone())));
        }
        for (name, unit3d) in &config.unit3d {
            if !unit3d.api_key.is_empty() && !unit3d.domain.is_empty() {
                plugins.push(Arc::new(Unit3d::new(name.clone(), unit3d.clone())));
            }
        }

        Self { plugins }
    }

    /// Build a registry from pre-constructed plugins; used by tests and
    /// embedders that bypass configuration.
    #[must_use]
    pub fn from_plugins(plugins: Vec<Arc<dyn TrackerApi>>) -> Self {
        Self { plugins }
    }

    /// Find the plugin serving a tracker host, if any.
    #[must_use]
    pub fn get(&self, host: &str) -> Option<&Arc<dyn TrackerApi>> {
        self.plugins.iter().find(|plugin| plugin.check(host))
    }

    /// Number of configured plugins.
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.plugins.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BtnConfig, Unit3dConfig};

    #[test]
    fn only_complete_credentials_instantiate_plugins() {
        let registry = Registry::from_config(&TrackersConfig::default());
        assert_eq!(registry.loaded(), 0);

        let mut config = TrackersConfig::default();
        config.btn = BtnConfig {
            api_key: "key".into(),
        };
        config.unit3d.insert(
            "aither".into(),
            Unit3dConfig {
                api_key: "key".into(),
                domain: "aither.cc".into(),
            },
        );
        config.unit3d.insert(
            "incomplete".into(),
            Unit3dConfig {
                api_key: String::new(),
                domain: "nope.example".into(),
            },
        );

        let registry = Registry::from_config(&config);
        assert_eq!(registry.loaded(), 2);
        assert!(registry.get("landof.tv").is_some());
        assert!(registry.get("aither.cc").is_some());
        assert!(registry.get("nope.example").is_none());
        assert!(registry.get("unknown.example").is_none());
    }
}
