//! The combined registration decision consulted during classification.

use harrow_core::{RegistrationState, StatusMatcher, Torrent};
use tracing::{debug, warn};

use crate::registry::Registry;
use crate::TrackerTorrent;

/// Answers "is this infohash unregistered?" by combining the announce
/// status tables with the per-tracker API plugins.
///
/// The outcome is cached on the snapshot by the engine, so each torrent
/// pays for at most one API round-trip per run.
pub struct Oracle {
    matcher: StatusMatcher,
    registry: Registry,
}

impl Oracle {
    /// Build from a configured matcher and plugin registry.
    #[must_use]
    pub fn new(matcher: StatusMatcher, registry: Registry) -> Self {
        Self { matcher, registry }
    }

    /// The announce-message matcher used by steps a through c.
    #[must_use]
    pub fn matcher(&self) -> &StatusMatcher {
        &self.matcher
    }

    /// Number of configured API plugins.
    #[must_use]
    pub fn plugins_loaded(&self) -> usize {
        self.registry.loaded()
    }

    /// Whether the plugin serving this tracker degraded during the run.
    ///
    /// A degraded plugin can no longer vouch for its tracker, so the
    /// engine treats the tracker as down and stays on the safe branch.
    #[must_use]
    pub fn is_degraded_for(&self, host: &str) -> bool {
        self.registry
            .get(host)
            .is_some_and(|plugin| plugin.is_degraded())
    }

    /// Resolve the registration state for one snapshot.
    ///
    /// Decision order: an unreachable tracker or an intermediate
    /// announce state always withholds judgement; otherwise the status
    /// tables give a provisional answer and the tracker's API plugin,
    /// when configured and definite, overrides it.
    pub async fn resolve(&self, torrent: &Torrent) -> RegistrationState {
        if self.matcher.is_tracker_down(torrent) {
            return RegistrationState::Unknown;
        }
        if self.is_degraded_for(&torrent.tracker_name) {
            return RegistrationState::Unknown;
        }
        if self.matcher.is_intermediate(torrent) {
            debug!(name = %torrent.name, "tracker reports an intermediate state");
            return RegistrationState::Unknown;
        }

        let by_status = self.matcher.matches_unregistered(torrent);

        if let Some(plugin) = self.registry.get(&torrent.tracker_name) {
            let view = TrackerTorrent::from(torrent);
            match plugin.is_unregistered(&view).await {
                Ok(true) => return RegistrationState::Unregistered,
                Ok(false) => return RegistrationState::Registered,
                Err(err) => {
                    warn!(
                        plugin = plugin.name(),
                        name = %torrent.name,
                        error = %err,
                        "tracker API gave no definite answer"
                    );
                    // transport failures are non-authoritative; keep
                    // whatever the status tables said
                    return if by_status {
                        RegistrationState::Unregistered
                    } else {
                        RegistrationState::Unknown
                    };
                }
            }
        }

        if by_status {
            RegistrationState::Unregistered
        } else {
            RegistrationState::Registered
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::error::{TrackerError, TrackerResult};
    use crate::registry::TrackerApi;

    use super::*;

    struct StubPlugin {
        host: &'static str,
        answer: Option<bool>,
        degraded: AtomicBool,
        calls: AtomicUsize,
    }

    impl StubPlugin {
        fn new(host: &'static str, answer: Option<bool>) -> Self {
            Self {
                host,
                answer,
                degraded: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TrackerApi for StubPlugin {
        fn name(&self) -> &str {
            "stub"
        }

        fn check(&self, host: &str) -> bool {
            host == self.host
        }

        async fn is_unregistered(&self, _torrent: &TrackerTorrent) -> TrackerResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(answer) => Ok(answer),
                None => {
                    self.degraded.store(true, Ordering::SeqCst);
                    Err(TrackerError::Degraded)
                }
            }
        }

        fn is_degraded(&self) -> bool {
            self.degraded.load(Ordering::SeqCst)
        }
    }

    fn oracle_with(plugin: Arc<StubPlugin>) -> Oracle {
        let erased: Arc<dyn TrackerApi> = plugin;
        Oracle::new(StatusMatcher::default(), Registry::from_plugins(vec![erased]))
    }

    fn torrent_on(host: &str, status: &str) -> Torrent {
        Torrent {
            hash: "a".repeat(40),
            name: "t".into(),
            tracker_name: host.into(),
            tracker_status: status.into(),
            ..Torrent::default()
        }
    }

    #[tokio::test]
    async fn down_tracker_is_never_unregistered() {
        let plugin = Arc::new(StubPlugin::new("t.example", Some(true)));
        let oracle = oracle_with(plugin.clone());

        let torrent = torrent_on("t.example", "connection failed");
        assert_eq!(oracle.resolve(&torrent).await, RegistrationState::Unknown);
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 0, "plugin never asked");
    }

    #[tokio::test]
    async fn intermediate_state_withholds_judgement() {
        let plugin = Arc::new(StubPlugin::new("t.example", Some(true)));
        let oracle = oracle_with(plugin.clone());

        let torrent = torrent_on("t.example", "torrent has been postponed");
        assert_eq!(oracle.resolve(&torrent).await, RegistrationState::Unknown);
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn plugin_answer_is_authoritative() {
        // status table says unregistered, plugin says still listed
        let plugin = Arc::new(StubPlugin::new("t.example", Some(false)));
        let oracle = oracle_with(plugin);

        let torrent = torrent_on("t.example", "unregistered torrent");
        assert_eq!(oracle.resolve(&torrent).await, RegistrationState::Registered);
    }

    #[tokio::test]
    async fn plugin_failure_falls_back_to_status_tables() {
        let plugin = Arc::new(StubPlugin::new("t.example", None));
        let oracle = oracle_with(plugin.clone());

        let torrent = torrent_on("t.example", "unregistered torrent");
        assert_eq!(
            oracle.resolve(&torrent).await,
            RegistrationState::Unregistered
        );

        // the failure degraded the plugin; later torrents of the same
        // tracker are treated as down before any API call
        assert!(oracle.is_degraded_for("t.example"));
        let healthy = torrent_on("t.example", "Working");
        assert_eq!(oracle.resolve(&healthy).await, RegistrationState::Unknown);
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_tables_decide_without_a_plugin() {
        let oracle = Oracle::new(StatusMatcher::default(), Registry::default());

        let gone = torrent_on("other.example", "torrent not found");
        assert_eq!(oracle.resolve(&gone).await, RegistrationState::Unregistered);

        let healthy = torrent_on("other.example", "Working");
        assert_eq!(oracle.resolve(&healthy).await, RegistrationState::Registered);
    }
}
