//! Tracker announce-message classification.
//!
//! The matcher answers two string-level questions about a snapshot: does
//! every tracker look unreachable, and does any tracker report the
//! torrent as no longer listed. Per-tracker overrides replace the
//! default unregistered table for that tracker only.

use std::collections::HashMap;

use crate::torrent::Torrent;

/// Substrings indicating the tracker itself is unreachable or failing.
///
/// The HTTP status texts mirror what libtorrent surfaces for announce
/// failures; the rest are common tracker/network error phrasings.
pub const TRACKER_DOWN_STATUSES: &[&str] = &[
    "continue",
    "multiple choices",
    "not modified",
    "bad request",
    "unauthorized",
    "forbidden",
    "internal server error",
    "not implemented",
    "bad gateway",
    "service unavailable",
    "moved permanently",
    "moved temporarily",
    "(unknown http error)",
    "down",
    "maintenance",
    "tracker is down",
    "tracker unavailable",
    "truncated",
    "unreachable",
    "not working",
    "not responding",
    "timeout",
    "refused",
    "no connection",
    "cannot connect",
    "connection failed",
    "ssl error",
    "no data",
    "timed out",
    "temporarily disabled",
    "unresolvable",
    "host not found",
    "offline",
    "your request could not be processed, please try again later",
];

/// Default substrings indicating the torrent listing is gone.
pub const DEFAULT_UNREGISTERED_STATUSES: &[&str] = &[
    "complete season uploaded",
    "dead",
    "dupe",
    "i'm sorry dave, i can't do that",
    "infohash not found",
    "internal available",
    "not exist",
    "not registered",
    "nuked",
    "pack is available",
    "packs are available",
    "problem with description",
    "problem with file",
    "problem with pack",
    "retitled",
    "season pack",
    "specifically banned",
    "torrent does not exist",
    "torrent existiert nicht",
    "torrent has been deleted",
    "torrent has been nuked",
    "torrent is not authorized for use on this tracker",
    "torrent is not found",
    "torrent nicht gefunden",
    "tracker nicht registriert",
    "torrent not found",
    "trump",
    "unknown",
    "unregistered",
    "upgraded",
    "uploaded",
];

/// Statuses that are neither healthy nor unregistered; they suppress any
/// unregistered classification until the tracker makes up its mind.
pub const INTERMEDIATE_STATUSES: &[&str] = &["torrent has been postponed"];

/// Compiled announce-message matcher with per-tracker overrides.
#[derive(Debug, Clone, Default)]
pub struct StatusMatcher {
    per_tracker: HashMap<String, Vec<String>>,
}

impl StatusMatcher {
    /// Build a matcher from the configured per-tracker override table.
    ///
    /// Tracker names and statuses are lowercased and trimmed; an override
    /// replaces the default table for that tracker entirely.
    #[must_use]
    pub fn new(overrides: &HashMap<String, Vec<String>>) -> Self {
        let per_tracker = overrides
            .iter()
            .map(|(tracker, statuses)| {
                (
                    tracker.trim().to_lowercase(),
                    statuses
                        .iter()
                        .map(|status| status.trim().to_lowercase())
                        .collect(),
                )
            })
            .collect();

        Self { per_tracker }
    }

    /// True iff every observed announce message looks like a transport
    /// failure. A single healthy tracker among many keeps the torrent up.
    #[must_use]
    pub fn is_tracker_down(&self, torrent: &Torrent) -> bool {
        let statuses = observed_statuses(torrent);
        if statuses.is_empty() {
            return false;
        }

        statuses.iter().all(|status| {
            let status = status.to_lowercase();
            TRACKER_DOWN_STATUSES
                .iter()
                .any(|needle| status.contains(needle))
        })
    }

    /// True iff any observed announce message is in an intermediate state.
    #[must_use]
    pub fn is_intermediate(&self, torrent: &Torrent) -> bool {
        observed_statuses(torrent).iter().any(|status| {
            let status = status.to_lowercase();
            INTERMEDIATE_STATUSES
                .iter()
                .any(|needle| status.contains(needle))
        })
    }

    /// True iff any observed announce message matches the unregistered
    /// table configured for this torrent's tracker.
    #[must_use]
    pub fn matches_unregistered(&self, torrent: &Torrent) -> bool {
        let tracker = torrent.tracker_name.trim().to_lowercase();
        let override_table = self.per_tracker.get(&tracker);

        observed_statuses(torrent).iter().any(|status| {
            let status = status.to_lowercase();
            match override_table {
                Some(table) => table.iter().any(|needle| status.contains(needle)),
                None => DEFAULT_UNREGISTERED_STATUSES
                    .iter()
                    .any(|needle| status.contains(needle)),
            }
        })
    }

    /// Status-table-only unregistered decision (oracle steps a through c):
    /// a down tracker or an intermediate state always answers "no".
    #[must_use]
    pub fn unregistered_by_status(&self, torrent: &Torrent) -> bool {
        if self.is_tracker_down(torrent) {
            return false;
        }
        if self.is_intermediate(torrent) {
            return false;
        }
        self.matches_unregistered(torrent)
    }
}

/// Every non-empty announce message visible on the snapshot. Falls back
/// to the primary status when the client does not expose the full map.
fn observed_statuses(torrent: &Torrent) -> Vec<&str> {
    if let Some(all) = &torrent.all_tracker_statuses {
        if !all.is_empty() {
            return all
                .values()
                .map(String::as_str)
                .filter(|status| !status.is_empty())
                .collect();
        }
    }

    if torrent.tracker_status.is_empty() {
        Vec::new()
    } else {
        vec![torrent.tracker_status.as_str()]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn with_status(status: &str) -> Torrent {
        Torrent {
            tracker_status: status.to_string(),
            ..Torrent::default()
        }
    }

    #[test]
    fn empty_status_is_not_down() {
        let matcher = StatusMatcher::default();
        assert!(!matcher.is_tracker_down(&with_status("")));
    }

    #[test]
    fn connection_failure_is_down() {
        let matcher = StatusMatcher::default();
        assert!(matcher.is_tracker_down(&with_status("Connection failed")));
        assert!(matcher.is_tracker_down(&with_status("SSL error while announcing")));
        assert!(!matcher.is_tracker_down(&with_status("Working")));
    }

    #[test]
    fn mixed_tracker_statuses_keep_torrent_up() {
        let matcher = StatusMatcher::default();
        let mut all = BTreeMap::new();
        all.insert("https://a.example/announce".to_string(), "timed out".to_string());
        all.insert("https://b.example/announce".to_string(), "Working".to_string());

        let mut torrent = with_status("timed out");
        torrent.all_tracker_statuses = Some(all.clone());
        assert!(!matcher.is_tracker_down(&torrent));

        all.insert("https://b.example/announce".to_string(), "bad gateway".to_string());
        torrent.all_tracker_statuses = Some(all);
        assert!(matcher.is_tracker_down(&torrent));
    }

    #[test]
    fn down_tracker_suppresses_unregistered() {
        let matcher = StatusMatcher::default();
        let torrent = with_status("tracker is down: unregistered");
        assert!(!matcher.unregistered_by_status(&torrent));
    }

    #[test]
    fn intermediate_state_suppresses_unregistered() {
        let matcher = StatusMatcher::default();
        let torrent = with_status("torrent has been postponed");
        assert!(!matcher.unregistered_by_status(&torrent));
    }

    #[test]
    fn default_table_matches_substring_case_insensitively() {
        let matcher = StatusMatcher::default();
        assert!(matcher.unregistered_by_status(&with_status("Unregistered torrent")));
        assert!(matcher.unregistered_by_status(&with_status("Torrent Not Found")));
        assert!(!matcher.unregistered_by_status(&with_status("Working")));
    }

    #[test]
    fn per_tracker_override_replaces_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("Example.Org ".to_string(), vec![" Gone Forever ".to_string()]);
        let matcher = StatusMatcher::new(&overrides);

        let mut torrent = with_status("unregistered");
        torrent.tracker_name = "example.org".to_string();
        assert!(!matcher.unregistered_by_status(&torrent));

        torrent.tracker_status = "gone forever".to_string();
        assert!(matcher.unregistered_by_status(&torrent));

        torrent.tracker_name = "other.example".to_string();
        torrent.tracker_status = "unregistered".to_string();
        assert!(matcher.unregistered_by_status(&torrent));
    }
}
