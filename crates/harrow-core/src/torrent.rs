//! Immutable per-run snapshot of a torrent and its derived predicates.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{trace, warn};

/// Outcome of the tracker oracle for one torrent, cached for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RegistrationState {
    /// The oracle has not been consulted for this torrent.
    #[default]
    Unknown,
    /// At least one authority confirmed the torrent is still listed.
    Registered,
    /// The tracker explicitly reported the torrent as removed.
    Unregistered,
}

/// Snapshot of one torrent as reported by the client adapter.
///
/// Every field except [`Torrent::hardlinked_outside_client`] and
/// [`Torrent::registration`] is frozen once the snapshot is built; those
/// two are filled in by the engine before rule evaluation begins.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Torrent {
    /// 40-hex infohash identifying the swarm.
    pub hash: String,
    /// Display name reported by the client.
    pub name: String,
    /// Root save directory on the client host.
    pub path: String,
    /// Total payload size in bytes.
    pub total_bytes: i64,
    /// Bytes downloaded so far.
    pub downloaded_bytes: i64,
    /// Raw client state string (client-specific vocabulary).
    pub state: String,
    /// Absolute file paths on the client host, in metainfo order.
    pub files: Vec<String>,
    /// Client-side tags, in client order.
    pub tags: Vec<String>,
    /// Whether the client considers the payload complete.
    pub downloaded: bool,
    /// Whether the torrent is actively seeding (uploading or stalled up).
    pub seeding: bool,
    /// Share ratio reported by the client.
    pub ratio: f64,
    /// Seconds elapsed since the torrent was added.
    pub added_seconds: i64,
    /// Seconds spent seeding.
    pub seeding_seconds: i64,
    /// Category (qBittorrent) or label (Deluge).
    pub label: String,
    /// Connected/listed seed count.
    pub seeds: i64,
    /// Connected/listed peer count.
    pub peers: i64,
    /// Whether the torrent is flagged private in its metainfo.
    pub is_private: bool,
    /// Per-torrent upload limit in bytes per second; −1 means unlimited.
    pub up_limit: i64,
    /// Registrable domain of the first non-pseudo tracker.
    pub tracker_name: String,
    /// Latest announce message from that tracker.
    pub tracker_status: String,
    /// Announce messages for every tracker URL, when the client exposes them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_tracker_statuses: Option<BTreeMap<String, String>>,
    /// Free-form comment from the metainfo; often carries a detail URL.
    pub comment: String,
    /// Set by the engine when the hardlink index observes link counts
    /// exceeding the paths known to the client.
    #[serde(skip)]
    pub hardlinked_outside_client: bool,
    /// Cached oracle outcome for this run.
    #[serde(skip)]
    pub registration: RegistrationState,
}

impl Torrent {
    /// Exact complement of [`Torrent::is_private`].
    #[must_use]
    pub fn is_public(&self) -> bool {
        !self.is_private
    }

    /// Hours since the torrent was added.
    #[must_use]
    pub fn added_hours(&self) -> f64 {
        self.added_seconds as f64 / 3600.0
    }

    /// Days since the torrent was added.
    #[must_use]
    pub fn added_days(&self) -> f64 {
        self.added_seconds as f64 / 86_400.0
    }

    /// Hours spent seeding.
    #[must_use]
    pub fn seeding_hours(&self) -> f64 {
        self.seeding_seconds as f64 / 3600.0
    }

    /// Days spent seeding.
    #[must_use]
    pub fn seeding_days(&self) -> f64 {
        self.seeding_seconds as f64 / 86_400.0
    }

    /// True iff every given tag is present (case-insensitive).
    #[must_use]
    pub fn has_all_tags<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter()
            .all(|wanted| slice_contains(&self.tags, wanted.as_ref(), true))
    }

    /// True iff any given tag is present (case-insensitive).
    #[must_use]
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter()
            .any(|wanted| slice_contains(&self.tags, wanted.as_ref(), true))
    }

    /// True iff a declared file is missing on disk.
    ///
    /// Only downloaded torrents are checked; an in-progress torrent has
    /// legitimate gaps and never reports missing files.
    #[must_use]
    pub fn has_missing_files(&self) -> bool {
        if !self.downloaded {
            return false;
        }

        for file in &self.files {
            if file.is_empty() {
                trace!(torrent = %self.name, "skipping empty path");
                continue;
            }

            match std::fs::metadata(Path::new(file)) {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return true,
                Err(err) => {
                    warn!(file = %file, torrent = %self.name, error = %err, "error checking file");
                }
            }
        }

        false
    }
}

/// Membership test over a string slice, optionally case-insensitive.
#[must_use]
pub fn slice_contains(slice: &[String], wanted: &str, case_insensitive: bool) -> bool {
    slice.iter().any(|item| {
        if case_insensitive {
            item.eq_ignore_ascii_case(wanted)
        } else {
            item == wanted
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tags: &[&str]) -> Torrent {
        Torrent {
            tags: tags.iter().map(ToString::to_string).collect(),
            ..Torrent::default()
        }
    }

    #[test]
    fn tag_predicates_are_case_insensitive() {
        let torrent = tagged(&["Permaseed", "tv"]);
        assert!(torrent.has_all_tags(&["permaseed", "TV"]));
        assert!(torrent.has_any_tag(&["missing", "tv"]));
        assert!(!torrent.has_all_tags(&["permaseed", "movies"]));
        assert!(!torrent.has_any_tag(&["movies"]));
    }

    #[test]
    fn public_is_complement_of_private() {
        let mut torrent = Torrent::default();
        torrent.is_private = true;
        assert!(!torrent.is_public());
        torrent.is_private = false;
        assert!(torrent.is_public());
    }

    #[test]
    fn derived_times_scale_from_seconds() {
        let torrent = Torrent {
            added_seconds: 7200,
            seeding_seconds: 86_400,
            ..Torrent::default()
        };
        assert!((torrent.added_hours() - 2.0).abs() < f64::EPSILON);
        assert!((torrent.seeding_days() - 1.0).abs() < f64::EPSILON);
        assert!((torrent.added_days() - 2.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn missing_files_only_flagged_for_downloaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("present.mkv");
        std::fs::write(&present, b"x").expect("write");

        let mut torrent = Torrent {
            downloaded: true,
            files: vec![present.to_string_lossy().into_owned()],
            ..Torrent::default()
        };
        assert!(!torrent.has_missing_files());

        torrent
            .files
            .push(dir.path().join("gone.mkv").to_string_lossy().into_owned());
        assert!(torrent.has_missing_files());

        torrent.downloaded = false;
        assert!(!torrent.has_missing_files());
    }

    #[test]
    fn snapshot_serializes_with_client_field_names() {
        let torrent = Torrent {
            hash: "a".repeat(40),
            name: "demo".into(),
            ..Torrent::default()
        };
        let json = serde_json::to_value(&torrent).expect("serialize");
        assert_eq!(json["Name"], "demo");
        assert!(json.get("registration").is_none());
    }
}
