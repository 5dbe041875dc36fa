//! On-disk hardlink identity index.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::warn;

use harrow_core::Torrent;

use crate::linkinfo::link_info;
use crate::PathMappings;

/// Index over on-disk file identity, with a no-op variant for runs that
/// skip hardlink mapping.
pub trait HardlinkIndex: Send + Sync {
    /// Register a torrent's files by their on-disk identity.
    fn add_torrent(&mut self, torrent: &Torrent);

    /// Unregister a torrent's files; used by the two-phase removal loop.
    fn remove_torrent(&mut self, torrent: &Torrent);

    /// True iff every file the torrent owns resolves to an identity with
    /// exactly one known path.
    fn is_torrent_unique(&self, torrent: &Torrent) -> bool;

    /// True iff none of the torrent's identities are known any more.
    fn no_instances(&self, torrent: &Torrent) -> bool;

    /// True iff the OS reports more links to any of the torrent's files
    /// than the client accounts for.
    fn hardlinked_outside_client(&self, torrent: &Torrent) -> bool;

    /// Number of distinct file identities tracked.
    fn len(&self) -> usize;

    /// Whether the index tracks nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Real index built by `stat`-ing every file of every downloaded torrent.
#[derive(Debug, Default)]
pub struct HardlinkFileMap {
    map: HashMap<String, HashSet<String>>,
    mappings: PathMappings,
}

impl HardlinkFileMap {
    /// Build the index over every torrent in the run.
    ///
    /// Non-downloaded torrents contribute nothing; a missing file is
    /// logged and skipped, because the torrent might be missing files
    /// legitimately.
    #[must_use]
    pub fn new<'a>(
        torrents: impl IntoIterator<Item = &'a Torrent>,
        mappings: PathMappings,
    ) -> Self {
        let mut index = Self {
            map: HashMap::new(),
            mappings,
        };
        for torrent in torrents {
            index.add_torrent(torrent);
        }
        index
    }

    fn link_info_by_path(&self, path: &str) -> Option<(String, u64)> {
        let effective = self.mappings.apply(path);
        match link_info(Path::new(&effective)) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!(path = %effective, error = %err, "failed resolving file identity");
                None
            }
        }
    }

    /// Paths known in the index plus the OS link count for one file.
    fn count_links(&self, path: &str) -> Option<(u64, u64)> {
        let (id, nlink) = self.link_info_by_path(path)?;
        let in_map = self.map.get(&id).map_or(0, HashSet::len) as u64;
        Some((in_map, nlink))
    }
}

impl HardlinkIndex for HardlinkFileMap {
    fn add_torrent(&mut self, torrent: &Torrent) {
        if !torrent.downloaded {
            return;
        }

        for file in &torrent.files {
            let effective = self.mappings.apply(file);
            let Some((id, _)) = self.link_info_by_path(file) else {
                continue;
            };
            self.map.entry(id).or_default().insert(effective);
        }
    }

    fn remove_torrent(&mut self, torrent: &Torrent) {
        if !torrent.downloaded {
            return;
        }

        for file in &torrent.files {
            let effective = self.mappings.apply(file);
            let Some((id, _)) = self.link_info_by_path(file) else {
                continue;
            };
            if let Some(paths) = self.map.get_mut(&id) {
                paths.remove(&effective);
                if paths.is_empty() {
                    self.map.remove(&id);
                }
            }
        }
    }

    fn is_torrent_unique(&self, torrent: &Torrent) -> bool {
        if !torrent.downloaded {
            return true;
        }

        for file in &torrent.files {
            let Some((in_map, _)) = self.count_links(file) else {
                // unknown identity; treat as shared so removal stays safe
                return false;
            };
            if in_map > 1 {
                return false;
            }
        }

        true
    }

    fn no_instances(&self, torrent: &Torrent) -> bool {
        if !torrent.downloaded {
            return true;
        }

        for file in &torrent.files {
            let Some((in_map, _)) = self.count_links(file) else {
                return false;
            };
            if in_map != 0 {
                return false;
            }
        }

        true
    }

    fn hardlinked_outside_client(&self, torrent: &Torrent) -> bool {
        if !torrent.downloaded {
            return false;
        }

        for file in &torrent.files {
            let Some((in_map, nlink)) = self.count_links(file) else {
                continue;
            };
            if nlink != in_map {
                return true;
            }
        }

        false
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// No-op index used when hardlink mapping is disabled for the action.
///
/// Every torrent looks unique and unshared, so the overlap index alone
/// decides safety.
#[derive(Debug, Default)]
pub struct NoopHardlinkFileMap;

impl HardlinkIndex for NoopHardlinkFileMap {
    fn add_torrent(&mut self, _torrent: &Torrent) {}

    fn remove_torrent(&mut self, _torrent: &Torrent) {}

    fn is_torrent_unique(&self, _torrent: &Torrent) -> bool {
        true
    }

    fn no_instances(&self, _torrent: &Torrent) -> bool {
        true
    }

    fn hardlinked_outside_client(&self, _torrent: &Torrent) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn torrent(hash: &str, files: Vec<String>) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            name: hash.to_string(),
            files,
            downloaded: true,
            ..Torrent::default()
        }
    }

    #[test]
    fn unique_torrent_with_unlinked_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("solo.mkv");
        std::fs::write(&file, b"x").expect("write");

        let a = torrent("a", vec![file.to_string_lossy().into_owned()]);
        let index = HardlinkFileMap::new([&a], PathMappings::default());

        assert_eq!(index.len(), 1);
        assert!(index.is_torrent_unique(&a));
        assert!(!index.hardlinked_outside_client(&a));
    }

    #[test]
    fn two_torrents_sharing_an_inode_are_not_unique() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client_a = dir.path().join("clientA.mkv");
        let client_b = dir.path().join("clientB.mkv");
        std::fs::write(&client_a, b"x").expect("write");
        std::fs::hard_link(&client_a, &client_b).expect("link");

        let a = torrent("a", vec![client_a.to_string_lossy().into_owned()]);
        let b = torrent("b", vec![client_b.to_string_lossy().into_owned()]);
        let index = HardlinkFileMap::new([&a, &b], PathMappings::default());

        assert_eq!(index.len(), 1, "one identity, two paths");
        assert!(!index.is_torrent_unique(&a));
        assert!(!index.is_torrent_unique(&b));
        // both paths are known to the client, nothing external
        assert!(!index.hardlinked_outside_client(&a));
    }

    #[test]
    fn library_link_outside_client_is_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let in_client = dir.path().join("client.mkv");
        let in_library = dir.path().join("library.mkv");
        std::fs::write(&in_client, b"x").expect("write");
        std::fs::hard_link(&in_client, &in_library).expect("link");

        // only the client path is registered; nlink=2 exceeds it
        let a = torrent("a", vec![in_client.to_string_lossy().into_owned()]);
        let index = HardlinkFileMap::new([&a], PathMappings::default());

        assert!(index.is_torrent_unique(&a), "unique within the client");
        assert!(index.hardlinked_outside_client(&a));
    }

    #[test]
    fn virtual_removal_enables_no_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client_a = dir.path().join("a.mkv");
        let client_b = dir.path().join("b.mkv");
        std::fs::write(&client_a, b"x").expect("write");
        std::fs::hard_link(&client_a, &client_b).expect("link");

        let a = torrent("a", vec![client_a.to_string_lossy().into_owned()]);
        let b = torrent("b", vec![client_b.to_string_lossy().into_owned()]);
        let mut index = HardlinkFileMap::new([&a, &b], PathMappings::default());

        index.remove_torrent(&a);
        assert!(!index.no_instances(&a), "b's path still maps the identity");
        index.remove_torrent(&b);
        assert!(index.no_instances(&a));
        assert!(index.no_instances(&b));
    }

    #[test]
    fn add_remove_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("f.mkv");
        std::fs::write(&file, b"x").expect("write");

        let a = torrent("a", vec![file.to_string_lossy().into_owned()]);
        let mut index = HardlinkFileMap::new([&a], PathMappings::default());
        index.remove_torrent(&a);
        assert_eq!(index.len(), 0);
        index.add_torrent(&a);
        assert_eq!(index.len(), 1);
        assert!(index.is_torrent_unique(&a));
    }

    #[test]
    fn non_downloaded_torrents_are_invisible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("partial.mkv");
        std::fs::write(&file, b"x").expect("write");

        let mut partial = torrent("p", vec![file.to_string_lossy().into_owned()]);
        partial.downloaded = false;

        let index = HardlinkFileMap::new([&partial], PathMappings::default());
        assert_eq!(index.len(), 0);
        assert!(index.is_torrent_unique(&partial));
        assert!(index.no_instances(&partial));
        assert!(!index.hardlinked_outside_client(&partial));
    }

    #[test]
    fn noop_index_reports_safe_defaults() {
        let a = torrent("a", vec!["/nonexistent/file.mkv".to_string()]);
        let index = NoopHardlinkFileMap;
        assert!(index.is_torrent_unique(&a));
        assert!(index.no_instances(&a));
        assert!(!index.hardlinked_outside_client(&a));
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }
}
