//! Declared-path overlap index (cross-seed detection).

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use harrow_core::Torrent;

use crate::PathMappings;

/// Maps every declared file path to the set of torrents claiming it.
///
/// Built purely from what the client reports; no disk I/O. Readers may
/// run concurrently; the two-phase removal loop is the only writer.
#[derive(Debug, Default)]
pub struct TorrentFileMap {
    map: RwLock<HashMap<String, HashSet<String>>>,
    path_cache: Mutex<HashMap<String, bool>>,
}

impl TorrentFileMap {
    /// Build the index over every torrent in the run.
    #[must_use]
    pub fn new<'a>(torrents: impl IntoIterator<Item = &'a Torrent>) -> Self {
        let index = Self::default();
        {
            let mut map = index.map.write().expect("file map lock poisoned");
            for torrent in torrents {
                add_to(&mut map, torrent);
            }
        }
        index
    }

    /// Register a torrent's files.
    pub fn add(&self, torrent: &Torrent) {
        let mut map = self.map.write().expect("file map lock poisoned");
        add_to(&mut map, torrent);
    }

    /// Unregister a torrent's files; exact inverse of [`Self::add`].
    pub fn remove(&self, torrent: &Torrent) {
        let mut map = self.map.write().expect("file map lock poisoned");
        for file in &torrent.files {
            if let Some(owners) = map.get_mut(file) {
                owners.remove(&torrent.hash);
                if owners.is_empty() {
                    map.remove(file);
                }
            }
        }
    }

    /// True iff every file of the torrent is claimed by exactly one torrent.
    #[must_use]
    pub fn is_unique(&self, torrent: &Torrent) -> bool {
        let map = self.map.read().expect("file map lock poisoned");
        torrent
            .files
            .iter()
            .all(|file| map.get(file).is_none_or(|owners| owners.len() <= 1))
    }

    /// True iff no file of the torrent is claimed by anyone; used for the
    /// post-removal reachability check of the two-phase algorithm.
    #[must_use]
    pub fn no_instances(&self, torrent: &Torrent) -> bool {
        let map = self.map.read().expect("file map lock poisoned");
        torrent
            .files
            .iter()
            .all(|file| map.get(file).is_none_or(HashSet::is_empty))
    }

    /// Whether any stored path contains `path` after applying the client
    /// path mapping. Case-sensitive; memoized for the run because the
    /// orphan scanner asks once per walked entry.
    #[must_use]
    pub fn has_path(&self, path: &str, mappings: &PathMappings) -> bool {
        if let Some(cached) = self
            .path_cache
            .lock()
            .expect("path cache lock poisoned")
            .get(path)
        {
            return *cached;
        }

        let found = {
            let map = self.map.read().expect("file map lock poisoned");
            if mappings.is_empty() {
                map.keys().any(|stored| stored.contains(path))
            } else {
                map.keys()
                    .any(|stored| mappings.apply(stored).contains(path))
            }
        };

        self.path_cache
            .lock()
            .expect("path cache lock poisoned")
            .insert(path.to_string(), found);
        found
    }

    /// The torrent together with every torrent sharing any of its files.
    #[must_use]
    pub fn torrents_sharing_files(
        &self,
        torrent: &Torrent,
        all: &HashMap<String, Torrent>,
    ) -> Vec<Torrent> {
        let map = self.map.read().expect("file map lock poisoned");
        let mut group: HashSet<String> = HashSet::new();
        group.insert(torrent.hash.clone());

        for file in &torrent.files {
            if let Some(owners) = map.get(file) {
                group.extend(owners.iter().cloned());
            }
        }

        group
            .into_iter()
            .filter_map(|hash| all.get(&hash).cloned())
            .collect()
    }

    /// Number of distinct file paths tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().expect("file map lock poisoned").len()
    }

    /// Whether the index tracks no paths at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn add_to(map: &mut HashMap<String, HashSet<String>>, torrent: &Torrent) {
    for file in &torrent.files {
        map.entry(file.clone())
            .or_default()
            .insert(torrent.hash.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent(hash: &str, files: &[&str]) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            name: hash.to_string(),
            files: files.iter().map(ToString::to_string).collect(),
            ..Torrent::default()
        }
    }

    #[test]
    fn unique_and_overlapping_torrents() {
        let a = torrent("a", &["/d/movie.mkv"]);
        let b = torrent("b", &["/d/movie.mkv"]);
        let c = torrent("c", &["/d/other.mkv"]);
        let map = TorrentFileMap::new([&a, &b, &c]);

        assert_eq!(map.len(), 2);
        assert!(!map.is_unique(&a));
        assert!(!map.is_unique(&b));
        assert!(map.is_unique(&c));
    }

    #[test]
    fn add_then_remove_restores_prior_state() {
        let a = torrent("a", &["/d/one.mkv", "/d/two.mkv"]);
        let b = torrent("b", &["/d/one.mkv"]);
        let map = TorrentFileMap::new([&a]);

        assert!(map.is_unique(&a));
        map.add(&b);
        assert!(!map.is_unique(&a));
        map.remove(&b);
        assert!(map.is_unique(&a));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn no_instances_after_removal() {
        let a = torrent("a", &["/d/movie.mkv"]);
        let b = torrent("b", &["/d/movie.mkv"]);
        let map = TorrentFileMap::new([&a, &b]);

        assert!(!map.no_instances(&a));
        map.remove(&a);
        assert!(!map.no_instances(&b), "b still claims the path");
        map.remove(&b);
        assert!(map.no_instances(&a));
        assert!(map.no_instances(&b));
    }

    #[test]
    fn has_path_applies_mapping_and_memoizes() {
        let a = torrent("a", &["/inside/downloads/show/e1.mkv"]);
        let map = TorrentFileMap::new([&a]);

        let none = PathMappings::default();
        assert!(map.has_path("/inside/downloads/show", &none));
        assert!(!map.has_path("/inside/seed", &none));

        let mapped = PathMappings::new([("/inside".to_string(), "/host".to_string())]);
        let other = TorrentFileMap::new([&a]);
        assert!(other.has_path("/host/downloads/show", &mapped));
        // second lookup served from the memo
        assert!(other.has_path("/host/downloads/show", &mapped));
        assert!(!other.has_path("/inside/downloads/show", &mapped));
    }

    #[test]
    fn sharing_group_includes_self_and_partners() {
        let a = torrent("a", &["/d/movie.mkv"]);
        let b = torrent("b", &["/d/movie.mkv"]);
        let c = torrent("c", &["/d/other.mkv"]);
        let map = TorrentFileMap::new([&a, &b, &c]);

        let mut all = HashMap::new();
        for t in [&a, &b, &c] {
            all.insert(t.hash.clone(), t.clone());
        }

        let mut group: Vec<String> = map
            .torrents_sharing_files(&a, &all)
            .into_iter()
            .map(|t| t.hash)
            .collect();
        group.sort();
        assert_eq!(group, vec!["a".to_string(), "b".to_string()]);
    }
}
