#![cfg_attr(not(windows), forbid(unsafe_code))]

//! Overlap indexes that keep the engine from destroying shared data.
//!
//! Two views are maintained over the same torrents: the file-overlap
//! index works on the paths torrents declare, while the hardlink index
//! works on the on-disk identity those paths resolve to.

mod hardlink;
mod linkinfo;
mod overlap;

pub use hardlink::{HardlinkFileMap, HardlinkIndex, NoopHardlinkFileMap};
pub use linkinfo::link_info;
pub use overlap::TorrentFileMap;

/// Per-client path rewrites applied before touching the filesystem.
///
/// Clients running in containers report paths that are not the paths
/// visible to this process; the longest matching prefix is substituted
/// once.
#[derive(Debug, Clone, Default)]
pub struct PathMappings {
    mappings: Vec<(String, String)>,
}

impl PathMappings {
    /// Build from configured `from → to` pairs. Longer prefixes win.
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut mappings: Vec<(String, String)> = pairs.into_iter().collect();
        mappings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { mappings }
    }

    /// Whether any rewrite is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Rewrite a declared path, substituting the longest matching prefix.
    #[must_use]
    pub fn apply(&self, path: &str) -> String {
        for (from, to) in &self.mappings {
            if path.starts_with(from.as_str()) {
                return path.replacen(from.as_str(), to, 1);
            }
        }
        path.to_string()
    }

    /// Configured pairs, longest prefix first.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.mappings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mappings = PathMappings::new([
            ("/data".to_string(), "/mnt/a".to_string()),
            ("/data/downloads".to_string(), "/mnt/b".to_string()),
        ]);
        assert_eq!(mappings.apply("/data/downloads/x.mkv"), "/mnt/b/x.mkv");
        assert_eq!(mappings.apply("/data/other/x.mkv"), "/mnt/a/other/x.mkv");
        assert_eq!(mappings.apply("/elsewhere/x.mkv"), "/elsewhere/x.mkv");
    }

    #[test]
    fn substitution_happens_once() {
        let mappings = PathMappings::new([("/d".to_string(), "/d/d".to_string())]);
        assert_eq!(mappings.apply("/d/file"), "/d/d/file");
    }
}
