//! Tracker URL reduction helpers.

use url::Url;

/// Pseudo-tracker entries reported by clients alongside real trackers.
const PSEUDO_TRACKERS: &[&str] = &["[DHT]", "[LSD]", "[PeX]"];

/// Second-level public suffixes common among tracker domains; enough to
/// reduce a tracker host without carrying a full public-suffix list.
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "me.uk", "ac.uk", "com.au", "net.au", "org.au", "co.nz", "com.br",
    "com.mx", "co.za", "co.jp", "or.jp", "ne.jp", "com.tw", "com.cn", "com.ar", "com.tr",
];

/// Whether a tracker list entry is a DHT/LSD/PeX pseudo tracker.
#[must_use]
pub fn is_pseudo_tracker(url: &str) -> bool {
    PSEUDO_TRACKERS
        .iter()
        .any(|pseudo| url.contains(pseudo))
}

/// Host portion of an announce URL, without the port.
#[must_use]
pub fn tracker_host(announce_url: &str) -> Option<String> {
    Url::parse(announce_url)
        .ok()
        .and_then(|url| url.host_str().map(ToString::to_string))
}

/// Registrable domain of an announce URL's host: the last two labels,
/// or three when the suffix itself has two (e.g. `co.uk`).
#[must_use]
pub fn registrable_domain(announce_url: &str) -> String {
    let Some(host) = tracker_host(announce_url) else {
        return String::new();
    };

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let take = if SECOND_LEVEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };

    labels[labels.len().saturating_sub(take)..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_to_registrable_domain() {
        assert_eq!(
            registrable_domain("https://tracker.example.org:2710/announce"),
            "example.org"
        );
        assert_eq!(
            registrable_domain("http://landof.tv/announce/abc"),
            "landof.tv"
        );
        assert_eq!(
            registrable_domain("https://a.b.tracker.co.uk/announce"),
            "tracker.co.uk"
        );
        assert_eq!(registrable_domain("udp://flacsfor.me:2710"), "flacsfor.me");
    }

    #[test]
    fn pseudo_trackers_are_recognized() {
        assert!(is_pseudo_tracker("** [DHT] **"));
        assert!(is_pseudo_tracker("** [PeX] **"));
        assert!(is_pseudo_tracker("** [LSD] **"));
        assert!(!is_pseudo_tracker("https://tracker.example.org/announce"));
    }

    #[test]
    fn invalid_urls_reduce_to_empty() {
        assert_eq!(registrable_domain("** [DHT] **"), "");
        assert!(tracker_host("not a url").is_none());
    }
}
