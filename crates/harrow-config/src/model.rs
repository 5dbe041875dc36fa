//! Configuration data model.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use harrow_rules::{FilterSource, LabelSource, TagMode, TagSource};
use harrow_trackers::TrackersConfig;

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

/// Default orphan grace period when none is configured.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(600);

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Configured clients, keyed by the name used on the command line.
    #[serde(default)]
    pub clients: HashMap<String, ClientConfig>,
    /// Named filters.
    #[serde(default)]
    pub filters: HashMap<String, FilterConfig>,
    /// Tracker API credentials.
    #[serde(default)]
    pub trackers: TrackersConfig,
    /// Announce-status overrides.
    #[serde(default)]
    pub tracker_errors: TrackerErrorsConfig,
    /// Global orphan-scan settings.
    #[serde(default)]
    pub orphan: OrphanConfig,
    /// Evaluate remove rules for ignored torrents that are unregistered.
    #[serde(default, alias = "bypassIgnoreIfUnregistered")]
    pub bypass_ignore_if_unregistered: bool,
    /// Notification settings; parsed for compatibility and unused.
    #[serde(default)]
    pub notifications: serde_yaml::Value,
}

/// Which client implementation a configured client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// qBittorrent Web API.
    Qbittorrent,
    /// Deluge web JSON-RPC.
    Deluge,
}

/// One configured torrent client.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Client implementation.
    #[serde(rename = "type")]
    pub kind: ClientKind,
    /// Disabled clients refuse every action.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Web UI URL (qBittorrent).
    #[serde(default)]
    pub url: Option<String>,
    /// Daemon host (Deluge).
    #[serde(default)]
    pub host: Option<String>,
    /// Daemon port (Deluge).
    #[serde(default)]
    pub port: Option<u16>,
    /// Web UI user (qBittorrent).
    #[serde(default)]
    pub user: Option<String>,
    /// Daemon login (Deluge).
    #[serde(default)]
    pub login: Option<String>,
    /// Password for either client type.
    #[serde(default)]
    pub password: Option<String>,
    /// Download root used by the orphan scanner.
    #[serde(default)]
    pub download_path: Option<String>,
    /// Volume path for free-space queries (Deluge).
    #[serde(default)]
    pub free_space_path: Option<String>,
    /// Container-to-host path rewrites.
    #[serde(default)]
    pub download_path_mapping: HashMap<String, String>,
    /// Name of the filter this client uses.
    #[serde(default)]
    pub filter: Option<String>,
    /// Re-enable automatic torrent management after plain relabels.
    #[serde(default, alias = "enableAutoTmmAfterRelabel")]
    pub enable_auto_tmm_after_relabel: bool,
    /// Deluge daemon protocol v2.
    #[serde(default)]
    pub v2: bool,
}

fn default_true() -> bool {
    true
}

/// Announce-status override tables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerErrorsConfig {
    /// Replaces the default unregistered table per tracker name.
    #[serde(default)]
    pub per_tracker_unregistered_statuses: HashMap<String, Vec<String>>,
}

/// Global orphan-scan settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrphanConfig {
    /// Minimum file age before the scanner may delete it.
    #[serde(default)]
    pub grace_period: Option<String>,
}

/// One named filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Actions for which the hardlink index is built.
    #[serde(default, alias = "MapHardlinksFor")]
    pub map_hardlinks_for: Vec<String>,
    /// Ignore disjunction.
    #[serde(default, alias = "Ignore")]
    pub ignore: Vec<String>,
    /// Remove disjunction.
    #[serde(default, alias = "Remove")]
    pub remove: Vec<String>,
    /// Pause disjunction.
    #[serde(default, alias = "Pause")]
    pub pause: Vec<String>,
    /// Whether `clean` deletes data; defaults to true.
    #[serde(default, alias = "DeleteData")]
    pub delete_data: Option<bool>,
    /// Label rules in declaration order.
    #[serde(default, alias = "Label")]
    pub label: Vec<LabelRuleConfig>,
    /// Tag rules in declaration order.
    #[serde(default, alias = "Tag")]
    pub tag: Vec<TagRuleConfig>,
    /// Orphan-scan overrides for this filter.
    #[serde(default, alias = "Orphan")]
    pub orphan: OrphanFilterConfig,
}

/// One label rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelRuleConfig {
    /// Label to apply.
    #[serde(alias = "Name")]
    pub name: String,
    /// Conjunction of update expressions.
    #[serde(default, alias = "Update")]
    pub update: Vec<String>,
}

/// One tag rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagRuleConfig {
    /// Tag the rule manages.
    #[serde(alias = "Name")]
    pub name: String,
    /// `add`, `remove`, or `full` (default).
    #[serde(default, alias = "Mode")]
    pub mode: Option<String>,
    /// Optional upload limit in KiB/s; −1 means unlimited.
    #[serde(default, alias = "uploadKb")]
    pub upload_kb: Option<i64>,
    /// Conjunction of update expressions.
    #[serde(default, alias = "Update")]
    pub update: Vec<String>,
}

/// Per-filter orphan-scan settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrphanFilterConfig {
    /// Minimum file age before the scanner may delete it.
    #[serde(default)]
    pub grace_period: Option<String>,
    /// Path prefixes the scanner must leave alone.
    #[serde(default)]
    pub ignore_paths: Vec<String>,
}

impl Config {
    /// Look up an enabled client by name.
    pub fn client(&self, name: &str) -> ConfigResult<&ClientConfig> {
        let client = self
            .clients
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClient {
                name: name.to_string(),
            })?;
        if !client.enabled {
            return Err(ConfigError::ClientDisabled {
                name: name.to_string(),
            });
        }
        Ok(client)
    }

    /// Look up a filter by name.
    pub fn filter(&self, name: &str) -> ConfigResult<&FilterConfig> {
        self.filters
            .get(name)
            .ok_or_else(|| ConfigError::UnknownFilter {
                name: name.to_string(),
            })
    }

    /// The filter configured for a client.
    pub fn filter_for_client(&self, client_name: &str) -> ConfigResult<&FilterConfig> {
        let client = self.client(client_name)?;
        let filter_name =
            client
                .filter
                .as_deref()
                .ok_or_else(|| ConfigError::InvalidField {
                    section: format!("clients.{client_name}"),
                    field: "filter".to_string(),
                    reason: "no filter configured".to_string(),
                })?;
        self.filter(filter_name)
    }

    /// Validate cross-references and parseable values; fatal before I/O.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, client) in &self.clients {
            match client.kind {
                ClientKind::Qbittorrent => {
                    if client.url.as_deref().unwrap_or_default().is_empty() {
                        return Err(ConfigError::InvalidField {
                            section: format!("clients.{name}"),
                            field: "url".to_string(),
                            reason: "required for qbittorrent clients".to_string(),
                        });
                    }
                }
                ClientKind::Deluge => {
                    if client.host.as_deref().unwrap_or_default().is_empty() {
                        return Err(ConfigError::InvalidField {
                            section: format!("clients.{name}"),
                            field: "host".to_string(),
                            reason: "required for deluge clients".to_string(),
                        });
                    }
                }
            }

            if let Some(filter_name) = client.filter.as_deref() {
                if !self.filters.contains_key(filter_name) {
                    return Err(ConfigError::InvalidField {
                        section: format!("clients.{name}"),
                        field: "filter".to_string(),
                        reason: format!("filter `{filter_name}` is not defined"),
                    });
                }
            }
        }

        for (name, filter) in &self.filters {
            for tag in &filter.tag {
                tag.parsed_mode()
                    .map_err(|reason| ConfigError::InvalidField {
                        section: format!("filters.{name}.tag.{}", tag.name),
                        field: "mode".to_string(),
                        reason,
                    })?;
            }
            if let Some(raw) = filter.orphan.grace_period.as_deref() {
                parse_duration(raw).map_err(|reason| ConfigError::InvalidField {
                    section: format!("filters.{name}.orphan"),
                    field: "grace_period".to_string(),
                    reason,
                })?;
            }
        }

        if let Some(raw) = self.orphan.grace_period.as_deref() {
            parse_duration(raw).map_err(|reason| ConfigError::InvalidField {
                section: "orphan".to_string(),
                field: "grace_period".to_string(),
                reason,
            })?;
        }

        Ok(())
    }

    /// Effective orphan grace period for a filter, defaulting to ten
    /// minutes; a configured `0s` disables the age check.
    #[must_use]
    pub fn orphan_grace_period(&self, filter: &FilterConfig) -> Duration {
        filter
            .orphan
            .grace_period
            .as_deref()
            .or(self.orphan.grace_period.as_deref())
            .and_then(|raw| parse_duration(raw).ok())
            .unwrap_or(DEFAULT_GRACE_PERIOD)
    }
}

impl TagRuleConfig {
    /// Parse the configured mode string.
    pub fn parsed_mode(&self) -> Result<TagMode, String> {
        match self.mode.as_deref() {
            None | Some("") | Some("full") => Ok(TagMode::Full),
            Some("add") => Ok(TagMode::Add),
            Some("remove") => Ok(TagMode::Remove),
            Some(other) => Err(format!("unknown tag mode `{other}`")),
        }
    }
}

impl FilterConfig {
    /// Convert into the rule compiler's input form.
    ///
    /// Call [`Config::validate`] first; invalid tag modes degrade to
    /// `full` here.
    #[must_use]
    pub fn to_source(&self) -> FilterSource {
        FilterSource {
            ignore: self.ignore.clone(),
            remove: self.remove.clone(),
            pause: self.pause.clone(),
            labels: self
                .label
                .iter()
                .map(|rule| LabelSource {
                    name: rule.name.clone(),
                    update: rule.update.clone(),
                })
                .collect(),
            tags: self
                .tag
                .iter()
                .map(|rule| TagSource {
                    name: rule.name.clone(),
                    mode: rule.parsed_mode().unwrap_or_default(),
                    upload_kb: rule.upload_kb,
                    update: rule.update.clone(),
                })
                .collect(),
        }
    }

    /// Whether the hardlink index should be built for an action.
    #[must_use]
    pub fn maps_hardlinks_for(&self, action: &str) -> bool {
        self.map_hardlinks_for
            .iter()
            .any(|configured| configured.eq_ignore_ascii_case(action))
    }
}
