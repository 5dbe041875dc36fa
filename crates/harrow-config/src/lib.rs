#![forbid(unsafe_code)]

//! YAML configuration loading with environment overlay.
//!
//! The file is parsed to a YAML document first, `HARROW__`-prefixed
//! environment variables are overlaid (with `__` as the path
//! delimiter), and only then is the document deserialized and
//! validated, so a bad value fails the run before any client I/O.

mod duration;
mod env;
mod error;
mod model;

use std::path::Path;

use tracing::debug;

pub use duration::parse_duration;
pub use env::ENV_PREFIX;
pub use error::{ConfigError, ConfigResult};
pub use model::{
    ClientConfig, ClientKind, Config, FilterConfig, LabelRuleConfig, OrphanConfig,
    OrphanFilterConfig, TagRuleConfig, TrackerErrorsConfig, DEFAULT_GRACE_PERIOD,
};

impl Config {
    /// Load, overlay, and validate the configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        Self::load_with_env(path, std::env::vars())
    }

    /// Like [`Config::load`] with an explicit variable source; used by
    /// tests to avoid touching the process environment.
    pub fn load_with_env(
        path: &Path,
        vars: impl Iterator<Item = (String, String)>,
    ) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut document: serde_yaml::Value =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { source })?;

        env::overlay_environment(&mut document, vars);

        let config: Config =
            serde_yaml::from_value(document).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;

        debug!(
            clients = config.clients.len(),
            filters = config.filters.len(),
            "loaded configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use harrow_rules::TagMode;

    use super::*;

    const SAMPLE: &str = r#"
clients:
  seedbox:
    type: qbittorrent
    enabled: true
    url: http://localhost:8080
    user: admin
    password: secret
    download_path: /downloads
    download_path_mapping:
      /inside: /host
    filter: default
    enableAutoTmmAfterRelabel: true
filters:
  default:
    MapHardlinksFor:
      - clean
    ignore:
      - IsTrackerDown()
    remove:
      - Ratio > 4.0 && SeedingDays > 30.0
    pause:
      - Seeds == 0
    label:
      - name: permaseed
        update:
          - Name contains "1080p"
    tag:
      - name: low-seed
        mode: full
        uploadKb: 50
        update:
          - Seeds <= 3
    orphan:
      grace_period: 5m
      ignore_paths:
        - /downloads/keep
orphan:
  grace_period: 10m
bypassIgnoreIfUnregistered: true
trackers:
  btn:
    api_key: key
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    fn load(content: &str) -> ConfigResult<Config> {
        let file = write_config(content);
        Config::load_with_env(file.path(), std::iter::empty())
    }

    #[test]
    fn parses_the_full_document() {
        let config = load(SAMPLE).expect("load");

        let client = config.client("seedbox").expect("client");
        assert_eq!(client.kind, ClientKind::Qbittorrent);
        assert!(client.enable_auto_tmm_after_relabel);
        assert_eq!(
            client.download_path_mapping.get("/inside"),
            Some(&"/host".to_string())
        );

        let filter = config.filter_for_client("seedbox").expect("filter");
        assert!(filter.maps_hardlinks_for("clean"));
        assert!(!filter.maps_hardlinks_for("relabel"));
        assert_eq!(filter.delete_data, None);
        assert!(config.bypass_ignore_if_unregistered);

        let source = filter.to_source();
        assert_eq!(source.ignore.len(), 1);
        assert_eq!(source.tags[0].mode, TagMode::Full);
        assert_eq!(source.tags[0].upload_kb, Some(50));

        assert_eq!(
            config.orphan_grace_period(filter),
            Duration::from_secs(300),
            "filter-level grace overrides the global"
        );
    }

    #[test]
    fn unknown_client_and_disabled_client_fail() {
        let config = load(SAMPLE).expect("load");
        assert!(matches!(
            config.client("nope"),
            Err(ConfigError::UnknownClient { .. })
        ));

        let disabled = SAMPLE.replace("enabled: true", "enabled: false");
        let config = load(&disabled).expect("load");
        assert!(matches!(
            config.client("seedbox"),
            Err(ConfigError::ClientDisabled { .. })
        ));
    }

    #[test]
    fn validation_rejects_missing_url_and_bad_mode() {
        let missing_url = SAMPLE.replace("    url: http://localhost:8080\n", "");
        assert!(matches!(
            load(&missing_url),
            Err(ConfigError::InvalidField { field, .. }) if field == "url"
        ));

        let bad_mode = SAMPLE.replace("mode: full", "mode: sideways");
        assert!(matches!(
            load(&bad_mode),
            Err(ConfigError::InvalidField { field, .. }) if field == "mode"
        ));

        let bad_grace = SAMPLE.replace("grace_period: 10m", "grace_period: soon");
        assert!(matches!(
            load(&bad_grace),
            Err(ConfigError::InvalidField { field, .. }) if field == "grace_period"
        ));
    }

    #[test]
    fn validation_rejects_dangling_filter_reference() {
        let dangling = SAMPLE.replace("    filter: default\n", "    filter: missing\n");
        assert!(matches!(
            load(&dangling),
            Err(ConfigError::InvalidField { field, .. }) if field == "filter"
        ));
    }

    #[test]
    fn environment_overlays_the_file() {
        let file = write_config(SAMPLE);
        let config = Config::load_with_env(
            file.path(),
            vec![
                (
                    "HARROW__CLIENTS__SEEDBOX__PASSWORD".to_string(),
                    "from-env".to_string(),
                ),
                (
                    "HARROW__BYPASS_IGNORE_IF_UNREGISTERED".to_string(),
                    "false".to_string(),
                ),
            ]
            .into_iter(),
        )
        .expect("load");

        let client = config.client("seedbox").expect("client");
        assert_eq!(client.password.as_deref(), Some("from-env"));
        assert!(!config.bypass_ignore_if_unregistered);
    }

    #[test]
    fn default_grace_period_applies_when_unset() {
        let trimmed = SAMPLE
            .replace("      grace_period: 5m\n", "")
            .replace("orphan:\n  grace_period: 10m\n", "");
        let config = load(&trimmed).expect("load");
        let filter = config.filter("default").expect("filter");
        assert_eq!(config.orphan_grace_period(filter), DEFAULT_GRACE_PERIOD);
    }
}
