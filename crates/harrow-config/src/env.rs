//! Environment overlay: `HARROW__CLIENTS__SEEDBOX__PASSWORD=x` sets
//! `clients.seedbox.password` on top of the parsed YAML document.

use serde_yaml::{Mapping, Value};

/// Variables must start with this prefix to participate.
pub const ENV_PREFIX: &str = "HARROW__";

/// Path delimiter inside a variable name, after the prefix.
const DELIMITER: &str = "__";

/// Overlay matching environment variables onto a YAML document.
pub(crate) fn overlay_environment(
    document: &mut Value,
    vars: impl Iterator<Item = (String, String)>,
) {
    for (name, value) in vars {
        let Some(path) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let segments: Vec<String> = path
            .split(DELIMITER)
            .map(str::to_lowercase)
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            continue;
        }
        set_path(document, &segments, parse_scalar(&value));
    }
}

fn set_path(document: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if !document.is_mapping() {
        *document = Value::Mapping(Mapping::new());
    }
    let mapping = document.as_mapping_mut().expect("made a mapping above");

    // config keys may be mixed-case (client names); match loosely
    let key = mapping
        .keys()
        .find(|key| {
            key.as_str()
                .is_some_and(|existing| existing.eq_ignore_ascii_case(head))
        })
        .cloned()
        .unwrap_or_else(|| Value::String(head.clone()));

    if rest.is_empty() {
        mapping.insert(key, value);
        return;
    }

    let child = mapping.entry(key).or_insert(Value::Mapping(Mapping::new()));
    set_path(child, rest, value);
}

fn parse_scalar(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = raw.parse::<f64>() {
        if let Some(number) = serde_yaml::Number::from(float).as_f64() {
            return Value::Number(serde_yaml::Number::from(number));
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).expect("yaml")
    }

    #[test]
    fn overlays_nested_paths_case_insensitively() {
        let mut document = doc("clients:\n  SeedBox:\n    password: old\n");
        overlay_environment(
            &mut document,
            vec![(
                "HARROW__CLIENTS__SEEDBOX__PASSWORD".to_string(),
                "new".to_string(),
            )]
            .into_iter(),
        );

        let password = &document["clients"]["SeedBox"]["password"];
        assert_eq!(password.as_str(), Some("new"));
    }

    #[test]
    fn creates_missing_sections_and_parses_scalars() {
        let mut document = doc("{}");
        overlay_environment(
            &mut document,
            vec![
                (
                    "HARROW__BYPASS_IGNORE_IF_UNREGISTERED".to_string(),
                    "true".to_string(),
                ),
                ("HARROW__CLIENTS__A__PORT".to_string(), "8112".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ]
            .into_iter(),
        );

        assert_eq!(
            document["bypass_ignore_if_unregistered"].as_bool(),
            Some(true)
        );
        assert_eq!(document["clients"]["a"]["port"].as_i64(), Some(8112));
        assert!(document.get("unrelated").is_none());
    }
}
