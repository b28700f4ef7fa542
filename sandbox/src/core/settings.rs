//! Layered settings precedence: CLI override, then persisted value, then default.

use std::collections::BTreeMap;

/// Flat key/value settings. Sorted so persistence is deterministic.
pub type SettingsMap = BTreeMap<String, String>;

/// Where an effective setting value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Cli,
    Persisted,
    Default,
}

/// A CLI override that replaced a different persisted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingConflict {
    pub key: String,
    pub persisted: String,
    pub overridden_by: String,
}

/// Effective value of one setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSetting {
    pub value: String,
    pub source: SettingSource,
    pub conflict: Option<SettingConflict>,
}

/// Resolve `key` against a CLI override, the persisted settings and a default.
///
/// Empty strings count as absent on both layers.
pub fn resolve_setting(
    key: &str,
    cli: Option<&str>,
    persisted: &SettingsMap,
    default: &str,
) -> ResolvedSetting {
    let cli = cli.filter(|v| !v.is_empty());
    let stored = persisted
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty());

    match (cli, stored) {
        (Some(cli), stored) => ResolvedSetting {
            value: cli.to_string(),
            source: SettingSource::Cli,
            conflict: stored.filter(|s| *s != cli).map(|s| SettingConflict {
                key: key.to_string(),
                persisted: s.to_string(),
                overridden_by: cli.to_string(),
            }),
        },
        (None, Some(stored)) => ResolvedSetting {
            value: stored.to_string(),
            source: SettingSource::Persisted,
            conflict: None,
        },
        (None, None) => ResolvedSetting {
            value: default.to_string(),
            source: SettingSource::Default,
            conflict: None,
        },
    }
}

/// Overlay `upper` onto `lower`; keys missing from `upper` keep their `lower` value.
pub fn overlay(lower: &SettingsMap, upper: &SettingsMap) -> SettingsMap {
    let mut merged = lower.clone();
    merged.extend(upper.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
