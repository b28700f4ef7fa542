//! The `.env` settings file: flat `KEY=VALUE` lines, `#` comments.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::settings::SettingsMap;

/// Load settings from `path`. A missing file yields an empty map.
///
/// Blank lines, `#` comments and lines without `=` are skipped. Each line is
/// split on its first `=` so values may contain `=`; keys and values are trimmed.
pub fn load_settings(path: &Path) -> Result<SettingsMap> {
    if !path.exists() {
        debug!(path = %path.display(), "settings file does not exist");
        return Ok(SettingsMap::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings = parse_settings(&contents);
    debug!(path = %path.display(), count = settings.len(), "loaded settings");
    Ok(settings)
}

pub fn parse_settings(contents: &str) -> SettingsMap {
    let mut settings = SettingsMap::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        settings.insert(key.trim().to_string(), value.trim().to_string());
    }
    settings
}

/// Render settings with keys sorted, one `KEY=VALUE` per line, trailing newline.
pub fn render_settings(settings: &SettingsMap) -> String {
    let mut buf = String::new();
    for (key, value) in settings {
        buf.push_str(key);
        buf.push('=');
        buf.push_str(value);
        buf.push('\n');
    }
    buf
}

/// Atomically write settings to disk (temp file + rename).
pub fn persist_settings(path: &Path, settings: &SettingsMap) -> Result<()> {
    let contents = render_settings(settings);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("settings path has no file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    info!(path = %path.display(), count = settings.len(), "wrote settings file");
    Ok(())
}
