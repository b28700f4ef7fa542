//! Demo vault password file for sandbox playbooks.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::defaults;

/// Path of the vault password file under `root`.
pub fn vault_password_path(root: &Path) -> PathBuf {
    root.join(defaults::VAULT_PASSWORD_FILE)
}

/// Create the vault password file with the demo password unless it already exists.
pub fn ensure_vault_file(root: &Path) -> Result<PathBuf> {
    let path = vault_password_path(root);
    if !path.exists() {
        fs::write(&path, format!("{}\n", defaults::VAULT_DEMO_PASSWORD))
            .with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "created vault password file");
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_once_and_keeps_existing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = ensure_vault_file(temp.path()).expect("create");
        assert_eq!(fs::read_to_string(&path).expect("read"), "password\n");

        fs::write(&path, "custom\n").expect("overwrite");
        ensure_vault_file(temp.path()).expect("ensure");
        assert_eq!(fs::read_to_string(&path).expect("read"), "custom\n");
    }
}
