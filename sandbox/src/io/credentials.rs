//! Ephemeral SSH key material for reaching the sandbox container.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::defaults;
use crate::io::process::{Invocation, ProcessRunner, run_checked};

/// Key files for one run. Regenerated every run, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    /// Copy of the public key, mounted into the container as `authorized_keys`.
    pub authorized_keys: PathBuf,
}

impl KeyMaterial {
    /// Paths for `basename` inside `ssh_dir`.
    pub fn at(ssh_dir: &Path, basename: &str) -> Self {
        Self {
            private_key: ssh_dir.join(basename),
            public_key: ssh_dir.join(format!("{basename}.pub")),
            authorized_keys: ssh_dir.join(defaults::AUTHORIZED_KEYS),
        }
    }
}

/// Directory holding the key material under `base_dir`.
pub fn ssh_dir(base_dir: &Path) -> PathBuf {
    base_dir.join(defaults::SSH_DIR)
}

/// Generate a fresh passphrase-less ed25519 key pair and its `authorized_keys` copy.
///
/// The key directory is created owner-only and stale keys are removed first,
/// so an `ssh-keygen` failure never leaves old credentials behind.
#[instrument(skip_all, fields(base_dir = %base_dir.display(), basename))]
pub fn provision_keys<R: ProcessRunner + ?Sized>(
    runner: &R,
    base_dir: &Path,
    basename: &str,
) -> Result<KeyMaterial> {
    let dir = ssh_dir(base_dir);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    restrict_to_owner(&dir)?;

    let keys = KeyMaterial::at(&dir, basename);
    for stale in [&keys.private_key, &keys.public_key] {
        if stale.exists() {
            debug!(path = %stale.display(), "removing stale key");
            fs::remove_file(stale).with_context(|| format!("remove {}", stale.display()))?;
        }
    }

    debug!("generating ed25519 key pair");
    run_checked(
        runner,
        &Invocation::new([
            "ssh-keygen".to_string(),
            "-q".into(),
            "-t".into(),
            "ed25519".into(),
            "-N".into(),
            String::new(),
            "-C".into(),
            defaults::KEY_COMMENT.into(),
            "-f".into(),
            keys.private_key.display().to_string(),
        ]),
    )
    .context("generate ssh key pair")?;

    let public = fs::read(&keys.public_key)
        .with_context(|| format!("read {}", keys.public_key.display()))?;
    fs::write(&keys.authorized_keys, public)
        .with_context(|| format!("write {}", keys.authorized_keys.display()))?;

    info!(
        private_key = %keys.private_key.display(),
        authorized_keys = %keys.authorized_keys.display(),
        "ssh keys created"
    );
    Ok(keys)
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("chmod 700 {}", dir.display()))
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Path) -> Result<()> {
    Ok(())
}
