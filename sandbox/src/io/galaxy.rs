//! Role and collection assurance through `ansible-galaxy`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::defaults;
use crate::io::process::{EnvMap, Invocation, ProcessRunner, run_checked};

/// What [`ensure_roles`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolesOutcome {
    /// `roles/` does not exist.
    NoRolesDir,
    /// `roles/` already holds entries.
    AlreadyPresent(usize),
    /// Empty `roles/` without `requirements.yml`.
    NoRequirements,
    /// Sibling role checkout linked for live development.
    LinkedSibling(PathBuf),
    /// Installed from `roles/requirements.yml`.
    Installed,
}

/// Make sure roles are available under `<root>/roles`.
///
/// Existing entries are left alone. An empty directory is filled by linking a
/// sibling `ans_dev_sandbox_role` checkout when present, else by installing
/// `roles/requirements.yml`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn ensure_roles<R: ProcessRunner + ?Sized>(
    runner: &R,
    root: &Path,
    env: &EnvMap,
) -> Result<RolesOutcome> {
    let roles_dir = root.join("roles");
    if !roles_dir.is_dir() {
        info!("roles/ directory not present, skipping role check");
        return Ok(RolesOutcome::NoRolesDir);
    }

    let mut existing = Vec::new();
    for entry in fs::read_dir(&roles_dir).with_context(|| format!("read {}", roles_dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", roles_dir.display()))?;
        let file_type = entry.file_type().context("read entry type")?;
        if file_type.is_dir() || file_type.is_symlink() {
            existing.push(entry.file_name());
        }
    }
    if !existing.is_empty() {
        info!(count = existing.len(), "roles already present, skipping install");
        debug!(roles = ?existing, "existing roles");
        return Ok(RolesOutcome::AlreadyPresent(existing.len()));
    }

    let requirements = roles_dir.join("requirements.yml");
    if !requirements.exists() {
        info!("no roles and no roles/requirements.yml, skipping role install");
        return Ok(RolesOutcome::NoRequirements);
    }

    let sibling = root
        .parent()
        .map(|parent| parent.join(defaults::SIBLING_ROLE));
    if let Some(sibling) = sibling.filter(|s| s.exists()) {
        let link = roles_dir.join(defaults::SIBLING_ROLE);
        link_sibling_role(&link)?;
        info!(link = %link.display(), sibling = %sibling.display(), "linked sibling role");
        return Ok(RolesOutcome::LinkedSibling(link));
    }

    info!("installing roles from requirements.yml");
    run_checked(
        runner,
        &Invocation::new([
            "ansible-galaxy".to_string(),
            "install".into(),
            "--role-file".into(),
            requirements.display().to_string(),
            "--roles-path".into(),
            roles_dir.display().to_string(),
        ])
        .with_env(env),
    )
    .context("install roles")?;
    Ok(RolesOutcome::Installed)
}

#[cfg(unix)]
fn link_sibling_role(link: &Path) -> Result<()> {
    if fs::symlink_metadata(link).is_ok() {
        debug!(link = %link.display(), "removing existing link");
        fs::remove_file(link).with_context(|| format!("remove {}", link.display()))?;
    }
    let target = Path::new("../..").join(defaults::SIBLING_ROLE);
    std::os::unix::fs::symlink(&target, link)
        .with_context(|| format!("symlink {} -> {}", link.display(), target.display()))
}

#[cfg(not(unix))]
fn link_sibling_role(link: &Path) -> Result<()> {
    anyhow::bail!("linking sibling roles requires symlink support ({})", link.display())
}

/// Install each required collection that `ansible-galaxy collection list` does not show.
///
/// A failing list is treated as "not installed"; install failures propagate.
#[instrument(skip_all)]
pub fn ensure_collections<R: ProcessRunner + ?Sized>(runner: &R, env: &EnvMap) -> Result<Vec<String>> {
    let mut installed = Vec::new();
    for name in defaults::REQUIRED_COLLECTIONS {
        if has_collection(runner, env, name) {
            debug!(collection = name, "collection already installed");
            continue;
        }
        info!(collection = name, "installing collection");
        run_checked(
            runner,
            &Invocation::new(["ansible-galaxy", "collection", "install", name]).with_env(env),
        )
        .with_context(|| format!("install collection {name}"))?;
        installed.push(name.to_string());
    }
    Ok(installed)
}

fn has_collection<R: ProcessRunner + ?Sized>(runner: &R, env: &EnvMap, name: &str) -> bool {
    let list = Invocation::new(["ansible-galaxy", "collection", "list"])
        .captured()
        .with_env(env);
    match run_checked(runner, &list) {
        Ok(out) => out.stdout.contains(name),
        Err(err) => {
            debug!(err = %err, "failed to list collections");
            false
        }
    }
}
