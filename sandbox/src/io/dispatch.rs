//! Handoff to `ansible-playbook`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::defaults;
use crate::io::process::{EnvMap, Invocation, ProcessRunner, run_checked};

/// What a run executes. Built once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub inventory: PathBuf,
    pub playbook: PathBuf,
    /// Host/group pattern passed as `-l`.
    pub limit: Option<String>,
}

impl RunTarget {
    /// Default inventory and playbook locations under `root`.
    pub fn in_project(root: &Path, limit: Option<String>) -> Self {
        Self {
            inventory: root.join(defaults::INVENTORY_FILE),
            playbook: root.join(defaults::PLAYBOOK_FILE),
            limit,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "ansible-playbook".to_string(),
            "--inventory".into(),
            self.inventory.display().to_string(),
            self.playbook.display().to_string(),
        ];
        if let Some(limit) = &self.limit {
            args.push("-l".into());
            args.push(limit.clone());
        }
        args
    }
}

/// Variables every playbook run needs on top of the resolved settings.
pub fn playbook_env(private_key: &Path, vault_password_file: &Path) -> EnvMap {
    EnvMap::from([
        (
            defaults::keys::PRIVATE_KEY_FILE.to_string(),
            private_key.display().to_string(),
        ),
        (defaults::keys::HOST_KEY_CHECKING.to_string(), "False".to_string()),
        (
            defaults::keys::VAULT_PASSWORD_FILE.to_string(),
            vault_password_file.display().to_string(),
        ),
    ])
}

/// Run the playbook with `extra_env` merged over `base_env`. No retries.
#[instrument(skip_all, fields(playbook = %target.playbook.display(), limit = target.limit.as_deref()))]
pub fn dispatch<R: ProcessRunner + ?Sized>(
    runner: &R,
    target: &RunTarget,
    base_env: &EnvMap,
    extra_env: &EnvMap,
) -> Result<()> {
    let mut env = base_env.clone();
    env.extend(extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));

    info!("running playbook");
    run_checked(runner, &Invocation::new(target.args()).with_env(&env))
        .with_context(|| format!("run playbook {}", target.playbook.display()))?;
    info!("playbook execution complete");
    Ok(())
}
