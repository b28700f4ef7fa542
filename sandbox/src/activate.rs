//! Orchestration for `sandbox activate`.
//!
//! Activation prepares the project virtualenv and writes the settings file that
//! later `sandbox run` invocations consume. Configuration stays in the settings
//! file; no `ansible.cfg` is written.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::core::settings::SettingsMap;
use crate::defaults::{self, keys};
use crate::exit_codes;
use crate::io::env_file::{load_settings, persist_settings};
use crate::io::interpreter::InterpreterLocator;
use crate::io::process::ProcessRunner;
use crate::io::vault::vault_password_path;
use crate::io::venv::{VenvOutcome, create_venv, existing_venv_python, install_requirements};

/// Inputs for [`activate`].
#[derive(Debug, Clone)]
pub struct ActivateOptions {
    /// Project root (playbook checkout).
    pub root: PathBuf,
    pub env_file: PathBuf,
    /// Never create a virtualenv (used under `UNIT_TESTING`).
    pub skip_venv: bool,
    pub locator: InterpreterLocator,
}

/// Result of `sandbox activate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivateOutcome {
    /// Settings written; `venv_python` is the virtualenv interpreter if one exists.
    Activated { venv_python: Option<PathBuf> },
    /// Settings written, but no supported interpreter was found to build the virtualenv.
    NoInterpreter,
}

impl ActivateOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ActivateOutcome::Activated { .. } => exit_codes::SUCCESS,
            ActivateOutcome::NoInterpreter => exit_codes::NO_INTERPRETER,
        }
    }
}

/// Settings activation always writes for the project at `root`.
pub fn activation_settings(root: &Path) -> SettingsMap {
    let mut settings = SettingsMap::new();
    settings.insert(keys::PLAYBOOK_PATH.to_string(), root.display().to_string());
    for (key, value) in defaults::ANSIBLE_ENV {
        settings.insert(key.to_string(), value.to_string());
    }
    settings.insert(
        keys::VAULT_PASSWORD_FILE.to_string(),
        vault_password_path(root).display().to_string(),
    );
    settings.insert(
        keys::CONTAINER_RUNTIME.to_string(),
        defaults::CONTAINER_RUNTIME.to_string(),
    );
    settings.insert(
        keys::CONTAINER_HOST_PORT.to_string(),
        defaults::CONTAINER_HOST_PORT.to_string(),
    );
    settings.insert(
        keys::CONTAINER_NAME.to_string(),
        defaults::CONTAINER_NAME.to_string(),
    );
    settings
}

/// Ensure the virtualenv exists (installing requirements only when it was just
/// created), then merge the activation settings into the settings file.
///
/// Settings are written even when no interpreter is found, so `run` still has
/// its defaults; the outcome then carries the dedicated exit status.
pub fn activate<R: ProcessRunner + ?Sized>(
    runner: &R,
    options: &ActivateOptions,
) -> Result<ActivateOutcome> {
    info!(root = %options.root.display(), "starting activation");
    let root = options.root.as_path();

    let mut missing_interpreter = false;
    let venv_python = match existing_venv_python(root) {
        Some(python) => {
            info!(python = %python.display(), "reusing existing virtualenv without reinstalling requirements");
            Some(python)
        }
        None if options.skip_venv => {
            info!("UNIT_TESTING set, skipping virtualenv creation");
            None
        }
        None => match create_venv(runner, &options.locator, root)? {
            VenvOutcome::Created(python) => {
                install_requirements(runner, &python, root)?;
                Some(python)
            }
            VenvOutcome::NoInterpreter => {
                error!(
                    "no suitable Python found, install Python 3.10-3.14 to create the virtualenv"
                );
                missing_interpreter = true;
                None
            }
        },
    };

    let mut settings = load_settings(&options.env_file)?;
    for (key, value) in activation_settings(root) {
        if let Some(previous) = settings.get(&key).filter(|p| **p != value) {
            warn!(key = %key, persisted = %previous, value = %value, "activation replaces persisted setting");
        }
        settings.insert(key, value);
    }
    if let Some(python) = &venv_python {
        debug!(python = %python.display(), "recording virtualenv interpreter");
        settings.insert(keys::VENV_PYTHON.to_string(), python.display().to_string());
    }
    persist_settings(&options.env_file, &settings)?;

    if missing_interpreter {
        return Ok(ActivateOutcome::NoInterpreter);
    }
    info!("activation complete");
    Ok(ActivateOutcome::Activated { venv_python })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::process::ProcessOutput;
    use crate::test_support::RecordingRunner;
    use std::fs;

    fn options(root: &Path, skip_venv: bool) -> ActivateOptions {
        ActivateOptions {
            root: root.to_path_buf(),
            env_file: root.join(".env"),
            skip_venv,
            locator: InterpreterLocator::with_patterns(Vec::<String>::new()),
        }
    }

    #[test]
    fn activate_writes_env_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = RecordingRunner::new();

        let outcome = activate(&runner, &options(temp.path(), true)).expect("activate");

        assert_eq!(outcome, ActivateOutcome::Activated { venv_python: None });
        let settings = load_settings(&temp.path().join(".env")).expect("load");
        assert_eq!(settings["PLAYBOOK_PATH"], temp.path().display().to_string());
        assert_eq!(settings["CONTAINER_RUNTIME"], "podman");
        assert_eq!(settings["CONTAINER_HOST_PORT"], "2222");
        assert_eq!(settings["CONTAINER_NAME"], "ansible_target");
        assert!(settings["ANSIBLE_VAULT_PASSWORD_FILE"].ends_with("vault-pw.txt"));
        assert_eq!(settings["ANSIBLE_CALLBACK_RESULT_FORMAT"], "yaml");
        assert!(!settings.contains_key("VENV_PYTHON"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn activate_keeps_unrelated_settings() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(".env"), "MY_VAR=keep\nCONTAINER_NAME=old\n").expect("seed");

        activate(&RecordingRunner::new(), &options(temp.path(), true)).expect("activate");

        let settings = load_settings(&temp.path().join(".env")).expect("load");
        assert_eq!(settings["MY_VAR"], "keep");
        assert_eq!(settings["CONTAINER_NAME"], "ansible_target");
    }

    #[test]
    fn existing_venv_is_reused_without_install() {
        let temp = tempfile::tempdir().expect("tempdir");
        let python = temp.path().join(".venv/bin/python");
        fs::create_dir_all(python.parent().expect("parent")).expect("mkdir");
        fs::write(&python, "").expect("touch");
        let runner = RecordingRunner::new();

        let outcome = activate(&runner, &options(temp.path(), false)).expect("activate");

        assert_eq!(
            outcome,
            ActivateOutcome::Activated {
                venv_python: Some(python.clone())
            }
        );
        assert!(runner.calls().is_empty());
        let settings = load_settings(&temp.path().join(".env")).expect("load");
        assert_eq!(settings["VENV_PYTHON"], python.display().to_string());
    }

    #[test]
    fn creates_venv_and_installs_requirements() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = RecordingRunner::new()
            .with_executable("python3")
            .responding(|inv| {
                if inv.args.get(1).map(String::as_str) == Some("-c") {
                    Ok(ProcessOutput::ok_with_stdout("3.13.0\n"))
                } else {
                    Ok(ProcessOutput::ok_with_stdout(""))
                }
            });
        let mut opts = options(temp.path(), false);
        opts.locator.path_fallback = Some("python3".to_string());

        let outcome = activate(&runner, &opts).expect("activate");

        let python = temp.path().join(".venv/bin/python");
        assert_eq!(
            outcome,
            ActivateOutcome::Activated {
                venv_python: Some(python.clone())
            }
        );
        let py = python.display().to_string();
        assert_eq!(runner.count_prefix(&["/usr/bin/python3", "-m", "venv"]), 1);
        assert_eq!(runner.count_prefix(&[py.as_str(), "-m", "pip", "install"]), 2);
        assert_eq!(runner.count_prefix(&[py.as_str(), "-m", "pip", "uninstall"]), 1);
    }

    #[test]
    fn missing_interpreter_still_writes_settings() {
        let temp = tempfile::tempdir().expect("tempdir");

        let outcome = activate(&RecordingRunner::new(), &options(temp.path(), false)).expect("activate");

        assert_eq!(outcome, ActivateOutcome::NoInterpreter);
        assert_eq!(outcome.exit_code(), exit_codes::NO_INTERPRETER);
        assert!(temp.path().join(".env").exists());
    }
}
