//! Project virtualenv creation and dependency installation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::version::{SUPPORTED_PYTHON, select_interpreter};
use crate::defaults;
use crate::io::interpreter::InterpreterLocator;
use crate::io::process::{Invocation, ProcessRunner, run_checked};

/// `<root>/.venv`.
pub fn venv_dir(root: &Path) -> PathBuf {
    root.join(".venv")
}

/// Interpreter inside the project virtualenv, whether or not it exists yet.
pub fn venv_python(root: &Path) -> PathBuf {
    venv_dir(root).join("bin").join("python")
}

/// The virtualenv interpreter if the virtualenv already exists.
pub fn existing_venv_python(root: &Path) -> Option<PathBuf> {
    let python = venv_python(root);
    python.exists().then_some(python)
}

/// Result of [`create_venv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenvOutcome {
    Created(PathBuf),
    /// No interpreter in [`SUPPORTED_PYTHON`] was found.
    NoInterpreter,
}

/// Create `<root>/.venv` with the best supported interpreter on the host.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn create_venv<R: ProcessRunner + ?Sized>(
    runner: &R,
    locator: &InterpreterLocator,
    root: &Path,
) -> Result<VenvOutcome> {
    info!(range = %SUPPORTED_PYTHON, "no .venv found, locating a suitable interpreter");
    let candidates = locator.locate(runner);
    if candidates.is_empty() {
        warn!("no python3 interpreters found");
        return Ok(VenvOutcome::NoInterpreter);
    }
    let Some(picked) = select_interpreter(&candidates, SUPPORTED_PYTHON) else {
        return Ok(VenvOutcome::NoInterpreter);
    };

    let dir = venv_dir(root);
    info!(interpreter = %picked.display(), "creating virtual environment");
    run_checked(
        runner,
        &Invocation::new([
            picked.display().to_string(),
            "-m".into(),
            "venv".into(),
            dir.display().to_string(),
        ]),
    )
    .with_context(|| format!("create virtualenv with {}", picked.display()))?;

    Ok(VenvOutcome::Created(venv_python(root)))
}

/// Upgrade pip, install `requirements.txt`, then drop `pytest-ansible`, whose
/// plugin clashes with `pytest-testinfra`'s `--ansible-inventory` option.
#[instrument(skip_all, fields(python = %python.display()))]
pub fn install_requirements<R: ProcessRunner + ?Sized>(
    runner: &R,
    python: &Path,
    root: &Path,
) -> Result<()> {
    let py = python.display().to_string();
    debug!("upgrading pip");
    run_checked(
        runner,
        &Invocation::new([py.as_str(), "-m", "pip", "install", "--upgrade", "pip"]),
    )
    .context("upgrade pip")?;

    let requirements = root.join(defaults::REQUIREMENTS_FILE).display().to_string();
    info!(requirements = %requirements, "installing requirements");
    run_checked(
        runner,
        &Invocation::new([py.as_str(), "-m", "pip", "install", "-r", requirements.as_str()]),
    )
    .context("install requirements")?;

    let uninstall = Invocation::new([py.as_str(), "-m", "pip", "uninstall", "-y", "pytest-ansible"]);
    match runner.invoke(&uninstall) {
        Ok(out) if out.success() => debug!("uninstalled pytest-ansible"),
        Ok(out) => debug!(exit_code = ?out.code, "pytest-ansible uninstall failed"),
        Err(err) => debug!(err = %err, "pytest-ansible uninstall could not run"),
    }
    info!("requirements installation complete");
    Ok(())
}
