//! Orchestration for `sandbox run`.
//!
//! The workflow moves through [`RunPhase`]s in order:
//! `Resolving → RuntimeDetected → CredentialsReady → ContainerUp → Dispatching →
//! CleaningUp → Done`. `ContainerUp` (and its `CleaningUp`) only happen when the
//! container is not skipped. Discovery failures end the run with a dedicated
//! [`RunOutcome`]; external command failures propagate as errors. Once the
//! container is up it is stopped before this module returns, whatever happened.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::core::settings::{ResolvedSetting, SettingConflict, SettingsMap, overlay, resolve_setting};
use crate::defaults::{self, keys};
use crate::exit_codes;
use crate::io::container::{ContainerHandle, ContainerSpec, ensure_running};
use crate::io::credentials::provision_keys;
use crate::io::dispatch::{RunTarget, dispatch, playbook_env};
use crate::io::env_file::load_settings;
use crate::io::galaxy::{ensure_collections, ensure_roles};
use crate::io::process::{EnvMap, ProcessRunner};
use crate::io::runtime::{Engine, detect_runtime};
use crate::io::vault::ensure_vault_file;

/// Inputs for [`run`], mostly straight from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub root: PathBuf,
    pub env_file: PathBuf,
    pub container_runtime: Option<Engine>,
    pub container_name: Option<String>,
    /// Kept as text so an invalid value can be reported with its own exit status.
    pub container_host_port: Option<String>,
    pub skip_container: bool,
    pub limit: Option<String>,
    /// Environment the run starts from (normally our own process environment).
    pub base_env: EnvMap,
}

/// Workflow states, recorded in [`RunReport::phases`] as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Resolving,
    RuntimeDetected,
    CredentialsReady,
    ContainerUp,
    Dispatching,
    CleaningUp,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Resolving => "resolving",
            RunPhase::RuntimeDetected => "runtime-detected",
            RunPhase::CredentialsReady => "credentials-ready",
            RunPhase::ContainerUp => "container-up",
            RunPhase::Dispatching => "dispatching",
            RunPhase::CleaningUp => "cleaning-up",
            RunPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Effective container settings after applying CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    pub runtime: ResolvedSetting,
    pub name: ResolvedSetting,
    pub host_port: ResolvedSetting,
}

impl ContainerSettings {
    pub fn conflicts(&self) -> Vec<SettingConflict> {
        [&self.runtime, &self.name, &self.host_port]
            .into_iter()
            .filter_map(|s| s.conflict.clone())
            .collect()
    }
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub phases: Vec<RunPhase>,
    pub engine: Engine,
    /// The container that was started and stopped, if any.
    pub container: Option<ContainerHandle>,
    pub target: RunTarget,
    /// Persisted settings replaced by CLI overrides.
    pub conflicts: Vec<SettingConflict>,
}

/// Result of `sandbox run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    InvalidPort(String),
    NoRuntime,
    MissingAnsible,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(_) => exit_codes::SUCCESS,
            RunOutcome::InvalidPort(_) | RunOutcome::NoRuntime => exit_codes::NO_RUNTIME,
            RunOutcome::MissingAnsible => exit_codes::MISSING_DEPENDENCY,
        }
    }
}

/// Resolve runtime, container name and host port: CLI, then persisted, then default.
///
/// Every CLI value that replaces a different persisted value is logged as a
/// warning before it is used.
pub fn resolve_container_settings(options: &RunOptions, persisted: &SettingsMap) -> ContainerSettings {
    let runtime_cli = options.container_runtime.map(|e| e.as_str());
    let default_port = defaults::CONTAINER_HOST_PORT.to_string();
    let settings = ContainerSettings {
        runtime: resolve_setting(
            keys::CONTAINER_RUNTIME,
            runtime_cli,
            persisted,
            defaults::CONTAINER_RUNTIME,
        ),
        name: resolve_setting(
            keys::CONTAINER_NAME,
            options.container_name.as_deref(),
            persisted,
            defaults::CONTAINER_NAME,
        ),
        host_port: resolve_setting(
            keys::CONTAINER_HOST_PORT,
            options.container_host_port.as_deref(),
            persisted,
            &default_port,
        ),
    };
    for conflict in settings.conflicts() {
        warn!(
            key = %conflict.key,
            persisted = %conflict.persisted,
            cli = %conflict.overridden_by,
            "overriding {} from settings file ({}) with CLI value ({})",
            conflict.key,
            conflict.persisted,
            conflict.overridden_by
        );
    }
    settings
}

/// Environment for every command of the run: `base` overlaid with the
/// persisted settings, with the virtualenv `bin` directory (from `VENV_PYTHON`)
/// put first on `PATH` so its `ansible` tools are found.
pub fn run_environment(base: &EnvMap, settings: &SettingsMap) -> Result<EnvMap> {
    let mut env = overlay(base, settings);
    let venv_bin = settings
        .get(keys::VENV_PYTHON)
        .and_then(|python| Path::new(python).parent().map(Path::to_path_buf));
    if let Some(bin) = venv_bin {
        let mut dirs = vec![bin];
        if let Some(path) = env.get("PATH") {
            dirs.extend(std::env::split_paths(path));
        }
        let joined = std::env::join_paths(dirs).context("build PATH with virtualenv")?;
        debug!(path = %joined.to_string_lossy(), "virtualenv prepended to PATH");
        env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
    }
    info!(count = settings.len(), "applied settings to run environment");
    Ok(env)
}

/// Run the full provisioning and playbook workflow.
pub fn run<R: ProcessRunner + ?Sized>(runner: &R, options: &RunOptions) -> Result<RunOutcome> {
    info!(root = %options.root.display(), "starting playbook run workflow");
    let mut phases = vec![RunPhase::Resolving];

    let persisted = load_settings(&options.env_file)?;
    let env = run_environment(&options.base_env, &persisted)?;
    let settings = resolve_container_settings(options, &persisted);

    let host_port: u16 = match settings.host_port.value.parse() {
        Ok(port) => port,
        Err(_) => {
            error!(value = %settings.host_port.value, "invalid CONTAINER_HOST_PORT value");
            return Ok(RunOutcome::InvalidPort(settings.host_port.value.clone()));
        }
    };
    let preferred = match settings.runtime.value.parse::<Engine>() {
        Ok(engine) => Some(engine),
        Err(err) => {
            warn!(err = %err, "ignoring container runtime preference");
            None
        }
    };

    let search_path = env.get("PATH").map(String::as_str);
    let Some(runtime) = detect_runtime(runner, preferred, search_path) else {
        error!("neither podman nor docker found, cannot continue");
        return Ok(RunOutcome::NoRuntime);
    };
    phases.push(RunPhase::RuntimeDetected);
    info!(engine = %runtime.engine, "using container runtime");

    if runner.find_executable("ansible", search_path).is_none() {
        error!("'ansible' was not found in PATH");
        return Ok(RunOutcome::MissingAnsible);
    }
    info!("'ansible' found in PATH");

    let key_material = provision_keys(runner, &options.root, defaults::KEY_BASENAME)?;
    let vault = ensure_vault_file(&options.root)?;
    phases.push(RunPhase::CredentialsReady);

    let handle = ContainerHandle {
        engine: runtime.engine,
        name: settings.name.value.clone(),
        host_port,
        image: defaults::CONTAINER_IMAGE.to_string(),
    };
    let container = if options.skip_container {
        info!("skipping container setup as requested");
        None
    } else {
        let spec = ContainerSpec {
            handle: handle.clone(),
            mount_option: runtime.mount_option.to_string(),
            root_dir: options.root.clone(),
            container_port: defaults::CONTAINER_SSH_PORT,
            env: Some(env.clone()),
        };
        let running = ensure_running(runner, &spec)?;
        phases.push(RunPhase::ContainerUp);
        Some(running)
    };

    let target = RunTarget::in_project(&options.root, effective_limit(options));
    let extra_env = playbook_env(&key_material.private_key, &vault);
    let dispatched = ensure_dependencies(runner, &options.root, &env).and_then(|()| {
        phases.push(RunPhase::Dispatching);
        dispatch(runner, &target, &env, &extra_env)
    });

    if let Some(running) = container {
        phases.push(RunPhase::CleaningUp);
        running.stop();
    }
    dispatched?;
    phases.push(RunPhase::Done);
    info!("run workflow complete");

    Ok(RunOutcome::Completed(RunReport {
        phases,
        engine: runtime.engine,
        container: (!options.skip_container).then_some(handle),
        target,
        conflicts: settings.conflicts(),
    }))
}

/// Limit passed to `ansible-playbook`. An empty `--limit` counts as absent;
/// without a container the play is limited to `localhost`.
fn effective_limit(options: &RunOptions) -> Option<String> {
    match (options.limit.as_deref().filter(|l| !l.is_empty()), options.skip_container) {
        (Some(limit), _) => {
            info!(limit = %limit, "using custom limit");
            Some(limit.to_string())
        }
        (None, true) => {
            info!("container skipped, defaulting limit to {}", defaults::LOCAL_LIMIT);
            Some(defaults::LOCAL_LIMIT.to_string())
        }
        (None, false) => None,
    }
}

fn ensure_dependencies<R: ProcessRunner + ?Sized>(
    runner: &R,
    root: &Path,
    env: &EnvMap,
) -> Result<()> {
    ensure_roles(runner, root, env)?;
    ensure_collections(runner, env)?;
    Ok(())
}
