//! Container lifecycle: build, replace any stale instance, run, and always stop.
//!
//! [`ensure_running`] hands back a [`RunningContainer`] guard. Dropping the guard
//! stops the container, so teardown happens on success, on `?` early returns and
//! on panic unwinds alike.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::defaults;
use crate::io::credentials::ssh_dir;
use crate::io::process::{EnvMap, Invocation, ProcessRunner, run_checked};
use crate::io::runtime::Engine;

/// Lifecycle states of the sandbox container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Building,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Absent => "absent",
            ContainerState::Building => "building",
            ContainerState::Running => "running",
            ContainerState::Stopping => "stopping",
            ContainerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Identity of the sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub engine: Engine,
    pub name: String,
    pub host_port: u16,
    pub image: String,
}

/// Everything needed to bring the sandbox container up.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub handle: ContainerHandle,
    /// Volume suffix for the key mount (see [`Engine::mount_option`]).
    pub mount_option: String,
    /// Project root holding the containerfile and the key directory.
    pub root_dir: PathBuf,
    pub container_port: u16,
    /// Environment for engine commands. `None` inherits ours.
    pub env: Option<EnvMap>,
}

impl ContainerSpec {
    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![self.handle.engine.as_str().to_string()];
        argv.extend(args.into_iter().map(Into::into));
        let inv = Invocation::new(argv);
        match &self.env {
            Some(env) => inv.with_env(env),
            None => inv,
        }
    }

    fn build_args(&self) -> Vec<String> {
        vec![
            "build".to_string(),
            "--file".into(),
            defaults::CONTAINERFILE.into(),
            "--tag".into(),
            self.handle.image.clone(),
            self.root_dir.display().to_string(),
        ]
    }

    fn run_args(&self) -> Vec<String> {
        let name = &self.handle.name;
        vec![
            "run".to_string(),
            "--detach".into(),
            "--hostname".into(),
            name.clone(),
            "--name".into(),
            name.clone(),
            "--publish".into(),
            format!("{}:{}", self.handle.host_port, self.container_port),
            "--rm".into(),
            "--volume".into(),
            format!(
                "{}:{}{}",
                ssh_dir(&self.root_dir).display(),
                defaults::CONTAINER_SSH_MOUNT,
                self.mount_option
            ),
            self.handle.image.clone(),
        ]
    }
}

/// A started container that is stopped exactly once, at the latest when dropped.
#[must_use = "dropping the guard stops the container immediately"]
pub struct RunningContainer<'r, R: ProcessRunner + ?Sized> {
    runner: &'r R,
    handle: ContainerHandle,
    env: Option<EnvMap>,
    state: ContainerState,
}

impl<'r, R: ProcessRunner + ?Sized> RunningContainer<'r, R> {
    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Stop now instead of at drop. Best effort; never fails.
    pub fn stop(mut self) -> ContainerState {
        self.teardown();
        self.state
    }

    fn teardown(&mut self) {
        if self.state != ContainerState::Running {
            return;
        }
        self.state = ContainerState::Stopping;
        info!(container = %self.handle.name, "cleaning up container");
        stop_container(self.runner, self.handle.engine, &self.handle.name, self.env.as_ref());
        self.state = ContainerState::Stopped;
    }
}

impl<R: ProcessRunner + ?Sized> Drop for RunningContainer<'_, R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Build the image, stop any container already using the name, then start a
/// fresh detached container publishing SSH on the host port.
///
/// Build and run failures propagate. A failed pre-start stop is expected when
/// nothing was running and is only logged; it cannot be told apart from an
/// unreachable engine here, in which case the following `run` reports the error.
#[instrument(skip_all, fields(engine = %spec.handle.engine, container = %spec.handle.name))]
pub fn ensure_running<'r, R: ProcessRunner + ?Sized>(
    runner: &'r R,
    spec: &ContainerSpec,
) -> Result<RunningContainer<'r, R>> {
    let handle = &spec.handle;
    debug!(state = %ContainerState::Building, image = %handle.image, "building container image");
    run_checked(runner, &spec.invocation(spec.build_args()))
        .with_context(|| format!("build image {}", handle.image))?;

    let stale = spec.invocation(["container", "stop", handle.name.as_str()]);
    match runner.invoke(&stale) {
        Ok(out) if out.success() => debug!("stopped stale container"),
        Ok(out) => debug!(exit_code = ?out.code, "no running container to stop before start"),
        Err(err) => debug!(err = %err, "stop before start could not run"),
    }

    info!(host_port = handle.host_port, "starting container");
    run_checked(runner, &spec.invocation(spec.run_args()))
        .with_context(|| format!("start container {}", handle.name))?;
    info!(state = %ContainerState::Running, "container started");

    Ok(RunningContainer {
        runner,
        handle: handle.clone(),
        env: spec.env.clone(),
        state: ContainerState::Running,
    })
}

/// Stop `name`. Failures are logged and swallowed; this runs from cleanup paths.
pub fn stop_container<R: ProcessRunner + ?Sized>(
    runner: &R,
    engine: Engine,
    name: &str,
    env: Option<&EnvMap>,
) {
    let mut inv = Invocation::new([engine.as_str(), "container", "stop", name]);
    if let Some(env) = env {
        inv = inv.with_env(env);
    }
    match run_checked(runner, &inv) {
        Ok(_) => debug!(container = name, "container stopped"),
        Err(err) => warn!(container = name, err = %format!("{err:#}"), "failed to stop container during cleanup"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::process::ProcessOutput;
    use crate::test_support::RecordingRunner;
    use std::path::Path;

    fn spec(root: &Path) -> ContainerSpec {
        ContainerSpec {
            handle: ContainerHandle {
                engine: Engine::Podman,
                name: "ansible_target".to_string(),
                host_port: 2222,
                image: "ansible_target:latest".to_string(),
            },
            mount_option: ":ro,z".to_string(),
            root_dir: root.to_path_buf(),
            container_port: 22,
            env: None,
        }
    }

    #[test]
    fn ensure_running_builds_replaces_and_runs() {
        let runner = RecordingRunner::new();
        let root = Path::new("/work/playbook");

        let container = ensure_running(&runner, &spec(root)).expect("start");
        assert_eq!(container.state(), ContainerState::Running);
        assert_eq!(container.stop(), ContainerState::Stopped);

        let commands = runner.commands();
        assert_eq!(
            commands[0],
            [
                "podman",
                "build",
                "--file",
                "containerfile",
                "--tag",
                "ansible_target:latest",
                "/work/playbook"
            ]
        );
        assert_eq!(commands[1], ["podman", "container", "stop", "ansible_target"]);
        assert_eq!(
            commands[2],
            [
                "podman",
                "run",
                "--detach",
                "--hostname",
                "ansible_target",
                "--name",
                "ansible_target",
                "--publish",
                "2222:22",
                "--rm",
                "--volume",
                "/work/playbook/ssh_keys:/root/.ssh:ro,z",
                "ansible_target:latest"
            ]
        );
        assert_eq!(commands[3], ["podman", "container", "stop", "ansible_target"]);
        assert_eq!(commands.len(), 4);
    }

    #[test]
    fn failed_stale_stop_is_swallowed() {
        let runner = RecordingRunner::new().responding(|inv| {
            if inv.args[1] == "container" {
                Ok(ProcessOutput::failed(125, "no such container"))
            } else {
                Ok(ProcessOutput::ok_with_stdout(""))
            }
        });
        let container = ensure_running(&runner, &spec(Path::new("/p"))).expect("start");
        // Cleanup stop fails too; still reported as stopped and never an error.
        assert_eq!(container.stop(), ContainerState::Stopped);
        assert_eq!(runner.count_prefix(&["podman", "run"]), 1);
    }

    #[test]
    fn build_failure_propagates_without_starting() {
        let runner = RecordingRunner::new().responding(|inv| {
            if inv.args[1] == "build" {
                Ok(ProcessOutput::failed(1, "bad containerfile"))
            } else {
                Ok(ProcessOutput::ok_with_stdout(""))
            }
        });
        let err = ensure_running(&runner, &spec(Path::new("/p")))
            .err()
            .expect("build should fail");
        assert!(format!("{err:#}").contains("bad containerfile"));
        assert_eq!(runner.commands().len(), 1);
    }

    #[test]
    fn drop_stops_exactly_once() {
        let runner = RecordingRunner::new();
        {
            let _container = ensure_running(&runner, &spec(Path::new("/p"))).expect("start");
        }
        // One stale stop before start, one cleanup stop on drop.
        assert_eq!(runner.count_prefix(&["podman", "container", "stop"]), 2);
    }

    #[test]
    fn explicit_stop_does_not_repeat_on_drop() {
        let runner = RecordingRunner::new();
        let container = ensure_running(&runner, &spec(Path::new("/p"))).expect("start");
        container.stop();
        assert_eq!(runner.count_prefix(&["podman", "container", "stop"]), 2);
    }
}
