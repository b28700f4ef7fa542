//! The process-invocation boundary.
//!
//! Every component that shells out depends on [`ProcessRunner`] instead of
//! [`std::process::Command`], so tests can substitute a recording stub without
//! patching globals. [`SystemRunner`] is the production implementation.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Complete environment handed to a child process.
pub type EnvMap = BTreeMap<String, String>;

/// A single external command request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program followed by its arguments.
    pub args: Vec<String>,
    /// Capture stdout/stderr instead of streaming them to the terminal.
    pub capture: bool,
    /// Replace the child's environment with this map. `None` inherits ours.
    pub env: Option<EnvMap>,
    /// Kill the child after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            capture: false,
            env: None,
            timeout: None,
        }
    }

    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn with_env(mut self, env: &EnvMap) -> Self {
        self.env = Some(env.clone());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        self.args
            .iter()
            .map(|arg| {
                if arg.is_empty() || arg.contains(char::is_whitespace) {
                    format!("{arg:?}")
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished (or killed) child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    /// Captured stdout (empty unless the invocation captured output).
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out
    }

    /// A successful exit with the given stdout.
    pub fn ok_with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed exit with the given code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    fn from_status(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>, timed_out: bool) -> Self {
        Self {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            timed_out,
        }
    }
}

/// Capability to run external commands and look up executables.
pub trait ProcessRunner {
    /// Run the command to completion. Errors only when it cannot be run at all
    /// (e.g. the program is missing); a non-zero exit is reported in the output.
    fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput>;

    /// Locate `name` on `search_path` (a `PATH`-style list), or on our own `PATH`.
    fn find_executable(&self, name: &str, search_path: Option<&str>) -> Option<PathBuf>;
}

/// Run `invocation` and turn a non-zero exit or timeout into an error.
pub fn run_checked<R: ProcessRunner + ?Sized>(
    runner: &R,
    invocation: &Invocation,
) -> Result<ProcessOutput> {
    let output = runner
        .invoke(invocation)
        .with_context(|| format!("run {}", invocation.display()))?;
    if output.timed_out {
        bail!("{} timed out", invocation.display());
    }
    if !output.success() {
        let stderr = output.stderr.trim();
        if stderr.is_empty() {
            bail!("{} failed with status {:?}", invocation.display(), output.code);
        }
        bail!(
            "{} failed with status {:?}: {stderr}",
            invocation.display(),
            output.code
        );
    }
    Ok(output)
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    #[instrument(skip_all, fields(program = invocation.program(), capture = invocation.capture))]
    fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let (program, rest) = invocation
            .args
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;
        let mut cmd = Command::new(program);
        cmd.args(rest);
        if let Some(env) = &invocation.env {
            cmd.env_clear().envs(env);
        }

        debug!(command = %invocation.display(), "running command");
        let output = if invocation.capture {
            run_captured(cmd, invocation.timeout)?
        } else {
            run_inherited(cmd, invocation.timeout)?
        };
        debug!(exit_code = ?output.code, timed_out = output.timed_out, "command finished");
        Ok(output)
    }

    fn find_executable(&self, name: &str, search_path: Option<&str>) -> Option<PathBuf> {
        match search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(name, Some(paths), cwd).ok()
            }
            None => which::which(name).ok(),
        }
    }
}

fn spawn(cmd: &mut Command) -> Result<Child> {
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            Err(e).context("spawn command")
        }
    }
}

/// Wait for the child, killing it once `timeout` elapses.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait().context("wait for command")?, false));
    };
    match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            child.kill().context("kill command")?;
            Ok((child.wait().context("wait command after kill")?, true))
        }
    }
}

fn run_inherited(mut cmd: Command, timeout: Option<Duration>) -> Result<ProcessOutput> {
    let mut child = spawn(&mut cmd)?;
    let (status, timed_out) = wait(&mut child, timeout)?;
    Ok(ProcessOutput::from_status(status, Vec::new(), Vec::new(), timed_out))
}

/// Capture stdout/stderr on reader threads so a chatty child cannot deadlock on a full pipe.
fn run_captured(mut cmd: Command, timeout: Option<Duration>) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(&mut cmd)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let (status, timed_out) = wait(&mut child, timeout)?;

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;
    Ok(ProcessOutput::from_status(status, stdout, stderr, timed_out))
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_empty_and_spaced_args() {
        let inv = Invocation::new(["ssh-keygen", "-N", "", "-C", "two words"]);
        assert_eq!(inv.display(), r#"ssh-keygen -N "" -C "two words""#);
        assert_eq!(inv.program(), "ssh-keygen");
    }

    #[test]
    fn run_checked_reports_status_and_stderr() {
        struct Failing;
        impl ProcessRunner for Failing {
            fn invoke(&self, _invocation: &Invocation) -> Result<ProcessOutput> {
                Ok(ProcessOutput::failed(125, "no such image\n"))
            }
            fn find_executable(&self, _name: &str, _search_path: Option<&str>) -> Option<PathBuf> {
                None
            }
        }

        let err = run_checked(&Failing, &Invocation::new(["podman", "run"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("podman run failed"), "{msg}");
        assert!(msg.contains("no such image"), "{msg}");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_stdout_and_exit_code() {
        let out = SystemRunner
            .invoke(&Invocation::new(["sh", "-c", "echo hello; exit 3"]).captured())
            .expect("invoke sh");
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_replaces_environment() {
        let mut env = EnvMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env.insert("SANDBOX_PROBE".to_string(), "visible".to_string());
        let out = SystemRunner
            .invoke(
                &Invocation::new(["sh", "-c", "printf %s \"$SANDBOX_PROBE\""])
                    .captured()
                    .with_env(&env),
            )
            .expect("invoke sh");
        assert_eq!(out.stdout, "visible");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_kills_on_timeout() {
        let out = SystemRunner
            .invoke(
                &Invocation::new(["sleep", "5"])
                    .captured()
                    .with_timeout(Duration::from_millis(100)),
            )
            .expect("invoke sleep");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = SystemRunner
            .invoke(&Invocation::new(["definitely-not-a-real-program-xyz"]).captured())
            .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
