//! `sandbox` command line entry point.
//!
//! `activate` prepares the virtualenv and settings file; `run` provisions the
//! throwaway target container and runs the sample playbook against it.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, error};

use sandbox::activate::{ActivateOptions, activate};
use sandbox::defaults;
use sandbox::exit_codes;
use sandbox::io::interpreter::InterpreterLocator;
use sandbox::io::process::{EnvMap, SystemRunner};
use sandbox::io::runtime::Engine;
use sandbox::logging;
use sandbox::run::{RunOptions, run};

#[derive(Debug, Parser)]
#[command(
    name = "sandbox",
    version,
    about = "Ephemeral container sandbox for Ansible playbook development"
)]
struct Cli {
    /// Settings file read and written by the subcommands.
    #[arg(long, global = true, default_value = defaults::ENV_FILE)]
    env_file: PathBuf,

    /// Increase diagnostic output (-vv warn, -vvv info, -vvvv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write diagnostics to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the project virtualenv and write the settings file.
    Activate {
        #[arg(long, hide = true)]
        playbook_path: Option<PathBuf>,
    },
    /// Start the target container and run the sample playbook against it.
    Run {
        /// Preferred container engine.
        #[arg(long, value_enum)]
        container_runtime: Option<Engine>,
        #[arg(long)]
        container_name: Option<String>,
        /// Host port forwarded to the container's SSH port.
        #[arg(long)]
        container_host_port: Option<String>,
        /// Run against localhost without starting a container.
        #[arg(long)]
        skip_container: bool,
        /// Host pattern passed to `ansible-playbook -l`.
        #[arg(long)]
        limit: Option<String>,
        #[arg(long, hide = true)]
        playbook_path: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::UNHANDLED);
    }

    let code = match panic::catch_unwind(AssertUnwindSafe(|| execute(cli))) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            error!("{err:#}");
            exit_codes::UNHANDLED
        }
        Err(_) => {
            error!("sandbox aborted by an unexpected panic");
            exit_codes::UNHANDLED
        }
    };
    std::process::exit(code);
}

fn execute(cli: Cli) -> Result<i32> {
    let base_env: EnvMap = std::env::vars().collect();
    debug!(env_file = %cli.env_file.display(), "using settings file");
    match cli.command {
        Command::Activate { playbook_path } => {
            let options = ActivateOptions {
                root: project_root(playbook_path.as_deref())?,
                env_file: cli.env_file,
                skip_venv: base_env.get("UNIT_TESTING").is_some_and(|v| !v.is_empty()),
                locator: InterpreterLocator::default(),
            };
            Ok(activate(&SystemRunner, &options)?.exit_code())
        }
        Command::Run {
            container_runtime,
            container_name,
            container_host_port,
            skip_container,
            limit,
            playbook_path,
        } => {
            let options = RunOptions {
                root: project_root(playbook_path.as_deref())?,
                env_file: cli.env_file,
                container_runtime,
                container_name,
                container_host_port,
                skip_container,
                limit,
                base_env,
            };
            Ok(run(&SystemRunner, &options)?.exit_code())
        }
    }
}

/// Absolute project root: `--playbook-path` or the current directory.
fn project_root(playbook_path: Option<&Path>) -> Result<PathBuf> {
    let root = match playbook_path {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("read current directory")?,
    };
    match root.canonicalize() {
        Ok(root) => Ok(root),
        Err(err) => {
            debug!(err = %err, root = %root.display(), "cannot canonicalize project root");
            std::path::absolute(&root).with_context(|| format!("resolve {}", root.display()))
        }
    }
}
