//! Ephemeral Ansible sandbox runner.
//!
//! Provisions a disposable SSH-reachable container as a playbook target and
//! resolves everything a run needs (interpreter, settings, keys, container
//! engine) without any persistent `ansible.cfg`. The crate is split the same
//! way as its commands:
//!
//! - **[`core`]**: Pure logic (version selection, settings precedence). No I/O.
//! - **[`io`]**: Side-effecting adapters (settings file, subprocesses, keys,
//!   container engine, `ansible-playbook`). Every external command goes through
//!   [`io::process::ProcessRunner`] so tests can substitute a recording stub.
//!
//! Orchestration modules ([`activate`], [`run`]) sequence core logic with I/O to
//! implement the CLI subcommands.

pub mod activate;
pub mod core;
pub mod defaults;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
