//! I/O adapters for sandbox commands.

pub mod container;
pub mod credentials;
pub mod dispatch;
pub mod env_file;
pub mod galaxy;
pub mod interpreter;
pub mod process;
pub mod runtime;
pub mod vault;
pub mod venv;
