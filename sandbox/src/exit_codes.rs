//! Stable exit codes for sandbox CLI commands.

/// Command completed.
pub const SUCCESS: i32 = 0;
/// Unexpected failure caught at the process boundary (including failed external commands).
pub const UNHANDLED: i32 = 1;
/// `ansible` was not found on the run environment's `PATH`.
pub const MISSING_DEPENDENCY: i32 = 2;
/// No interpreter in the supported version range was found.
pub const NO_INTERPRETER: i32 = 3;
/// No container engine was found, or the configured host port is invalid.
pub const NO_RUNTIME: i32 = 4;
