//! Diagnostic logging for the sandbox CLI.
//!
//! Verbosity follows the `-v` count, `RUST_LOG` wins when set. Output always goes
//! to stderr; `--log-file` adds a plain-text copy.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Map a `-v` count to a filter directive (0-1 error, 2 warn, 3 info, 4+ debug).
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 | 1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    }
}

/// Initialize the global tracing subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=sandbox=debug sandbox run --skip-container
/// ```
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)));

    let file_layer = match log_file {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_caps_at_debug() {
        assert_eq!(level_for_verbosity(0), "error");
        assert_eq!(level_for_verbosity(2), "warn");
        assert_eq!(level_for_verbosity(3), "info");
        assert_eq!(level_for_verbosity(9), "debug");
    }
}
