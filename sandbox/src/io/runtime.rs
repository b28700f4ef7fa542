//! Container engine detection.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use tracing::{debug, info, warn};

use crate::io::process::ProcessRunner;

/// Supported container engines, in default preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    Podman,
    Docker,
}

impl Engine {
    pub const PREFERENCE: [Engine; 2] = [Engine::Podman, Engine::Docker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Podman => "podman",
            Engine::Docker => "docker",
        }
    }

    /// Volume suffix for the read-only key mount. Podman also relabels for SELinux.
    pub fn mount_option(&self) -> &'static str {
        match self {
            Engine::Podman => ":ro,z",
            Engine::Docker => ":ro",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "podman" => Ok(Engine::Podman),
            "docker" => Ok(Engine::Docker),
            other => Err(anyhow!("unknown container runtime '{other}'")),
        }
    }
}

/// An engine found on the host and its key-mount option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedRuntime {
    pub engine: Engine,
    pub mount_option: &'static str,
}

/// Search order: `preferred` first, then [`Engine::PREFERENCE`] without duplicates.
pub fn search_order(preferred: Option<Engine>) -> Vec<Engine> {
    let mut order: Vec<Engine> = preferred.into_iter().collect();
    for engine in Engine::PREFERENCE {
        if !order.contains(&engine) {
            order.push(engine);
        }
    }
    order
}

/// Return the first engine in [`search_order`] found on `search_path`
/// (a `PATH`-style list; `None` searches our own `PATH`).
pub fn detect_runtime<R: ProcessRunner + ?Sized>(
    runner: &R,
    preferred: Option<Engine>,
    search_path: Option<&str>,
) -> Option<DetectedRuntime> {
    let order = search_order(preferred);
    debug!(order = ?order, "container runtime search order");
    for engine in order {
        if let Some(path) = runner.find_executable(engine.as_str(), search_path) {
            info!(engine = %engine, path = %path.display(), "found container runtime");
            return Some(DetectedRuntime {
                engine,
                mount_option: engine.mount_option(),
            });
        }
        debug!(engine = %engine, "container runtime not found");
    }
    warn!("no container runtime found");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingRunner;

    #[test]
    fn prefers_podman_when_both_present() {
        let runner = RecordingRunner::new()
            .with_executable("podman")
            .with_executable("docker");
        let detected = detect_runtime(&runner, None, None).expect("runtime");
        assert_eq!(detected.engine.as_str(), "podman");
        assert_eq!(detected.mount_option, ":ro,z");
    }

    #[test]
    fn preferred_engine_is_tried_first() {
        let runner = RecordingRunner::new()
            .with_executable("podman")
            .with_executable("docker");
        let detected = detect_runtime(&runner, Some(Engine::Docker), None).expect("runtime");
        assert_eq!(detected.engine, Engine::Docker);
        assert_eq!(detected.mount_option, ":ro");
    }

    #[test]
    fn falls_back_when_preferred_missing() {
        let runner = RecordingRunner::new().with_executable("docker");
        let detected = detect_runtime(&runner, Some(Engine::Podman), None).expect("runtime");
        assert_eq!(detected.engine, Engine::Docker);
        let looked_up: Vec<String> = runner.lookups().into_iter().map(|(n, _)| n).collect();
        assert_eq!(looked_up, vec!["podman", "docker"]);
    }

    #[test]
    fn lookups_use_given_search_path() {
        let runner = RecordingRunner::new().with_executable("podman");
        detect_runtime(&runner, None, Some("/venv/bin:/opt/bin")).expect("runtime");
        assert_eq!(
            runner.lookups(),
            vec![("podman".to_string(), Some("/venv/bin:/opt/bin".to_string()))]
        );
    }

    #[test]
    fn none_when_no_engine_installed() {
        assert_eq!(detect_runtime(&RecordingRunner::new(), None, None), None);
    }

    #[test]
    fn search_order_has_no_duplicates() {
        assert_eq!(search_order(Some(Engine::Docker)), vec![Engine::Docker, Engine::Podman]);
        assert_eq!(search_order(None), vec![Engine::Podman, Engine::Docker]);
    }

    #[test]
    fn parses_engine_names() {
        assert_eq!("docker".parse::<Engine>().expect("parse"), Engine::Docker);
        assert!("nerdctl".parse::<Engine>().is_err());
    }
}
