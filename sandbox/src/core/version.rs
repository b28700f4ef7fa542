//! Interpreter versions and range-based selection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\.(\d+)\.(\d+)\s*$").expect("version regex is valid")
});

/// `major.minor.patch`, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse probe output of the form `3.12.1`. Anything else yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(text)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Half-open version range `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Version,
    pub max: Version,
}

/// Interpreters supported for the sandbox virtualenv.
pub const SUPPORTED_PYTHON: VersionRange = VersionRange {
    min: Version::new(3, 10, 0),
    max: Version::new(3, 15, 0),
};

impl VersionRange {
    pub fn contains(&self, version: Version) -> bool {
        version >= self.min && version < self.max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">={}, <{}", self.min, self.max)
    }
}

/// A discovered interpreter binary and the version it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterCandidate {
    pub path: PathBuf,
    pub version: Version,
}

impl InterpreterCandidate {
    pub fn new(path: impl Into<PathBuf>, version: Version) -> Self {
        Self {
            path: path.into(),
            version,
        }
    }
}

/// Pick the highest in-range candidate. Equal versions keep the first seen.
pub fn select_interpreter<'a>(
    candidates: impl IntoIterator<Item = &'a InterpreterCandidate>,
    range: VersionRange,
) -> Option<&'a Path> {
    let mut best: Option<&InterpreterCandidate> = None;
    for candidate in candidates {
        if !range.contains(candidate.version) {
            debug!(
                path = %candidate.path.display(),
                version = %candidate.version,
                range = %range,
                "skipping interpreter outside range"
            );
            continue;
        }
        if best.is_none_or(|b| candidate.version > b.version) {
            debug!(path = %candidate.path.display(), version = %candidate.version, "new best interpreter");
            best = Some(candidate);
        }
    }
    match best {
        Some(picked) => {
            info!(path = %picked.path.display(), version = %picked.version, "selected interpreter");
            Some(picked.path.as_path())
        }
        None => {
            warn!(range = %range, "no suitable interpreter among candidates");
            None
        }
    }
}
