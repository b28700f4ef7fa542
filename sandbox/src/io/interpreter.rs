//! Interpreter discovery: glob search plus a `PATH` fallback, each hit probed for its version.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, instrument};

use crate::core::version::{InterpreterCandidate, Version};
use crate::io::process::{Invocation, ProcessRunner};

/// Prints `major.minor.micro` of the interpreter running it.
const PROBE_SCRIPT: &str = "import sys; v=sys.version_info; print(f'{v.major}.{v.minor}.{v.micro}')";

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// User-local managed installs, then standard system locations.
pub const SYSTEM_PATTERNS: [&str; 4] = [
    "~/.local/share/uv/python/*/bin/python3*",
    "/usr/bin/python3*",
    "/usr/local/bin/python3*",
    "/opt/*/bin/python3*",
];

/// Where and how to look for interpreters.
#[derive(Debug, Clone)]
pub struct InterpreterLocator {
    /// Glob patterns searched in order. `*` and `?` match within one path segment.
    pub patterns: Vec<String>,
    /// Only files whose name starts with this are probed.
    pub name_prefix: String,
    /// Program looked up on `PATH` after the patterns.
    pub path_fallback: Option<String>,
    pub probe_timeout: Duration,
}

impl Default for InterpreterLocator {
    /// Active virtualenv first (when `VIRTUAL_ENV` is set), then [`SYSTEM_PATTERNS`].
    fn default() -> Self {
        let mut patterns = Vec::new();
        if let Some(venv) = std::env::var_os("VIRTUAL_ENV") {
            let venv = PathBuf::from(venv);
            patterns.push(format!("{}/bin/python3*", venv.display()));
        }
        patterns.extend(SYSTEM_PATTERNS.iter().map(|p| p.to_string()));
        Self {
            patterns,
            name_prefix: "python3".to_string(),
            path_fallback: Some("python3".to_string()),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl InterpreterLocator {
    /// Search only `patterns`, without a `PATH` fallback.
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            path_fallback: None,
            ..Self::default()
        }
    }

    /// Discover interpreters and their versions. Probe failures exclude the
    /// candidate; this never fails and may return an empty list.
    #[instrument(skip_all, fields(patterns = self.patterns.len()))]
    pub fn locate<R: ProcessRunner + ?Sized>(&self, runner: &R) -> Vec<InterpreterCandidate> {
        let mut candidates: Vec<InterpreterCandidate> = Vec::new();
        for pattern in &self.patterns {
            debug!(pattern = %pattern, "searching pattern");
            for path in expand_pattern(pattern) {
                if candidates.iter().any(|c| c.path == path) {
                    continue;
                }
                if !self.has_prefix(&path) || !is_executable_file(&path) {
                    continue;
                }
                if let Some(version) = self.probe(runner, &path) {
                    debug!(path = %path.display(), version = %version, "found interpreter");
                    candidates.push(InterpreterCandidate::new(path, version));
                }
            }
        }

        if let Some(name) = &self.path_fallback
            && let Some(path) = runner.find_executable(name, None)
            && candidates.iter().all(|c| c.path != path)
            && let Some(version) = self.probe(runner, &path)
        {
            debug!(path = %path.display(), version = %version, "found interpreter on PATH");
            candidates.push(InterpreterCandidate::new(path, version));
        }

        info!(count = candidates.len(), "interpreter candidates found");
        candidates
    }

    fn has_prefix(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&self.name_prefix))
    }

    fn probe<R: ProcessRunner + ?Sized>(&self, runner: &R, path: &Path) -> Option<Version> {
        let invocation = Invocation::new([path.display().to_string(), "-c".into(), PROBE_SCRIPT.into()])
            .captured()
            .with_timeout(self.probe_timeout);
        match runner.invoke(&invocation) {
            Ok(out) if out.success() => {
                let version = Version::parse(&out.stdout);
                if version.is_none() {
                    debug!(path = %path.display(), stdout = %out.stdout.trim(), "unparsable version output");
                }
                version
            }
            Ok(out) => {
                debug!(path = %path.display(), exit_code = ?out.code, timed_out = out.timed_out, "version probe failed");
                None
            }
            Err(err) => {
                debug!(path = %path.display(), err = %err, "version probe could not run");
                None
            }
        }
    }
}

/// Expand a glob pattern into existing paths, sorted per directory.
///
/// A leading `~` is the home directory. Wildcards never cross a `/`.
pub fn expand_pattern(pattern: &str) -> Vec<PathBuf> {
    let expanded = match pattern.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => format!("{}{rest}", home.display()),
            None => return Vec::new(),
        },
        None => pattern.to_string(),
    };

    let path = Path::new(&expanded);
    let mut matches: Vec<PathBuf> = vec![PathBuf::new()];
    for component in path.components() {
        let segment = match component {
            Component::Normal(s) => s.to_string_lossy(),
            other => {
                for m in &mut matches {
                    m.push(other.as_os_str());
                }
                continue;
            }
        };
        if !has_wildcard(&segment) {
            for m in &mut matches {
                m.push(&*segment);
            }
            continue;
        }
        let Some(matcher) = wildcard_regex(&segment) else {
            return Vec::new();
        };
        let mut next = Vec::new();
        for dir in &matches {
            let listing = if dir.as_os_str().is_empty() {
                Path::new(".")
            } else {
                dir.as_path()
            };
            let Ok(entries) = fs::read_dir(listing) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| matcher.is_match(name))
                .collect();
            names.sort();
            next.extend(names.into_iter().map(|name| dir.join(name)));
        }
        matches = next;
    }
    matches.retain(|m| m.exists());
    matches
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

fn wildcard_regex(segment: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in segment.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::io::process::ProcessOutput;
    use crate::test_support::RecordingRunner;
    use std::os::unix::fs::PermissionsExt;

    fn touch(path: &Path, mode: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, "#!/bin/sh\n").expect("write");
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
    }

    /// Answers the version probe based on the binary's file name.
    fn versions_by_name() -> RecordingRunner {
        RecordingRunner::new().responding(|inv| {
            let name = Path::new(inv.program())
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            Ok(match name.as_str() {
                "python3.12" => ProcessOutput::ok_with_stdout("3.12.4\n"),
                "python3.9" => ProcessOutput::ok_with_stdout("3.9.1\n"),
                "python3" => ProcessOutput::ok_with_stdout("3.11.2\n"),
                "python3-garbage" => ProcessOutput::ok_with_stdout("not a version\n"),
                _ => ProcessOutput::failed(1, "boom"),
            })
        })
    }

    #[test]
    fn locate_probes_matching_executables_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join("bin");
        touch(&bin.join("python3.12"), 0o755);
        touch(&bin.join("python3.9"), 0o755);
        touch(&bin.join("python3-config"), 0o755);
        touch(&bin.join("python3-garbage"), 0o755);
        touch(&bin.join("python3.13"), 0o644);
        touch(&bin.join("pip3"), 0o755);

        let runner = versions_by_name();
        let locator = InterpreterLocator::with_patterns([format!("{}/python3*", bin.display())]);
        let found = locator.locate(&runner);

        assert_eq!(
            found,
            vec![
                InterpreterCandidate::new(bin.join("python3.12"), Version::new(3, 12, 4)),
                InterpreterCandidate::new(bin.join("python3.9"), Version::new(3, 9, 1)),
            ]
        );
        // python3.13 is not executable and pip3 lacks the prefix: never probed.
        let probed: Vec<String> = runner.calls().iter().map(|c| c.program().to_string()).collect();
        assert!(!probed.iter().any(|p| p.ends_with("python3.13") || p.ends_with("pip3")));
        assert!(runner.calls().iter().all(|c| c.capture && c.timeout.is_some()));
    }

    #[test]
    fn locate_expands_directory_wildcards() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(&temp.path().join("opt/a/bin/python3.12"), 0o755);
        touch(&temp.path().join("opt/b/bin/python3.9"), 0o755);
        touch(&temp.path().join("opt/c/lib/python3.12"), 0o755);

        let runner = versions_by_name();
        let locator =
            InterpreterLocator::with_patterns([format!("{}/opt/*/bin/python3*", temp.path().display())]);
        let found: Vec<PathBuf> = locator.locate(&runner).into_iter().map(|c| c.path).collect();

        assert_eq!(
            found,
            vec![
                temp.path().join("opt/a/bin/python3.12"),
                temp.path().join("opt/b/bin/python3.9"),
            ]
        );
    }

    #[test]
    fn path_fallback_added_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = versions_by_name().with_executable("python3");
        let locator = InterpreterLocator {
            path_fallback: Some("python3".to_string()),
            ..InterpreterLocator::with_patterns([format!("{}/missing/python3*", temp.path().display())])
        };

        let found = locator.locate(&runner);
        assert_eq!(
            found,
            vec![InterpreterCandidate::new("/usr/bin/python3", Version::new(3, 11, 2))]
        );
    }

    #[test]
    fn unreadable_patterns_yield_nothing() {
        let runner = RecordingRunner::new();
        let locator = InterpreterLocator::with_patterns(["/definitely/not/here/*/python3*"]);
        assert!(locator.locate(&runner).is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn wildcard_regex_is_segment_anchored() {
        let re = wildcard_regex("python3*").expect("regex");
        assert!(re.is_match("python3.12"));
        assert!(re.is_match("python3"));
        assert!(!re.is_match("xpython3"));
        let re = wildcard_regex("python3.1?").expect("regex");
        assert!(re.is_match("python3.12"));
        assert!(!re.is_match("python3x12"));
    }
}
