//! Test-only process runner that records invocations and replays scripted results.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;

use crate::io::process::{Invocation, ProcessOutput, ProcessRunner};

type Responder = Box<dyn Fn(&Invocation) -> Result<ProcessOutput>>;

/// Records every [`Invocation`] and answers with a scripted responder.
///
/// By default every command succeeds with empty output and no executables exist.
pub struct RecordingRunner {
    calls: RefCell<Vec<Invocation>>,
    responder: Responder,
    executables: BTreeMap<String, PathBuf>,
    lookups: RefCell<Vec<(String, Option<String>)>>,
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            responder: Box::new(|_| Ok(ProcessOutput::ok_with_stdout(""))),
            executables: BTreeMap::new(),
            lookups: RefCell::new(Vec::new()),
        }
    }
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations with `responder` instead of a blanket success.
    pub fn responding(
        mut self,
        responder: impl Fn(&Invocation) -> Result<ProcessOutput> + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    /// Make `name` discoverable by [`ProcessRunner::find_executable`] at `/usr/bin/<name>`.
    pub fn with_executable(mut self, name: &str) -> Self {
        self.executables
            .insert(name.to_string(), PathBuf::from(format!("/usr/bin/{name}")));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Argument vectors of all recorded calls.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls.borrow().iter().map(|c| c.args.clone()).collect()
    }

    /// Count calls whose argument vector starts with `prefix`.
    pub fn count_prefix(&self, prefix: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| starts_with(&c.args, prefix))
            .count()
    }

    /// `(name, search_path)` pairs passed to `find_executable`.
    pub fn lookups(&self) -> Vec<(String, Option<String>)> {
        self.lookups.borrow().clone()
    }
}

impl ProcessRunner for RecordingRunner {
    fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.calls.borrow_mut().push(invocation.clone());
        (self.responder)(invocation)
    }

    fn find_executable(&self, name: &str, search_path: Option<&str>) -> Option<PathBuf> {
        self.lookups
            .borrow_mut()
            .push((name.to_string(), search_path.map(str::to_string)));
        self.executables.get(name).cloned()
    }
}

/// True when `args` begins with `prefix`.
pub fn starts_with(args: &[String], prefix: &[&str]) -> bool {
    args.len() >= prefix.len() && args.iter().zip(prefix).all(|(a, p)| a == p)
}
