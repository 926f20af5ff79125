//! Container runtime abstraction
//!
//! Everything the orchestrator needs from the container engine goes through
//! the [`ContainerRuntime`] trait. [`DockerCli`] drives a docker-compatible
//! command line tool; tests use [`fake::FakeRuntime`].

mod docker;
#[cfg(any(test, feature = "testing"))]
pub mod fake;

use std::path::{Path, PathBuf};
use std::process::Child;

use crate::error::Result;

pub use docker::DockerCli;

/// Captured result of one runtime invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout and stderr joined, trimmed
    pub fn combined(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (true, true) => String::new(),
            (false, true) => out.to_string(),
            (true, false) => err.to_string(),
            (false, false) => format!("{}\n{}", out, err),
        }
    }
}

/// Reference to a workload instance by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadHandle {
    name: String,
}

impl WorkloadHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for WorkloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A host directory bind-mounted into the workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
}

impl std::str::FromStr for Mount {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((host, container)) if !host.is_empty() && container.starts_with('/') => Ok(Mount {
                host: PathBuf::from(host),
                container: container.to_string(),
            }),
            _ => Err(format!("mount must look like HOST:/container/path, got '{}'", s)),
        }
    }
}

/// Everything needed to start the workload detached
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub env_file: Option<PathBuf>,
    pub mounts: Vec<Mount>,
    pub labels: Vec<(String, String)>,
}

/// Which stdio the attached surface gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// Allocate a pseudo-terminal (caller is on a tty)
    Tty,
    /// Keep stdin open without a terminal
    Stdin,
}

/// Operations the orchestrator performs against the container engine
pub trait ContainerRuntime {
    /// Build an image from a context directory
    fn build(&self, context: &Path, tag: &str, no_cache: bool) -> Result<CommandOutput>;

    /// Add another tag to an existing image
    fn tag(&self, source: &str, target: &str) -> Result<CommandOutput>;

    fn push(&self, reference: &str) -> Result<CommandOutput>;

    /// Start an instance in the background
    fn run_detached(&self, spec: &RunSpec) -> Result<CommandOutput>;

    fn is_running(&self, name: &str) -> Result<bool>;

    /// Whether an instance with this name exists in any state
    fn exists(&self, name: &str) -> Result<bool>;

    /// Run a command inside the instance and capture its output
    fn exec(&self, name: &str, command: &[&str]) -> Result<CommandOutput>;

    /// Run a command inside the instance attached to the caller's stdio
    fn exec_interactive(&self, name: &str, command: &[&str], attach: Attach) -> Result<Child>;

    fn stop(&self, name: &str) -> Result<CommandOutput>;

    fn remove(&self, name: &str, force: bool) -> Result<CommandOutput>;

    /// Names of all instances, running or not, with this name or created from this image
    fn list_instances(&self, name: &str, image: &str) -> Result<Vec<String>>;

    /// Last `lines` lines of the instance's output
    fn logs_tail(&self, name: &str, lines: usize) -> Result<CommandOutput>;

    /// Engine-reported state summary of the instance
    fn inspect_state(&self, name: &str) -> Result<CommandOutput>;
}
