//! Individual post-start checks

use anyhow::{anyhow, bail, Context};

use crate::environment::{PROVIDER_CREDENTIAL, SEARCH_API_KEY, SOURCE_CONTROL_TOKEN};
use crate::runtime::ContainerRuntime;

/// Optional integration probed inside the workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    /// Variable that must be set for the capability to be usable
    pub env_var: String,
    /// Extra command that must succeed when the variable is set
    pub probe: Option<Vec<String>>,
}

/// What the suite checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteConfig {
    pub installation_command: Vec<String>,
    /// JSON configuration file inside the workload
    pub config_path: String,
    pub mount_points: Vec<String>,
    pub required_env: Vec<String>,
    pub capabilities: Vec<Capability>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            installation_command: vec!["claude".to_string(), "--version".to_string()],
            config_path: "/home/agent/.claude/settings.json".to_string(),
            mount_points: vec!["/workspace".to_string()],
            required_env: vec![PROVIDER_CREDENTIAL.to_string()],
            capabilities: vec![
                Capability {
                    name: "source_control".to_string(),
                    env_var: SOURCE_CONTROL_TOKEN.to_string(),
                    probe: Some(vec!["gh".to_string(), "auth".to_string(), "status".to_string()]),
                },
                Capability {
                    name: "web_search".to_string(),
                    env_var: SEARCH_API_KEY.to_string(),
                    probe: None,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    WorkloadRunning,
    Installation(Vec<String>),
    ConfigValid(String),
    MountPoint(String),
    EnvVar(String),
    Capability(Capability),
}

/// A named check; optional checks never fail the suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub required: bool,
    pub kind: CheckKind,
}

impl Check {
    fn required(name: impl Into<String>, kind: CheckKind) -> Self {
        Self { name: name.into(), required: true, kind }
    }

    /// Run the check. `Ok` carries a short success detail.
    pub fn run(&self, runtime: &dyn ContainerRuntime, workload: &str) -> anyhow::Result<String> {
        match &self.kind {
            CheckKind::WorkloadRunning => {
                if runtime.is_running(workload)? {
                    Ok(format!("{} is running", workload))
                } else {
                    bail!("{} is not running", workload)
                }
            }
            CheckKind::Installation(command) => {
                let out = exec(runtime, workload, command)?;
                let version = out.lines().next().unwrap_or("").trim();
                Ok(if version.is_empty() { "installed".to_string() } else { version.to_string() })
            }
            CheckKind::ConfigValid(path) => {
                let content = exec(runtime, workload, &["cat".to_string(), path.clone()])
                    .with_context(|| format!("cannot read {}", path))?;
                serde_json::from_str::<serde_json::Value>(&content)
                    .with_context(|| format!("{} is not valid JSON", path))?;
                Ok(format!("{} parses", path))
            }
            CheckKind::MountPoint(path) => {
                exec(runtime, workload, &["test".to_string(), "-d".to_string(), path.clone()])
                    .with_context(|| format!("{} is not mounted", path))?;
                Ok(format!("{} present", path))
            }
            CheckKind::EnvVar(name) => env_present(runtime, workload, name),
            CheckKind::Capability(capability) => {
                env_present(runtime, workload, &capability.env_var)?;
                if let Some(probe) = &capability.probe {
                    exec(runtime, workload, probe)
                        .with_context(|| format!("'{}' failed", probe.join(" ")))?;
                }
                Ok(format!("{} available", capability.name))
            }
        }
    }
}

/// Run a command in the workload, failing with its output when it exits non-zero
fn exec(runtime: &dyn ContainerRuntime, workload: &str, command: &[String]) -> anyhow::Result<String> {
    let args: Vec<&str> = command.iter().map(String::as_str).collect();
    let out = runtime.exec(workload, &args)?;
    if out.success {
        Ok(out.stdout)
    } else {
        Err(anyhow!("exit {:?}: {}", out.code, out.combined()))
    }
}

/// Checks presence only; the value is never returned or logged
fn env_present(runtime: &dyn ContainerRuntime, workload: &str, name: &str) -> anyhow::Result<String> {
    let value = exec(runtime, workload, &["printenv".to_string(), name.to_string()])
        .with_context(|| format!("{} is not set", name))?;
    if value.trim().is_empty() {
        bail!("{} is empty", name);
    }
    Ok(format!("{} is set", name))
}

/// The fixed, ordered battery for `config`
pub fn suite(config: &SuiteConfig) -> Vec<Check> {
    let mut checks = vec![
        Check::required("workload_running", CheckKind::WorkloadRunning),
        Check::required("installation", CheckKind::Installation(config.installation_command.clone())),
        Check::required("config_valid", CheckKind::ConfigValid(config.config_path.clone())),
    ];
    for path in &config.mount_points {
        checks.push(Check::required(format!("mount:{}", path), CheckKind::MountPoint(path.clone())));
    }
    for name in &config.required_env {
        checks.push(Check::required(format!("env:{}", name), CheckKind::EnvVar(name.clone())));
    }
    for capability in &config.capabilities {
        checks.push(Check {
            name: format!("capability:{}", capability.name),
            required: false,
            kind: CheckKind::Capability(capability.clone()),
        });
    }
    checks
}
