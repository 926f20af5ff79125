//! Docker-compatible CLI backend

use std::path::Path;
use std::process::{Child, Command, Stdio};

use super::{Attach, CommandOutput, ContainerRuntime, RunSpec};
use crate::error::{PodError, Result};

/// Seconds `stop` waits before the engine kills the instance
const STOP_GRACE_SECS: u32 = 10;

/// Runtime that shells out to `docker` (or a drop-in such as `podman`)
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PodError::Runtime(format!("failed to run '{}': {}", self.binary, e)))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn names_matching(&self, filter: &str) -> Result<Vec<String>> {
        let out = self.run(&["ps", "-a", "--filter", filter, "--format", "{{.Names}}"])?;
        if !out.success {
            return Err(PodError::Runtime(format!("listing instances failed: {}", out.combined())));
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Arguments for `run -d`
pub(crate) fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if let Some(env_file) = &spec.env_file {
        args.push("--env-file".to_string());
        args.push(env_file.display().to_string());
    }
    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(format!("{}:{}", mount.host.display(), mount.container));
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(spec.image.clone());
    args
}

/// Docker name filters are regular expressions; match the exact name only
pub(crate) fn exact_name_filter(name: &str) -> String {
    format!("name=^/?{}$", regex::escape(name))
}

impl ContainerRuntime for DockerCli {
    fn build(&self, context: &Path, tag: &str, no_cache: bool) -> Result<CommandOutput> {
        let context = context.display().to_string();
        let mut args = vec!["build", "-t", tag];
        if no_cache {
            args.push("--no-cache");
        }
        args.push(&context);
        self.run(&args)
    }

    fn tag(&self, source: &str, target: &str) -> Result<CommandOutput> {
        self.run(&["tag", source, target])
    }

    fn push(&self, reference: &str) -> Result<CommandOutput> {
        self.run(&["push", reference])
    }

    fn run_detached(&self, spec: &RunSpec) -> Result<CommandOutput> {
        let args = run_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)
    }

    fn is_running(&self, name: &str) -> Result<bool> {
        let out = self.run(&container_inspect_args("{{.State.Running}}", name))?;
        Ok(out.success && out.stdout.trim() == "true")
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.run(&container_inspect_args("{{.Id}}", name))?.success)
    }

    fn exec(&self, name: &str, command: &[&str]) -> Result<CommandOutput> {
        let mut args = vec!["exec", name];
        args.extend_from_slice(command);
        self.run(&args)
    }

    fn exec_interactive(&self, name: &str, command: &[&str], attach: Attach) -> Result<Child> {
        let flag = match attach {
            Attach::Tty => "-it",
            Attach::Stdin => "-i",
        };
        self.command()
            .arg("exec")
            .arg(flag)
            .arg(name)
            .args(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| PodError::Runtime(format!("failed to attach to '{}': {}", name, e)))
    }

    fn stop(&self, name: &str) -> Result<CommandOutput> {
        let grace = STOP_GRACE_SECS.to_string();
        self.run(&["stop", "-t", &grace, name])
    }

    fn remove(&self, name: &str, force: bool) -> Result<CommandOutput> {
        if force {
            self.run(&["rm", "-f", name])
        } else {
            self.run(&["rm", name])
        }
    }

    fn list_instances(&self, name: &str, image: &str) -> Result<Vec<String>> {
        let mut names = self.names_matching(&exact_name_filter(name))?;
        for other in self.names_matching(&format!("ancestor={}", image))? {
            if !names.contains(&other) {
                names.push(other);
            }
        }
        Ok(names)
    }

    fn logs_tail(&self, name: &str, lines: usize) -> Result<CommandOutput> {
        let lines = lines.to_string();
        self.run(&["logs", "--tail", &lines, name])
    }

    fn inspect_state(&self, name: &str) -> Result<CommandOutput> {
        self.run(&container_inspect_args("{{json .State}}", name))
    }
}

/// `container inspect` never falls back to an image of the same name
pub(crate) fn container_inspect_args<'a>(format: &'a str, name: &'a str) -> [&'a str; 5] {
    ["container", "inspect", "-f", format, name]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Mount;
    use std::path::PathBuf;

    #[test]
    fn test_run_args() {
        let spec = RunSpec {
            name: "agentpod".to_string(),
            image: "agentpod:latest".to_string(),
            env_file: Some(PathBuf::from("/tmp/.agentpod.env")),
            mounts: vec![Mount {
                host: PathBuf::from("/home/me/ws"),
                container: "/workspace".to_string(),
            }],
            labels: vec![("agentpod.managed".to_string(), "true".to_string())],
        };
        let args = run_args(&spec);
        assert_eq!(
            args,
            vec![
                "run", "-d", "--name", "agentpod",
                "--env-file", "/tmp/.agentpod.env",
                "-v", "/home/me/ws:/workspace",
                "--label", "agentpod.managed=true",
                "agentpod:latest",
            ]
        );
    }

    #[test]
    fn test_state_queries_target_containers_only() {
        assert_eq!(
            container_inspect_args("{{.State.Running}}", "agentpod"),
            ["container", "inspect", "-f", "{{.State.Running}}", "agentpod"]
        );
        assert_eq!(container_inspect_args("{{.Id}}", "agentpod:latest")[..2].to_vec(), vec!["container", "inspect"]);
    }

    #[test]
    fn test_exact_name_filter_escapes() {
        assert_eq!(exact_name_filter("agentpod"), "name=^/?agentpod$");
        assert_eq!(exact_name_filter("a.b"), "name=^/?a\\.b$");
    }

    #[test]
    fn test_missing_binary_is_runtime_error() {
        let cli = DockerCli::new("agentpod-no-such-binary-12345");
        let err = cli.is_running("x").unwrap_err();
        assert!(matches!(err, PodError::Runtime(_)));
    }
}
