//! Subcommand handlers
//!
//! Each handler returns the process exit code; errors bubble up to `main`,
//! which is the only place that decides how the process ends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::args::{Args, SubCommand};
use crate::builder::{ensure_excluded_from_context, BuildOptions, Builder};
use crate::environment::{descriptor_path, layer_sources, load_descriptor, resolve, SecretOverrides};
use crate::error::{PodError, Result, EXIT_SIGNAL};
use crate::logging::{LogConfig, LogLevel, Logger};
use crate::runtime::{Attach, DockerCli, Mount, WorkloadHandle};
use crate::sequencer::{CancelToken, PollPolicy, Sequencer, SequencerConfig, SessionMode};
use crate::verifier::{SuiteConfig, Verifier};

/// Mount point of the shared workspace inside the workload
pub const WORKSPACE_MOUNT: &str = "/workspace";

/// Global settings, fixed once parsed
#[derive(Debug, Clone)]
pub struct Settings {
    pub name: String,
    pub image: String,
    pub runtime: String,
    pub workdir: PathBuf,
    pub log: LogConfig,
}

impl Settings {
    pub fn from_args(args: &Args) -> Result<Self> {
        let level: LogLevel = args.log_level.parse()?;
        if args.name.trim().is_empty() {
            return Err(PodError::InvalidConfig("workload name must not be empty".to_string()));
        }
        Ok(Self {
            name: args.name.clone(),
            image: args.image.clone(),
            runtime: args.runtime.clone(),
            workdir: args.workdir.clone(),
            log: LogConfig::new(level, Some(&args.log_dir), !args.no_log_file, !args.quiet),
        })
    }

    pub fn descriptor_path(&self) -> PathBuf {
        descriptor_path(&self.workdir)
    }
}

/// Run the selected subcommand
pub fn dispatch(
    command: &SubCommand,
    settings: &Settings,
    logger: &Logger,
    cancel: &CancelToken,
    process_env: &HashMap<String, String>,
) -> Result<i32> {
    let runtime = DockerCli::new(&settings.runtime);

    match command {
        SubCommand::Build {
            credential,
            github_token,
            search_api_key,
            context,
            tag,
            no_cache,
            push,
            registry,
        } => {
            let overrides = SecretOverrides {
                credential: credential.clone(),
                github_token: github_token.clone(),
                search_api_key: search_api_key.clone(),
            };
            let env = resolve(&overrides, process_env, logger)?;
            let descriptor = settings.descriptor_path();
            ensure_excluded_from_context(&descriptor, context)?;
            env.write_descriptor(&descriptor, logger)?;

            let tag = tag.clone().unwrap_or_else(|| settings.image.clone());
            let builder = Builder::new(&runtime, logger).with_cancel(cancel.clone());
            builder.build(&BuildOptions {
                context: context.clone(),
                tag: tag.clone(),
                no_cache: *no_cache,
            })?;
            if *push {
                builder.push(&tag, registry.as_deref())?;
            }
            Ok(0)
        }

        SubCommand::Start {
            mode,
            command,
            shell,
            poll_interval,
            poll_attempts,
            mounts,
        } => {
            let mode: SessionMode = mode.parse()?;
            if *poll_attempts == 0 {
                return Err(PodError::InvalidConfig("--poll-attempts must be at least 1".to_string()));
            }

            let path = settings.descriptor_path();
            let sources = layer_sources(load_descriptor(&path)?, process_env);
            let env = resolve(&SecretOverrides::default(), &sources, logger)?;
            env.write_descriptor(&path, logger)?;

            let mut config = SequencerConfig::new(&settings.name, &settings.image);
            config.env_file = Some(absolute(&path)?);
            config.mounts = resolve_mounts(mounts, &settings.workdir)?;
            config.poll = PollPolicy {
                interval: Duration::from_secs(*poll_interval),
                max_attempts: *poll_attempts,
            };
            config.interactive_command = split_command(command)?;
            config.diagnostic_command = split_command(shell)?;
            config.attach = if stdin_is_terminal() { Attach::Tty } else { Attach::Stdin };

            let outcome = Sequencer::new(config, &runtime, logger, cancel.clone()).run(mode);
            Ok(outcome.exit_code())
        }

        SubCommand::Verify {
            json,
            config_path,
            mount_points,
        } => {
            let mut suite = SuiteConfig::default();
            if let Some(path) = config_path {
                suite.config_path = path.clone();
            }
            if !mount_points.is_empty() {
                suite.mount_points = mount_points.clone();
            }

            let handle = WorkloadHandle::new(&settings.name);
            let verifier = Verifier::new(&runtime, logger, suite).with_cancel(cancel.clone());
            let report = verifier.run_suite(&handle);

            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
            if cancel.is_cancelled() {
                return Ok(EXIT_SIGNAL);
            }
            if !report.success() {
                let dump = verifier.diagnostics(&handle);
                // stdout carries only the report in JSON mode
                if *json {
                    eprintln!("{}", dump);
                } else {
                    println!("{}", dump);
                }
            }
            Ok(report.exit_code())
        }

        SubCommand::Stop => {
            let config = SequencerConfig::new(&settings.name, &settings.image);
            let outcome = Sequencer::new(config, &runtime, logger, cancel.clone()).stop();
            Ok(outcome.exit_code())
        }
    }
}

/// Make mount host paths absolute, relative to `workdir`; the engine treats bare names as volumes
fn resolve_mounts(mounts: &[Mount], workdir: &Path) -> Result<Vec<Mount>> {
    if mounts.is_empty() {
        let host = workdir.join("workspace");
        std::fs::create_dir_all(&host)?;
        return Ok(vec![Mount {
            host: absolute(&host)?,
            container: WORKSPACE_MOUNT.to_string(),
        }]);
    }
    mounts
        .iter()
        .map(|m| {
            Ok(Mount {
                host: absolute(&workdir.join(&m.host))?,
                container: m.container.clone(),
            })
        })
        .collect()
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn split_command(command: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
    if parts.is_empty() {
        return Err(PodError::InvalidConfig("session command must not be empty".to_string()));
    }
    Ok(parts)
}

fn stdin_is_terminal() -> bool {
    // SAFETY: isatty only inspects the descriptor
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_settings_from_args() {
        let args = Args::try_parse_from(["agentpod", "--log-level", "debug", "--quiet", "stop"]).unwrap();
        let settings = Settings::from_args(&args).unwrap();
        assert_eq!(settings.log.console_level, LogLevel::Debug);
        assert!(!settings.log.enable_console);
    }

    #[test]
    fn test_settings_rejects_bad_level() {
        let args = Args::try_parse_from(["agentpod", "--log-level", "chatty", "stop"]).unwrap();
        let err = Settings::from_args(&args).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_default_mount_is_absolute_workspace() {
        let dir = TempDir::new().unwrap();
        let mounts = resolve_mounts(&[], dir.path()).unwrap();
        assert_eq!(mounts.len(), 1);
        assert!(mounts[0].host.is_absolute());
        assert!(mounts[0].host.ends_with("workspace"));
        assert_eq!(mounts[0].container, WORKSPACE_MOUNT);
        assert!(dir.path().join("workspace").is_dir());
    }

    #[test]
    fn test_relative_mount_resolved_against_workdir() {
        let dir = TempDir::new().unwrap();
        let mounts = resolve_mounts(&["data:/data".parse().unwrap()], dir.path()).unwrap();
        assert!(mounts[0].host.is_absolute());
        assert_eq!(mounts[0].host, dir.path().join("data"));

        let default = resolve_mounts(&[], dir.path()).unwrap();
        assert_eq!(default[0].host.parent(), mounts[0].host.parent());
    }

    #[test]
    fn test_absolute_mount_kept() {
        let dir = TempDir::new().unwrap();
        let mounts = resolve_mounts(&["/srv/data:/data".parse().unwrap()], dir.path()).unwrap();
        assert_eq!(mounts[0].host, PathBuf::from("/srv/data"));
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("claude --resume").unwrap(), vec!["claude", "--resume"]);
        assert!(split_command("   ").is_err());
    }
}
