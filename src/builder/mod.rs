//! Image builder
//!
//! Thin wrapper over the runtime's build and push operations. Build failures
//! are reported once, verbatim, and never retried. A termination signal
//! stops the pipeline between steps; nothing is pushed after one.

mod context;

use std::path::PathBuf;
use std::time::Instant;

use crate::error::{PodError, Result};
use crate::logging::Logger;
use crate::runtime::ContainerRuntime;
use crate::sequencer::CancelToken;

pub use context::{ensure_excluded_from_context, ignore_file_excludes, IGNORE_FILE_NAME};

/// What to build and where it goes
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub context: PathBuf,
    pub tag: String,
    pub no_cache: bool,
}

/// Outcome of an optional push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed { reference: String },
    /// No registry configured
    Skipped,
}

pub struct Builder<'a> {
    runtime: &'a dyn ContainerRuntime,
    logger: &'a Logger,
    cancel: CancelToken,
}

impl<'a> Builder<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, logger: &'a Logger) -> Self {
        Self {
            runtime,
            logger,
            cancel: CancelToken::new(),
        }
    }

    /// Observe `cancel` between build and push steps
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self, operation: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            self.logger.warn(operation, "termination signal received; stopping");
            return Err(PodError::Cancelled(operation.to_string()));
        }
        Ok(())
    }

    /// Build the image
    pub fn build(&self, options: &BuildOptions) -> Result<()> {
        if !options.context.is_dir() {
            return Err(PodError::InvalidConfig(format!(
                "build context '{}' is not a directory",
                options.context.display()
            )));
        }
        self.check_cancelled("image_build")?;

        self.logger.info(
            "image_build",
            format!(
                "building {} from {}{}",
                options.tag,
                options.context.display(),
                if options.no_cache { " (no cache)" } else { "" }
            ),
        );
        let started = Instant::now();
        let out = match self.runtime.build(&options.context, &options.tag, options.no_cache) {
            Ok(out) => out,
            Err(e) => {
                self.logger.error("image_build", format!("build of {} failed: {}", options.tag, e));
                return Err(PodError::BuildFailed(e.to_string()));
            }
        };

        if !out.success {
            let detail = out.combined();
            self.logger.error(
                "image_build",
                format!("build of {} failed (exit {:?}): {}", options.tag, out.code, detail),
            );
            return Err(PodError::BuildFailed(detail));
        }

        self.logger.info(
            "image_build",
            format!("built {} in {:.1}s", options.tag, started.elapsed().as_secs_f64()),
        );
        self.check_cancelled("image_build")
    }

    /// Push `tag` to `registry`; skipped when no registry is configured
    pub fn push(&self, tag: &str, registry: Option<&str>) -> Result<PushOutcome> {
        let registry = match registry.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => r.trim_end_matches('/'),
            None => {
                self.logger.info("image_push", "no registry configured; push skipped");
                return Ok(PushOutcome::Skipped);
            }
        };

        self.check_cancelled("image_push")?;

        let reference = format!("{}/{}", registry, tag);
        let tagged = self.runtime.tag(tag, &reference)?;
        if !tagged.success {
            let detail = tagged.combined();
            self.logger.error("image_push", format!("tagging {} failed: {}", reference, detail));
            return Err(PodError::PushFailed(detail));
        }

        self.check_cancelled("image_push")?;
        self.logger.info("image_push", format!("pushing {}", reference));
        let out = self.runtime.push(&reference)?;
        if !out.success {
            let detail = out.combined();
            self.logger.error("image_push", format!("push of {} failed: {}", reference, detail));
            return Err(PodError::PushFailed(detail));
        }

        self.logger.info("image_push", format!("pushed {}", reference));
        Ok(PushOutcome::Pushed { reference })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{read_records, LogConfig, LogLevel, LOG_FILE_NAME};
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::CommandOutput;
    use std::path::Path;
    use tempfile::TempDir;

    fn options(dir: &Path) -> BuildOptions {
        BuildOptions {
            context: dir.to_path_buf(),
            tag: "agentpod:test".to_string(),
            no_cache: true,
        }
    }

    fn file_logger(dir: &Path) -> Logger {
        let mut config = LogConfig::new(LogLevel::Debug, Some(&dir.join("logs")), true, false);
        config.color = false;
        Logger::new(config)
    }

    #[test]
    fn test_build_success() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let logger = file_logger(dir.path());
        Builder::new(&runtime, &logger).build(&options(dir.path())).unwrap();
        assert!(runtime.calls()[0].ends_with("agentpod:test no_cache=true"));
    }

    #[test]
    fn test_build_failure_single_error_entry() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new()
            .with_build_result(CommandOutput::failed(1, "COPY failed: file not found"));
        let logger = file_logger(dir.path());

        let err = Builder::new(&runtime, &logger).build(&options(dir.path())).unwrap_err();
        assert!(matches!(err, PodError::BuildFailed(ref out) if out.contains("COPY failed")));
        logger.shutdown();

        let records = read_records(&dir.path().join("logs").join(LOG_FILE_NAME)).unwrap();
        let errors: Vec<_> = records.iter().filter(|r| r.level == LogLevel::Error).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, "image_build");
        assert!(errors[0].message.contains("COPY failed"));
        // No automatic retry
        assert_eq!(runtime.calls().iter().filter(|c| c.starts_with("build")).count(), 1);
    }

    #[test]
    fn test_build_missing_context() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let logger = file_logger(dir.path());
        let result = Builder::new(&runtime, &logger).build(&options(&dir.path().join("nope")));
        assert!(matches!(result, Err(PodError::InvalidConfig(_))));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_push_skipped_without_registry() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let logger = file_logger(dir.path());
        let outcome = Builder::new(&runtime, &logger).push("agentpod:test", None).unwrap();
        assert_eq!(outcome, PushOutcome::Skipped);
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_push_with_registry() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let logger = file_logger(dir.path());
        let outcome = Builder::new(&runtime, &logger)
            .push("agentpod:test", Some("registry.local:5000/"))
            .unwrap();
        assert_eq!(
            outcome,
            PushOutcome::Pushed { reference: "registry.local:5000/agentpod:test".to_string() }
        );
        assert_eq!(
            runtime.calls(),
            vec![
                "tag agentpod:test registry.local:5000/agentpod:test".to_string(),
                "push registry.local:5000/agentpod:test".to_string(),
            ]
        );
    }

    #[test]
    fn test_signal_before_push_skips_push() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let logger = file_logger(dir.path());
        let token = CancelToken::new();
        let builder = Builder::new(&runtime, &logger).with_cancel(token.clone());

        builder.build(&options(dir.path())).unwrap();
        token.cancel();
        let err = builder.push("agentpod:test", Some("reg.local")).unwrap_err();

        assert!(matches!(err, PodError::Cancelled(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_SIGNAL);
        assert!(!runtime.calls().iter().any(|c| c.starts_with("push") || c.starts_with("tag")));
    }

    #[test]
    fn test_signal_during_build_is_reported() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let logger = file_logger(dir.path());
        let token = CancelToken::new();
        token.cancel();
        let err = Builder::new(&runtime, &logger)
            .with_cancel(token)
            .build(&options(dir.path()))
            .unwrap_err();
        assert!(matches!(err, PodError::Cancelled(_)));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_push_failure() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().with_push_result(CommandOutput::failed(1, "denied"));
        let logger = file_logger(dir.path());
        let result = Builder::new(&runtime, &logger).push("agentpod:test", Some("ghcr.io/me"));
        assert!(matches!(result, Err(PodError::PushFailed(_))));
    }
}
