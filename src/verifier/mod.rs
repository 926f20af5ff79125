//! Post-start verification suite
//!
//! Runs a fixed battery of independent checks against an already running
//! workload. Every check runs even if earlier ones fail, so the report shows
//! the full picture.

mod checks;
mod report;

use std::path::Path;

use crate::logging::{tail_records, LogLevel, Logger};
use crate::runtime::{ContainerRuntime, WorkloadHandle};
use crate::sequencer::CancelToken;

pub use checks::{suite, Capability, Check, CheckKind, SuiteConfig};
pub use report::{Note, Outcome, ReportBuilder, TestResult, VerificationReport};

/// Lines of workload output included in a diagnostics dump
const DIAGNOSTIC_LOG_LINES: usize = 50;
/// Records from our own log file included in a diagnostics dump
const DIAGNOSTIC_RECORDS: usize = 20;

pub struct Verifier<'a> {
    runtime: &'a dyn ContainerRuntime,
    logger: &'a Logger,
    config: SuiteConfig,
    cancel: CancelToken,
}

impl<'a> Verifier<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, logger: &'a Logger, config: SuiteConfig) -> Self {
        Self {
            runtime,
            logger,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Stop running checks once `cancel` fires; the rest are skipped
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every check in order and produce the report
    pub fn run_suite(&self, workload: &WorkloadHandle) -> VerificationReport {
        let mut builder = ReportBuilder::new();
        let mut workload_down = false;

        self.logger.info("verify", format!("verifying {}", workload));

        for check in suite(&self.config) {
            if self.cancel.is_cancelled() {
                builder.skip(&check.name, check.required, "interrupted by signal");
                continue;
            }
            if workload_down && check.kind != CheckKind::WorkloadRunning {
                builder.skip(&check.name, check.required, "workload not running");
                continue;
            }

            match check.run(self.runtime, workload.name()) {
                Ok(detail) => {
                    self.logger.info("verify_check", format!("PASS {}: {}", check.name, detail));
                    builder.pass(&check.name, check.required, detail);
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    if check.required {
                        self.logger.error("verify_check", format!("FAIL {}: {}", check.name, reason));
                        builder.fail(&check.name, true, reason);
                        if check.kind == CheckKind::WorkloadRunning {
                            workload_down = true;
                        }
                    } else {
                        self.logger.warn(
                            "verify_check",
                            format!("optional {} unavailable: {}", check.name, reason),
                        );
                        builder.note(LogLevel::Warn, &check.name, reason.clone());
                        builder.skip(&check.name, false, reason);
                    }
                }
            }
        }

        let report = builder.finish();
        let summary = format!(
            "{} passed, {} failed, {} skipped",
            report.passed(),
            report.failed(),
            report.skipped()
        );
        if self.cancel.is_cancelled() {
            self.logger.warn("verify", format!("interrupted by signal; {}", summary));
        } else if report.success() {
            self.logger.info("verify", summary);
        } else {
            self.logger.error("verify", summary);
        }
        report
    }

    /// Collect and log what is needed to triage a failed run
    pub fn diagnostics(&self, workload: &WorkloadHandle) -> String {
        let mut dump = String::from("Diagnostics\n-----------\n");

        let state = match self.runtime.inspect_state(workload.name()) {
            Ok(out) => out.combined(),
            Err(e) => format!("unavailable: {}", e),
        };
        self.logger.error("verify_diagnostics", format!("state of {}: {}", workload, state));
        dump.push_str(&format!("State: {}\n", state));

        let logs = match self.runtime.logs_tail(workload.name(), DIAGNOSTIC_LOG_LINES) {
            Ok(out) => out.combined(),
            Err(e) => format!("unavailable: {}", e),
        };
        self.logger.error(
            "verify_diagnostics",
            format!("last {} lines of {}:\n{}", DIAGNOSTIC_LOG_LINES, workload, logs),
        );
        dump.push_str(&format!("\nWorkload output (last {} lines):\n{}\n", DIAGNOSTIC_LOG_LINES, logs));

        if let Some(path) = self.logger.file_path() {
            dump.push_str(&format!("\nRecent log records ({}):\n", path.display()));
            dump.push_str(&recent_records(path));
        }
        dump
    }
}

fn recent_records(path: &Path) -> String {
    match tail_records(path, DIAGNOSTIC_RECORDS) {
        Ok(records) => records
            .iter()
            .map(|r| format!("  {}\n", r.to_console_line(false)))
            .collect(),
        Err(e) => format!("  unavailable: {}\n", e),
    }
}
