//! Workload lifecycle state machine
//!
//! `INIT → PREPARING → STARTING → POLLING → READY → SESSION → CLEANUP → DONE`,
//! with an edge from every active state straight to `CLEANUP`. Whatever path
//! a run takes, it passes through `CLEANUP` before returning.

pub mod cancel;
pub mod cleanup;
pub mod poll;
pub mod session;
mod state;

use std::path::PathBuf;
use std::time::Duration;

use crate::logging::Logger;
use crate::runtime::{Attach, ContainerRuntime, Mount, RunSpec, WorkloadHandle};

pub use cancel::CancelToken;
pub use cleanup::{teardown, CleanupReport, StepResult};
pub use poll::{PollOutcome, PollPolicy, ProbeResult};
pub use state::{HealthState, RunEnd, RunOutcome, SequencerState, SessionMode};

/// Label attached to every instance this tool starts
pub const MANAGED_LABEL: &str = "agentpod.managed";

/// Everything the sequencer needs to know about the workload
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub name: String,
    pub image: String,
    pub env_file: Option<PathBuf>,
    pub mounts: Vec<Mount>,
    pub poll: PollPolicy,
    /// Command that succeeds once the workload accepts interaction
    pub probe_command: Vec<String>,
    pub interactive_command: Vec<String>,
    pub diagnostic_command: Vec<String>,
    pub liveness_interval: Duration,
    pub attach: Attach,
}

impl SequencerConfig {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env_file: None,
            mounts: Vec::new(),
            poll: PollPolicy::default(),
            probe_command: vec!["true".to_string()],
            interactive_command: vec!["claude".to_string()],
            diagnostic_command: vec!["bash".to_string()],
            liveness_interval: session::DEFAULT_LIVENESS_INTERVAL,
            attach: Attach::Tty,
        }
    }

    fn run_spec(&self) -> RunSpec {
        RunSpec {
            name: self.name.clone(),
            image: self.image.clone(),
            env_file: self.env_file.clone(),
            mounts: self.mounts.clone(),
            labels: vec![(MANAGED_LABEL.to_string(), "true".to_string())],
        }
    }

    fn surface(&self, mode: SessionMode) -> Vec<&str> {
        let command = match mode {
            SessionMode::Interactive => &self.interactive_command,
            SessionMode::Diagnostic => &self.diagnostic_command,
        };
        command.iter().map(String::as_str).collect()
    }
}

/// Drives one workload through its lifecycle. Owns its teardown.
pub struct Sequencer<'a> {
    config: SequencerConfig,
    runtime: &'a dyn ContainerRuntime,
    logger: &'a Logger,
    cancel: CancelToken,
    state: SequencerState,
    health: HealthState,
    history: Vec<SequencerState>,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        config: SequencerConfig,
        runtime: &'a dyn ContainerRuntime,
        logger: &'a Logger,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            runtime,
            logger,
            cancel,
            state: SequencerState::Init,
            health: HealthState::Starting,
            history: vec![SequencerState::Init],
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn health(&self) -> HealthState {
        self.health
    }

    pub fn handle(&self) -> WorkloadHandle {
        WorkloadHandle::new(&self.config.name)
    }

    fn transition(&mut self, next: SequencerState) {
        if !self.state.can_transition_to(next) {
            // Programming error; log loudly but keep going so cleanup still runs
            self.logger.error(
                "state_transition",
                format!("illegal transition {} -> {}", self.state, next),
            );
        }
        self.logger.debug("state_transition", format!("{} -> {}", self.state, next));
        self.state = next;
        self.history.push(next);
    }

    /// Run the full lifecycle in `mode`
    pub fn run(mut self, mode: SessionMode) -> RunOutcome {
        let end = self.drive(mode);
        self.finish(end)
    }

    /// Tear down the named workload without starting anything
    pub fn stop(mut self) -> RunOutcome {
        self.finish(RunEnd::Normal { status: None })
    }

    fn drive(&mut self, mode: SessionMode) -> RunEnd {
        let name = self.config.name.clone();

        self.transition(SequencerState::Preparing);
        let stale = teardown(self.runtime, &name, &self.config.image, self.logger);
        if !stale.is_clean() {
            let message = if stale.verified {
                format!("stale instances could not be removed: {}", stale.remaining.join(", "))
            } else {
                "could not confirm that no stale instance is left".to_string()
            };
            self.logger.error("container_prepare", &message);
            return RunEnd::Error(message);
        }
        if self.cancel.is_cancelled() {
            return RunEnd::Signal;
        }

        self.transition(SequencerState::Starting);
        self.logger.info(
            "container_start",
            format!("starting {} from image {}", name, self.config.image),
        );
        match self.runtime.run_detached(&self.config.run_spec()) {
            Ok(out) if out.success => {
                self.logger.info("container_start", format!("started {} ({})", name, out.stdout.trim()));
            }
            Ok(out) => {
                let detail = out.combined();
                self.logger.error("container_start", format!("start of {} failed: {}", name, detail));
                return RunEnd::StartFailed(detail);
            }
            Err(e) => {
                self.logger.error("container_start", format!("start of {} failed: {}", name, e));
                return RunEnd::StartFailed(e.to_string());
            }
        }

        self.transition(SequencerState::Polling);
        let probe_command: Vec<&str> = self.config.probe_command.iter().map(String::as_str).collect();
        let outcome = poll::wait_until_ready(
            self.runtime,
            &name,
            &probe_command,
            &self.config.poll,
            &self.cancel,
            self.logger,
        );
        self.health = outcome.health();
        match outcome {
            PollOutcome::Ready { .. } => {}
            PollOutcome::Cancelled { .. } => {
                self.logger.info("readiness_poll", "termination signal received while polling");
                return RunEnd::Signal;
            }
            PollOutcome::TimedOut { attempts, last_output } => {
                let logs = self
                    .runtime
                    .logs_tail(&name, 20)
                    .map(|o| o.combined())
                    .unwrap_or_default();
                self.logger.error(
                    "startup_timeout",
                    format!(
                        "{} not ready after {} attempts ({:?} apart); last probe output: {}; recent output: {}",
                        name, attempts, self.config.poll.interval, last_output, logs
                    ),
                );
                return RunEnd::TimedOut { attempts };
            }
        }

        self.transition(SequencerState::Ready);
        self.transition(SequencerState::Session);
        let surface = self.config.surface(mode);
        self.logger.info("session_start", format!("{} session in {}", mode, name));
        let result = session::attach_and_wait(
            self.runtime,
            &name,
            &surface,
            self.config.attach,
            self.config.liveness_interval,
            &self.cancel,
            self.logger,
        );
        match result {
            Ok(RunEnd::WorkloadDied) => {
                self.health = HealthState::Unhealthy;
                RunEnd::WorkloadDied
            }
            Ok(end) => end,
            Err(e) => {
                self.logger.error("session_attach", e.to_string());
                RunEnd::Error(e.to_string())
            }
        }
    }

    /// Explicit probe once ready; a failure regresses health to UNHEALTHY
    pub fn probe(&mut self) -> ProbeResult {
        let probe_command: Vec<&str> = self.config.probe_command.iter().map(String::as_str).collect();
        let result = poll::probe(self.runtime, &self.config.name, &probe_command);
        self.health = match (&result, self.health) {
            (ProbeResult::Ready, _) => HealthState::Ready,
            (ProbeResult::NotReady(_), HealthState::Ready) => HealthState::Unhealthy,
            (ProbeResult::NotReady(_), current) => current,
        };
        result
    }

    fn finish(&mut self, end: RunEnd) -> RunOutcome {
        self.transition(SequencerState::Cleanup);
        let report = teardown(self.runtime, &self.config.name, &self.config.image, self.logger);
        self.transition(SequencerState::Done);

        let outcome = RunOutcome {
            final_state: self.state,
            end,
            health: self.health,
            history: self.history.clone(),
            remaining: report.remaining,
            cleanup_verified: report.verified,
        };
        self.logger.info(
            "run_complete",
            format!("{:?}; exit code {}", outcome.end, outcome.exit_code()),
        );
        outcome
    }
}
