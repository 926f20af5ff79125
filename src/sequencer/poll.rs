//! Bounded, fixed-interval readiness polling

use std::time::Duration;

use super::cancel::CancelToken;
use super::state::HealthState;
use crate::logging::Logger;
use crate::runtime::ContainerRuntime;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Fixed interval, bounded attempts. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Result of a single readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Ready,
    NotReady(String),
}

/// Result of a polling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32, last_output: String },
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn health(&self) -> HealthState {
        match self {
            PollOutcome::Ready { .. } => HealthState::Ready,
            PollOutcome::TimedOut { .. } => HealthState::TimedOut,
            PollOutcome::Cancelled { .. } => HealthState::Starting,
        }
    }
}

/// Is the workload present and answering the probe command?
pub fn probe(runtime: &dyn ContainerRuntime, name: &str, probe_command: &[&str]) -> ProbeResult {
    match runtime.is_running(name) {
        Ok(true) => {}
        Ok(false) => return ProbeResult::NotReady("instance is not running".to_string()),
        Err(e) => return ProbeResult::NotReady(e.to_string()),
    }
    match runtime.exec(name, probe_command) {
        Ok(out) if out.success => ProbeResult::Ready,
        Ok(out) => ProbeResult::NotReady(out.combined()),
        Err(e) => ProbeResult::NotReady(e.to_string()),
    }
}

/// Probe until ready, the budget is spent, or the token is cancelled
pub fn wait_until_ready(
    runtime: &dyn ContainerRuntime,
    name: &str,
    probe_command: &[&str],
    policy: &PollPolicy,
    cancel: &CancelToken,
    logger: &Logger,
) -> PollOutcome {
    let mut last_output = String::new();

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled { attempts: attempt - 1 };
        }

        match probe(runtime, name, probe_command) {
            ProbeResult::Ready => {
                logger.info(
                    "readiness_poll",
                    format!("{} ready after {} attempt(s)", name, attempt),
                );
                return PollOutcome::Ready { attempts: attempt };
            }
            ProbeResult::NotReady(output) => {
                logger.debug(
                    "readiness_poll",
                    format!("attempt {}/{} not ready: {}", attempt, policy.max_attempts, output),
                );
                last_output = output;
            }
        }

        if attempt < policy.max_attempts && cancel.sleep(policy.interval) {
            return PollOutcome::Cancelled { attempts: attempt };
        }
    }

    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
        last_output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogConfig, LogLevel};
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::{ContainerRuntime, RunSpec};

    fn quiet() -> Logger {
        Logger::new(LogConfig::new(LogLevel::Fatal, None, false, false))
    }

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy { interval: Duration::from_millis(1), max_attempts }
    }

    fn started(runtime: FakeRuntime) -> FakeRuntime {
        runtime
            .run_detached(&RunSpec {
                name: "w".to_string(),
                image: "img".to_string(),
                env_file: None,
                mounts: vec![],
                labels: vec![],
            })
            .unwrap();
        runtime
    }

    #[test]
    fn test_ready_stops_polling() {
        let runtime = started(FakeRuntime::new().ready_after(2));
        let outcome = wait_until_ready(&runtime, "w", &["true"], &fast(10), &CancelToken::new(), &quiet());
        assert_eq!(outcome, PollOutcome::Ready { attempts: 3 });
        assert_eq!(runtime.probes_seen(), 3);
        assert_eq!(outcome.health(), HealthState::Ready);
    }

    #[test]
    fn test_budget_exhausted() {
        let runtime = started(FakeRuntime::new().never_ready());
        let outcome = wait_until_ready(&runtime, "w", &["true"], &fast(4), &CancelToken::new(), &quiet());
        match outcome {
            PollOutcome::TimedOut { attempts, ref last_output } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_output, "workload not ready yet");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(runtime.probes_seen(), 4);
        assert_eq!(outcome.health(), HealthState::TimedOut);
    }

    #[test]
    fn test_not_running_is_not_ready() {
        let runtime = FakeRuntime::new();
        assert_eq!(
            probe(&runtime, "missing", &["true"]),
            ProbeResult::NotReady("instance is not running".to_string())
        );
    }

    #[test]
    fn test_cancelled_before_first_probe() {
        let runtime = started(FakeRuntime::new().never_ready());
        let token = CancelToken::new();
        token.cancel();
        let outcome = wait_until_ready(&runtime, "w", &["true"], &fast(10), &token, &quiet());
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 0 });
        assert_eq!(runtime.probes_seen(), 0);
    }
}
