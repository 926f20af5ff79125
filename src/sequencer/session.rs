//! Attached session handling
//!
//! Blocks on the attached surface while watching for cancellation and for the
//! workload going away underneath it.

use std::process::Child;
use std::time::{Duration, Instant};

use super::cancel::CancelToken;
use super::state::RunEnd;
use crate::error::{PodError, Result};
use crate::logging::Logger;
use crate::runtime::{Attach, ContainerRuntime};

/// How often the session loop wakes up
const SESSION_TICK: Duration = Duration::from_millis(100);

pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

/// Attach `command` inside `name` and wait until the session ends
pub fn attach_and_wait(
    runtime: &dyn ContainerRuntime,
    name: &str,
    command: &[&str],
    attach: Attach,
    liveness_interval: Duration,
    cancel: &CancelToken,
    logger: &Logger,
) -> Result<RunEnd> {
    logger.info("session_attach", format!("attaching '{}' in {}", command.join(" "), name));
    let mut child = runtime.exec_interactive(name, command, attach)?;
    let mut last_liveness = Instant::now();

    loop {
        if cancel.is_cancelled() {
            logger.info("session_end", "termination signal received; ending session");
            terminate(&mut child);
            return Ok(RunEnd::Signal);
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                // Exec surfaces exit when the instance dies too; tell the two apart
                if !runtime.is_running(name).unwrap_or(false) {
                    logger.error(
                        "workload_died",
                        format!("{} stopped during the session (surface exit {:?})", name, status.code()),
                    );
                    return Ok(RunEnd::WorkloadDied);
                }
                logger.info("session_end", format!("session exited with status {:?}", status.code()));
                return Ok(RunEnd::Normal { status: status.code() });
            }
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child);
                return Err(PodError::SessionFailed(format!("waiting on session failed: {}", e)));
            }
        }

        if last_liveness.elapsed() >= liveness_interval {
            last_liveness = Instant::now();
            if !runtime.is_running(name).unwrap_or(false) {
                logger.error("workload_died", format!("{} is no longer running; ending session", name));
                terminate(&mut child);
                return Ok(RunEnd::WorkloadDied);
            }
        }

        std::thread::sleep(SESSION_TICK);
    }
}

fn terminate(child: &mut Child) {
    // Already exited is fine
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogConfig, LogLevel};
    use crate::runtime::fake::FakeRuntime;

    fn quiet() -> Logger {
        Logger::new(LogConfig::new(LogLevel::Fatal, None, false, false))
    }

    #[test]
    fn test_normal_exit() {
        let runtime = FakeRuntime::new()
            .with_instance("pod", "img", true)
            .with_session_command(&["sh", "-c", "exit 3"]);
        let end = attach_and_wait(
            &runtime, "pod", &["claude"], Attach::Stdin,
            DEFAULT_LIVENESS_INTERVAL, &CancelToken::new(), &quiet(),
        )
        .unwrap();
        assert_eq!(end, RunEnd::Normal { status: Some(3) });
    }

    #[test]
    fn test_cancel_kills_surface() {
        let runtime = FakeRuntime::new()
            .with_instance("pod", "img", true)
            .with_session_command(&["sleep", "30"]);
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            canceller.cancel();
        });
        let started = Instant::now();
        let end = attach_and_wait(
            &runtime, "pod", &["claude"], Attach::Stdin,
            DEFAULT_LIVENESS_INTERVAL, &token, &quiet(),
        )
        .unwrap();
        handle.join().unwrap();
        assert_eq!(end, RunEnd::Signal);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_workload_death_detected() {
        let runtime = FakeRuntime::new()
            .with_instance("pod", "img", true)
            .with_session_command(&["sleep", "30"])
            .die_on_attach();
        let end = attach_and_wait(
            &runtime, "pod", &["claude"], Attach::Stdin,
            Duration::from_millis(50), &CancelToken::new(), &quiet(),
        )
        .unwrap();
        assert_eq!(end, RunEnd::WorkloadDied);
    }
}
