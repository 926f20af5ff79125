//! Best-effort, repeatable teardown
//!
//! Stop, remove and sweep run independently: a failure in one step is
//! logged and the next step still runs.

use crate::logging::Logger;
use crate::runtime::ContainerRuntime;

/// What happened to one teardown step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Done,
    /// Nothing to act on
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub stop: StepResult,
    pub remove: StepResult,
    /// Residual instances force-removed by the sweep
    pub swept: Vec<String>,
    /// Instances still present afterwards
    pub remaining: Vec<String>,
    /// The final listing succeeded, so `remaining` can be trusted
    pub verified: bool,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.verified && self.remaining.is_empty()
    }
}

/// Stop and remove the named instance, then sweep anything left with the same name or image
pub fn teardown(runtime: &dyn ContainerRuntime, name: &str, image: &str, logger: &Logger) -> CleanupReport {
    let present = match runtime.exists(name) {
        Ok(present) => present,
        Err(e) => {
            logger.warn("container_cleanup", format!("could not inspect {}: {}", name, e));
            // Unknown; try both steps anyway
            true
        }
    };

    let (stop, remove) = if present {
        (stop_step(runtime, name, logger), remove_step(runtime, name, logger))
    } else {
        logger.debug("container_cleanup", format!("no instance named {}", name));
        (StepResult::Skipped, StepResult::Skipped)
    };

    let swept = sweep(runtime, name, image, logger);

    let (remaining, verified) = match runtime.list_instances(name, image) {
        Ok(names) => (names, true),
        Err(e) => {
            logger.error("container_cleanup", format!("could not confirm cleanup of {}: {}", name, e));
            return CleanupReport { stop, remove, swept, remaining: Vec::new(), verified: false };
        }
    };
    if remaining.is_empty() {
        logger.info("container_cleanup", format!("no instances of {} remain", name));
    } else {
        logger.error(
            "container_cleanup",
            format!("instances still present after cleanup: {}", remaining.join(", ")),
        );
    }

    CleanupReport { stop, remove, swept, remaining, verified }
}

fn stop_step(runtime: &dyn ContainerRuntime, name: &str, logger: &Logger) -> StepResult {
    match runtime.stop(name) {
        Ok(out) if out.success => {
            logger.info("container_stop", format!("stopped {}", name));
            StepResult::Done
        }
        Ok(out) => {
            let detail = out.combined();
            logger.warn("container_stop", format!("stop of {} reported an error: {}", name, detail));
            StepResult::Failed(detail)
        }
        Err(e) => {
            logger.warn("container_stop", format!("stop of {} failed: {}", name, e));
            StepResult::Failed(e.to_string())
        }
    }
}

fn remove_step(runtime: &dyn ContainerRuntime, name: &str, logger: &Logger) -> StepResult {
    // Forced, since the stop step may have failed
    match runtime.remove(name, true) {
        Ok(out) if out.success => {
            logger.info("container_remove", format!("removed {}", name));
            StepResult::Done
        }
        Ok(out) => {
            let detail = out.combined();
            logger.warn("container_remove", format!("removal of {} reported an error: {}", name, detail));
            StepResult::Failed(detail)
        }
        Err(e) => {
            logger.warn("container_remove", format!("removal of {} failed: {}", name, e));
            StepResult::Failed(e.to_string())
        }
    }
}

fn sweep(runtime: &dyn ContainerRuntime, name: &str, image: &str, logger: &Logger) -> Vec<String> {
    let residual = match runtime.list_instances(name, image) {
        Ok(names) => names,
        Err(e) => {
            logger.warn("container_sweep", format!("could not list residual instances: {}", e));
            return Vec::new();
        }
    };

    let mut swept = Vec::new();
    for instance in residual {
        match runtime.remove(&instance, true) {
            Ok(out) if out.success => {
                logger.info("container_sweep", format!("force-removed residual instance {}", instance));
                swept.push(instance);
            }
            Ok(out) => logger.warn(
                "container_sweep",
                format!("could not remove {}: {}", instance, out.combined()),
            ),
            Err(e) => logger.warn("container_sweep", format!("could not remove {}: {}", instance, e)),
        }
    }
    swept
}
