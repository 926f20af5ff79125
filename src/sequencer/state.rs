//! Sequencer states and run outcomes

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{PodError, EXIT_SIGNAL};

/// Lifecycle of one `start` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequencerState {
    Init,
    Preparing,
    Starting,
    Polling,
    Ready,
    Session,
    Cleanup,
    Done,
}

impl SequencerState {
    /// Whether moving from `self` to `next` is a legal edge
    pub fn can_transition_to(self, next: SequencerState) -> bool {
        use SequencerState::*;
        match (self, next) {
            (Init, Preparing)
            | (Preparing, Starting)
            | (Starting, Polling)
            | (Polling, Ready)
            | (Ready, Session)
            | (Session, Cleanup)
            | (Cleanup, Done) => true,
            (Done, _) | (Cleanup, _) => false,
            // Error edge
            (_, Cleanup) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SequencerState::Init => "INIT",
            SequencerState::Preparing => "PREPARING",
            SequencerState::Starting => "STARTING",
            SequencerState::Polling => "POLLING",
            SequencerState::Ready => "READY",
            SequencerState::Session => "SESSION",
            SequencerState::Cleanup => "CLEANUP",
            SequencerState::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// Readiness of the workload as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Starting,
    Ready,
    Unhealthy,
    TimedOut,
}

/// Which surface the caller attaches to once the workload is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// The workload's primary interactive program
    #[default]
    Interactive,
    /// A general-purpose shell inside the same instance
    Diagnostic,
}

impl FromStr for SessionMode {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(SessionMode::Interactive),
            "diagnostic" => Ok(SessionMode::Diagnostic),
            other => Err(PodError::InvalidConfig(format!(
                "unknown mode '{}' (expected interactive or diagnostic)",
                other
            ))),
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Interactive => f.write_str("interactive"),
            SessionMode::Diagnostic => f.write_str("diagnostic"),
        }
    }
}

/// Why the run reached CLEANUP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// The attached surface exited on its own
    Normal { status: Option<i32> },
    /// Interrupt or terminate signal
    Signal,
    /// The workload stopped while a session was attached
    WorkloadDied,
    /// Readiness polling exhausted its budget
    TimedOut { attempts: u32 },
    /// The start operation itself failed
    StartFailed(String),
    /// The container engine could not be driven
    Error(String),
}

impl RunEnd {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunEnd::Normal { .. } => 0,
            RunEnd::Signal => EXIT_SIGNAL,
            _ => 1,
        }
    }
}

/// Final result of a sequencer run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub final_state: SequencerState,
    pub end: RunEnd,
    pub health: HealthState,
    /// Every state entered, in order
    pub history: Vec<SequencerState>,
    /// Instances still present after cleanup
    pub remaining: Vec<String>,
    /// Cleanup could confirm what was left
    pub cleanup_verified: bool,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        let code = self.end.exit_code();
        if code == 0 && (!self.remaining.is_empty() || !self.cleanup_verified) {
            1
        } else {
            code
        }
    }
}
