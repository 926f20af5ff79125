//! Agentpod - container lifecycle orchestration for an agent workload
//!
//! Agentpod resolves credentials, builds the workload image, starts it,
//! polls it until ready, attaches an interactive or diagnostic session and
//! always tears the instance down afterwards. A separate verification suite
//! checks a running workload.
//!
//! # Example
//!
//! ```no_run
//! use agentpod::{CancelToken, DockerCli, LogConfig, LogLevel, Logger, Sequencer, SequencerConfig, SessionMode};
//!
//! let logger = Logger::new(LogConfig::console_only(LogLevel::Info));
//! let runtime = DockerCli::default();
//! let config = SequencerConfig::new("agentpod", "agentpod:latest");
//! let outcome = Sequencer::new(config, &runtime, &logger, CancelToken::new()).run(SessionMode::Interactive);
//! std::process::exit(outcome.exit_code());
//! ```

pub mod builder;
pub mod cli;
pub mod environment;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod sequencer;
pub mod verifier;

pub use builder::{BuildOptions, Builder, PushOutcome};
pub use environment::{resolve, RuntimeEnvironment, SecretOverrides};
pub use error::{PodError, Result};
pub use logging::{LogConfig, LogLevel, LogRecord, Logger};
pub use runtime::{ContainerRuntime, DockerCli, WorkloadHandle};
pub use sequencer::{
    CancelToken, HealthState, RunEnd, RunOutcome, Sequencer, SequencerConfig, SequencerState, SessionMode,
};
pub use verifier::{SuiteConfig, VerificationReport, Verifier};
