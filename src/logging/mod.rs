//! Structured logging for Agentpod
//!
//! Every component receives a `&Logger`. Records go to an append-only
//! JSON-lines file and to a colored, single-line console projection.

mod logger;
mod record;

pub use logger::{read_records, tail_records, LogConfig, Logger, SharedBuffer, LOG_FILE_NAME};
pub use record::{escape_single_line, LogLevel, LogRecord};
