//! Log record and level definitions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::PodError;

/// Severity of a log record, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// ANSI color escape used for the console projection
    pub fn color(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[2m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[1;41m",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(PodError::InvalidConfig(format!("unknown log level '{}'", other))),
        }
    }
}

/// One structured log entry. Serialized as a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub operation: String,
    pub message: String,
    /// Originating `file:line`
    pub source: String,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl LogRecord {
    /// Encode as one line of JSON (no trailing newline)
    pub fn to_json_line(&self) -> String {
        // Serializing plain strings and a timestamp cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"operation\":\"logger\",\"message\":\"unserializable record\"}}",
                self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                self.level
            )
        })
    }

    /// Parse a line previously produced by [`LogRecord::to_json_line`]
    pub fn from_json_line(line: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Single-line, timestamp-prefixed projection for the terminal
    pub fn to_console_line(&self, color: bool) -> String {
        let time = self.timestamp.format("%H:%M:%S%.3f");
        let message = escape_single_line(&self.message);
        if color {
            format!(
                "[{}] {}{:<5}\x1b[0m {}: {}",
                time,
                self.level.color(),
                self.level.as_str(),
                self.operation,
                message
            )
        } else {
            format!("[{}] {:<5} {}: {}", time, self.level.as_str(), self.operation, message)
        }
    }
}

/// Escape newlines, backslashes and control characters so text stays on one line
pub fn escape_single_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\u{{{:04x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
