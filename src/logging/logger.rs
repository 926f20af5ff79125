//! Structured logger with a JSON-lines file sink and a console sink
//!
//! A single [`Logger`] is constructed at program start and passed by
//! reference to every component. Writing never fails from the caller's point
//! of view: if the file sink breaks, the logger falls back to console-only
//! output for the rest of the run and says so once.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::record::{LogLevel, LogRecord};
use crate::error::Result;

/// Default log file name inside the log directory
pub const LOG_FILE_NAME: &str = "agentpod.log";

/// Logger configuration, fixed for the lifetime of the run
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level written to the console
    pub console_level: LogLevel,
    /// Minimum level written to the file sink
    pub file_level: LogLevel,
    /// Path of the JSON-lines file sink
    pub file_path: Option<PathBuf>,
    pub enable_file: bool,
    pub enable_console: bool,
    /// Emit ANSI colors on the console
    pub color: bool,
}

impl LogConfig {
    /// Build a configuration with the same minimum level for both sinks
    pub fn new(min_level: LogLevel, log_dir: Option<&Path>, enable_file: bool, enable_console: bool) -> Self {
        Self {
            console_level: min_level,
            file_level: min_level,
            file_path: log_dir.map(|d| d.join(LOG_FILE_NAME)),
            enable_file: enable_file && log_dir.is_some(),
            enable_console,
            color: enable_console && stderr_is_terminal(),
        }
    }

    /// Console-only configuration, mostly useful in tests
    pub fn console_only(min_level: LogLevel) -> Self {
        Self::new(min_level, None, false, true)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::console_only(LogLevel::Info)
    }
}

fn stderr_is_terminal() -> bool {
    // SAFETY: isatty only inspects the descriptor
    unsafe { libc::isatty(libc::STDERR_FILENO) == 1 }
}

struct SinkState {
    file: Option<File>,
    /// File sink failed at some point; never retried
    downgraded: bool,
    last_timestamp: Option<DateTime<Utc>>,
    console: Box<dyn Write + Send>,
}

/// Process-wide structured logger
pub struct Logger {
    config: LogConfig,
    state: Mutex<SinkState>,
}

impl Logger {
    /// Create a logger writing its console projection to stderr
    pub fn new(config: LogConfig) -> Self {
        Self::with_console(config, Box::new(io::stderr()))
    }

    /// Create a logger with a custom console writer
    pub fn with_console(config: LogConfig, console: Box<dyn Write + Send>) -> Self {
        Self {
            config,
            state: Mutex::new(SinkState {
                file: None,
                downgraded: false,
                last_timestamp: None,
                console,
            }),
        }
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Path of the file sink; `None` when the file sink is disabled
    pub fn file_path(&self) -> Option<&Path> {
        if !self.config.enable_file {
            return None;
        }
        self.config.file_path.as_deref()
    }

    /// Whether the file sink has been abandoned after a write failure
    pub fn is_downgraded(&self) -> bool {
        self.lock().downgraded
    }

    /// Emit a record. Never fails.
    #[track_caller]
    pub fn emit(&self, level: LogLevel, operation: &str, message: impl AsRef<str>) {
        let location = Location::caller();
        self.emit_at(level, operation, message.as_ref(), location);
    }

    #[track_caller]
    pub fn debug(&self, operation: &str, message: impl AsRef<str>) {
        self.emit_at(LogLevel::Debug, operation, message.as_ref(), Location::caller());
    }

    #[track_caller]
    pub fn info(&self, operation: &str, message: impl AsRef<str>) {
        self.emit_at(LogLevel::Info, operation, message.as_ref(), Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, operation: &str, message: impl AsRef<str>) {
        self.emit_at(LogLevel::Warn, operation, message.as_ref(), Location::caller());
    }

    #[track_caller]
    pub fn error(&self, operation: &str, message: impl AsRef<str>) {
        self.emit_at(LogLevel::Error, operation, message.as_ref(), Location::caller());
    }

    #[track_caller]
    pub fn fatal(&self, operation: &str, message: impl AsRef<str>) {
        self.emit_at(LogLevel::Fatal, operation, message.as_ref(), Location::caller());
    }

    fn emit_at(&self, level: LogLevel, operation: &str, message: &str, location: &Location<'_>) {
        let mut state = self.lock();
        let record = LogRecord {
            timestamp: next_timestamp(&mut state),
            level,
            operation: if operation.is_empty() { "general".to_string() } else { operation.to_string() },
            message: if message.is_empty() { "(empty)".to_string() } else { message.to_string() },
            source: format!("{}:{}", location.file(), location.line()),
        };
        self.write_record(&mut state, &record);
    }

    fn write_record(&self, state: &mut SinkState, record: &LogRecord) {
        let fatal = record.level == LogLevel::Fatal;

        if self.config.enable_file && !state.downgraded && (fatal || record.level >= self.config.file_level) {
            if let Err(e) = self.append_to_file(state, record) {
                state.downgraded = true;
                state.file = None;
                let warning = LogRecord {
                    timestamp: next_timestamp(state),
                    level: LogLevel::Warn,
                    operation: "logger".to_string(),
                    message: format!("log file unavailable, continuing with console output only: {}", e),
                    source: format!("{}:{}", file!(), line!()),
                };
                self.write_console(state, &warning, true);
            }
        }

        let console_wanted = self.config.enable_console && record.level >= self.config.console_level;
        if fatal || console_wanted {
            self.write_console(state, record, false);
        }
    }

    fn append_to_file(&self, state: &mut SinkState, record: &LogRecord) -> io::Result<()> {
        if state.file.is_none() {
            let path = self
                .config
                .file_path
                .as_deref()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no log file configured"))?;
            state.file = Some(open_append(path)?);
        }
        let mut line = record.to_json_line();
        line.push('\n');
        match state.file.as_mut() {
            Some(file) => file.write_all(line.as_bytes()),
            None => Ok(()),
        }
    }

    fn write_console(&self, state: &mut SinkState, record: &LogRecord, force: bool) {
        if !force && !self.config.enable_console && record.level != LogLevel::Fatal {
            return;
        }
        let line = record.to_console_line(self.config.color);
        // Nothing sensible left to do if the terminal is gone
        let _ = writeln!(state.console, "{}", line);
    }

    /// Flush and close the file sink
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if let Some(mut file) = state.file.take() {
            let _ = file.flush();
            let _ = file.sync_all();
        }
        let _ = state.console.flush();
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        // A poisoned logger is still usable; the state is plain data
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("config", &self.config).finish()
    }
}

fn next_timestamp(state: &mut SinkState) -> DateTime<Utc> {
    let now = Utc::now();
    let ts = match state.last_timestamp {
        Some(last) if last > now => last,
        _ => now,
    };
    state.last_timestamp = Some(ts);
    ts
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Read every record from a JSON-lines log file, skipping unparseable lines
pub fn read_records(path: &Path) -> Result<Vec<LogRecord>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| LogRecord::from_json_line(l).ok())
        .collect())
}

/// Last `n` records of a log file
pub fn tail_records(path: &Path, n: usize) -> Result<Vec<LogRecord>> {
    let mut records = read_records(path)?;
    let skip = records.len().saturating_sub(n);
    Ok(records.split_off(skip))
}

/// Cloneable in-memory writer, handy for capturing console output
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(|p| p.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
