//! Leveled log sinks handed to the client at construction
//!
//! [`TracingLogger`] is the default and forwards to `tracing`.
//! [`FileLogger`] writes a daily file under the storage root.
//! [`BufferLogger`] keeps lines in memory.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Destination for the client's log output
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    /// Plain progress output, such as the URL being called
    fn out(&self, message: &str);
}

/// Severity of a captured line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
    Out,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::Out => "OUT",
        }
    }
}

/// Forwards to the `tracing` macros
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn out(&self, message: &str) {
        tracing::debug!("{}", message);
    }
}

/// Appends to `Log--YYYY-MM-DD.log` inside a directory
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogger {
    /// Opens (or creates) today's log file in `dir`
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("Log--{}.log", Local::now().format("%Y-%m-%d")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, level: Level, message: &str) {
        let line = format!(
            "[{}] {}: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.label(),
            message
        );

        // A failed log write must never fail the request being logged
        if let Ok(mut file) = self.file.lock() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                tracing::warn!("Failed to write log file {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Logger for FileLogger {
    fn info(&self, message: &str) {
        self.write(Level::Info, message);
    }

    fn error(&self, message: &str) {
        self.write(Level::Error, message);
    }

    fn out(&self, message: &str) {
        self.write(Level::Out, message);
    }
}

/// In-memory capture of log lines
#[derive(Debug, Default)]
pub struct BufferLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl BufferLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines, oldest first
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Messages captured at a given level
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(captured, _)| *captured == level)
            .map(|(_, message)| message)
            .collect()
    }

    /// True if any captured line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(_, message)| message.contains(needle))
    }

    fn push(&self, level: Level, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }
}

impl Logger for BufferLogger {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }

    fn out(&self, message: &str) {
        self.push(Level::Out, message);
    }
}

/// A sink plus the `[prefix] ` applied to every line
#[derive(Clone)]
pub struct LogHandle {
    sink: Arc<dyn Logger>,
    prefix: String,
}

impl LogHandle {
    pub fn new(sink: Arc<dyn Logger>, prefix: impl Into<String>) -> Self {
        Self {
            sink,
            prefix: prefix.into(),
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.sink.info(&self.prefixed(message.as_ref()));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.sink.error(&self.prefixed(message.as_ref()));
    }

    pub fn out(&self, message: impl AsRef<str>) {
        self.sink.out(&self.prefixed(message.as_ref()));
    }

    fn prefixed(&self, message: &str) -> String {
        format!("{}{}", self.prefix, message)
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
