//! Destinations for the event log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Tracing target event lines are emitted under by [`TracingSink`].
pub const EVENT_LOG_TARGET: &str = "pagebeacon::events";

/// Append-only destination for event log lines.
pub trait EventSink: Send + Sync {
    /// Append one line. The sink adds the line terminator.
    fn write_line(&self, line: &str) -> Result<(), SinkError>;
}

/// Event log errors.
#[derive(Debug)]
pub enum SinkError {
    Io(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "Event log write failed: {e}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Appends event lines to a file.
///
/// Each line goes out in a single append write, so concurrent requests do
/// not interleave within a line.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Open (or create) the log file for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Io(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::Io(format!("{}: {e}", path.display())))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileSink {
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        (&self.file)
            .write_all(buf.as_bytes())
            .map_err(|e| SinkError::Io(e.to_string()))
    }
}

/// Emits event lines through `tracing`, for deployments that ship the
/// process output to a log pipeline.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        tracing::info!(target: EVENT_LOG_TARGET, "{}", line);
        Ok(())
    }
}

/// Keeps event lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every line written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
        Ok(())
    }
}
