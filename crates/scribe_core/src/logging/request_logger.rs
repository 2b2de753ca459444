//! Per-request logger with file output and a tool-output tail.
//!
//! Each transcription request gets its own logger that:
//! - Writes to a dedicated log file (optional)
//! - Mirrors every line to `tracing`
//! - Maintains a tail buffer of tool diagnostics for error reports

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, MessagePrefix};

/// Logger scoped to one transcription request.
///
/// Nothing here is shared between requests.
pub struct RequestLogger {
    request_id: String,
    log_path: Option<PathBuf>,
    file_writer: Mutex<Option<BufWriter<File>>>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
}

impl RequestLogger {
    /// Create a logger that writes `<log_dir>/<request_id>.log`.
    pub fn new(
        request_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
    ) -> std::io::Result<Self> {
        let request_id = request_id.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&request_id)));
        let file = File::create(&log_path)?;

        Ok(Self {
            request_id,
            log_path: Some(log_path),
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
        })
    }

    /// Create a logger that only mirrors to `tracing`.
    pub fn tracing_only(request_id: impl Into<String>, config: LogConfig) -> Self {
        Self {
            request_id: request_id.into(),
            log_path: None,
            file_writer: Mutex::new(None),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
        }
    }

    /// Request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Path of the log file, if one is written.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(request = %self.request_id, "{}", message),
            LogLevel::Debug => tracing::debug!(request = %self.request_id, "{}", message),
            LogLevel::Info => tracing::info!(request = %self.request_id, "{}", message),
            LogLevel::Warn => tracing::warn!(request = %self.request_id, "{}", message),
            LogLevel::Error => tracing::error!(request = %self.request_id, "{}", message),
        }

        if level < self.config.level {
            return;
        }
        self.write_line(message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log a tool command line.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Debug, &MessagePrefix::Command.format(command));
    }

    /// Log an orchestrator state transition.
    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(phase_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Record diagnostic output from an external tool.
    ///
    /// Lines go to the tail buffer only; `show_tail` writes them out.
    pub fn output_line(&self, line: &str) {
        if self.config.error_tail == 0 {
            return;
        }
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail {
            buffer.pop_front();
        }
        buffer.push_back(line.to_string());
    }

    /// Record the trailing lines of a tool's stderr.
    pub fn output_tail(&self, text: &str) {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = lines.len().saturating_sub(self.config.error_tail);
        for line in &lines[skip..] {
            self.output_line(line);
        }
    }

    /// Write the tail buffer out (typically after an error).
    pub fn show_tail(&self, header: &str) {
        let lines: Vec<String> = self.tail_buffer.lock().iter().cloned().collect();
        if lines.is_empty() {
            return;
        }
        self.log(LogLevel::Error, &format!("[{}/tail]", header));
        for line in &lines {
            self.log(LogLevel::Error, line);
        }
    }

    /// Current tail buffer contents.
    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    /// Flush the log file.
    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    fn write_line(&self, message: &str) {
        let mut guard = self.file_writer.lock();
        let Some(writer) = guard.as_mut() else {
            return;
        };
        let line = if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        };
        let _ = writeln!(writer, "{}", line);
    }
}

impl Drop for RequestLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_log_file() {
        let dir = tempdir().unwrap();
        let logger = RequestLogger::new("req-1", dir.path(), LogConfig::default()).unwrap();

        let path = logger.log_path().unwrap();
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with("req-1.log"));
    }

    #[test]
    fn writes_phases_and_filters_debug() {
        let dir = tempdir().unwrap();
        let logger = RequestLogger::new("req-2", dir.path(), LogConfig::default()).unwrap();

        logger.phase("Probing input");
        logger.debug("hidden at info level");
        logger.flush();

        let content = fs::read_to_string(logger.log_path().unwrap()).unwrap();
        assert!(content.contains("=== Probing input ==="));
        assert!(!content.contains("hidden at info level"));
    }

    #[test]
    fn tracing_only_has_no_file() {
        let logger = RequestLogger::tracing_only("req-3", LogConfig::default());
        logger.info("still fine");
        assert!(logger.log_path().is_none());
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let config = LogConfig {
            error_tail: 5,
            ..Default::default()
        };
        let logger = RequestLogger::tracing_only("req-4", config);

        for i in 0..10 {
            logger.output_line(&format!("Line {}", i));
        }

        let tail = logger.get_tail();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "Line 5");
        assert_eq!(tail[4], "Line 9");
    }

    #[test]
    fn output_tail_keeps_last_nonempty_lines() {
        let config = LogConfig {
            error_tail: 2,
            ..Default::default()
        };
        let logger = RequestLogger::tracing_only("req-5", config);
        logger.output_tail("first\n\nsecond\nthird\n");
        assert_eq!(logger.get_tail(), vec!["second", "third"]);
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("normal_name"), "normal_name");
        assert_eq!(sanitize_filename("has/slash"), "has_slash");
        assert_eq!(sanitize_filename("a<b>c"), "a_b_c");
    }
}
