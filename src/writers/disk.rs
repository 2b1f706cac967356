//! Disk writer with time-based log rotation
//!
//! Lines are formatted on the caller's thread and handed to a single worker
//! thread through a bounded channel. The worker owns the file handle and is
//! the only place rotation happens.

use super::worker::{self, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::core::{
    diagnostics, ColorTheme, LogEvent, LogLevel, LoggerError, Result, Writer, WriterMetrics,
};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const COMPONENT: &str = "DiskWriter";

/// Configuration for [`DiskWriter`]
///
/// # Examples
///
/// ```
/// use rust_logmanager::writers::DiskWriterConfig;
/// use std::time::Duration;
///
/// // Rotate hourly, keep the active file plus 23 previous generations
/// let config = DiskWriterConfig::new()
///     .with_rotate_duration(Duration::from_secs(3600))
///     .with_maximum_log_files(24);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskWriterConfig {
    /// Time after which the active file is rotated
    pub rotate_duration: Duration,
    /// Files kept on disk, the active one included
    pub maximum_log_files: usize,
    /// Lines buffered between callers and the worker
    pub buffer_size: usize,
}

impl Default for DiskWriterConfig {
    fn default() -> Self {
        Self {
            rotate_duration: Duration::from_secs(24 * 3600),
            maximum_log_files: 7,
            buffer_size: 10_000,
        }
    }
}

impl DiskWriterConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_rotate_duration(mut self, duration: Duration) -> Self {
        self.rotate_duration = duration;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_maximum_log_files(mut self, count: usize) -> Self {
        self.maximum_log_files = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

/// Format a disk line: `HH:MM:SS <level> <module> <file>:<line> <message>`
pub fn format_line(event: &LogEvent) -> String {
    format!(
        "{} {} {} {}:{} {}\n",
        event.timestamp.format("%H:%M:%S"),
        event.level.to_str(),
        event.module,
        event.file,
        event.line,
        event.message
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    /// Rotate before the next write (initial state)
    Due,
    At(Instant),
    Never,
}

/// Active log file plus its retained generations, owned by the worker
struct RotatingFile {
    path: PathBuf,
    rotate_duration: Duration,
    maximum_log_files: usize,
    file: Option<File>,
    rotation: Rotation,
    metrics: Arc<WriterMetrics>,
}

impl RotatingFile {
    fn new(path: PathBuf, config: &DiskWriterConfig, metrics: Arc<WriterMetrics>) -> Self {
        Self {
            path,
            rotate_duration: config.rotate_duration,
            maximum_log_files: config.maximum_log_files.max(1),
            file: None,
            rotation: Rotation::Due,
            metrics,
        }
    }

    fn rotation_due(&self, now: Instant) -> bool {
        match self.rotation {
            Rotation::Due => true,
            Rotation::At(at) => now >= at,
            Rotation::Never => false,
        }
    }

    fn write_line(&mut self, line: &str) {
        let now = Instant::now();
        if self.rotation_due(now) {
            // Close the handle so the renamed generation is not written to
            self.file = None;
            match self.rotate() {
                Ok(()) => {
                    self.rotation = match now.checked_add(self.rotate_duration) {
                        Some(at) => Rotation::At(at),
                        None => Rotation::Never,
                    };
                }
                Err(e) => {
                    self.metrics.record_failure();
                    diagnostics::warn(COMPONENT, format!("could not create logfile: {}", e));
                    return;
                }
            }
        }

        if self.file.is_none() {
            match OpenOptions::new().append(true).create(true).open(&self.path) {
                Ok(file) => self.file = Some(file),
                Err(e) => {
                    self.metrics.record_failure();
                    diagnostics::warn(
                        COMPONENT,
                        format!("could not open logfile for appending: {}", e),
                    );
                    return;
                }
            }
        }

        if let Some(file) = self.file.as_mut() {
            match file.write_all(line.as_bytes()) {
                Ok(()) => {
                    self.metrics.record_delivered(1);
                }
                Err(e) => {
                    self.metrics.record_failure();
                    diagnostics::warn(COMPONENT, format!("error writing logfile: {}", e));
                }
            }
        }
    }

    /// Shift every generation up by one and start a fresh active file
    ///
    /// Generations whose new index would reach `maximum_log_files` are deleted.
    fn rotate(&self) -> Result<()> {
        if self.path.exists() {
            let generations = self.existing_generations();

            for index in (0..=generations).rev() {
                let from = self.generation_path(index);
                if index + 1 >= self.maximum_log_files {
                    fs::remove_file(&from).map_err(|e| {
                        LoggerError::io_operation(
                            "rotating log files",
                            format!("failed to remove '{}'", from.display()),
                            e,
                        )
                    })?;
                } else {
                    let to = self.generation_path(index + 1);
                    fs::rename(&from, &to).map_err(|e| {
                        LoggerError::io_operation(
                            "rotating log files",
                            format!("failed to rename '{}' to '{}'", from.display(), to.display()),
                            e,
                        )
                    })?;
                }
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "create log directory",
                    format!("failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        File::create(&self.path).map_err(|e| {
            LoggerError::io_operation(
                "create log file",
                format!("failed to create '{}'", self.path.display()),
                e,
            )
        })?;

        Ok(())
    }

    /// Number of consecutive generations `path.1`, `path.2`, ... on disk
    fn existing_generations(&self) -> usize {
        (1..)
            .take_while(|&index| self.generation_path(index).exists())
            .count()
    }

    /// `path` for index 0, `path.N` otherwise
    fn generation_path(&self, index: usize) -> PathBuf {
        if index == 0 {
            return self.path.clone();
        }
        let mut path = self.path.clone();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app.log".to_string());
        path.set_file_name(format!("{}.{}", filename, index));
        path
    }

    fn run(mut self, receiver: Receiver<String>) {
        for line in receiver.iter() {
            self.write_line(&line);
        }
    }
}

/// Append-only file writer with time-based rotation
///
/// Events below `Debug` are ignored. When the buffer is full, lines are
/// dropped with a diagnostic on stderr rather than blocking the caller.
///
/// # Examples
///
/// ```no_run
/// use rust_logmanager::writers::{DiskWriter, DiskWriterConfig};
/// use std::time::Duration;
///
/// let writer = DiskWriter::new(
///     "/var/log/app.log",
///     DiskWriterConfig::new()
///         .with_rotate_duration(Duration::from_secs(3600))
///         .with_maximum_log_files(24),
/// )
/// .expect("Failed to start disk writer");
///
/// // ... register with a WriterRegistry, log ...
///
/// writer.close();
/// ```
pub struct DiskWriter {
    path: PathBuf,
    sender: RwLock<Option<Sender<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<WriterMetrics>,
}

impl DiskWriter {
    /// Start a disk writer and its worker thread
    ///
    /// The file is created lazily by the worker on the first line.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the worker cannot be spawned
    pub fn new<P: AsRef<Path>>(path: P, config: DiskWriterConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.file_name().is_none() {
            return Err(LoggerError::config(
                COMPONENT,
                format!("'{}' is not a file path", path.display()),
            ));
        }
        if config.buffer_size == 0 {
            return Err(LoggerError::config(COMPONENT, "buffer_size must be at least 1"));
        }

        let (sender, receiver) = bounded(config.buffer_size);
        let metrics = Arc::new(WriterMetrics::new());
        let file = RotatingFile::new(path.clone(), &config, Arc::clone(&metrics));
        let handle = worker::spawn("logmanager-disk", move || file.run(receiver))?;

        Ok(Self {
            path,
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            metrics,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metrics(&self) -> &WriterMetrics {
        &self.metrics
    }

    /// Stop accepting lines and wait for the worker to write what it has
    pub fn close(&self) -> bool {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Like [`close`](Self::close) with a custom timeout
    pub fn shutdown(&self, timeout: Duration) -> bool {
        drop(self.sender.write().take());

        match self.worker.lock().take() {
            Some(handle) => worker::join_with_timeout(handle, timeout, COMPONENT),
            None => true,
        }
    }
}

impl Writer for DiskWriter {
    fn build_theme(&self, _module: &str) -> ColorTheme {
        ColorTheme::default()
    }

    fn log(&self, event: &LogEvent, _theme: &ColorTheme) {
        if event.level < LogLevel::Debug {
            return;
        }

        let line = format_line(event);
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return;
        };

        match sender.try_send(line) {
            Ok(()) => {
                self.metrics.record_accepted();
            }
            Err(TrySendError::Full(_)) => {
                diagnostics::drop_with_alert(
                    COMPONENT,
                    &self.metrics,
                    "could not log to logfile, buffer full",
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                // Worker gone, shutting down
            }
        }
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn event(level: LogLevel, message: &str) -> LogEvent {
        LogEvent::new(level, "logmanager", message).with_location("disk_test.rs", 32)
    }

    #[test]
    fn test_format_line() {
        let event = event(LogLevel::Warning, "disk almost full")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 9, 17, 4, 5).unwrap());
        assert_eq!(
            format_line(&event),
            "17:04:05 warn logmanager disk_test.rs:32 disk almost full\n"
        );
    }

    #[test]
    fn test_first_line_creates_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let log_path = dir.path().join("nested").join("logfile.log");

        let writer = DiskWriter::new(&log_path, DiskWriterConfig::default()).expect("writer");
        writer.log(&event(LogLevel::Info, "hello"), &ColorTheme::default());
        assert!(writer.close());

        let content = fs::read_to_string(&log_path).expect("Failed to read log file");
        assert!(content.contains("hello"));
        assert!(!dir.path().join("nested").join("logfile.log.1").exists());
        assert_eq!(writer.metrics().delivered_count(), 1);
    }

    #[test]
    fn test_trace_is_ignored() {
        let dir = tempdir().expect("Failed to create temp dir");
        let log_path = dir.path().join("levels.log");

        let writer = DiskWriter::new(&log_path, DiskWriterConfig::default()).expect("writer");
        writer.log(&event(LogLevel::Trace, "too chatty"), &ColorTheme::default());
        writer.log(&event(LogLevel::Debug, "debug line"), &ColorTheme::default());
        assert!(writer.close());

        let content = fs::read_to_string(&log_path).expect("Failed to read log file");
        assert!(!content.contains("too chatty"));
        assert!(content.contains("debug line"));
    }

    #[test]
    fn test_existing_file_rotates_on_restart() {
        let dir = tempdir().expect("Failed to create temp dir");
        let log_path = dir.path().join("restart.log");
        fs::write(&log_path, "previous run\n").expect("seed log file");

        let writer = DiskWriter::new(&log_path, DiskWriterConfig::default()).expect("writer");
        writer.log(&event(LogLevel::Info, "new run"), &ColorTheme::default());
        assert!(writer.close());

        let current = fs::read_to_string(&log_path).expect("read current");
        let previous = fs::read_to_string(dir.path().join("restart.log.1")).expect("read .1");
        assert!(current.contains("new run"));
        assert!(!current.contains("previous run"));
        assert!(previous.contains("previous run"));
    }

    #[test]
    fn test_single_file_retention() {
        let dir = tempdir().expect("Failed to create temp dir");
        let log_path = dir.path().join("single.log");
        fs::write(&log_path, "old\n").expect("seed log file");

        let config = DiskWriterConfig::new().with_maximum_log_files(1);
        let writer = DiskWriter::new(&log_path, config).expect("writer");
        writer.log(&event(LogLevel::Info, "fresh"), &ColorTheme::default());
        assert!(writer.close());

        assert!(!dir.path().join("single.log.1").exists());
        let content = fs::read_to_string(&log_path).expect("read");
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("fresh"));
    }

    #[test]
    fn test_log_after_close_is_ignored() {
        let dir = tempdir().expect("Failed to create temp dir");
        let writer =
            DiskWriter::new(dir.path().join("closed.log"), DiskWriterConfig::default()).expect("writer");
        assert!(writer.close());

        writer.log(&event(LogLevel::Error, "late"), &ColorTheme::default());
        assert_eq!(writer.metrics().accepted_count(), 0);
        assert!(writer.close());
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().expect("Failed to create temp dir");
        let zero_buffer = DiskWriterConfig::new().with_buffer_size(0);
        assert!(DiskWriter::new(dir.path().join("x.log"), zero_buffer).is_err());
        assert!(DiskWriter::new("/", DiskWriterConfig::default()).is_err());
    }

    #[test]
    fn test_generation_paths() {
        let metrics = Arc::new(WriterMetrics::new());
        let file = RotatingFile::new(
            PathBuf::from("/var/log/app.log"),
            &DiskWriterConfig::default(),
            metrics,
        );
        assert_eq!(file.generation_path(0), PathBuf::from("/var/log/app.log"));
        assert_eq!(file.generation_path(3), PathBuf::from("/var/log/app.log.3"));
    }
}
