//! Main logger implementation

use super::{
    diagnostics,
    error::{LoggerError, Result},
    log_event::LogEvent,
    log_level::LogLevel,
    registry::WriterRegistry,
    writer::WriterDescriptor,
};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::fmt;
use std::panic::{self, Location};
use std::sync::Arc;

/// Dispatch state of a logger
///
/// A logger starts `Uninitialized` and becomes `Themed` on the first event
/// that passes its level filter. The writer snapshot taken at that point is
/// kept for the logger's lifetime.
enum DispatchState {
    Uninitialized,
    Themed(Vec<WriterDescriptor>),
}

/// Per-module logging front end
///
/// # Example
///
/// ```
/// use rust_logmanager::prelude::*;
///
/// let registry = WriterRegistry::builder().build();
/// let logger = registry.get_logger("server");
///
/// logger.info("Server started");
/// logger.set_level(LogLevel::Warning);
/// assert!(!logger.is_enabled(LogLevel::Info));
/// ```
pub struct Logger {
    name: String,
    level: RwLock<LogLevel>,
    registry: Arc<WriterRegistry>,
    dispatch: RwLock<DispatchState>,
}

impl Logger {
    #[must_use]
    pub fn new(name: impl Into<String>, level: LogLevel, registry: Arc<WriterRegistry>) -> Self {
        Self {
            name: name.into(),
            level: RwLock::new(level),
            registry,
            dispatch: RwLock::new(DispatchState::Uninitialized),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        *self.level.read()
    }

    /// Change the threshold; safe to call while other threads are logging
    pub fn set_level(&self, level: LogLevel) {
        *self.level.write() = level;
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Whether debug output is enabled for this logger
    pub fn is_debug_enabled(&self) -> bool {
        self.is_enabled(LogLevel::Debug)
    }

    /// Whether the writer snapshot has been taken
    pub fn is_themed(&self) -> bool {
        matches!(*self.dispatch.read(), DispatchState::Themed(_))
    }

    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if !self.is_enabled(level) {
            return;
        }
        self.dispatch(level, Location::caller(), message.into());
    }

    /// Log pre-captured format arguments; formatting only happens if `level` passes
    #[track_caller]
    pub fn log_fmt(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if !self.is_enabled(level) {
            return;
        }
        self.dispatch(level, Location::caller(), fmt::format(args));
    }

    fn dispatch(&self, level: LogLevel, location: &Location<'_>, message: String) {
        let event = LogEvent::new(level, self.name.as_str(), message)
            .with_location(location.file(), location.line())
            .with_origin();

        {
            let state = self.dispatch.read();
            if let DispatchState::Themed(descriptors) = &*state {
                Self::fan_out(descriptors, &event);
                return;
            }
        }

        let mut state = self.dispatch.write();
        if matches!(*state, DispatchState::Uninitialized) {
            *state = DispatchState::Themed(self.build_descriptors());
        }
        let state = RwLockWriteGuard::downgrade(state);
        if let DispatchState::Themed(descriptors) = &*state {
            Self::fan_out(descriptors, &event);
        }
    }

    fn build_descriptors(&self) -> Vec<WriterDescriptor> {
        self.registry
            .writers()
            .into_iter()
            .map(|writer| WriterDescriptor::new(writer, &self.name))
            .collect()
    }

    #[inline]
    fn fan_out(descriptors: &[WriterDescriptor], event: &LogEvent) {
        for descriptor in descriptors {
            descriptor.log(event);
        }
    }

    #[inline]
    #[track_caller]
    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message);
    }

    #[inline]
    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    #[inline]
    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) {
        self.log(LogLevel::Critical, message);
    }

    /// Render a value as JSON for a log message, never failing
    pub fn jsonify<T: Serialize + ?Sized>(&self, value: &T) -> String {
        serde_json::to_string(value).unwrap_or_else(|e| format!("ERRMARSHALLING={}", e))
    }

    /// Like [`jsonify`](Self::jsonify) with indentation
    pub fn jsonify_pretty<T: Serialize + ?Sized>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("ERRMARSHALLING={}", e))
    }

    /// Log the error of a failed result and report whether it failed
    ///
    /// ```
    /// # use rust_logmanager::prelude::*;
    /// # let logger = WriterRegistry::builder().build().get_logger("io");
    /// let result: std::result::Result<(), String> = Err("disk full".into());
    /// if logger.is_error(&result) {
    ///     // already logged
    /// }
    /// ```
    #[track_caller]
    pub fn is_error<T, E: fmt::Display>(&self, result: &std::result::Result<T, E>) -> bool {
        match result {
            Ok(_) => false,
            Err(e) => {
                self.log(LogLevel::Error, format!("Detected error: {}", e));
                true
            }
        }
    }

    /// Run `f`, turning a panic into a logged [`LoggerError::Panicked`]
    ///
    /// ```
    /// # use rust_logmanager::prelude::*;
    /// # let logger = WriterRegistry::builder().build().get_logger("worker");
    /// let err = logger.recover(|| panic!("oh no")).unwrap_err();
    /// assert_eq!(err.to_string(), "oh no");
    ///
    /// assert_eq!(logger.recover(|| 7).unwrap(), 7);
    /// ```
    #[track_caller]
    pub fn recover<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let location = Location::caller();
        match panic::catch_unwind(panic::AssertUnwindSafe(f)) {
            Ok(value) => Ok(value),
            Err(payload) => {
                let message = diagnostics::panic_message(payload.as_ref());
                if self.is_enabled(LogLevel::Error) {
                    self.dispatch(
                        LogLevel::Error,
                        location,
                        format!("Detected panic: {}", message),
                    );
                }
                Err(LoggerError::Panicked(message))
            }
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("themed", &self.is_themed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColorTheme, Writer};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingWriter {
        events: Mutex<Vec<LogEvent>>,
        themes_built: AtomicUsize,
    }

    impl Writer for RecordingWriter {
        fn build_theme(&self, module: &str) -> ColorTheme {
            self.themes_built.fetch_add(1, Ordering::SeqCst);
            ColorTheme {
                module: format!("<{}>", module),
                levels: Vec::new(),
            }
        }

        fn log(&self, event: &LogEvent, theme: &ColorTheme) {
            assert_eq!(theme.module, format!("<{}>", event.module));
            self.events.lock().push(event.clone());
        }
    }

    fn registry_with(writer: &Arc<RecordingWriter>) -> Arc<WriterRegistry> {
        let shared: Arc<dyn Writer> = Arc::clone(writer) as Arc<dyn Writer>;
        WriterRegistry::builder().shared_writer(shared).build()
    }

    #[test]
    fn test_level_filtering() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = registry_with(&writer).get_logger("filter");
        logger.set_level(LogLevel::Warning);

        logger.trace("t");
        logger.debug("d");
        logger.info("i");
        logger.warn("w");
        logger.error("e");
        logger.critical("c");

        let levels: Vec<LogLevel> = writer.events.lock().iter().map(|e| e.level).collect();
        assert_eq!(
            levels,
            vec![LogLevel::Warning, LogLevel::Error, LogLevel::Critical]
        );
    }

    #[test]
    fn test_filtered_event_does_not_theme() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = registry_with(&writer).get_logger("lazy");
        logger.set_level(LogLevel::Error);

        logger.info("dropped");
        assert!(!logger.is_themed());
        assert_eq!(writer.themes_built.load(Ordering::SeqCst), 0);

        logger.error("kept");
        assert!(logger.is_themed());
        assert_eq!(writer.themes_built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_theme_built_once_per_logger() {
        let writer = Arc::new(RecordingWriter::default());
        let registry = registry_with(&writer);
        let a = registry.get_logger("a");
        let b = registry.get_logger("b");

        for _ in 0..10 {
            a.info("x");
            b.info("y");
        }

        assert_eq!(writer.themes_built.load(Ordering::SeqCst), 2);
        assert_eq!(writer.events.lock().len(), 20);
    }

    #[test]
    fn test_call_site_is_captured() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = registry_with(&writer).get_logger("site");

        logger.info("here");
        let expected_line = line!() - 1;

        let events = writer.events.lock();
        assert_eq!(events[0].file, "logger.rs");
        assert_eq!(events[0].line, expected_line);
        assert_eq!(events[0].module, "site");
        assert_eq!(events[0].message, "here");
    }

    #[test]
    fn test_snapshot_ignores_later_install() {
        let first = Arc::new(RecordingWriter::default());
        let late = Arc::new(RecordingWriter::default());
        let registry = WriterRegistry::new();
        registry
            .install(vec![Arc::clone(&first) as Arc<dyn Writer>])
            .expect("install");

        let logger = registry.get_logger("snap");
        logger.info("one");

        // A second install is rejected, and the themed logger keeps its snapshot anyway
        assert!(registry
            .install(vec![Arc::clone(&late) as Arc<dyn Writer>])
            .is_err());
        logger.info("two");

        assert_eq!(first.events.lock().len(), 2);
        assert!(late.events.lock().is_empty());
    }

    #[test]
    fn test_concurrent_first_log_themes_once() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = Arc::new(registry_with(&writer).get_logger("race"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let logger = Arc::clone(&logger);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        logger.info(format!("{}-{}", i, j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("logging thread panicked");
        }

        assert_eq!(writer.themes_built.load(Ordering::SeqCst), 1);
        assert_eq!(writer.events.lock().len(), 400);
    }

    #[test]
    fn test_is_error_and_recover() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = registry_with(&writer).get_logger("errors");

        let ok: std::result::Result<u8, String> = Ok(1);
        let failed: std::result::Result<u8, String> = Err("boom".to_string());
        assert!(!logger.is_error(&ok));
        assert!(logger.is_error(&failed));

        let err = logger
            .recover(|| -> u8 { panic!("oh no") })
            .expect_err("panic should be recovered");
        assert!(matches!(err, LoggerError::Panicked(ref m) if m == "oh no"));
        assert_eq!(logger.recover(|| 5).expect("no panic"), 5);

        let messages: Vec<String> = writer
            .events
            .lock()
            .iter()
            .map(|e| e.message.clone())
            .collect();
        assert_eq!(
            messages,
            vec!["Detected error: boom".to_string(), "Detected panic: oh no".to_string()]
        );
    }

    #[test]
    fn test_jsonify() {
        let logger = WriterRegistry::builder().build().get_logger("json");
        assert_eq!(logger.jsonify(&vec![1, 2, 3]), "[1,2,3]");
        assert!(logger.jsonify_pretty(&vec![1]).contains('\n'));
    }
}
