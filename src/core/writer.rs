//! Writer trait for log output destinations

use super::log_event::LogEvent;
use super::log_level::LogLevel;
use std::sync::Arc;

/// Pre-rendered display strings for one module
///
/// Writers that do not color their output return `ColorTheme::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorTheme {
    pub module: String,
    pub levels: Vec<String>,
}

impl ColorTheme {
    pub fn is_empty(&self) -> bool {
        self.module.is_empty() && self.levels.is_empty()
    }

    /// Rendered name for `level`, falling back to the plain name
    pub fn level<'a>(&'a self, level: LogLevel) -> &'a str {
        self.levels
            .get(level.index())
            .map(String::as_str)
            .unwrap_or_else(|| level.to_str())
    }

    /// Rendered module name, falling back to `module`
    pub fn module<'a>(&'a self, module: &'a str) -> &'a str {
        if self.module.is_empty() {
            module
        } else {
            &self.module
        }
    }
}

/// Something that accepts log events and sends them somewhere
///
/// `log` must return promptly: writers that cannot take an event right away
/// either buffer it in a bounded structure or drop it.
pub trait Writer: Send + Sync {
    /// Build the display theme for a module. Must be deterministic.
    fn build_theme(&self, module: &str) -> ColorTheme;

    fn log(&self, event: &LogEvent, theme: &ColorTheme);
}

/// A writer paired with the theme it built for one logger
#[derive(Clone)]
pub struct WriterDescriptor {
    pub writer: Arc<dyn Writer>,
    pub theme: ColorTheme,
}

impl WriterDescriptor {
    pub fn new(writer: Arc<dyn Writer>, module: &str) -> Self {
        let theme = writer.build_theme(module);
        Self { writer, theme }
    }

    #[inline]
    pub fn log(&self, event: &LogEvent) {
        self.writer.log(event, &self.theme);
    }
}
