//! Log event structure

use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

// Process-wide caches, resolved on first access
static PROCESS_NAME: OnceLock<Option<String>> = OnceLock::new();
static HOSTNAME: OnceLock<Option<String>> = OnceLock::new();

/// Basename of the running executable
pub fn process_name() -> Option<String> {
    PROCESS_NAME
        .get_or_init(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
                .filter(|name| !name.is_empty())
        })
        .clone()
}

/// Hostname of the machine, if the OS reports one
pub fn hostname() -> Option<String> {
    HOSTNAME.get_or_init(lookup_hostname).clone()
}

fn lookup_hostname() -> Option<String> {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|name| !name.is_empty())
}

/// Strip directories from a source path
pub fn basename(file: &str) -> &str {
    Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file)
}

/// One log call as seen by every writer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl LogEvent {
    pub fn new(level: LogLevel, module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            module: module.into(),
            file: "__unknown__".to_string(),
            line: 0,
            message: message.into(),
            process: None,
            hostname: None,
        }
    }

    pub fn with_location(mut self, file: &str, line: u32) -> Self {
        self.file = basename(file).to_string();
        self.line = line;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach the cached process name and hostname
    pub fn with_origin(mut self) -> Self {
        self.process = process_name();
        self.hostname = hostname();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_basename() {
        let event = LogEvent::new(LogLevel::Info, "app", "hello")
            .with_location("src/server/handler.rs", 42);
        assert_eq!(event.file, "handler.rs");
        assert_eq!(event.line, 42);
    }

    #[test]
    fn test_origin_is_stable() {
        let a = LogEvent::new(LogLevel::Info, "app", "a").with_origin();
        let b = LogEvent::new(LogLevel::Info, "app", "b").with_origin();
        assert_eq!(a.process, b.process);
        assert_eq!(a.hostname, b.hostname);
    }

    #[test]
    fn test_hostname_is_never_empty() {
        assert_ne!(hostname().as_deref(), Some(""));
        assert_eq!(hostname(), lookup_hostname());
    }
}
