//! Environment-driven configuration
//!
//! All options are read through a lookup function so tests can inject
//! values without touching the process environment.

use super::diagnostics;
use super::log_level::LogLevel;

/// Colon-separated `module=level` list, e.g. `<root>=warn:db=debug:db.pool=trace`
pub const LEVELS_ENV: &str = "LOGMANAGER_LEVELS";
pub const REMOTE_URL_ENV: &str = "LOGMANAGER_REMOTE_URL";
pub const REMOTE_TOKEN_ENV: &str = "LOGMANAGER_REMOTE_TOKEN";
pub const REMOTE_DATASET_ENV: &str = "LOGMANAGER_REMOTE_DATASET";
pub const REMOTE_VERBOSE_ENV: &str = "LOGMANAGER_REMOTE_VERBOSE";
pub const COLORED_OUTPUT_ENV: &str = "LOGMANAGER_COLORED_OUTPUT";

/// Module name that sets the default level
pub const ROOT_MODULE: &str = "<root>";
pub const DEFAULT_DATASET: &str = "logs";

/// Per-module level overrides
///
/// The longest module prefix matching a logger name wins; `<root>` applies
/// when nothing else matches.
///
/// # Example
///
/// ```
/// use rust_logmanager::{LogLevel, ModuleLevels};
///
/// let levels = ModuleLevels::parse("<root>=warn:db=debug:db.pool=trace");
/// assert_eq!(levels.level_for("http"), LogLevel::Warning);
/// assert_eq!(levels.level_for("db.query"), LogLevel::Debug);
/// assert_eq!(levels.level_for("db.pool.conn"), LogLevel::Trace);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleLevels {
    root: Option<LogLevel>,
    modules: Vec<(String, LogLevel)>,
}

impl ModuleLevels {
    /// Parse a level list, skipping malformed entries with a warning
    pub fn parse(spec: &str) -> Self {
        let mut levels = Self::default();

        for entry in spec.split(':') {
            let Some((module, level)) = entry.split_once('=') else {
                continue;
            };
            let module = module.trim();
            let level = match level.trim().parse::<LogLevel>() {
                Ok(level) => level,
                Err(_) => {
                    diagnostics::warn(
                        "ModuleLevels",
                        format!("couldn't understand module/level '{}={}'", module, level),
                    );
                    continue;
                }
            };

            if module == ROOT_MODULE {
                levels.root = Some(level);
            } else if !module.is_empty() {
                levels.set(module, level);
            }
        }

        levels
    }

    /// Override the level of `module`, replacing an earlier entry
    pub fn set(&mut self, module: &str, level: LogLevel) {
        match self.modules.iter_mut().find(|(name, _)| name == module) {
            Some(entry) => entry.1 = level,
            None => self.modules.push((module.to_string(), level)),
        }
    }

    pub fn set_root(&mut self, level: LogLevel) {
        self.root = Some(level);
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.modules.is_empty()
    }

    /// Resolve the threshold for a logger name
    pub fn level_for(&self, name: &str) -> LogLevel {
        self.modules
            .iter()
            .filter(|(module, _)| name.starts_with(module.as_str()))
            .max_by_key(|(module, _)| module.len())
            .map(|(_, level)| *level)
            .or(self.root)
            .unwrap_or_default()
    }
}

/// Remote ingestion endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: String,
    pub token: Option<String>,
    pub dataset: String,
    pub verbose: bool,
}

/// Everything the log manager reads from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub module_levels: ModuleLevels,
    /// `None` when no remote endpoint is configured
    pub remote: Option<RemoteSettings>,
    /// `Some(true)` forces colors on, `Some(false)` off, `None` autodetects
    pub colored_output: Option<bool>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let module_levels = non_empty(LEVELS_ENV)
            .map(|spec| ModuleLevels::parse(&spec))
            .unwrap_or_default();

        let remote = non_empty(REMOTE_URL_ENV).map(|url| RemoteSettings {
            url,
            token: non_empty(REMOTE_TOKEN_ENV),
            dataset: non_empty(REMOTE_DATASET_ENV).unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            verbose: non_empty(REMOTE_VERBOSE_ENV).is_some_and(|v| v != "0"),
        });

        let colored_output = match lookup(COLORED_OUTPUT_ENV).as_deref() {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        };

        Self {
            module_levels,
            remote,
            colored_output,
        }
    }
}
