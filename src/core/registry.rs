//! Writer registry shared by all loggers of a process
//!
//! The registry is configuration: the writer set is installed once, at
//! start-up, and read by loggers the first time they log.

use super::config::{LogConfig, ModuleLevels};
use super::error::{LoggerError, Result};
use super::logger::Logger;
use super::writer::Writer;
use parking_lot::RwLock;
use std::sync::Arc;

struct RegistryState {
    writers: Vec<Arc<dyn Writer>>,
    installed: bool,
}

pub struct WriterRegistry {
    state: RwLock<RegistryState>,
    module_levels: ModuleLevels,
}

impl WriterRegistry {
    /// Create a registry that has not been installed yet
    ///
    /// Until [`install`](Self::install) is called, loggers see the default
    /// writer set (a console writer when the `console` feature is enabled).
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_module_levels(ModuleLevels::default())
    }

    #[must_use]
    pub fn with_module_levels(module_levels: ModuleLevels) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(RegistryState {
                writers: default_writers(),
                installed: false,
            }),
            module_levels,
        })
    }

    /// Replace the default writers with `writers`
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::RegistryInstalled`] if writers were already installed.
    pub fn install(&self, writers: Vec<Arc<dyn Writer>>) -> Result<()> {
        let mut state = self.state.write();
        if state.installed {
            return Err(LoggerError::RegistryInstalled);
        }
        state.writers = writers;
        state.installed = true;
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.state.read().installed
    }

    /// Snapshot of the current writer set
    pub fn writers(&self) -> Vec<Arc<dyn Writer>> {
        self.state.read().writers.clone()
    }

    pub fn module_levels(&self) -> &ModuleLevels {
        &self.module_levels
    }

    /// Get a logger for `name`, with its threshold taken from the module levels
    pub fn get_logger(self: &Arc<Self>, name: impl Into<String>) -> Logger {
        let name = name.into();
        let level = self.module_levels.level_for(&name);
        Logger::new(name, level, Arc::clone(self))
    }

    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }
}

#[cfg(feature = "console")]
fn default_writers() -> Vec<Arc<dyn Writer>> {
    vec![Arc::new(crate::writers::ConsoleWriter::new())]
}

#[cfg(not(feature = "console"))]
fn default_writers() -> Vec<Arc<dyn Writer>> {
    Vec::new()
}

/// Builder for an installed [`WriterRegistry`]
///
/// # Example
/// ```no_run
/// use rust_logmanager::prelude::*;
///
/// let disk = DiskWriter::new("/var/log/app.log", DiskWriterConfig::default())
///     .expect("Failed to start disk writer");
///
/// let registry = WriterRegistry::builder()
///     .module_levels(ModuleLevels::parse("<root>=info:db=debug"))
///     .writer(disk)
///     .build();
///
/// let logger = registry.get_logger("db.pool");
/// logger.debug("pool warmed up");
/// ```
pub struct RegistryBuilder {
    writers: Vec<Arc<dyn Writer>>,
    module_levels: ModuleLevels,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            writers: Vec::new(),
            module_levels: ModuleLevels::default(),
        }
    }

    /// Add a writer
    #[must_use = "builder methods return a new value"]
    pub fn writer<W: Writer + 'static>(mut self, writer: W) -> Self {
        self.writers.push(Arc::new(writer));
        self
    }

    /// Add a writer that is also kept elsewhere (e.g. to close it later)
    #[must_use = "builder methods return a new value"]
    pub fn shared_writer(mut self, writer: Arc<dyn Writer>) -> Self {
        self.writers.push(writer);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn module_levels(mut self, module_levels: ModuleLevels) -> Self {
        self.module_levels = module_levels;
        self
    }

    /// Take module levels from an environment configuration
    ///
    /// With the `console` feature this also applies the color override.
    #[must_use = "builder methods return a new value"]
    pub fn config(mut self, config: &LogConfig) -> Self {
        self.module_levels = config.module_levels.clone();
        #[cfg(feature = "console")]
        crate::writers::ConsoleWriter::apply_config(config);
        self
    }

    /// Build the registry with the collected writers installed
    pub fn build(self) -> Arc<WriterRegistry> {
        Arc::new(WriterRegistry {
            state: RwLock::new(RegistryState {
                writers: self.writers,
                installed: true,
            }),
            module_levels: self.module_levels,
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColorTheme, LogEvent, LogLevel};

    struct NullWriter;

    impl Writer for NullWriter {
        fn build_theme(&self, _module: &str) -> ColorTheme {
            ColorTheme::default()
        }

        fn log(&self, _event: &LogEvent, _theme: &ColorTheme) {}
    }

    #[test]
    fn test_install_once() {
        let registry = WriterRegistry::new();
        assert!(!registry.is_installed());

        registry.install(vec![Arc::new(NullWriter)]).expect("first install");
        assert!(registry.is_installed());
        assert_eq!(registry.writers().len(), 1);

        let second = registry.install(vec![Arc::new(NullWriter), Arc::new(NullWriter)]);
        assert!(matches!(second, Err(LoggerError::RegistryInstalled)));
        assert_eq!(registry.writers().len(), 1);
    }

    #[test]
    fn test_builder_is_installed() {
        let registry = WriterRegistry::builder().writer(NullWriter).build();
        assert!(registry.is_installed());
        assert!(registry.install(Vec::new()).is_err());
    }

    #[test]
    fn test_get_logger_uses_module_levels() {
        let registry = WriterRegistry::builder()
            .module_levels(ModuleLevels::parse("<root>=error:db=trace"))
            .build();

        assert_eq!(registry.get_logger("db.pool").level(), LogLevel::Trace);
        assert_eq!(registry.get_logger("http").level(), LogLevel::Error);
    }
}
