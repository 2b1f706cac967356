//! Core logger types and traits

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod log_event;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod registry;
pub mod writer;

pub use config::{LogConfig, ModuleLevels, RemoteSettings, DEFAULT_DATASET, ROOT_MODULE};
pub use error::{LoggerError, Result};
pub use log_event::LogEvent;
pub use log_level::LogLevel;
pub use logger::Logger;
pub use metrics::WriterMetrics;
pub use registry::{RegistryBuilder, WriterRegistry};
pub use writer::{ColorTheme, Writer, WriterDescriptor};
