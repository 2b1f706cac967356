//! # Rust Log Manager
//!
//! A process-local logging core. Loggers filter events by level, capture the
//! call site and fan each event out to a set of writers; stateful writers
//! buffer the event and do their I/O on a worker thread of their own, so
//! logging never waits on a disk, a socket or an HTTP endpoint.
//!
//! ## Writers
//!
//! - [`ConsoleWriter`]: colored pass-through to stdout (`console` feature)
//! - [`DiskWriter`]: file with time-based rotation and bounded retention
//! - [`SyslogWriter`]: local or remote syslog with reconnect and backoff
//! - [`RemoteBatchWriter`]: gzipped JSON batches posted over HTTP (`remote` feature)
//!
//! ## Example
//!
//! ```no_run
//! use rust_logmanager::prelude::*;
//! use rust_logmanager::info;
//!
//! let config = LogConfig::from_env();
//! let registry = WriterRegistry::builder()
//!     .config(&config)
//!     .writer(DiskWriter::new("logs/app.log", DiskWriterConfig::default()).expect("disk"))
//!     .writer(SyslogWriter::new(SyslogTarget::Local).expect("syslog"))
//!     .build();
//!
//! let logger = registry.get_logger("http.server");
//! info!(logger, "listening on port {}", 8080);
//! ```

pub mod core;
pub mod macros;
pub mod writers;

pub mod prelude {
    #[cfg(feature = "console")]
    pub use crate::writers::ConsoleWriter;
    pub use crate::core::{
        ColorTheme, LogConfig, LogEvent, LogLevel, Logger, LoggerError, ModuleLevels,
        RegistryBuilder, Result, Writer, WriterMetrics, WriterRegistry,
    };
    pub use crate::writers::{
        DiskWriter, DiskWriterConfig, RemoteBatchConfig, RemoteBatchWriter, SyslogConfig,
        SyslogTarget, SyslogWriter, DEFAULT_SHUTDOWN_TIMEOUT,
    };
}

#[cfg(feature = "console")]
pub use writers::ConsoleWriter;
pub use core::{
    ColorTheme, LogConfig, LogEvent, LogLevel, Logger, LoggerError, ModuleLevels,
    RegistryBuilder, RemoteSettings, Result, Writer, WriterDescriptor, WriterMetrics,
    WriterRegistry,
};
pub use writers::{
    DiskWriter, DiskWriterConfig, RemoteBatchConfig, RemoteBatchWriter, SyslogConfig,
    SyslogTarget, SyslogWriter, DEFAULT_SHUTDOWN_TIMEOUT,
};
