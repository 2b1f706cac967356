//! Writer implementations

pub mod backoff;
#[cfg(feature = "console")]
pub mod console;
pub mod disk;
pub mod remote_batch;
pub mod syslog;
mod worker;

pub use backoff::Backoff;
#[cfg(feature = "console")]
pub use console::ConsoleWriter;
pub use disk::{DiskWriter, DiskWriterConfig};
#[cfg(feature = "remote")]
pub use remote_batch::HttpIngest;
pub use remote_batch::{Ingest, IngestOutcome, RemoteBatchConfig, RemoteBatchWriter, RemoteEvent};
pub use syslog::{Connector, Network, SyslogConfig, SyslogConnection, SyslogTarget, SyslogWriter};
pub use worker::DEFAULT_SHUTDOWN_TIMEOUT;
