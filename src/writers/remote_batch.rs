//! Batching writer for a remote HTTP ingestion endpoint
//!
//! Events are collected in memory and shipped every flush interval as one
//! gzipped JSON array. Batches that fail for a transient reason are put back
//! in front of the backlog, which is capped to the most recent events.

use super::worker::{self, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::core::{
    diagnostics, ColorTheme, LogEvent, LoggerError, RemoteSettings, Result, Writer,
    WriterMetrics, DEFAULT_DATASET,
};
use chrono::SecondsFormat;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const COMPONENT: &str = "RemoteBatchWriter";

/// Wire representation of one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    #[serde(rename = "_time")]
    pub time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub level: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub line: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

fn is_zero(line: &u32) -> bool {
    *line == 0
}

impl From<&LogEvent> for RemoteEvent {
    fn from(event: &LogEvent) -> Self {
        Self {
            time: event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            level: event.level.to_str().to_string(),
            module: event.module.clone(),
            filename: event.file.clone(),
            line: event.line,
            message: event.message.clone(),
            process: event.process.clone(),
            hostname: event.hostname.clone(),
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Delivered,
    /// Worth retrying: the batch goes back into the backlog
    Transient(String),
    /// The endpoint refused the batch; it is discarded
    Rejected(String),
    /// The request could not even be made; the batch is discarded
    Abandoned(String),
}

/// Destination for gzipped JSON batches
pub trait Ingest: Send + Sync {
    fn ingest(&self, gzipped: Vec<u8>) -> IngestOutcome;
}

/// Configuration for [`RemoteBatchWriter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBatchConfig {
    pub base_url: String,
    pub dataset: String,
    pub token: Option<String>,
    /// Time between flushes (default: 1 second)
    pub flush_interval: Duration,
    /// Backlog cap after a failed delivery (default: 1000)
    pub max_batch_size: usize,
    /// Per-request timeout (default: 30 seconds)
    pub request_timeout: Duration,
    /// Report discarded batches on stderr
    pub verbose: bool,
}

impl RemoteBatchConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            dataset: DEFAULT_DATASET.to_string(),
            token: None,
            flush_interval: Duration::from_secs(1),
            max_batch_size: 1000,
            request_timeout: Duration::from_secs(30),
            verbose: false,
        }
    }

    pub fn from_settings(settings: RemoteSettings) -> Self {
        Self {
            dataset: settings.dataset,
            token: settings.token,
            verbose: settings.verbose,
            ..Self::new(settings.url)
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(LoggerError::config(COMPONENT, "max_batch_size must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(LoggerError::config(COMPONENT, "flush_interval must not be zero"));
        }
        Ok(())
    }
}

/// HTTP client posting to `{base}/datasets/{dataset}/ingest`
#[cfg(feature = "remote")]
pub struct HttpIngest {
    client: reqwest::blocking::Client,
    url: reqwest::Url,
    token: Option<String>,
}

#[cfg(feature = "remote")]
impl HttpIngest {
    pub fn new(config: &RemoteBatchConfig) -> Result<Self> {
        let endpoint = format!(
            "{}/datasets/{}/ingest",
            config.base_url.trim_end_matches('/'),
            config.dataset
        );
        let url = reqwest::Url::parse(&endpoint).map_err(|e| {
            LoggerError::config(COMPONENT, format!("invalid url '{}': {}", endpoint, e))
        })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LoggerError::config(COMPONENT, format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            url,
            token: config.token.clone(),
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[cfg(feature = "remote")]
impl Ingest for HttpIngest {
    fn ingest(&self, gzipped: Vec<u8>) -> IngestOutcome {
        use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
        use reqwest::StatusCode;

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(gzipped);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let request = match request.build() {
            Ok(request) => request,
            Err(e) => return IngestOutcome::Abandoned(e.to_string()),
        };

        match self.client.execute(request) {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    IngestOutcome::Delivered
                } else if status == StatusCode::SERVICE_UNAVAILABLE {
                    IngestOutcome::Transient(status.to_string())
                } else {
                    let body = response.text().unwrap_or_default();
                    IngestOutcome::Rejected(format!("{}: {}", status, body.trim()))
                }
            }
            Err(e) => IngestOutcome::Transient(e.to_string()),
        }
    }
}

/// Serialize and gzip a batch
pub fn encode_batch(batch: &[RemoteEvent]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(batch)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::fast());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// State shared between producers and the flush thread
struct Batcher {
    pending: Mutex<Vec<RemoteEvent>>,
    // Serializes flushes so a requeued batch keeps its place
    flushing: Mutex<()>,
    ingest: Box<dyn Ingest>,
    max_batch_size: usize,
    verbose: bool,
    metrics: WriterMetrics,
}

impl Batcher {
    fn push(&self, event: RemoteEvent) {
        self.pending.lock().push(event);
        self.metrics.record_accepted();
    }

    /// Ship the pending events, returning how many were delivered
    fn flush(&self) -> Result<usize> {
        let _flushing = self.flushing.lock();

        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();

        let payload = match encode_batch(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.record_failure();
                self.metrics.record_dropped_many(count as u64);
                diagnostics::error(COMPONENT, format!("failed to encode batch: {}", e));
                return Err(e);
            }
        };

        match self.ingest.ingest(payload) {
            IngestOutcome::Delivered => {
                self.metrics.record_delivered(count as u64);
                Ok(count)
            }
            IngestOutcome::Transient(reason) => {
                self.metrics.record_failure();
                if self.verbose {
                    diagnostics::warn(
                        COMPONENT,
                        format!("delivery failed, requeueing {} events: {}", count, reason),
                    );
                }
                self.requeue(batch);
                Err(LoggerError::delivery(reason))
            }
            IngestOutcome::Rejected(reason) => {
                self.metrics.record_failure();
                self.metrics.record_dropped_many(count as u64);
                if self.verbose {
                    diagnostics::warn(
                        COMPONENT,
                        format!("batch of {} events rejected: {}", count, reason),
                    );
                }
                Err(LoggerError::delivery(reason))
            }
            IngestOutcome::Abandoned(reason) => {
                self.metrics.record_failure();
                self.metrics.record_dropped_many(count as u64);
                diagnostics::error(COMPONENT, format!("failed to send batch: {}", reason));
                Err(LoggerError::delivery(reason))
            }
        }
    }

    /// Put a failed batch back in front of newer events, keeping the most recent
    fn requeue(&self, mut batch: Vec<RemoteEvent>) {
        self.metrics.record_requeued(batch.len() as u64);

        let mut pending = self.pending.lock();
        batch.append(&mut pending);
        if batch.len() > self.max_batch_size {
            let excess = batch.len() - self.max_batch_size;
            batch.drain(..excess);
            self.metrics.record_dropped_many(excess as u64);
        }
        *pending = batch;
    }

    fn run(&self, shutdown: Receiver<()>, interval: Duration) {
        loop {
            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    // Failures are reported and requeued inside flush
                    let _ = self.flush();
                }
                _ => return,
            }
        }
    }
}

/// Writer shipping events to a remote ingestion endpoint in batches
///
/// # Example
///
/// ```no_run
/// use rust_logmanager::writers::{RemoteBatchConfig, RemoteBatchWriter};
///
/// let config = RemoteBatchConfig::new("https://ingest.example.com/api/v1")
///     .with_dataset("payments")
///     .with_token("secret");
/// let writer = RemoteBatchWriter::new(config).expect("Failed to create remote writer");
/// ```
pub struct RemoteBatchWriter {
    batcher: Arc<Batcher>,
    shutdown: RwLock<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteBatchWriter {
    /// Create a writer posting over HTTP
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the HTTP client cannot be built
    #[cfg(feature = "remote")]
    pub fn new(config: RemoteBatchConfig) -> Result<Self> {
        let ingest = HttpIngest::new(&config)?;
        Self::with_client(ingest, config)
    }

    /// Create a writer from `LOGMANAGER_REMOTE_*`, `None` when no URL is set
    #[cfg(feature = "remote")]
    pub fn from_env() -> Result<Option<Self>> {
        crate::core::LogConfig::from_env()
            .remote
            .map(|settings| Self::new(RemoteBatchConfig::from_settings(settings)))
            .transpose()
    }

    /// Create a writer delivering through a custom [`Ingest`]
    pub fn with_client<I: Ingest + 'static>(ingest: I, config: RemoteBatchConfig) -> Result<Self> {
        config.validate()?;

        let batcher = Arc::new(Batcher {
            pending: Mutex::new(Vec::new()),
            flushing: Mutex::new(()),
            ingest: Box::new(ingest),
            max_batch_size: config.max_batch_size,
            verbose: config.verbose,
            metrics: WriterMetrics::new(),
        });

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let worker_batcher = Arc::clone(&batcher);
        let interval = config.flush_interval;
        let handle = worker::spawn("logmanager-remote", move || {
            worker_batcher.run(shutdown_rx, interval)
        })?;

        Ok(Self {
            batcher,
            shutdown: RwLock::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Run one flush now
    ///
    /// Returns the number of events delivered.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::WriterClosed`] after [`close`](Self::close), or
    /// the delivery error of the batch (a transient failure has already
    /// requeued it).
    pub fn flush(&self) -> Result<usize> {
        if self.is_closed() {
            return Err(LoggerError::WriterClosed);
        }
        self.batcher.flush()
    }

    /// Events waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.batcher.pending.lock().len()
    }

    pub fn metrics(&self) -> &WriterMetrics {
        &self.batcher.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.read().is_none()
    }

    /// Stop the flush thread and make one last delivery attempt
    pub fn close(&self) -> bool {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    pub fn shutdown(&self, timeout: Duration) -> bool {
        let Some(sender) = self.shutdown.write().take() else {
            return true;
        };
        drop(sender);

        let joined = match self.worker.lock().take() {
            Some(handle) => worker::join_with_timeout(handle, timeout, COMPONENT),
            None => true,
        };
        if let Err(e) = self.batcher.flush() {
            diagnostics::warn(COMPONENT, format!("final flush failed: {}", e));
        }
        joined
    }
}

impl Writer for RemoteBatchWriter {
    fn build_theme(&self, _module: &str) -> ColorTheme {
        ColorTheme::default()
    }

    fn log(&self, event: &LogEvent, _theme: &ColorTheme) {
        let open = self.shutdown.read();
        if open.is_none() {
            return;
        }
        self.batcher.push(RemoteEvent::from(event));
    }
}

impl Drop for RemoteBatchWriter {
    fn drop(&mut self) {
        self.close();
    }
}
