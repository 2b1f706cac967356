//! Stress tests for non-blocking delivery
//!
//! These tests verify:
//! - Logging never waits on a stalled sink
//! - Overflow is counted instead of blocking, for syslog and disk
//! - Thread safety under concurrent high-volume logging

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use rust_logmanager::prelude::*;
use rust_logmanager::writers::{Connector, Ingest, IngestOutcome, SyslogConnection};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Connection whose writes hang until the gate is released
struct StalledConnection {
    gate: Receiver<()>,
    written: Arc<AtomicUsize>,
}

impl SyslogConnection for StalledConnection {
    fn write_message(&mut self, _message: &[u8]) -> io::Result<()> {
        // Returns once every gate sender is dropped
        let _ = self.gate.recv();
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct StalledDaemon {
    gate: Receiver<()>,
    written: Arc<AtomicUsize>,
}

impl Connector for StalledDaemon {
    fn connect(&mut self) -> io::Result<Box<dyn SyslogConnection>> {
        Ok(Box::new(StalledConnection {
            gate: self.gate.clone(),
            written: Arc::clone(&self.written),
        }))
    }

    fn describe(&self) -> String {
        "stalled daemon".to_string()
    }
}

#[test]
fn test_stalled_syslog_does_not_block_callers() {
    let (release, gate) = bounded::<()>(0);
    let written = Arc::new(AtomicUsize::new(0));

    let writer = Arc::new(
        SyslogWriter::with_connector(
            StalledDaemon {
                gate,
                written: Arc::clone(&written),
            },
            SyslogConfig::new().with_buffer_size(10),
        )
        .expect("Failed to create syslog writer"),
    );
    let registry = WriterRegistry::builder()
        .shared_writer(writer.clone())
        .build();
    let logger = registry.get_logger("flood");

    let start = Instant::now();
    for i in 0..10_000 {
        logger.error(format!("flood message {}", i));
    }
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(2),
        "logging blocked on a stalled sink for {:?}",
        elapsed
    );
    let metrics = writer.metrics();
    assert!(metrics.dropped_count() > 0);
    assert_eq!(metrics.accepted_count() + metrics.dropped_count(), 10_000);

    drop(release);
    assert!(writer.close());
    assert!(written.load(Ordering::SeqCst) as u64 <= metrics.accepted_count());
}

#[test]
fn test_concurrent_disk_logging() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("concurrent.log");

    let writer = Arc::new(
        DiskWriter::new(&log_file, DiskWriterConfig::default())
            .expect("Failed to create disk writer"),
    );
    let registry = WriterRegistry::builder()
        .shared_writer(writer.clone())
        .build();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let logger = registry.get_logger(format!("worker{}", t));
            thread::spawn(move || {
                for i in 0..500 {
                    logger.info(format!("thread {} message {}", t, i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("logging thread panicked");
    }
    assert!(writer.close());

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    let lines = content.lines().count() as u64;
    let metrics = writer.metrics();
    assert_eq!(metrics.accepted_count() + metrics.dropped_count(), 4000);
    assert_eq!(lines, metrics.accepted_count());
    assert_eq!(lines, metrics.delivered_count());

    // Per-thread order is preserved
    for t in 0..8 {
        let prefix = format!("thread {} message ", t);
        let indices: Vec<usize> = content
            .lines()
            .filter_map(|line| line.split(&prefix).nth(1))
            .filter_map(|n| n.parse().ok())
            .collect();
        assert!(indices.windows(2).all(|w| w[0] < w[1]), "thread {} out of order", t);
    }
}

#[test]
fn test_full_disk_buffer_drops_instead_of_blocking() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("tiny-buffer.log");

    let writer = Arc::new(
        DiskWriter::new(&log_file, DiskWriterConfig::default().with_buffer_size(1))
            .expect("Failed to create disk writer"),
    );
    let registry = WriterRegistry::builder()
        .shared_writer(writer.clone())
        .build();
    let logger = registry.get_logger("flood");

    let start = Instant::now();
    for i in 0..5000 {
        logger.info(format!("flood line {}", i));
    }
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(2),
        "logging blocked on a full disk buffer for {:?}",
        elapsed
    );
    let metrics = writer.metrics();
    assert_eq!(metrics.accepted_count() + metrics.dropped_count(), 5000);
    assert!(metrics.dropped_count() > 0);
    assert!(writer.close());

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    assert_eq!(content.lines().count() as u64, metrics.accepted_count());
}

#[derive(Clone, Default)]
struct CountingIngest {
    messages: Arc<Mutex<Vec<String>>>,
}

impl Ingest for CountingIngest {
    fn ingest(&self, gzipped: Vec<u8>) -> IngestOutcome {
        let mut json = String::new();
        if let Err(e) = flate2::read::GzDecoder::new(gzipped.as_slice()).read_to_string(&mut json) {
            return IngestOutcome::Rejected(e.to_string());
        }
        let batch: Vec<serde_json::Value> = match serde_json::from_str(&json) {
            Ok(batch) => batch,
            Err(e) => return IngestOutcome::Rejected(e.to_string()),
        };
        self.messages.lock().extend(
            batch
                .iter()
                .filter_map(|event| event["message"].as_str().map(str::to_string)),
        );
        IngestOutcome::Delivered
    }
}

#[test]
fn test_concurrent_remote_logging_delivers_once() {
    let ingest = CountingIngest::default();
    let writer = Arc::new(
        RemoteBatchWriter::with_client(
            ingest.clone(),
            RemoteBatchConfig::new("http://localhost:9")
                .with_flush_interval(Duration::from_millis(5))
                .with_max_batch_size(10_000),
        )
        .expect("Failed to create remote writer"),
    );
    let registry = WriterRegistry::builder()
        .shared_writer(writer.clone())
        .build();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = registry.get_logger("remote");
            thread::spawn(move || {
                for i in 0..250 {
                    logger.info(format!("{}-{}", t, i));
                    if i % 50 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("logging thread panicked");
    }
    assert!(writer.close());

    let messages = ingest.messages.lock();
    let unique: HashSet<&String> = messages.iter().collect();
    assert_eq!(messages.len(), 1000);
    assert_eq!(unique.len(), 1000);
}
