//! Background worker threads shared by the buffered writers

use crate::core::{diagnostics, LoggerError, Result};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default time a writer waits for its worker when closing (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn a named worker thread
pub(crate) fn spawn<F>(name: &str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| LoggerError::io_operation("spawning worker thread", name.to_string(), e))
}

/// Wait for a worker to finish, giving up after `timeout`
///
/// Returns `true` if the worker exited cleanly within the timeout.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, component: &str) -> bool {
    let start = Instant::now();

    loop {
        if handle.is_finished() {
            if let Err(e) = handle.join() {
                diagnostics::error(
                    component,
                    format!(
                        "worker thread panicked during shutdown: {}",
                        diagnostics::panic_message(e.as_ref())
                    ),
                );
                return false;
            }
            return true;
        }

        if start.elapsed() >= timeout {
            diagnostics::warn(
                component,
                format!(
                    "worker thread did not finish within {:?} timeout, some logs may be lost",
                    timeout
                ),
            );
            return false;
        }

        thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_finished_worker() {
        let handle = spawn("test-worker", || {}).expect("spawn");
        assert!(join_with_timeout(handle, Duration::from_secs(1), "test"));
    }

    #[test]
    fn test_join_times_out() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let handle = spawn("stuck-worker", move || {
            let _ = rx.recv();
        })
        .expect("spawn");

        assert!(!join_with_timeout(handle, Duration::from_millis(20), "test"));
        drop(tx);
    }

    #[test]
    fn test_join_reports_panic() {
        let handle = spawn("panicking-worker", || panic!("worker failure")).expect("spawn");
        assert!(!join_with_timeout(handle, Duration::from_secs(1), "test"));
    }
}
