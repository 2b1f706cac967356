//! Best-effort diagnostics on stderr
//!
//! The diagnostic stream is lossy by nature: nothing here can fail or block
//! for long, and overflow alerts are throttled.

use super::metrics::WriterMetrics;

/// Alert on the first drop and every `ALERT_EVERY` drops after that
pub const ALERT_EVERY: u64 = 1000;

pub fn warn(component: &str, message: impl std::fmt::Display) {
    eprintln!("[LOGGER WARNING] {}: {}", component, message);
}

pub fn error(component: &str, message: impl std::fmt::Display) {
    eprintln!("[LOGGER ERROR] {}: {}", component, message);
}

/// Whether the `total`th drop gets a stderr line
fn should_alert(total: u64) -> bool {
    total == 1 || total % ALERT_EVERY == 0
}

/// Record a dropped event and emit a throttled alert
///
/// Every drop is counted in `metrics`; only the first and every
/// [`ALERT_EVERY`]th after it are reported on stderr. Callers that need an
/// exact figure read [`WriterMetrics::dropped_count`], not the diagnostics.
///
/// Returns the total number of drops so far.
pub fn drop_with_alert(component: &str, metrics: &WriterMetrics, reason: &str) -> u64 {
    let total = metrics.record_dropped() + 1;

    if should_alert(total) {
        eprintln!(
            "[LOGGER WARNING] {}: {}, {} logs dropped",
            component, reason, total
        );
    }

    total
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
