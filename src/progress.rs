//! Progress-callback trait for per-unit pipeline events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IndexingConfigBuilder::progress`] to receive real-time
//! events as the pipeline processes each unit.
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a WebSocket, a database record, or a terminal
//! progress bar without the library knowing anything about how the host
//! application communicates. The trait is `Send + Sync` because units are
//! processed concurrently; implementations must protect shared mutable state
//! with the usual primitives (`Mutex`, atomics).

use std::sync::Arc;

/// Called by the pipeline as it processes each unit.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_unit_*` methods may be called concurrently and
/// out of unit order.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once after extraction, when the total unit count is known.
    fn on_ingest_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called just before a unit issues its first external call.
    fn on_unit_start(&self, unit: String, total_units: usize) {
        let _ = (unit, total_units);
    }

    /// Called when a unit has been embedded successfully.
    fn on_unit_complete(&self, unit: String, total_units: usize) {
        let _ = (unit, total_units);
    }

    /// Called when a unit fails irrecoverably (it will be excluded from the
    /// index and listed in the failure report).
    fn on_unit_error(&self, unit: String, total_units: usize, error: String) {
        let _ = (unit, total_units, error);
    }

    /// Called once after all units have been attempted.
    fn on_ingest_complete(&self, total_units: usize, indexed: usize) {
        let _ = (total_units, indexed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in
/// [`crate::config::IndexingConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_unit_complete(&self, _unit: String, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_error(&self, _unit: String, _total: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_ingest_start(4);
        cb.on_unit_start("d_0_0".into(), 4);
        cb.on_unit_complete("d_0_0".into(), 4);
        cb.on_unit_error("d_0_1".into(), 4, "embedding failed".into());
        cb.on_ingest_complete(4, 3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        tracker.on_unit_complete("d_0_0".into(), 2);
        tracker.on_unit_error("d_0_1".into(), 2, "boom".into());
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_is_send() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopProgressCallback>();

        let cb: Arc<dyn IngestProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_ingest_start(1);
    }
}
