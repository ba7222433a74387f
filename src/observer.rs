//! Lifecycle-observer trait for per-request conversion events.
//!
//! Inject an [`Arc<dyn LifecycleObserver>`] via
//! [`crate::config::ServiceConfigBuilder::observer`] to receive events as
//! each request moves through its stages and when its artifacts are
//! released.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to metrics, a broadcast channel or a test
//! recorder without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because requests run
//! concurrently on the Tokio runtime.
//!
//! # Example
//!
//! ```rust
//! use docx2pdf::{LifecycleObserver, RequestId, ServiceConfig, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CleanupCounter {
//!     cleaned: AtomicUsize,
//! }
//!
//! impl LifecycleObserver for CleanupCounter {
//!     fn on_cleaned(&self, _id: &RequestId, final_stage: Stage, released: usize) {
//!         self.cleaned.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("request ended as {final_stage}, {released} artifacts removed");
//!     }
//! }
//!
//! let config = ServiceConfig::builder()
//!     .observer(Arc::new(CleanupCounter { cleaned: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::request::{RequestId, Stage};
use std::sync::Arc;

/// Called by the orchestrator as a request progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Different requests call into the same observer concurrently.
/// `on_cleaned` may run from a `Drop` impl, so it must not block for long.
pub trait LifecycleObserver: Send + Sync {
    /// Called after every accepted stage transition.
    ///
    /// # Arguments
    /// * `id`    — the request
    /// * `stage` — the stage just entered
    fn on_stage(&self, id: &RequestId, stage: Stage) {
        let _ = (id, stage);
    }

    /// Called exactly once per request, after its artifacts are released.
    ///
    /// # Arguments
    /// * `id`          — the request
    /// * `final_stage` — `Delivered` or `Failed(..)`, the stage cleanup followed
    /// * `released`    — artifacts that actually existed and were deleted
    fn on_cleaned(&self, id: &RequestId, final_stage: Stage, released: usize) {
        let _ = (id, final_stage, released);
    }
}

/// A no-op implementation, the default when no observer is configured.
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type Observer = Arc<dyn LifecycleObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TrackingObserver {
        stages: Mutex<Vec<Stage>>,
        cleaned: AtomicUsize,
    }

    impl LifecycleObserver for TrackingObserver {
        fn on_stage(&self, _id: &RequestId, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_cleaned(&self, _id: &RequestId, _final_stage: Stage, _released: usize) {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let id = RequestId::generate();
        let o = NoopObserver;
        o.on_stage(&id, Stage::Validated);
        o.on_cleaned(&id, Stage::Failed(ErrorKind::OutputMissing), 2);
    }

    #[test]
    fn tracking_observer_receives_events() {
        let id = RequestId::generate();
        let o = TrackingObserver {
            stages: Mutex::new(Vec::new()),
            cleaned: AtomicUsize::new(0),
        };
        o.on_stage(&id, Stage::Validated);
        o.on_stage(&id, Stage::Stored);
        o.on_cleaned(&id, Stage::Delivered, 3);

        assert_eq!(
            *o.stages.lock().unwrap(),
            vec![Stage::Validated, Stage::Stored]
        );
        assert_eq!(o.cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: Observer = Arc::new(NoopObserver);
        o.on_stage(&RequestId::generate(), Stage::Converting);
    }
}
