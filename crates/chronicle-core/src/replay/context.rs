//! Per-run state shared between a running replay and its invoker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
struct Shared {
    cancel: AtomicBool,
    processed: AtomicUsize,
    total: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub processed: usize,
    pub total: usize,
}

/// Engine side of a run. Passed explicitly through the replay call chain.
#[derive(Debug)]
pub struct RunContext {
    shared: Arc<Shared>,
}

/// Invoker side of a run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    shared: Arc<Shared>,
}

impl RunContext {
    pub fn new() -> (Self, RunHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            RunHandle { shared },
        )
    }

    /// Polled at record boundaries only.
    pub fn should_stop(&self) -> bool {
        self.shared.cancel.load(Ordering::Acquire)
    }

    pub fn set_total(&self, total: usize) {
        self.shared.total.store(total, Ordering::Release);
    }

    pub fn record_processed(&self) {
        self.shared.processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl RunHandle {
    pub fn request_cancel(&self) {
        self.shared.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> RunProgress {
        RunProgress {
            processed: self.shared.processed.load(Ordering::Acquire),
            total: self.shared.total.load(Ordering::Acquire),
        }
    }
}
