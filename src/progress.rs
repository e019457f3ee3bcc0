use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::domain::SeriesUid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BatchPhase {
    #[default]
    Idle,
    Preparing,
    Listing,
    Downloading,
    Finalizing,
}

impl BatchPhase {
    pub fn label(self) -> &'static str {
        match self {
            BatchPhase::Idle => "Idle",
            BatchPhase::Preparing => "Prepare",
            BatchPhase::Listing => "List",
            BatchPhase::Downloading => "Download",
            BatchPhase::Finalizing => "Finalize",
        }
    }
}

/// Observable state of the batch in flight. `Default` is the idle state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BatchProgress {
    pub phase: BatchPhase,
    pub in_progress: bool,
    pub total: usize,
    pub completed: usize,
    pub percent: u8,
    pub message: String,
    pub current_series: Option<SeriesUid>,
}

impl BatchProgress {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// `floor(completed / total * 100)`, 0 for an empty total, never above 100.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let value = (completed as u128 * 100) / total as u128;
    value.min(100) as u8
}

/// Shared view of the current [`BatchProgress`]. Clones observe the same
/// state; only the batch executor writes to it.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<RwLock<BatchProgress>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> BatchProgress {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().in_progress
    }

    /// Claims the handle for a new batch. Returns `false` if one is running.
    pub(crate) fn try_begin(&self) -> bool {
        self.update(|progress| {
            if progress.in_progress {
                return false;
            }
            *progress = BatchProgress {
                phase: BatchPhase::Preparing,
                in_progress: true,
                message: "Preparing download...".to_string(),
                ..BatchProgress::default()
            };
            true
        })
    }

    pub(crate) fn set_phase(&self, phase: BatchPhase, message: impl Into<String>) {
        let message = message.into();
        self.update(|progress| {
            progress.phase = phase;
            progress.message = message;
        });
    }

    pub(crate) fn set_total(&self, total: usize) {
        self.update(|progress| {
            progress.total = total;
            progress.percent = percent(progress.completed, total);
        });
    }

    pub(crate) fn set_current(&self, series: Option<SeriesUid>, message: impl Into<String>) {
        let message = message.into();
        self.update(|progress| {
            progress.current_series = series;
            progress.message = message;
        });
    }

    pub(crate) fn advance(&self) {
        self.update(|progress| {
            progress.completed += 1;
            progress.percent = percent(progress.completed, progress.total);
        });
    }

    pub(crate) fn reset(&self) {
        self.update(|progress| *progress = BatchProgress::default());
    }

    fn update<R>(&self, f: impl FnOnce(&mut BatchProgress) -> R) -> R {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub progress: BatchProgress,
    pub elapsed: Duration,
}

/// Receives a snapshot at every checkpoint of a batch, in order.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards snapshots over a channel; a dropped receiver is ignored.
impl ProgressSink for std::sync::mpsc::Sender<ProgressEvent> {
    fn event(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Cooperative cancellation flag, checked by the executor at checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
