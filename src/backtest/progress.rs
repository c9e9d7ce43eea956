//! Run control: progress notification and cooperative cancellation

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Progress notification emitted during a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Percent of steps processed, 0..=100
    pub percent: f64,
    /// Steps processed so far
    pub step: usize,
    /// Total steps in the run
    pub total_steps: usize,
}

/// Progress listener callback
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Shared flag checked once per replay step
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the run stops before its next step
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Side channels passed into a run
///
/// Listeners observe the run but cannot affect it.
#[derive(Clone, Default)]
pub struct RunControl {
    listeners: Vec<ProgressCallback>,
    cancel: Option<CancelFlag>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a progress callback
    pub fn on_progress(mut self, callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.listeners.push(Arc::new(callback));
        self
    }

    /// Forward progress events into a channel; send failures are ignored
    pub fn progress_channel(self, tx: UnboundedSender<ProgressEvent>) -> Self {
        self.on_progress(move |event| {
            let _ = tx.send(event);
        })
    }

    /// Attach a cancellation flag
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("listeners", &self.listeners.len())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Emits an event each time the whole-number percent advances
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total_steps: usize,
    last_percent: Option<u32>,
}

impl ProgressTracker {
    pub(crate) fn new(total_steps: usize) -> Self {
        Self {
            total_steps,
            last_percent: None,
        }
    }

    pub(crate) fn advance(&mut self, step: usize, control: &RunControl) {
        if self.total_steps == 0 {
            return;
        }
        let percent = (step as f64 * 100.0) / self.total_steps as f64;
        let whole = percent.floor() as u32;
        if self.last_percent.is_some_and(|last| last >= whole) {
            return;
        }
        self.last_percent = Some(whole);
        control.emit(ProgressEvent {
            percent,
            step,
            total_steps: self.total_steps,
        });
    }
}
