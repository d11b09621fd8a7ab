//! Progress reporting and cooperative cancellation.
//!
//! Observers only receive shared references, so they cannot influence which
//! trials are accepted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::Buffer2;

/// Snapshot taken at the end of each acceptance-ratio window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Iterations completed so far.
    pub iteration: u64,
    /// Accepted / attempted over the window that just ended.
    pub window_acceptance_ratio: f64,
    /// Step size after the window's decay decision.
    pub scaling_value: f64,
    pub scaling_cutoff: f64,
    pub merit: f64,
    pub decay_events: u32,
}

pub trait ProgressObserver {
    fn on_progress(&mut self, progress: &Progress);

    /// Live view of the working matrix, every `preview_interval` windows.
    fn on_preview(&mut self, _image: &Buffer2<u32>) {}
}

impl<F: FnMut(&Progress)> ProgressObserver for F {
    fn on_progress(&mut self, progress: &Progress) {
        self(progress)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&mut self, _progress: &Progress) {}
}

/// Shared cancellation flag, checked by the optimizer between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
