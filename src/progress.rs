//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring and steering a
//! job, [`CancellationToken`] for cooperative cancellation, and
//! [`ProgressInfo`] for progress snapshots.
//!
//! Unlike a pure observer, a progress callback answers every report with a
//! [`ProgressAction`]. Returning [`ProgressAction::Stop`] asks the scheduler
//! to stop dispatching new work; frames that are already running are allowed
//! to finish.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use batchscale::{ProgressAction, ProgressInfo, UpscaleOptions};
//!
//! let options = UpscaleOptions::new().with_progress(Arc::new(|info: &ProgressInfo| {
//!     println!("{}/{}", info.current, info.total);
//!     ProgressAction::Continue
//! }));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// The kind of work being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Upscaling a single still image.
    ImageUpscale,
    /// Upscaling the frames of an animated GIF.
    GifUpscale,
    /// Upscaling the frames of a video.
    VideoUpscale,
    /// Iterating over the files of a directory batch.
    Batch,
}

/// Whether the reporter should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressAction {
    /// Keep dispatching work.
    #[default]
    Continue,
    /// Stop dispatching new work once in-flight items settle.
    Stop,
}

/// A snapshot of job progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items (frames or files) have settled so far.
    pub current: u64,
    /// How many items will be processed in total.
    pub total: u64,
    /// Completion percentage (0.0 – 100.0); `None` when `total` is zero.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Ordinal of the frame or file that just settled.
    pub current_item: Option<u64>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`]; the same callback is shared
/// by every job of a directory batch.
///
/// Any `Fn(&ProgressInfo) -> ProgressAction` closure implements this trait.
pub trait ProgressCallback: Send + Sync {
    /// Called once with `current == 0` before work starts, then once per
    /// settled item.
    fn on_progress(&self, info: &ProgressInfo) -> ProgressAction;
}

impl<F> ProgressCallback for F
where
    F: Fn(&ProgressInfo) -> ProgressAction + Send + Sync,
{
    fn on_progress(&self, info: &ProgressInfo) -> ProgressAction {
        self(info)
    }
}

/// A callback that never asks to stop. This is the default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) -> ProgressAction {
        ProgressAction::Continue
    }
}

#[derive(Debug, Default)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation token.
///
/// Clone this token and share it between tasks; call
/// [`cancel`](CancellationToken::cancel) from anywhere to request
/// cancellation. The scheduler checks the token before dispatching each
/// group, and still-image upscales await [`cancelled`](CancellationToken::cancelled)
/// next to the external process so it can be killed promptly.
///
/// # Example
///
/// ```
/// use batchscale::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// All clones of this token observe the cancellation, and every pending
    /// [`cancelled`](CancellationToken::cancelled) future resolves.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `cancel` is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Tracks progress timing and forwards reports to a callback.
///
/// The stop flag is sticky: once a report returns [`ProgressAction::Stop`]
/// it stays raised for the lifetime of the tracker.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: u64,
    current: u64,
    start_time: Instant,
    stopped: bool,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            start_time: Instant::now(),
            stopped: false,
        }
    }

    /// Emit the initial `(0, total)` report.
    pub(crate) fn start(&mut self) -> ProgressAction {
        self.report(None)
    }

    /// Record one settled item and emit a report.
    pub(crate) fn advance(&mut self, item: Option<u64>) -> ProgressAction {
        self.current += 1;
        self.report(item)
    }

    pub(crate) fn current(&self) -> u64 {
        self.current
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn report(&mut self, item: Option<u64>) -> ProgressAction {
        let elapsed = self.start_time.elapsed();

        let percentage = (self.total > 0)
            .then(|| (self.current as f32 / self.total as f32) * 100.0);

        let estimated_remaining = (self.current > 0).then(|| {
            let remaining = self.total.saturating_sub(self.current);
            elapsed.mul_f64(remaining as f64 / self.current as f64)
        });

        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_item: item,
        };

        if self.callback.on_progress(&info) == ProgressAction::Stop {
            self.stopped = true;
        }
        if self.stopped {
            ProgressAction::Stop
        } else {
            ProgressAction::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn tracker_reports_start_and_each_item() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = Arc::new(move |info: &ProgressInfo| {
            sink.lock().unwrap().push((info.current, info.total));
            ProgressAction::Continue
        });

        let mut tracker = ProgressTracker::new(callback, OperationType::GifUpscale, 2);
        tracker.start();
        tracker.advance(Some(0));
        tracker.advance(Some(1));

        assert_eq!(*seen.lock().unwrap(), vec![(0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn tracker_stop_is_sticky() {
        let callback = Arc::new(|info: &ProgressInfo| {
            if info.current == 1 {
                ProgressAction::Stop
            } else {
                ProgressAction::Continue
            }
        });

        let mut tracker = ProgressTracker::new(callback, OperationType::Batch, 5);
        assert_eq!(tracker.start(), ProgressAction::Continue);
        assert_eq!(tracker.advance(None), ProgressAction::Stop);
        assert_eq!(tracker.advance(None), ProgressAction::Stop);
        assert!(tracker.is_stopped());
    }

    #[test]
    fn empty_total_has_no_percentage() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let callback = Arc::new(move |info: &ProgressInfo| {
            *sink.lock().unwrap() = Some(info.percentage);
            ProgressAction::Continue
        });

        let mut tracker = ProgressTracker::new(callback, OperationType::VideoUpscale, 0);
        tracker.start();
        assert_eq!(*seen.lock().unwrap(), Some(None));
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
