//! Bounded batch scheduling of frame work.
//!
//! [`BatchScheduler`] splits a frame list into groups of at most
//! `parallelism` frames. Groups run strictly one after another; the frames of
//! a group run concurrently on the current task and the whole group settles
//! before the next one starts. Progress is reported after every settled
//! frame, and a stop request (from the callback or the cancellation token)
//! prevents any further group from being dispatched.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use batchscale::{
//!     BatchScheduler, CancellationToken, Frame, OperationType, ProgressAction, ProgressInfo,
//! };
//!
//! # async fn example(frames: Vec<Frame>) {
//! let scheduler = BatchScheduler::new(4).with_limit(100);
//! let report = scheduler
//!     .run(
//!         &frames,
//!         |frame: &Frame| {
//!             let destination = frame.destination.clone();
//!             async move { Ok::<_, batchscale::BatchScaleError>(destination) }
//!         },
//!         Arc::new(|_: &ProgressInfo| ProgressAction::Continue),
//!         OperationType::GifUpscale,
//!         &CancellationToken::new(),
//!     )
//!     .await;
//! println!("{} frames done", report.completed.len());
//! # }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::BatchScaleError;
use crate::frame::Frame;
use crate::progress::{CancellationToken, OperationType, ProgressCallback, ProgressTracker};

/// A frame whose work function succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFrame {
    pub index: usize,
    pub output: PathBuf,
}

/// Outcome of one scheduler run.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// Successful frames sorted by ordinal.
    pub completed: Vec<CompletedFrame>,
    /// Failed frames with their errors, in settle order.
    pub failures: Vec<(usize, BatchScaleError)>,
    /// Number of frames that were eligible (`min(limit, len)`).
    pub total: usize,
    /// Number of groups that were dispatched.
    pub groups_dispatched: usize,
    /// Whether a stop was requested through the callback or the token.
    pub stopped: bool,
}

impl ScheduleReport {
    /// Ordinals of the frames that were processed successfully.
    pub fn completed_indices(&self) -> Vec<usize> {
        self.completed.iter().map(|frame| frame.index).collect()
    }
}

/// Runs a per-frame work function over frames in bounded concurrent groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScheduler {
    parallelism: usize,
    limit: Option<usize>,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BatchScheduler {
    /// Create a scheduler running up to `parallelism` frames at once.
    /// Clamped to a minimum of 1.
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            limit: None,
        }
    }

    /// Only process frames whose position is below `limit`.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set or clear the item limit.
    #[must_use]
    pub fn with_optional_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Process `frames` with `work`.
    ///
    /// The callback sees `(0, total)` first and then one report per settled
    /// frame. A failed frame is recorded in
    /// [`failures`](ScheduleReport::failures) without disturbing the rest of
    /// its group.
    pub async fn run<W, Fut>(
        &self,
        frames: &[Frame],
        work: W,
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        cancellation: &CancellationToken,
    ) -> ScheduleReport
    where
        W: Fn(&Frame) -> Fut,
        Fut: Future<Output = Result<PathBuf, BatchScaleError>>,
    {
        let total = self.limit.map_or(frames.len(), |limit| limit.min(frames.len()));
        let eligible = &frames[..total];

        let mut tracker = ProgressTracker::new(callback, operation, total as u64);
        let mut report = ScheduleReport {
            total,
            ..ScheduleReport::default()
        };

        tracker.start();

        for group in eligible.chunks(self.parallelism) {
            if tracker.is_stopped() || cancellation.is_cancelled() {
                log::debug!(
                    "Stopping after {} of {} frames; {} groups dispatched",
                    tracker.current(),
                    total,
                    report.groups_dispatched
                );
                report.stopped = true;
                break;
            }
            report.groups_dispatched += 1;

            let mut in_flight: FuturesUnordered<_> = group
                .iter()
                .map(|frame| {
                    let future = work(frame);
                    async move { (frame.index, future.await) }
                })
                .collect();

            while let Some((index, result)) = in_flight.next().await {
                match result {
                    Ok(output) => report.completed.push(CompletedFrame { index, output }),
                    Err(error) => {
                        log::warn!("Frame {index} failed: {error}");
                        report.failures.push((index, error));
                    }
                }
                tracker.advance(Some(index as u64));
            }
        }

        // A stop raised while draining the final group still counts.
        report.stopped |= tracker.is_stopped() || cancellation.is_cancelled();

        report.completed.sort_by_key(|frame| frame.index);
        report
    }
}
