//! Job orchestration.
//!
//! [`BatchUpscaler`] runs one job end to end: resolve the output path,
//! acquire a [`Workspace`], decompose the source, fan the frames out through
//! the [`BatchScheduler`], apply the timing transform and reassemble. The
//! directory operations run that once per matching file, skipping items that
//! fail and reporting aggregate progress to a separate outer callback.
//!
//! # Example
//!
//! ```no_run
//! use batchscale::{BatchUpscaler, UpscaleOptions};
//!
//! # async fn example() -> Result<(), batchscale::BatchScaleError> {
//! let options = UpscaleOptions::new()
//!     .with_scale(2.0)
//!     .with_parallel_frames(4)
//!     .with_speed(2.0);
//! let upscaler = BatchUpscaler::from_options(&options);
//! let outcome = upscaler
//!     .upscale_gif("cat.gif".as_ref(), "out/".as_ref(), &options)
//!     .await?;
//! println!("{} frames -> {}", outcome.processed, outcome.output.display());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::codec::{ContainerCodec, MediaCodec};
use crate::configuration::UpscaleOptions;
use crate::error::BatchScaleError;
use crate::frame::{Frame, FrameSet, FrameTiming};
use crate::gif::GifOptions;
use crate::naming::{self, MediaKind};
use crate::progress::{CancellationToken, OperationType, ProgressCallback, ProgressTracker};
use crate::scheduler::{BatchScheduler, CompletedFrame, ScheduleReport};
use crate::timing::{AnimationTiming, VideoTiming, correction_factor, subsample_stride};
use crate::upscaler::{FrameUpscaler, Waifu2x};
use crate::video::VideoEncodeRequest;
use crate::workspace::Workspace;

/// Lifecycle of a single job.
///
/// States only move forward; any state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Pending,
    WorkspaceAcquired,
    Decomposed,
    Scheduling,
    TimingCorrected,
    Reassembled,
    Released,
    Failed,
}

/// Result of one finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Written output file.
    pub output: PathBuf,
    /// Frames (or images) that made it into the output.
    pub processed: usize,
    /// Frames that failed and were left out.
    pub failed: usize,
    /// Whether a stop request cut the job short.
    pub stopped: bool,
}

/// Result of a directory batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Outcomes of the jobs that finished, in processing order.
    pub outputs: Vec<JobOutcome>,
    /// Sources that failed and were skipped.
    pub skipped: Vec<(PathBuf, BatchScaleError)>,
    /// Whether the batch stopped before visiting every item.
    pub stopped: bool,
}

/// Tracks and logs the state of one job.
struct Job<'a> {
    source: &'a Path,
    state: JobState,
}

impl<'a> Job<'a> {
    fn new(source: &'a Path) -> Self {
        log::info!("Upscaling {}", source.display());
        Self {
            source,
            state: JobState::Pending,
        }
    }

    fn transition(&mut self, next: JobState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        log::debug!("{}: {:?} -> {:?}", self.source.display(), self.state, next);
        self.state = next;
    }

    fn finish(mut self, result: &Result<JobOutcome, BatchScaleError>) {
        match result {
            Ok(outcome) => {
                self.transition(JobState::Released);
                log::info!(
                    "Wrote {} ({} processed, {} failed{})",
                    outcome.output.display(),
                    outcome.processed,
                    outcome.failed,
                    if outcome.stopped { ", stopped" } else { "" }
                );
            }
            Err(error) => {
                log::debug!("{}: {error}", self.source.display());
                self.transition(JobState::Failed);
            }
        }
    }
}

/// Runs upscale jobs with an injected upscaler and container codec.
#[derive(Debug, Clone)]
pub struct BatchUpscaler<U, C> {
    upscaler: U,
    codec: C,
}

impl BatchUpscaler<Waifu2x, MediaCodec> {
    /// Production upscaler built from the executables in `options`.
    pub fn from_options(options: &UpscaleOptions) -> Self {
        Self::new(Waifu2x::from_options(options), MediaCodec::from_options(options))
    }
}

impl<U: FrameUpscaler, C: ContainerCodec> BatchUpscaler<U, C> {
    pub fn new(upscaler: U, codec: C) -> Self {
        Self { upscaler, codec }
    }

    pub fn upscaler(&self) -> &U {
        &self.upscaler
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Upscale a single file, choosing the pipeline from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`BatchScaleError::UnsupportedMedia`] for unknown extensions,
    /// plus anything the chosen pipeline returns.
    pub async fn upscale_one(
        &self,
        source: &Path,
        destination: &Path,
        options: &UpscaleOptions,
    ) -> Result<JobOutcome, BatchScaleError> {
        match MediaKind::require(source)? {
            MediaKind::Image => self.upscale_image(source, destination, options).await,
            MediaKind::Gif => self.upscale_gif(source, destination, options).await,
            MediaKind::Video => self.upscale_video(source, destination, options).await,
        }
    }

    /// Upscale a still image with one upscaler call.
    ///
    /// Cancelling the token in `options` kills the running upscaler. A scale
    /// of exactly 1 copies the source instead.
    pub async fn upscale_image(
        &self,
        source: &Path,
        destination: &Path,
        options: &UpscaleOptions,
    ) -> Result<JobOutcome, BatchScaleError> {
        options.validate()?;
        let output = naming::resolve_destination(source, destination, &options.rename, None);
        self.run_job(source, MediaKind::Image, output, options).await
    }

    /// Upscale an animated GIF frame by frame.
    pub async fn upscale_gif(
        &self,
        source: &Path,
        destination: &Path,
        options: &UpscaleOptions,
    ) -> Result<JobOutcome, BatchScaleError> {
        options.validate()?;
        let output = naming::resolve_destination(source, destination, &options.rename, Some("gif"));
        self.run_job(source, MediaKind::Gif, output, options).await
    }

    /// Upscale a video frame by frame and re-encode it to H.264.
    pub async fn upscale_video(
        &self,
        source: &Path,
        destination: &Path,
        options: &UpscaleOptions,
    ) -> Result<JobOutcome, BatchScaleError> {
        options.validate()?;
        let output = naming::resolve_destination(source, destination, &options.rename, Some("mp4"));
        self.run_job(source, MediaKind::Video, output, options).await
    }

    /// Upscale every still image in `source_directory`.
    ///
    /// Descends into subdirectories when the options ask for it; the
    /// relative layout is mirrored under `destination_directory`.
    pub async fn upscale_images(
        &self,
        source_directory: &Path,
        destination_directory: &Path,
        options: &UpscaleOptions,
        outer_progress: Arc<dyn ProgressCallback>,
    ) -> Result<BatchReport, BatchScaleError> {
        self.run_batch(
            source_directory,
            destination_directory,
            Some(MediaKind::Image),
            options,
            outer_progress,
        )
        .await
    }

    /// Upscale every GIF directly inside `source_directory`.
    pub async fn upscale_gifs(
        &self,
        source_directory: &Path,
        destination_directory: &Path,
        options: &UpscaleOptions,
        outer_progress: Arc<dyn ProgressCallback>,
    ) -> Result<BatchReport, BatchScaleError> {
        self.run_batch(
            source_directory,
            destination_directory,
            Some(MediaKind::Gif),
            options,
            outer_progress,
        )
        .await
    }

    /// Upscale every video directly inside `source_directory`.
    pub async fn upscale_videos(
        &self,
        source_directory: &Path,
        destination_directory: &Path,
        options: &UpscaleOptions,
        outer_progress: Arc<dyn ProgressCallback>,
    ) -> Result<BatchReport, BatchScaleError> {
        self.run_batch(
            source_directory,
            destination_directory,
            Some(MediaKind::Video),
            options,
            outer_progress,
        )
        .await
    }

    /// Upscale every supported file in `source_directory`.
    pub async fn upscale_many(
        &self,
        source_directory: &Path,
        destination_directory: &Path,
        options: &UpscaleOptions,
        outer_progress: Arc<dyn ProgressCallback>,
    ) -> Result<BatchReport, BatchScaleError> {
        self.run_batch(
            source_directory,
            destination_directory,
            None,
            options,
            outer_progress,
        )
        .await
    }

    async fn run_job(
        &self,
        source: &Path,
        kind: MediaKind,
        output: PathBuf,
        options: &UpscaleOptions,
    ) -> Result<JobOutcome, BatchScaleError> {
        let mut job = Job::new(source);
        let result = match kind {
            MediaKind::Image => self.image_job(source, output, options, &mut job).await,
            MediaKind::Gif => self.gif_job(source, output, options, &mut job).await,
            MediaKind::Video => self.video_job(source, output, options, &mut job).await,
        };
        job.finish(&result);
        result
    }

    async fn image_job(
        &self,
        source: &Path,
        output: PathBuf,
        options: &UpscaleOptions,
        job: &mut Job<'_>,
    ) -> Result<JobOutcome, BatchScaleError> {
        if !source.is_file() {
            return Err(BatchScaleError::FileOpen {
                path: source.to_path_buf(),
                reason: "no such file".to_string(),
            });
        }
        create_parent(&output)?;

        let mut tracker =
            ProgressTracker::new(options.progress.clone(), OperationType::ImageUpscale, 1);
        tracker.start();
        job.transition(JobState::Scheduling);

        if options.parameters.is_passthrough() {
            if options.cancellation.is_cancelled() {
                return Err(BatchScaleError::Cancelled);
            }
            if !same_file(source, &output) {
                fs::copy(source, &output)?;
            }
        } else {
            self.upscaler
                .upscale(source, &output, &options.parameters, &options.cancellation)
                .await?;
        }
        tracker.advance(Some(0));
        job.transition(JobState::Reassembled);

        Ok(JobOutcome {
            output,
            processed: 1,
            failed: 0,
            stopped: tracker.is_stopped(),
        })
    }

    async fn gif_job(
        &self,
        source: &Path,
        output: PathBuf,
        options: &UpscaleOptions,
        job: &mut Job<'_>,
    ) -> Result<JobOutcome, BatchScaleError> {
        let workspace =
            Workspace::create_in(&options.workspace_root, &naming::workspace_prefix(source))?;
        job.transition(JobState::WorkspaceAcquired);

        let decoded = self
            .codec
            .decode_animation(source, workspace.root())
            .await?;
        let stride = subsample_stride(decoded.len(), options.speed);
        let sources = decoded
            .into_iter()
            .map(|(path, delay)| (path, Some(delay)))
            .collect();
        let mut frames = FrameSet::from_sources(sources, workspace.upscaled(), FrameTiming::Delays);
        if frames.is_empty() {
            return Err(BatchScaleError::NoFrames(source.to_path_buf()));
        }
        frames.subsample(stride);
        log::debug!(
            "{}: keeping {} frames (stride {stride})",
            source.display(),
            frames.len()
        );
        job.transition(JobState::Decomposed);

        job.transition(JobState::Scheduling);
        let report = self
            .process_frames(&mut frames, options, OperationType::GifUpscale)
            .await;
        let (completed, failed, stopped) = settle(source, report)?;

        let delays: HashMap<usize, u16> = frames
            .frames()
            .iter()
            .map(|frame| (frame.index, frame.delay.unwrap_or(0)))
            .collect();
        let (paths, delays): (Vec<PathBuf>, Vec<u16>) = completed
            .into_iter()
            .map(|frame| {
                let delay = delays.get(&frame.index).copied().unwrap_or(0);
                (frame.output, delay)
            })
            .unzip();
        let processed = paths.len();

        let mut timing = AnimationTiming::new(paths, delays).ok_or_else(|| {
            BatchScaleError::GifEncodeError("frame and delay counts differ".to_string())
        })?;
        timing.slow_down(options.speed);
        if options.reverse {
            timing.reverse();
        }
        job.transition(JobState::TimingCorrected);

        create_parent(&output)?;
        let (paths, delays) = timing.into_parts();
        let gif_options = GifOptions::new().with_transparency(options.transparent);
        self.codec
            .encode_animation(paths, delays, &output, &gif_options)
            .await?;
        job.transition(JobState::Reassembled);

        workspace.release();
        Ok(JobOutcome {
            output,
            processed,
            failed,
            stopped,
        })
    }

    async fn video_job(
        &self,
        source: &Path,
        output: PathBuf,
        options: &UpscaleOptions,
        job: &mut Job<'_>,
    ) -> Result<JobOutcome, BatchScaleError> {
        let workspace =
            Workspace::create_in(&options.workspace_root, &naming::workspace_prefix(source))?;
        job.transition(JobState::WorkspaceAcquired);

        let extracted = self
            .codec
            .extract_video(source, workspace.root(), &workspace.audio_path("mka"))
            .await?;
        let metadata = extracted.metadata;
        let sources = extracted
            .frames
            .into_iter()
            .map(|path| (path, None))
            .collect();
        let mut frames = FrameSet::from_sources(
            sources,
            workspace.upscaled(),
            FrameTiming::Framerate {
                framerate: metadata.frames_per_second,
                duration: metadata.duration,
            },
        );
        if frames.is_empty() {
            return Err(BatchScaleError::NoFrames(source.to_path_buf()));
        }
        job.transition(JobState::Decomposed);

        job.transition(JobState::Scheduling);
        let report = self
            .process_frames(&mut frames, options, OperationType::VideoUpscale)
            .await;
        let (completed, failed, stopped) = settle(source, report)?;
        let processed = completed.len();
        let paths: Vec<PathBuf> = completed.into_iter().map(|frame| frame.output).collect();

        create_parent(&output)?;
        let timing = VideoTiming::new(options.speed, options.reverse);
        let sequence = workspace.file("sequence");
        let audio = extracted.audio.as_deref();

        if timing.needs_correction() {
            let intermediate = workspace.file("intermediate.mp4");
            self.codec
                .encode_video(&VideoEncodeRequest {
                    frames: &paths,
                    framerate: metadata.frames_per_second,
                    audio,
                    timing,
                    quality: options.video_quality,
                    scratch: &sequence,
                    destination: &intermediate,
                })
                .await?;

            let measured = self.codec.probe_duration(&intermediate).await?;
            let original = metadata.duration_of(processed);
            let factor = correction_factor(original, options.speed, measured);
            log::debug!(
                "{}: encoded {measured:?}, wanted {:?}, correcting by {factor}",
                source.display(),
                original.div_f64(options.speed)
            );
            job.transition(JobState::TimingCorrected);

            self.codec
                .retime_video(
                    &intermediate,
                    &output,
                    factor,
                    audio.is_some(),
                    options.video_quality,
                )
                .await?;
        } else {
            self.codec
                .encode_video(&VideoEncodeRequest {
                    frames: &paths,
                    framerate: metadata.frames_per_second,
                    audio,
                    timing,
                    quality: options.video_quality,
                    scratch: &sequence,
                    destination: &output,
                })
                .await?;
        }
        job.transition(JobState::Reassembled);

        workspace.release();
        Ok(JobOutcome {
            output,
            processed,
            failed,
            stopped,
        })
    }

    /// Upscale the frames of one job, or pass them through at scale 1.
    ///
    /// Frames in flight are never interrupted; the job's token only stops
    /// further groups from being dispatched.
    async fn process_frames(
        &self,
        frames: &mut FrameSet,
        options: &UpscaleOptions,
        operation: OperationType,
    ) -> ScheduleReport {
        let scheduler =
            BatchScheduler::new(options.parallel_frames).with_optional_limit(options.limit);

        if options.parameters.is_passthrough() {
            frames.pass_through();
            return scheduler
                .run(
                    frames.frames(),
                    |frame: &Frame| std::future::ready(Ok(frame.destination.clone())),
                    options.progress.clone(),
                    operation,
                    &options.cancellation,
                )
                .await;
        }

        let upscaler = &self.upscaler;
        let parameters = &options.parameters;
        let uninterrupted = CancellationToken::new();
        let uninterrupted = &uninterrupted;
        scheduler
            .run(
                frames.frames(),
                |frame: &Frame| {
                    let source = frame.source.clone();
                    let destination = frame.destination.clone();
                    async move {
                        upscaler
                            .upscale(&source, &destination, parameters, uninterrupted)
                            .await
                    }
                },
                options.progress.clone(),
                operation,
                &options.cancellation,
            )
            .await
    }

    async fn run_batch(
        &self,
        source_directory: &Path,
        destination_directory: &Path,
        kind: Option<MediaKind>,
        options: &UpscaleOptions,
        outer_progress: Arc<dyn ProgressCallback>,
    ) -> Result<BatchReport, BatchScaleError> {
        options.validate()?;
        if !source_directory.is_dir() {
            return Err(BatchScaleError::Configuration(format!(
                "{} is not a directory",
                source_directory.display()
            )));
        }
        fs::create_dir_all(destination_directory)?;

        let descend = options.recursive && matches!(kind, None | Some(MediaKind::Image));
        let walker = WalkDir::new(source_directory)
            .min_depth(1)
            .max_depth(if descend { usize::MAX } else { 1 })
            .sort_by_file_name();

        // Only still images are picked up below the top level.
        let items: Vec<(PathBuf, MediaKind)> = walker
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    log::warn!("Skipping unreadable entry: {error}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let detected = MediaKind::detect(entry.path())?;
                let wanted = kind.is_none_or(|kind| kind == detected);
                let reachable = entry.depth() == 1 || detected == MediaKind::Image;
                (wanted && reachable).then(|| (entry.into_path(), detected))
            })
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        log::info!(
            "Found {} files to upscale in {}",
            items.len(),
            source_directory.display()
        );

        // The limit counts files here, not frames within each file.
        let mut job_options = options.clone();
        job_options.limit = None;

        let mut tracker = ProgressTracker::new(outer_progress, OperationType::Batch, items.len() as u64);
        tracker.start();
        let mut report = BatchReport::default();

        for (position, (path, detected)) in items.into_iter().enumerate() {
            if tracker.is_stopped() || options.cancellation.is_cancelled() {
                report.stopped = true;
                break;
            }

            let relative_parent = path
                .parent()
                .and_then(|parent| parent.strip_prefix(source_directory).ok())
                .unwrap_or_else(|| Path::new(""));
            let extension = match detected {
                MediaKind::Image => None,
                MediaKind::Gif => Some("gif"),
                MediaKind::Video => Some("mp4"),
            };
            let output = naming::output_in_directory(
                &path,
                &destination_directory.join(relative_parent),
                &job_options.rename,
                extension,
            );

            if !options.overwrite && output.exists() {
                log::warn!("Skipping {}: {} already exists", path.display(), output.display());
                report.skipped.push((path, BatchScaleError::OutputExists(output)));
                tracker.advance(Some(position as u64));
                continue;
            }

            match self.run_job(&path, detected, output, &job_options).await {
                Ok(outcome) => {
                    let job_stopped = outcome.stopped;
                    report.outputs.push(outcome);
                    if job_stopped {
                        report.stopped = true;
                        tracker.advance(Some(position as u64));
                        break;
                    }
                }
                Err(BatchScaleError::Cancelled) => {
                    report.stopped = true;
                    break;
                }
                Err(error @ BatchScaleError::Configuration(_)) => return Err(error),
                Err(error) => {
                    log::warn!("Skipping {}: {error}", path.display());
                    report.skipped.push((path, error));
                }
            }
            tracker.advance(Some(position as u64));
        }

        report.stopped |= tracker.is_stopped();
        Ok(report)
    }
}

/// Whether both paths resolve to the same existing file.
fn same_file(first: &Path, second: &Path) -> bool {
    match (fs::canonicalize(first), fs::canonicalize(second)) {
        (Ok(first), Ok(second)) => first == second,
        _ => false,
    }
}

fn create_parent(path: &Path) -> Result<(), BatchScaleError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

/// Split a scheduler report into completed frames, failure count and stop flag.
///
/// A job with nothing to reassemble fails: with `Cancelled` when it was
/// stopped, otherwise with its first frame error.
fn settle(
    source: &Path,
    report: ScheduleReport,
) -> Result<(Vec<CompletedFrame>, usize, bool), BatchScaleError> {
    if report.completed.is_empty() {
        if report.stopped {
            return Err(BatchScaleError::Cancelled);
        }
        return Err(report
            .failures
            .into_iter()
            .next()
            .map(|(_, error)| error)
            .unwrap_or_else(|| BatchScaleError::NoFrames(source.to_path_buf())));
    }
    Ok((report.completed, report.failures.len(), report.stopped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_states_are_ordered() {
        assert!(JobState::Pending < JobState::WorkspaceAcquired);
        assert!(JobState::TimingCorrected < JobState::Reassembled);
        assert!(JobState::Released < JobState::Failed);
    }

    #[test]
    fn settle_prefers_cancellation_over_frame_errors() {
        let report = ScheduleReport {
            failures: vec![(0, BatchScaleError::NoVideoStream)],
            stopped: true,
            ..ScheduleReport::default()
        };
        assert!(matches!(
            settle(Path::new("a.gif"), report),
            Err(BatchScaleError::Cancelled)
        ));
    }

    #[test]
    fn settle_surfaces_the_first_frame_error() {
        let report = ScheduleReport {
            failures: vec![
                (3, BatchScaleError::Configuration("first".to_string())),
                (4, BatchScaleError::NoVideoStream),
            ],
            total: 2,
            ..ScheduleReport::default()
        };
        match settle(Path::new("a.gif"), report) {
            Err(BatchScaleError::Configuration(message)) => assert_eq!(message, "first"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn settle_reports_empty_jobs() {
        assert!(matches!(
            settle(Path::new("a.gif"), ScheduleReport::default()),
            Err(BatchScaleError::NoFrames(_))
        ));
    }

    #[test]
    fn settle_keeps_partial_results() {
        let report = ScheduleReport {
            completed: vec![CompletedFrame {
                index: 1,
                output: PathBuf::from("b.png"),
            }],
            failures: vec![(0, BatchScaleError::NoVideoStream)],
            total: 2,
            groups_dispatched: 1,
            stopped: false,
        };
        let (completed, failed, stopped) = settle(Path::new("a.gif"), report).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(failed, 1);
        assert!(!stopped);
    }
}
