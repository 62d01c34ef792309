//! # batchscale
//!
//! Batch-upscale still images, animated GIFs and videos with an external
//! single-image upscaler.
//!
//! Every input is decomposed into an ordered sequence of frames, each frame
//! is run through the upscaler in bounded concurrent groups, and the results
//! are reassembled into the original container with the requested playback
//! speed and direction.
//!
//! ## Quick Start
//!
//! ### Upscale One File
//!
//! ```no_run
//! use batchscale::{BatchUpscaler, UpscaleOptions};
//!
//! # async fn example() -> Result<(), batchscale::BatchScaleError> {
//! let options = UpscaleOptions::new().with_scale(2.0).with_noise(1);
//! let upscaler = BatchUpscaler::from_options(&options);
//! let outcome = upscaler
//!     .upscale_one("photo.png".as_ref(), "out/".as_ref(), &options)
//!     .await?;
//! println!("wrote {}", outcome.output.display());
//! # Ok(())
//! # }
//! ```
//!
//! ### Upscale a GIF Faster and Backwards
//!
//! ```no_run
//! use batchscale::{BatchUpscaler, UpscaleOptions};
//!
//! # async fn example() -> Result<(), batchscale::BatchScaleError> {
//! let options = UpscaleOptions::new()
//!     .with_parallel_frames(4)
//!     .with_speed(2.0)
//!     .with_reverse(true);
//! let upscaler = BatchUpscaler::from_options(&options);
//! upscaler
//!     .upscale_gif("cat.gif".as_ref(), "cat_fast.gif".as_ref(), &options)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Upscale a Directory With Progress
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use batchscale::{BatchUpscaler, ProgressAction, ProgressInfo, UpscaleOptions};
//!
//! # async fn example() -> Result<(), batchscale::BatchScaleError> {
//! let options = UpscaleOptions::new().with_recursive(true);
//! let upscaler = BatchUpscaler::from_options(&options);
//! let report = upscaler
//!     .upscale_images(
//!         "photos".as_ref(),
//!         "photos_2x".as_ref(),
//!         &options,
//!         Arc::new(|info: &ProgressInfo| {
//!             println!("{}/{}", info.current, info.total);
//!             ProgressAction::Continue
//!         }),
//!     )
//!     .await?;
//! println!("{} done, {} skipped", report.outputs.len(), report.skipped.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build the crate. At
//! run time the `ffmpeg` executable and a `waifu2x-converter-cpp`
//! compatible upscaler must be on the `PATH` (or configured explicitly).

pub mod codec;
pub mod configuration;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod gif;
pub mod metadata;
pub mod naming;
pub mod pipeline;
pub mod probe;
pub mod process;
pub mod progress;
pub mod scheduler;
pub mod timing;
pub mod upscaler;
pub mod video;
pub mod workspace;

pub use codec::{ContainerCodec, ExtractedVideo, MediaCodec};
pub use configuration::{UpscaleMode, UpscaleOptions, UpscaleParameters};
pub use error::BatchScaleError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::{Frame, FrameSet, FrameTiming};
pub use gif::GifOptions;
pub use metadata::VideoMetadata;
pub use naming::MediaKind;
pub use pipeline::{BatchReport, BatchUpscaler, JobOutcome, JobState};
pub use probe::MediaProbe;
pub use progress::{
    CancellationToken, OperationType, ProgressAction, ProgressCallback, ProgressInfo,
};
pub use scheduler::{BatchScheduler, CompletedFrame, ScheduleReport};
pub use timing::{AnimationTiming, VideoTiming};
pub use upscaler::{FrameUpscaler, Waifu2x};
pub use video::{Ffmpeg, VideoEncodeRequest};
pub use workspace::Workspace;
