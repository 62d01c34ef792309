//! Job configuration.
//!
//! [`UpscaleOptions`] is a builder that carries every setting of an upscale
//! job: the parameters forwarded to the external upscaler, the playback
//! speed and direction applied during reassembly, scheduling limits, and the
//! progress callback and cancellation token.
//!
//! # Example
//!
//! ```no_run
//! use batchscale::{CancellationToken, UpscaleOptions};
//!
//! let token = CancellationToken::new();
//! let options = UpscaleOptions::new()
//!     .with_scale(2.0)
//!     .with_noise(1)
//!     .with_parallel_frames(4)
//!     .with_speed(1.5)
//!     .with_reverse(true)
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BatchScaleError;
use crate::ffmpeg::FfmpegLogLevel;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Which processing the upscaler performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpscaleMode {
    /// Denoise only.
    Noise,
    /// Scale only.
    Scale,
    /// Denoise and scale. This is the default.
    #[default]
    NoiseScale,
}

impl UpscaleMode {
    /// The name the upscaler executable understands.
    pub fn as_str(self) -> &'static str {
        match self {
            UpscaleMode::Noise => "noise",
            UpscaleMode::Scale => "scale",
            UpscaleMode::NoiseScale => "noise-scale",
        }
    }
}

/// Settings forwarded to the external single-image upscaler.
///
/// `None` fields are left to the executable's own defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct UpscaleParameters {
    /// Upscale ratio. A ratio of exactly 1 bypasses the upscaler.
    pub scale: f64,
    /// Denoise level, −1 (none) to 3.
    pub noise: Option<i8>,
    /// Processing mode.
    pub mode: UpscaleMode,
    /// Tile size for GPU processing.
    pub block_size: Option<u32>,
    /// PNG compression level, 0 to 9.
    pub png_compression: Option<u8>,
    /// JPEG/WebP output quality, 0 to 101.
    pub quality: Option<u8>,
    /// Run on the CPU.
    pub disable_gpu: bool,
    /// Prefer the alternate (OpenCL) backend.
    pub force_opencl: bool,
    /// GPU or processor index.
    pub processor: Option<i32>,
    /// Worker thread count inside the upscaler.
    pub threads: Option<u32>,
    /// Directory containing the upscaler's model files.
    pub model_directory: Option<PathBuf>,
}

impl Default for UpscaleParameters {
    fn default() -> Self {
        Self {
            scale: 2.0,
            noise: None,
            mode: UpscaleMode::default(),
            block_size: None,
            png_compression: None,
            quality: None,
            disable_gpu: false,
            force_opencl: false,
            processor: None,
            threads: None,
            model_directory: None,
        }
    }
}

impl UpscaleParameters {
    /// Returns `true` when the job only renames or re-containers its input.
    pub fn is_passthrough(&self) -> bool {
        self.scale == 1.0
    }
}

/// Configuration for one upscale job (or every job of a directory batch).
///
/// All fields have defaults; a default-constructed value upscales 2× with
/// one frame in flight at a time and no speed or direction change.
#[derive(Clone)]
pub struct UpscaleOptions {
    pub(crate) parameters: UpscaleParameters,
    /// Playback speed multiplier for GIF and video output.
    pub(crate) speed: f64,
    /// Play GIF and video output backwards.
    pub(crate) reverse: bool,
    /// Frames upscaled concurrently within one group.
    pub(crate) parallel_frames: usize,
    /// Frames per job (GIF/video) or files per directory batch.
    pub(crate) limit: Option<usize>,
    /// Suffix appended to the source stem when the destination is a directory.
    pub(crate) rename: String,
    /// Descend into subdirectories in still-image directory batches.
    pub(crate) recursive: bool,
    /// Keep transparency when re-encoding GIFs.
    pub(crate) transparent: bool,
    /// Replace existing outputs in directory batches.
    pub(crate) overwrite: bool,
    /// Video constant rate factor handed to the encoder.
    pub(crate) video_quality: u8,
    /// Path or name of the upscaler executable.
    pub(crate) upscaler_path: PathBuf,
    /// Path or name of the ffmpeg executable.
    pub(crate) ffmpeg_path: PathBuf,
    /// Verbosity passed to the ffmpeg executable.
    pub(crate) ffmpeg_log_level: FfmpegLogLevel,
    /// Root under which job workspaces are created.
    pub(crate) workspace_root: PathBuf,
    /// Deadline for a single external process call. `None` waits forever.
    pub(crate) process_timeout: Option<Duration>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: CancellationToken,
}

impl Debug for UpscaleOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("UpscaleOptions")
            .field("parameters", &self.parameters)
            .field("speed", &self.speed)
            .field("reverse", &self.reverse)
            .field("parallel_frames", &self.parallel_frames)
            .field("limit", &self.limit)
            .field("rename", &self.rename)
            .field("recursive", &self.recursive)
            .field("transparent", &self.transparent)
            .field("overwrite", &self.overwrite)
            .field("video_quality", &self.video_quality)
            .field("upscaler_path", &self.upscaler_path)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("ffmpeg_log_level", &self.ffmpeg_log_level)
            .field("workspace_root", &self.workspace_root)
            .field("process_timeout", &self.process_timeout)
            .field("is_cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for UpscaleOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl UpscaleOptions {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            parameters: UpscaleParameters::default(),
            speed: 1.0,
            reverse: false,
            parallel_frames: 1,
            limit: None,
            rename: "2x".to_string(),
            recursive: false,
            transparent: false,
            overwrite: false,
            video_quality: 16,
            upscaler_path: PathBuf::from("waifu2x-converter-cpp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffmpeg_log_level: FfmpegLogLevel::default(),
            workspace_root: std::env::temp_dir().join("batchscale"),
            process_timeout: None,
            progress: Arc::new(NoOpProgress),
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the upscale ratio.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.parameters.scale = scale;
        self
    }

    /// Set the denoise level (−1 to 3).
    #[must_use]
    pub fn with_noise(mut self, noise: i8) -> Self {
        self.parameters.noise = Some(noise);
        self
    }

    /// Set the processing mode.
    #[must_use]
    pub fn with_mode(mut self, mode: UpscaleMode) -> Self {
        self.parameters.mode = mode;
        self
    }

    /// Set the GPU tile size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.parameters.block_size = Some(block_size);
        self
    }

    /// Set the PNG compression level (0 to 9).
    #[must_use]
    pub fn with_png_compression(mut self, level: u8) -> Self {
        self.parameters.png_compression = Some(level);
        self
    }

    /// Set JPEG/WebP output quality (0 to 101).
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.parameters.quality = Some(quality);
        self
    }

    /// Run the upscaler on the CPU.
    #[must_use]
    pub fn with_gpu_disabled(mut self, disabled: bool) -> Self {
        self.parameters.disable_gpu = disabled;
        self
    }

    /// Force the alternate (OpenCL) backend.
    #[must_use]
    pub fn with_force_opencl(mut self, force: bool) -> Self {
        self.parameters.force_opencl = force;
        self
    }

    /// Select the GPU or processor index.
    #[must_use]
    pub fn with_processor(mut self, index: i32) -> Self {
        self.parameters.processor = Some(index);
        self
    }

    /// Set the upscaler's internal thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.parameters.threads = Some(threads);
        self
    }

    /// Set the directory holding the upscaler's models.
    #[must_use]
    pub fn with_model_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.parameters.model_directory = Some(directory.into());
        self
    }

    /// Set the playback speed multiplier for GIF and video output.
    #[must_use]
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Reverse GIF and video playback.
    #[must_use]
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Set how many frames are upscaled concurrently. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_parallel_frames(mut self, parallel: usize) -> Self {
        self.parallel_frames = parallel.max(1);
        self
    }

    /// Limit the number of frames per job, or files per directory batch.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the suffix appended to output file names.
    #[must_use]
    pub fn with_rename(mut self, rename: impl Into<String>) -> Self {
        self.rename = rename.into();
        self
    }

    /// Descend into subdirectories when batching still images.
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Preserve GIF transparency.
    #[must_use]
    pub fn with_transparency(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Let directory batches replace outputs that already exist.
    ///
    /// Without it, a batch item whose output exists is skipped with
    /// [`BatchScaleError::OutputExists`](crate::BatchScaleError::OutputExists).
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the video constant rate factor (lower is better quality).
    #[must_use]
    pub fn with_video_quality(mut self, crf: u8) -> Self {
        self.video_quality = crf;
        self
    }

    /// Set the upscaler executable.
    #[must_use]
    pub fn with_upscaler_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.upscaler_path = path.into();
        self
    }

    /// Set the ffmpeg executable.
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Set the verbosity of the ffmpeg executable.
    #[must_use]
    pub fn with_ffmpeg_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.ffmpeg_log_level = level;
        self
    }

    /// Set the directory under which job workspaces are created.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Kill any single external process that runs longer than `timeout`.
    #[must_use]
    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = Some(timeout);
        self
    }

    /// Attach the per-job progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The parameters forwarded to the upscaler.
    pub fn parameters(&self) -> &UpscaleParameters {
        &self.parameters
    }

    /// The cancellation token shared by this job.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Check every option for values the pipeline cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`BatchScaleError::Configuration`] describing the first
    /// invalid option.
    pub fn validate(&self) -> Result<(), BatchScaleError> {
        let parameters = &self.parameters;
        if !parameters.scale.is_finite() || parameters.scale <= 0.0 {
            return Err(BatchScaleError::Configuration(format!(
                "scale must be a positive number, got {}",
                parameters.scale
            )));
        }
        if let Some(noise) = parameters.noise {
            if !(-1..=3).contains(&noise) {
                return Err(BatchScaleError::Configuration(format!(
                    "noise must be between -1 and 3, got {noise}"
                )));
            }
        }
        if let Some(level) = parameters.png_compression {
            if level > 9 {
                return Err(BatchScaleError::Configuration(format!(
                    "png compression must be between 0 and 9, got {level}"
                )));
            }
        }
        if let Some(quality) = parameters.quality {
            if quality > 101 {
                return Err(BatchScaleError::Configuration(format!(
                    "quality must be between 0 and 101, got {quality}"
                )));
            }
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(BatchScaleError::Configuration(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        if self.video_quality > 51 {
            return Err(BatchScaleError::Configuration(format!(
                "video quality (crf) must be between 0 and 51, got {}",
                self.video_quality
            )));
        }
        if self.upscaler_path.as_os_str().is_empty() || self.ffmpeg_path.as_os_str().is_empty() {
            return Err(BatchScaleError::Configuration(
                "executable paths must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
