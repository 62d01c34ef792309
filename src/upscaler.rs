//! Single-image upscaling.
//!
//! [`FrameUpscaler`] is the seam between the pipeline and whatever turns one
//! image file into a larger one. [`Waifu2x`] implements it by running a
//! `waifu2x-converter-cpp` compatible executable.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::configuration::{UpscaleOptions, UpscaleParameters};
use crate::error::BatchScaleError;
use crate::process::{self, Interrupt};
use crate::progress::CancellationToken;

/// Turns one image file into an upscaled image file.
pub trait FrameUpscaler: Send + Sync {
    /// Upscale `source` into `destination` and return the written path.
    ///
    /// When `cancellation` fires the implementation should abandon the work
    /// and return [`BatchScaleError::Cancelled`]. The scheduler passes a token
    /// that never fires, so frames already in flight always finish.
    fn upscale(
        &self,
        source: &Path,
        destination: &Path,
        parameters: &UpscaleParameters,
        cancellation: &CancellationToken,
    ) -> impl Future<Output = Result<PathBuf, BatchScaleError>> + Send;
}

/// Runs a waifu2x executable once per image.
#[derive(Debug, Clone)]
pub struct Waifu2x {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl Waifu2x {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
        }
    }

    /// Build an upscaler from the executable and timeout in `options`.
    pub fn from_options(options: &UpscaleOptions) -> Self {
        Self {
            executable: options.upscaler_path.clone(),
            timeout: options.process_timeout,
        }
    }

    /// Kill any invocation that runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command-line arguments for one invocation.
    pub fn arguments(
        &self,
        source: &Path,
        destination: &Path,
        parameters: &UpscaleParameters,
    ) -> Vec<String> {
        let mut arguments = vec![
            "-i".to_string(),
            source.display().to_string(),
            "-o".to_string(),
            destination.display().to_string(),
            "-m".to_string(),
            parameters.mode.as_str().to_string(),
            "--scale-ratio".to_string(),
            format_scale(parameters.scale),
        ];

        if let Some(noise) = parameters.noise {
            arguments.extend(["--noise-level".to_string(), noise.to_string()]);
        }
        if let Some(block_size) = parameters.block_size {
            arguments.extend(["--block-size".to_string(), block_size.to_string()]);
        }
        if let Some(level) = parameters.png_compression {
            arguments.extend(["--png-compression".to_string(), level.to_string()]);
        }
        if let Some(quality) = parameters.quality {
            arguments.extend(["--image-quality".to_string(), quality.to_string()]);
        }
        if parameters.disable_gpu {
            arguments.push("--disable-gpu".to_string());
        }
        if parameters.force_opencl {
            arguments.push("--force-OpenCL".to_string());
        }
        if let Some(processor) = parameters.processor {
            arguments.extend(["-p".to_string(), processor.to_string()]);
        }
        if let Some(threads) = parameters.threads {
            arguments.extend(["-j".to_string(), threads.max(1).to_string()]);
        }
        if let Some(model_directory) = &parameters.model_directory {
            arguments.extend(["--model-dir".to_string(), model_directory.display().to_string()]);
        }
        arguments
    }
}

impl FrameUpscaler for Waifu2x {
    async fn upscale(
        &self,
        source: &Path,
        destination: &Path,
        parameters: &UpscaleParameters,
        cancellation: &CancellationToken,
    ) -> Result<PathBuf, BatchScaleError> {
        let mut command = Command::new(&self.executable);
        command.args(self.arguments(source, destination, parameters));

        process::run(command, Interrupt::OnCancel(cancellation), self.timeout).await?;

        if !destination.exists() {
            return Err(BatchScaleError::UnexpectedOutput {
                program: self.executable.display().to_string(),
                reason: format!("{} was not written", destination.display()),
            });
        }
        Ok(destination.to_path_buf())
    }
}

/// Integral scales print without a fractional part.
fn format_scale(scale: f64) -> String {
    if scale.fract() == 0.0 {
        format!("{}", scale as i64)
    } else {
        scale.to_string()
    }
}
