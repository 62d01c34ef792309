//! Error types for the `batchscale` crate.
//!
//! This module defines [`BatchScaleError`], the unified error type returned by
//! every fallible operation in the crate. Variants fall into three families:
//! external-process failures (recoverable per frame, and per item inside a
//! directory batch), configuration errors (always fatal), and workspace
//! errors (fatal on creation, logged and swallowed on removal).

use std::{io::Error as IoError, path::PathBuf, process::ExitStatus, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `batchscale` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BatchScaleError {
    /// An external program exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    ExternalProcess {
        /// Program that was invoked (upscaler or ffmpeg).
        program: String,
        /// Exit status reported by the operating system.
        status: ExitStatus,
        /// Trimmed standard error output of the process.
        stderr: String,
    },

    /// An external program could not be started at all.
    #[error("Failed to start {program}: {reason}")]
    ProcessSpawn {
        /// Program that was invoked.
        program: String,
        /// Underlying reason.
        reason: String,
    },

    /// An external program ran longer than the configured timeout and was killed.
    #[error("{program} did not finish within {timeout:?}")]
    ProcessTimeout {
        /// Program that was invoked.
        program: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// An external program produced output the pipeline could not use.
    #[error("Unexpected output from {program}: {reason}")]
    UnexpectedOutput {
        /// Program that was invoked.
        program: String,
        /// What was wrong with the output.
        reason: String,
    },

    /// An option or path is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The job workspace could not be created.
    #[error("Workspace error at {path}: {reason}")]
    Workspace {
        /// Workspace root.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// A directory batch would replace an existing output.
    #[error("Output already exists: {0}")]
    OutputExists(PathBuf),

    /// The source file does not have a supported image, GIF, or video extension.
    #[error("Unsupported media file: {0}")]
    UnsupportedMedia(PathBuf),

    /// The media file could not be opened for probing.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was probed.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// Decomposition produced no frames.
    #[error("No frames were extracted from {0}")]
    NoFrames(PathBuf),

    /// An animated GIF could not be decoded.
    #[error("GIF decoding error: {0}")]
    GifDecodeError(String),

    /// An animated GIF could not be encoded.
    #[error("GIF encoding error: {0}")]
    GifEncodeError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while reading or writing frames.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// A blocking worker task panicked or was aborted.
    #[error("Background task failed: {0}")]
    TaskJoin(String),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl BatchScaleError {
    /// Returns `true` for failures raised by an external program.
    ///
    /// These are the failures a directory batch skips over.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            BatchScaleError::ExternalProcess { .. }
                | BatchScaleError::ProcessSpawn { .. }
                | BatchScaleError::ProcessTimeout { .. }
                | BatchScaleError::UnexpectedOutput { .. }
        )
    }
}

impl From<FfmpegError> for BatchScaleError {
    fn from(error: FfmpegError) -> Self {
        BatchScaleError::FfmpegError(error.to_string())
    }
}

impl From<tokio::task::JoinError> for BatchScaleError {
    fn from(error: tokio::task::JoinError) -> Self {
        BatchScaleError::TaskJoin(error.to_string())
    }
}
