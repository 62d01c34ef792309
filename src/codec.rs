//! Container decomposition and reassembly.
//!
//! [`ContainerCodec`] is the seam between the pipeline and the tools that
//! split a GIF or video into frames and put them back together.
//! [`MediaCodec`] implements it with the `gif` crate, `ffmpeg-next` probing,
//! and the `ffmpeg` executable. CPU-bound GIF work and blocking probes run
//! on Tokio's blocking pool.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::configuration::UpscaleOptions;
use crate::error::BatchScaleError;
use crate::gif::{self, GifOptions};
use crate::metadata::VideoMetadata;
use crate::probe::MediaProbe;
use crate::video::{Ffmpeg, VideoEncodeRequest};

/// A decomposed video.
#[derive(Debug, Clone)]
pub struct ExtractedVideo {
    /// Extracted frames in presentation order.
    pub frames: Vec<PathBuf>,
    pub metadata: VideoMetadata,
    /// Extracted audio track, when the source has one and it could be copied.
    pub audio: Option<PathBuf>,
}

/// Splits containers into frames and reassembles them.
pub trait ContainerCodec: Send + Sync {
    /// Decode an animated GIF into full-canvas frames inside `directory`.
    ///
    /// Returns `(frame, delay)` pairs in presentation order, delays in
    /// hundredths of a second.
    fn decode_animation(
        &self,
        source: &Path,
        directory: &Path,
    ) -> impl Future<Output = Result<Vec<(PathBuf, u16)>, BatchScaleError>> + Send;

    /// Encode `frames` with index-aligned `delays` into an animated GIF.
    fn encode_animation(
        &self,
        frames: Vec<PathBuf>,
        delays: Vec<u16>,
        destination: &Path,
        options: &GifOptions,
    ) -> impl Future<Output = Result<(), BatchScaleError>> + Send;

    /// Extract the frames of `source` into `directory` and its audio into
    /// `audio_destination`.
    ///
    /// A missing or uncopyable audio track is not an error.
    fn extract_video(
        &self,
        source: &Path,
        directory: &Path,
        audio_destination: &Path,
    ) -> impl Future<Output = Result<ExtractedVideo, BatchScaleError>> + Send;

    /// Encode a frame sequence, applying the request's speed and direction.
    fn encode_video(
        &self,
        request: &VideoEncodeRequest<'_>,
    ) -> impl Future<Output = Result<(), BatchScaleError>> + Send;

    /// Re-encode `source` with presentation timestamps scaled by `factor`.
    fn retime_video(
        &self,
        source: &Path,
        destination: &Path,
        factor: f64,
        has_audio: bool,
        quality: u8,
    ) -> impl Future<Output = Result<(), BatchScaleError>> + Send;

    /// Duration of an encoded file.
    fn probe_duration(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Duration, BatchScaleError>> + Send;
}

/// The production codec.
#[derive(Debug, Clone)]
pub struct MediaCodec {
    ffmpeg: Ffmpeg,
}

impl Default for MediaCodec {
    fn default() -> Self {
        Self::new(Ffmpeg::new("ffmpeg"))
    }
}

impl MediaCodec {
    pub fn new(ffmpeg: Ffmpeg) -> Self {
        Self { ffmpeg }
    }

    /// Build a codec from the ffmpeg path, log level and timeout in `options`.
    pub fn from_options(options: &UpscaleOptions) -> Self {
        Self::new(
            Ffmpeg::new(options.ffmpeg_path.clone())
                .with_log_level(options.ffmpeg_log_level)
                .with_timeout(options.process_timeout),
        )
    }
}

impl ContainerCodec for MediaCodec {
    async fn decode_animation(
        &self,
        source: &Path,
        directory: &Path,
    ) -> Result<Vec<(PathBuf, u16)>, BatchScaleError> {
        let source = source.to_path_buf();
        let directory = directory.to_path_buf();
        tokio::task::spawn_blocking(move || gif::decode_frames(&source, &directory)).await?
    }

    async fn encode_animation(
        &self,
        frames: Vec<PathBuf>,
        delays: Vec<u16>,
        destination: &Path,
        options: &GifOptions,
    ) -> Result<(), BatchScaleError> {
        let destination = destination.to_path_buf();
        let options = options.clone();
        tokio::task::spawn_blocking(move || {
            gif::encode_frames(&frames, &delays, &destination, &options)
        })
        .await?
    }

    async fn extract_video(
        &self,
        source: &Path,
        directory: &Path,
        audio_destination: &Path,
    ) -> Result<ExtractedVideo, BatchScaleError> {
        let probe_path = source.to_path_buf();
        let metadata = tokio::task::spawn_blocking(move || MediaProbe::probe(probe_path)).await??;
        log::debug!(
            "{}: {}x{} at {:.3} fps, {:?}, audio={}",
            source.display(),
            metadata.width,
            metadata.height,
            metadata.frames_per_second,
            metadata.duration,
            metadata.has_audio
        );

        let frames = self.ffmpeg.extract_frames(source, directory).await?;

        let audio = if metadata.has_audio {
            match self.ffmpeg.extract_audio(source, audio_destination).await {
                Ok(()) => Some(audio_destination.to_path_buf()),
                Err(error) => {
                    log::warn!(
                        "Continuing without audio for {}: {error}",
                        source.display()
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(ExtractedVideo {
            frames,
            metadata,
            audio,
        })
    }

    async fn encode_video(&self, request: &VideoEncodeRequest<'_>) -> Result<(), BatchScaleError> {
        self.ffmpeg.encode(request).await
    }

    async fn retime_video(
        &self,
        source: &Path,
        destination: &Path,
        factor: f64,
        has_audio: bool,
        quality: u8,
    ) -> Result<(), BatchScaleError> {
        self.ffmpeg
            .retime(source, destination, factor, has_audio, quality)
            .await
    }

    async fn probe_duration(&self, path: &Path) -> Result<Duration, BatchScaleError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || MediaProbe::duration(path)).await?
    }
}
