//! Lightweight media file probing.
//!
//! [`MediaProbe`] opens a file with FFmpeg, reads what the pipeline needs
//! (frame rate, duration, audio presence), and closes the demuxer
//! immediately. It is used before decomposing a video and again to measure
//! the intermediate encode during the duration correction pass.

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{codec::context::Context as CodecContext, media::Type};

use crate::error::BatchScaleError;
use crate::metadata::VideoMetadata;

/// Lightweight media file probe.
///
/// # Example
///
/// ```no_run
/// use batchscale::MediaProbe;
///
/// let metadata = MediaProbe::probe("input.mp4")?;
/// println!("{} fps, {:?}", metadata.frames_per_second, metadata.duration);
/// # Ok::<(), batchscale::BatchScaleError>(())
/// ```
pub struct MediaProbe;

impl MediaProbe {
    /// Probe the best video stream of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BatchScaleError::FileOpen`] if the file cannot be opened or
    /// its codec parameters cannot be read, and
    /// [`BatchScaleError::NoVideoStream`] if there is no video stream.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<VideoMetadata, BatchScaleError> {
        let path = path.as_ref();
        log::debug!("Probing {}", path.display());

        ffmpeg_next::init().map_err(|error| BatchScaleError::FileOpen {
            path: path.to_path_buf(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| BatchScaleError::FileOpen {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })?;

        let duration_microseconds = input_context.duration();
        let duration = if duration_microseconds > 0 {
            Duration::from_micros(duration_microseconds as u64)
        } else {
            Duration::ZERO
        };

        let has_audio = input_context.streams().best(Type::Audio).is_some();

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(BatchScaleError::NoVideoStream)?;

        let decoder_context = CodecContext::from_parameters(stream.parameters()).map_err(|error| {
            BatchScaleError::FileOpen {
                path: path.to_path_buf(),
                reason: format!("Failed to read video codec parameters: {error}"),
            }
        })?;
        let video_decoder =
            decoder_context
                .decoder()
                .video()
                .map_err(|error| BatchScaleError::FileOpen {
                    path: path.to_path_buf(),
                    reason: format!("Failed to create video decoder: {error}"),
                })?;

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            let rate = stream.rate();
            if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            }
        };

        let frame_count = if frames_per_second > 0.0 {
            (duration.as_secs_f64() * frames_per_second) as u64
        } else {
            0
        };

        let codec = video_decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(VideoMetadata {
            width: video_decoder.width(),
            height: video_decoder.height(),
            frames_per_second,
            duration,
            frame_count,
            has_audio,
            codec,
        })
    }

    /// Container duration of `path`.
    pub fn duration<P: AsRef<Path>>(path: P) -> Result<Duration, BatchScaleError> {
        Ok(Self::probe(path)?.duration)
    }
}
