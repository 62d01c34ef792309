//! Source media metadata.
//!
//! [`VideoMetadata`] is what the pipeline needs to know about a video before
//! decomposing it: its frame rate and duration drive extraction and the
//! timing correction, and `has_audio` decides whether an audio track is
//! extracted and muxed back in.

use std::time::Duration;

/// Metadata for the primary video stream of a file.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second (average rate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Container duration.
    pub duration: Duration,
    /// Estimated total number of frames, computed from duration and frame rate.
    pub frame_count: u64,
    /// Whether the container carries an audio stream.
    pub has_audio: bool,
    /// Codec name (e.g. `"h264"`, `"vp9"`, `"av1"`).
    pub codec: String,
}

impl VideoMetadata {
    /// Duration covered by `frames` frames at this file's frame rate.
    ///
    /// Falls back to the container duration when the frame rate is unknown.
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.frames_per_second > 0.0 {
            Duration::from_secs_f64(frames as f64 / self.frames_per_second)
        } else {
            self.duration
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_of_partial_frame_count() {
        let metadata = VideoMetadata {
            width: 640,
            height: 360,
            frames_per_second: 25.0,
            duration: Duration::from_secs(4),
            frame_count: 100,
            has_audio: false,
            codec: "h264".to_string(),
        };
        assert_eq!(metadata.duration_of(50), Duration::from_secs(2));

        let unknown_rate = VideoMetadata {
            frames_per_second: 0.0,
            ..metadata
        };
        assert_eq!(unknown_rate.duration_of(50), Duration::from_secs(4));
    }
}
