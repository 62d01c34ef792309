//! Decomposed frame sequences.
//!
//! A [`FrameSet`] is the ordered list of [`Frame`]s produced by decomposing a
//! GIF or video, plus the timing carried by the container. The ordinal of
//! each frame is its presentation position and survives both concurrent
//! processing and reversal.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// One still image taken from an animated or video source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Presentation position within the source.
    pub index: usize,
    /// Extracted frame file.
    pub source: PathBuf,
    /// Where the upscaled frame is written.
    pub destination: PathBuf,
    /// GIF frame delay in hundredths of a second. `None` for video frames.
    pub delay: Option<u16>,
}

/// Container timing attached to a [`FrameSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameTiming {
    /// Per-frame delays live on the frames themselves (animated GIF).
    Delays,
    /// Constant-rate video.
    Framerate {
        /// Frames per second of the source.
        framerate: f64,
        /// Duration of the source.
        duration: Duration,
    },
}

/// The ordered frames of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet {
    frames: Vec<Frame>,
    timing: FrameTiming,
}

impl FrameSet {
    /// Build a frame set from extracted files in presentation order.
    ///
    /// Each frame's destination is `upscaled_directory` joined with the
    /// source file name, so destinations are unique whenever sources are.
    pub fn from_sources(
        sources: Vec<(PathBuf, Option<u16>)>,
        upscaled_directory: &Path,
        timing: FrameTiming,
    ) -> Self {
        let frames = sources
            .into_iter()
            .enumerate()
            .map(|(index, (source, delay))| {
                let file_name = source
                    .file_name()
                    .map(|name| name.to_os_string())
                    .unwrap_or_else(|| format!("frame{index:08}.png").into());
                Frame {
                    index,
                    destination: upscaled_directory.join(file_name),
                    source,
                    delay,
                }
            })
            .collect();
        Self { frames, timing }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Keep only frames whose position is a multiple of `stride`.
    ///
    /// Ordinals are not renumbered; they still name the source position.
    pub fn subsample(&mut self, stride: usize) {
        let stride = stride.max(1);
        let mut position = 0;
        self.frames.retain(|_| {
            let keep = position % stride == 0;
            position += 1;
            keep
        });
    }

    /// Mark every frame as its own output, for jobs that skip upscaling.
    pub fn pass_through(&mut self) {
        for frame in &mut self.frames {
            frame.destination = frame.source.clone();
        }
    }
}
