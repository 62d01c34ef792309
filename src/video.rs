//! Video decomposition and reassembly through the `ffmpeg` executable.
//!
//! Frames are extracted to numbered PNGs with timestamps passed through
//! untouched. Reassembly first renumbers the surviving frames into a gapless
//! sequence (a failed frame would otherwise end the image2 demuxer early),
//! then encodes them with H.264 at the source frame rate. Speed and
//! direction are applied as `setpts`/`reverse` video filters and an
//! `atempo`/`areverse` audio chain.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::error::BatchScaleError;
use crate::ffmpeg::FfmpegLogLevel;
use crate::process::{self, Interrupt};
use crate::timing::{VideoTiming, atempo_chain, setpts_filter};

/// Prefix of extracted frame files.
const FRAME_PREFIX: &str = "frame";
const FRAME_PATTERN: &str = "frame%08d.png";

/// Everything needed to encode one frame sequence.
#[derive(Debug, Clone)]
pub struct VideoEncodeRequest<'a> {
    /// Frames in presentation order. Gaps are allowed.
    pub frames: &'a [PathBuf],
    /// Source frames per second.
    pub framerate: f64,
    /// Audio track to mux back in.
    pub audio: Option<&'a Path>,
    /// Speed and direction to apply.
    pub timing: VideoTiming,
    /// Constant rate factor.
    pub quality: u8,
    /// Scratch directory for the renumbered sequence.
    pub scratch: &'a Path,
    pub destination: &'a Path,
}

/// Invokes the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    executable: PathBuf,
    log_level: FfmpegLogLevel,
    timeout: Option<Duration>,
}

impl Ffmpeg {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            log_level: FfmpegLogLevel::default(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.log_level = level;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments shared by every invocation.
    fn common_arguments(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            self.log_level.as_str().to_string(),
        ]
    }

    async fn execute(&self, arguments: Vec<String>) -> Result<(), BatchScaleError> {
        let mut command = Command::new(&self.executable);
        command.args(arguments);
        process::run(command, Interrupt::Never, self.timeout).await?;
        Ok(())
    }

    pub fn extract_frames_arguments(&self, source: &Path, directory: &Path) -> Vec<String> {
        let mut arguments = self.common_arguments();
        arguments.extend([
            "-i".to_string(),
            source.display().to_string(),
            "-an".to_string(),
            "-fps_mode".to_string(),
            "passthrough".to_string(),
            directory.join(FRAME_PATTERN).display().to_string(),
        ]);
        arguments
    }

    /// Extract every frame of `source` into `directory` and return them in order.
    ///
    /// # Errors
    ///
    /// Returns [`BatchScaleError::NoFrames`] if ffmpeg succeeded but wrote
    /// nothing.
    pub async fn extract_frames(
        &self,
        source: &Path,
        directory: &Path,
    ) -> Result<Vec<PathBuf>, BatchScaleError> {
        self.execute(self.extract_frames_arguments(source, directory))
            .await?;
        let frames = list_frames(directory)?;
        if frames.is_empty() {
            return Err(BatchScaleError::NoFrames(source.to_path_buf()));
        }
        log::debug!("Extracted {} frames from {}", frames.len(), source.display());
        Ok(frames)
    }

    pub fn extract_audio_arguments(&self, source: &Path, destination: &Path) -> Vec<String> {
        let mut arguments = self.common_arguments();
        arguments.extend([
            "-i".to_string(),
            source.display().to_string(),
            "-vn".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            destination.display().to_string(),
        ]);
        arguments
    }

    /// Copy the audio track of `source` into `destination` without re-encoding.
    pub async fn extract_audio(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<(), BatchScaleError> {
        self.execute(self.extract_audio_arguments(source, destination))
            .await
    }

    pub fn encode_arguments(&self, request: &VideoEncodeRequest<'_>, pattern: &Path) -> Vec<String> {
        let mut arguments = self.common_arguments();
        arguments.extend([
            "-framerate".to_string(),
            request.framerate.to_string(),
            "-i".to_string(),
            pattern.display().to_string(),
        ]);
        if let Some(audio) = request.audio {
            arguments.extend(["-i".to_string(), audio.display().to_string()]);
        }
        if let Some(filter) = request.timing.video_filter() {
            arguments.extend(["-filter:v".to_string(), filter]);
        }
        arguments.extend(["-map".to_string(), "0:v".to_string()]);
        if request.audio.is_some() {
            if let Some(filter) = request.timing.audio_filter() {
                arguments.extend(["-filter:a".to_string(), filter]);
            }
            arguments.extend([
                "-map".to_string(),
                "1:a".to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-shortest".to_string(),
            ]);
        }
        arguments.extend(video_codec_arguments(request.quality));
        arguments.push(request.destination.display().to_string());
        arguments
    }

    /// Encode the frames of `request` into its destination.
    pub async fn encode(&self, request: &VideoEncodeRequest<'_>) -> Result<(), BatchScaleError> {
        if request.frames.is_empty() {
            return Err(BatchScaleError::NoFrames(request.destination.to_path_buf()));
        }
        let pattern = sequence_frames(request.frames, request.scratch)?;
        self.execute(self.encode_arguments(request, &pattern)).await
    }

    pub fn retime_arguments(
        &self,
        source: &Path,
        destination: &Path,
        factor: f64,
        has_audio: bool,
        quality: u8,
    ) -> Vec<String> {
        let mut arguments = self.common_arguments();
        arguments.extend([
            "-i".to_string(),
            source.display().to_string(),
            "-filter:v".to_string(),
            setpts_filter(factor),
        ]);
        if has_audio {
            // Stretching video by `factor` means slowing audio by the same amount.
            let tempo: Vec<String> = atempo_chain(1.0 / factor)
                .into_iter()
                .map(|stage| format!("atempo={stage}"))
                .collect();
            if !tempo.is_empty() {
                arguments.extend(["-filter:a".to_string(), tempo.join(",")]);
            }
            arguments.extend(["-c:a".to_string(), "aac".to_string()]);
        }
        arguments.extend(video_codec_arguments(quality));
        arguments.push(destination.display().to_string());
        arguments
    }

    /// Re-encode `source` with its timestamps scaled by `factor`.
    pub async fn retime(
        &self,
        source: &Path,
        destination: &Path,
        factor: f64,
        has_audio: bool,
        quality: u8,
    ) -> Result<(), BatchScaleError> {
        self.execute(self.retime_arguments(source, destination, factor, has_audio, quality))
            .await
    }
}

fn video_codec_arguments(quality: u8) -> [String; 6] {
    [
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-crf".to_string(),
        quality.to_string(),
    ]
}

/// Extracted frame files in `directory`, sorted by name.
fn list_frames(directory: &Path) -> Result<Vec<PathBuf>, BatchScaleError> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let is_frame = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(FRAME_PREFIX) && name.ends_with(".png"));
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

/// Link (or copy) `frames` into `directory` as a gapless numbered sequence.
///
/// Returns the printf-style pattern naming the sequence.
pub fn sequence_frames(frames: &[PathBuf], directory: &Path) -> Result<PathBuf, BatchScaleError> {
    fs::create_dir_all(directory)?;
    for (position, frame) in frames.iter().enumerate() {
        let target = directory.join(format!("{FRAME_PREFIX}{:08}.png", position + 1));
        if target.exists() {
            fs::remove_file(&target)?;
        }
        if fs::hard_link(frame, &target).is_err() {
            fs::copy(frame, &target)?;
        }
    }
    Ok(directory.join(FRAME_PATTERN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg() -> Ffmpeg {
        Ffmpeg::new("ffmpeg").with_log_level(FfmpegLogLevel::Quiet)
    }

    #[test]
    fn extraction_passes_timestamps_through() {
        let arguments = ffmpeg().extract_frames_arguments(Path::new("in.mp4"), Path::new("/w"));
        assert_eq!(
            arguments,
            vec![
                "-hide_banner",
                "-nostdin",
                "-y",
                "-loglevel",
                "quiet",
                "-i",
                "in.mp4",
                "-an",
                "-fps_mode",
                "passthrough",
                "/w/frame%08d.png",
            ]
        );
    }

    #[test]
    fn encode_applies_filters_and_audio() {
        let frames = vec![PathBuf::from("/w/upscaled/frame00000001.png")];
        let request = VideoEncodeRequest {
            frames: &frames,
            framerate: 25.0,
            audio: Some(Path::new("/w/audio.mka")),
            timing: VideoTiming::new(2.0, true),
            quality: 18,
            scratch: Path::new("/w/sequence"),
            destination: Path::new("out.mp4"),
        };
        let arguments = ffmpeg().encode_arguments(&request, Path::new("/w/sequence/frame%08d.png"));
        let joined = arguments.join(" ");
        assert!(joined.contains("-framerate 25 -i /w/sequence/frame%08d.png -i /w/audio.mka"));
        assert!(joined.contains("-filter:v setpts=0.5*PTS,reverse"));
        assert!(joined.contains("-filter:a atempo=2,areverse"));
        assert!(joined.contains("-map 0:v -filter:a"));
        assert!(joined.ends_with("-c:v libx264 -pix_fmt yuv420p -crf 18 out.mp4"));
    }

    #[test]
    fn encode_without_audio_skips_audio_filters() {
        let frames = vec![PathBuf::from("a.png")];
        let request = VideoEncodeRequest {
            frames: &frames,
            framerate: 30.0,
            audio: None,
            timing: VideoTiming::new(0.5, false),
            quality: 16,
            scratch: Path::new("/w/sequence"),
            destination: Path::new("out.mp4"),
        };
        let arguments = ffmpeg().encode_arguments(&request, Path::new("p"));
        assert!(!arguments.iter().any(|argument| argument == "-filter:a"));
        assert!(!arguments.iter().any(|argument| argument == "1:a"));
        assert!(arguments.contains(&"setpts=2*PTS".to_string()));
    }

    #[test]
    fn retime_inverts_audio_tempo() {
        let arguments =
            ffmpeg().retime_arguments(Path::new("mid.mp4"), Path::new("out.mp4"), 0.5, true, 16);
        let joined = arguments.join(" ");
        assert!(joined.contains("-filter:v setpts=0.5*PTS"));
        assert!(joined.contains("-filter:a atempo=2"));
    }

    #[test]
    fn sequence_closes_gaps() {
        let directory = tempfile::tempdir().unwrap();
        let upscaled = directory.path().join("upscaled");
        fs::create_dir_all(&upscaled).unwrap();
        let mut frames = Vec::new();
        for index in [1, 2, 5] {
            let path = upscaled.join(format!("frame{index:08}.png"));
            fs::write(&path, index.to_string()).unwrap();
            frames.push(path);
        }

        let sequence = directory.path().join("sequence");
        let pattern = sequence_frames(&frames, &sequence).unwrap();
        assert_eq!(pattern, sequence.join("frame%08d.png"));
        assert_eq!(fs::read_to_string(sequence.join("frame00000003.png")).unwrap(), "5");
        assert!(!sequence.join("frame00000004.png").exists());
    }

    #[test]
    fn listing_ignores_other_files() {
        let directory = tempfile::tempdir().unwrap();
        for name in ["frame00000002.png", "frame00000001.png", "audio.mka"] {
            fs::write(directory.path().join(name), b"").unwrap();
        }
        fs::create_dir(directory.path().join("upscaled")).unwrap();
        let frames = list_frames(directory.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["frame00000001.png", "frame00000002.png"]);
    }
}
