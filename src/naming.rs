//! Media kind detection and output path derivation.

use std::path::{Path, PathBuf};

use crate::error::BatchScaleError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tif", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "m4v", "flv", "wmv"];

/// What kind of pipeline a file goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Still image, upscaled with a single upscaler call.
    Image,
    /// Animated GIF.
    Gif,
    /// Video container.
    Video,
}

impl MediaKind {
    /// Detect the kind of `path` from its extension (case-insensitive).
    pub fn detect(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if extension == "gif" {
            Some(MediaKind::Gif)
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Like [`detect`](MediaKind::detect), failing with
    /// [`BatchScaleError::UnsupportedMedia`].
    pub fn require(path: &Path) -> Result<Self, BatchScaleError> {
        Self::detect(path).ok_or_else(|| BatchScaleError::UnsupportedMedia(path.to_path_buf()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Gif => "gif",
            MediaKind::Video => "video",
        }
    }
}

/// Resolve where the output of `source` is written.
///
/// A `destination` with an extension is used as-is. Anything else is a
/// directory, resolved with [`output_in_directory`].
pub fn resolve_destination(
    source: &Path,
    destination: &Path,
    rename: &str,
    extension: Option<&str>,
) -> PathBuf {
    if destination.extension().is_some() {
        return destination.to_path_buf();
    }
    output_in_directory(source, destination, rename, extension)
}

/// `{stem}{rename}.{extension}` inside `directory`.
///
/// Uses the source's extension unless `extension` overrides it.
pub fn output_in_directory(
    source: &Path,
    directory: &Path,
    rename: &str,
    extension: Option<&str>,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension
        .map(str::to_string)
        .or_else(|| {
            source
                .extension()
                .map(|extension| extension.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    let name = if extension.is_empty() {
        format!("{stem}{rename}")
    } else {
        format!("{stem}{rename}.{extension}")
    };
    directory.join(name)
}

/// Name prefix of the workspace for a job on `source`.
pub fn workspace_prefix(source: &Path) -> String {
    source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string())
}
