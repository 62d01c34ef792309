//! FFmpeg log level configuration.
//!
//! FFmpeg is used two ways: linked through `ffmpeg-next` for probing, and as
//! the `ffmpeg` executable for decomposition and reassembly. Both print to
//! stderr on their own, separately from the Rust [`log`] facade. An
//! [`FfmpegLogLevel`] tunes the linked libraries via
//! [`set_ffmpeg_log_level`] and is passed to the executable as `-loglevel`.
//!
//! # Example
//!
//! ```no_run
//! use batchscale::FfmpegLogLevel;
//!
//! let level: FfmpegLogLevel = "error".parse()?;
//! batchscale::set_ffmpeg_log_level(level);
//! # Ok::<(), batchscale::BatchScaleError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::util::log::Level;

use crate::error::BatchScaleError;

/// FFmpeg log verbosity.
///
/// Ordered from quietest to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    #[default]
    Error,
    /// Warnings.
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    /// The value the `ffmpeg` executable accepts for `-loglevel`.
    pub fn as_str(self) -> &'static str {
        match self {
            FfmpegLogLevel::Quiet => "quiet",
            FfmpegLogLevel::Fatal => "fatal",
            FfmpegLogLevel::Error => "error",
            FfmpegLogLevel::Warning => "warning",
            FfmpegLogLevel::Info => "info",
            FfmpegLogLevel::Debug => "debug",
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = BatchScaleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "debug" => Ok(FfmpegLogLevel::Debug),
            other => Err(BatchScaleError::Configuration(format!(
                "unknown ffmpeg log level '{other}'"
            ))),
        }
    }
}

/// Set the log level of the linked FFmpeg libraries.
///
/// This does **not** affect Rust-side `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Quiet".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Quiet);
        assert_eq!("warn".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Warning);
        assert_eq!(" debug ".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Debug);
    }

    #[test]
    fn rejects_unknown_levels() {
        assert!(matches!(
            "loud".parse::<FfmpegLogLevel>(),
            Err(BatchScaleError::Configuration(_))
        ));
    }

    #[test]
    fn display_matches_the_command_line_name() {
        for level in [
            FfmpegLogLevel::Quiet,
            FfmpegLogLevel::Fatal,
            FfmpegLogLevel::Error,
            FfmpegLogLevel::Warning,
            FfmpegLogLevel::Info,
            FfmpegLogLevel::Debug,
        ] {
            assert_eq!(level.to_string().parse::<FfmpegLogLevel>().unwrap(), level);
        }
    }
}
