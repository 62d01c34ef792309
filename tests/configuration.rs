//! UpscaleOptions, UpscaleParameters and FfmpegLogLevel tests.

use std::path::PathBuf;
use std::time::Duration;

use batchscale::{BatchScaleError, FfmpegLogLevel, UpscaleMode, UpscaleOptions};

fn rejected(options: UpscaleOptions) -> String {
    match options.validate() {
        Err(BatchScaleError::Configuration(message)) => message,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

// ── UpscaleOptions builder ───────────────────────────────────────

#[test]
fn options_defaults() {
    let options = UpscaleOptions::new();
    let debug = format!("{options:?}");
    assert!(debug.contains("UpscaleOptions"));
    assert!(debug.contains("speed: 1.0"));
    assert!(debug.contains("reverse: false"));
    assert!(debug.contains("parallel_frames: 1"));
    assert!(debug.contains("limit: None"));
    assert!(debug.contains("rename: \"2x\""));
    assert!(debug.contains("overwrite: false"));
    assert!(debug.contains("is_cancelled: false"));

    let parameters = options.parameters();
    assert_eq!(parameters.scale, 2.0);
    assert_eq!(parameters.noise, None);
    assert_eq!(parameters.mode, UpscaleMode::NoiseScale);
    assert!(!parameters.is_passthrough());
    assert!(options.validate().is_ok());
}

#[test]
fn options_parallel_frames_clamps_zero() {
    let options = UpscaleOptions::new().with_parallel_frames(0);
    assert!(format!("{options:?}").contains("parallel_frames: 1"));
}

#[test]
fn options_forward_upscaler_parameters() {
    let options = UpscaleOptions::new()
        .with_scale(1.5)
        .with_noise(-1)
        .with_mode(UpscaleMode::Scale)
        .with_block_size(256)
        .with_png_compression(9)
        .with_quality(101)
        .with_gpu_disabled(true)
        .with_force_opencl(true)
        .with_processor(2)
        .with_threads(8)
        .with_model_directory("models");

    let parameters = options.parameters();
    assert_eq!(parameters.scale, 1.5);
    assert_eq!(parameters.noise, Some(-1));
    assert_eq!(parameters.mode, UpscaleMode::Scale);
    assert_eq!(parameters.block_size, Some(256));
    assert_eq!(parameters.png_compression, Some(9));
    assert_eq!(parameters.quality, Some(101));
    assert!(parameters.disable_gpu);
    assert!(parameters.force_opencl);
    assert_eq!(parameters.processor, Some(2));
    assert_eq!(parameters.threads, Some(8));
    assert_eq!(parameters.model_directory, Some(PathBuf::from("models")));
    assert!(options.validate().is_ok());
}

#[test]
fn options_unit_scale_is_passthrough() {
    assert!(UpscaleOptions::new().with_scale(1.0).parameters().is_passthrough());
}

#[test]
fn options_debug_shows_job_settings() {
    let options = UpscaleOptions::new()
        .with_speed(2.5)
        .with_reverse(true)
        .with_limit(7)
        .with_rename("_big")
        .with_recursive(true)
        .with_video_quality(20)
        .with_ffmpeg_log_level(FfmpegLogLevel::Warning)
        .with_process_timeout(Duration::from_secs(30));
    let debug = format!("{options:?}");
    assert!(debug.contains("speed: 2.5"));
    assert!(debug.contains("reverse: true"));
    assert!(debug.contains("limit: Some(7)"));
    assert!(debug.contains("rename: \"_big\""));
    assert!(debug.contains("recursive: true"));
    assert!(debug.contains("video_quality: 20"));
    assert!(debug.contains("ffmpeg_log_level: Warning"));
    assert!(debug.contains("process_timeout: Some(30s)"));
}

#[test]
fn options_share_cancellation() {
    let options = UpscaleOptions::new();
    let clone = options.clone();
    options.cancellation().cancel();
    assert!(clone.cancellation().is_cancelled());
    assert!(format!("{clone:?}").contains("is_cancelled: true"));
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn validate_rejects_bad_scale() {
    assert!(rejected(UpscaleOptions::new().with_scale(0.0)).contains("scale"));
    assert!(rejected(UpscaleOptions::new().with_scale(-2.0)).contains("scale"));
    assert!(rejected(UpscaleOptions::new().with_scale(f64::NAN)).contains("scale"));
}

#[test]
fn validate_rejects_bad_speed() {
    assert!(rejected(UpscaleOptions::new().with_speed(0.0)).contains("speed"));
    assert!(rejected(UpscaleOptions::new().with_speed(f64::INFINITY)).contains("speed"));
}

#[test]
fn validate_rejects_out_of_range_levels() {
    assert!(rejected(UpscaleOptions::new().with_noise(4)).contains("noise"));
    assert!(rejected(UpscaleOptions::new().with_noise(-2)).contains("noise"));
    assert!(rejected(UpscaleOptions::new().with_png_compression(10)).contains("png"));
    assert!(rejected(UpscaleOptions::new().with_quality(102)).contains("quality"));
    assert!(rejected(UpscaleOptions::new().with_video_quality(52)).contains("crf"));
}

#[test]
fn validate_rejects_empty_executables() {
    assert!(rejected(UpscaleOptions::new().with_upscaler_path("")).contains("executable"));
    assert!(rejected(UpscaleOptions::new().with_ffmpeg_path("")).contains("executable"));
}

#[test]
fn validate_accepts_edge_values() {
    let options = UpscaleOptions::new()
        .with_noise(3)
        .with_png_compression(0)
        .with_quality(0)
        .with_video_quality(51)
        .with_speed(0.01);
    assert!(options.validate().is_ok());
}

// ── FfmpegLogLevel ───────────────────────────────────────────────

#[test]
fn log_level_parses_names() {
    assert_eq!("quiet".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Quiet);
    assert_eq!("WARN".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Warning);
    assert_eq!("debug".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Debug);
    assert_eq!(FfmpegLogLevel::default(), FfmpegLogLevel::Error);
}

#[test]
fn log_level_rejects_unknown_names() {
    assert!(matches!(
        "chatty".parse::<FfmpegLogLevel>(),
        Err(BatchScaleError::Configuration(_))
    ));
}

#[test]
fn log_level_displays_ffmpeg_names() {
    assert_eq!(FfmpegLogLevel::Warning.to_string(), "warning");
    assert_eq!(FfmpegLogLevel::Warning.as_str(), "warning");
}
