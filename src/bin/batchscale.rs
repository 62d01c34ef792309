use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use batchscale::{
    BatchReport, BatchUpscaler, CancellationToken, FfmpegLogLevel, JobOutcome, MediaKind,
    ProgressAction, ProgressCallback, ProgressInfo, UpscaleMode, UpscaleOptions,
    naming::resolve_destination,
};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  batchscale image photo.png out/ --scale 2 --noise 1\n  batchscale gif cat.gif cat_fast.gif --speed 2 --reverse --parallel 4 --progress\n  batchscale video clip.mp4 out/ --crf 18\n  batchscale batch photos/ photos_2x/ --kind image --recursive --json\n  batchscale completions zsh > _batchscale";

#[derive(Debug, Parser)]
#[command(
    name = "batchscale",
    version,
    about = "Upscale images, animated GIFs, and videos frame by frame",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Print the result as machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    ffmpeg_log_level: Option<String>,

    /// Upscaler executable.
    #[arg(long, global = true)]
    upscaler: Option<PathBuf>,

    /// ffmpeg executable.
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Directory for job workspaces.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Kill any external process running longer than this many seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Debug, Args, Clone)]
struct UpscaleArgs {
    /// Upscale ratio. 1 copies the input unchanged.
    #[arg(short, long, default_value_t = 2.0)]
    scale: f64,
    /// Denoise level (-1 to 3).
    #[arg(short, long, allow_negative_numbers = true)]
    noise: Option<i8>,
    /// Processing mode (noise, scale, noise-scale).
    #[arg(short, long, default_value = "noise-scale")]
    mode: String,
    /// GPU tile size.
    #[arg(long)]
    block_size: Option<u32>,
    /// PNG compression level (0 to 9).
    #[arg(long)]
    png_compression: Option<u8>,
    /// JPEG/WebP quality (0 to 101).
    #[arg(long)]
    quality: Option<u8>,
    /// Run the upscaler on the CPU.
    #[arg(long)]
    disable_gpu: bool,
    /// Force the OpenCL backend.
    #[arg(long)]
    force_opencl: bool,
    /// GPU or processor index.
    #[arg(long)]
    processor: Option<i32>,
    /// Upscaler thread count.
    #[arg(short = 'j', long)]
    threads: Option<u32>,
    /// Upscaler model directory.
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Frames upscaled concurrently.
    #[arg(short = 'P', long, default_value_t = 1)]
    parallel: usize,
    /// Maximum frames per job (or files per batch).
    #[arg(long)]
    limit: Option<usize>,
    /// Suffix appended to output names when the destination is a directory.
    #[arg(long, default_value = "2x")]
    rename: String,
    /// Playback speed for GIF and video output.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Play GIF and video output backwards.
    #[arg(long)]
    reverse: bool,
    /// Keep GIF transparency.
    #[arg(long)]
    transparent: bool,
    /// Video constant rate factor (0 to 51).
    #[arg(long, default_value_t = 16)]
    crf: u8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upscale a still image.
    #[command(about = "Upscale a still image")]
    Image {
        input: PathBuf,
        /// Output file, or a directory to write `{name}{rename}.{ext}` into.
        output: PathBuf,
        #[command(flatten)]
        upscale: UpscaleArgs,
    },

    /// Upscale an animated GIF.
    #[command(about = "Upscale an animated GIF")]
    Gif {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        upscale: UpscaleArgs,
    },

    /// Upscale a video.
    #[command(about = "Upscale a video")]
    Video {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        upscale: UpscaleArgs,
    },

    /// Upscale every supported file in a directory.
    #[command(
        about = "Upscale a directory",
        after_help = "Examples:\n  batchscale batch in/ out/\n  batchscale batch in/ out/ --kind gif --limit 10"
    )]
    Batch {
        input: PathBuf,
        output: PathBuf,
        /// Only process one kind of file (image, gif, video).
        #[arg(long)]
        kind: Option<String>,
        /// Descend into subdirectories (still images only).
        #[arg(short, long)]
        recursive: bool,
        #[command(flatten)]
        upscale: UpscaleArgs,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_mode(value: &str) -> Option<UpscaleMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "noise" => Some(UpscaleMode::Noise),
        "scale" => Some(UpscaleMode::Scale),
        "noise-scale" | "noise_scale" | "noisescale" => Some(UpscaleMode::NoiseScale),
        _ => None,
    }
}

fn parse_kind(value: &str) -> Option<MediaKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "image" | "images" => Some(MediaKind::Image),
        "gif" | "gifs" => Some(MediaKind::Gif),
        "video" | "videos" => Some(MediaKind::Video),
        _ => None,
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_module("batchscale", log::LevelFilter::Debug);
    }
    builder.format_timestamp_secs().init();
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn build_options(
    global: &GlobalOptions,
    upscale: &UpscaleArgs,
    cancellation: &CancellationToken,
) -> Result<UpscaleOptions, Box<dyn std::error::Error>> {
    let mode =
        parse_mode(&upscale.mode).ok_or(format!("unsupported --mode: {}", upscale.mode))?;

    let mut options = UpscaleOptions::new()
        .with_scale(upscale.scale)
        .with_mode(mode)
        .with_gpu_disabled(upscale.disable_gpu)
        .with_force_opencl(upscale.force_opencl)
        .with_parallel_frames(upscale.parallel)
        .with_rename(upscale.rename.clone())
        .with_speed(upscale.speed)
        .with_reverse(upscale.reverse)
        .with_transparency(upscale.transparent)
        .with_video_quality(upscale.crf)
        .with_cancellation(cancellation.clone());

    if let Some(noise) = upscale.noise {
        options = options.with_noise(noise);
    }
    if let Some(block_size) = upscale.block_size {
        options = options.with_block_size(block_size);
    }
    if let Some(level) = upscale.png_compression {
        options = options.with_png_compression(level);
    }
    if let Some(quality) = upscale.quality {
        options = options.with_quality(quality);
    }
    if let Some(processor) = upscale.processor {
        options = options.with_processor(processor);
    }
    if let Some(threads) = upscale.threads {
        options = options.with_threads(threads);
    }
    if let Some(directory) = &upscale.model_dir {
        options = options.with_model_directory(directory.clone());
    }
    if let Some(limit) = upscale.limit {
        options = options.with_limit(limit);
    }

    let level: FfmpegLogLevel = match &global.ffmpeg_log_level {
        Some(level) => level.parse()?,
        None => FfmpegLogLevel::default(),
    };
    batchscale::set_ffmpeg_log_level(level);
    options = options.with_ffmpeg_log_level(level);
    if let Some(path) = &global.upscaler {
        options = options.with_upscaler_path(path.clone());
    }
    if let Some(path) = &global.ffmpeg {
        options = options.with_ffmpeg_path(path.clone());
    }
    if let Some(root) = &global.workspace {
        options = options.with_workspace_root(root.clone());
    }
    if let Some(seconds) = global.timeout {
        options = options.with_process_timeout(Duration::from_secs(seconds));
    }
    options = options.with_overwrite(global.overwrite);

    options.validate()?;
    Ok(options)
}

/// Renders progress reports on an indicatif bar.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(message: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {msg} {bar:40.cyan/blue} {pos}/{len} ({eta})",
        )?;
        bar.set_style(style.progress_chars("##-"));
        bar.set_message(message.to_string());
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) -> ProgressAction {
        self.bar.set_length(info.total);
        self.bar.set_position(info.current);
        ProgressAction::Continue
    }
}

fn outcome_json(input: &Path, outcome: &JobOutcome) -> Value {
    json!({
        "input": input.display().to_string(),
        "output": outcome.output.display().to_string(),
        "processed": outcome.processed,
        "failed": outcome.failed,
        "stopped": outcome.stopped,
    })
}

fn report_json(report: &BatchReport) -> Value {
    json!({
        "outputs": report.outputs.iter().map(|outcome| json!({
            "output": outcome.output.display().to_string(),
            "processed": outcome.processed,
            "failed": outcome.failed,
            "stopped": outcome.stopped,
        })).collect::<Vec<_>>(),
        "skipped": report.skipped.iter().map(|(path, error)| json!({
            "input": path.display().to_string(),
            "error": error.to_string(),
        })).collect::<Vec<_>>(),
        "stopped": report.stopped,
    })
}

fn print_outcome(input: &Path, outcome: &JobOutcome, as_json: bool) -> serde_json::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(input, outcome))?);
        return Ok(());
    }
    if outcome.failed > 0 {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("{} frame(s) failed and were left out", outcome.failed).yellow()
        );
    }
    if outcome.stopped {
        eprintln!("{} {}", "warning:".yellow().bold(), "stopped early".yellow());
    }
    println!(
        "{} {}",
        "saved".green().bold(),
        outcome.output.display()
    );
    Ok(())
}

async fn run_single(
    global: &GlobalOptions,
    kind: MediaKind,
    input: &Path,
    output: &Path,
    upscale: &UpscaleArgs,
    cancellation: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = build_options(global, upscale, cancellation)?;
    let extension = match kind {
        MediaKind::Image => None,
        MediaKind::Gif => Some("gif"),
        MediaKind::Video => Some("mp4"),
    };
    ensure_writable_path(
        &resolve_destination(input, output, &upscale.rename, extension),
        global.overwrite,
    )?;

    let bar = if global.progress {
        let bar = Arc::new(TerminalProgress::new(kind.as_str())?);
        options = options.with_progress(bar.clone());
        Some(bar)
    } else {
        None
    };

    let upscaler = BatchUpscaler::from_options(&options);
    let result = match kind {
        MediaKind::Image => upscaler.upscale_image(input, output, &options).await,
        MediaKind::Gif => upscaler.upscale_gif(input, output, &options).await,
        MediaKind::Video => upscaler.upscale_video(input, output, &options).await,
    };
    if let Some(bar) = &bar {
        bar.finish();
    }
    print_outcome(input, &result?, global.json)?;
    Ok(())
}

async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cancellation = CancellationToken::new();
    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "interrupted, finishing frames in flight".yellow());
            interrupt.cancel();
        }
    });

    let global = &cli.global;
    match cli.command {
        Commands::Image {
            input,
            output,
            upscale,
        } => run_single(global, MediaKind::Image, &input, &output, &upscale, &cancellation).await?,
        Commands::Gif {
            input,
            output,
            upscale,
        } => run_single(global, MediaKind::Gif, &input, &output, &upscale, &cancellation).await?,
        Commands::Video {
            input,
            output,
            upscale,
        } => run_single(global, MediaKind::Video, &input, &output, &upscale, &cancellation).await?,
        Commands::Batch {
            input,
            output,
            kind,
            recursive,
            upscale,
        } => {
            let kind = match &kind {
                Some(value) => {
                    Some(parse_kind(value).ok_or(format!("unsupported --kind: {value}"))?)
                }
                None => None,
            };
            let options = build_options(global, &upscale, &cancellation)?.with_recursive(recursive);

            let bar = if global.progress {
                Some(Arc::new(TerminalProgress::new("batch")?))
            } else {
                None
            };
            let progress: Arc<dyn ProgressCallback> = match &bar {
                Some(bar) => bar.clone(),
                None => Arc::new(|_: &ProgressInfo| ProgressAction::Continue),
            };

            let upscaler = BatchUpscaler::from_options(&options);
            let report = match kind {
                Some(MediaKind::Image) => {
                    upscaler
                        .upscale_images(&input, &output, &options, progress)
                        .await?
                }
                Some(MediaKind::Gif) => {
                    upscaler
                        .upscale_gifs(&input, &output, &options, progress)
                        .await?
                }
                Some(MediaKind::Video) => {
                    upscaler
                        .upscale_videos(&input, &output, &options, progress)
                        .await?
                }
                None => {
                    upscaler
                        .upscale_many(&input, &output, &options, progress)
                        .await?
                }
            };
            if let Some(bar) = &bar {
                bar.finish();
            }

            if global.json {
                println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            } else {
                for (path, error) in &report.skipped {
                    eprintln!(
                        "{} {}",
                        "skipped".yellow().bold(),
                        format!("{}: {error}", path.display()).yellow()
                    );
                }
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Upscaled {} file(s) into {}{}",
                        report.outputs.len(),
                        output.display(),
                        if report.stopped { " (stopped early)" } else { "" }
                    )
                    .green()
                );
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "batchscale", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(cli))
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
