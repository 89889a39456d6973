// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use subweave::app_config::{Config, ConcurrencyLimit, LogLevel};
use subweave::errors::AppError;
use subweave::file_utils::FileManager;
use subweave::pipeline::run_worker;
use subweave::platform::{classify, resolve_ceiling, HardwareSnapshot};
use subweave::scheduler::{
    JobId, JobState, ProcessLauncher, Scheduler, SchedulerEvent, WorkerLauncher,
};

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

fn level_filter(level: &LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process videos into bilingual subtitles (default command)
    #[command(alias = "process")]
    Run(RunArgs),

    /// Internal worker entry point, spawned by the scheduler
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Input video file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Source language code (e.g., 'en', 'ja')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh', 'es')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Worker process ceiling: a number, or 'auto' to derive from hardware
    #[arg(short = 'j', long)]
    max_concurrent: Option<String>,

    /// Burn the bilingual subtitles back into the video
    #[arg(short, long)]
    burn_in: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Video file this worker is responsible for
    #[arg(long)]
    video: PathBuf,

    /// Configuration file path
    #[arg(long)]
    config: PathBuf,
}

/// subweave - bilingual subtitles for your videos
///
/// Extracts audio from video files, recognizes speech, translates the
/// transcript and writes bilingual SRT subtitles, optionally burned back
/// into the video. Multiple videos are processed in parallel, each in its
/// own worker process.
#[derive(Parser, Debug)]
#[command(name = "subweave")]
#[command(version = "0.1.0")]
#[command(about = "Video to bilingual subtitles, in parallel")]
#[command(long_about = "subweave turns videos into bilingually subtitled ones.

EXAMPLES:
    subweave movie.mkv                      # Subtitle one video with default config
    subweave -t es movie.mkv                # Translate to Spanish
    subweave -j 2 /movies/                  # Whole directory, two workers at a time
    subweave -j auto -b /movies/            # Hardware-derived ceiling, burn-in enabled

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default
    one will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input video file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Source language code (e.g., 'en', 'ja')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh', 'es')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Worker process ceiling: a number, or 'auto' to derive from hardware
    #[arg(short = 'j', long)]
    max_concurrent: Option<String>,

    /// Burn the bilingual subtitles back into the video
    #[arg(short, long)]
    burn_in: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
// Logs go to stderr only; worker processes reserve stdout for IPC
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:5} {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn parse_concurrency(value: &str) -> Result<ConcurrencyLimit> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(ConcurrencyLimit::Auto);
    }
    let n: usize = value
        .parse()
        .map_err(|_| anyhow!("--max-concurrent takes a positive number or 'auto'"))?;
    if n == 0 {
        return Err(anyhow!("--max-concurrent must be at least 1"));
    }
    Ok(ConcurrencyLimit::Fixed(n))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info).map_err(|e| AppError::Unknown(e.to_string()))?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Worker(args)) => {
            // Worker processes report through stdout; keep logging quiet
            log::set_max_level(LevelFilter::Warn);
            let code = run_worker(args.video, args.config).await;
            std::process::exit(code);
        }
        Some(Commands::Run(args)) => run(args).await.map_err(AppError::from),
        None => {
            // Default behavior - use top-level args for backwards compatibility
            let input_path = cli
                .input_path
                .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;

            run(RunArgs {
                input_path,
                source_language: cli.source_language,
                target_language: cli.target_language,
                max_concurrent: cli.max_concurrent,
                burn_in: cli.burn_in,
                config_path: cli.config_path,
                log_level: cli.log_level,
            })
            .await
            .map_err(AppError::from)
        }
    }
}

async fn run(options: RunArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        log::set_max_level(level_filter(&cmd_log_level.clone().into()));
    }

    let config_path = PathBuf::from(&options.config_path);
    let mut config = if config_path.exists() {
        Config::load_or_default(&config_path)?
    } else {
        warn!(
            "Config file not found at '{}', creating default config.",
            options.config_path
        );
        let config = Config::default();
        config.save(&config_path)?;
        config
    };

    // Override config with CLI options if provided
    if let Some(source) = &options.source_language {
        config.source_language = source.clone();
    }
    if let Some(target) = &options.target_language {
        config.target_language = target.clone();
    }
    if let Some(limit) = &options.max_concurrent {
        config.scheduler.max_concurrent_processes = parse_concurrency(limit)?;
    }
    if options.burn_in {
        config.scheduler.burn_in = true;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;

    if options.log_level.is_none() {
        log::set_max_level(level_filter(&config.log_level));
    }

    // Persist the effective config so workers read the same settings
    let effective_config_path = if options.source_language.is_some()
        || options.target_language.is_some()
        || options.burn_in
    {
        let path = config.scheduler.effective_cache_dir().join("conf.json");
        config.save(&path)?;
        path
    } else {
        config_path
    };

    // Resolve the worker ceiling from hardware when set to auto
    let snapshot = HardwareSnapshot::detect();
    let tier = classify(snapshot);
    let ceiling = resolve_ceiling(config.scheduler.max_concurrent_processes, tier);
    info!(
        "Detected {} cores / {:.1} GB ({:?}), worker ceiling {}",
        snapshot.cpu_cores, snapshot.total_memory_gb, tier, ceiling
    );

    // Collect the videos to process
    let videos = if options.input_path.is_file() {
        vec![options.input_path.clone()]
    } else if options.input_path.is_dir() {
        FileManager::find_video_files(&options.input_path)?
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", options.input_path));
    };
    if videos.is_empty() {
        return Err(anyhow!("No video files found in {:?}", options.input_path));
    }
    info!("Processing {} video(s)", videos.len());

    let launcher: Arc<dyn WorkerLauncher> = Arc::new(ProcessLauncher::new(effective_config_path));
    let (handle, mut events) = Scheduler::spawn(launcher, ceiling);

    let mut names: HashMap<JobId, String> = HashMap::new();
    for video in &videos {
        let name = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| video.display().to_string());
        match handle.submit(video.clone()).await {
            Ok(job_id) => {
                names.insert(job_id, name);
            }
            Err(e) => warn!("Skipping {}: {}", name, e),
        }
    }

    if names.is_empty() {
        return Err(anyhow!("No videos were accepted for processing"));
    }

    // Render progress bars until every job reaches a terminal state
    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template("{prefix:>24} [{bar:30}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    let mut bars: HashMap<JobId, ProgressBar> = HashMap::new();
    let mut remaining = names.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut cancelled = 0usize;
    let mut degraded_total = 0usize;

    while remaining > 0 {
        let Some(event) = events.recv().await else {
            return Err(anyhow!("Scheduler stopped unexpectedly"));
        };

        match event {
            SchedulerEvent::Submitted { job_id, .. } => {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                if let Some(name) = names.get(&job_id) {
                    bar.set_prefix(name.clone());
                }
                bar.set_message("queued");
                bars.insert(job_id, bar);
            }
            SchedulerEvent::Started { job_id } => {
                if let Some(bar) = bars.get(&job_id) {
                    bar.set_message("starting");
                }
            }
            SchedulerEvent::Progress {
                job_id,
                percent,
                stage,
                ..
            } => {
                if let Some(bar) = bars.get(&job_id) {
                    bar.set_position(percent as u64);
                    bar.set_message(stage.to_string());
                }
            }
            SchedulerEvent::LogLine { job_id, text, .. } => {
                if let Some(bar) = bars.get(&job_id) {
                    bar.set_message(text);
                }
            }
            SchedulerEvent::Finished {
                job_id,
                state,
                degraded_batches,
                error,
                ..
            } => {
                remaining -= 1;
                degraded_total += degraded_batches;
                match state {
                    JobState::Succeeded => succeeded += 1,
                    JobState::Cancelled => cancelled += 1,
                    _ => failed += 1,
                }
                if let Some(bar) = bars.get(&job_id) {
                    match state {
                        JobState::Succeeded => {
                            bar.set_position(100);
                            bar.finish_with_message("done");
                        }
                        JobState::Cancelled => bar.finish_with_message("cancelled"),
                        _ => bar.finish_with_message(
                            error
                                .map(|e| e.to_string())
                                .unwrap_or_else(|| "failed".to_string()),
                        ),
                    }
                }
            }
        }
    }

    handle.shutdown().await.ok();

    info!(
        "Finished: {} succeeded, {} failed, {} cancelled",
        succeeded, failed, cancelled
    );
    if degraded_total > 0 {
        warn!(
            "{} translation batch(es) kept their source text after provider failures",
            degraded_total
        );
    }

    if failed > 0 {
        Err(anyhow!("{} job(s) failed", failed))
    } else {
        Ok(())
    }
}
