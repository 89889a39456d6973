/*!
 * The worker-side processing pipeline.
 *
 * Runs inside the isolated worker process and carries one video through
 * extraction, transcription, translation and optional burn-in, reporting
 * progress as JSON lines on stdout. Percent ranges per stage: extraction
 * 0-20, transcription 20-40, translation 40-70, burn-in 70-100.
 *
 * Cancellation is cooperative: the controller closes the worker's stdin (or
 * writes a `CANCEL` line), the worker notices between stages and exits with
 * a dedicated status code.
 */

use anyhow::Result;
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app_config::Config;
use crate::errors::JobError;
use crate::file_utils::{CachePaths, FileManager};
use crate::media::{
    BurnInPort, ExtractionPort, FfmpegBurnIn, FfmpegExtractor, TranscriptionPort, WhisperCommand,
};
use crate::scheduler::ipc::{self, WorkerMessage, CANCEL_LINE};
use crate::scheduler::job::Stage;
use crate::scheduler::worker::EXIT_CANCELLED;
use crate::subtitle_processor::SubtitleDocument;
use crate::translation::BatchTranslationEngine;

/// Where worker messages go. Production writes JSON lines to stdout; tests
/// capture them in memory.
pub trait EventSink: Send + Sync {
    fn emit(&self, message: &WorkerMessage);
}

/// Writes one JSON object per line to stdout, flushed immediately so the
/// controller sees progress as it happens
#[derive(Debug, Default)]
pub struct StdoutReporter;

impl EventSink for StdoutReporter {
    fn emit(&self, message: &WorkerMessage) {
        if let Ok(line) = ipc::encode(message) {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            // A broken pipe means the controller is gone; nothing to do
            let _ = writeln!(lock, "{}", line);
            let _ = lock.flush();
        }
    }
}

/// Files produced by a completed pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub output_paths: Vec<PathBuf>,
    pub degraded_batches: usize,
}

/// How a pipeline run ended (errors travel separately, as `JobError`)
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineRun {
    Completed(PipelineOutput),
    Cancelled,
}

/// One video's journey from container to bilingual subtitles
pub struct WorkerPipeline {
    config: Config,
    extractor: Box<dyn ExtractionPort>,
    transcriber: Box<dyn TranscriptionPort>,
    burner: Box<dyn BurnInPort>,
    engine: BatchTranslationEngine,
    sink: Arc<dyn EventSink>,
    cancel: Arc<AtomicBool>,
}

impl WorkerPipeline {
    pub fn new(
        config: Config,
        extractor: Box<dyn ExtractionPort>,
        transcriber: Box<dyn TranscriptionPort>,
        burner: Box<dyn BurnInPort>,
        engine: BatchTranslationEngine,
        sink: Arc<dyn EventSink>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            extractor,
            transcriber,
            burner,
            engine,
            sink,
            cancel,
        }
    }

    /// Build the production pipeline: ffmpeg tools, whisper CLI, real providers
    pub fn from_config(
        config: Config,
        sink: Arc<dyn EventSink>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let engine = BatchTranslationEngine::from_config(&config.translation)?;
        Ok(Self::new(
            config,
            Box::new(FfmpegExtractor::new()),
            Box::new(WhisperCommand::new(None)),
            Box::new(FfmpegBurnIn::new()),
            engine,
            sink,
            cancel,
        ))
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn report(&self, percent: u8, stage: Stage) {
        self.sink.emit(&WorkerMessage::Progress { percent, stage });
    }

    /// Run the full pipeline for one video
    pub async fn run(&self, video_path: &Path) -> Result<PipelineRun, JobError> {
        let cache_dir = self.config.scheduler.effective_cache_dir();
        FileManager::ensure_dir(&cache_dir)
            .map_err(|e| JobError::ExtractionFailed(format!("cache dir unavailable: {}", e)))?;
        let paths = CachePaths::for_video(video_path, &cache_dir);

        // Stage 1: audio extraction (0-20)
        self.report(0, Stage::Extracting);
        let timeout = Duration::from_secs(self.config.scheduler.extraction_timeout_secs);
        let extraction = self
            .extractor
            .extract(video_path, &paths.audio, timeout)
            .await?;
        if self.cancelled() {
            return Ok(PipelineRun::Cancelled);
        }
        self.report(20, Stage::Transcribing);

        // A silent video is a valid outcome: placeholder subtitles, no
        // transcription or translation work
        if !extraction.has_audio_track {
            info!("{}: no audio track, writing placeholder", video_path.display());
            SubtitleDocument::write_placeholder(&paths.bilingual_srt, extraction.duration_secs)
                .map_err(|e| JobError::TranscriptionFailed(e.to_string()))?;
            self.report(100, Stage::Translating);
            return Ok(PipelineRun::Completed(PipelineOutput {
                output_paths: vec![paths.bilingual_srt],
                degraded_batches: 0,
            }));
        }

        // Stage 2: speech recognition (20-40)
        let segments = self.transcriber.transcribe(&paths.audio).await?;
        if self.cancelled() {
            return Ok(PipelineRun::Cancelled);
        }

        if segments.is_empty() {
            info!("{}: no speech detected", video_path.display());
            SubtitleDocument::write_placeholder(&paths.bilingual_srt, extraction.duration_secs)
                .map_err(|e| JobError::TranscriptionFailed(e.to_string()))?;
            self.report(100, Stage::Translating);
            return Ok(PipelineRun::Completed(PipelineOutput {
                output_paths: vec![paths.bilingual_srt],
                degraded_batches: 0,
            }));
        }

        // Keep the source-language transcript around for inspection
        SubtitleDocument::new(segments.clone())
            .write_to_srt(&paths.transcript_srt)
            .map_err(|e| JobError::TranscriptionFailed(e.to_string()))?;
        self.report(40, Stage::Translating);

        // Stage 3: translation (40-70), progress per completed batch
        let sink = self.sink.clone();
        let progress = move |done: usize, total: usize| {
            let percent = 40 + ((30 * done) / total.max(1)) as u8;
            sink.emit(&WorkerMessage::Progress {
                percent,
                stage: Stage::Translating,
            });
        };

        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            outcome = self.engine.translate(
                segments,
                &self.config.source_language,
                &self.config.target_language,
                progress,
            ) => outcome.map_err(|e| JobError::TranslationFailed(e.to_string()))?,
            _ = wait_for_cancel(cancel) => return Ok(PipelineRun::Cancelled),
        };

        if outcome.degraded_batches > 0 {
            warn!(
                "{}: {} batches degraded to source text",
                video_path.display(),
                outcome.degraded_batches
            );
        }

        let document = SubtitleDocument::new(outcome.segments);
        document
            .write_to_srt(&paths.bilingual_srt)
            .map_err(|e| JobError::TranslationFailed(e.to_string()))?;
        if self.cancelled() {
            return Ok(PipelineRun::Cancelled);
        }
        self.report(70, Stage::BurningIn);

        // Stage 4: optional burn-in (70-100)
        let mut output_paths = vec![paths.bilingual_srt.clone()];
        if self.config.scheduler.burn_in {
            let video = self
                .burner
                .burn_in(video_path, &paths.bilingual_srt, &paths.output_video)
                .await?;
            output_paths.push(video);
        }
        self.report(100, Stage::BurningIn);

        Ok(PipelineRun::Completed(PipelineOutput {
            output_paths,
            degraded_batches: outcome.degraded_batches,
        }))
    }
}

/// Resolves once the cancel flag flips. Polling keeps the translation stage
/// interruptible without threading a channel through the engine.
async fn wait_for_cancel(cancel: Arc<AtomicBool>) {
    while !cancel.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Watch the worker's stdin for a cancellation request. Both an explicit
/// `CANCEL` line and plain EOF (the controller dropped its end) count.
fn spawn_cancel_watcher(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim() == CANCEL_LINE => break,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
        cancel.store(true, Ordering::SeqCst);
    });
}

/// Worker process entry point. Returns the process exit code: 0 on success,
/// 2 after honoring a cancellation, 1 on failure.
pub async fn run_worker(video_path: PathBuf, config_path: PathBuf) -> i32 {
    let sink: Arc<dyn EventSink> = Arc::new(StdoutReporter);
    let cancel = Arc::new(AtomicBool::new(false));
    spawn_cancel_watcher(cancel.clone());

    let config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            sink.emit(&WorkerMessage::Error {
                error: JobError::InvalidInput(format!("configuration unreadable: {}", e)),
            });
            return 1;
        }
    };

    let pipeline = match WorkerPipeline::from_config(config, sink.clone(), cancel) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            sink.emit(&WorkerMessage::Error {
                error: JobError::InvalidInput(format!("pipeline setup failed: {}", e)),
            });
            return 1;
        }
    };

    match pipeline.run(&video_path).await {
        Ok(PipelineRun::Completed(output)) => {
            sink.emit(&WorkerMessage::Completed {
                output_paths: output.output_paths,
                degraded_batches: output.degraded_batches,
            });
            0
        }
        Ok(PipelineRun::Cancelled) => EXIT_CANCELLED,
        Err(error) => {
            sink.emit(&WorkerMessage::Error { error });
            1
        }
    }
}
