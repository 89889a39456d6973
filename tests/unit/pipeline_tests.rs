/*!
 * Tests for the worker pipeline, using fake media ports so no external
 * tools are needed
 */

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subweave::app_config::Config;
use subweave::errors::JobError;
use subweave::media::{BurnInPort, Extraction, ExtractionPort, TranscriptionPort};
use subweave::pipeline::{EventSink, PipelineOutput, PipelineRun, WorkerPipeline};
use subweave::providers::{MockClient, TranslationClient};
use subweave::scheduler::{Stage, WorkerMessage};
use subweave::subtitle_processor::{SubtitleDocument, SubtitleSegment};
use subweave::translation::{BatchLimits, BatchTranslationEngine, RetryPolicy};

use crate::common;

#[derive(Debug, Default)]
struct MemorySink {
    messages: Mutex<Vec<WorkerMessage>>,
}

impl MemorySink {
    fn progress_reports(&self) -> Vec<(u8, Stage)> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                WorkerMessage::Progress { percent, stage } => Some((*percent, *stage)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, message: &WorkerMessage) {
        self.messages.lock().unwrap().push(message.clone());
    }
}

struct FakeExtractor {
    has_audio: bool,
    duration_secs: f64,
}

#[async_trait]
impl ExtractionPort for FakeExtractor {
    async fn extract(
        &self,
        _video_path: &Path,
        audio_path: &Path,
        _timeout: Duration,
    ) -> Result<Extraction, JobError> {
        Ok(Extraction {
            audio_path: audio_path.to_path_buf(),
            has_audio_track: self.has_audio,
            duration_secs: self.duration_secs,
        })
    }
}

struct FakeTranscriber {
    segments: Vec<SubtitleSegment>,
}

#[async_trait]
impl TranscriptionPort for FakeTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<Vec<SubtitleSegment>, JobError> {
        Ok(self.segments.clone())
    }
}

#[derive(Default)]
struct FakeBurnIn;

#[async_trait]
impl BurnInPort for FakeBurnIn {
    async fn burn_in(
        &self,
        _video_path: &Path,
        _subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<PathBuf, JobError> {
        std::fs::write(output_path, "burned").map_err(|e| JobError::BurnInFailed(e.to_string()))?;
        Ok(output_path.to_path_buf())
    }
}

fn test_engine() -> BatchTranslationEngine {
    let primary: Arc<dyn TranslationClient> = Arc::new(MockClient::tagged("zh"));
    BatchTranslationEngine::new(
        primary,
        None,
        RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        BatchLimits::default(),
        2,
    )
}

fn test_config(cache_dir: &Path, burn_in: bool) -> Config {
    let mut config = Config::default();
    config.scheduler.cache_dir = Some(cache_dir.to_path_buf());
    config.scheduler.burn_in = burn_in;
    config
}

fn build_pipeline(
    config: Config,
    has_audio: bool,
    segments: Vec<SubtitleSegment>,
    sink: Arc<MemorySink>,
    cancel: Arc<AtomicBool>,
) -> WorkerPipeline {
    WorkerPipeline::new(
        config,
        Box::new(FakeExtractor {
            has_audio,
            duration_secs: 30.0,
        }),
        Box::new(FakeTranscriber { segments }),
        Box::new(FakeBurnIn),
        test_engine(),
        sink,
        cancel,
    )
}

#[tokio::test]
async fn test_pipeline_withAudio_shouldWriteBilingualSubtitles() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_fake_video(temp_dir.path(), "movie.mp4").unwrap();
    let sink = Arc::new(MemorySink::default());

    let pipeline = build_pipeline(
        test_config(temp_dir.path(), false),
        true,
        common::make_segments(3),
        sink.clone(),
        Arc::new(AtomicBool::new(false)),
    );

    let run = pipeline.run(&video).await.unwrap();
    let output = match run {
        PipelineRun::Completed(output) => output,
        PipelineRun::Cancelled => panic!("pipeline should not be cancelled"),
    };

    assert_eq!(output.degraded_batches, 0);
    assert_eq!(output.output_paths.len(), 1);
    let bilingual = &output.output_paths[0];
    assert!(bilingual.ends_with("movie_bilingual.srt"));

    let doc = SubtitleDocument::parse_srt_file(bilingual).unwrap();
    assert_eq!(doc.segments.len(), 3);
    // Bilingual blocks carry the source line followed by the translation
    assert!(doc.segments[0].source_text.contains("segment number 0"));
    assert!(doc.segments[0].source_text.contains("[zh]"));

    // Stage progression covers all four phases in order
    let reports = sink.progress_reports();
    assert_eq!(reports.first(), Some(&(0, Stage::Extracting)));
    assert!(reports.contains(&(20, Stage::Transcribing)));
    assert!(reports.contains(&(40, Stage::Translating)));
    assert!(reports.contains(&(70, Stage::BurningIn)));
    assert_eq!(reports.last(), Some(&(100, Stage::BurningIn)));
    let percents: Vec<u8> = reports.iter().map(|(p, _)| *p).collect();
    let mut sorted = percents.clone();
    sorted.sort_unstable();
    assert_eq!(percents, sorted, "progress must be non-decreasing");
}

#[tokio::test]
async fn test_pipeline_withoutAudioTrack_shouldWritePlaceholder() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_fake_video(temp_dir.path(), "silent.mp4").unwrap();
    let sink = Arc::new(MemorySink::default());

    let pipeline = build_pipeline(
        test_config(temp_dir.path(), false),
        false,
        vec![],
        sink,
        Arc::new(AtomicBool::new(false)),
    );

    let run = pipeline.run(&video).await.unwrap();
    let PipelineRun::Completed(PipelineOutput { output_paths, .. }) = run else {
        panic!("silent video is a valid, completed outcome");
    };

    let doc = SubtitleDocument::parse_srt_file(&output_paths[0]).unwrap();
    assert_eq!(doc.segments.len(), 1);
    assert_eq!(doc.segments[0].source_text, "[no speech detected]");
    assert_eq!(doc.segments[0].end_time_ms, 30_000);
}

#[tokio::test]
async fn test_pipeline_withEmptyTranscript_shouldWritePlaceholder() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_fake_video(temp_dir.path(), "quiet.mp4").unwrap();

    let pipeline = build_pipeline(
        test_config(temp_dir.path(), false),
        true,
        vec![],
        Arc::new(MemorySink::default()),
        Arc::new(AtomicBool::new(false)),
    );

    let run = pipeline.run(&video).await.unwrap();
    let PipelineRun::Completed(PipelineOutput { output_paths, .. }) = run else {
        panic!("empty transcript is a valid, completed outcome");
    };

    let doc = SubtitleDocument::parse_srt_file(&output_paths[0]).unwrap();
    assert_eq!(doc.segments[0].source_text, "[no speech detected]");
}

#[tokio::test]
async fn test_pipeline_withCancelBeforeStages_shouldStopEarly() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_fake_video(temp_dir.path(), "movie.mp4").unwrap();
    let sink = Arc::new(MemorySink::default());

    let pipeline = build_pipeline(
        test_config(temp_dir.path(), false),
        true,
        common::make_segments(3),
        sink.clone(),
        Arc::new(AtomicBool::new(true)),
    );

    let run = pipeline.run(&video).await.unwrap();
    assert_eq!(run, PipelineRun::Cancelled);

    // No bilingual output was produced
    let bilingual = temp_dir.path().join("movie_bilingual.srt");
    assert!(!bilingual.exists());
}

#[tokio::test]
async fn test_pipeline_withBurnInEnabled_shouldProduceVideoOutput() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_fake_video(temp_dir.path(), "movie.mp4").unwrap();

    let pipeline = build_pipeline(
        test_config(temp_dir.path(), true),
        true,
        common::make_segments(2),
        Arc::new(MemorySink::default()),
        Arc::new(AtomicBool::new(false)),
    );

    let run = pipeline.run(&video).await.unwrap();
    let PipelineRun::Completed(PipelineOutput { output_paths, .. }) = run else {
        panic!("burn-in run should complete");
    };

    assert_eq!(output_paths.len(), 2);
    // The burned video sits next to the input with a timestamped name
    let video_out = &output_paths[1];
    assert!(video_out.exists());
    let name = video_out.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("movie_subtitled_"));
    assert!(name.ends_with(".mp4"));
}
