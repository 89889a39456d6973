/*!
 * External media tool boundaries.
 *
 * Extraction, transcription and burn-in are opaque collaborators as far as the
 * scheduler is concerned: audio in, segments out. The default implementations
 * shell out to ffmpeg/ffprobe and a whisper CLI. Tool paths and the speech
 * model handle are resolved lazily, once per worker process, and reused for
 * every call in that worker; nothing is shared across processes.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::errors::JobError;
use crate::subtitle_processor::{SubtitleDocument, SubtitleSegment};

/// Result of the audio extraction stage
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Path to the extracted audio file (meaningless when no audio track)
    pub audio_path: PathBuf,
    /// Whether the container had an audio track at all.
    /// A silent video is a valid, non-error outcome.
    pub has_audio_track: bool,
    /// Media duration in seconds, from the container header
    pub duration_secs: f64,
}

/// Audio extraction boundary
#[async_trait]
pub trait ExtractionPort: Send + Sync {
    async fn extract(
        &self,
        video_path: &Path,
        audio_path: &Path,
        timeout: Duration,
    ) -> Result<Extraction, JobError>;
}

/// Speech recognition boundary
#[async_trait]
pub trait TranscriptionPort: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<SubtitleSegment>, JobError>;
}

/// Subtitle burn-in boundary
#[async_trait]
pub trait BurnInPort: Send + Sync {
    async fn burn_in(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<PathBuf, JobError>;
}

// Candidate locations checked before falling back to PATH lookup
const FFMPEG_CANDIDATES: &[&str] = &[
    "/opt/homebrew/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/usr/bin/ffmpeg",
];
const FFPROBE_CANDIDATES: &[&str] = &[
    "/opt/homebrew/bin/ffprobe",
    "/usr/local/bin/ffprobe",
    "/usr/bin/ffprobe",
];

static FFMPEG_PATH: OnceCell<PathBuf> = OnceCell::new();
static FFPROBE_PATH: OnceCell<PathBuf> = OnceCell::new();

fn resolve_tool(cell: &'static OnceCell<PathBuf>, candidates: &[&str], name: &str) -> PathBuf {
    cell.get_or_init(|| {
        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return path;
            }
        }
        // Fall back to PATH lookup
        PathBuf::from(name)
    })
    .clone()
}

/// ffprobe stream description (only the fields we read)
#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Audio extraction via ffmpeg/ffprobe
#[derive(Debug, Default)]
pub struct FfmpegExtractor;

impl FfmpegExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Probe the container for audio streams and duration
    async fn probe(&self, video_path: &Path) -> Result<ProbeOutput, JobError> {
        let ffprobe = resolve_tool(&FFPROBE_PATH, FFPROBE_CANDIDATES, "ffprobe");
        let output = Command::new(ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(video_path)
            .output()
            .await
            .map_err(|e| JobError::ExtractionFailed(format!("ffprobe failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(JobError::ExtractionFailed(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| JobError::ExtractionFailed(format!("ffprobe output unreadable: {}", e)))
    }
}

#[async_trait]
impl ExtractionPort for FfmpegExtractor {
    async fn extract(
        &self,
        video_path: &Path,
        audio_path: &Path,
        timeout: Duration,
    ) -> Result<Extraction, JobError> {
        let probe = self.probe(video_path).await?;

        let duration_secs = probe
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let has_audio_track = probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));

        if !has_audio_track {
            info!("No audio track in {:?}, skipping extraction", video_path);
            return Ok(Extraction {
                audio_path: audio_path.to_path_buf(),
                has_audio_track: false,
                duration_secs,
            });
        }

        let ffmpeg = resolve_tool(&FFMPEG_PATH, FFMPEG_CANDIDATES, "ffmpeg");
        debug!("Extracting audio from {:?} with {:?}", video_path, ffmpeg);

        let mut command = Command::new(ffmpeg);
        command
            .arg("-i")
            .arg(video_path)
            .args(["-q:a", "0", "-map", "a", "-ac", "1", "-ar", "16000"])
            .arg(audio_path)
            .arg("-y");

        let run = async {
            let output = command.output().await.map_err(|e| {
                JobError::ExtractionFailed(format!("ffmpeg failed to start: {}", e))
            })?;
            if !output.status.success() {
                return Err(JobError::ExtractionFailed(format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
            Ok(())
        };

        tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| JobError::ExtractionTimeout(timeout.as_secs()))??;

        Ok(Extraction {
            audio_path: audio_path.to_path_buf(),
            has_audio_track: true,
            duration_secs,
        })
    }
}

/// Speech recognition via a whisper.cpp style CLI.
///
/// The binary and model paths are resolved on first use and cached for the
/// lifetime of the worker process.
#[derive(Debug)]
pub struct WhisperCommand {
    binary: OnceCell<PathBuf>,
    model_path: Option<PathBuf>,
}

impl WhisperCommand {
    pub fn new(model_path: Option<PathBuf>) -> Self {
        Self {
            binary: OnceCell::new(),
            model_path,
        }
    }

    fn resolve_binary(&self) -> PathBuf {
        self.binary
            .get_or_init(|| {
                for candidate in ["/opt/homebrew/bin/whisper-cli", "/usr/local/bin/whisper-cli"] {
                    let path = PathBuf::from(candidate);
                    if path.exists() {
                        return path;
                    }
                }
                PathBuf::from("whisper-cli")
            })
            .clone()
    }

    fn resolve_model(&self) -> Option<PathBuf> {
        if let Some(path) = &self.model_path {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var("SUBWEAVE_WHISPER_MODEL") {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(".whisper_models").join("ggml-base.bin"))
            .filter(|p| p.exists())
    }
}

#[async_trait]
impl TranscriptionPort for WhisperCommand {
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<SubtitleSegment>, JobError> {
        let binary = self.resolve_binary();
        let output_base = audio_path.with_extension("");

        let mut command = Command::new(binary);
        if let Some(model) = self.resolve_model() {
            command.arg("-m").arg(model);
        }
        command
            .arg("-f")
            .arg(audio_path)
            .arg("-osrt")
            .arg("-of")
            .arg(&output_base);

        let output = command.output().await.map_err(|e| {
            JobError::TranscriptionFailed(format!("whisper failed to start: {}", e))
        })?;

        if !output.status.success() {
            return Err(JobError::TranscriptionFailed(format!(
                "whisper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let srt_path = output_base.with_extension("srt");
        let document = SubtitleDocument::parse_srt_file(&srt_path)
            .map_err(|e| JobError::TranscriptionFailed(e.to_string()))?;

        Ok(document.segments)
    }
}

/// Subtitle burn-in via ffmpeg
#[derive(Debug, Default)]
pub struct FfmpegBurnIn;

impl FfmpegBurnIn {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BurnInPort for FfmpegBurnIn {
    async fn burn_in(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<PathBuf, JobError> {
        let ffmpeg = resolve_tool(&FFMPEG_PATH, FFMPEG_CANDIDATES, "ffmpeg");

        let filter = format!("subtitles='{}'", subtitle_path.display());
        let output = Command::new(ffmpeg)
            .arg("-i")
            .arg(video_path)
            .args(["-vf", &filter, "-c:a", "copy"])
            .arg(output_path)
            .arg("-y")
            .output()
            .await
            .map_err(|e| JobError::BurnInFailed(format!("ffmpeg failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(JobError::BurnInFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(output_path.to_path_buf())
    }
}
