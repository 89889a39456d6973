use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::JobError;

// @module: Per-job state owned by the scheduler

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs; the full UUID is still in the record
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Coarse phase of a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extracting,
    Transcribing,
    Translating,
    BurningIn,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Extracting => "extracting audio",
            Self::Transcribing => "recognizing speech",
            Self::Translating => "translating subtitles",
            Self::BurningIn => "synthesizing video",
        };
        write!(f, "{}", label)
    }
}

/// Lifecycle state of a job.
///
/// Transitions are monotonic: Queued -> Running -> exactly one terminal state,
/// never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Everything the scheduler tracks about one submitted video.
///
/// Owned exclusively by the scheduler task; workers only ever emit messages
/// that the scheduler applies here.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub source_path: PathBuf,
    pub state: JobState,
    /// 0-100, non-decreasing while Running
    pub progress_percent: u8,
    pub stage: Option<Stage>,
    /// Populated only on failure
    pub error: Option<JobError>,
    /// Output files reported by the worker
    pub output_paths: Vec<PathBuf>,
    /// Batches that kept their source text after terminal translation failure
    pub degraded_batches: usize,
    /// Set when cancellation was requested while Running
    pub cancel_requested: bool,
    /// Set once the worker reported a completed result
    pub result_received: bool,
}

impl JobRecord {
    pub fn new(id: JobId, source_path: PathBuf) -> Self {
        Self {
            id,
            source_path,
            state: JobState::Queued,
            progress_percent: 0,
            stage: None,
            error: None,
            output_paths: Vec::new(),
            degraded_batches: 0,
            cancel_requested: false,
            result_received: false,
        }
    }

    /// Apply a progress report, keeping the percent monotone
    pub fn apply_progress(&mut self, percent: u8, stage: Stage) {
        if self.state != JobState::Running {
            return;
        }
        self.progress_percent = self.progress_percent.max(percent.min(100));
        self.stage = Some(stage);
    }
}
