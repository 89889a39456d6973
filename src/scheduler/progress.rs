/*!
 * Progress aggregation for the UI layer.
 *
 * Reduces raw per-worker progress messages into per-job and global
 * percentages. Lives on the scheduler task, so it needs no locking.
 */

use std::collections::HashMap;

use crate::scheduler::job::{JobId, JobState, Stage};

#[derive(Debug, Clone, Copy)]
struct JobProgress {
    percent: u8,
    terminal: Option<JobState>,
}

/// Per-job and global progress, fed by the scheduler
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    jobs: HashMap<JobId, JobProgress>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a submitted job at 0%
    pub fn track(&mut self, job_id: JobId) {
        self.jobs.entry(job_id).or_insert(JobProgress {
            percent: 0,
            terminal: None,
        });
    }

    /// Apply a progress report for a running job
    pub fn update(&mut self, job_id: JobId, percent: u8, _stage: Stage) {
        if let Some(job) = self.jobs.get_mut(&job_id) {
            if job.terminal.is_none() {
                job.percent = job.percent.max(percent.min(100));
            }
        }
    }

    /// Mark a job terminal. Succeeded jobs count as 100%; failed and
    /// cancelled jobs keep their last reported percent.
    pub fn finish(&mut self, job_id: JobId, state: JobState) {
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.terminal = Some(state);
            if state == JobState::Succeeded {
                job.percent = 100;
            }
        }
    }

    /// Stop tracking a job (history cleared)
    pub fn remove(&mut self, job_id: JobId) {
        self.jobs.remove(&job_id);
    }

    /// Last known percent for one job
    pub fn job_percent(&self, job_id: JobId) -> Option<u8> {
        self.jobs.get(&job_id).map(|j| j.percent)
    }

    /// Mean percent over all tracked jobs; 100 when nothing is tracked
    pub fn global_percent(&self) -> u8 {
        if self.jobs.is_empty() {
            return 100;
        }
        let sum: u64 = self.jobs.values().map(|j| j.percent as u64).sum();
        (sum / self.jobs.len() as u64) as u8
    }

    /// Number of tracked jobs
    pub fn tracked(&self) -> usize {
        self.jobs.len()
    }
}
