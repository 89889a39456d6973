/*!
 * Bounded-concurrency process scheduler.
 *
 * A single controller task owns every job record. Jobs arrive over a command
 * channel, wait in a FIFO queue, and run in isolated worker processes up to a
 * configurable ceiling. Workers talk back over a message channel; their exits
 * are reaped through a FuturesUnordered so a crash in one worker never blocks
 * the others.
 */

pub mod ipc;
pub mod job;
pub mod progress;
pub mod worker;

pub use ipc::{WorkerMessage, CANCEL_LINE};
pub use job::{JobId, JobRecord, JobState, Stage};
pub use progress::ProgressAggregator;
pub use worker::{
    CancelSignal, ProcessLauncher, WorkerExit, WorkerHandle, WorkerLauncher, EXIT_CANCELLED,
    WORKER_GUARD_ENV,
};

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::errors::JobError;
use crate::file_utils::FileManager;

/// Requests accepted by the scheduler task
#[derive(Debug)]
enum Command {
    Submit {
        path: PathBuf,
        reply: oneshot::Sender<Result<JobId, JobError>>,
    },
    Cancel(JobId),
    ClearHistory,
    Snapshot {
        reply: oneshot::Sender<Vec<JobRecord>>,
    },
    Shutdown,
}

/// Notifications the scheduler emits for the UI layer
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A job was accepted and queued
    Submitted { job_id: JobId, path: PathBuf },

    /// A queued job started running in a worker process
    Started { job_id: JobId },

    /// Progress report, with the recomputed global percent
    Progress {
        job_id: JobId,
        percent: u8,
        stage: Stage,
        global_percent: u8,
    },

    /// Log line forwarded from a worker
    LogLine {
        job_id: JobId,
        level: String,
        text: String,
    },

    /// A job reached a terminal state
    Finished {
        job_id: JobId,
        state: JobState,
        output_paths: Vec<PathBuf>,
        degraded_batches: usize,
        error: Option<JobError>,
    },
}

/// Cloneable client-side handle to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Submit a video for processing; resolves once the job is queued
    pub async fn submit(&self, path: PathBuf) -> Result<JobId, JobError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                path,
                reply: reply_tx,
            })
            .await
            .map_err(|_| JobError::WorkerCrashed("scheduler is gone".to_string()))?;
        reply_rx
            .await
            .map_err(|_| JobError::WorkerCrashed("scheduler dropped the reply".to_string()))?
    }

    /// Request cancellation of a queued or running job
    pub async fn cancel(&self, job_id: JobId) -> Result<()> {
        self.commands
            .send(Command::Cancel(job_id))
            .await
            .map_err(|_| anyhow!("scheduler is gone"))
    }

    /// Drop all terminal jobs from the records and the progress view
    pub async fn clear_history(&self) -> Result<()> {
        self.commands
            .send(Command::ClearHistory)
            .await
            .map_err(|_| anyhow!("scheduler is gone"))
    }

    /// Copy of every tracked job record
    pub async fn snapshot(&self) -> Result<Vec<JobRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| anyhow!("scheduler is gone"))?;
        reply_rx.await.map_err(|_| anyhow!("scheduler is gone"))
    }

    /// Cancel running workers and stop the scheduler task
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| anyhow!("scheduler is gone"))
    }
}

/// Concurrency ceiling actually enforced by the admission loop.
/// A misconfigured zero would deadlock the queue, so it is clamped to 1.
pub fn effective_ceiling(configured: usize) -> usize {
    configured.max(1)
}

type ExitFuture = BoxFuture<'static, (JobId, WorkerExit)>;

/// The controller task state. All mutation happens on one task; the rest of
/// the application interacts through [`SchedulerHandle`] and the event stream.
pub struct Scheduler {
    launcher: Arc<dyn WorkerLauncher>,
    ceiling: usize,
    jobs: HashMap<JobId, JobRecord>,
    queue: VecDeque<JobId>,
    /// Cancellation triggers for currently running workers
    cancellers: HashMap<JobId, CancelSignal>,
    aggregator: ProgressAggregator,
    events: mpsc::UnboundedSender<SchedulerEvent>,
}

impl Scheduler {
    /// Start the scheduler task and hand back its handle and event stream
    pub fn spawn(
        launcher: Arc<dyn WorkerLauncher>,
        ceiling: usize,
    ) -> (SchedulerHandle, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let scheduler = Self {
            launcher,
            ceiling: effective_ceiling(ceiling),
            jobs: HashMap::new(),
            queue: VecDeque::new(),
            cancellers: HashMap::new(),
            aggregator: ProgressAggregator::new(),
            events: event_tx,
        };

        tokio::spawn(scheduler.run(cmd_rx));

        (SchedulerHandle { commands: cmd_tx }, event_rx)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        let mut exits: FuturesUnordered<ExitFuture> = FuturesUnordered::new();
        let mut shutting_down = false;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Submit { path, reply }) => {
                            let result = self.submit(path);
                            let _ = reply.send(result);
                            self.admit(&mut exits, &worker_tx).await;
                        }
                        Some(Command::Cancel(job_id)) => self.cancel(job_id),
                        Some(Command::ClearHistory) => self.clear_history(),
                        Some(Command::Snapshot { reply }) => {
                            let _ = reply.send(self.jobs.values().cloned().collect());
                        }
                        Some(Command::Shutdown) | None => {
                            shutting_down = true;
                            self.begin_shutdown();
                            if exits.is_empty() {
                                break;
                            }
                        }
                    }
                }
                Some((job_id, message)) = worker_rx.recv() => {
                    self.handle_message(job_id, message);
                }
                Some((job_id, exit)) = exits.next(), if !exits.is_empty() => {
                    // A worker's final messages can arrive in the same poll as
                    // its exit; apply them before settling the terminal state
                    while let Ok((id, message)) = worker_rx.try_recv() {
                        self.handle_message(id, message);
                    }
                    self.reap(job_id, exit);
                    if shutting_down {
                        if exits.is_empty() {
                            break;
                        }
                    } else {
                        self.admit(&mut exits, &worker_tx).await;
                    }
                }
            }
        }

        debug!("Scheduler task stopped");
    }

    /// Validate and enqueue a new job
    fn submit(&mut self, path: PathBuf) -> Result<JobId, JobError> {
        if !FileManager::is_video_file(&path) {
            return Err(JobError::InvalidInput(format!(
                "not a readable video file: {}",
                path.display()
            )));
        }

        let job_id = JobId::new();
        let record = JobRecord::new(job_id, path.clone());
        self.jobs.insert(job_id, record);
        self.queue.push_back(job_id);
        self.aggregator.track(job_id);

        info!("Job {} queued: {}", job_id, path.display());
        self.emit(SchedulerEvent::Submitted { job_id, path });
        Ok(job_id)
    }

    /// Start queued jobs while slots are free, preserving submission order
    async fn admit(
        &mut self,
        exits: &mut FuturesUnordered<ExitFuture>,
        worker_tx: &mpsc::UnboundedSender<(JobId, WorkerMessage)>,
    ) {
        while self.cancellers.len() < self.ceiling {
            let Some(job_id) = self.queue.pop_front() else {
                break;
            };

            // A record can only be missing if history was cleared mid-queue
            let Some(record) = self.jobs.get_mut(&job_id) else {
                continue;
            };
            if record.state != JobState::Queued {
                continue;
            }

            let path = record.source_path.clone();
            match self.launcher.launch(job_id, &path, worker_tx.clone()).await {
                Ok(handle) => {
                    if let Some(record) = self.jobs.get_mut(&job_id) {
                        record.state = JobState::Running;
                    }
                    self.cancellers.insert(job_id, handle.canceller);

                    let join = handle.join;
                    exits.push(Box::pin(async move {
                        let exit = join.await.unwrap_or_else(|e| {
                            WorkerExit::Crashed(format!("supervisor task panicked: {}", e))
                        });
                        (job_id, exit)
                    }));

                    info!("Job {} started", job_id);
                    self.emit(SchedulerEvent::Started { job_id });
                }
                Err(e) => {
                    error!("Job {} failed to launch: {:#}", job_id, e);
                    if let Some(record) = self.jobs.get_mut(&job_id) {
                        record.state = JobState::Failed;
                        record.error = Some(JobError::WorkerCrashed(format!(
                            "failed to launch worker: {}",
                            e
                        )));
                    }
                    self.finish(job_id);
                }
            }
        }
    }

    /// Apply one worker message to the owning job record
    fn handle_message(&mut self, job_id: JobId, message: WorkerMessage) {
        let Some(record) = self.jobs.get_mut(&job_id) else {
            return;
        };

        match message {
            WorkerMessage::Progress { percent, stage } => {
                record.apply_progress(percent, stage);
                self.aggregator.update(job_id, percent, stage);
                let percent = self
                    .jobs
                    .get(&job_id)
                    .map(|r| r.progress_percent)
                    .unwrap_or(percent);
                let global_percent = self.aggregator.global_percent();
                self.emit(SchedulerEvent::Progress {
                    job_id,
                    percent,
                    stage,
                    global_percent,
                });
            }
            WorkerMessage::Log { level, text } => {
                debug!("Job {} [{}]: {}", job_id, level, text);
                self.emit(SchedulerEvent::LogLine {
                    job_id,
                    level,
                    text,
                });
            }
            WorkerMessage::Completed {
                output_paths,
                degraded_batches,
            } => {
                record.output_paths = output_paths;
                record.degraded_batches = degraded_batches;
                record.result_received = true;
            }
            WorkerMessage::Error { error } => {
                record.error = Some(error);
            }
        }
    }

    /// Settle a job's terminal state once its worker process is gone
    fn reap(&mut self, job_id: JobId, exit: WorkerExit) {
        self.cancellers.remove(&job_id);

        let Some(record) = self.jobs.get_mut(&job_id) else {
            return;
        };

        record.state = if record.cancel_requested || exit == WorkerExit::Cancelled {
            JobState::Cancelled
        } else {
            match exit {
                WorkerExit::Completed if record.result_received => JobState::Succeeded,
                WorkerExit::Completed | WorkerExit::Crashed(_) if record.error.is_some() => {
                    JobState::Failed
                }
                WorkerExit::Completed => {
                    // Clean exit without a result is still a broken worker
                    record.error = Some(JobError::WorkerCrashed(
                        "worker exited without reporting a result".to_string(),
                    ));
                    JobState::Failed
                }
                WorkerExit::Crashed(reason) => {
                    record.error = Some(JobError::WorkerCrashed(reason));
                    JobState::Failed
                }
                WorkerExit::Cancelled => JobState::Cancelled,
            }
        };

        self.finish(job_id);
    }

    /// Record terminal progress and notify listeners
    fn finish(&mut self, job_id: JobId) {
        let Some(record) = self.jobs.get(&job_id) else {
            return;
        };
        let state = record.state;
        self.aggregator.finish(job_id, state);

        match state {
            JobState::Succeeded => info!(
                "Job {} succeeded ({} degraded batches)",
                job_id, record.degraded_batches
            ),
            JobState::Cancelled => info!("Job {} cancelled", job_id),
            JobState::Failed => warn!(
                "Job {} failed: {}",
                job_id,
                record
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            _ => {}
        }

        self.emit(SchedulerEvent::Finished {
            job_id,
            state,
            output_paths: record.output_paths.clone(),
            degraded_batches: record.degraded_batches,
            error: record.error.clone(),
        });
    }

    /// Cancel a queued or running job. Terminal and unknown jobs are no-ops.
    fn cancel(&mut self, job_id: JobId) {
        let Some(record) = self.jobs.get_mut(&job_id) else {
            warn!("Cancel for unknown job {}", job_id);
            return;
        };

        match record.state {
            JobState::Queued => {
                // Never started, so there is no process to stop
                record.state = JobState::Cancelled;
                self.queue.retain(|id| *id != job_id);
                self.finish(job_id);
            }
            JobState::Running => {
                record.cancel_requested = true;
                if let Some(canceller) = self.cancellers.get_mut(&job_id) {
                    canceller.trigger();
                }
                info!("Job {} cancellation requested", job_id);
            }
            _ => debug!("Cancel for already-terminal job {}", job_id),
        }
    }

    /// Drop terminal jobs; queued and running jobs are untouched
    fn clear_history(&mut self) {
        let terminal: Vec<JobId> = self
            .jobs
            .values()
            .filter(|r| r.state.is_terminal())
            .map(|r| r.id)
            .collect();
        for job_id in terminal {
            self.jobs.remove(&job_id);
            self.aggregator.remove(job_id);
        }
    }

    /// Cancel everything still queued or running ahead of shutdown
    fn begin_shutdown(&mut self) {
        let pending: Vec<JobId> = self
            .jobs
            .values()
            .filter(|r| !r.state.is_terminal())
            .map(|r| r.id)
            .collect();
        for job_id in pending {
            self.cancel(job_id);
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        // Listeners may have gone away; the scheduler keeps running regardless
        let _ = self.events.send(event);
    }
}
