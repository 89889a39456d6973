/*!
 * Worker process launching.
 *
 * Every running job executes in a separate OS process so that a crash or
 * runaway allocation in one job's media/ML work cannot take down siblings or
 * the controller. Workers are started by re-executing the current binary with
 * a dedicated `worker` subcommand: a clean, minimal entry point that never
 * duplicates the controller's live state. A guard environment variable makes
 * worker-to-worker spawning impossible.
 */

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::scheduler::ipc::{self, WorkerMessage};
use crate::scheduler::job::JobId;

/// Environment variable marking a process as a worker.
/// The launcher refuses to run when it is present in its own environment.
pub const WORKER_GUARD_ENV: &str = "SUBWEAVE_WORKER";

/// How a worker process ended
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    /// Exited cleanly after reporting a result
    Completed,
    /// Honored a cancellation request (or was killed after one)
    Cancelled,
    /// Crashed or exited without a recognizable status
    Crashed(String),
}

/// One-shot cancellation trigger for a running worker
#[derive(Debug)]
pub struct CancelSignal(Option<oneshot::Sender<()>>);

impl CancelSignal {
    pub fn new(sender: oneshot::Sender<()>) -> Self {
        Self(Some(sender))
    }

    /// Request cancellation; repeated triggers are no-ops
    pub fn trigger(&mut self) {
        if let Some(sender) = self.0.take() {
            let _ = sender.send(());
        }
    }
}

/// Controller-side handle for a launched worker
#[derive(Debug)]
pub struct WorkerHandle {
    /// Best-effort cancellation request
    pub canceller: CancelSignal,
    /// Resolves when the worker is gone
    pub join: JoinHandle<WorkerExit>,
}

/// Seam between the scheduler and the process machinery.
///
/// The production implementation spawns real OS processes; tests inject
/// scripted launchers to drive the scheduler deterministically.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(
        &self,
        job_id: JobId,
        video_path: &Path,
        events: mpsc::UnboundedSender<(JobId, WorkerMessage)>,
    ) -> Result<WorkerHandle>;
}

/// Spawns isolated worker processes by re-executing the current binary
pub struct ProcessLauncher {
    config_path: PathBuf,
    /// How long a cancelled worker gets to exit on its own before a hard kill
    grace: Duration,
}

impl ProcessLauncher {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            grace: Duration::from_secs(10),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        job_id: JobId,
        video_path: &Path,
        events: mpsc::UnboundedSender<(JobId, WorkerMessage)>,
    ) -> Result<WorkerHandle> {
        // Re-entrancy guard: a worker must never spawn further workers
        if std::env::var_os(WORKER_GUARD_ENV).is_some() {
            return Err(anyhow!(
                "refusing to launch a worker from inside a worker process"
            ));
        }

        let exe = std::env::current_exe().context("Failed to locate current executable")?;

        let mut child = Command::new(exe)
            .arg("worker")
            .arg("--video")
            .arg(video_path)
            .arg("--config")
            .arg(&self.config_path)
            .env(WORKER_GUARD_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn worker process")?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Worker stdout not captured"))?;
        let stdin = child.stdin.take();

        // Drain the worker's message stream into the shared event channel
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match ipc::decode(&line) {
                    Ok(message) => {
                        if events.send((job_id, message)).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Job {}: unreadable worker line: {}", job_id, e),
                }
            }
        });

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let grace = self.grace;

        let join = tokio::spawn(async move {
            let mut stdin = stdin;

            // Decide first, touch the child after, so the wait future is gone
            // before the cancellation path needs the child again
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                cancelled = cancel_rx => {
                    // A dropped canceller is not a cancellation request
                    if cancelled.is_ok() { None } else { Some(child.wait().await) }
                }
            };

            let exit = match exited {
                Some(status) => map_exit(status, false),
                None => {
                    // Cooperative request: close the worker's stdin, then
                    // escalate to a kill when it does not exit in time
                    drop(stdin.take());
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(status) => map_exit(status, true),
                        Err(_) => {
                            let _ = child.kill().await;
                            WorkerExit::Cancelled
                        }
                    }
                }
            };

            // Let the reader finish draining buffered messages
            let _ = reader.await;
            exit
        });

        Ok(WorkerHandle {
            canceller: CancelSignal::new(cancel_tx),
            join,
        })
    }
}

/// Exit code a worker uses after honoring a cancellation request
pub const EXIT_CANCELLED: i32 = 2;

fn map_exit(status: std::io::Result<std::process::ExitStatus>, cancel_requested: bool) -> WorkerExit {
    match status {
        Ok(status) if status.success() => {
            if cancel_requested {
                WorkerExit::Cancelled
            } else {
                WorkerExit::Completed
            }
        }
        Ok(status) if status.code() == Some(EXIT_CANCELLED) => WorkerExit::Cancelled,
        Ok(status) => WorkerExit::Crashed(format!("worker exited with {}", status)),
        Err(e) => WorkerExit::Crashed(format!("failed to reap worker: {}", e)),
    }
}
