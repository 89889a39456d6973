/*!
 * Tests for the bounded-concurrency process scheduler, driven by scripted
 * worker launchers instead of real processes
 */

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use subweave::errors::JobError;
use subweave::scheduler::{JobId, JobState, Scheduler, SchedulerEvent, SchedulerHandle};

use crate::common;
use crate::common::scripted_workers::{ScriptedLauncher, WorkerScript};

const EVENT_WAIT: Duration = Duration::from_secs(5);

async fn next_event(events: &mut mpsc::UnboundedReceiver<SchedulerEvent>) -> SchedulerEvent {
    timeout(EVENT_WAIT, events.recv())
        .await
        .expect("timed out waiting for scheduler event")
        .expect("scheduler event stream closed")
}

/// Drain events until the given job finishes, returning its terminal report
async fn wait_for_finish(
    events: &mut mpsc::UnboundedReceiver<SchedulerEvent>,
    job_id: JobId,
) -> (JobState, Option<JobError>, usize) {
    loop {
        if let SchedulerEvent::Finished {
            job_id: finished,
            state,
            error,
            degraded_batches,
            ..
        } = next_event(events).await
        {
            if finished == job_id {
                return (state, error, degraded_batches);
            }
        }
    }
}

/// Drain events until `count` jobs have finished
async fn wait_for_finishes(
    events: &mut mpsc::UnboundedReceiver<SchedulerEvent>,
    count: usize,
) -> Vec<(JobId, JobState)> {
    let mut finished = Vec::new();
    while finished.len() < count {
        if let SchedulerEvent::Finished { job_id, state, .. } = next_event(events).await {
            finished.push((job_id, state));
        }
    }
    finished
}

async fn submit_videos(
    handle: &SchedulerHandle,
    dir: &std::path::Path,
    count: usize,
) -> Vec<JobId> {
    let mut ids = Vec::new();
    for i in 0..count {
        let video = common::create_fake_video(dir, &format!("video_{}.mp4", i)).unwrap();
        ids.push(handle.submit(video).await.unwrap());
    }
    ids
}

#[tokio::test]
async fn test_scheduler_withManyJobs_shouldRespectCeilingAndOrder() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::Succeed {
        delay_ms: 20,
        degraded_batches: 0,
    }));
    let (handle, mut events) = Scheduler::spawn(launcher.clone(), 2);

    let ids = submit_videos(&handle, temp_dir.path(), 6).await;
    let finished = wait_for_finishes(&mut events, 6).await;

    assert!(finished.iter().all(|(_, state)| *state == JobState::Succeeded));
    // The ceiling is reached but never exceeded
    assert_eq!(launcher.max_active(), 2);
    // Admission is FIFO in submission order
    assert_eq!(launcher.launch_order(), ids);
}

#[tokio::test]
async fn test_scheduler_withInstantWorkerExit_shouldApplyResultBeforeSettling() {
    // A worker that finishes immediately delivers its result messages and its
    // exit in the same scheduler wakeup; the result must win, every time
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::Succeed {
        delay_ms: 0,
        degraded_batches: 1,
    }));
    let (handle, mut events) = Scheduler::spawn(launcher, 1);

    let ids = submit_videos(&handle, temp_dir.path(), 40).await;

    let mut seen = 0;
    while seen < ids.len() {
        if let SchedulerEvent::Finished {
            state,
            error,
            degraded_batches,
            ..
        } = next_event(&mut events).await
        {
            assert_eq!(state, JobState::Succeeded, "error: {:?}", error);
            assert_eq!(degraded_batches, 1);
            seen += 1;
        }
    }
}

#[tokio::test]
async fn test_snapshot_withFullCeiling_shouldShowRunningAndQueuedCounts() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::RunUntilCancelled));
    let (handle, mut events) = Scheduler::spawn(launcher.clone(), 2);

    let ids = submit_videos(&handle, temp_dir.path(), 6).await;

    // Workers never exit on their own, so the split is exact
    let records = handle.snapshot().await.unwrap();
    let running = records.iter().filter(|r| r.state == JobState::Running).count();
    let queued = records.iter().filter(|r| r.state == JobState::Queued).count();
    assert_eq!(records.len(), 6);
    assert_eq!(running, 2);
    assert_eq!(queued, 4);
    assert_eq!(launcher.max_active(), 2);

    handle.shutdown().await.unwrap();
    let finished = wait_for_finishes(&mut events, ids.len()).await;
    assert!(finished.iter().all(|(_, state)| *state == JobState::Cancelled));
}

#[tokio::test]
async fn test_submit_withNonVideoPath_shouldBeRejected() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::Succeed {
        delay_ms: 1,
        degraded_batches: 0,
    }));
    let (handle, _events) = Scheduler::spawn(launcher.clone(), 2);

    let not_video = common::create_test_file(temp_dir.path(), "notes.txt", "hello").unwrap();
    let err = handle.submit(not_video).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidInput(_)));

    let missing = temp_dir.path().join("missing.mp4");
    let err = handle.submit(missing).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidInput(_)));

    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn test_cancel_withQueuedJob_shouldFinishWithoutLaunching() {
    let temp_dir = common::create_temp_dir().unwrap();
    // Ceiling of 1: the first job occupies the only slot
    let launcher = Arc::new(
        ScriptedLauncher::new(WorkerScript::Succeed {
            delay_ms: 5,
            degraded_batches: 0,
        })
        .queue(WorkerScript::RunUntilCancelled),
    );
    let (handle, mut events) = Scheduler::spawn(launcher.clone(), 1);

    let ids = submit_videos(&handle, temp_dir.path(), 2).await;

    // Cancel the second job while it is still queued
    handle.cancel(ids[1]).await.unwrap();
    let (state, error, _) = wait_for_finish(&mut events, ids[1]).await;
    assert_eq!(state, JobState::Cancelled);
    assert!(error.is_none());

    // Only the first job ever got a worker
    handle.cancel(ids[0]).await.unwrap();
    let (state, _, _) = wait_for_finish(&mut events, ids[0]).await;
    assert_eq!(state, JobState::Cancelled);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_cancel_withRunningJob_shouldFreeSlotForQueuedJob() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(
        ScriptedLauncher::new(WorkerScript::Succeed {
            delay_ms: 5,
            degraded_batches: 0,
        })
        .queue(WorkerScript::RunUntilCancelled),
    );
    let (handle, mut events) = Scheduler::spawn(launcher.clone(), 1);

    let ids = submit_videos(&handle, temp_dir.path(), 2).await;

    handle.cancel(ids[0]).await.unwrap();
    let (state, _, _) = wait_for_finish(&mut events, ids[0]).await;
    assert_eq!(state, JobState::Cancelled);

    // The queued job takes over the freed slot and completes
    let (state, _, _) = wait_for_finish(&mut events, ids[1]).await;
    assert_eq!(state, JobState::Succeeded);
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn test_crash_shouldFailJobAndReclaimSlot() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(
        ScriptedLauncher::new(WorkerScript::Succeed {
            delay_ms: 5,
            degraded_batches: 0,
        })
        .queue(WorkerScript::Crash { delay_ms: 5 }),
    );
    let (handle, mut events) = Scheduler::spawn(launcher.clone(), 1);

    let ids = submit_videos(&handle, temp_dir.path(), 2).await;

    let (state, error, _) = wait_for_finish(&mut events, ids[0]).await;
    assert_eq!(state, JobState::Failed);
    assert!(matches!(error, Some(JobError::WorkerCrashed(_))));

    // The crash did not poison the scheduler
    let (state, _, _) = wait_for_finish(&mut events, ids[1]).await;
    assert_eq!(state, JobState::Succeeded);
}

#[tokio::test]
async fn test_worker_error_shouldSurfaceOnFailedJob() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::Fail {
        delay_ms: 5,
        error: JobError::TranscriptionFailed("whisper exploded".to_string()),
    }));
    let (handle, mut events) = Scheduler::spawn(launcher, 1);

    let ids = submit_videos(&handle, temp_dir.path(), 1).await;

    let (state, error, _) = wait_for_finish(&mut events, ids[0]).await;
    assert_eq!(state, JobState::Failed);
    match error {
        Some(JobError::TranscriptionFailed(message)) => {
            assert_eq!(message, "whisper exploded");
        }
        other => panic!("expected TranscriptionFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_degraded_batches_shouldTravelFromWorkerToFinishEvent() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::Succeed {
        delay_ms: 5,
        degraded_batches: 3,
    }));
    let (handle, mut events) = Scheduler::spawn(launcher, 1);

    let ids = submit_videos(&handle, temp_dir.path(), 1).await;

    let (state, _, degraded_batches) = wait_for_finish(&mut events, ids[0]).await;
    assert_eq!(state, JobState::Succeeded);
    assert_eq!(degraded_batches, 3);
}

#[tokio::test]
async fn test_progress_events_shouldBeMonotonePerJob() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::Succeed {
        delay_ms: 10,
        degraded_batches: 0,
    }));
    let (handle, mut events) = Scheduler::spawn(launcher, 1);

    let ids = submit_videos(&handle, temp_dir.path(), 1).await;

    let mut last_percent = 0u8;
    loop {
        match next_event(&mut events).await {
            SchedulerEvent::Progress {
                job_id, percent, ..
            } if job_id == ids[0] => {
                assert!(percent >= last_percent);
                last_percent = percent;
            }
            SchedulerEvent::Finished { job_id, state, .. } if job_id == ids[0] => {
                assert_eq!(state, JobState::Succeeded);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(last_percent, 100);
}

#[tokio::test]
async fn test_clear_history_shouldDropOnlyTerminalJobs() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(
        ScriptedLauncher::new(WorkerScript::RunUntilCancelled).queue(WorkerScript::Succeed {
            delay_ms: 5,
            degraded_batches: 0,
        }),
    );
    let (handle, mut events) = Scheduler::spawn(launcher, 2);

    let ids = submit_videos(&handle, temp_dir.path(), 2).await;
    let (state, _, _) = wait_for_finish(&mut events, ids[0]).await;
    assert_eq!(state, JobState::Succeeded);

    handle.clear_history().await.unwrap();
    let records = handle.snapshot().await.unwrap();

    // The running job survives, the finished one is gone
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, ids[1]);
    assert_eq!(records[0].state, JobState::Running);

    handle.cancel(ids[1]).await.unwrap();
    let (state, _, _) = wait_for_finish(&mut events, ids[1]).await;
    assert_eq!(state, JobState::Cancelled);
}

#[tokio::test]
async fn test_shutdown_shouldCancelRunningJobs() {
    let temp_dir = common::create_temp_dir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(WorkerScript::RunUntilCancelled));
    let (handle, mut events) = Scheduler::spawn(launcher, 2);

    let ids = submit_videos(&handle, temp_dir.path(), 2).await;
    handle.shutdown().await.unwrap();

    let finished = wait_for_finishes(&mut events, 2).await;
    for id in ids {
        let state = finished
            .iter()
            .find(|(job_id, _)| *job_id == id)
            .map(|(_, state)| *state);
        assert_eq!(state, Some(JobState::Cancelled));
    }
}
