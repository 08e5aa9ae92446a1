//! End-to-end separation scenarios driven by a scripted separator.

mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use common::{wait_until, FakeOutcome, FakeSeparator, SnapshotLog, TestHarness};
use stembox::{AudioStatus, JobStatus, SeparationError, SeparationQuality, SongKind, StemSeparator};

#[tokio::test]
async fn test_full_separation_flow() {
    let harness = TestHarness::new();
    let song = harness.import_song("Scenario A", SongKind::Source).await;

    let gate = Arc::new(Notify::new());
    let separator = Arc::new(FakeSeparator {
        progress_steps: vec![0.5],
        outcome: FakeOutcome::Succeed,
        gate: Some(Arc::clone(&gate)),
        calls: AtomicUsize::new(0),
    });
    let manager = harness.manager_with(separator);

    let log = SnapshotLog::new();
    manager.subscribe(log.callback());

    let job = manager.queue(&song.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.quality, SeparationQuality::Normal);

    // The worker reported 50% and is now blocked on the gate.
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.status == JobStatus::Running && j.progress == Some(0.5))
    })
    .await;

    let record = harness.library.get(&song.id).await.unwrap();
    assert_eq!(record.audio_status, AudioStatus::Separating);
    assert!(record.last_separation_error.is_none());

    gate.notify_one();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;

    let finished = &manager.jobs()[0];
    assert_eq!(finished.status, JobStatus::Succeeded);
    assert!(finished.error_message.is_none());

    let record = harness.library.get(&song.id).await.unwrap();
    assert_eq!(record.audio_status, AudioStatus::Separated);
    assert_eq!(record.separation_quality, Some(SeparationQuality::Normal));
    let instrumental = record.instrumental_path.expect("instrumental path");
    let vocal = record.vocal_path.expect("vocal path");
    assert!(instrumental.exists());
    assert!(vocal.exists());

    // Subscribers saw the 50% progress snapshot.
    assert!(log
        .snapshots()
        .iter()
        .any(|jobs| jobs.iter().any(|j| j.progress == Some(0.5))));
}

#[tokio::test]
async fn test_queue_rejects_accompaniment() {
    let harness = TestHarness::new();
    let song = harness.import_song("Backing Track", SongKind::Accompaniment).await;
    let manager = harness.manager_with(FakeSeparator::succeeding());

    let result = manager.queue(&song.id).await;
    assert!(matches!(
        result,
        Err(SeparationError::NotSeparable { .. })
    ));
    assert!(manager.jobs().is_empty());

    // The record was not touched.
    let record = harness.library.get(&song.id).await.unwrap();
    assert_eq!(record.audio_status, AudioStatus::OriginalOnly);
    assert_eq!(record.updated_at, song.updated_at);
}

#[tokio::test]
async fn test_queue_rejects_missing_song() {
    let harness = TestHarness::new();
    let manager = harness.manager_with(FakeSeparator::succeeding());

    let result = manager.queue("no-such-song").await;
    assert!(matches!(result, Err(SeparationError::SongNotFound(_))));
    assert!(manager.jobs().is_empty());
}

#[tokio::test]
async fn test_enqueue_is_idempotent_per_song() {
    let harness = TestHarness::new();
    let blocker = harness.import_song("Blocker", SongKind::Source).await;
    let waiting = harness.import_song("Waiting", SongKind::Source).await;

    let gate = Arc::new(Notify::new());
    let manager = harness.manager_with(FakeSeparator::gated(Arc::clone(&gate)));

    let first = manager.queue(&blocker.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.status == JobStatus::Running)
    })
    .await;

    // Re-queue while running: same job comes back.
    let again = manager.queue(&blocker.id).await.unwrap();
    assert_eq!(again.id, first.id);

    // Re-queue while queued behind the running job: same story.
    let queued = manager.queue(&waiting.id).await.unwrap();
    assert_eq!(queued.status, JobStatus::Queued);
    let queued_again = manager.queue(&waiting.id).await.unwrap();
    assert_eq!(queued_again.id, queued.id);

    assert_eq!(manager.jobs().len(), 2);

    gate.notify_one();
    gate.notify_one();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueues_share_one_job() {
    let harness = TestHarness::new();
    let song = harness.import_song("Raced", SongKind::Source).await;

    let gate = Arc::new(Notify::new());
    let manager = harness.manager_with(FakeSeparator::gated(Arc::clone(&gate)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        let id = song.id.clone();
        handles.push(tokio::spawn(async move { manager.queue(&id).await }));
    }

    let mut job_ids = std::collections::HashSet::new();
    for handle in handles {
        let job = handle.await.unwrap().unwrap();
        job_ids.insert(job.id);
    }

    // Every racing enqueue got the same job; nothing else was created.
    assert_eq!(job_ids.len(), 1);
    assert_eq!(manager.jobs().len(), 1);

    gate.notify_one();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;
    assert_eq!(manager.jobs().len(), 1);
}

#[tokio::test]
async fn test_worker_failure_does_not_stick_queue() {
    let harness = TestHarness::new();
    let first = harness.import_song("Fails First", SongKind::Source).await;
    let second = harness.import_song("Fails Second", SongKind::Source).await;

    let separator = FakeSeparator::failing("model blew up");
    let manager = harness.manager_with(Arc::clone(&separator) as Arc<dyn StemSeparator>);

    manager.queue(&first.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;

    let record = harness.library.get(&first.id).await.unwrap();
    assert_eq!(record.audio_status, AudioStatus::SeparationFailed);
    let error = record.last_separation_error.expect("retained error");
    assert!(error.contains("model blew up"));

    let job = &manager.jobs()[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some(error.as_str()));

    // A job for a different song still runs afterwards.
    manager.queue(&second.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;
    assert_eq!(separator.call_count(), 2);
}

#[tokio::test]
async fn test_retry_after_failure_creates_new_job() {
    let harness = TestHarness::new();
    let song = harness.import_song("Retry Me", SongKind::Source).await;
    let manager = harness.manager_with(FakeSeparator::failing("transient"));

    let first = manager.queue(&song.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;

    let second = manager.queue(&song.id).await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(manager.jobs().len(), 2);

    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;
}

#[tokio::test]
async fn test_song_deleted_while_queued_fails_gracefully() {
    let harness = TestHarness::new();
    let running = harness.import_song("Running", SongKind::Source).await;
    let doomed = harness.import_song("Doomed", SongKind::Source).await;

    let gate = Arc::new(Notify::new());
    let manager = harness.manager_with(FakeSeparator::gated(Arc::clone(&gate)));

    manager.queue(&running.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.status == JobStatus::Running)
    })
    .await;

    let doomed_job = manager.queue(&doomed.id).await.unwrap();
    harness.library.delete(&doomed.id).await.unwrap();

    gate.notify_one();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;

    let jobs = manager.jobs();
    let failed = jobs.iter().find(|j| j.id == doomed_job.id).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error_message.as_deref().unwrap().contains("not found"));

    // The manager survives: a later job still runs to completion.
    let next = harness.import_song("Afterwards", SongKind::Source).await;
    manager.queue(&next.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    let next_id = next.id.clone();
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.song_id == next_id && j.status == JobStatus::Running)
    })
    .await;
    gate.notify_one();
    let manager_ref = Arc::clone(&manager);
    let next_id = next.id.clone();
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.song_id == next_id && j.status == JobStatus::Succeeded)
    })
    .await;
}

#[tokio::test]
async fn test_single_running_job_and_fifo_order() {
    let harness = TestHarness::new();
    let first = harness.import_song("Slot Holder", SongKind::Source).await;
    let second = harness.import_song("Second In", SongKind::Source).await;
    let third = harness.import_song("Third In", SongKind::Source).await;

    let gate = Arc::new(Notify::new());
    let manager = harness.manager_with(FakeSeparator::gated(Arc::clone(&gate)));
    let log = SnapshotLog::new();
    manager.subscribe(log.callback());

    manager.queue(&first.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.status == JobStatus::Running)
    })
    .await;

    manager.queue(&second.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    manager.queue(&third.id).await.unwrap();

    // Queued songs stay pending while the slot is held.
    let pending = harness.library.get(&second.id).await.unwrap();
    assert_eq!(pending.audio_status, AudioStatus::SeparationPending);

    for _ in 0..3 {
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;

    let snapshots = log.snapshots();
    // Never more than one running job in any observed snapshot.
    for jobs in &snapshots {
        let running = jobs.iter().filter(|j| j.status == JobStatus::Running).count();
        assert!(running <= 1, "observed {} running jobs", running);
    }

    // FIFO: the second song ran before the third.
    let first_running_index = |song_id: &str| {
        snapshots.iter().position(|jobs| {
            jobs.iter()
                .any(|j| j.song_id == song_id && j.status == JobStatus::Running)
        })
    };
    let second_index = first_running_index(&second.id).expect("second ran");
    let third_index = first_running_index(&third.id).expect("third ran");
    assert!(second_index < third_index);
}

#[tokio::test]
async fn test_snapshots_ordered_newest_first() {
    let harness = TestHarness::new();
    let manager = harness.manager_with(FakeSeparator::succeeding());
    let log = SnapshotLog::new();
    manager.subscribe(log.callback());

    for i in 0..3 {
        let song = harness
            .import_song(&format!("Ordered {}", i), SongKind::Source)
            .await;
        manager.queue(&song.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        let jobs = manager_ref.jobs();
        jobs.len() == 3 && jobs.iter().all(|j| j.is_finished())
    })
    .await;

    let assert_descending = |jobs: &[stembox::SeparationJob]| {
        for pair in jobs.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    };

    assert_descending(&manager.jobs());
    for jobs in log.snapshots() {
        assert_descending(&jobs);
    }
}

#[tokio::test]
async fn test_unsubscribe_stops_snapshots() {
    let harness = TestHarness::new();
    let song = harness.import_song("Quiet", SongKind::Source).await;
    let manager = harness.manager_with(FakeSeparator::succeeding());

    let log = SnapshotLog::new();
    let subscription = manager.subscribe(log.callback());
    assert_eq!(log.len(), 1); // immediate snapshot

    assert!(manager.unsubscribe(subscription));
    manager.queue(&song.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;

    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn test_job_timeout_force_fails() {
    let harness = TestHarness::new();
    let stuck = harness.import_song("Stuck", SongKind::Source).await;
    let healthy = harness.import_song("Healthy", SongKind::Source).await;

    let gate = Arc::new(Notify::new());
    let manager = harness.manager_with(FakeSeparator::gated(Arc::clone(&gate)));

    harness.settings.set_job_timeout(Some(Duration::from_millis(50)));
    manager.queue(&stuck.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    wait_until(2000, move || {
        manager_ref.jobs().iter().all(|j| j.is_finished())
    })
    .await;

    let job = &manager.jobs()[0];
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.as_deref().unwrap();
    assert!(message.contains("timed out"), "{}", message);
    // Sub-second limits report their actual value, not a rounded 0s.
    assert!(message.contains("50ms"), "{}", message);
    let record = harness.library.get(&stuck.id).await.unwrap();
    assert_eq!(record.audio_status, AudioStatus::SeparationFailed);

    // The slot is free again for the next job.
    harness.settings.set_job_timeout(None);
    manager.queue(&healthy.id).await.unwrap();
    let manager_ref = Arc::clone(&manager);
    let healthy_id = healthy.id.clone();
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.song_id == healthy_id && j.status == JobStatus::Running)
    })
    .await;
    gate.notify_one();
    let manager_ref = Arc::clone(&manager);
    let healthy_id = healthy.id.clone();
    wait_until(2000, move || {
        manager_ref
            .jobs()
            .iter()
            .any(|j| j.song_id == healthy_id && j.status == JobStatus::Succeeded)
    })
    .await;
}
