//! Separation job queue: single-slot execution, song status transitions and
//! snapshot fan-out.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::Instrument;

use crate::config::Settings;
use crate::error::{LibraryError, SeparationError};
use crate::library::{AudioStatus, SongLibrary};
use crate::separation::job::{JobStatus, SeparationJob, SeparationQuality};
use crate::separation::updates::{JobSnapshotFn, JobUpdates, SubscriptionId};
use crate::separation::worker::{ProgressFn, SeparationRequest, StemSeparator};

/// Terminal jobs retained in memory; queued and running jobs are never pruned.
const MAX_FINISHED_JOBS: usize = 100;

struct ManagerState {
    /// Newest first: jobs are prepended on enqueue.
    jobs: Vec<SeparationJob>,
    /// Id of the single job currently occupying the execution slot.
    running: Option<String>,
}

/// Orchestrates separation jobs over a [`SongLibrary`].
///
/// At most one job runs at a time; queued jobs drain FIFO by creation time.
/// Every job-list mutation pushes a fresh snapshot to subscribers.
pub struct SeparationManager {
    library: Arc<SongLibrary>,
    settings: Arc<Settings>,
    separator: Arc<dyn StemSeparator>,
    state: Mutex<ManagerState>,
    updates: JobUpdates,
}

impl SeparationManager {
    pub fn new(
        library: Arc<SongLibrary>,
        settings: Arc<Settings>,
        separator: Arc<dyn StemSeparator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            library,
            settings,
            separator,
            state: Mutex::new(ManagerState {
                jobs: Vec::new(),
                running: None,
            }),
            updates: JobUpdates::new(),
        })
    }

    /// Queues a separation job using the process-wide quality preference.
    pub async fn queue(self: &Arc<Self>, song_id: &str) -> Result<SeparationJob, SeparationError> {
        self.queue_with_quality(song_id, None).await
    }

    /// Queues a separation job, optionally overriding the quality tier.
    ///
    /// Idempotent per song: an already queued or running job for the same
    /// song is returned unchanged. Not-found and kind violations propagate
    /// synchronously without creating a job or touching the record.
    pub async fn queue_with_quality(
        self: &Arc<Self>,
        song_id: &str,
        quality: Option<SeparationQuality>,
    ) -> Result<SeparationJob, SeparationError> {
        let song = self
            .library
            .get(song_id)
            .await
            .ok_or_else(|| SeparationError::SongNotFound(song_id.to_string()))?;

        if !song.is_separable() {
            return Err(SeparationError::NotSeparable {
                id: song_id.to_string(),
                kind: song.kind,
            });
        }

        {
            let state = self.state();
            if let Some(existing) = state
                .jobs
                .iter()
                .find(|job| job.song_id == song_id && job.is_active())
            {
                log::info!(
                    "Separation already queued/running for song {} (job {})",
                    song_id,
                    existing.id
                );
                return Ok(existing.clone());
            }
        }

        self.library
            .update(song_id, |song| {
                song.audio_status = AudioStatus::SeparationPending;
                song.last_separation_error = None;
            })
            .await
            .map_err(map_library_error)?;

        let quality = quality.unwrap_or_else(|| self.settings.separation_quality());
        let job = SeparationJob::new(song_id, quality);
        {
            // Re-check under the lock: a racing enqueue may have inserted a
            // job for this song while the record update was in flight.
            let mut state = self.state();
            if let Some(existing) = state
                .jobs
                .iter()
                .find(|job| job.song_id == song_id && job.is_active())
            {
                log::info!(
                    "Separation already queued/running for song {} (job {})",
                    song_id,
                    existing.id
                );
                return Ok(existing.clone());
            }
            state.jobs.insert(0, job.clone());
        }
        log::info!(
            "Queued separation job {} for song {} (quality: {})",
            job.id,
            song_id,
            quality
        );
        self.notify();
        self.spawn_drain();
        Ok(job)
    }

    /// Snapshot of all known jobs, newest created first.
    pub fn jobs(&self) -> Vec<SeparationJob> {
        let state = self.state();
        let mut jobs = state.jobs.clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Registers an observer; it immediately receives the current snapshot
    /// and a fresh one after every job-list mutation.
    pub fn subscribe(&self, callback: JobSnapshotFn) -> SubscriptionId {
        self.updates.subscribe(callback, &self.jobs())
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.updates.unsubscribe(id)
    }

    fn spawn_drain(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.process_queue().await;
        });
    }

    /// Drains the queue: claims the oldest queued job, executes it, then
    /// loops. Returns immediately when a job already holds the slot.
    async fn process_queue(self: Arc<Self>) {
        loop {
            let job = {
                let mut state = self.state();
                if state.running.is_some() {
                    return;
                }
                let next = state
                    .jobs
                    .iter()
                    .filter(|job| job.status == JobStatus::Queued)
                    .min_by(|a, b| {
                        a.created_at
                            .cmp(&b.created_at)
                            .then_with(|| a.id.cmp(&b.id))
                    })
                    .cloned();
                match next {
                    Some(job) => {
                        state.running = Some(job.id.clone());
                        job
                    }
                    None => return,
                }
            };

            self.execute(job).await;

            {
                let mut state = self.state();
                state.running = None;
                prune_finished(&mut state);
            }
            self.notify();
        }
    }

    /// Runs one job to a terminal state. Failures never escape: they become
    /// a `failed` job plus a `separation_failed` record.
    async fn execute(self: &Arc<Self>, job: SeparationJob) {
        let span = tracing::info_span!("separation_job", job = %job.id, song = %job.song_id);
        match self.run(&job).instrument(span).await {
            Ok(()) => {
                log::info!("Separation job {} succeeded for song {}", job.id, job.song_id);
            }
            Err(err) => {
                let message = err.to_string();
                log::error!(
                    "Separation job {} failed for song {}: {}",
                    job.id,
                    job.song_id,
                    message
                );
                // Best effort; the song may have been deleted mid-job.
                if let Err(e) = self
                    .library
                    .update(&job.song_id, |song| {
                        song.audio_status = AudioStatus::SeparationFailed;
                        song.last_separation_error = Some(message.clone());
                    })
                    .await
                {
                    log::warn!(
                        "Could not record separation failure for song {}: {}",
                        job.song_id,
                        e
                    );
                }
                self.update_job(&job.id, |job| {
                    job.status = JobStatus::Failed;
                    job.error_message = Some(message);
                });
            }
        }
    }

    async fn run(self: &Arc<Self>, job: &SeparationJob) -> Result<(), SeparationError> {
        let song = self
            .library
            .get(&job.song_id)
            .await
            .ok_or_else(|| SeparationError::SongNotFound(job.song_id.clone()))?;

        self.library
            .update(&job.song_id, |song| {
                song.audio_status = AudioStatus::Separating;
                song.last_separation_error = None;
            })
            .await
            .map_err(map_library_error)?;
        self.update_job(&job.id, |job| {
            job.status = JobStatus::Running;
            job.error_message = None;
        });
        self.notify();

        let song_dir = self.library.song_dir(&job.song_id);
        tokio::fs::create_dir_all(&song_dir)
            .await
            .map_err(|e| LibraryError::CreateDirectory {
                path: song_dir.clone(),
                source: e,
            })
            .map_err(SeparationError::Library)?;

        let original = song_dir.join(song.original_filename());
        if !tokio::fs::try_exists(&original).await.unwrap_or(false) {
            return Err(SeparationError::OriginalMissing(original));
        }

        let request = SeparationRequest {
            input: original,
            output_dir: song_dir,
            quality: job.quality,
        };

        let manager = Arc::clone(self);
        let job_id = job.id.clone();
        let progress: ProgressFn = Box::new(move |value: f32| {
            let clamped = value.clamp(0.0, 1.0);
            manager.update_job(&job_id, |job| {
                if job.status == JobStatus::Running {
                    job.progress = Some(clamped);
                }
            });
            manager.notify();
        });

        let separate = self.separator.separate(&request, progress);
        let stems = match self.settings.job_timeout() {
            Some(limit) => match tokio::time::timeout(limit, separate).await {
                Ok(result) => result?,
                Err(_) => return Err(SeparationError::Timeout(limit)),
            },
            None => separate.await?,
        };

        self.library
            .update(&job.song_id, |song| {
                song.audio_status = AudioStatus::Separated;
                song.instrumental_path = Some(stems.instrumental.clone());
                song.vocal_path = Some(stems.vocal.clone());
                song.separation_quality = Some(job.quality);
                song.last_separation_error = None;
            })
            .await
            .map_err(map_library_error)?;
        self.update_job(&job.id, |job| {
            job.status = JobStatus::Succeeded;
            job.error_message = None;
        });
        Ok(())
    }

    fn update_job<F>(&self, job_id: &str, mutate: F)
    where
        F: FnOnce(&mut SeparationJob),
    {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|job| job.id == job_id) {
            mutate(job);
            job.updated_at = Utc::now();
        }
    }

    fn notify(&self) {
        self.updates.notify(&self.jobs());
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Separation manager state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn map_library_error(error: LibraryError) -> SeparationError {
    match error {
        LibraryError::SongNotFound(id) => SeparationError::SongNotFound(id),
        other => SeparationError::Library(other),
    }
}

/// Drops the oldest terminal jobs beyond the retention cap. Jobs are kept
/// newest-first, so pruning scans from the back.
fn prune_finished(state: &mut ManagerState) {
    let finished = state.jobs.iter().filter(|job| job.is_finished()).count();
    if finished <= MAX_FINISHED_JOBS {
        return;
    }

    let mut to_drop = finished - MAX_FINISHED_JOBS;
    let mut index = state.jobs.len();
    while index > 0 && to_drop > 0 {
        index -= 1;
        if state.jobs[index].is_finished() {
            state.jobs.remove(index);
            to_drop -= 1;
        }
    }
}
