//! Shared test utilities: tempdir-backed library fixture, a scripted fake
//! separator and snapshot-collecting subscribers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use stembox::separation::{JobSnapshotFn, ProgressFn, SeparationJob, SeparationRequest, StemPaths};
use stembox::{
    NewSong, SeparationError, SeparationManager, Settings, SongKind, SongLibrary, SongRecord,
    StemSeparator,
};

/// Isolated library rooted in a temp directory.
pub struct TestHarness {
    pub temp: TempDir,
    pub library: Arc<SongLibrary>,
    pub settings: Arc<Settings>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("create temp dir");
        let library = Arc::new(SongLibrary::new(temp.path()));
        Self {
            temp,
            library,
            settings: Arc::new(Settings::new()),
        }
    }

    /// Imports a song backed by a small fake audio file.
    pub async fn import_song(&self, title: &str, kind: SongKind) -> SongRecord {
        let source = self.temp.path().join(format!("{}.wav", title));
        tokio::fs::write(&source, b"RIFF fake audio")
            .await
            .expect("write source audio");
        self.library
            .import(NewSong {
                source_path: source,
                title: title.to_string(),
                artist: None,
                kind,
                lyrics_text: None,
            })
            .await
            .expect("import song")
    }

    pub fn manager_with(&self, separator: Arc<dyn StemSeparator>) -> Arc<SeparationManager> {
        SeparationManager::new(
            Arc::clone(&self.library),
            Arc::clone(&self.settings),
            separator,
        )
    }
}

pub enum FakeOutcome {
    Succeed,
    Fail(String),
}

/// Scripted [`StemSeparator`]: emits fixed progress steps, optionally waits
/// on a gate, then succeeds (writing stem files) or fails.
pub struct FakeSeparator {
    pub progress_steps: Vec<f32>,
    pub outcome: FakeOutcome,
    pub gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

impl FakeSeparator {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            progress_steps: Vec::new(),
            outcome: FakeOutcome::Succeed,
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_progress(steps: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            progress_steps: steps,
            outcome: FakeOutcome::Succeed,
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            progress_steps: Vec::new(),
            outcome: FakeOutcome::Fail(message.to_string()),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Holds each run until the gate is notified once.
    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            progress_steps: Vec::new(),
            outcome: FakeOutcome::Succeed,
            gate: Some(gate),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StemSeparator for FakeSeparator {
    async fn separate(
        &self,
        request: &SeparationRequest,
        progress: ProgressFn,
    ) -> Result<StemPaths, SeparationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        for step in &self.progress_steps {
            progress(*step);
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.outcome {
            FakeOutcome::Succeed => {
                let instrumental = request.output_dir.join("Instrumental.wav");
                let vocal = request.output_dir.join("Vocals.wav");
                tokio::fs::write(&instrumental, b"instrumental stem")
                    .await
                    .expect("write instrumental");
                tokio::fs::write(&vocal, b"vocal stem")
                    .await
                    .expect("write vocal");
                Ok(StemPaths {
                    instrumental,
                    vocal,
                })
            }
            FakeOutcome::Fail(message) => Err(SeparationError::Worker(message.clone())),
        }
    }
}

/// Subscriber that records every snapshot it receives.
#[derive(Clone, Default)]
pub struct SnapshotLog(Arc<Mutex<Vec<Vec<SeparationJob>>>>);

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> JobSnapshotFn {
        let log = Arc::clone(&self.0);
        Box::new(move |jobs| {
            log.lock().expect("snapshot log lock").push(jobs.to_vec());
        })
    }

    pub fn snapshots(&self) -> Vec<Vec<SeparationJob>> {
        self.0.lock().expect("snapshot log lock").clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().expect("snapshot log lock").len()
    }
}

/// Polls `predicate` until it returns true or the deadline passes.
pub async fn wait_until<F>(deadline_ms: u64, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within {}ms", deadline_ms);
}
