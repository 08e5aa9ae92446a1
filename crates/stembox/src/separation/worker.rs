//! Subprocess client for the external separation worker.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::WorkerRuntime;
use crate::error::SeparationError;
use crate::separation::job::SeparationQuality;
use crate::separation::protocol::{decode_line, WorkerMessage};

/// Kept stderr suffix surfaced on failure.
const STDERR_TAIL_LIMIT: usize = 500;

/// Progress callback invoked with fractional progress in 0..=1.
pub type ProgressFn = Box<dyn Fn(f32) + Send + Sync>;

/// One separation run: input audio, output directory and quality tier.
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub quality: SeparationQuality,
}

/// Paths of the produced stems.
#[derive(Debug, Clone, PartialEq)]
pub struct StemPaths {
    pub instrumental: PathBuf,
    pub vocal: PathBuf,
}

/// Seam between the job manager and the separation backend, so the manager
/// can be driven by a scripted separator in tests.
#[async_trait]
pub trait StemSeparator: Send + Sync {
    async fn separate(
        &self,
        request: &SeparationRequest,
        progress: ProgressFn,
    ) -> Result<StemPaths, SeparationError>;
}

/// Production separator: spawns one worker process per run and decodes its
/// stdout protocol. No retry logic; retries are the caller's policy.
pub struct SeparationWorker {
    runtime: WorkerRuntime,
}

impl SeparationWorker {
    pub fn new(runtime: WorkerRuntime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl StemSeparator for SeparationWorker {
    async fn separate(
        &self,
        request: &SeparationRequest,
        progress: ProgressFn,
    ) -> Result<StemPaths, SeparationError> {
        tokio::fs::create_dir_all(&self.runtime.cache_dir)
            .await
            .ok();

        log::info!(
            "Starting separation worker for '{}' (quality: {})",
            request.input.display(),
            request.quality
        );

        let mut cmd = Command::new(&self.runtime.python);
        cmd.arg(&self.runtime.script)
            .arg("--input")
            .arg(&request.input)
            .arg("--output-dir")
            .arg(&request.output_dir)
            .arg("--quality")
            .arg(request.quality.as_str())
            .arg("--cache-dir")
            .arg(&self.runtime.cache_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SeparationError::Spawn {
            program: self.runtime.python.clone(),
            source: e,
        })?;

        let stderr_pipe = child.stderr.take();
        let stderr_handle = tokio::spawn(async move {
            let mut tail = String::new();
            if let Some(stderr) = stderr_pipe {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("separation worker stderr: {}", line);
                    push_tail(&mut tail, &line);
                }
            }
            tail
        });

        let mut success: Option<StemPaths> = None;
        let mut worker_error: Option<String> = None;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match decode_line(&line) {
                    Some(WorkerMessage::Progress { value }) => progress(value),
                    Some(WorkerMessage::Success {
                        instrumental,
                        vocal,
                    }) => {
                        success = Some(StemPaths {
                            instrumental,
                            vocal,
                        });
                    }
                    Some(WorkerMessage::Error { message, details }) => {
                        worker_error = Some(match details {
                            Some(details) => format!("{} ({})", message, details),
                            None => message,
                        });
                        // Terminal per protocol; stop reading and reap the
                        // process even if it has not exited yet.
                        break;
                    }
                    None => {}
                }
            }
        }

        if worker_error.is_some() {
            if let Err(e) = child.start_kill() {
                log::warn!("Failed to kill separation worker: {}", e);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| SeparationError::Worker(format!("wait failed: {}", e)))?;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if let Some(message) = worker_error {
            return Err(SeparationError::Worker(failure_message(
                Some(&message),
                status.code(),
                &stderr_tail,
            )));
        }

        match (status.success(), success) {
            (true, Some(stems)) => {
                log::info!(
                    "Separation finished: instrumental '{}', vocal '{}'",
                    stems.instrumental.display(),
                    stems.vocal.display()
                );
                Ok(stems)
            }
            (true, None) => Err(SeparationError::Worker(failure_message(
                Some("worker exited without reporting output stems"),
                status.code(),
                &stderr_tail,
            ))),
            (false, _) => Err(SeparationError::Worker(failure_message(
                None,
                status.code(),
                &stderr_tail,
            ))),
        }
    }
}

fn failure_message(message: Option<&str>, exit_code: Option<i32>, stderr_tail: &str) -> String {
    let mut out = match message {
        Some(message) => message.to_string(),
        None => String::from("worker failed"),
    };
    match exit_code {
        Some(code) => out.push_str(&format!(" (exit code {})", code)),
        None => out.push_str(" (terminated by signal)"),
    }
    if !stderr_tail.trim().is_empty() {
        out.push_str(&format!("; stderr: {}", stderr_tail.trim()));
    }
    out
}

/// Appends a line to the tail buffer, keeping only the trailing
/// `STDERR_TAIL_LIMIT` bytes (trimmed on a char boundary).
fn push_tail(tail: &mut String, line: &str) {
    if !tail.is_empty() {
        tail.push('\n');
    }
    tail.push_str(line);
    if tail.len() > STDERR_TAIL_LIMIT {
        let excess = tail.len() - STDERR_TAIL_LIMIT;
        let cut = tail
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= excess)
            .unwrap_or(0);
        tail.drain(..cut);
    }
}
