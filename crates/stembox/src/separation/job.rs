//! In-memory separation job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quality tier passed to the separation worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparationQuality {
    Fast,
    Normal,
    High,
}

impl SeparationQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeparationQuality::Fast => "fast",
            SeparationQuality::Normal => "normal",
            SeparationQuality::High => "high",
        }
    }
}

impl std::fmt::Display for SeparationQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SeparationQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(SeparationQuality::Fast),
            "normal" => Ok(SeparationQuality::Normal),
            "high" => Ok(SeparationQuality::High),
            other => Err(format!(
                "Unknown separation quality '{}' (expected 'fast', 'normal' or 'high')",
                other
            )),
        }
    }
}

/// Lifecycle state of a job: `queued → running → succeeded | failed`.
/// Terminal states never transition out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// One enqueued separation run. Ephemeral; snapshots are pushed to
/// subscribers serialized in camelCase for the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationJob {
    pub id: String,
    pub song_id: String,
    pub quality: SeparationQuality,
    pub status: JobStatus,
    /// Last reported fractional progress (0..=1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    /// Set only on `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SeparationJob {
    pub fn new(song_id: &str, quality: SeparationQuality) -> Self {
        let now = Utc::now();
        Self {
            id: generate_job_id(),
            song_id: song_id.to_string(),
            quality,
            status: JobStatus::Queued,
            progress: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A job still waiting for or occupying the single execution slot.
    pub fn is_active(&self) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Millisecond timestamp plus a random suffix, so two enqueues within the
/// same millisecond still get distinct ids.
fn generate_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..6])
}
