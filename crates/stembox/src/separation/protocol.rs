//! Line-delimited JSON protocol spoken by the separation worker on stdout.
//!
//! The worker emits one JSON object per line. Anything that does not decode
//! into a recognized message (log noise, `status: "starting"`, malformed
//! progress) is ignored by the client.

use std::path::PathBuf;

/// A decoded worker message.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Fractional progress in 0..=1.
    Progress { value: f32 },
    /// Terminal success with both output stems.
    Success {
        instrumental: PathBuf,
        vocal: PathBuf,
    },
    /// Terminal failure; fails the run as soon as it is received.
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Decodes one stdout line into a [`WorkerMessage`], or `None` for anything
/// unrecognized. An `error` key wins over any `status` field.
pub fn decode_line(line: &str) -> Option<WorkerMessage> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    let object = value.as_object()?;

    if let Some(message) = object.get("error").and_then(|v| v.as_str()) {
        return Some(WorkerMessage::Error {
            message: message.to_string(),
            details: object
                .get("details")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        });
    }

    match object.get("status").and_then(|v| v.as_str())? {
        "progress" => {
            let value = object.get("progress")?.as_f64()? as f32;
            if (0.0..=1.0).contains(&value) {
                Some(WorkerMessage::Progress { value })
            } else {
                None
            }
        }
        "success" => {
            let instrumental = object.get("instrumental")?.as_str()?;
            let vocal = object.get("vocal")?.as_str()?;
            Some(WorkerMessage::Success {
                instrumental: PathBuf::from(instrumental),
                vocal: PathBuf::from(vocal),
            })
        }
        _ => None,
    }
}
