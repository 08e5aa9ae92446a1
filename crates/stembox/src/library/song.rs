//! Song metadata record and its status enums.
//!
//! Records are persisted as `meta.json` inside each song directory. Status
//! values from earlier on-disk formats are normalized on read instead of
//! rejected, so old libraries keep loading.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::separation::SeparationQuality;

/// Extension used for the stored original when the source has none.
pub const DEFAULT_AUDIO_EXT: &str = ".mp3";

/// Category of an imported song. Only `Source` songs may be separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongKind {
    /// Full mix with vocals (legacy libraries store this as "原曲").
    #[serde(alias = "原曲")]
    Source,
    /// Pre-made accompaniment track (legacy "伴奏"); never separated.
    #[serde(alias = "伴奏")]
    Accompaniment,
}

impl fmt::Display for SongKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SongKind::Source => write!(f, "source"),
            SongKind::Accompaniment => write!(f, "accompaniment"),
        }
    }
}

impl FromStr for SongKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(SongKind::Source),
            "accompaniment" => Ok(SongKind::Accompaniment),
            other => Err(format!(
                "Unknown song kind '{}' (expected 'source' or 'accompaniment')",
                other
            )),
        }
    }
}

/// Audio lifecycle of a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioStatus {
    #[default]
    OriginalOnly,
    SeparationPending,
    Separating,
    SeparationFailed,
    Separated,
}

impl AudioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioStatus::OriginalOnly => "original_only",
            AudioStatus::SeparationPending => "separation_pending",
            AudioStatus::Separating => "separating",
            AudioStatus::SeparationFailed => "separation_failed",
            AudioStatus::Separated => "separated",
        }
    }

    /// Parses an on-disk status, mapping legacy and unknown values to the
    /// default so old records still play back.
    pub fn parse(value: &str) -> Self {
        match value {
            "original_only" => AudioStatus::OriginalOnly,
            "separation_pending" => AudioStatus::SeparationPending,
            "separating" => AudioStatus::Separating,
            "separation_failed" => AudioStatus::SeparationFailed,
            "separated" => AudioStatus::Separated,
            // Pre-separation library formats used these.
            "ready" | "missing" | "error" => AudioStatus::OriginalOnly,
            other => {
                log::warn!(
                    "Unknown audio status '{}', defaulting to original_only",
                    other
                );
                AudioStatus::OriginalOnly
            }
        }
    }
}

impl fmt::Display for AudioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AudioStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AudioStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(AudioStatus::parse(&value))
    }
}

/// Lyrics lifecycle of a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LyricsStatus {
    #[default]
    None,
    TextOnly,
    Synced,
}

impl LyricsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricsStatus::None => "none",
            LyricsStatus::TextOnly => "text_only",
            LyricsStatus::Synced => "synced",
        }
    }

    /// Parses an on-disk status, mapping legacy values: `ready` meant a
    /// synced file existed, `missing` meant no lyrics at all.
    pub fn parse(value: &str) -> Self {
        match value {
            "none" => LyricsStatus::None,
            "text_only" => LyricsStatus::TextOnly,
            "synced" => LyricsStatus::Synced,
            "ready" => LyricsStatus::Synced,
            "missing" => LyricsStatus::None,
            other => {
                log::warn!("Unknown lyrics status '{}', defaulting to none", other);
                LyricsStatus::None
            }
        }
    }
}

impl fmt::Display for LyricsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LyricsStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LyricsStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(LyricsStatus::parse(&value))
    }
}

/// Where the song's audio came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SongSource {
    File {
        /// Path of the imported file (legacy records use `originalPath`).
        #[serde(alias = "originalPath")]
        original_path: PathBuf,
    },
}

impl SongSource {
    pub fn original_path(&self) -> &PathBuf {
        match self {
            SongSource::File { original_path } => original_path,
        }
    }
}

/// Durable per-song metadata, one record per song directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongRecord {
    /// Stable identifier; immutable after creation.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(rename = "type")]
    pub kind: SongKind,
    #[serde(default)]
    pub audio_status: AudioStatus,
    #[serde(default)]
    pub lyrics_status: LyricsStatus,
    pub source: SongSource,
    /// Name of the canonical original file inside the song directory.
    #[serde(default)]
    pub stored_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrumental_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocal_path: Option<PathBuf>,
    #[serde(default)]
    pub last_separation_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_raw_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_lrc_path: Option<PathBuf>,
    /// Quality tier of the last successful separation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separation_quality: Option<SeparationQuality>,
    /// Immutable after creation.
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl SongRecord {
    /// Filename of the stored original, derived from the source extension
    /// when no stored filename was recorded.
    pub fn original_filename(&self) -> String {
        if !self.stored_filename.is_empty() {
            return self.stored_filename.clone();
        }
        let ext = self
            .source
            .original_path()
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| DEFAULT_AUDIO_EXT.to_string());
        format!("Original{}", ext)
    }

    /// Backfills derived fields after deserialization or mutation.
    pub fn normalize(&mut self) {
        self.stored_filename = self.original_filename();
    }

    pub fn is_separable(&self) -> bool {
        self.kind == SongKind::Source
    }
}

/// Parameters for importing a song into the library.
#[derive(Debug, Clone)]
pub struct NewSong {
    pub source_path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
    pub kind: SongKind,
    /// Optional raw lyrics supplied at import time.
    pub lyrics_text: Option<String>,
}
