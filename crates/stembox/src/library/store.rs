//! Song library: CRUD over per-song directories and playback path resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::LibraryError;
use crate::library::song::{
    AudioStatus, LyricsStatus, NewSong, SongRecord, SongSource, DEFAULT_AUDIO_EXT,
};
use crate::lyrics::RAW_LYRICS_FILENAME;

const SONGS_DIR_NAME: &str = "songs";
const META_FILENAME: &str = "meta.json";
const META_TMP_FILENAME: &str = "meta.json.tmp";

/// Resolved playback paths for a song. Both fields set only when separated
/// stems exist; falls back to `{original, None}`, then `{None, None}`.
#[derive(Debug, Clone, Default)]
pub struct SeparatedPaths {
    pub instrumental: Option<PathBuf>,
    pub vocal: Option<PathBuf>,
}

/// Directory-per-song metadata store rooted at `<data_dir>/songs`.
///
/// Updates to the same song are serialized through a per-song async mutex,
/// so a user edit cannot lose a racing job status flip.
pub struct SongLibrary {
    songs_dir: PathBuf,
    update_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SongLibrary {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            songs_dir: data_dir.join(SONGS_DIR_NAME),
            update_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn songs_dir(&self) -> &Path {
        &self.songs_dir
    }

    pub fn song_dir(&self, id: &str) -> PathBuf {
        self.songs_dir.join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.song_dir(id).join(META_FILENAME)
    }

    async fn ensure_songs_dir(&self) -> Result<(), LibraryError> {
        fs::create_dir_all(&self.songs_dir)
            .await
            .map_err(|e| LibraryError::CreateDirectory {
                path: self.songs_dir.clone(),
                source: e,
            })
    }

    async fn song_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.update_locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Imports a local audio file as a new song: generates an id, copies the
    /// audio into the song directory and writes the initial record.
    pub async fn import(&self, new_song: NewSong) -> Result<SongRecord, LibraryError> {
        self.ensure_songs_dir().await?;

        // Millisecond ids are stable and sortable; bump on the rare same-ms
        // collision instead of failing the import.
        let mut id = Utc::now().timestamp_millis();
        while fs::try_exists(self.meta_path(&id.to_string()))
            .await
            .unwrap_or(false)
        {
            id += 1;
        }

        self.create(&id.to_string(), new_song).await
    }

    /// Creates a song record under a caller-supplied id. Fails with
    /// `AlreadyExists` when the song directory already holds a record.
    pub async fn create(&self, id: &str, new_song: NewSong) -> Result<SongRecord, LibraryError> {
        self.ensure_songs_dir().await?;

        let song_dir = self.song_dir(id);
        if fs::try_exists(song_dir.join(META_FILENAME))
            .await
            .unwrap_or(false)
        {
            return Err(LibraryError::AlreadyExists(id.to_string()));
        }

        fs::create_dir_all(&song_dir)
            .await
            .map_err(|e| LibraryError::CreateDirectory {
                path: song_dir.clone(),
                source: e,
            })?;

        let ext = new_song
            .source_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| DEFAULT_AUDIO_EXT.to_string());
        let stored_filename = format!("Original{}", ext);
        let target = song_dir.join(&stored_filename);

        log::info!(
            "Importing song {} from '{}'",
            id,
            new_song.source_path.display()
        );
        fs::copy(&new_song.source_path, &target)
            .await
            .map_err(|e| LibraryError::CopyFile {
                from: new_song.source_path.clone(),
                to: target.clone(),
                source: e,
            })?;

        let raw_lyrics = new_song
            .lyrics_text
            .as_deref()
            .map(|text| text.replace("\r\n", "\n"))
            .unwrap_or_default();
        let has_lyrics = !raw_lyrics.trim().is_empty();
        let lyrics_raw_path = if has_lyrics {
            let path = song_dir.join(RAW_LYRICS_FILENAME);
            fs::write(&path, &raw_lyrics)
                .await
                .map_err(|e| LibraryError::WriteFile {
                    path: path.clone(),
                    source: e,
                })?;
            Some(path)
        } else {
            None
        };

        let now = Utc::now();
        let record = SongRecord {
            id: id.to_string(),
            title: new_song.title,
            artist: new_song
                .artist
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            kind: new_song.kind,
            audio_status: AudioStatus::OriginalOnly,
            lyrics_status: if has_lyrics {
                LyricsStatus::TextOnly
            } else {
                LyricsStatus::None
            },
            source: SongSource::File {
                original_path: new_song.source_path,
            },
            stored_filename,
            instrumental_path: None,
            vocal_path: None,
            last_separation_error: None,
            lyrics_raw_path,
            lyrics_lrc_path: None,
            separation_quality: None,
            created_at: now,
            updated_at: now,
        };

        self.write_record(&song_dir, &record).await?;
        Ok(record)
    }

    /// Loads a song record, or `None` when absent or unreadable.
    pub async fn get(&self, id: &str) -> Option<SongRecord> {
        if id.is_empty() {
            return None;
        }
        self.read_record(&self.song_dir(id)).await
    }

    /// Scans the songs root and returns every readable record, newest first.
    pub async fn load_all(&self) -> Vec<SongRecord> {
        let mut records = Vec::new();
        let mut entries = match fs::read_dir(&self.songs_dir).await {
            Ok(entries) => entries,
            Err(_) => return records,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                _ => continue,
            }
            if let Some(record) = self.read_record(&entry.path()).await {
                records.push(record);
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        log::debug!("Loaded {} songs from library", records.len());
        records
    }

    /// Read-modify-write update, serialized per song id.
    ///
    /// `id` and `created_at` are force-preserved, `updated_at` refreshed and
    /// the record re-normalized before persisting.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<SongRecord, LibraryError>
    where
        F: FnOnce(&mut SongRecord),
    {
        let lock = self.song_lock(id).await;
        let _guard = lock.lock().await;

        let song_dir = self.song_dir(id);
        let mut record = self
            .read_record(&song_dir)
            .await
            .ok_or_else(|| LibraryError::SongNotFound(id.to_string()))?;

        let original_id = record.id.clone();
        let created_at = record.created_at;

        mutate(&mut record);

        record.id = original_id;
        record.created_at = created_at;
        record.updated_at = Utc::now();
        record.normalize();

        self.write_record(&song_dir, &record).await?;
        Ok(record)
    }

    /// Removes the song's entire directory tree. Deleting an absent song is
    /// a no-op; other I/O failures propagate.
    pub async fn delete(&self, id: &str) -> Result<(), LibraryError> {
        let song_dir = self.song_dir(id);

        {
            let mut locks = self.update_locks.lock().await;
            locks.remove(id);
        }

        match fs::remove_dir_all(&song_dir).await {
            Ok(()) => {
                log::info!("Deleted song folder '{}'", song_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                log::error!("Failed to delete song folder '{}': {}", song_dir.display(), e);
                Err(LibraryError::DeleteDirectory {
                    path: song_dir,
                    source: e,
                })
            }
        }
    }

    /// Path to play for a song: the instrumental when separated and present,
    /// else the stored original, else `None`.
    pub async fn playback_path(&self, id: &str) -> Option<PathBuf> {
        let record = self.get(id).await?;

        if record.audio_status == AudioStatus::Separated {
            if let Some(instrumental) = &record.instrumental_path {
                if file_exists(instrumental).await {
                    log::debug!("Using separated instrumental for playback of song {}", id);
                    return Some(instrumental.clone());
                }
            }
        }

        let original = self.song_dir(id).join(record.original_filename());
        if file_exists(&original).await {
            return Some(original);
        }

        log::warn!("Stored audio missing for song {}", id);
        None
    }

    /// Path of the stored original audio, if it exists on disk.
    pub async fn original_path(&self, id: &str) -> Option<PathBuf> {
        let record = self.get(id).await?;
        let original = self.song_dir(id).join(record.original_filename());
        if file_exists(&original).await {
            Some(original)
        } else {
            log::warn!("Original audio missing for song {}", id);
            None
        }
    }

    /// Resolves dual-output stems. Accompaniment songs always resolve to the
    /// original; separated stems are only returned when both files exist.
    pub async fn separated_paths(&self, id: &str) -> SeparatedPaths {
        let Some(record) = self.get(id).await else {
            return SeparatedPaths::default();
        };

        if record.is_separable() && record.audio_status == AudioStatus::Separated {
            if let (Some(instrumental), Some(vocal)) =
                (&record.instrumental_path, &record.vocal_path)
            {
                if file_exists(instrumental).await && file_exists(vocal).await {
                    return SeparatedPaths {
                        instrumental: Some(instrumental.clone()),
                        vocal: Some(vocal.clone()),
                    };
                }
                log::warn!(
                    "Separated stems missing for song {}, falling back to original",
                    id
                );
            }
        }

        let original = self.song_dir(id).join(record.original_filename());
        if file_exists(&original).await {
            return SeparatedPaths {
                instrumental: Some(original),
                vocal: None,
            };
        }

        log::warn!("Original audio missing for song {}", id);
        SeparatedPaths::default()
    }

    async fn read_record(&self, song_dir: &Path) -> Option<SongRecord> {
        let meta_path = song_dir.join(META_FILENAME);
        let content = match fs::read_to_string(&meta_path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to read '{}': {}", meta_path.display(), e);
                }
                return None;
            }
        };

        match serde_json::from_str::<SongRecord>(&content) {
            Ok(mut record) => {
                record.normalize();
                Some(record)
            }
            Err(e) => {
                // Tolerate partially written directories; the song just
                // disappears from listings instead of poisoning the scan.
                log::warn!("Failed to parse '{}': {}", meta_path.display(), e);
                None
            }
        }
    }

    async fn write_record(
        &self,
        song_dir: &Path,
        record: &SongRecord,
    ) -> Result<(), LibraryError> {
        let meta_path = song_dir.join(META_FILENAME);
        let json =
            serde_json::to_string_pretty(record).map_err(|e| LibraryError::InvalidRecord {
                path: meta_path.clone(),
                source: e,
            })?;
        // Write-then-rename so a racing reader never observes a truncated
        // record and a crash mid-write cannot lose the previous one.
        let tmp_path = song_dir.join(META_TMP_FILENAME);
        fs::write(&tmp_path, json)
            .await
            .map_err(|e| LibraryError::WriteFile {
                path: tmp_path.clone(),
                source: e,
            })?;
        fs::rename(&tmp_path, &meta_path)
            .await
            .map_err(|e| LibraryError::WriteFile {
                path: meta_path,
                source: e,
            })
    }
}

async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
