//! Raw and time-synced lyrics files, with song record status side effects.

use std::path::PathBuf;

use tokio::fs;

use crate::error::LyricsError;
use crate::library::{LyricsStatus, SongLibrary, SongRecord};

/// Default raw-lyrics filename inside a song directory.
pub const RAW_LYRICS_FILENAME: &str = "lyrics_raw.txt";

/// Default synced-lyrics (LRC) filename inside a song directory.
pub const SYNCED_LYRICS_FILENAME: &str = "lyrics_synced.lrc";

/// A lyrics file read from disk.
#[derive(Debug, Clone)]
pub struct LyricsFile {
    pub path: PathBuf,
    pub content: String,
}

/// Reads and writes lyrics for songs in a [`SongLibrary`].
pub struct LyricsStore {
    library: std::sync::Arc<SongLibrary>,
}

impl LyricsStore {
    pub fn new(library: std::sync::Arc<SongLibrary>) -> Self {
        Self { library }
    }

    /// Reads the raw lyrics text. `Ok(None)` when the song has no lyrics
    /// file yet; `Err(SongNotFound)` when the song itself is gone.
    pub async fn read_raw(&self, song_id: &str) -> Result<Option<LyricsFile>, LyricsError> {
        let record = self.require_song(song_id).await?;
        let path = record
            .lyrics_raw_path
            .clone()
            .unwrap_or_else(|| self.library.song_dir(song_id).join(RAW_LYRICS_FILENAME));
        self.read_file(song_id, path).await
    }

    /// Reads the time-synced (LRC) lyrics text.
    pub async fn read_synced(&self, song_id: &str) -> Result<Option<LyricsFile>, LyricsError> {
        let record = self.require_song(song_id).await?;
        let path = record
            .lyrics_lrc_path
            .clone()
            .unwrap_or_else(|| self.library.song_dir(song_id).join(SYNCED_LYRICS_FILENAME));
        self.read_file(song_id, path).await
    }

    /// Writes raw lyrics, then updates the song's lyrics status:
    /// `text_only` when the trimmed text is non-empty, else `none`.
    pub async fn write_raw(
        &self,
        song_id: &str,
        content: &str,
    ) -> Result<(PathBuf, SongRecord), LyricsError> {
        self.require_song(song_id).await?;

        let normalized = content.replace("\r\n", "\n");
        let path = self.library.song_dir(song_id).join(RAW_LYRICS_FILENAME);
        self.write_file(song_id, &path, &normalized).await?;

        let has_content = !normalized.trim().is_empty();
        let record = self
            .library
            .update(song_id, |song| {
                song.lyrics_status = if has_content {
                    LyricsStatus::TextOnly
                } else {
                    LyricsStatus::None
                };
                song.lyrics_raw_path = Some(path.clone());
            })
            .await
            .map_err(LyricsError::Library)?;

        Ok((path, record))
    }

    /// Writes synced lyrics and marks the song `synced`.
    ///
    /// The status reflects that a synced file was written, so it is set even
    /// for empty content (unlike `write_raw`). The raw-lyrics path is
    /// backfilled to its default when not recorded yet.
    pub async fn write_synced(
        &self,
        song_id: &str,
        content: &str,
    ) -> Result<(PathBuf, SongRecord), LyricsError> {
        self.require_song(song_id).await?;

        let normalized = content.replace("\r\n", "\n");
        let song_dir = self.library.song_dir(song_id);
        let path = song_dir.join(SYNCED_LYRICS_FILENAME);
        self.write_file(song_id, &path, &normalized).await?;

        let default_raw = song_dir.join(RAW_LYRICS_FILENAME);
        let record = self
            .library
            .update(song_id, |song| {
                song.lyrics_status = LyricsStatus::Synced;
                song.lyrics_lrc_path = Some(path.clone());
                if song.lyrics_raw_path.is_none() {
                    song.lyrics_raw_path = Some(default_raw.clone());
                }
            })
            .await
            .map_err(LyricsError::Library)?;

        Ok((path, record))
    }

    async fn require_song(&self, song_id: &str) -> Result<SongRecord, LyricsError> {
        self.library
            .get(song_id)
            .await
            .ok_or_else(|| LyricsError::SongNotFound(song_id.to_string()))
    }

    async fn read_file(
        &self,
        song_id: &str,
        path: PathBuf,
    ) -> Result<Option<LyricsFile>, LyricsError> {
        match fs::read_to_string(&path).await {
            Ok(content) => {
                log::debug!("Loaded lyrics for song {} from '{}'", song_id, path.display());
                Ok(Some(LyricsFile { path, content }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LyricsError::ReadFile { path, source: e }),
        }
    }

    async fn write_file(
        &self,
        song_id: &str,
        path: &PathBuf,
        content: &str,
    ) -> Result<(), LyricsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LyricsError::WriteFile {
                    path: path.clone(),
                    source: e,
                })?;
        }
        fs::write(path, content)
            .await
            .map_err(|e| LyricsError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
        log::debug!("Saved lyrics for song {} to '{}'", song_id, path.display());
        Ok(())
    }
}
