use std::path::PathBuf;
use thiserror::Error;

use crate::library::SongKind;

#[derive(Error, Debug)]
pub enum StemboxError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Lyrics error: {0}")]
    Lyrics(#[from] LyricsError),

    #[error("Separation error: {0}")]
    Separation(#[from] SeparationError),
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Song '{0}' not found")]
    SongNotFound(String),

    #[error("Song '{0}' already has a record")]
    AlreadyExists(String),

    #[error("Invalid song record '{path}': {source}")]
    InvalidRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete directory '{path}': {source}")]
    DeleteDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum LyricsError {
    #[error("Song '{0}' not found for lyrics operation")]
    SongNotFound(String),

    #[error("Failed to read lyrics file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write lyrics file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("Song '{0}' not found")]
    SongNotFound(String),

    #[error("Song '{id}' is {kind} and does not support separation")]
    NotSeparable { id: String, kind: SongKind },

    #[error("Original audio missing at '{0}'")]
    OriginalMissing(PathBuf),

    #[error("Failed to spawn separation worker '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Separation worker failed: {0}")]
    Worker(String),

    #[error("Separation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

pub type Result<T> = std::result::Result<T, StemboxError>;
