pub mod config;
pub mod error;
pub mod library;
pub mod lyrics;
pub mod separation;

pub use config::{data_dir, Settings, WorkerRuntime};
pub use error::{LibraryError, LyricsError, Result, SeparationError, StemboxError};
pub use library::{
    AudioStatus, LyricsStatus, NewSong, SeparatedPaths, SongKind, SongLibrary, SongRecord,
};
pub use lyrics::{LyricsFile, LyricsStore};
pub use separation::{
    JobStatus, SeparationJob, SeparationManager, SeparationQuality, SeparationWorker,
    StemSeparator, SubscriptionId,
};
