//! Durable song metadata: records, status lifecycles and the on-disk store.

pub mod song;
pub mod store;

pub use song::{AudioStatus, LyricsStatus, NewSong, SongKind, SongRecord, SongSource};
pub use store::{SeparatedPaths, SongLibrary};
