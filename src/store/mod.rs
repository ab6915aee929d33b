//! Remote store boundary.
//!
//! The catalog, likes, listening history, user rows and playlists live in a
//! remote store. This module defines the [`RemoteStore`] trait that the rest
//! of the crate talks to, plus a SQLite implementation in [`sqlite`].
//!
//! # Example
//!
//! ```ignore
//! use tuneweaver::store::{RemoteStore, SqliteStore};
//!
//! let store = SqliteStore::open("sqlite:tuneweaver.db").await?;
//! let songs = store.fetch_songs().await?;
//! ```

pub mod sqlite;

use async_trait::async_trait;

use crate::model::{
    HistoryEntry, PlaylistId, PlaylistRecord, SongId, SongRecord, UserId, UserRecord,
};

pub use sqlite::SqliteStore;

/// Errors raised by a [`RemoteStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Generic query/mutation interface over the remote collections.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // songs
    /// All catalog records, most viewed first.
    async fn fetch_songs(&self) -> Result<Vec<SongRecord>, StoreError>;

    // liked_songs
    async fn fetch_liked_song_ids(&self, user: &UserId) -> Result<Vec<SongId>, StoreError>;
    async fn insert_like(&self, user: &UserId, song: SongId) -> Result<(), StoreError>;
    async fn delete_like(&self, user: &UserId, song: SongId) -> Result<(), StoreError>;

    // history
    async fn fetch_history(&self, user: &UserId) -> Result<Vec<HistoryEntry>, StoreError>;

    // users
    async fn fetch_user(&self, user: &UserId) -> Result<Option<UserRecord>, StoreError>;
    async fn upsert_user(&self, record: &UserRecord) -> Result<(), StoreError>;
    async fn set_last_played(&self, user: &UserId, song: SongId) -> Result<(), StoreError>;

    // playlists / playlist_songs
    async fn fetch_playlists(&self, user: &UserId) -> Result<Vec<PlaylistRecord>, StoreError>;
    async fn create_playlist(&self, user: &UserId, name: &str)
    -> Result<PlaylistRecord, StoreError>;
    async fn delete_playlist(&self, user: &UserId, playlist: PlaylistId)
    -> Result<(), StoreError>;
    async fn rename_playlist(
        &self,
        user: &UserId,
        playlist: PlaylistId,
        name: &str,
    ) -> Result<(), StoreError>;
    async fn add_playlist_song(&self, playlist: PlaylistId, song: SongId)
    -> Result<(), StoreError>;
    async fn remove_playlist_song(
        &self,
        playlist: PlaylistId,
        song: SongId,
    ) -> Result<(), StoreError>;

    // RPCs
    /// Atomically add `delta` to a song's like count, never going below zero.
    async fn adjust_like_count(&self, song: SongId, delta: i64) -> Result<(), StoreError>;
    /// Atomically add one to a song's view count.
    async fn increment_view_count(&self, song: SongId) -> Result<(), StoreError>;
    /// Additive upsert: add `minutes` to the (user, song) history row, creating it if absent.
    async fn accumulate_minutes(
        &self,
        user: &UserId,
        song: SongId,
        minutes: f64,
    ) -> Result<(), StoreError>;
}

/// Outcome of a non-critical remote write.
///
/// Best-effort writes never fail the operation that issued them; the
/// failure is logged and reported here instead.
#[derive(Debug)]
#[must_use]
pub enum BestEffort {
    Applied,
    Failed(StoreError),
}

impl BestEffort {
    /// Convert a write result, logging a failure under `operation`.
    pub fn log(operation: &'static str, result: Result<(), StoreError>) -> Self {
        match result {
            Ok(()) => Self::Applied,
            Err(e) => {
                tracing::warn!(operation, error = %e, "Best-effort write failed");
                Self::Failed(e)
            }
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}
