//! Test utilities and fixtures for tuneweaver tests.
//!
//! This module provides common test helpers, mock factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use tuneweaver::test_utils::{temp_store, mock_song};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (store, _dir) = temp_store().await;
//!     store.import_songs(&[mock_song(1, &["rock"], "X", "en")]).await.unwrap();
//! }
//! ```

use tempfile::TempDir;

use crate::model::{ImageResolver, Song, SongId, SongRecord, Tags};
use crate::store::SqliteStore;

/// Creates a temporary SQLite store for testing.
///
/// The database lives in a temporary directory that is removed when the
/// returned `TempDir` is dropped. Keep it alive for the duration of the test.
pub async fn temp_store() -> (SqliteStore, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let store = SqliteStore::open(&db_url)
        .await
        .expect("Failed to initialize test database");

    (store, dir)
}

/// Creates a catalog record with zero counters.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let popular = SongRecord { views: 900, ..mock_song(1, &["pop"], "A", "en") };
/// ```
pub fn mock_song(id: SongId, tags: &[&str], artist: &str, language: &str) -> SongRecord {
    SongRecord {
        id,
        name: format!("Song {}", id),
        artist: artist.to_string(),
        language: language.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect::<Tags>(),
        views: 0,
        likes: 0,
    }
}

/// Materializes a record for a viewer who has not liked it.
pub fn viewer_song(record: &SongRecord) -> Song {
    record.materialize(false, &ImageResolver::default())
}

/// The three-song catalog used by the end-to-end ranking examples:
/// two English rock songs by different artists and one French jazz song.
pub fn abc_catalog() -> Vec<SongRecord> {
    vec![
        SongRecord {
            name: "SongA".to_string(),
            likes: 10,
            views: 100,
            ..mock_song(1, &["rock"], "X", "en")
        },
        SongRecord {
            name: "SongB".to_string(),
            likes: 1,
            views: 5,
            ..mock_song(2, &["rock"], "Y", "en")
        },
        SongRecord {
            name: "SongC".to_string(),
            likes: 50,
            views: 50,
            ..mock_song(3, &["jazz"], "Z", "fr")
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RemoteStore;

    #[tokio::test]
    async fn test_temp_store_creates_working_database() {
        let (store, _dir) = temp_store().await;

        // Should be able to query
        let songs = store.fetch_songs().await.unwrap();
        assert!(songs.is_empty());
    }

    #[test]
    fn test_mock_song_defaults() {
        let song = mock_song(42, &["rock", "indie"], "Artist", "en");
        assert_eq!(song.id, 42);
        assert_eq!(song.name, "Song 42");
        assert_eq!(song.tags.len(), 2);
        assert_eq!((song.views, song.likes), (0, 0));
    }

    #[test]
    fn test_abc_catalog_shape() {
        let catalog = abc_catalog();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog[2].language, "fr");
    }
}
