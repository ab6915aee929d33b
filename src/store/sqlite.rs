//! SQLite implementation of [`RemoteStore`].
//!
//! Uses SQLx with SQLite so the CLI and tests have a real store to talk to.
//! Counters and the minutes accumulator are single statements, so they stay
//! atomic without explicit transactions.

use async_trait::async_trait;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{RemoteStore, StoreError};
use crate::model::{
    HistoryEntry, PlaylistId, PlaylistRecord, SongId, SongRecord, Tags, UserId, UserRecord,
};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "tuneweaver.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Database row for the songs table.
#[derive(Debug, sqlx::FromRow)]
struct SongRow {
    id: i64,
    name: String,
    artist: String,
    language: String,
    tags: String,
    views: i64,
    likes: i64,
}

impl TryFrom<SongRow> for SongRecord {
    type Error = StoreError;

    fn try_from(row: SongRow) -> Result<Self, Self::Error> {
        let tags: Tags = serde_json::from_str(&row.tags)
            .map_err(|e| StoreError::Corrupt(format!("tags of song {}: {}", row.id, e)))?;
        Ok(SongRecord {
            id: row.id,
            name: row.name,
            artist: row.artist,
            language: row.language,
            tags,
            views: row.views.max(0) as u64,
            likes: row.likes.max(0) as u64,
        })
    }
}

/// Database row for the users table.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
    last_song_id: Option<i64>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            id: row.id,
            email: row.email,
            name: row.name,
            avatar_url: row.avatar_url,
            last_song_id: row.last_song_id,
        }
    }
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_url` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database creation fails
    /// - Connection cannot be established
    /// - Migration fails
    pub async fn open(db_url: &str) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(db_url, "Store opened");
        Ok(Self { pool })
    }

    /// Wrap an existing, already-migrated pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or update catalog records.
    ///
    /// Re-importing a song never lowers its view or like counters.
    pub async fn import_songs(&self, songs: &[SongRecord]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        for song in songs {
            let tags = serde_json::to_string(&song.tags)
                .map_err(|e| StoreError::Corrupt(format!("tags of song {}: {}", song.id, e)))?;
            sqlx::query(
                r#"
                INSERT INTO songs (id, name, artist, language, tags, views, likes)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    artist = excluded.artist,
                    language = excluded.language,
                    tags = excluded.tags,
                    views = MAX(songs.views, excluded.views),
                    likes = MAX(songs.likes, excluded.likes)
                "#,
            )
            .bind(song.id)
            .bind(&song.name)
            .bind(&song.artist)
            .bind(&song.language)
            .bind(tags)
            .bind(song.views as i64)
            .bind(song.likes as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        tracing::info!(count = songs.len(), "Imported songs");
        Ok(songs.len())
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn fetch_songs(&self) -> Result<Vec<SongRecord>, StoreError> {
        let rows: Vec<SongRow> = sqlx::query_as(
            "SELECT id, name, artist, language, tags, views, likes FROM songs ORDER BY views DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SongRecord::try_from).collect()
    }

    async fn fetch_liked_song_ids(&self, user: &UserId) -> Result<Vec<SongId>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT song_id FROM liked_songs WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_like(&self, user: &UserId, song: SongId) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO liked_songs (user_id, song_id) VALUES (?, ?)")
            .bind(user.as_str())
            .bind(song)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_like(&self, user: &UserId, song: SongId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM liked_songs WHERE user_id = ? AND song_id = ?")
            .bind(user.as_str())
            .bind(song)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_history(&self, user: &UserId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT song_id, minutes_listened FROM history WHERE user_id = ? ORDER BY minutes_listened DESC",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(song_id, minutes)| HistoryEntry { song_id, minutes })
            .collect())
    }

    async fn fetch_user(&self, user: &UserId) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, avatar_url, last_song_id FROM users WHERE id = ?",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn upsert_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, avatar_url)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                avatar_url = excluded.avatar_url
            "#,
        )
        .bind(&record.id)
        .bind(&record.email)
        .bind(&record.name)
        .bind(&record.avatar_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_last_played(&self, user: &UserId, song: SongId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, last_song_id) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET last_song_id = excluded.last_song_id
            "#,
        )
        .bind(user.as_str())
        .bind(song)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_playlists(&self, user: &UserId) -> Result<Vec<PlaylistRecord>, StoreError> {
        let rows: Vec<(i64, String, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT p.id, p.name, ps.song_id
            FROM playlists p
            LEFT JOIN playlist_songs ps ON ps.playlist_id = p.id
            WHERE p.user_id = ?
            ORDER BY p.id, ps.rowid
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut playlists: Vec<PlaylistRecord> = Vec::new();
        for (id, name, song_id) in rows {
            match playlists.last_mut() {
                Some(last) if last.id == id => last.song_ids.extend(song_id),
                _ => playlists.push(PlaylistRecord {
                    id,
                    name,
                    song_ids: song_id.into_iter().collect(),
                }),
            }
        }
        Ok(playlists)
    }

    async fn create_playlist(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<PlaylistRecord, StoreError> {
        let row: (i64,) =
            sqlx::query_as("INSERT INTO playlists (user_id, name) VALUES (?, ?) RETURNING id")
                .bind(user.as_str())
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(PlaylistRecord {
            id: row.0,
            name: name.to_string(),
            song_ids: Vec::new(),
        })
    }

    async fn delete_playlist(&self, user: &UserId, playlist: PlaylistId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ?")
            .bind(playlist)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM playlists WHERE id = ? AND user_id = ?")
            .bind(playlist)
            .bind(user.as_str())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the entry deletion.
            return Err(StoreError::not_found("playlist", playlist));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn rename_playlist(
        &self,
        user: &UserId,
        playlist: PlaylistId,
        name: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE playlists SET name = ? WHERE id = ? AND user_id = ?")
            .bind(name)
            .bind(playlist)
            .bind(user.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("playlist", playlist));
        }
        Ok(())
    }

    async fn add_playlist_song(&self, playlist: PlaylistId, song: SongId) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO playlist_songs (playlist_id, song_id) VALUES (?, ?)")
            .bind(playlist)
            .bind(song)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_playlist_song(
        &self,
        playlist: PlaylistId,
        song: SongId,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ? AND song_id = ?")
            .bind(playlist)
            .bind(song)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn adjust_like_count(&self, song: SongId, delta: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE songs SET likes = MAX(likes + ?, 0) WHERE id = ?")
            .bind(delta)
            .bind(song)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("song", song));
        }
        Ok(())
    }

    async fn increment_view_count(&self, song: SongId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE songs SET views = views + 1 WHERE id = ?")
            .bind(song)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("song", song));
        }
        Ok(())
    }

    async fn accumulate_minutes(
        &self,
        user: &UserId,
        song: SongId,
        minutes: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO history (user_id, song_id, minutes_listened)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, song_id) DO UPDATE SET
                minutes_listened = history.minutes_listened + excluded.minutes_listened
            "#,
        )
        .bind(user.as_str())
        .bind(song)
        .bind(minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
