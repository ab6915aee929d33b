//! In-memory catalog cache.
//!
//! Holds the full song catalog and one user's liked set. Both are fetched
//! lazily on first use and kept until [`CatalogCache::invalidate`]; there is
//! no time-based expiry. Concurrent first callers wait on one in-flight
//! fetch instead of each querying the store.
//!
//! The cache is scoped to one user id at a time. [`CatalogCache::bind_user`]
//! with a different id invalidates everything before the next read.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::model::{LikedSet, SongId, SongRecord, UserId};
use crate::store::{RemoteStore, StoreError};

/// Catalog and liked-set cache for one user scope.
pub struct CatalogCache {
    store: Arc<dyn RemoteStore>,
    scope: Mutex<Option<UserId>>,
    songs: Mutex<Option<Arc<Vec<SongRecord>>>>,
    liked: Mutex<Option<Arc<LikedSet>>>,
    /// Bumped on every invalidation; fetches started earlier are not stored
    generation: AtomicU64,
    song_fetch: tokio::sync::Mutex<()>,
    liked_fetch: tokio::sync::Mutex<()>,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            scope: Mutex::new(None),
            songs: Mutex::new(None),
            liked: Mutex::new(None),
            generation: AtomicU64::new(0),
            song_fetch: tokio::sync::Mutex::new(()),
            liked_fetch: tokio::sync::Mutex::new(()),
        }
    }

    /// The user id the cached data belongs to.
    pub fn scope(&self) -> Option<UserId> {
        self.scope.lock().clone()
    }

    /// Scope the cache to `user`, invalidating it if the scope changes.
    ///
    /// Returns whether the scope changed.
    pub fn bind_user(&self, user: Option<&UserId>) -> bool {
        let mut scope = self.scope.lock();
        if scope.as_ref() == user {
            return false;
        }
        tracing::debug!(from = ?*scope, to = ?user, "Catalog cache scope changed");
        self.invalidate();
        *scope = user.cloned();
        true
    }

    /// Drop both cached values. The only way cached data is cleared.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.songs.lock() = None;
        *self.liked.lock() = None;
    }

    /// The full catalog, fetched once and then served from memory.
    pub async fn get_songs(&self, force_refresh: bool) -> Result<Arc<Vec<SongRecord>>, StoreError> {
        if !force_refresh && let Some(songs) = self.cached_songs() {
            tracing::debug!("Catalog cache hit");
            return Ok(songs);
        }

        let _fetching = self.song_fetch.lock().await;
        // Another caller may have filled the cache while we waited.
        if !force_refresh && let Some(songs) = self.cached_songs() {
            return Ok(songs);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let songs = Arc::new(self.store.fetch_songs().await?);
        tracing::debug!(count = songs.len(), "Catalog fetched");

        if self.generation.load(Ordering::SeqCst) == generation {
            *self.songs.lock() = Some(Arc::clone(&songs));
        } else {
            tracing::debug!("Catalog cache invalidated during fetch, not storing");
        }
        Ok(songs)
    }

    /// `user`'s liked set. Switches the cache scope to `user` first.
    pub async fn get_liked_set(&self, user: &UserId) -> Result<Arc<LikedSet>, StoreError> {
        self.bind_user(Some(user));

        if let Some(liked) = self.cached_liked(user) {
            return Ok(liked);
        }

        let _fetching = self.liked_fetch.lock().await;
        if let Some(liked) = self.cached_liked(user) {
            return Ok(liked);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let ids = self.store.fetch_liked_song_ids(user).await?;
        let liked = Arc::new(LikedSet::new(user.clone(), ids));
        tracing::debug!(user_id = %user, count = liked.ids.len(), "Liked set fetched");

        if self.generation.load(Ordering::SeqCst) == generation {
            *self.liked.lock() = Some(Arc::clone(&liked));
        }
        Ok(liked)
    }

    /// Record a like toggle that already succeeded remotely.
    ///
    /// Updates the liked set in place, and the cached like count when
    /// `count_changed`.
    pub fn apply_like(&self, user: &UserId, song_id: SongId, liked: bool, count_changed: bool) {
        if let Some(set) = self.liked.lock().as_mut()
            && set.user == *user
        {
            let set = Arc::make_mut(set);
            if liked {
                set.ids.insert(song_id);
            } else {
                set.ids.remove(&song_id);
            }
        }

        if !count_changed {
            return;
        }
        if let Some(songs) = self.songs.lock().as_mut() {
            let songs = Arc::make_mut(songs);
            if let Some(record) = songs.iter_mut().find(|s| s.id == song_id) {
                record.likes = if liked {
                    record.likes.saturating_add(1)
                } else {
                    record.likes.saturating_sub(1)
                };
            }
        }
    }

    fn cached_songs(&self) -> Option<Arc<Vec<SongRecord>>> {
        self.songs.lock().clone()
    }

    fn cached_liked(&self, user: &UserId) -> Option<Arc<LikedSet>> {
        self.liked
            .lock()
            .as_ref()
            .filter(|set| set.user == *user)
            .cloned()
    }
}
