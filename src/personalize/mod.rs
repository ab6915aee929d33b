//! Personalization orchestrator.
//!
//! Loads the catalog, likes, history and playlists for the effective user,
//! ranks them with the [`ScoringEngine`] and publishes the results as
//! [`Views`]. Mutations (likes, playlist edits) go to the remote store first;
//! the views change only after the store accepted the write.
//!
//! # Example
//!
//! ```ignore
//! let personalizer = Personalizer::from_config(store, &config);
//! personalizer.bind_identity(resolver.resolve().await.as_ref());
//! personalizer.refresh_all(&user).await?;
//! for song in personalizer.trending() {
//!     println!("{} - {}", song.artist, song.name);
//! }
//! ```

pub mod views;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::catalog::CatalogCache;
use crate::config::{Config, RankingConfig};
use crate::error::{Error, Result, ResultExt};
use crate::identity::{EffectiveIdentity, IdentityState};
use crate::model::{
    HistoryEntry, ImageResolver, LikedSet, Playlist, PlaylistId, PlaylistRecord, Song, SongId,
    SongRecord, UserId, UserRecord,
};
use crate::ranking::{self, ScoringEngine};
use crate::store::{BestEffort, RemoteStore, StoreError};

pub use views::Views;

/// Result of a successful like toggle.
#[derive(Debug)]
pub struct LikeOutcome {
    /// Whether the song is liked now
    pub liked: bool,
    /// The song's like counter update
    pub like_count: BestEffort,
}

/// Builds and maintains the personalized views for one user at a time.
pub struct Personalizer {
    store: Arc<dyn RemoteStore>,
    cache: CatalogCache,
    engine: ScoringEngine,
    limits: RankingConfig,
    images: ImageResolver,
    views: RwLock<Views>,
}

impl Personalizer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        engine: ScoringEngine,
        limits: RankingConfig,
        images: ImageResolver,
    ) -> Self {
        Self {
            cache: CatalogCache::new(Arc::clone(&store)),
            store,
            engine,
            limits,
            images,
            views: RwLock::new(Views::default()),
        }
    }

    pub fn from_config(store: Arc<dyn RemoteStore>, config: &Config) -> Self {
        Self::new(
            store,
            ScoringEngine::from_config(&config.ranking),
            config.ranking.clone(),
            config.library.images(),
        )
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    /// The user the views belong to.
    pub fn user(&self) -> Option<UserId> {
        self.views.read().user.clone()
    }

    /// Follow an identity change.
    ///
    /// A different user (or sign-out) invalidates the cache and clears every
    /// view before anything else can read them. Returns whether it changed.
    pub fn bind_identity(&self, identity: Option<&EffectiveIdentity>) -> bool {
        self.bind_user(identity.map(|i| &i.user_id))
    }

    /// Keep following the identity published by an
    /// [`IdentityResolver`](crate::identity::IdentityResolver).
    ///
    /// The current identity is bound before this returns; every later change
    /// is bound by the returned task, which ends when the resolver goes away.
    pub fn follow(self: &Arc<Self>, mut identity: watch::Receiver<IdentityState>) -> JoinHandle<()> {
        let current = identity.borrow_and_update().effective();
        self.bind_identity(current.as_ref());

        let personalizer = Arc::clone(self);
        tokio::spawn(async move {
            while identity.changed().await.is_ok() {
                let current = identity.borrow_and_update().effective();
                personalizer.bind_identity(current.as_ref());
            }
            tracing::debug!("Identity feed closed");
        })
    }

    fn bind_user(&self, user: Option<&UserId>) -> bool {
        let mut views = self.views.write();
        if views.user.as_ref() == user {
            return false;
        }
        tracing::info!(user_id = ?user, "Switching personalization user");
        self.cache.bind_user(user);
        *views = Views::for_user(user.cloned());
        true
    }

    /// Reload every view for `user`.
    ///
    /// The catalog, playlists and recent listening are fetched concurrently.
    /// If any read fails, every view is reset to empty and the error returned.
    pub async fn refresh_all(&self, user: &UserId) -> Result<()> {
        self.bind_user(Some(user));

        let loaded = futures::try_join!(
            self.load_catalog(user),
            self.store.fetch_playlists(user),
            self.load_recent(user),
        )
        .with_context(format!("refreshing views for {}", user));

        let ((records, liked), playlists, (history, user_row)) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(user_id = %user, error = %e, "Refresh failed, clearing views");
                let mut views = self.views.write();
                if views.user.as_ref() == Some(user) {
                    views.clear();
                }
                return Err(e);
            }
        };

        let all_songs = self.materialize(&records, Some(&*liked));
        let personalized = self.rank_history(&all_songs, &history);
        let trending = ranking::trending(&all_songs, self.limits.trending_limit);
        let last_played = user_row
            .and_then(|row| row.last_song_id)
            .and_then(|id| all_songs.iter().find(|s| s.id == id).cloned());
        let playlists = self.materialize_playlists(playlists, &all_songs);

        let mut views = self.views.write();
        if views.user.as_ref() != Some(user) {
            tracing::debug!(user_id = %user, "Identity changed during refresh, discarding");
            return Ok(());
        }
        tracing::info!(
            user_id = %user,
            songs = all_songs.len(),
            personalized = personalized.len(),
            playlists = playlists.len(),
            "Views refreshed"
        );
        *views = Views {
            user: Some(user.clone()),
            all_songs,
            personalized,
            trending,
            last_played,
            playlists,
        };
        Ok(())
    }

    async fn load_catalog(
        &self,
        user: &UserId,
    ) -> std::result::Result<(Arc<Vec<SongRecord>>, Arc<LikedSet>), StoreError> {
        futures::try_join!(self.cache.get_songs(false), self.cache.get_liked_set(user))
    }

    async fn load_recent(
        &self,
        user: &UserId,
    ) -> std::result::Result<(Vec<HistoryEntry>, Option<UserRecord>), StoreError> {
        futures::try_join!(self.store.fetch_history(user), self.store.fetch_user(user))
    }

    fn materialize(&self, records: &[SongRecord], liked: Option<&LikedSet>) -> Vec<Song> {
        records
            .iter()
            .map(|r| r.materialize(liked.is_some_and(|l| l.contains(r.id)), &self.images))
            .collect()
    }

    fn materialize_playlists(&self, records: Vec<PlaylistRecord>, songs: &[Song]) -> Vec<Playlist> {
        let by_id: HashMap<SongId, &Song> = songs.iter().map(|s| (s.id, s)).collect();
        records
            .into_iter()
            .map(|record| {
                let songs = record
                    .song_ids
                    .iter()
                    .filter_map(|id| by_id.get(id).map(|s| (*s).clone()))
                    .collect();
                Playlist::new(record.id, record.name, songs, self.images.default_cover())
            })
            .collect()
    }

    /// Batch-rank against the most-listened history songs, excluding
    /// everything already in history.
    fn rank_history(&self, songs: &[Song], history: &[HistoryEntry]) -> Vec<Song> {
        let mut most_listened: Vec<&HistoryEntry> = history.iter().collect();
        most_listened.sort_by(|a, b| b.minutes.total_cmp(&a.minutes));

        let batch: Vec<Song> = most_listened
            .iter()
            .filter_map(|entry| songs.iter().find(|s| s.id == entry.song_id))
            .take(self.limits.history_batch_size)
            .cloned()
            .collect();
        let listened: HashSet<SongId> = history.iter().map(|h| h.song_id).collect();

        self.engine
            .rank_for_batch(&batch, songs, &listened, self.limits.history_limit)
            .into_iter()
            .map(|c| c.song)
            .collect()
    }

    /// Songs similar to `seed`, scored fresh against the cached catalog.
    ///
    /// Not cached. Without a user, likes and listening minutes are ignored.
    pub async fn personalized_for_seed(
        &self,
        seed: &Song,
        exclude: &HashSet<SongId>,
    ) -> Result<Vec<Song>> {
        let records = self.cache.get_songs(false).await?;

        let (liked, minutes) = match self.user() {
            Some(user) => {
                let (liked, history) = futures::try_join!(
                    self.cache.get_liked_set(&user),
                    self.store.fetch_history(&user)
                )?;
                let minutes: HashMap<SongId, f64> =
                    history.into_iter().map(|h| (h.song_id, h.minutes)).collect();
                (Some(liked), minutes)
            }
            None => (None, HashMap::new()),
        };

        let candidates = self.materialize(&records, liked.as_deref());
        let ranked = self.engine.rank_for_seed(
            seed,
            &candidates,
            &minutes,
            exclude,
            self.limits.seed_limit,
        );
        tracing::debug!(seed = seed.id, results = ranked.len(), "Ranked seed candidates");
        Ok(ranked.into_iter().map(|c| c.song).collect())
    }

    /// [`personalized_for_seed`](Self::personalized_for_seed) by catalog id.
    pub async fn similar_to(&self, song_id: SongId, exclude: &HashSet<SongId>) -> Result<Vec<Song>> {
        let seed = self.song(song_id).ok_or_else(|| Error::not_found("song", song_id))?;
        self.personalized_for_seed(&seed, exclude).await
    }

    /// Like or unlike a song for the current user.
    ///
    /// The like row is written first; on success the like counter is bumped
    /// best-effort and every local copy of the song is updated in place. The
    /// local counter follows the remote one, so it is left alone when the
    /// bump fails.
    pub async fn toggle_like(&self, song_id: SongId) -> Result<LikeOutcome> {
        let user = self.require_user()?;
        let records = self.cache.get_songs(false).await?;
        if !records.iter().any(|r| r.id == song_id) {
            return Err(Error::not_found("song", song_id));
        }

        let was_liked = self.cache.get_liked_set(&user).await?.contains(song_id);
        let liked = !was_liked;
        let write = if liked {
            self.store.insert_like(&user, song_id).await
        } else {
            self.store.delete_like(&user, song_id).await
        };
        if let Err(e) = write {
            tracing::warn!(user_id = %user, song_id, error = %e, "Like toggle rejected");
            return Err(e.into());
        }

        let delta = if liked { 1 } else { -1 };
        let like_count = BestEffort::log(
            "adjust_like_count",
            self.store.adjust_like_count(song_id, delta).await,
        );

        let count_changed = like_count.is_applied();
        self.cache.apply_like(&user, song_id, liked, count_changed);
        let mut views = self.views.write();
        if views.user.as_ref() == Some(&user) {
            views.apply_like(song_id, liked, count_changed);
        }
        tracing::debug!(user_id = %user, song_id, liked, "Like toggled");
        Ok(LikeOutcome { liked, like_count })
    }

    pub async fn create_playlist(&self, name: &str) -> Result<PlaylistId> {
        let user = self.require_user()?;
        let name = validate_name(name)?;

        let record = self.store.create_playlist(&user, name).await?;
        tracing::info!(user_id = %user, playlist_id = record.id, "Created playlist");

        let playlist = Playlist::new(
            record.id,
            record.name,
            Vec::new(),
            self.images.default_cover(),
        );
        let id = playlist.id;
        self.views.write().playlists.push(playlist);
        Ok(id)
    }

    pub async fn delete_playlist(&self, playlist_id: PlaylistId) -> Result<()> {
        let user = self.require_user()?;
        self.store.delete_playlist(&user, playlist_id).await?;
        self.views.write().playlists.retain(|p| p.id != playlist_id);
        tracing::info!(user_id = %user, playlist_id, "Deleted playlist");
        Ok(())
    }

    pub async fn rename_playlist(&self, playlist_id: PlaylistId, name: &str) -> Result<()> {
        let user = self.require_user()?;
        let name = validate_name(name)?;

        self.store.rename_playlist(&user, playlist_id, name).await?;
        if let Some(playlist) = self.views.write().playlist_mut(playlist_id) {
            playlist.name = name.to_string();
        }
        Ok(())
    }

    /// Append a song. Adding a song that is already present changes nothing.
    pub async fn add_song_to_playlist(&self, playlist_id: PlaylistId, song_id: SongId) -> Result<()> {
        self.require_user()?;
        let song = {
            let views = self.views.read();
            let playlist = views
                .playlist(playlist_id)
                .ok_or_else(|| Error::not_found("playlist", playlist_id))?;
            if playlist.contains(song_id) {
                tracing::debug!(playlist_id, song_id, "Song already in playlist");
                return Ok(());
            }
            views
                .song(song_id)
                .cloned()
                .ok_or_else(|| Error::not_found("song", song_id))?
        };

        self.store.add_playlist_song(playlist_id, song_id).await?;

        let mut views = self.views.write();
        if let Some(playlist) = views.playlist_mut(playlist_id)
            && !playlist.contains(song_id)
        {
            playlist.songs.push(song);
            playlist.refresh_cover(self.images.default_cover());
        }
        Ok(())
    }

    pub async fn remove_song_from_playlist(
        &self,
        playlist_id: PlaylistId,
        song_id: SongId,
    ) -> Result<()> {
        self.require_user()?;
        self.store.remove_playlist_song(playlist_id, song_id).await?;

        let mut views = self.views.write();
        if let Some(playlist) = views.playlist_mut(playlist_id) {
            playlist.songs.retain(|s| s.id != song_id);
            playlist.refresh_cover(self.images.default_cover());
        }
        Ok(())
    }

    pub fn views(&self) -> Views {
        self.views.read().clone()
    }

    pub fn all_songs(&self) -> Vec<Song> {
        self.views.read().all_songs.clone()
    }

    pub fn personalized_from_history(&self) -> Vec<Song> {
        self.views.read().personalized.clone()
    }

    pub fn trending(&self) -> Vec<Song> {
        self.views.read().trending.clone()
    }

    pub fn last_played_song(&self) -> Option<Song> {
        self.views.read().last_played.clone()
    }

    pub fn playlists(&self) -> Vec<Playlist> {
        self.views.read().playlists.clone()
    }

    pub fn song(&self, song_id: SongId) -> Option<Song> {
        self.views.read().song(song_id).cloned()
    }

    /// Liked songs in catalog order.
    pub fn liked_songs(&self) -> Vec<Song> {
        self.views
            .read()
            .all_songs
            .iter()
            .filter(|s| s.liked)
            .cloned()
            .collect()
    }

    /// Case-insensitive substring match on name or artist.
    pub fn search(&self, query: &str) -> Vec<Song> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.views
            .read()
            .all_songs
            .iter()
            .filter(|s| {
                s.name.to_lowercase().contains(&query) || s.artist.to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    fn require_user(&self) -> Result<UserId> {
        self.user().ok_or(Error::NotSignedIn)
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("playlist name must not be empty"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::session::mocks::{MockSessionProvider, SessionReply};
    use crate::identity::{
        AuthEvent, IdentityResolver, IdentitySource, MemoryIdentityStore, Profile, Session,
    };
    use crate::store::mocks::MemoryStore;
    use crate::test_utils::{abc_catalog, mock_song};
    use std::sync::atomic::Ordering;

    fn personalizer(store: &Arc<MemoryStore>) -> Personalizer {
        Personalizer::new(
            store.clone(),
            ScoringEngine::deterministic(),
            RankingConfig::default(),
            ImageResolver::default(),
        )
    }

    fn identity(id: &str) -> EffectiveIdentity {
        EffectiveIdentity {
            user_id: UserId::new(id),
            profile: Profile::default(),
            source: IdentitySource::Local,
        }
    }

    async fn settle_tasks() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn ids(songs: &[Song]) -> Vec<SongId> {
        songs.iter().map(|s| s.id).collect()
    }

    /// ABC catalog plus a second English rock song by X and a German one.
    fn seeded_store() -> Arc<MemoryStore> {
        let mut catalog = abc_catalog();
        catalog.push(SongRecord {
            views: 40,
            ..mock_song(4, &["rock"], "X", "en")
        });
        catalog.push(SongRecord {
            views: 30,
            ..mock_song(5, &["rock"], "X", "de")
        });
        Arc::new(MemoryStore::with_songs(catalog))
    }

    #[tokio::test]
    async fn test_refresh_all_builds_views() {
        let store = seeded_store();
        let user = UserId::new("u1");
        store.set_history(&user, &[(1, 5.0)]);
        store.like(&user, 2);
        store.set_last_played(&user, 3).await.unwrap();
        let playlist = store.create_playlist(&user, "Mix").await.unwrap();
        store.add_playlist_song(playlist.id, 4).await.unwrap();
        store.add_playlist_song(playlist.id, 2).await.unwrap();

        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();

        // Remote order: most viewed first
        assert_eq!(ids(&p.all_songs()), vec![1, 3, 4, 5, 2]);
        // English only, history song excluded
        assert_eq!(ids(&p.personalized_from_history()), vec![4, 2]);
        assert_eq!(ids(&p.trending()), vec![1, 3, 4, 5, 2]);
        assert_eq!(p.last_played_song().unwrap().id, 3);

        let playlists = p.playlists();
        assert_eq!(playlists.len(), 1);
        assert_eq!(ids(&playlists[0].songs), vec![4, 2]);
        assert_eq!(playlists[0].cover, playlists[0].songs[0].image);
        assert!(playlists[0].songs[1].liked);

        assert_eq!(ids(&p.liked_songs()), vec![2]);
    }

    #[tokio::test]
    async fn test_refresh_failure_resets_views() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();
        assert!(!p.all_songs().is_empty());

        store.set_fail_reads(true);
        p.cache().invalidate();
        let err = p.refresh_all(&user).await.unwrap_err();
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.to_string().contains("refreshing views for u1"));

        let views = p.views();
        assert!(views.all_songs.is_empty());
        assert!(views.trending.is_empty());
        assert!(views.personalized.is_empty());
        assert!(views.last_played.is_none());
        assert!(views.playlists.is_empty());
        assert_eq!(views.user, Some(user));
    }

    #[tokio::test]
    async fn test_seed_example_through_orchestrator() {
        let store = Arc::new(MemoryStore::with_songs(abc_catalog()));
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();

        let seed = p.song(1).unwrap();
        let similar = p.personalized_for_seed(&seed, &HashSet::new()).await.unwrap();
        let names: Vec<&str> = similar.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["SongB"]);
    }

    #[tokio::test]
    async fn test_seed_mode_honours_exclusions_and_history() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();

        let excluded: HashSet<SongId> = [2].into_iter().collect();
        let similar = p.similar_to(1, &excluded).await.unwrap();
        assert_eq!(ids(&similar), vec![4]);

        // History is read fresh on every call
        store.set_history(&user, &[(2, 10.0)]);
        let similar = p.similar_to(1, &HashSet::new()).await.unwrap();
        assert_eq!(ids(&similar), vec![4, 2]);

        assert!(matches!(
            p.similar_to(99, &HashSet::new()).await,
            Err(Error::NotFound { kind: "song", .. })
        ));
    }

    #[tokio::test]
    async fn test_toggle_like_is_involutive() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();
        let before = p.views();

        let first = p.toggle_like(1).await.unwrap();
        assert!(first.liked);
        assert!(first.like_count.is_applied());
        assert!(p.song(1).unwrap().liked);
        assert_eq!(p.song(1).unwrap().likes, 11);
        assert_eq!(store.song(1).unwrap().likes, 11);

        let second = p.toggle_like(1).await.unwrap();
        assert!(!second.liked);
        assert_eq!(p.views(), before);
        assert_eq!(store.song(1).unwrap().likes, 10);
        assert!(!p.cache().get_liked_set(&user).await.unwrap().contains(1));
    }

    #[tokio::test]
    async fn test_toggle_like_failure_leaves_views() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();
        let before = p.views();

        store.set_fail_writes(true);
        assert!(matches!(p.toggle_like(1).await, Err(Error::Store(_))));
        assert_eq!(p.views(), before);
        assert!(!p.cache().get_liked_set(&user).await.unwrap().contains(1));
    }

    #[tokio::test]
    async fn test_like_counter_failure_keeps_local_count() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();

        store.fail_like_counts.store(true, Ordering::SeqCst);
        let outcome = p.toggle_like(1).await.unwrap();
        assert!(outcome.liked);
        assert!(!outcome.like_count.is_applied());

        let song = p.song(1).unwrap();
        assert!(song.liked);
        assert_eq!(song.likes, 10);
        assert_eq!(store.song(1).unwrap().likes, 10);
        assert!(p.cache().get_liked_set(&user).await.unwrap().contains(1));
        let cached = p.cache().get_songs(false).await.unwrap();
        assert_eq!(cached.iter().find(|s| s.id == 1).unwrap().likes, 10);
    }

    #[tokio::test]
    async fn test_follow_tracks_resolver_identity() {
        let store = Arc::new(MemoryStore::with_songs(abc_catalog()));
        let u1 = UserId::new("u1");
        store.like(&u1, 2);
        let provider = Arc::new(MockSessionProvider::new(SessionReply::Session(
            Session::new("u1"),
        )));
        let resolver = IdentityResolver::start(
            provider.clone(),
            Arc::new(MemoryIdentityStore::default()),
            None,
            std::time::Duration::from_secs(8),
        );
        resolver.resolve().await;

        let p = Arc::new(personalizer(&store));
        let follower = p.follow(resolver.subscribe());
        assert_eq!(p.user(), Some(u1.clone()));
        p.refresh_all(&u1).await.unwrap();
        assert_eq!(ids(&p.liked_songs()), vec![2]);
        let seed = p.song(1).unwrap();

        provider.emit(AuthEvent::signed_out());
        settle_tasks().await;
        assert!(p.user().is_none());
        assert!(p.cache().scope().is_none());
        assert!(p.liked_songs().is_empty());
        let similar = p.personalized_for_seed(&seed, &HashSet::new()).await.unwrap();
        assert_eq!(ids(&similar), vec![2]);
        assert!(!similar[0].liked);

        provider.emit(AuthEvent::signed_in(Session::new("u2")));
        settle_tasks().await;
        assert_eq!(p.user(), Some(UserId::new("u2")));
        assert_eq!(p.cache().scope(), Some(UserId::new("u2")));
        assert!(p.all_songs().is_empty());
        p.refresh_all(&UserId::new("u2")).await.unwrap();
        assert!(p.liked_songs().is_empty());

        follower.abort();
    }

    #[tokio::test]
    async fn test_mutations_need_a_user() {
        let store = seeded_store();
        let p = personalizer(&store);
        assert!(matches!(p.toggle_like(1).await, Err(Error::NotSignedIn)));
        assert!(matches!(p.create_playlist("Mix").await, Err(Error::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_playlist_lifecycle() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();

        assert!(matches!(
            p.create_playlist("   ").await,
            Err(Error::InvalidInput(_))
        ));

        let id = p.create_playlist(" Road trip ").await.unwrap();
        let created = p.playlists();
        assert_eq!(created[0].name, "Road trip");
        assert_eq!(created[0].cover, "/images/default-cover.png");

        p.add_song_to_playlist(id, 3).await.unwrap();
        p.add_song_to_playlist(id, 1).await.unwrap();
        // Duplicate add is a no-op
        p.add_song_to_playlist(id, 3).await.unwrap();
        let playlist = p.playlists().remove(0);
        assert_eq!(ids(&playlist.songs), vec![3, 1]);
        assert_eq!(playlist.cover, playlist.songs[0].image);

        p.remove_song_from_playlist(id, 3).await.unwrap();
        assert_eq!(ids(&p.playlists()[0].songs), vec![1]);

        p.rename_playlist(id, "Commute").await.unwrap();
        assert_eq!(p.playlists()[0].name, "Commute");

        // Local state matches a fresh load from the store
        p.refresh_all(&user).await.unwrap();
        assert_eq!(p.playlists()[0].name, "Commute");
        assert_eq!(ids(&p.playlists()[0].songs), vec![1]);

        p.delete_playlist(id).await.unwrap();
        assert!(p.playlists().is_empty());
    }

    #[tokio::test]
    async fn test_playlist_write_failure_keeps_projection() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();
        let id = p.create_playlist("Mix").await.unwrap();

        store.set_fail_writes(true);
        assert!(p.add_song_to_playlist(id, 1).await.is_err());
        assert!(p.rename_playlist(id, "Other").await.is_err());
        assert!(p.delete_playlist(id).await.is_err());
        assert!(p.create_playlist("Second").await.is_err());

        let playlists = p.playlists();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "Mix");
        assert!(playlists[0].songs.is_empty());
    }

    #[tokio::test]
    async fn test_add_to_unknown_playlist_or_song() {
        let store = seeded_store();
        let user = UserId::new("u1");
        let p = personalizer(&store);
        p.refresh_all(&user).await.unwrap();
        let id = p.create_playlist("Mix").await.unwrap();

        assert!(matches!(
            p.add_song_to_playlist(id + 100, 1).await,
            Err(Error::NotFound { kind: "playlist", .. })
        ));
        assert!(matches!(
            p.add_song_to_playlist(id, 99).await,
            Err(Error::NotFound { kind: "song", .. })
        ));
    }

    #[tokio::test]
    async fn test_identity_change_clears_views_and_cache() {
        let store = seeded_store();
        let u1 = UserId::new("u1");
        store.like(&u1, 1);
        let p = personalizer(&store);

        assert!(p.bind_identity(Some(&identity("u1"))));
        p.refresh_all(&u1).await.unwrap();
        assert!(!p.bind_identity(Some(&identity("u1"))));
        assert!(p.song(1).unwrap().liked);

        assert!(p.bind_identity(Some(&identity("u2"))));
        assert!(p.all_songs().is_empty());
        assert_eq!(p.cache().scope(), Some(UserId::new("u2")));

        p.refresh_all(&UserId::new("u2")).await.unwrap();
        assert!(!p.song(1).unwrap().liked);
        assert_eq!(store.song_fetches.load(Ordering::SeqCst), 2);

        assert!(p.bind_identity(None));
        assert!(p.user().is_none());
        assert!(p.all_songs().is_empty());
    }

    #[tokio::test]
    async fn test_search() {
        let store = seeded_store();
        let p = personalizer(&store);
        p.refresh_all(&UserId::new("u1")).await.unwrap();

        assert_eq!(ids(&p.search("songb")), vec![2]);
        assert_eq!(ids(&p.search("z")), vec![3]);
        assert!(p.search("  ").is_empty());
    }
}
