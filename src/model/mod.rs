//! Core data models for the catalog and a listener's interactions.
//!
//! Defines the primary entities: [`SongRecord`] (as stored), [`Song`] (as
//! shown to one viewer), [`LikedSet`], [`HistoryEntry`] and [`Playlist`].
//!
//! # Store Collections
//!
//! The models map to the following remote collections:
//! - `songs` - Catalog records with view and like counters
//! - `liked_songs` - (user, song) like pairs
//! - `history` - Cumulative minutes listened per (user, song)
//! - `users` - Profile and last-played pointer
//! - `playlists` / `playlist_songs` - User playlists and their entries

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Numeric catalog id of a song.
pub type SongId = i64;

/// Numeric id of a playlist.
pub type PlaylistId = i64;

/// Free-text tags attached to a song. Most songs carry only a handful.
pub type Tags = SmallVec<[String; 4]>;

/// Opaque user id shared by the session provider and the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A catalog record exactly as the store returns it.
///
/// Carries no viewer-specific data; see [`SongRecord::materialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: SongId,
    pub name: String,
    pub artist: String,
    pub language: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
}

impl SongRecord {
    /// Build the per-viewer [`Song`] value.
    ///
    /// The `liked` flag is a snapshot of the viewer's liked set at this moment.
    pub fn materialize(&self, liked: bool, images: &ImageResolver) -> Song {
        Song {
            id: self.id,
            name: self.name.clone(),
            artist: self.artist.clone(),
            language: self.language.clone(),
            tags: self.tags.clone(),
            views: self.views,
            likes: self.likes,
            image: images.song_image(self),
            liked,
        }
    }
}

/// A song as presented to one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub id: SongId,
    pub name: String,
    pub artist: String,
    pub language: String,
    pub tags: Tags,
    pub views: u64,
    pub likes: u64,
    /// Derived image reference
    pub image: String,
    /// Whether the viewer liked this song when it was materialized
    pub liked: bool,
}

impl Song {
    /// Whether `tag` appears on this song, ignoring case and surrounding whitespace.
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.tags.iter().any(|t| normalize_tag(t) == tag)
    }

    /// Popularity used by the trending view.
    pub fn popularity(&self) -> u64 {
        self.views.saturating_add(self.likes)
    }

    /// Apply a like toggle to this snapshot. The like counter only moves
    /// when `count_changed`, i.e. the remote counter was updated too.
    pub(crate) fn apply_like(&mut self, liked: bool, count_changed: bool) {
        if self.liked == liked {
            return;
        }
        self.liked = liked;
        if !count_changed {
            return;
        }
        self.likes = if liked {
            self.likes.saturating_add(1)
        } else {
            self.likes.saturating_sub(1)
        };
    }
}

/// Tag comparison key.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Song ids liked by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikedSet {
    pub user: UserId,
    pub ids: HashSet<SongId>,
}

impl LikedSet {
    pub fn new(user: UserId, ids: impl IntoIterator<Item = SongId>) -> Self {
        Self {
            user,
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, song_id: SongId) -> bool {
        self.ids.contains(&song_id)
    }
}

/// Cumulative listening time for one (user, song) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub song_id: SongId,
    pub minutes: f64,
}

/// A user row: profile plus last-played pointer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_song_id: Option<SongId>,
}

/// A playlist as stored: entries are song ids in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub id: PlaylistId,
    pub name: String,
    pub song_ids: Vec<SongId>,
}

/// A playlist with its songs materialized for one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub songs: Vec<Song>,
    pub cover: String,
}

impl Playlist {
    /// Build a playlist, deriving its cover from the first song.
    pub fn new(id: PlaylistId, name: String, songs: Vec<Song>, default_cover: &str) -> Self {
        let cover = songs
            .first()
            .map(|s| s.image.clone())
            .unwrap_or_else(|| default_cover.to_string());
        Self {
            id,
            name,
            songs,
            cover,
        }
    }

    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    pub fn contains(&self, song_id: SongId) -> bool {
        self.songs.iter().any(|s| s.id == song_id)
    }

    /// Re-derive the cover after the song list changed.
    pub(crate) fn refresh_cover(&mut self, default_cover: &str) {
        self.cover = self
            .songs
            .first()
            .map(|s| s.image.clone())
            .unwrap_or_else(|| default_cover.to_string());
    }
}

/// Derives image references for songs and playlists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResolver {
    base_url: String,
    default_cover: String,
}

impl ImageResolver {
    pub fn new(base_url: impl Into<String>, default_cover: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_cover: default_cover.into(),
        }
    }

    /// `{base}/{slug}.jpg` where the slug is the lowercased name with
    /// non-alphanumerics collapsed to single dashes.
    pub fn song_image(&self, song: &SongRecord) -> String {
        let mut slug = String::with_capacity(song.name.len());
        for c in song.name.chars() {
            if c.is_alphanumeric() {
                slug.extend(c.to_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() {
            song.id.to_string()
        } else {
            slug.to_string()
        };
        format!("{}/{}.jpg", self.base_url.trim_end_matches('/'), slug)
    }

    pub fn default_cover(&self) -> &str {
        &self.default_cover
    }
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self::new("/images/songs", "/images/default-cover.png")
    }
}

/// A song paired with its ranking score. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub song: Song,
    pub score: f64,
}
