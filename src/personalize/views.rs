//! Derived views published by the [`Personalizer`](super::Personalizer).

use crate::model::{Playlist, PlaylistId, Song, SongId, UserId};

/// Everything a consumer reads after `refresh_all`.
///
/// Views belong to one user. They are replaced wholesale by a refresh and
/// patched in place by mutations that succeeded remotely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Views {
    pub user: Option<UserId>,
    /// Full catalog, most viewed first
    pub all_songs: Vec<Song>,
    /// Ranked against the most-listened history songs
    pub personalized: Vec<Song>,
    pub trending: Vec<Song>,
    pub last_played: Option<Song>,
    pub playlists: Vec<Playlist>,
}

impl Views {
    pub fn for_user(user: Option<UserId>) -> Self {
        Self {
            user,
            ..Default::default()
        }
    }

    /// Drop every view but keep the owner.
    pub fn clear(&mut self) {
        *self = Self::for_user(self.user.take());
    }

    pub fn song(&self, id: SongId) -> Option<&Song> {
        self.all_songs.iter().find(|s| s.id == id)
    }

    pub fn playlist(&self, id: PlaylistId) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    pub fn playlist_mut(&mut self, id: PlaylistId) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find(|p| p.id == id)
    }

    /// Patch every copy of `song_id` after a like toggle.
    pub(crate) fn apply_like(&mut self, song_id: SongId, liked: bool, count_changed: bool) {
        let songs = self
            .all_songs
            .iter_mut()
            .chain(self.personalized.iter_mut())
            .chain(self.trending.iter_mut())
            .chain(self.last_played.iter_mut())
            .chain(self.playlists.iter_mut().flat_map(|p| p.songs.iter_mut()));

        for song in songs.filter(|s| s.id == song_id) {
            song.apply_like(liked, count_changed);
        }
    }
}
