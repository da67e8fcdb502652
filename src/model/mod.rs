//! Core data model.
//!
//! Maps directly onto the tables in spec.md §3: a denormalized
//! `library_tracks` row (no separate artists/albums tables — grouping by
//! artist/album is done at query time in [`crate::library`]), the playing
//! queue, navigation/queue process-wide singletons, playlists, and the
//! Last.fm scrobble/cache rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row in `library_tracks`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub path: String,
    pub mtime: i64,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub title: String,
    pub disc_number: Option<i64>,
    pub track_number: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub label: Option<String>,
    pub original_date: Option<String>,
    pub release_date: Option<String>,
    pub added_at: i64,
    pub updated_at: i64,
}

/// One entry in the playing queue (`queue_tracks`).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QueueEntry {
    pub position: i64,
    pub track_id: Option<i64>,
    pub path: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<i64>,
}

impl QueueEntry {
    pub fn from_track(position: i64, track: &Track) -> Self {
        Self {
            position,
            track_id: Some(track.id),
            path: track.path.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            track_number: track.track_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "one" => RepeatMode::One,
            "all" => RepeatMode::All,
            _ => RepeatMode::Off,
        }
    }
}

/// The single-row (id=1) `queue_state`, plus its ordered `queue_tracks`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueState {
    pub current_index: i64,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    pub tracks: Vec<QueueEntry>,
}

impl QueueState {
    pub fn new() -> Self {
        Self {
            current_index: -1,
            repeat_mode: RepeatMode::Off,
            shuffle: false,
            tracks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    Library,
    File,
    Playlists,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Library => "library",
            ViewMode::File => "file",
            ViewMode::Playlists => "playlists",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "file" => ViewMode::File,
            "playlists" => ViewMode::Playlists,
            _ => ViewMode::Library,
        }
    }
}

/// The single-row (id=1) `navigation_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    pub current_path: String,
    pub selected_name: String,
    pub view_mode: ViewMode,
    pub library_selected_id: Option<String>,
    pub playlists_selected_id: Option<String>,
    pub file_selected_id: Option<String>,
    /// Serialized JSON blob of album-view preset fields.
    pub album_view_presets: String,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            current_path: String::new(),
            selected_name: String::new(),
            view_mode: ViewMode::Library,
            library_selected_id: None,
            playlists_selected_id: None,
            file_selected_id: None,
            album_view_presets: "{}".to_string(),
        }
    }
}

/// A node in the `playlist_folders` DAG.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PlaylistFolder {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
}

/// A playlist; id=1 is the reserved "Favorites" playlist.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub folder_id: Option<i64>,
    pub name: String,
    pub created_at: i64,
}

impl Playlist {
    pub const FAVORITES_ID: i64 = 1;

    pub fn is_favorites(&self) -> bool {
        self.id == Self::FAVORITES_ID
    }
}

/// One track reference inside a playlist, at a contiguous 0-based position.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PlaylistTrack {
    pub playlist_id: i64,
    pub position: i64,
    pub track_id: i64,
}

/// The single-row (id=1) `lastfm_session`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LastfmSession {
    pub username: String,
    pub session_key: String,
    pub linked_at: i64,
}

/// A queued-but-unsent scrobble.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PendingScrobble {
    pub id: i64,
    pub path: String,
    pub artist: String,
    pub track: String,
    pub album: Option<String>,
    pub duration_secs: i64,
    pub started_at: i64,
    pub musicbrainz_recording_id: Option<String>,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
}

/// Row shape shared by the three Last.fm cache tables
/// (`lastfm_similar_artists`, `lastfm_artist_top_tracks`,
/// `lastfm_user_artist_tracks`); each table adds its own payload column,
/// modelled per-table in [`crate::radio::cache`].
pub trait Fetched {
    fn fetched_at(&self) -> i64;

    /// Expired when `fetched_at < now - ttl_days`.
    fn is_expired(&self, now: i64, ttl_days: i64) -> bool {
        self.fetched_at() < now - ttl_days * 86_400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_mode_round_trips_through_its_string_form() {
        for mode in [RepeatMode::Off, RepeatMode::One, RepeatMode::All] {
            assert_eq!(RepeatMode::from_str_lossy(mode.as_str()), mode);
        }
    }

    #[test]
    fn view_mode_round_trips_through_its_string_form() {
        for mode in [ViewMode::Library, ViewMode::File, ViewMode::Playlists] {
            assert_eq!(ViewMode::from_str_lossy(mode.as_str()), mode);
        }
    }

    #[test]
    fn favorites_playlist_is_id_one() {
        let favorites = Playlist {
            id: 1,
            folder_id: None,
            name: "Favorites".into(),
            created_at: 0,
        };
        assert!(favorites.is_favorites());
    }

    struct Row(i64);
    impl Fetched for Row {
        fn fetched_at(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn cache_row_expires_after_ttl() {
        let row = Row(1_000);
        assert!(!row.is_expired(1_000 + 6 * 86_400, 7));
        assert!(row.is_expired(1_000 + 8 * 86_400, 7));
    }
}
