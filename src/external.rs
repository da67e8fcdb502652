//! Stated interfaces for out-of-scope collaborators: the
//! Soulseek daemon, MusicBrainz, and Last.fm. Only the trait surface the
//! core calls into (or is called from) is defined here; real HTTP
//! implementations are out of scope. [`NullLastfmClient`] is a test double
//! so the scrobble pipeline and radio scheduler are fully testable without
//! network access.

use async_trait::async_trait;

use crate::model::PendingScrobble;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExternalError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("not authenticated")]
    NotAuthenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlskdSearchResult {
    pub username: String,
    pub filename: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlskdFile {
    pub filename: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadHandle {
    pub download_id: i64,
}

#[async_trait]
pub trait SlskdClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SlskdSearchResult>, ExternalError>;
    async fn download(
        &self,
        username: &str,
        files: &[SlskdFile],
    ) -> Result<DownloadHandle, ExternalError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseGroup {
    pub mbid: String,
    pub title: String,
    pub primary_type: Option<String>,
}

#[async_trait]
pub trait MusicBrainzClient: Send + Sync {
    async fn lookup_release_group(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Option<ReleaseGroup>, ExternalError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub artist: String,
    pub track: String,
    pub album: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarArtist {
    pub name: String,
    pub match_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopTrack {
    pub title: String,
    pub rank: u32,
    /// Last.fm's global scrobble count for this track, used to compute
    /// the radio scorer's `base` factor (spec.md §4.7).
    pub playcount: u64,
}

#[async_trait]
pub trait LastfmClient: Send + Sync {
    async fn now_playing(&self, session_key: &str, scrobble: &NowPlaying) -> Result<(), ExternalError>;
    async fn scrobble_batch(
        &self,
        session_key: &str,
        batch: &[PendingScrobble],
    ) -> Result<(), ExternalError>;
    async fn similar_artists(
        &self,
        artist: &str,
        limit: u32,
    ) -> Result<Vec<SimilarArtist>, ExternalError>;
    async fn artist_top_tracks(&self, artist: &str) -> Result<Vec<TopTrack>, ExternalError>;
    async fn user_artist_tracks(
        &self,
        username: &str,
        artist: &str,
    ) -> Result<Vec<String>, ExternalError>;
}

/// A `LastfmClient` that always reports "not authenticated", used wherever
/// no real session is configured and in tests exercising the scrobble/radio
/// logic without network access.
pub struct NullLastfmClient;

#[async_trait]
impl LastfmClient for NullLastfmClient {
    async fn now_playing(&self, _session_key: &str, _scrobble: &NowPlaying) -> Result<(), ExternalError> {
        Err(ExternalError::NotAuthenticated)
    }

    async fn scrobble_batch(
        &self,
        _session_key: &str,
        _batch: &[PendingScrobble],
    ) -> Result<(), ExternalError> {
        Err(ExternalError::NotAuthenticated)
    }

    async fn similar_artists(
        &self,
        _artist: &str,
        _limit: u32,
    ) -> Result<Vec<SimilarArtist>, ExternalError> {
        Ok(Vec::new())
    }

    async fn artist_top_tracks(&self, _artist: &str) -> Result<Vec<TopTrack>, ExternalError> {
        Ok(Vec::new())
    }

    async fn user_artist_tracks(
        &self,
        _username: &str,
        _artist: &str,
    ) -> Result<Vec<String>, ExternalError> {
        Ok(Vec::new())
    }
}
