//! Radio: similarity-driven autoplay that keeps the queue topped up once
//! the user runs out of manually queued tracks.
//!
//! [`fill`] is the whole scheduler in one call: resolve a seed artist,
//! find similar artists in the Last.fm graph (cached), fuzzy-match them
//! onto the local library, score every candidate track, and weighted-pick
//! without replacement. Nothing here talks to cpal or the queue directly —
//! the caller splices the returned paths into [`crate::queue::Queue`].

pub mod cache;
pub mod fuzzy;

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng;
use rand::seq::SliceRandom;
use sqlx::SqlitePool;

use crate::config::RadioConfig;
use crate::external::LastfmClient;
use crate::model::{PlaylistTrack, Track};

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("external service error: {0}")]
    External(#[from] crate::external::ExternalError),
}

pub type Result<T> = std::result::Result<T, RadioError>;

/// The radio scheduler's cross-fill memory: which seed is
/// active, what's played recently (for decay scoring and repeat-window
/// enforcement), and which seeds to avoid repeating immediately.
#[derive(Debug, Default)]
struct Inner {
    enabled: bool,
    current_seed: Option<String>,
    recently_played: Vec<String>,
    recent_artists: Vec<String>,
    recent_seeds: Vec<String>,
}

pub struct RadioState {
    inner: Mutex<Inner>,
}

impl Default for RadioState {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioState {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().enabled = enabled;
    }

    pub fn current_seed(&self) -> Option<String> {
        self.inner.lock().current_seed.clone()
    }

    pub fn set_current_seed(&self, seed: Option<String>) {
        self.inner.lock().current_seed = seed;
    }

    /// Records a track that just started playing, for decay scoring and
    /// the reverse-chronological seed fallback.
    pub fn record_played(&self, path: &str, artist: Option<&str>, window: i64) {
        let mut inner = self.inner.lock();
        inner.recently_played.retain(|p| p != path);
        inner.recently_played.push(path.to_string());
        let keep_from = inner.recently_played.len().saturating_sub(window.max(1) as usize);
        inner.recently_played.drain(..keep_from);

        if let Some(artist) = artist {
            inner.recent_artists.retain(|a| a != artist);
            inner.recent_artists.push(artist.to_string());
            let keep_from = inner.recent_artists.len().saturating_sub(window.max(1) as usize);
            inner.recent_artists.drain(..keep_from);
        }
    }

    fn push_recent_seed(&self, artist: &str, window: i64) {
        let mut inner = self.inner.lock();
        inner.recent_seeds.retain(|a| a != artist);
        inner.recent_seeds.push(artist.to_string());
        let keep_from = inner.recent_seeds.len().saturating_sub(window.max(1) as usize);
        inner.recent_seeds.drain(..keep_from);
    }

    fn recent_seeds(&self) -> Vec<String> {
        self.inner.lock().recent_seeds.clone()
    }

    fn recently_played_reverse(&self) -> Vec<String> {
        let mut v = self.inner.lock().recently_played.clone();
        v.reverse();
        v
    }

    fn recent_artist_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for artist in &self.inner.lock().recent_artists {
            *counts.entry(artist.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Outcome of a [`fill`] call.
#[derive(Debug, Clone, Default)]
pub struct FillResult {
    pub tracks: Vec<Track>,
    pub message: Option<String>,
}

/// Bound on how many seeds from `RecentlyPlayed` are tried (in reverse
/// chronological order) before giving up when the primary seed yields
/// nothing playable.
const MAX_FALLBACK_ATTEMPTS: usize = 5;

/// `Fill()`: top up the queue with up to `RadioConfig.buffer_size` tracks
/// related to the current (or most recently played) artist.
///
/// Runs the full spec.md §4.7 pipeline: resolve a seed, fetch similar
/// artists (cached), fuzzy-match onto the local library, fetch each
/// candidate artist's top tracks and the user's own scrobbles for it
/// (both cached), score every track, and weighted-pick without
/// replacement. Falls back to earlier seeds in `RecentlyPlayed` if the
/// current one produces nothing; returns an explanatory message rather
/// than an error when the whole pipeline comes up empty.
pub async fn fill(
    pool: &SqlitePool,
    client: &dyn LastfmClient,
    state: &RadioState,
    config: &RadioConfig,
    username: Option<&str>,
) -> Result<FillResult> {
    let mut seeds: Vec<String> = Vec::new();
    if let Some(seed) = state.current_seed() {
        seeds.push(seed);
    }
    seeds.extend(state.recently_played_reverse());
    seeds.dedup();

    for seed in seeds.into_iter().take(MAX_FALLBACK_ATTEMPTS) {
        let result = fill_from_seed(pool, client, state, config, username, &seed).await?;
        if !result.tracks.is_empty() {
            return Ok(result);
        }
    }

    Ok(FillResult { tracks: Vec::new(), message: Some("No related tracks found".to_string()) })
}

async fn fill_from_seed(
    pool: &SqlitePool,
    client: &dyn LastfmClient,
    state: &RadioState,
    config: &RadioConfig,
    username: Option<&str>,
    seed: &str,
) -> Result<FillResult> {
    // Step 1: similar artists for the seed, cached.
    let similar =
        cache::similar_artists(pool, client, seed, config.similar_artists_limit as u32, config.cache_ttl_days)
            .await?;
    if similar.is_empty() {
        return Ok(FillResult::default());
    }

    // Step 2: fuzzy-match each candidate name onto the local library,
    // dropping anything below threshold or already a recent seed.
    let library_artists = crate::library::artists(pool).await.map_err(|e| RadioError::Database(sqlx_err(e)))?;
    let recent_seeds = state.recent_seeds();

    let mut matched: Vec<(String, f64)> = similar
        .iter()
        .filter_map(|candidate| {
            fuzzy::best_match(&candidate.name, &library_artists, config.artist_match_threshold)
                .map(|(name, score)| (name.clone(), score * candidate.match_score.max(config.min_similarity_weight)))
        })
        .filter(|(name, _)| !recent_seeds.contains(name))
        .collect();
    if matched.is_empty() {
        return Ok(FillResult::default());
    }

    // Step 3: take the top ShufflePoolSize by score, shuffle, keep
    // ArtistsPerFill.
    matched.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    matched.truncate(config.shuffle_pool_size as usize);
    matched.shuffle(&mut rand::rng());
    matched.truncate(config.artists_per_fill as usize);

    if matched.is_empty() {
        return Ok(FillResult::default());
    }

    // Step 4: for each chosen artist, fetch its top tracks and (if
    // authenticated) the user's own scrobbles for it, both cached, plus
    // the library tracks that actually exist for it.
    let mut candidates: Vec<(Track, f64, String)> = Vec::new();
    let recent_counts = state.recent_artist_counts();

    for (artist, similarity_weight) in &matched {
        let tracks = crate::library::artist_tracks(pool, artist).await.map_err(|e| RadioError::Database(sqlx_err(e)))?;
        if tracks.is_empty() {
            continue;
        }

        if *recent_counts.get(artist).unwrap_or(&0) >= config.max_artist_repeat as usize {
            continue;
        }

        let top_tracks = cache::artist_top_tracks(pool, client, artist, config.cache_ttl_days).await?;
        let top_rank: HashMap<String, u32> =
            top_tracks.iter().map(|t| (t.title.to_lowercase(), t.rank)).collect();
        let top_playcount: HashMap<String, u64> =
            top_tracks.iter().map(|t| (t.title.to_lowercase(), t.playcount)).collect();

        let user_tracks = match username {
            Some(username) => {
                cache::user_artist_tracks(pool, client, username, artist, config.cache_ttl_days).await?
            }
            None => Vec::new(),
        };
        let user_titles: Vec<String> = user_tracks.iter().map(|t| t.to_lowercase()).collect();

        let is_favorite = favorite_track_ids(pool).await?;

        for track in tracks {
            let title_lower = track.title.to_lowercase();
            let global_playcount = top_playcount.get(&title_lower).copied().unwrap_or(0);
            let mut score = (global_playcount as f64 / 10_000_000.0).clamp(0.01, 1.0);
            if let Some(&rank) = top_rank.get(&title_lower) {
                score *= 1.0 + config.top_track_boost / rank.max(1) as f64;
            }
            let favorite = is_favorite.contains(&track.id);
            if favorite {
                score *= config.favorite_boost;
            }
            // userBoost is suppressed when the track is already a favorite.
            if !favorite && user_titles.contains(&title_lower) {
                score *= config.user_boost;
            }
            score *= decay_penalty(&state.recently_played_reverse(), &track.path, config.decay_factor);
            score *= similarity_weight.max(config.min_similarity_weight);
            candidates.push((track, score, artist.clone()));
        }
    }

    if candidates.is_empty() {
        return Ok(FillResult::default());
    }

    let picked = weighted_pick_without_replacement(
        candidates,
        config.buffer_size.max(1) as usize,
        config.max_artist_repeat.max(0) as usize,
        &recent_counts,
    );
    if let Some(artist) = matched.first().map(|(a, _)| a.clone()) {
        state.push_recent_seed(&artist, config.recent_seeds_window);
    }

    Ok(FillResult { tracks: picked, message: None })
}

fn sqlx_err(e: crate::library::LibraryError) -> sqlx::Error {
    match e {
        crate::library::LibraryError::Database(err) => err,
        crate::library::LibraryError::TagRead { .. } => sqlx::Error::RowNotFound,
    }
}

async fn favorite_track_ids(pool: &SqlitePool) -> Result<Vec<i64>> {
    let rows: Vec<PlaylistTrack> =
        sqlx::query_as("SELECT * FROM playlist_tracks WHERE playlist_id = 1").fetch_all(pool).await?;
    Ok(rows.into_iter().map(|row| row.track_id).collect())
}

/// Penalises tracks played recently: a flat `decay_factor` if `path` is
/// anywhere in `recently_played_reverse`, otherwise 1.0 (no penalty).
fn decay_penalty(recently_played_reverse: &[String], path: &str, decay_factor: f64) -> f64 {
    if recently_played_reverse.iter().any(|p| p == path) { decay_factor } else { 1.0 }
}

/// Samples `count` tracks from `candidates` without replacement,
/// probability proportional to score, enforcing `max_artist_repeat` within
/// the combined recent-history + this-fill window (spec.md §4.7 step 7):
/// `recent_counts` seeds each artist's running total, and a draw that would
/// push an artist over the cap is discarded rather than picked.
fn weighted_pick_without_replacement(
    mut candidates: Vec<(Track, f64, String)>,
    count: usize,
    max_artist_repeat: usize,
    recent_counts: &HashMap<String, usize>,
) -> Vec<Track> {
    let mut picked = Vec::with_capacity(count.min(candidates.len()));
    let mut rng = rand::rng();
    let mut artist_counts = recent_counts.clone();

    while !candidates.is_empty() && picked.len() < count {
        let total: f64 = candidates.iter().map(|(_, score, _)| score.max(0.0)).sum();
        let chosen = if total <= 0.0 {
            rng.random_range(0..candidates.len())
        } else {
            let mut roll = rng.random::<f64>() * total;
            let mut chosen = candidates.len() - 1;
            for (i, (_, score, _)) in candidates.iter().enumerate() {
                roll -= score.max(0.0);
                if roll <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        let (track, _, artist) = candidates.remove(chosen);
        let seen = artist_counts.entry(artist).or_insert(0);
        if *seen >= max_artist_repeat {
            continue;
        }
        *seen += 1;
        picked.push(track);
    }

    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::external::{ExternalError, NowPlaying, SimilarArtist, TopTrack};
    use crate::model::PendingScrobble;
    use async_trait::async_trait;

    struct NoMatchesClient;

    #[async_trait]
    impl LastfmClient for NoMatchesClient {
        async fn now_playing(&self, _: &str, _: &NowPlaying) -> std::result::Result<(), ExternalError> {
            unimplemented!()
        }
        async fn scrobble_batch(&self, _: &str, _: &[PendingScrobble]) -> std::result::Result<(), ExternalError> {
            unimplemented!()
        }
        async fn similar_artists(
            &self,
            _artist: &str,
            _limit: u32,
        ) -> std::result::Result<Vec<SimilarArtist>, ExternalError> {
            Ok(vec![
                SimilarArtist { name: "Gamma".into(), match_score: 0.9 },
                SimilarArtist { name: "Delta".into(), match_score: 0.8 },
            ])
        }
        async fn artist_top_tracks(&self, _: &str) -> std::result::Result<Vec<TopTrack>, ExternalError> {
            Ok(Vec::new())
        }
        async fn user_artist_tracks(&self, _: &str, _: &str) -> std::result::Result<Vec<String>, ExternalError> {
            Ok(Vec::new())
        }
    }

    async fn insert_track(pool: &SqlitePool, artist: &str, title: &str) -> i64 {
        sqlx::query(
            "INSERT INTO library_tracks (path, mtime, artist, album_artist, title, added_at, updated_at) \
             VALUES (?, 0, ?, ?, ?, 0, 0)",
        )
        .bind(format!("/music/{artist}/{title}.mp3"))
        .bind(artist)
        .bind(artist)
        .bind(title)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    /// Seed test: "Radio no matches" — similar artists returned by
    /// Last.fm ("Gamma", "Delta") don't fuzzy-match anything in a
    /// single-artist library ("Alpha"), so fill falls back to nothing
    /// and reports the explanatory message rather than tracks.
    #[tokio::test]
    async fn fill_reports_no_related_tracks_when_nothing_matches() {
        let pool = test_pool().await;
        insert_track(&pool, "Alpha", "Song").await;

        let state = RadioState::new();
        state.set_current_seed(Some("Beta".to_string()));
        let config = RadioConfig::default();
        let client = NoMatchesClient;

        let result = fill(&pool, &client, &state, &config, None).await.unwrap();
        assert!(result.tracks.is_empty());
        assert_eq!(result.message.as_deref(), Some("No related tracks found"));
    }

    #[test]
    fn decay_penalty_never_reaches_zero() {
        let recent = vec!["/a.mp3".to_string(), "/b.mp3".to_string(), "/c.mp3".to_string()];
        let penalty = decay_penalty(&recent, "/c.mp3", 0.5);
        assert!(penalty > 0.0);
    }

    #[test]
    fn unplayed_track_keeps_full_weight() {
        let recent = vec!["/a.mp3".to_string()];
        assert_eq!(decay_penalty(&recent, "/unplayed.mp3", 0.1), 1.0);
    }

    fn test_track(i: i64, artist: &str) -> Track {
        Track {
            id: i,
            path: format!("/t{i}.mp3"),
            mtime: 0,
            artist: Some(artist.to_string()),
            album_artist: Some(artist.to_string()),
            album: None,
            title: format!("Track {i}"),
            disc_number: None,
            track_number: None,
            year: None,
            genre: None,
            label: None,
            original_date: None,
            release_date: None,
            added_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn weighted_pick_never_exceeds_the_requested_count() {
        let candidates: Vec<(Track, f64, String)> =
            (0..10).map(|i| (test_track(i, &format!("Artist {i}")), 1.0, format!("Artist {i}"))).collect();
        let picked = weighted_pick_without_replacement(candidates, 3, usize::MAX, &HashMap::new());
        assert_eq!(picked.len(), 3);
        let mut ids: Vec<i64> = picked.iter().map(|t| t.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3, "picks must be distinct (no replacement)");
    }

    /// spec.md §8: "No fill may produce more than MaxArtistRepeat entries
    /// per artist within the repeat window" — ten same-artist candidates,
    /// capped at 2, must yield at most 2 picks even though the requested
    /// count (10) would otherwise be satisfiable.
    #[test]
    fn weighted_pick_enforces_the_per_artist_cap_within_one_fill() {
        let candidates: Vec<(Track, f64, String)> =
            (0..10).map(|i| (test_track(i, "Same Artist"), 1.0, "Same Artist".to_string())).collect();
        let picked = weighted_pick_without_replacement(candidates, 10, 2, &HashMap::new());
        assert_eq!(picked.len(), 2);
    }

    /// A prior fill already used up the artist's repeat budget via
    /// `recent_counts`; this fill must not add any more of that artist.
    #[test]
    fn weighted_pick_honors_recent_counts_seeded_from_history() {
        let candidates: Vec<(Track, f64, String)> =
            (0..5).map(|i| (test_track(i, "Same Artist"), 1.0, "Same Artist".to_string())).collect();
        let mut recent_counts = HashMap::new();
        recent_counts.insert("Same Artist".to_string(), 2);
        let picked = weighted_pick_without_replacement(candidates, 5, 2, &recent_counts);
        assert!(picked.is_empty());
    }
}
