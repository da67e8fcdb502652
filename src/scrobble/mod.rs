//! Last.fm scrobbling: now-playing updates, the 50%-or-240s scrobble
//! threshold, and an offline retry queue for scrobbles that failed to
//! send.

use sqlx::SqlitePool;

use crate::external::{LastfmClient, NowPlaying};
use crate::model::{LastfmSession, PendingScrobble};

#[derive(Debug, thiserror::Error)]
pub enum ScrobbleError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("external service error: {0}")]
    External(#[from] crate::external::ExternalError),

    #[error("not authenticated with Last.fm")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, ScrobbleError>;

/// Tracks aren't scrobbled if shorter than this, regardless of how much
/// of them played.
const MIN_SCROBBLE_DURATION_SECS: i64 = 30;

/// A scrobble fires at 50% of the track or this many seconds in,
/// whichever comes first.
const SCROBBLE_THRESHOLD_SECS: i64 = 240;

const MAX_ATTEMPTS: i64 = 10;
const RETRY_BATCH_SIZE: i64 = 50;

/// The one "is the currently-playing track eligible for a scrobble yet"
/// state machine; one instance lives for the process, reset whenever a
/// new track starts.
#[derive(Debug, Clone, Default)]
pub struct ScrobbleTracker {
    path: Option<String>,
    started_at: i64,
    duration_secs: i64,
    scrobbled: bool,
}

impl ScrobbleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call when a new track starts playing. `started_at` is a unix
    /// timestamp; exactly one scrobble is ever recorded per
    /// `(path, started_at)` pair.
    pub fn start_track(&mut self, path: &str, started_at: i64, duration_secs: i64) {
        self.path = Some(path.to_string());
        self.started_at = started_at;
        self.duration_secs = duration_secs;
        self.scrobbled = false;
    }

    pub fn clear(&mut self) {
        self.path = None;
        self.scrobbled = false;
    }

    /// True exactly once per track: the first poll after the threshold
    /// is crossed. Subsequent polls (even past the threshold) return
    /// false until the next `start_track`.
    pub fn poll(&mut self, path: &str, position_secs: i64) -> bool {
        if self.scrobbled || self.path.as_deref() != Some(path) {
            return false;
        }
        if !is_scrobble_eligible(position_secs, self.duration_secs) {
            return false;
        }
        self.scrobbled = true;
        true
    }
}

/// `duration < 30s` tracks never scrobble; otherwise the threshold is
/// `min(240s, 50% of duration)`.
fn is_scrobble_eligible(position_secs: i64, duration_secs: i64) -> bool {
    if duration_secs < MIN_SCROBBLE_DURATION_SECS {
        return false;
    }
    let threshold = SCROBBLE_THRESHOLD_SECS.min(duration_secs / 2);
    position_secs >= threshold
}

/// Loads the single-row Last.fm session, if the user has linked one.
pub async fn load_session(pool: &SqlitePool) -> Result<Option<LastfmSession>> {
    Ok(sqlx::query_as("SELECT username, session_key, linked_at FROM lastfm_session WHERE id = 1")
        .fetch_optional(pool)
        .await?)
}

/// Sends a now-playing update; authentication failures are swallowed
/// (the caller just didn't link Last.fm) but any other error propagates.
pub async fn send_now_playing(client: &dyn LastfmClient, session_key: &str, track: &NowPlaying) -> Result<()> {
    match client.now_playing(session_key, track).await {
        Ok(()) => Ok(()),
        Err(crate::external::ExternalError::NotAuthenticated) => Err(ScrobbleError::NotAuthenticated),
        Err(e) => Err(e.into()),
    }
}

/// Attempts to scrobble immediately; on any failure (including no
/// session) the scrobble is queued in `pending_scrobbles` for later retry.
pub async fn scrobble_or_enqueue(
    pool: &SqlitePool,
    client: Option<(&dyn LastfmClient, &str)>,
    scrobble: PendingScrobble,
) -> Result<()> {
    if let Some((client, session_key)) = client
        && client.scrobble_batch(session_key, std::slice::from_ref(&scrobble)).await.is_ok()
    {
        return Ok(());
    }
    enqueue_pending(pool, &scrobble).await
}

async fn enqueue_pending(pool: &SqlitePool, scrobble: &PendingScrobble) -> Result<()> {
    sqlx::query(
        "INSERT INTO pending_scrobbles \
         (path, artist, track, album, duration_secs, started_at, musicbrainz_recording_id, attempts, last_error, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)",
    )
    .bind(&scrobble.path)
    .bind(&scrobble.artist)
    .bind(&scrobble.track)
    .bind(&scrobble.album)
    .bind(scrobble.duration_secs)
    .bind(scrobble.started_at)
    .bind(&scrobble.musicbrainz_recording_id)
    .bind(scrobble.started_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Outcome of one [`retry_pending`] pass, for the UI's status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    pub sent: usize,
    pub dropped: usize,
    pub remaining: usize,
}

/// Retries up to [`RETRY_BATCH_SIZE`] pending scrobbles, oldest first.
/// A scrobble that fails for the [`MAX_ATTEMPTS`]th time is dropped
/// rather than retried forever; everything else stays queued with its
/// attempt count and last error bumped.
pub async fn retry_pending(
    pool: &SqlitePool,
    client: &dyn LastfmClient,
    session_key: &str,
) -> Result<RetryOutcome> {
    let batch: Vec<PendingScrobble> = sqlx::query_as(
        "SELECT * FROM pending_scrobbles ORDER BY created_at ASC LIMIT ?",
    )
    .bind(RETRY_BATCH_SIZE)
    .fetch_all(pool)
    .await?;

    if batch.is_empty() {
        return Ok(RetryOutcome::default());
    }

    let mut outcome = RetryOutcome::default();
    match client.scrobble_batch(session_key, &batch).await {
        Ok(()) => {
            let ids: Vec<i64> = batch.iter().map(|s| s.id).collect();
            delete_pending(pool, &ids).await?;
            outcome.sent = ids.len();
        }
        Err(e) => {
            for scrobble in &batch {
                let attempts = scrobble.attempts + 1;
                if attempts >= MAX_ATTEMPTS {
                    delete_pending(pool, &[scrobble.id]).await?;
                    outcome.dropped += 1;
                } else {
                    sqlx::query("UPDATE pending_scrobbles SET attempts = ?, last_error = ? WHERE id = ?")
                        .bind(attempts)
                        .bind(e.to_string())
                        .bind(scrobble.id)
                        .execute(pool)
                        .await?;
                }
            }
        }
    }

    let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_scrobbles").fetch_one(pool).await?;
    outcome.remaining = remaining as usize;
    Ok(outcome)
}

async fn delete_pending(pool: &SqlitePool, ids: &[i64]) -> Result<()> {
    for id in ids {
        sqlx::query("DELETE FROM pending_scrobbles WHERE id = ?").bind(id).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use async_trait::async_trait;
    use crate::external::{ExternalError, SimilarArtist, TopTrack};
    use std::sync::Mutex;

    #[test]
    fn short_tracks_never_scrobble() {
        assert!(!is_scrobble_eligible(29, 29));
        assert!(!is_scrobble_eligible(1000, 20));
    }

    #[test]
    fn long_track_scrobbles_at_240_seconds_not_half() {
        assert!(!is_scrobble_eligible(239, 1000));
        assert!(is_scrobble_eligible(240, 1000));
    }

    #[test]
    fn short_long_track_scrobbles_at_half_duration() {
        assert!(!is_scrobble_eligible(99, 200));
        assert!(is_scrobble_eligible(100, 200));
    }

    #[test]
    fn tracker_fires_exactly_once_per_track() {
        let mut tracker = ScrobbleTracker::new();
        tracker.start_track("/song.mp3", 1_000, 1_000);
        assert!(!tracker.poll("/song.mp3", 10));
        assert!(tracker.poll("/song.mp3", 240));
        assert!(!tracker.poll("/song.mp3", 500));
    }

    struct FailingClient;

    #[async_trait]
    impl LastfmClient for FailingClient {
        async fn now_playing(&self, _: &str, _: &NowPlaying) -> std::result::Result<(), ExternalError> {
            unimplemented!()
        }
        async fn scrobble_batch(&self, _: &str, _: &[PendingScrobble]) -> std::result::Result<(), ExternalError> {
            Err(ExternalError::Request("offline".into()))
        }
        async fn similar_artists(&self, _: &str, _: u32) -> std::result::Result<Vec<SimilarArtist>, ExternalError> {
            Ok(Vec::new())
        }
        async fn artist_top_tracks(&self, _: &str) -> std::result::Result<Vec<TopTrack>, ExternalError> {
            Ok(Vec::new())
        }
        async fn user_artist_tracks(&self, _: &str, _: &str) -> std::result::Result<Vec<String>, ExternalError> {
            Ok(Vec::new())
        }
    }

    struct SucceedingClient {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LastfmClient for SucceedingClient {
        async fn now_playing(&self, _: &str, _: &NowPlaying) -> std::result::Result<(), ExternalError> {
            unimplemented!()
        }
        async fn scrobble_batch(&self, _: &str, _: &[PendingScrobble]) -> std::result::Result<(), ExternalError> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }
        async fn similar_artists(&self, _: &str, _: u32) -> std::result::Result<Vec<SimilarArtist>, ExternalError> {
            Ok(Vec::new())
        }
        async fn artist_top_tracks(&self, _: &str) -> std::result::Result<Vec<TopTrack>, ExternalError> {
            Ok(Vec::new())
        }
        async fn user_artist_tracks(&self, _: &str, _: &str) -> std::result::Result<Vec<String>, ExternalError> {
            Ok(Vec::new())
        }
    }

    fn sample_scrobble() -> PendingScrobble {
        PendingScrobble {
            id: 0,
            path: "/song.mp3".into(),
            artist: "Artist".into(),
            track: "Track".into(),
            album: None,
            duration_secs: 200,
            started_at: 1_000,
            musicbrainz_recording_id: None,
            attempts: 0,
            last_error: None,
            created_at: 1_000,
        }
    }

    /// Seed test: "Scrobble pending retry success" — a scrobble queued
    /// while offline is sent and removed from the queue on the next
    /// successful retry.
    #[tokio::test]
    async fn load_session_is_none_until_one_is_linked() {
        let pool = test_pool().await;
        assert!(load_session(&pool).await.unwrap().is_none());

        sqlx::query("INSERT INTO lastfm_session (id, username, session_key, linked_at) VALUES (1, ?, ?, ?)")
            .bind("alice")
            .bind("sk-1")
            .bind(1_000_i64)
            .execute(&pool)
            .await
            .unwrap();

        let session = load_session(&pool).await.unwrap().expect("session should be present");
        assert_eq!(session.username, "alice");
        assert_eq!(session.session_key, "sk-1");
    }

    #[tokio::test]
    async fn pending_scrobble_is_sent_and_removed_on_successful_retry() {
        let pool = test_pool().await;
        enqueue_pending(&pool, &sample_scrobble()).await.unwrap();

        let client = SucceedingClient { calls: Mutex::new(0) };
        let outcome = retry_pending(&pool, &client, "session-key").await.unwrap();
        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.remaining, 0);
        assert_eq!(*client.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_retry_increments_attempts_and_keeps_the_scrobble_queued() {
        let pool = test_pool().await;
        enqueue_pending(&pool, &sample_scrobble()).await.unwrap();

        let client = FailingClient;
        let outcome = retry_pending(&pool, &client, "session-key").await.unwrap();
        assert_eq!(outcome.remaining, 1);

        let (attempts,): (i64,) = sqlx::query_as("SELECT attempts FROM pending_scrobbles").fetch_one(&pool).await.unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn scrobble_dropped_after_max_attempts_exceeded() {
        let pool = test_pool().await;
        let mut scrobble = sample_scrobble();
        scrobble.attempts = MAX_ATTEMPTS - 1;
        sqlx::query(
            "INSERT INTO pending_scrobbles \
             (path, artist, track, album, duration_secs, started_at, musicbrainz_recording_id, attempts, last_error, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
        )
        .bind(&scrobble.path)
        .bind(&scrobble.artist)
        .bind(&scrobble.track)
        .bind(&scrobble.album)
        .bind(scrobble.duration_secs)
        .bind(scrobble.started_at)
        .bind(&scrobble.musicbrainz_recording_id)
        .bind(scrobble.attempts)
        .bind(scrobble.created_at)
        .execute(&pool)
        .await
        .unwrap();

        let client = FailingClient;
        let outcome = retry_pending(&pool, &client, "session-key").await.unwrap();
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.remaining, 0);
    }
}
