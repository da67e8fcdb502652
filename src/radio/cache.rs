//! TTL-cached mirrors of the three Last.fm lookups the fill algorithm
//! needs.

use sqlx::SqlitePool;

use crate::external::{LastfmClient, SimilarArtist, TopTrack};
use crate::model::Fetched;

use super::RadioError;

struct Row {
    fetched_at: i64,
}
impl Fetched for Row {
    fn fetched_at(&self) -> i64 {
        self.fetched_at
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Cached similar-artists for `seed`, fetching from Last.fm on a miss or
/// expiry.
pub async fn similar_artists(
    pool: &SqlitePool,
    client: &dyn LastfmClient,
    seed: &str,
    limit: u32,
    ttl_days: i64,
) -> Result<Vec<SimilarArtist>, RadioError> {
    let rows: Vec<(String, f64, i64)> = sqlx::query_as(
        "SELECT similar_artist, match_score, fetched_at FROM lastfm_similar_artists \
         WHERE seed_artist = ? ORDER BY match_score DESC",
    )
    .bind(seed)
    .fetch_all(pool)
    .await?;

    let fresh = rows.first().map(|(_, _, fetched_at)| {
        !(Row { fetched_at: *fetched_at }).is_expired(now(), ttl_days)
    });

    if fresh == Some(true) {
        return Ok(rows
            .into_iter()
            .map(|(name, match_score, _)| SimilarArtist { name, match_score })
            .collect());
    }

    let fetched = client
        .similar_artists(seed, limit)
        .await
        .map_err(RadioError::External)?;

    let ts = now();
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM lastfm_similar_artists WHERE seed_artist = ?")
        .bind(seed)
        .execute(&mut *tx)
        .await?;
    for artist in &fetched {
        sqlx::query(
            "INSERT OR REPLACE INTO lastfm_similar_artists \
             (seed_artist, similar_artist, match_score, fetched_at) VALUES (?, ?, ?, ?)",
        )
        .bind(seed)
        .bind(&artist.name)
        .bind(artist.match_score)
        .bind(ts)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(fetched)
}

/// Cached top tracks for `artist`.
pub async fn artist_top_tracks(
    pool: &SqlitePool,
    client: &dyn LastfmClient,
    artist: &str,
    ttl_days: i64,
) -> Result<Vec<TopTrack>, RadioError> {
    let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
        "SELECT track_title, rank, playcount, fetched_at FROM lastfm_artist_top_tracks \
         WHERE artist = ? ORDER BY rank",
    )
    .bind(artist)
    .fetch_all(pool)
    .await?;

    let fresh = rows
        .first()
        .map(|(_, _, _, fetched_at)| !(Row { fetched_at: *fetched_at }).is_expired(now(), ttl_days));

    if fresh == Some(true) {
        return Ok(rows
            .into_iter()
            .map(|(title, rank, playcount, _)| TopTrack { title, rank: rank as u32, playcount: playcount as u64 })
            .collect());
    }

    let fetched = client.artist_top_tracks(artist).await.map_err(RadioError::External)?;

    let ts = now();
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM lastfm_artist_top_tracks WHERE artist = ?")
        .bind(artist)
        .execute(&mut *tx)
        .await?;
    for track in &fetched {
        sqlx::query(
            "INSERT OR REPLACE INTO lastfm_artist_top_tracks \
             (artist, track_title, rank, playcount, fetched_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(artist)
        .bind(&track.title)
        .bind(track.rank as i64)
        .bind(track.playcount as i64)
        .bind(ts)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(fetched)
}

/// Cached scrobbled tracks for `(username, artist)`.
pub async fn user_artist_tracks(
    pool: &SqlitePool,
    client: &dyn LastfmClient,
    username: &str,
    artist: &str,
    ttl_days: i64,
) -> Result<Vec<String>, RadioError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT track_title, fetched_at FROM lastfm_user_artist_tracks \
         WHERE username = ? AND artist = ?",
    )
    .bind(username)
    .bind(artist)
    .fetch_all(pool)
    .await?;

    let fresh = rows
        .first()
        .map(|(_, fetched_at)| !(Row { fetched_at: *fetched_at }).is_expired(now(), ttl_days));

    if fresh == Some(true) {
        return Ok(rows.into_iter().map(|(title, _)| title).collect());
    }

    let fetched = client
        .user_artist_tracks(username, artist)
        .await
        .map_err(RadioError::External)?;

    let ts = now();
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM lastfm_user_artist_tracks WHERE username = ? AND artist = ?")
        .bind(username)
        .bind(artist)
        .execute(&mut *tx)
        .await?;
    for title in &fetched {
        sqlx::query(
            "INSERT OR REPLACE INTO lastfm_user_artist_tracks \
             (username, artist, track_title, fetched_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(artist)
        .bind(title)
        .bind(ts)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use async_trait::async_trait;
    use crate::external::{ExternalError, LastfmClient, NowPlaying};
    use crate::model::PendingScrobble;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LastfmClient for CountingClient {
        async fn now_playing(&self, _: &str, _: &NowPlaying) -> Result<(), ExternalError> {
            unimplemented!()
        }
        async fn scrobble_batch(&self, _: &str, _: &[PendingScrobble]) -> Result<(), ExternalError> {
            unimplemented!()
        }
        async fn similar_artists(&self, _artist: &str, _limit: u32) -> Result<Vec<SimilarArtist>, ExternalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SimilarArtist { name: "Similar".into(), match_score: 0.9 }])
        }
        async fn artist_top_tracks(&self, _: &str) -> Result<Vec<TopTrack>, ExternalError> {
            Ok(Vec::new())
        }
        async fn user_artist_tracks(&self, _: &str, _: &str) -> Result<Vec<String>, ExternalError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn second_call_within_ttl_hits_the_cache_not_the_client() {
        let pool = test_pool().await;
        let client = CountingClient { calls: AtomicUsize::new(0) };

        let first = similar_artists(&pool, &client, "Seed", 50, 7).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        let second = similar_artists(&pool, &client, "Seed", 50, 7).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1, "cached read should not call the client again");
    }
}
