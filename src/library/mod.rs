//! Library index: the `library_tracks` table, its trigram FTS5 mirror, and
//! the incremental scan that keeps both in sync.

pub mod playlists;
pub mod scan;

pub use scan::{Progress, refresh};

use sqlx::SqlitePool;

use crate::model::Track;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("tag read failed for {path}: {source}")]
    TagRead {
        path: String,
        #[source]
        source: lofty::error::LoftyError,
    },
}

pub type Result<T> = std::result::Result<T, LibraryError>;

/// One search hit, grouped by `result_type` in the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Artist { name: String },
    Album { artist: String, album: String },
    Track(Track),
}

/// `Search(query, limit)`: one FTS5 MATCH query producing up to `limit`
/// mixed-type results via prefix+trigram matching.
pub async fn search(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let match_expr = format!("{}*", escape_fts_query(query));

    let rows: Vec<(
        String,
        Option<String>,
        Option<String>,
        Option<i64>,
        Option<i64>,
        Option<String>,
        Option<String>,
        Option<i64>,
        Option<i64>,
        Option<String>,
    )> = sqlx::query_as(
        "SELECT result_type, artist, album, track_id, year, track_title, track_artist, \
                track_number, disc_number, path \
         FROM library_search_fts WHERE library_search_fts MATCH ? LIMIT ?",
    )
    .bind(&match_expr)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut results = Vec::with_capacity(rows.len());
    for (
        result_type,
        artist,
        album,
        track_id,
        year,
        track_title,
        track_artist,
        track_number,
        disc_number,
        path,
    ) in rows
    {
        match result_type.as_str() {
            "artist" => {
                if let Some(name) = artist {
                    results.push(SearchResult::Artist { name });
                }
            }
            "album" => {
                if let (Some(artist), Some(album)) = (artist, album) {
                    results.push(SearchResult::Album { artist, album });
                }
            }
            "track" => {
                if let (Some(id), Some(title), Some(path)) = (track_id, track_title, path) {
                    results.push(SearchResult::Track(Track {
                        id,
                        path,
                        mtime: 0,
                        artist: track_artist,
                        album_artist: artist,
                        album,
                        title,
                        disc_number,
                        track_number,
                        year,
                        genre: None,
                        label: None,
                        original_date: None,
                        release_date: None,
                        added_at: 0,
                        updated_at: 0,
                    }));
                }
            }
            _ => {}
        }
    }
    Ok(results)
}

/// FTS5 special characters (`"`, `*`, `^`, `:`) are neutralised by quoting
/// the raw term; trigram tokenization still matches substrings inside it.
fn escape_fts_query(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

/// `Artists()`: distinct album-artist names, ordered.
pub async fn artists(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT album_artist FROM library_tracks \
         WHERE album_artist IS NOT NULL ORDER BY album_artist",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(a,)| a).collect())
}

/// `ArtistAlbums(artist)`: distinct albums for an artist, newest first.
pub async fn artist_albums(pool: &SqlitePool, artist: &str) -> Result<Vec<(String, Option<i64>)>> {
    let rows: Vec<(String, Option<i64>)> = sqlx::query_as(
        "SELECT DISTINCT album, year FROM library_tracks \
         WHERE album_artist = ? AND album IS NOT NULL ORDER BY year DESC, album",
    )
    .bind(artist)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `AlbumTracks(artist, album)`: ordered by disc then track number.
pub async fn album_tracks(pool: &SqlitePool, artist: &str, album: &str) -> Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(
        "SELECT * FROM library_tracks WHERE album_artist = ? AND album = ? \
         ORDER BY disc_number, track_number",
    )
    .bind(artist)
    .bind(album)
    .fetch_all(pool)
    .await
    .map_err(LibraryError::from)
}

/// `ArtistTracks(artist)`: every track by an artist, album then track order.
pub async fn artist_tracks(pool: &SqlitePool, artist: &str) -> Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(
        "SELECT * FROM library_tracks WHERE album_artist = ? \
         ORDER BY album, disc_number, track_number",
    )
    .bind(artist)
    .fetch_all(pool)
    .await
    .map_err(LibraryError::from)
}

/// `TrackByPath(path)`: exact lookup, used by the playback engine after a
/// `TrackFinishedMsg` to find the queue entry's library row (if any).
pub async fn track_by_path(pool: &SqlitePool, path: &str) -> Result<Option<Track>> {
    sqlx::query_as::<_, Track>("SELECT * FROM library_tracks WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await
        .map_err(LibraryError::from)
}

/// `TrackByID(id)`: exact lookup, used by the navigator when a track node
/// is activated directly (it only carries the id, not the path).
pub async fn track_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Track>> {
    sqlx::query_as::<_, Track>("SELECT * FROM library_tracks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(LibraryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn insert_test_track(pool: &SqlitePool, artist: &str, album: &str, title: &str) -> i64 {
        let id = sqlx::query(
            "INSERT INTO library_tracks \
             (path, mtime, artist, album_artist, album, title, added_at, updated_at) \
             VALUES (?, 0, ?, ?, ?, ?, 0, 0)",
        )
        .bind(format!("/music/{artist}/{album}/{title}.mp3"))
        .bind(artist)
        .bind(artist)
        .bind(album)
        .bind(title)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO library_search_fts \
             (search_text, result_type, artist, album, track_id, track_title, track_artist, path) \
             VALUES (?, 'track', ?, ?, ?, ?, ?, ?)",
        )
        .bind(format!("{artist} {album} {title}"))
        .bind(artist)
        .bind(album)
        .bind(id)
        .bind(title)
        .bind(artist)
        .bind(format!("/music/{artist}/{album}/{title}.mp3"))
        .execute(pool)
        .await
        .unwrap();

        id
    }

    #[tokio::test]
    async fn search_on_trigram_substring_finds_the_track() {
        let pool = test_pool().await;
        insert_test_track(&pool, "The Beatles", "Abbey Road", "Come Together").await;

        let results = search(&pool, "eatl", 10).await.unwrap();
        assert!(results.iter().any(|r| matches!(
            r,
            SearchResult::Track(t) if t.title == "Come Together"
        )));
    }

    #[tokio::test]
    async fn artists_albums_and_tracks_round_trip() {
        let pool = test_pool().await;
        insert_test_track(&pool, "Artist A", "Album 1", "Song 1").await;
        insert_test_track(&pool, "Artist A", "Album 1", "Song 2").await;

        let artists = artists(&pool).await.unwrap();
        assert_eq!(artists, vec!["Artist A"]);

        let albums = artist_albums(&pool, "Artist A").await.unwrap();
        assert_eq!(albums.len(), 1);

        let tracks = album_tracks(&pool, "Artist A", "Album 1").await.unwrap();
        assert_eq!(tracks.len(), 2);

        let by_artist = artist_tracks(&pool, "Artist A").await.unwrap();
        assert_eq!(by_artist.len(), 2);
    }

    #[tokio::test]
    async fn track_by_path_returns_none_when_missing() {
        let pool = test_pool().await;
        assert!(track_by_path(&pool, "/nowhere.mp3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn track_by_id_finds_the_inserted_row() {
        let pool = test_pool().await;
        let id = insert_test_track(&pool, "Artist A", "Album 1", "Song 1").await;
        let track = track_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(track.title, "Song 1");
    }
}
