//! Incremental library scan: `Refresh(sources, progressChan)`.
//!
//! The caller spawns this as its own background task so the MVU loop never
//! waits on filesystem I/O; progress is streamed over an `mpsc` channel as
//! four phases, then the channel closes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use walkdir::WalkDir;

use super::{LibraryError, Result};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac"];

/// One message on the scan's progress channel.
#[derive(Debug, Clone)]
pub enum Progress {
    Scanning { current: u64 },
    Processing { current: u64, total: u64, current_file: PathBuf },
    Cleaning { removed: u64 },
    Done { added: u64, updated: u64, removed: u64 },
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn mtime_secs(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct ReadTags {
    artist: Option<String>,
    album_artist: Option<String>,
    album: Option<String>,
    title: String,
    disc_number: Option<i64>,
    track_number: Option<i64>,
    year: Option<i64>,
    genre: Option<String>,
    label: Option<String>,
    original_date: Option<String>,
    release_date: Option<String>,
}

fn read_tags(path: &Path) -> std::result::Result<ReadTags, lofty::error::LoftyError> {
    let tagged = Probe::open(path)?.read()?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    let title = tag
        .and_then(|t| t.title().map(|s| s.to_string()))
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        });

    Ok(ReadTags {
        artist: tag.and_then(|t| t.artist().map(|s| s.to_string())),
        album_artist: tag
            .and_then(|t| t.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()))
            .or_else(|| tag.and_then(|t| t.artist().map(|s| s.to_string()))),
        album: tag.and_then(|t| t.album().map(|s| s.to_string())),
        title,
        disc_number: tag.and_then(|t| t.disk()).map(|v| v as i64),
        track_number: tag.and_then(|t| t.track()).map(|v| v as i64),
        year: tag.and_then(|t| t.year()).map(|v| v as i64),
        genre: tag.and_then(|t| t.genre().map(|s| s.to_string())),
        label: tag
            .and_then(|t| t.get_string(&ItemKey::Label).map(|s| s.to_string())),
        original_date: tag
            .and_then(|t| t.get_string(&ItemKey::OriginalReleaseDate).map(|s| s.to_string())),
        release_date: tag
            .and_then(|t| t.get_string(&ItemKey::RecordingDate).map(|s| s.to_string())),
    })
}

async fn upsert_fts(pool: &SqlitePool, track_id: i64, tags: &ReadTags, path: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM library_search_fts WHERE track_id = ?")
        .bind(track_id)
        .execute(pool)
        .await?;

    let search_text = format!(
        "{} {} {}",
        tags.artist.as_deref().unwrap_or(""),
        tags.album.as_deref().unwrap_or(""),
        tags.title
    );
    sqlx::query(
        "INSERT INTO library_search_fts \
         (search_text, result_type, artist, album, track_id, year, track_title, track_artist, \
          track_number, disc_number, path) \
         VALUES (?, 'track', ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&search_text)
    .bind(&tags.album_artist)
    .bind(&tags.album)
    .bind(track_id)
    .bind(tags.year)
    .bind(&tags.title)
    .bind(&tags.artist)
    .bind(tags.track_number)
    .bind(tags.disc_number)
    .bind(path)
    .execute(pool)
    .await?;

    if let Some(artist) = &tags.album_artist {
        sqlx::query(
            "INSERT OR IGNORE INTO library_search_fts (search_text, result_type, artist) \
             VALUES (?, 'artist', ?)",
        )
        .bind(artist)
        .bind(artist)
        .execute(pool)
        .await?;
    }
    if let (Some(artist), Some(album)) = (&tags.album_artist, &tags.album) {
        sqlx::query(
            "INSERT OR IGNORE INTO library_search_fts (search_text, result_type, artist, album) \
             VALUES (?, 'album', ?, ?)",
        )
        .bind(format!("{artist} {album}"))
        .bind(artist)
        .bind(album)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// `Refresh(sources[], progressChan)`: walk each source, tag changed/new
/// files, delete rows whose paths vanished, stream the four phases, then
/// close the channel. `full` ignores mtime and re-tags everything
/// (the `fR` full rescan, spec.md §4.1).
pub async fn refresh(
    pool: SqlitePool,
    sources: Vec<PathBuf>,
    full: bool,
    progress: mpsc::Sender<Progress>,
) -> Result<()> {
    let mut found = 0u64;
    let mut all_paths: Vec<PathBuf> = Vec::new();
    for root in &sources {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_audio_file(entry.path()) {
                all_paths.push(entry.path().to_path_buf());
                found += 1;
                let _ = progress.send(Progress::Scanning { current: found }).await;
            }
        }
    }

    let total = all_paths.len() as u64;
    let mut added = 0u64;
    let mut updated = 0u64;
    let mut processed = 0u64;
    let mut seen_paths: HashSet<String> = HashSet::new();

    for path in all_paths {
        processed += 1;
        let path_str = path.to_string_lossy().to_string();
        seen_paths.insert(path_str.clone());
        let _ = progress
            .send(Progress::Processing {
                current: processed,
                total,
                current_file: path.clone(),
            })
            .await;

        let disk_mtime = mtime_secs(&path);
        let existing: Option<(i64, i64)> =
            sqlx::query_as("SELECT id, mtime FROM library_tracks WHERE path = ?")
                .bind(&path_str)
                .fetch_optional(&pool)
                .await?;

        if let Some((_, stored_mtime)) = existing {
            if !full && stored_mtime >= disk_mtime {
                continue;
            }
        }

        let tags = match read_tags(&path) {
            Ok(t) => t,
            Err(source) => {
                tracing::warn!(path = %path_str, error = %source, "skipping unreadable file during scan");
                continue;
            }
        };
        let ts = now();

        let track_id = if let Some((id, _)) = existing {
            sqlx::query(
                "UPDATE library_tracks SET mtime=?, artist=?, album_artist=?, album=?, title=?, \
                 disc_number=?, track_number=?, year=?, genre=?, label=?, original_date=?, \
                 release_date=?, updated_at=? WHERE id=?",
            )
            .bind(disk_mtime)
            .bind(&tags.artist)
            .bind(&tags.album_artist)
            .bind(&tags.album)
            .bind(&tags.title)
            .bind(tags.disc_number)
            .bind(tags.track_number)
            .bind(tags.year)
            .bind(&tags.genre)
            .bind(&tags.label)
            .bind(&tags.original_date)
            .bind(&tags.release_date)
            .bind(ts)
            .bind(id)
            .execute(&pool)
            .await?;
            updated += 1;
            id
        } else {
            let id = sqlx::query(
                "INSERT INTO library_tracks \
                 (path, mtime, artist, album_artist, album, title, disc_number, track_number, \
                  year, genre, label, original_date, release_date, added_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&path_str)
            .bind(disk_mtime)
            .bind(&tags.artist)
            .bind(&tags.album_artist)
            .bind(&tags.album)
            .bind(&tags.title)
            .bind(tags.disc_number)
            .bind(tags.track_number)
            .bind(tags.year)
            .bind(&tags.genre)
            .bind(&tags.label)
            .bind(&tags.original_date)
            .bind(&tags.release_date)
            .bind(ts)
            .bind(ts)
            .execute(&pool)
            .await?
            .last_insert_rowid();
            added += 1;
            id
        };

        upsert_fts(&pool, track_id, &tags, &path_str).await?;
    }

    let stored_paths: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, path FROM library_tracks").fetch_all(&pool).await?;
    let mut removed = 0u64;
    for (id, path) in stored_paths {
        if !seen_paths.contains(&path) && !std::path::Path::new(&path).exists() {
            sqlx::query("DELETE FROM library_tracks WHERE id = ?").bind(id).execute(&pool).await?;
            sqlx::query("DELETE FROM library_search_fts WHERE track_id = ?")
                .bind(id)
                .execute(&pool)
                .await?;
            removed += 1;
            let _ = progress.send(Progress::Cleaning { removed }).await;
        }
    }
    if removed > 0 {
        prune_aggregate_fts_rows(&pool).await?;
    }

    let _ = progress.send(Progress::Done { added, updated, removed }).await;
    Ok(())
}

/// Deletes `artist`/`album` aggregate FTS rows that no longer correspond to
/// any `library_tracks` row, restoring the §3 "FTS5 rows and library_tracks
/// rows are consistent" invariant after a track deletion leaves one orphaned
/// (e.g. an artist's last remaining track is removed).
async fn prune_aggregate_fts_rows(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        "DELETE FROM library_search_fts WHERE result_type = 'artist' \
         AND artist NOT IN (SELECT DISTINCT album_artist FROM library_tracks WHERE album_artist IS NOT NULL)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "DELETE FROM library_search_fts WHERE result_type = 'album' \
         AND NOT EXISTS ( \
             SELECT 1 FROM library_tracks \
             WHERE library_tracks.album_artist = library_search_fts.artist \
               AND library_tracks.album = library_search_fts.album \
         )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_minimal_mp3(path: &Path) {
        // Not a real MP3; lofty's probe will fail to read tags for a file
        // with this extension but no valid frame sync, which exercises the
        // "unsupported/garbage file" path without asserting on tag content.
        let mut f = File::create(path).unwrap();
        f.write_all(b"not actually audio").unwrap();
    }

    #[tokio::test]
    async fn refresh_reports_scanning_then_done_and_closes_channel() {
        let pool = test_pool().await;
        let dir = tempdir().unwrap();
        write_minimal_mp3(&dir.path().join("a.mp3"));

        let (tx, mut rx) = mpsc::channel(32);
        let handle = tokio::spawn(refresh(pool, vec![dir.path().to_path_buf()], false, tx));

        let mut saw_scanning = false;
        let mut saw_done = false;
        while let Some(msg) = rx.recv().await {
            match msg {
                Progress::Scanning { .. } => saw_scanning = true,
                Progress::Done { .. } => saw_done = true,
                _ => {}
            }
        }
        // The garbage file fails tag reading and is skipped; the scan still
        // runs through cleaning and reaches Done.
        handle.await.unwrap().unwrap();
        assert!(saw_scanning);
        assert!(saw_done);
    }

    #[tokio::test]
    async fn refresh_skips_an_unreadable_file_and_still_indexes_the_rest() {
        let pool = test_pool().await;
        let dir = tempdir().unwrap();
        write_minimal_mp3(&dir.path().join("bad.mp3"));
        // A second, equally fake file: `refresh` can't actually decode
        // audio in tests, but a file that merely fails tag probing must
        // not stop the walk from reaching and counting the next one.
        write_minimal_mp3(&dir.path().join("also_bad.mp3"));

        let (tx, mut rx) = mpsc::channel(32);
        let handle = tokio::spawn(refresh(pool.clone(), vec![dir.path().to_path_buf()], false, tx));
        let mut done = None;
        while let Some(msg) = rx.recv().await {
            if let Progress::Done { added, updated, removed } = msg {
                done = Some((added, updated, removed));
            }
        }
        handle.await.unwrap().unwrap();
        // Both files fail tag reading, so neither is added, but the scan
        // completed rather than aborting on the first one.
        assert_eq!(done, Some((0, 0, 0)));
    }

    #[tokio::test]
    async fn cleaning_removes_rows_for_vanished_paths() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO library_tracks (path, mtime, title, added_at, updated_at) \
             VALUES ('/gone/track.mp3', 0, 'Gone', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(32);
        let _ = refresh(pool.clone(), vec![dir.path().to_path_buf()], false, tx).await;
        while rx.recv().await.is_some() {}

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM library_tracks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn cleaning_prunes_orphaned_artist_and_album_search_rows() {
        let pool = test_pool().await;
        let id: i64 = sqlx::query(
            "INSERT INTO library_tracks \
             (path, mtime, album_artist, album, title, added_at, updated_at) \
             VALUES ('/gone/track.mp3', 0, 'Arty', 'Alb', 'Gone', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO library_search_fts (search_text, result_type, artist, album, track_id) \
             VALUES ('Arty Alb Gone', 'track', 'Arty', 'Alb', ?)",
        )
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO library_search_fts (search_text, result_type, artist) \
             VALUES ('Arty', 'artist', 'Arty')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO library_search_fts (search_text, result_type, artist, album) \
             VALUES ('Arty Alb', 'album', 'Arty', 'Alb')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(32);
        let _ = refresh(pool.clone(), vec![dir.path().to_path_buf()], false, tx).await;
        while rx.recv().await.is_some() {}

        let remaining: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM library_search_fts WHERE result_type IN ('artist', 'album')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(remaining.0, 0);
    }
}
