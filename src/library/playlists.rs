//! Playlists and playlist folders: a DAG of folders via
//! nullable `parent_id`, contiguous 0-based track positions per playlist,
//! and the reserved `Favorites` playlist (id=1).

use sqlx::SqlitePool;

use crate::model::{Playlist, PlaylistFolder};

use super::{LibraryError, Result};

/// Deleting the Favorites playlist is disallowed by spec.md §3.
#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("the Favorites playlist cannot be deleted")]
    FavoritesProtected,
}

impl From<PlaylistError> for LibraryError {
    fn from(e: PlaylistError) -> Self {
        match e {
            PlaylistError::Database(err) => LibraryError::Database(err),
            PlaylistError::FavoritesProtected => {
                LibraryError::Database(sqlx::Error::RowNotFound)
            }
        }
    }
}

pub async fn create_folder(
    pool: &SqlitePool,
    parent_id: Option<i64>,
    name: &str,
) -> std::result::Result<i64, PlaylistError> {
    let id = sqlx::query("INSERT INTO playlist_folders (parent_id, name) VALUES (?, ?)")
        .bind(parent_id)
        .bind(name)
        .execute(pool)
        .await?
        .last_insert_rowid();
    Ok(id)
}

pub async fn create_playlist(
    pool: &SqlitePool,
    folder_id: Option<i64>,
    name: &str,
) -> std::result::Result<i64, PlaylistError> {
    let now = chrono::Utc::now().timestamp();
    let id = sqlx::query("INSERT INTO playlists (folder_id, name, created_at) VALUES (?, ?, ?)")
        .bind(folder_id)
        .bind(name)
        .bind(now)
        .execute(pool)
        .await?
        .last_insert_rowid();
    Ok(id)
}

pub async fn delete_playlist(pool: &SqlitePool, id: i64) -> std::result::Result<(), PlaylistError> {
    if id == Playlist::FAVORITES_ID {
        return Err(PlaylistError::FavoritesProtected);
    }
    sqlx::query("DELETE FROM playlists WHERE id = ?").bind(id).execute(pool).await?;
    Ok(())
}

pub async fn folders(pool: &SqlitePool, parent_id: Option<i64>) -> Result<Vec<PlaylistFolder>> {
    let rows = match parent_id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM playlist_folders WHERE parent_id = ? ORDER BY name")
                .bind(id)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM playlist_folders WHERE parent_id IS NULL ORDER BY name")
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn playlists_in_folder(pool: &SqlitePool, folder_id: Option<i64>) -> Result<Vec<Playlist>> {
    let rows = match folder_id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM playlists WHERE folder_id = ? ORDER BY name")
                .bind(id)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM playlists WHERE folder_id IS NULL ORDER BY name")
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn playlist_track_ids(pool: &SqlitePool, playlist_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT track_id FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
    )
    .bind(playlist_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// `AddTracks(ids)`: appends at contiguous positions.
pub async fn add_tracks(pool: &SqlitePool, playlist_id: i64, track_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    let start: (i64,) = sqlx::query_as(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_tracks WHERE playlist_id = ?",
    )
    .bind(playlist_id)
    .fetch_one(&mut *tx)
    .await?;
    for (i, track_id) in track_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO playlist_tracks (playlist_id, position, track_id) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(start.0 + i as i64)
        .bind(track_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// `RemoveTrack(pos)` / `RemoveTracks(positions)`: deletes then renumbers
/// so positions remain `[0, N)` with no gaps. Uses an ordinary
/// sort rather than a hand-written pass.
pub async fn remove_tracks(pool: &SqlitePool, playlist_id: i64, positions: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    let mut remaining: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT position, track_id FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
    )
    .bind(playlist_id)
    .fetch_all(&mut *tx)
    .await?;
    let to_remove: std::collections::HashSet<i64> = positions.iter().copied().collect();
    remaining.retain(|(pos, _)| !to_remove.contains(pos));
    remaining.sort_unstable_by_key(|(pos, _)| *pos);

    sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
        .bind(playlist_id)
        .execute(&mut *tx)
        .await?;
    for (i, (_, track_id)) in remaining.into_iter().enumerate() {
        sqlx::query(
            "INSERT INTO playlist_tracks (playlist_id, position, track_id) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(i as i64)
        .bind(track_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// `MoveIndices(positions, delta)` for a playlist: identical relocation
/// algorithm to [`crate::queue::Queue::move_indices`],
/// reimplemented against `playlist_tracks` since the two tables are
/// distinct but share the same contiguous-position invariant.
pub async fn move_indices(
    pool: &SqlitePool,
    playlist_id: i64,
    mut positions: Vec<i64>,
    delta: i64,
) -> Result<Vec<i64>> {
    if positions.is_empty() || delta == 0 {
        return Ok(positions);
    }
    positions.sort_unstable();
    let first = positions[0];
    let last = *positions.last().unwrap();

    let mut tx = pool.begin().await?;
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM playlist_tracks WHERE playlist_id = ?")
        .bind(playlist_id)
        .fetch_one(&mut *tx)
        .await?;
    let n = count.0;
    if first + delta < 0 || last + delta >= n {
        tx.rollback().await?;
        return Ok(positions);
    }

    let selected: std::collections::HashSet<i64> = positions.iter().copied().collect();

    for (i, &pos) in positions.iter().enumerate() {
        let reserved = -(i as i64) - 1;
        sqlx::query(
            "UPDATE playlist_tracks SET position = ? WHERE playlist_id = ? AND position = ?",
        )
        .bind(reserved)
        .bind(playlist_id)
        .bind(pos)
        .execute(&mut *tx)
        .await?;
    }

    // Shift the gap rows — the rows vacated by the selected block's move,
    // not the whole old..new span — by the block size, toward the vacated
    // slots. Processing ascending when the shift is negative and descending
    // when it's positive means each row is relocated before a later update
    // would otherwise collide with its still-occupied slot.
    let block_size = positions.len() as i64;
    let (lo, hi, shift) = if delta > 0 {
        (last + 1, last + delta, -block_size)
    } else {
        (first + delta, first - 1, block_size)
    };
    let mut shifting: Vec<i64> = (lo..=hi).filter(|p| !selected.contains(p)).collect();
    if shift < 0 {
        shifting.sort_unstable();
    } else {
        shifting.sort_unstable_by(|a, b| b.cmp(a));
    }
    for pos in shifting {
        sqlx::query(
            "UPDATE playlist_tracks SET position = position + ? \
             WHERE playlist_id = ? AND position = ?",
        )
        .bind(shift)
        .bind(playlist_id)
        .bind(pos)
        .execute(&mut *tx)
        .await?;
    }

    for (i, &pos) in positions.iter().enumerate() {
        let reserved = -(i as i64) - 1;
        sqlx::query(
            "UPDATE playlist_tracks SET position = ? WHERE playlist_id = ? AND position = ?",
        )
        .bind(pos + delta)
        .bind(playlist_id)
        .bind(reserved)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(positions.into_iter().map(|p| p + delta).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_tracks(pool: &SqlitePool, n: i64) -> Vec<i64> {
        let mut ids = Vec::new();
        for i in 0..n {
            let id = sqlx::query(
                "INSERT INTO library_tracks (path, mtime, title, added_at, updated_at) \
                 VALUES (?, 0, ?, 0, 0)",
            )
            .bind(format!("/t{i}.mp3"))
            .bind(format!("T{i}"))
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid();
            ids.push(id);
        }
        ids
    }

    #[tokio::test]
    async fn favorites_playlist_exists_and_cannot_be_deleted() {
        let pool = test_pool().await;
        let favorites: Playlist = sqlx::query_as("SELECT * FROM playlists WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(favorites.is_favorites());

        let err = delete_playlist(&pool, 1).await.unwrap_err();
        assert!(matches!(err, PlaylistError::FavoritesProtected));
    }

    #[tokio::test]
    async fn add_tracks_keeps_positions_contiguous() {
        let pool = test_pool().await;
        let ids = seed_tracks(&pool, 3).await;
        add_tracks(&pool, 1, &ids).await.unwrap();
        let track_ids = playlist_track_ids(&pool, 1).await.unwrap();
        assert_eq!(track_ids, ids);
    }

    /// Seed test 2: "Playlist add then move".
    #[tokio::test]
    async fn move_indices_shifts_first_track_to_position_two() {
        let pool = test_pool().await;
        let ids = seed_tracks(&pool, 5).await;
        add_tracks(&pool, 1, &ids).await.unwrap();

        let new_positions = move_indices(&pool, 1, vec![0], 2).await.unwrap();
        assert_eq!(new_positions, vec![2]);

        let track_ids = playlist_track_ids(&pool, 1).await.unwrap();
        assert_eq!(track_ids, vec![ids[1], ids[2], ids[0], ids[3], ids[4]]);
    }

    #[tokio::test]
    async fn remove_tracks_renumbers_without_gaps() {
        let pool = test_pool().await;
        let ids = seed_tracks(&pool, 4).await;
        add_tracks(&pool, 1, &ids).await.unwrap();
        remove_tracks(&pool, 1, &[1]).await.unwrap();

        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT position FROM playlist_tracks WHERE playlist_id = 1 ORDER BY position")
                .fetch_all(&pool)
                .await
                .unwrap();
        let positions: Vec<i64> = rows.into_iter().map(|(p,)| p).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn out_of_bounds_move_leaves_positions_unchanged() {
        let pool = test_pool().await;
        let ids = seed_tracks(&pool, 2).await;
        add_tracks(&pool, 1, &ids).await.unwrap();
        let before = playlist_track_ids(&pool, 1).await.unwrap();

        let result = move_indices(&pool, 1, vec![0], 5).await.unwrap();
        assert_eq!(result, vec![0]);
        let after = playlist_track_ids(&pool, 1).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn folder_tree_supports_nesting() {
        let pool = test_pool().await;
        let root = create_folder(&pool, None, "Root").await.unwrap();
        let child = create_folder(&pool, Some(root), "Child").await.unwrap();
        let playlist = create_playlist(&pool, Some(child), "Mix").await.unwrap();

        let root_children = folders(&pool, Some(root)).await.unwrap();
        assert_eq!(root_children.len(), 1);
        assert_eq!(root_children[0].id, child);

        let playlists = playlists_in_folder(&pool, Some(child)).await.unwrap();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].id, playlist);
    }
}
