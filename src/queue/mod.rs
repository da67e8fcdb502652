//! The playing queue: an ordered, persisted list of tracks with a cursor,
//! repeat/shuffle modes, and undo-able mutations.
//!
//! Shaped like an in-memory play queue (items + position + repeat +
//! shuffle) but backed by `queue_state`/`queue_tracks` so positions
//! survive a restart, and `move_indices` follows the negative-position
//! relocation algorithm spec.md spells out rather than `Vec::remove`/`insert`.

use rand::seq::SliceRandom;
use sqlx::SqlitePool;

use crate::model::{QueueEntry, QueueState, RepeatMode};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("move would put a position out of bounds")]
    OutOfBounds,
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// An inverse operation for a queue mutation, used by the root's undo stack.
/// Calling `apply` performs the inverse.
pub enum Inverse {
    /// Undo an append: remove the range [start, end).
    RemoveRange(i64, i64),
    /// Undo a removal: re-insert these entries at their original positions.
    Reinsert(Vec<QueueEntry>),
    /// Undo a replace: restore the previous queue state wholesale.
    RestoreState(QueueState),
    /// Undo a move: move the (now-relocated) positions back by `-delta`.
    MoveBack(Vec<i64>, i64),
    /// No-op inverse (nothing to undo).
    None,
}

/// In-memory queue, mirrored from / persisted to `queue_state` + `queue_tracks`.
pub struct Queue {
    pool: SqlitePool,
    state: QueueState,
    /// Shuffled order kept stable until the next mutation rebuilds it.
    shuffle_order: Vec<usize>,
}

impl Queue {
    pub async fn load(pool: SqlitePool) -> Result<Self> {
        let row: (i64, String, bool) =
            sqlx::query_as("SELECT current_index, repeat_mode, shuffle FROM queue_state WHERE id = 1")
                .fetch_one(&pool)
                .await?;
        let tracks: Vec<QueueEntry> = sqlx::query_as(
            "SELECT position, track_id, path, title, artist, album, track_number \
             FROM queue_tracks ORDER BY position",
        )
        .fetch_all(&pool)
        .await?;

        let mut queue = Self {
            pool,
            state: QueueState {
                current_index: row.0,
                repeat_mode: RepeatMode::from_str_lossy(&row.1),
                shuffle: row.2,
                tracks,
            },
            shuffle_order: Vec::new(),
        };
        if queue.state.shuffle {
            queue.rebuild_shuffle_order();
        }
        Ok(queue)
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn current_track(&self) -> Option<&QueueEntry> {
        let idx = self.state.current_index;
        if idx < 0 {
            return None;
        }
        self.state.tracks.get(idx as usize)
    }

    fn rebuild_shuffle_order(&mut self) {
        let mut order: Vec<usize> = (0..self.state.tracks.len()).collect();
        order.shuffle(&mut rand::rng());
        // Keep the current track first in visitation order so re-shuffling
        // doesn't change what's currently playing.
        if let Some(pos) = order.iter().position(|&i| i as i64 == self.state.current_index) {
            order.swap(0, pos);
        }
        self.shuffle_order = order;
    }

    async fn persist_header(&self) -> Result<()> {
        sqlx::query(
            "UPDATE queue_state SET current_index = ?, repeat_mode = ?, shuffle = ? WHERE id = 1",
        )
        .bind(self.state.current_index)
        .bind(self.state.repeat_mode.as_str())
        .bind(self.state.shuffle)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn persist_all_tracks(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM queue_tracks").execute(&mut *tx).await?;
        for entry in &self.state.tracks {
            sqlx::query(
                "INSERT INTO queue_tracks (position, track_id, path, title, artist, album, track_number) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.position)
            .bind(entry.track_id)
            .bind(&entry.path)
            .bind(&entry.title)
            .bind(&entry.artist)
            .bind(&entry.album)
            .bind(entry.track_number)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// `Add(tracks…)`: appends; returns the inverse (remove range).
    pub async fn add(&mut self, tracks: Vec<QueueEntry>) -> Result<Inverse> {
        let start = self.state.tracks.len() as i64;
        for (i, mut entry) in tracks.into_iter().enumerate() {
            entry.position = start + i as i64;
            self.state.tracks.push(entry);
        }
        let end = self.state.tracks.len() as i64;
        self.persist_all_tracks().await?;
        if self.state.shuffle {
            self.rebuild_shuffle_order();
        }
        Ok(Inverse::RemoveRange(start, end))
    }

    /// `AddAndPlay(tracks…)`: appends and sets current to the first newly
    /// added; returns the track to play.
    pub async fn add_and_play(&mut self, tracks: Vec<QueueEntry>) -> Result<Option<QueueEntry>> {
        let start = self.state.tracks.len() as i64;
        self.add(tracks).await?;
        self.state.current_index = start;
        self.persist_header().await?;
        Ok(self.current_track().cloned())
    }

    /// `Replace(tracks…)`: clears then appends; current = 0 if non-empty
    /// else −1; returns the track to play.
    pub async fn replace(&mut self, tracks: Vec<QueueEntry>) -> Result<Option<QueueEntry>> {
        let previous = self.state.clone();
        self.state.tracks.clear();
        for (i, mut entry) in tracks.into_iter().enumerate() {
            entry.position = i as i64;
            self.state.tracks.push(entry);
        }
        self.state.current_index = if self.state.tracks.is_empty() { -1 } else { 0 };
        self.persist_all_tracks().await?;
        self.persist_header().await?;
        if self.state.shuffle {
            self.rebuild_shuffle_order();
        }
        let _ = previous; // caller wraps Inverse::RestoreState(previous) if it wants undo
        Ok(self.current_track().cloned())
    }

    pub fn snapshot(&self) -> QueueState {
        self.state.clone()
    }

    /// `JumpTo(index)`: sets current to index, returns the track.
    pub async fn jump_to(&mut self, index: i64) -> Result<Option<QueueEntry>> {
        if index < 0 || index as usize >= self.state.tracks.len() {
            return Ok(None);
        }
        self.state.current_index = index;
        self.persist_header().await?;
        Ok(self.current_track().cloned())
    }

    /// True unless at the end of the queue with repeat=off.
    pub fn has_next(&self) -> bool {
        if self.state.tracks.is_empty() {
            return false;
        }
        match self.state.repeat_mode {
            RepeatMode::One | RepeatMode::All => true,
            RepeatMode::Off => self.next_linear_index().is_some(),
        }
    }

    fn order_position(&self, index: i64) -> Option<usize> {
        if self.state.shuffle {
            self.shuffle_order.iter().position(|&i| i as i64 == index)
        } else {
            Some(index as usize)
        }
    }

    fn index_at_order(&self, order_pos: usize) -> Option<i64> {
        if self.state.shuffle {
            self.shuffle_order.get(order_pos).map(|&i| i as i64)
        } else {
            if order_pos < self.state.tracks.len() {
                Some(order_pos as i64)
            } else {
                None
            }
        }
    }

    fn next_linear_index(&self) -> Option<i64> {
        if self.state.current_index < 0 {
            return self.index_at_order(0);
        }
        let cur_order = self.order_position(self.state.current_index)?;
        self.index_at_order(cur_order + 1)
    }

    /// `Next()`: advances respecting repeat mode and shuffle.
    pub async fn next(&mut self) -> Result<Option<QueueEntry>> {
        if self.state.tracks.is_empty() {
            return Ok(None);
        }
        if self.state.repeat_mode == RepeatMode::One {
            return Ok(self.current_track().cloned());
        }
        match self.next_linear_index() {
            Some(idx) => {
                self.state.current_index = idx;
            }
            None => {
                if self.state.repeat_mode == RepeatMode::All {
                    self.state.current_index = self.index_at_order(0).unwrap_or(-1);
                } else {
                    return Ok(None);
                }
            }
        }
        self.persist_header().await?;
        Ok(self.current_track().cloned())
    }

    /// `Previous()`: symmetric with `Next()`.
    pub async fn previous(&mut self) -> Result<Option<QueueEntry>> {
        if self.state.tracks.is_empty() {
            return Ok(None);
        }
        if self.state.repeat_mode == RepeatMode::One {
            return Ok(self.current_track().cloned());
        }
        let prev = if self.state.current_index < 0 {
            None
        } else {
            let cur_order = self.order_position(self.state.current_index);
            cur_order.and_then(|p| p.checked_sub(1)).and_then(|p| self.index_at_order(p))
        };
        match prev {
            Some(idx) => self.state.current_index = idx,
            None => {
                if self.state.repeat_mode == RepeatMode::All {
                    let last = self.state.tracks.len().saturating_sub(1);
                    self.state.current_index = self.index_at_order(last).unwrap_or(-1);
                } else {
                    return Ok(None);
                }
            }
        }
        self.persist_header().await?;
        Ok(self.current_track().cloned())
    }

    pub async fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<()> {
        self.state.repeat_mode = mode;
        self.persist_header().await
    }

    pub async fn set_shuffle(&mut self, shuffle: bool) -> Result<()> {
        self.state.shuffle = shuffle;
        if shuffle {
            self.rebuild_shuffle_order();
        }
        self.persist_header().await
    }

    /// `MoveIndices(positions, delta)`: shifts selected entries by `delta`,
    /// preserving relative order. Follows spec.md §4.3's relocation
    /// algorithm exactly: reserved negative positions avoid UNIQUE clashes
    /// while rows are in flight.
    ///
    /// Returns the new positions in the original input order, or
    /// `QueueError::OutOfBounds` (leaving positions unchanged) if the move
    /// would push any selected row out of `[0, N)`.
    pub async fn move_indices(&mut self, mut positions: Vec<i64>, delta: i64) -> Result<Vec<i64>> {
        if positions.is_empty() || delta == 0 {
            return Ok(positions);
        }
        positions.sort_unstable();
        let n = self.state.tracks.len() as i64;
        let first = positions[0];
        let last = *positions.last().unwrap();
        if first + delta < 0 || last + delta >= n {
            return Err(QueueError::OutOfBounds);
        }

        let selected: std::collections::HashSet<i64> = positions.iter().copied().collect();
        let mut by_pos: std::collections::HashMap<i64, QueueEntry> = self
            .state
            .tracks
            .drain(..)
            .map(|e| (e.position, e))
            .collect();

        // 1. Relocate selected rows to reserved negative positions.
        for (i, &pos) in positions.iter().enumerate() {
            if let Some(mut entry) = by_pos.remove(&pos) {
                entry.position = -(i as i64) - 1;
                by_pos.insert(entry.position, entry);
            }
        }

        // 2. Shift the gap rows — the rows vacated by the selected block's
        // move, not the whole old..new span — by the block size, toward the
        // vacated slots. Moving block_size rows in the opposite direction of
        // that shift (ascending when the shift is negative, descending when
        // it's positive) means each row is read out of `by_pos` before a
        // later iteration would otherwise overwrite its slot.
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
            if let Some(mut entry) = by_pos.remove(&pos) {
                entry.position = pos + shift;
                by_pos.insert(entry.position, entry);
            }
        }

        // 3. Move selected rows from their reserved negative positions to
        // their targets.
        for (i, &pos) in positions.iter().enumerate() {
            let reserved = -(i as i64) - 1;
            if let Some(mut entry) = by_pos.remove(&reserved) {
                let target = pos + delta;
                entry.position = target;
                by_pos.insert(target, entry);
            }
        }

        let mut tracks: Vec<QueueEntry> = by_pos.into_values().collect();
        tracks.sort_by_key(|e| e.position);
        self.state.tracks = tracks;

        // current_index tracks whichever entry it pointed at, wherever it
        // moved to — recompute by identity (position in the original
        // selection set shifts by delta; a gap row shifts by `shift`).
        if self.state.current_index >= 0 {
            if selected.contains(&self.state.current_index) {
                self.state.current_index += delta;
            } else if (lo..=hi).contains(&self.state.current_index) {
                self.state.current_index += shift;
            }
        }

        self.persist_all_tracks().await?;
        self.persist_header().await?;
        if self.state.shuffle {
            self.rebuild_shuffle_order();
        }

        Ok(positions.into_iter().map(|p| p + delta).collect())
    }

    /// Performs the inverse of a previous mutation, as recorded by the
    /// root's undo stack.
    pub async fn apply_inverse(&mut self, inverse: Inverse) -> Result<()> {
        match inverse {
            Inverse::RemoveRange(start, end) => {
                self.remove_at((start..end).collect()).await?;
            }
            Inverse::Reinsert(entries) => {
                let mut tracks = std::mem::take(&mut self.state.tracks);
                for entry in entries {
                    let idx = (entry.position as usize).min(tracks.len());
                    tracks.insert(idx, entry);
                }
                self.state.tracks = tracks;
                self.renumber_and_persist().await?;
            }
            Inverse::RestoreState(state) => {
                self.state = state;
                self.persist_all_tracks().await?;
                self.persist_header().await?;
                if self.state.shuffle {
                    self.rebuild_shuffle_order();
                }
            }
            Inverse::MoveBack(positions, delta) => {
                self.move_indices(positions, -delta).await?;
            }
            Inverse::None => {}
        }
        Ok(())
    }

    async fn renumber_and_persist(&mut self) -> Result<()> {
        for (i, entry) in self.state.tracks.iter_mut().enumerate() {
            entry.position = i as i64;
        }
        self.persist_all_tracks().await?;
        self.persist_header().await
    }

    /// `Clear()`.
    pub async fn clear(&mut self) -> Result<Vec<QueueEntry>> {
        let removed = std::mem::take(&mut self.state.tracks);
        self.state.current_index = -1;
        self.persist_all_tracks().await?;
        self.persist_header().await?;
        self.shuffle_order.clear();
        Ok(removed)
    }

    /// `ClearExceptPlaying()`.
    pub async fn clear_except_playing(&mut self) -> Result<Vec<QueueEntry>> {
        let current = self.current_track().cloned();
        let mut removed = Vec::new();
        let mut kept = Vec::new();
        for entry in self.state.tracks.drain(..) {
            if current.as_ref().is_some_and(|c| c.position == entry.position) {
                kept.push(entry);
            } else {
                removed.push(entry);
            }
        }
        self.state.tracks = kept;
        self.state.current_index = if self.state.tracks.is_empty() { -1 } else { 0 };
        self.renumber_and_persist().await?;
        if self.state.shuffle {
            self.rebuild_shuffle_order();
        }
        Ok(removed)
    }

    /// `RemoveAt(positions…)`.
    pub async fn remove_at(&mut self, mut positions: Vec<i64>) -> Result<Vec<QueueEntry>> {
        positions.sort_unstable();
        let current_path = self.current_track().map(|e| e.path.clone());
        let selected: std::collections::HashSet<i64> = positions.iter().copied().collect();
        let mut removed = Vec::new();
        let mut kept = Vec::new();
        for entry in self.state.tracks.drain(..) {
            if selected.contains(&entry.position) {
                removed.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.state.tracks = kept;
        self.renumber_and_persist_keep_current(current_path).await?;
        if self.state.shuffle {
            self.rebuild_shuffle_order();
        }
        Ok(removed)
    }

    async fn renumber_and_persist_keep_current(&mut self, current_path: Option<String>) -> Result<()> {
        for (i, entry) in self.state.tracks.iter_mut().enumerate() {
            entry.position = i as i64;
        }
        self.state.current_index = match current_path {
            Some(path) => self
                .state
                .tracks
                .iter()
                .position(|e| e.path == path)
                .map(|i| i as i64)
                .unwrap_or(-1),
            None => -1,
        };
        self.persist_all_tracks().await?;
        self.persist_header().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn entry(position: i64, name: &str) -> QueueEntry {
        QueueEntry {
            position,
            track_id: None,
            path: format!("/music/{name}.mp3"),
            title: name.to_string(),
            artist: None,
            album: None,
            track_number: None,
        }
    }

    async fn fresh_queue() -> Queue {
        let pool = test_pool().await;
        Queue::load(pool).await.unwrap()
    }

    #[tokio::test]
    async fn add_then_jump_and_positions_stay_contiguous() {
        let mut q = fresh_queue().await;
        q.add(vec![entry(0, "a"), entry(0, "b")]).await.unwrap();
        assert_eq!(q.state().tracks.len(), 2);
        assert_eq!(q.state().tracks[1].position, 1);
    }

    /// Seed test 3: "Queue auto-advance".
    #[tokio::test]
    async fn next_advances_to_the_following_track_when_repeat_is_off() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "x"), entry(0, "y")]).await.unwrap();
        assert_eq!(q.state().current_index, 0);
        let next = q.next().await.unwrap().unwrap();
        assert_eq!(next.title, "y");
        assert_eq!(q.state().current_index, 1);
        assert!(!q.has_next());
    }

    #[tokio::test]
    async fn repeat_all_wraps_to_the_start() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "x"), entry(0, "y")]).await.unwrap();
        q.set_repeat_mode(RepeatMode::All).await.unwrap();
        q.jump_to(1).await.unwrap();
        let wrapped = q.next().await.unwrap().unwrap();
        assert_eq!(wrapped.title, "x");
    }

    #[tokio::test]
    async fn repeat_one_replays_the_current_track() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "x"), entry(0, "y")]).await.unwrap();
        q.set_repeat_mode(RepeatMode::One).await.unwrap();
        let replayed = q.next().await.unwrap().unwrap();
        assert_eq!(replayed.title, "x");
        assert_eq!(q.state().current_index, 0);
    }

    /// Seed test 2: "Playlist add then move" adapted to the queue's own
    /// `move_indices`.
    #[tokio::test]
    async fn move_indices_shifts_one_entry_forward_preserving_others() {
        let mut q = fresh_queue().await;
        q.replace(vec![
            entry(0, "t1"),
            entry(0, "t2"),
            entry(0, "t3"),
            entry(0, "t4"),
            entry(0, "t5"),
        ])
        .await
        .unwrap();

        let new_positions = q.move_indices(vec![0], 2).await.unwrap();
        assert_eq!(new_positions, vec![2]);

        let titles: Vec<&str> = q.state().tracks.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["t2", "t3", "t1", "t4", "t5"]);

        let positions: Vec<i64> = q.state().tracks.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn move_indices_out_of_bounds_leaves_queue_unchanged() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "a"), entry(0, "b")]).await.unwrap();
        let before: Vec<String> = q.state().tracks.iter().map(|e| e.path.clone()).collect();
        let err = q.move_indices(vec![0], 5).await.unwrap_err();
        assert!(matches!(err, QueueError::OutOfBounds));
        let after: Vec<String> = q.state().tracks.iter().map(|e| e.path.clone()).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn remove_at_keeps_positions_contiguous() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "a"), entry(0, "b"), entry(0, "c")])
            .await
            .unwrap();
        q.remove_at(vec![1]).await.unwrap();
        let positions: Vec<i64> = q.state().tracks.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![0, 1]);
        let titles: Vec<&str> = q.state().tracks.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn undo_of_an_add_removes_the_appended_range() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "a")]).await.unwrap();
        let inverse = q.add(vec![entry(0, "b"), entry(0, "c")]).await.unwrap();
        assert_eq!(q.state().tracks.len(), 3);

        q.apply_inverse(inverse).await.unwrap();
        let titles: Vec<&str> = q.state().tracks.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a"]);
    }

    #[tokio::test]
    async fn undo_of_a_move_moves_it_back() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "t1"), entry(0, "t2"), entry(0, "t3")]).await.unwrap();
        let new_positions = q.move_indices(vec![0], 2).await.unwrap();
        q.apply_inverse(Inverse::MoveBack(new_positions, 2)).await.unwrap();
        let titles: Vec<&str> = q.state().tracks.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn clear_except_playing_keeps_only_the_current_track() {
        let mut q = fresh_queue().await;
        q.replace(vec![entry(0, "a"), entry(0, "b"), entry(0, "c")])
            .await
            .unwrap();
        q.jump_to(1).await.unwrap();
        q.clear_except_playing().await.unwrap();
        assert_eq!(q.state().tracks.len(), 1);
        assert_eq!(q.state().tracks[0].title, "b");
        assert_eq!(q.state().current_index, 0);
    }
}
