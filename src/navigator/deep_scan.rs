//! Deep scan and fuzzy search for the navigator's "jump anywhere" popup
//!: `ScanDir` streams batched results on a worker,
//! cancellable; matches are scored fzf-style and the top N rendered.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// One batch of discovered paths, or the terminal `done` message.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub items: Vec<PathBuf>,
    pub done: bool,
}

/// Cooperative cancellation token; cloned into the scan task, flipped by
/// the popup on dismiss.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

const BATCH_SIZE: usize = 64;

/// `ScanDir(ctx, root)`: walks a directory tree on a worker, coalescing
/// batches of up to [`BATCH_SIZE`] paths to avoid overwhelming the MVU
/// loop. Cancelling the token closes the channel early.
pub fn scan_dir(root: PathBuf, cancel: CancelToken) -> mpsc::Receiver<ScanResult> {
    let (tx, rx) = mpsc::channel(8);
    tokio::task::spawn_blocking(move || {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if cancel.is_cancelled() {
                return;
            }
            if entry.file_type().is_file() {
                batch.push(entry.path().to_path_buf());
                if batch.len() >= BATCH_SIZE {
                    let sent = std::mem::take(&mut batch);
                    if tx.blocking_send(ScanResult { items: sent, done: false }).is_err() {
                        return;
                    }
                }
            }
        }
        if !batch.is_empty() && !cancel.is_cancelled() {
            let _ = tx.blocking_send(ScanResult { items: batch, done: false });
        }
        let _ = tx.blocking_send(ScanResult { items: Vec::new(), done: true });
    });
    rx
}

/// One scored match, highest score first.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub path: PathBuf,
    pub score: i64,
}

/// fzf-style fuzzy ranking of `candidates` against `query`, returning the
/// top `limit` matches sorted by descending score.
pub fn fuzzy_rank(query: &str, candidates: &[PathBuf], limit: usize) -> Vec<Match> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<Match> = candidates
        .iter()
        .filter_map(|path| {
            let text = path.to_string_lossy();
            matcher.fuzzy_match(&text, query).map(|score| Match { path: path.clone(), score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[tokio::test]
    async fn scan_dir_eventually_finds_every_file_then_sends_done() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            File::create(dir.path().join(format!("f{i}.mp3"))).unwrap();
        }

        let mut rx = scan_dir(dir.path().to_path_buf(), CancelToken::new());
        let mut found = 0;
        let mut saw_done = false;
        while let Some(result) = rx.recv().await {
            found += result.items.len();
            if result.done {
                saw_done = true;
                break;
            }
        }
        assert_eq!(found, 5);
        assert!(saw_done);
    }

    #[tokio::test]
    async fn cancelling_stops_the_scan() {
        let dir = tempdir().unwrap();
        for i in 0..1000 {
            File::create(dir.path().join(format!("f{i}.mp3"))).unwrap();
        }
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut rx = scan_dir(dir.path().to_path_buf(), cancel);
        // Either the channel closes immediately or we get a done marker
        // with nothing further; both indicate the walk didn't run to
        // completion after cancellation.
        let mut messages = 0;
        while rx.recv().await.is_some() {
            messages += 1;
            if messages > 2 {
                break;
            }
        }
        assert!(messages <= 2);
    }

    #[test]
    fn fuzzy_rank_orders_best_match_first() {
        let candidates = vec![
            PathBuf::from("/music/Abbey Road/Come Together.mp3"),
            PathBuf::from("/music/Unrelated/Song.mp3"),
        ];
        let ranked = fuzzy_rank("abbey", &candidates, 10);
        assert_eq!(ranked[0].path, candidates[0]);
    }
}
