//! Terminal UI: an MVU-shaped application over ratatui, adapting the
//! classic `update`/`view` split to a `crossterm` event loop.
//! `Model` is the single source of truth; `runtime`
//! drives it from terminal input and timers and `view` renders it.

pub mod icons;
pub mod keymap;
pub mod popups;
pub mod runtime;
pub mod view;

use std::collections::VecDeque;
use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::external::{LastfmClient, NullLastfmClient};
use crate::model::{NavigationState, QueueEntry, RepeatMode, ViewMode};
use crate::navigator::{self, Columns, IconType, Node, Source};
use crate::player::Player;
use crate::queue::{self, Queue};
use crate::radio::RadioState;
use crate::scrobble::ScrobbleTracker;

use keymap::{Fed, LeaderAction, LeaderBuffer};
use popups::{LastfmSetupMachine, SetupCmd, SetupMsg};

/// At most one of these holds keyboard focus at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Navigator,
    QueuePanel,
    Popup,
}

/// The active browsing source, one variant per [`ViewMode`]. Each variant
/// carries both the `Source` implementation and its `Columns` state since
/// `Columns::navigate_to` needs the source to fetch children.
pub enum Navigator {
    Library {
        source: navigator::library_source::LibrarySource,
        columns: Columns<navigator::library_source::LibraryNode>,
    },
    Playlists {
        source: navigator::playlists_source::PlaylistsSource,
        columns: Columns<navigator::playlists_source::PlaylistsNode>,
    },
    File {
        source: navigator::file_source::FileSource,
        columns: Columns<navigator::file_source::FileNode>,
    },
}

impl Navigator {
    async fn library(pool: SqlitePool) -> Result<Self> {
        let source = navigator::library_source::LibrarySource::new(pool);
        let columns = Columns::new(&source).await?;
        Ok(Navigator::Library { source, columns })
    }

    async fn playlists(pool: SqlitePool) -> Result<Self> {
        let source = navigator::playlists_source::PlaylistsSource::new(pool);
        let columns = Columns::new(&source).await?;
        Ok(Navigator::Playlists { source, columns })
    }

    async fn file(root: PathBuf) -> Result<Self> {
        let source = navigator::file_source::FileSource::new(root);
        let columns = Columns::new(&source).await?;
        Ok(Navigator::File { source, columns })
    }

    pub fn view_mode(&self) -> ViewMode {
        match self {
            Navigator::Library { .. } => ViewMode::Library,
            Navigator::Playlists { .. } => ViewMode::Playlists,
            Navigator::File { .. } => ViewMode::File,
        }
    }

    pub async fn move_cursor(&mut self, delta: i64) -> Result<()> {
        Ok(match self {
            Navigator::Library { source, columns } => columns.move_cursor_and_refresh(source, delta).await?,
            Navigator::Playlists { source, columns } => columns.move_cursor_and_refresh(source, delta).await?,
            Navigator::File { source, columns } => columns.move_cursor_and_refresh(source, delta).await?,
        })
    }

    pub async fn drill_down(&mut self) -> Result<bool> {
        Ok(match self {
            Navigator::Library { source, columns } => columns.drill_down(source).await?,
            Navigator::Playlists { source, columns } => columns.drill_down(source).await?,
            Navigator::File { source, columns } => columns.drill_down(source).await?,
        })
    }

    pub async fn drill_up(&mut self) -> Result<bool> {
        Ok(match self {
            Navigator::Library { source, columns } => columns.drill_up(source).await?,
            Navigator::Playlists { source, columns } => columns.drill_up(source).await?,
            Navigator::File { source, columns } => columns.drill_up(source).await?,
        })
    }

    /// Rows to render in the current column: `(display name, icon, is_focused)`.
    pub fn rows(&self, icon_set: crate::config::IconSet) -> Vec<(String, &'static str, bool)> {
        fn rows_of<N: Node>(columns: &Columns<N>, icon_set: crate::config::IconSet) -> Vec<(String, &'static str, bool)> {
            columns
                .children()
                .iter()
                .enumerate()
                .map(|(i, node)| (node.display_name(), icons::glyph(node.icon_type(), icon_set), i == columns.focused_index()))
                .collect()
        }
        match self {
            Navigator::Library { columns, .. } => rows_of(columns, icon_set),
            Navigator::Playlists { columns, .. } => rows_of(columns, icon_set),
            Navigator::File { columns, .. } => rows_of(columns, icon_set),
        }
    }

    /// Left-hand column: `current_parent`'s siblings, with the parent
    /// itself highlighted (spec.md §4.5's three-column layout).
    pub fn parent_rows(&self, icon_set: crate::config::IconSet) -> Vec<(String, &'static str, bool)> {
        fn rows_of<N: Node>(columns: &Columns<N>, icon_set: crate::config::IconSet) -> Vec<(String, &'static str, bool)> {
            columns
                .parent_items()
                .iter()
                .enumerate()
                .map(|(i, node)| (node.display_name(), icons::glyph(node.icon_type(), icon_set), i == columns.parent_focused_index()))
                .collect()
        }
        match self {
            Navigator::Library { columns, .. } => rows_of(columns, icon_set),
            Navigator::Playlists { columns, .. } => rows_of(columns, icon_set),
            Navigator::File { columns, .. } => rows_of(columns, icon_set),
        }
    }

    /// Right-hand column: the focused child's own children, or `None` when
    /// the focus is a leaf (the caller then renders a metadata card from
    /// [`Navigator::focused_display_name`] instead).
    pub fn preview_rows(&self, icon_set: crate::config::IconSet) -> Option<Vec<(String, &'static str)>> {
        fn rows_of<N: Node>(columns: &Columns<N>, icon_set: crate::config::IconSet) -> Option<Vec<(String, &'static str)>> {
            if columns.focused().is_some_and(|n| !n.is_container()) {
                return None;
            }
            Some(columns.preview().iter().map(|node| (node.display_name(), icons::glyph(node.icon_type(), icon_set))).collect())
        }
        match self {
            Navigator::Library { columns, .. } => rows_of(columns, icon_set),
            Navigator::Playlists { columns, .. } => rows_of(columns, icon_set),
            Navigator::File { columns, .. } => rows_of(columns, icon_set),
        }
    }

    pub fn breadcrumb(&self) -> String {
        match self {
            Navigator::Library { columns, .. } => columns.current_parent().display_name(),
            Navigator::Playlists { columns, .. } => columns.current_parent().display_name(),
            Navigator::File { columns, .. } => columns.current_parent().display_name(),
        }
    }

    /// The library track id under the cursor, if the focused node is a
    /// concrete playable track (as opposed to a container).
    pub fn focused_track_id(&self) -> Option<i64> {
        match self {
            Navigator::Library { columns, .. } => match columns.focused() {
                Some(navigator::library_source::LibraryNode::Track { track_id, .. }) => Some(*track_id),
                _ => None,
            },
            Navigator::Playlists { columns, .. } => match columns.focused() {
                Some(navigator::playlists_source::PlaylistsNode::Track { track_id, .. }) => Some(*track_id),
                _ => None,
            },
            Navigator::File { .. } => None,
        }
    }

    /// The filesystem path under the cursor, for the file browser.
    pub fn focused_file_path(&self) -> Option<PathBuf> {
        match self {
            Navigator::File { columns, .. } => match columns.focused() {
                Some(node) if !node.is_dir => Some(node.path.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// The focused node's display name, for `NavigationState.selected_name`.
    pub fn focused_display_name(&self) -> Option<String> {
        match self {
            Navigator::Library { columns, .. } => columns.focused().map(Node::display_name),
            Navigator::Playlists { columns, .. } => columns.focused().map(Node::display_name),
            Navigator::File { columns, .. } => columns.focused().map(Node::display_name),
        }
    }

    /// The focused node's id string, for the per-view `*_selected_id`
    /// fields of `NavigationState`.
    pub fn focused_id(&self) -> Option<String> {
        match self {
            Navigator::Library { columns, .. } => columns.focused().map(Node::id),
            Navigator::Playlists { columns, .. } => columns.focused().map(Node::id),
            Navigator::File { columns, .. } => columns.focused().map(Node::id),
        }
    }

    /// The current directory, for `NavigationState.current_path` in file
    /// mode; `None` for the library/playlists views (spec.md §3 scopes
    /// `current_path` to "filesystem mode").
    pub fn current_path(&self) -> Option<String> {
        match self {
            Navigator::File { columns, .. } => Some(columns.current_parent().path.to_string_lossy().to_string()),
            _ => None,
        }
    }

    /// Scrolls to the node matching `id`, if the source's current view
    /// already has it among its children. Used to restore a persisted
    /// selection on startup.
    fn focus_by_id(&mut self, id: &str) -> bool {
        match self {
            Navigator::Library { columns, .. } => columns.focus_by_id(id),
            Navigator::Playlists { columns, .. } => columns.focus_by_id(id),
            Navigator::File { columns, .. } => columns.focus_by_id(id),
        }
    }

    /// Recomputes the parent/preview columns after a sync cursor change
    /// (`focus_by_id` at startup), which can't refresh them itself.
    async fn refresh_context(&mut self) -> Result<()> {
        match self {
            Navigator::Library { source, columns } => columns.refresh_context(source).await?,
            Navigator::Playlists { source, columns } => columns.refresh_context(source).await?,
            Navigator::File { source, columns } => columns.refresh_context(source).await?,
        }
        Ok(())
    }
}

/// Popups that can hold focus; the error queue is drained one message at
/// a time into an `Error` popup when nothing else is active.
pub enum ActivePopup {
    Error(String),
    LastfmSetup(LastfmSetupMachine),
    DeepSearch,
}

/// The whole application state.
pub struct Model {
    pool: SqlitePool,
    config: Config,
    player: Player,
    queue: Queue,
    navigator: Navigator,
    focus: Focus,
    leader: LeaderBuffer,
    undo_stack: VecDeque<queue::Inverse>,
    redo_stack: VecDeque<queue::Inverse>,
    error_queue: VecDeque<String>,
    active_popup: Option<ActivePopup>,
    radio: RadioState,
    scrobble_tracker: ScrobbleTracker,
    lastfm_client: Box<dyn LastfmClient>,
    lastfm_session_key: Option<String>,
    status_message: Option<String>,
    /// Accumulated seek delta (as a fraction of track duration) not yet
    /// flushed to the player; coalesces rapid seek keys per spec.md §4.2's
    /// 150 ms debounce.
    pending_seek: f32,
    seek_armed_at: Option<std::time::Instant>,
    /// Progress channel for an in-flight library scan, polled each tick so
    /// the blocking walk/tag work never runs on the MVU thread.
    scan_progress: Option<tokio::sync::mpsc::Receiver<crate::library::Progress>>,
    /// Mirrors the persisted `navigation_state` row; kept current on every
    /// cursor/drill move and written back through `nav_debounce`.
    nav_state: NavigationState,
    nav_debounce: navigator::persist::NavDebouncer,
    deep_search: Option<DeepSearchPopup>,
    quit: bool,
    /// Cursor into `queue.state().tracks`, owned by the queue panel per
    /// spec.md §3 ("UI components exclusively own their cursor").
    queue_cursor: usize,
}

/// `ff`: a local fuzzy search over every file below the configured
/// default folder (spec.md §4.6), not gated on slskd.
struct DeepSearchPopup {
    query: String,
    all_paths: Vec<PathBuf>,
    matches: Vec<navigator::deep_scan::Match>,
    results: tokio::sync::mpsc::Receiver<navigator::deep_scan::ScanResult>,
    cancel: navigator::deep_scan::CancelToken,
    scan_done: bool,
}

const UNDO_DEPTH: usize = 50;
const LEADER_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(300);
const NAV_DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(500);
const SEEK_DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(150);
const SEEK_STEP_SECS: f32 = 5.0;
const DEEP_SEARCH_LIMIT: usize = 20;

impl Model {
    pub async fn new(pool: SqlitePool, config: Config) -> Result<Self> {
        let player = Player::new().ok_or_else(|| Error::config("failed to initialize audio output"))?;
        let queue = Queue::load(pool.clone()).await?;
        let lastfm_session_key = crate::scrobble::load_session(&pool).await?.map(|s| s.session_key);

        let nav_state = navigator::persist::load_navigation(&pool).await?;
        let mut navigator = match nav_state.view_mode {
            ViewMode::Library => Navigator::library(pool.clone()).await?,
            ViewMode::Playlists => Navigator::playlists(pool.clone()).await?,
            ViewMode::File => {
                let root = if nav_state.current_path.is_empty() {
                    config.default_folder_path()
                } else {
                    PathBuf::from(&nav_state.current_path)
                };
                Navigator::file(root).await?
            }
        };
        let selected_id = match nav_state.view_mode {
            ViewMode::Library => &nav_state.library_selected_id,
            ViewMode::Playlists => &nav_state.playlists_selected_id,
            ViewMode::File => &nav_state.file_selected_id,
        };
        if let Some(id) = selected_id {
            navigator.focus_by_id(id);
        }
        navigator.refresh_context().await?;

        Ok(Self {
            pool,
            config,
            player,
            queue,
            navigator,
            focus: Focus::Navigator,
            leader: LeaderBuffer::new(),
            undo_stack: VecDeque::with_capacity(UNDO_DEPTH),
            redo_stack: VecDeque::with_capacity(UNDO_DEPTH),
            error_queue: VecDeque::new(),
            active_popup: None,
            radio: RadioState::new(),
            scrobble_tracker: ScrobbleTracker::new(),
            lastfm_client: Box::new(NullLastfmClient),
            lastfm_session_key,
            status_message: None,
            pending_seek: 0.0,
            seek_armed_at: None,
            scan_progress: None,
            nav_state,
            nav_debounce: navigator::persist::NavDebouncer::new(),
            deep_search: None,
            quit: false,
            queue_cursor: 0,
        })
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The queue panel's own cursor (distinct from `queue.current_index`,
    /// the track actually playing).
    pub fn queue_cursor(&self) -> usize {
        self.queue_cursor
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn icon_set(&self) -> crate::config::IconSet {
        self.config.icons
    }

    pub fn active_popup(&self) -> Option<&ActivePopup> {
        self.active_popup.as_ref()
    }

    /// Rendering data for the deep-search popup: the current query and the
    /// top-ranked matches, by display path.
    pub fn deep_search_view(&self) -> Option<(&str, Vec<String>)> {
        self.deep_search.as_ref().map(|popup| {
            (popup.query.as_str(), popup.matches.iter().map(|m| m.path.display().to_string()).collect())
        })
    }

    fn push_error(&mut self, message: impl Into<String>) {
        self.error_queue.push_back(message.into());
    }

    fn push_undo(&mut self, inverse: queue::Inverse) {
        if matches!(inverse, queue::Inverse::None) {
            return;
        }
        if self.undo_stack.len() >= UNDO_DEPTH {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(inverse);
        self.redo_stack.clear();
    }

    /// Updates `nav_state` from the navigator's current cursor/parent and
    /// arms the 500 ms debounce (spec.md §4.5) to write it back.
    fn sync_navigation_state(&mut self) {
        let view_mode = self.navigator.view_mode();
        self.nav_state.view_mode = view_mode;
        self.nav_state.selected_name = self.navigator.focused_display_name().unwrap_or_default();
        let focused_id = self.navigator.focused_id();
        match view_mode {
            ViewMode::Library => self.nav_state.library_selected_id = focused_id,
            ViewMode::Playlists => self.nav_state.playlists_selected_id = focused_id,
            ViewMode::File => {
                self.nav_state.file_selected_id = focused_id;
                if let Some(path) = self.navigator.current_path() {
                    self.nav_state.current_path = path;
                }
            }
        }
        self.nav_debounce.record(self.nav_state.clone(), std::time::Instant::now());
    }

    /// Driven by the runtime's leader-poll tick: writes the debounced
    /// navigation state once 500 ms have passed with no further moves.
    pub async fn flush_navigation(&mut self, now: std::time::Instant) -> Result<()> {
        if let Some(state) = self.nav_debounce.flush_if_due(now, NAV_DEBOUNCE) {
            navigator::persist::save_navigation(&self.pool, &state).await?;
        }
        Ok(())
    }

    /// Called on shutdown: the persistence store's `Close` flushes any
    /// debounced pending navigation write regardless of the timer
    /// (spec.md §3, "Ownership and lifecycle").
    pub async fn flush_navigation_now(&mut self) -> Result<()> {
        if let Some(state) = self.nav_debounce.take_pending() {
            navigator::persist::save_navigation(&self.pool, &state).await?;
        }
        Ok(())
    }

    /// Shift+Left/Shift+Right seek accumulator: coalesces rapid presses
    /// into one `Player::seek` call 150 ms after the last one (spec.md
    /// §4.2), each press moving 5 seconds of track time.
    fn request_seek(&mut self, forward: bool) {
        let state = self.player.state();
        let duration = state.duration.as_secs_f32();
        if duration <= 0.0 {
            return;
        }
        let base_secs = if self.seek_armed_at.is_some() {
            self.pending_seek * duration
        } else {
            state.position.as_secs_f32()
        };
        let target_secs = if forward { base_secs + SEEK_STEP_SECS } else { base_secs - SEEK_STEP_SECS };
        self.pending_seek = (target_secs / duration).clamp(0.0, 1.0);
        self.seek_armed_at = Some(std::time::Instant::now());
    }

    /// Driven by the runtime's leader-poll tick alongside `flush_navigation`.
    pub fn flush_seek(&mut self, now: std::time::Instant) -> Result<()> {
        let Some(armed) = self.seek_armed_at else { return Ok(()) };
        if now.duration_since(armed) < SEEK_DEBOUNCE {
            return Ok(());
        }
        self.seek_armed_at = None;
        self.player.seek(self.pending_seek).map_err(crate::error::Error::Playback)
    }

    /// Promotes the next queued error into the popup slot, if nothing else
    /// currently has focus there.
    fn promote_error_popup(&mut self) {
        if self.active_popup.is_none()
            && let Some(message) = self.error_queue.pop_front()
        {
            self.active_popup = Some(ActivePopup::Error(message));
            self.focus = Focus::Popup;
        }
    }

    /// Folds pending [`crate::player::PlayerEvent`]s into the model: auto
    /// advance on finish, scrobble-threshold polling, radio top-up.
    pub async fn poll_player(&mut self) -> Result<()> {
        use crate::player::PlayerEvent;

        let events = self.player.poll_events();
        for event in events {
            match event {
                PlayerEvent::PlaybackFinished => {
                    self.advance_queue().await?;
                }
                PlayerEvent::TrackLoaded { path, duration, .. } => {
                    let path = path.to_string_lossy().to_string();
                    let current = self.queue.current_track().cloned();
                    let artist = current.as_ref().and_then(|t| t.artist.clone());
                    let title = current.as_ref().map(|t| t.title.clone()).unwrap_or_default();
                    let album = current.as_ref().and_then(|t| t.album.clone());

                    self.scrobble_tracker.start_track(&path, now_unix(), duration.as_secs() as i64);
                    self.radio.record_played(&path, artist.as_deref(), self.config.radio.artist_repeat_window);
                    if let Some(session_key) = &self.lastfm_session_key {
                        let now_playing = crate::external::NowPlaying { artist: artist.unwrap_or_default(), track: title, album };
                        // Non-fatal: an unauthenticated or unreachable Last.fm
                        // must never block playback.
                        let _ = crate::scrobble::send_now_playing(self.lastfm_client.as_ref(), session_key, &now_playing).await;
                    }
                }
                PlayerEvent::Error(message) => self.push_error(message),
                PlayerEvent::StatusChanged(_) | PlayerEvent::PositionChanged(_) => {}
            }
        }

        if let Some(current) = self.queue.current_track() {
            let state = self.player.state();
            let path = current.path.clone();
            if self.scrobble_tracker.poll(&path, state.position.as_secs() as i64) {
                let scrobble = crate::model::PendingScrobble {
                    id: 0,
                    path: path.clone(),
                    artist: current.artist.clone().unwrap_or_default(),
                    track: current.title.clone(),
                    album: current.album.clone(),
                    duration_secs: state.duration.as_secs() as i64,
                    started_at: now_unix(),
                    musicbrainz_recording_id: None,
                    attempts: 0,
                    last_error: None,
                    created_at: now_unix(),
                };
                let client = self
                    .lastfm_session_key
                    .as_deref()
                    .map(|key| (self.lastfm_client.as_ref(), key));
                crate::scrobble::scrobble_or_enqueue(&self.pool, client, scrobble).await?;
            }
        }
        self.promote_error_popup();
        Ok(())
    }

    /// `fr`/`fR`: kicks off an incremental (or, with `full`, a full) library
    /// scan on a background task. Replaces any scan already in flight.
    fn spawn_scan(&mut self, full: bool) {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let pool = self.pool.clone();
        let sources = self.config.library_sources.clone();
        tokio::spawn(async move {
            let _ = crate::library::refresh(pool, sources, full, tx).await;
        });
        self.scan_progress = Some(rx);
        self.status_message = Some("scan starting...".to_string());
    }

    /// Drains whatever scan-progress messages have arrived since the last
    /// tick without blocking; drops the receiver once the sender side
    /// closes.
    pub fn poll_scan_progress(&mut self) {
        let Some(rx) = &mut self.scan_progress else { return };
        loop {
            match rx.try_recv() {
                Ok(progress) => self.status_message = Some(describe_scan_progress(&progress)),
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    self.scan_progress = None;
                    break;
                }
            }
        }
    }

    /// Driven by the runtime's 5-minute ticker. A no-op if Last.fm isn't
    /// linked; failures update the pending rows' attempt counters rather
    /// than surfacing a popup.
    pub async fn retry_scrobbles(&mut self) -> Result<()> {
        let Some(session_key) = self.lastfm_session_key.clone() else {
            return Ok(());
        };
        let outcome = crate::scrobble::retry_pending(&self.pool, self.lastfm_client.as_ref(), &session_key).await?;
        if outcome.sent > 0 || outcome.dropped > 0 {
            self.status_message = Some(format!(
                "scrobble retry: {} sent, {} dropped, {} pending",
                outcome.sent, outcome.dropped, outcome.remaining
            ));
        }
        Ok(())
    }

    async fn advance_queue(&mut self) -> Result<()> {
        match self.queue.next().await? {
            Some(track) => {
                self.player.load_and_play(PathBuf::from(&track.path))?;
            }
            None if self.radio.is_enabled() => {
                let result = crate::radio::fill(&self.pool, self.lastfm_client.as_ref(), &self.radio, &self.config.radio, None).await?;
                if result.tracks.is_empty() {
                    self.status_message = result.message;
                } else {
                    let entries: Vec<QueueEntry> =
                        result.tracks.iter().enumerate().map(|(i, t)| QueueEntry::from_track(i as i64, t)).collect();
                    if let Some(track) = self.queue.add_and_play(entries).await? {
                        self.player.load_and_play(PathBuf::from(&track.path))?;
                    }
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Routes one key event following the strategy table in spec.md §4.1:
    /// INTERCEPT keys first (quit, focus swap, view switch), then the
    /// leader buffer, then DELEGATE to whichever child has focus.
    pub async fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if let Some(ActivePopup::Error(_)) = &self.active_popup {
            self.active_popup = None;
            self.focus = Focus::Navigator;
            return Ok(());
        }
        if let Some(ActivePopup::LastfmSetup(_)) = &self.active_popup {
            return self.handle_lastfm_setup_key(key).await;
        }
        if let Some(ActivePopup::DeepSearch) = &self.active_popup {
            return self.handle_deep_search_key(key).await;
        }

        if key.code == KeyCode::Char('q') && key.modifiers.is_empty() {
            self.quit = true;
            return Ok(());
        }
        if key.code == KeyCode::Char('z') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return if key.modifiers.contains(KeyModifiers::SHIFT) { self.redo().await } else { self.undo().await };
        }
        if key.code == KeyCode::Tab {
            self.focus = match self.focus {
                Focus::Navigator => Focus::QueuePanel,
                _ => Focus::Navigator,
            };
            return Ok(());
        }
        if key.modifiers.contains(KeyModifiers::SHIFT) && matches!(key.code, KeyCode::Left | KeyCode::Right) {
            self.request_seek(key.code == KeyCode::Right);
            return Ok(());
        }
        match key.code {
            KeyCode::F(1) => return self.switch_view(ViewMode::Library).await,
            KeyCode::F(2) => return self.switch_view(ViewMode::Playlists).await,
            KeyCode::F(3) => return self.switch_view(ViewMode::File).await,
            _ => {}
        }

        if self.leader.is_armed() || matches!(key.code, KeyCode::Char('f') | KeyCode::Char(' ')) {
            if let KeyCode::Char(c) = key.code {
                match self.leader.push(c, std::time::Instant::now()) {
                    Fed::Passthrough(c) => return self.delegate_char(c).await,
                    Fed::Buffering => return Ok(()),
                    Fed::Complete(action) => return self.run_leader_action(action).await,
                    Fed::Invalid => return Ok(()),
                }
            }
        }

        self.delegate_key(key).await
    }

    pub async fn leader_timeout(&mut self) -> Result<()> {
        if let Some(action) = self.leader.timeout() {
            self.run_leader_action(action).await?;
        }
        Ok(())
    }

    /// Whether the 300 ms key-sequence timer should fire right now
    ///; the runtime polls this rather than
    /// scheduling a fresh timer per keystroke.
    pub fn leader_expired(&self, now: std::time::Instant) -> bool {
        self.leader.expired(now, LEADER_TIMEOUT)
    }

    async fn switch_view(&mut self, mode: ViewMode) -> Result<()> {
        self.navigator = match mode {
            ViewMode::Library => Navigator::library(self.pool.clone()).await?,
            ViewMode::Playlists => Navigator::playlists(self.pool.clone()).await?,
            ViewMode::File => Navigator::file(self.config.default_folder_path()).await?,
        };
        self.sync_navigation_state();
        Ok(())
    }

    async fn run_leader_action(&mut self, action: LeaderAction) -> Result<()> {
        match action {
            LeaderAction::TogglePlayPause => {
                self.player.toggle().map_err(crate::error::Error::Playback)?;
            }
            LeaderAction::RefreshLibrary => self.spawn_scan(false),
            LeaderAction::FullRescan => self.spawn_scan(true),
            LeaderAction::DeepSearch => self.open_deep_search(),
            LeaderAction::Sources => {
                self.status_message = Some(if self.config.library_sources.is_empty() {
                    "no library sources configured".to_string()
                } else {
                    format!(
                        "library sources: {}",
                        self.config.library_sources.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
                    )
                });
            }
            LeaderAction::Download => {
                self.push_error("This feature requires slskd to be configured".to_string());
                self.promote_error_popup();
            }
            LeaderAction::LastfmSetup => {
                self.active_popup = Some(ActivePopup::LastfmSetup(popups::new_lastfm_setup()));
                self.focus = Focus::Popup;
            }
        }
        Ok(())
    }

    async fn handle_lastfm_setup_key(&mut self, key: KeyEvent) -> Result<()> {
        let Some(ActivePopup::LastfmSetup(machine)) = &mut self.active_popup else {
            return Ok(());
        };
        let message = match key.code {
            KeyCode::Char(c) => crate::popup::MachineMessage::Inner(SetupMsg::Char(c)),
            KeyCode::Backspace => crate::popup::MachineMessage::Inner(SetupMsg::Backspace),
            KeyCode::Enter => crate::popup::MachineMessage::Inner(SetupMsg::Submit),
            KeyCode::Esc => crate::popup::MachineMessage::Back,
            _ => return Ok(()),
        };
        let (closed, command) = machine.handle(message);
        if closed {
            self.active_popup = None;
            self.focus = Focus::Navigator;
            if let Some(SetupCmd::Save { api_key, api_secret }) = command {
                self.config.lastfm.api_key = api_key;
                self.config.lastfm.api_secret = api_secret;
                crate::config::save_async(self.config.clone()).await.map_err(|e| Error::config(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// `ff`: starts a background walk of the default folder and opens the
    /// fuzzy-search popup over it.
    fn open_deep_search(&mut self) {
        let cancel = navigator::deep_scan::CancelToken::new();
        let results = navigator::deep_scan::scan_dir(self.config.default_folder_path(), cancel.clone());
        self.deep_search = Some(DeepSearchPopup {
            query: String::new(),
            all_paths: Vec::new(),
            matches: Vec::new(),
            results,
            cancel,
            scan_done: false,
        });
        self.active_popup = Some(ActivePopup::DeepSearch);
        self.focus = Focus::Popup;
    }

    /// Drains whatever the deep-search scan has produced since the last
    /// tick and re-ranks matches against the current query.
    pub fn poll_deep_search(&mut self) {
        let Some(popup) = &mut self.deep_search else { return };
        let mut changed = false;
        loop {
            match popup.results.try_recv() {
                Ok(batch) => {
                    popup.all_paths.extend(batch.items);
                    popup.scan_done = popup.scan_done || batch.done;
                    changed = true;
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    popup.scan_done = true;
                    break;
                }
            }
        }
        if changed && !popup.query.is_empty() {
            popup.matches = navigator::deep_scan::fuzzy_rank(&popup.query, &popup.all_paths, DEEP_SEARCH_LIMIT);
        }
    }

    async fn handle_deep_search_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => self.close_deep_search(),
            KeyCode::Char(c) => {
                if let Some(popup) = &mut self.deep_search {
                    popup.query.push(c);
                    popup.matches = navigator::deep_scan::fuzzy_rank(&popup.query, &popup.all_paths, DEEP_SEARCH_LIMIT);
                }
            }
            KeyCode::Backspace => {
                if let Some(popup) = &mut self.deep_search {
                    popup.query.pop();
                    popup.matches = navigator::deep_scan::fuzzy_rank(&popup.query, &popup.all_paths, DEEP_SEARCH_LIMIT);
                }
            }
            KeyCode::Enter => {
                let chosen = self.deep_search.as_ref().and_then(|popup| popup.matches.first().map(|m| m.path.clone()));
                self.close_deep_search();
                if let Some(path) = chosen {
                    self.play_path(path).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close_deep_search(&mut self) {
        if let Some(popup) = self.deep_search.take() {
            popup.cancel.cancel();
        }
        self.active_popup = None;
        self.focus = Focus::Navigator;
    }

    /// Plays a bare filesystem path, looking up library metadata for it
    /// when available and otherwise falling back to the bare file name.
    async fn play_path(&mut self, path: PathBuf) -> Result<()> {
        let track = crate::library::track_by_path(&self.pool, &path.to_string_lossy()).await?.unwrap_or_else(|| crate::model::Track {
            id: 0,
            path: path.to_string_lossy().to_string(),
            mtime: 0,
            artist: None,
            album_artist: None,
            album: None,
            title: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            disc_number: None,
            track_number: None,
            year: None,
            genre: None,
            label: None,
            original_date: None,
            release_date: None,
            added_at: 0,
            updated_at: 0,
        });
        let entry = QueueEntry::from_track(0, &track);
        if let Some(played) = self.queue.add_and_play(vec![entry]).await? {
            self.player.load_and_play(PathBuf::from(&played.path))?;
        }
        Ok(())
    }

    async fn delegate_char(&mut self, c: char) -> Result<()> {
        self.delegate_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::empty())).await
    }

    /// DELEGATE strategy: forwarded only to whichever child currently has
    /// focus.
    async fn delegate_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.focus {
            Focus::Navigator => self.navigator_key(key).await,
            Focus::QueuePanel => self.queue_key(key).await,
            Focus::Popup => Ok(()),
        }
    }

    async fn navigator_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.navigator.move_cursor(1).await?;
                self.sync_navigation_state();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.navigator.move_cursor(-1).await?;
                self.sync_navigation_state();
            }
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter => {
                if self.navigator.drill_down().await? {
                    self.sync_navigation_state();
                } else {
                    self.play_focused().await?;
                }
            }
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Backspace => {
                if self.navigator.drill_up().await? {
                    self.sync_navigation_state();
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn play_focused(&mut self) -> Result<()> {
        if let Some(id) = self.navigator.focused_track_id() {
            if let Some(track) = crate::library::track_by_id(&self.pool, id).await? {
                let entry = QueueEntry::from_track(0, &track);
                if let Some(played) = self.queue.add_and_play(vec![entry]).await? {
                    self.player.load_and_play(PathBuf::from(&played.path))?;
                }
            }
        } else if let Some(path) = self.navigator.focused_file_path() {
            self.play_path(path).await?;
        }
        Ok(())
    }

    async fn queue_key(&mut self, key: KeyEvent) -> Result<()> {
        let len = self.queue.state().tracks.len();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if len > 0 {
                    self.queue_cursor = (self.queue_cursor + 1).min(len - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.queue_cursor = self.queue_cursor.saturating_sub(1);
            }
            KeyCode::Enter => {
                if self.queue_cursor < len
                    && let Some(track) = self.queue.jump_to(self.queue_cursor as i64).await?
                {
                    self.player.load_and_play(PathBuf::from(&track.path))?;
                }
            }
            KeyCode::Char('x') => {
                if self.queue_cursor < len {
                    let removed = self.queue.remove_at(vec![self.queue_cursor as i64]).await?;
                    if !removed.is_empty() {
                        self.push_undo(queue::Inverse::Reinsert(removed));
                    }
                    self.queue_cursor = self.queue_cursor.min(self.queue.state().tracks.len().saturating_sub(1));
                }
            }
            KeyCode::Char('r') => self.cycle_repeat().await?,
            KeyCode::Char('s') => {
                let shuffle = !self.queue.state().shuffle;
                self.queue.set_shuffle(shuffle).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn cycle_repeat(&mut self) -> Result<()> {
        let next = match self.queue.state().repeat_mode {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        };
        self.queue.set_repeat_mode(next).await?;
        Ok(())
    }

    async fn undo(&mut self) -> Result<()> {
        if let Some(inverse) = self.undo_stack.pop_back() {
            let snapshot_before = self.queue.snapshot();
            self.queue.apply_inverse(inverse).await?;
            self.redo_stack.push_back(queue::Inverse::RestoreState(snapshot_before));
        }
        Ok(())
    }

    async fn redo(&mut self) -> Result<()> {
        if let Some(inverse) = self.redo_stack.pop_back() {
            self.queue.apply_inverse(inverse).await?;
        }
        Ok(())
    }
}

fn describe_scan_progress(progress: &crate::library::Progress) -> String {
    use crate::library::Progress;
    match progress {
        Progress::Scanning { current } => format!("scanning... {current} files found"),
        Progress::Processing { current, total, current_file } => {
            format!("tagging {current}/{total}: {}", current_file.display())
        }
        Progress::Cleaning { removed } => format!("cleaning up {removed} missing files"),
        Progress::Done { added, updated, removed } => {
            format!("scan complete: {added} added, {updated} updated, {removed} removed")
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
