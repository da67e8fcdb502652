//! Drives the MVU loop from terminal input and timers: reads events, calls into [`Model`], and
//! re-renders via [`super::view::render`].
//!
//! The loop itself never blocks on anything but the next event or timer
//! tick; all I/O (scans, database writes, playback) is issued from
//! [`Model`] methods as already-spawned background work and folded back in
//! on the next tick.

use std::io;
use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::error::Result;

use super::Model;

/// 1 s position/scrobble-threshold tick.
const POSITION_TICK: Duration = Duration::from_millis(1_000);
/// Granularity for polling the leader-key timeout; finer than the 300 ms
/// timeout itself so expiry is observed promptly.
const LEADER_POLL: Duration = Duration::from_millis(50);
/// Offline-scrobble retry cadence.
const SCROBBLE_RETRY_TICK: Duration = Duration::from_secs(5 * 60);

pub async fn run(mut model: Model) -> Result<()> {
    let mut terminal = init_terminal()?;
    let result = event_loop(&mut terminal, &mut model).await;
    // Flush any debounced navigation write regardless of the 500 ms timer
    // before tearing down, per spec.md §3's close-time flush. Errors here
    // must never prevent restoring the terminal.
    let _ = model.flush_navigation_now().await;
    restore_terminal()?;
    result
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().map_err(crate::error::Error::Io)?;
    execute!(io::stdout(), EnterAlternateScreen).map_err(crate::error::Error::Io)?;
    Terminal::new(CrosstermBackend::new(io::stdout())).map_err(crate::error::Error::Io)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode().map_err(crate::error::Error::Io)?;
    execute!(io::stdout(), LeaveAlternateScreen).map_err(crate::error::Error::Io)?;
    Ok(())
}

async fn event_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, model: &mut Model) -> Result<()> {
    let mut events = EventStream::new();
    let mut position_timer = tokio::time::interval(POSITION_TICK);
    let mut leader_timer = tokio::time::interval(LEADER_POLL);
    let mut scrobble_retry_timer = tokio::time::interval(SCROBBLE_RETRY_TICK);

    terminal.draw(|frame| super::view::render(frame, model)).map_err(crate::error::Error::Io)?;

    loop {
        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                        model.handle_key(key).await?;
                    }
                    Some(Ok(Event::Resize(_, _))) | Some(Ok(Event::Key(_))) => {}
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(crate::error::Error::Io(e)),
                    None => break,
                }
            }
            _ = position_timer.tick() => {
                model.poll_player().await?;
                model.poll_scan_progress();
                model.poll_deep_search();
            }
            _ = leader_timer.tick() => {
                let now = std::time::Instant::now();
                if model.leader_expired(now) {
                    model.leader_timeout().await?;
                }
                model.flush_navigation(now).await?;
                model.flush_seek(now)?;
            }
            _ = scrobble_retry_timer.tick() => {
                model.retry_scrobbles().await?;
            }
        }

        if model.should_quit() {
            break;
        }

        terminal.draw(|frame| super::view::render(frame, model)).map_err(crate::error::Error::Io)?;
    }

    Ok(())
}
