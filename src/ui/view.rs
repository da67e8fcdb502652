//! Pure rendering: turns a [`super::Model`] into ratatui widgets. Never
//! mutates anything.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};

use crate::player::{PlaybackStatus, format_duration};

use super::{ActivePopup, Focus, Model};

pub fn render(frame: &mut Frame, model: &Model) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(6), Constraint::Length(3), Constraint::Length(1)])
        .split(frame.area());

    render_navigator(frame, model, root[0]);
    render_queue_panel(frame, model, root[1]);
    render_transport(frame, model, root[2]);
    render_status(frame, model, root[3]);

    if let Some(popup) = model.active_popup() {
        render_popup(frame, model, popup, frame.area());
    }
}

/// Three-column Miller layout: the current parent's siblings, the current
/// parent's children (with the live cursor), and a preview of the focused
/// child's own children or, for a leaf, a metadata card (spec.md §4.5).
fn render_navigator(frame: &mut Frame, model: &Model, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 6), Constraint::Ratio(1, 6), Constraint::Ratio(4, 6)])
        .split(area);

    let icon_set = model.icon_set();
    let current_focused = matches!(model.focus(), Focus::Navigator);

    let parent_items: Vec<ListItem> = model
        .navigator()
        .parent_rows(icon_set)
        .iter()
        .map(|(name, icon, is_current)| {
            let style = if *is_current { Style::default().add_modifier(Modifier::BOLD) } else { Style::default() };
            ListItem::new(Line::from(Span::styled(format!("{icon}{name}"), style)))
        })
        .collect();
    frame.render_widget(
        List::new(parent_items).block(Block::default().borders(Borders::ALL).title("parent")),
        columns[0],
    );

    let rows = model.navigator().rows(icon_set);
    let items: Vec<ListItem> = rows
        .iter()
        .map(|(name, icon, is_focused)| {
            let style = if *is_focused && current_focused {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(format!("{icon}{name}"), style)))
        })
        .collect();
    let breadcrumb = model.navigator().breadcrumb();
    frame.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title(breadcrumb)),
        columns[1],
    );

    match model.navigator().preview_rows(icon_set) {
        Some(preview_rows) => {
            let preview_items: Vec<ListItem> = preview_rows
                .iter()
                .map(|(name, icon)| ListItem::new(Line::from(format!("{icon}{name}"))))
                .collect();
            frame.render_widget(
                List::new(preview_items).block(Block::default().borders(Borders::ALL).title("preview")),
                columns[2],
            );
        }
        None => {
            let card = model.navigator().focused_display_name().unwrap_or_default();
            frame.render_widget(
                Paragraph::new(card).block(Block::default().borders(Borders::ALL).title("preview")),
                columns[2],
            );
        }
    }
}

fn render_queue_panel(frame: &mut Frame, model: &Model, area: Rect) {
    let focused = matches!(model.focus(), Focus::QueuePanel);
    let cursor = model.queue_cursor();
    let current_index = model.queue().state().current_index;

    let items: Vec<ListItem> = model
        .queue()
        .state()
        .tracks
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let marker = if i as i64 == current_index { "> " } else { "  " };
            let artist = entry.artist.as_deref().unwrap_or("");
            let label = if artist.is_empty() { entry.title.clone() } else { format!("{artist} - {}", entry.title) };
            let style = if focused && i == cursor { Style::default().add_modifier(Modifier::REVERSED) } else { Style::default() };
            ListItem::new(Line::from(Span::styled(format!("{marker}{label}"), style)))
        })
        .collect();

    let title = format!("queue ({})", model.queue().state().tracks.len());
    frame.render_widget(List::new(items).block(Block::default().borders(Borders::ALL).title(title)), area);
}

fn render_transport(frame: &mut Frame, model: &Model, area: Rect) {
    let state = model.player().state();
    let status = match state.status {
        PlaybackStatus::Stopped => "stopped",
        PlaybackStatus::Playing => "playing",
        PlaybackStatus::Paused => "paused",
    };
    let current = model.queue().current_track();
    let title = current.map(|t| t.title.as_str()).unwrap_or("(nothing playing)");
    let artist = current.and_then(|t| t.artist.as_deref()).unwrap_or("");

    let position = format_duration(state.position);
    let duration = format_duration(state.duration);
    let repeat = match model.queue().state().repeat_mode {
        crate::model::RepeatMode::Off => "",
        crate::model::RepeatMode::All => " repeat:all",
        crate::model::RepeatMode::One => " repeat:one",
    };
    let shuffle = if model.queue().state().shuffle { " shuffle" } else { "" };

    let text = format!("[{status}] {artist} - {title}  {position} / {duration}{repeat}{shuffle}");
    frame.render_widget(Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("transport")), area);
}

fn render_status(frame: &mut Frame, model: &Model, area: Rect) {
    let text = model.status_message().unwrap_or("");
    frame.render_widget(Paragraph::new(text).style(Style::default().fg(Color::Gray)), area);
}

fn render_popup(frame: &mut Frame, model: &Model, popup: &ActivePopup, area: Rect) {
    let popup_area = centered_rect(60, 30, area);
    let text = match popup {
        ActivePopup::Error(message) => format!("Error\n\n{message}\n\n(press any key to dismiss)"),
        ActivePopup::LastfmSetup(machine) => machine.view(),
        ActivePopup::DeepSearch => {
            let (query, matches) = model.deep_search_view().unwrap_or(("", Vec::new()));
            let mut text = format!("jump to file: {query}\n\n");
            if matches.is_empty() {
                text.push_str("(no matches yet)");
            } else {
                for path in &matches {
                    text.push_str(path);
                    text.push('\n');
                }
            }
            text
        }
    };
    frame.render_widget(ratatui::widgets::Clear, popup_area);
    frame.render_widget(
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("popup")),
        popup_area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
