//! Rendering: vertical stack of services table, scrollable merged log view
//! and help line, plus the add-modal and shutdown overlays.

pub mod logs;
pub mod modal;
pub mod table;

use crate::tui::app::App;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

pub fn draw(f: &mut Frame, app: &App) {
    if app.quitting {
        draw_shutdown(f);
        return;
    }

    if let Some(ref m) = app.modal {
        modal::draw(f, m, f.area());
        return;
    }

    let area = f.area();
    let table_height = table::table_height(app.services.len()).min(area.height.saturating_sub(6));
    let chunks = Layout::vertical([
        Constraint::Length(table_height),
        Constraint::Min(3),
        Constraint::Length(3),
    ])
    .split(area);

    table::draw(f, &app.services, app.selected, chunks[0]);
    draw_log_box(f, app, chunks[1]);
    draw_help(f, chunks[2]);
}

fn draw_log_box(f: &mut Frame, app: &App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    let offset = app.log_scroll_offset(height);

    let visible: Vec<_> = app
        .log_lines
        .iter()
        .skip(offset)
        .take(height)
        .cloned()
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    f.render_widget(Paragraph::new(visible).block(block), area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let help = Paragraph::new(Span::styled(
        "↑↓:navigate/scroll • r:restart • s:stop • a:add • q:quit",
        Style::default().fg(Color::DarkGray),
    ))
    .block(block);
    f.render_widget(help, area);
}

fn draw_shutdown(f: &mut Frame) {
    let area = f.area();
    let box_width = 36u16.min(area.width);
    let box_height = 3u16.min(area.height);
    let centered = Rect::new(
        area.x + (area.width.saturating_sub(box_width)) / 2,
        area.y + (area.height.saturating_sub(box_height)) / 2,
        box_width,
        box_height,
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    let message = Paragraph::new(Span::styled(
        "✓ Shutting down gracefully...",
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    ))
    .centered()
    .block(block);
    f.render_widget(message, centered);
}
