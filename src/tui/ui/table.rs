//! Services table: one row per running service, columns dropped at narrow
//! widths so the name and status always fit.

use crate::service::state::{ServiceSnapshot, Status};
use chrono::Utc;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Widths below which optional columns disappear.
const UPTIME_MIN_WIDTH: u16 = 72;
const RESTARTS_MIN_WIDTH: u16 = 88;
const STATUS_COMPRESS_WIDTH: u16 = 40;

const MAX_NAME_WIDTH: usize = 30;

pub fn draw(f: &mut Frame, services: &[ServiceSnapshot], selected: usize, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    if services.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "⚬ No services running...",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ))
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let width = area.width;
    let show_uptime = width >= UPTIME_MIN_WIDTH;
    let show_restarts = width >= RESTARTS_MIN_WIDTH;
    let compress_status = width < STATUS_COMPRESS_WIDTH;

    let name_width = services
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(7, MAX_NAME_WIDTH);

    let status_width = if compress_status { 3 } else { 10 };

    let mut rows: Vec<Line> = Vec::with_capacity(services.len() + 2);

    // Header
    let mut header = format!(
        "  {:<name_width$}  {:<width$}",
        "SERVICE",
        if compress_status { "ST" } else { "STATUS" },
        width = status_width + 2,
    );
    if show_uptime {
        header.push_str(" UPTIME  ");
    }
    if show_restarts {
        header.push_str(" RESTARTS");
    }
    rows.push(Line::from(Span::styled(
        header,
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )));

    let sep_width = (width.saturating_sub(4) as usize).clamp(20, 200);
    rows.push(Line::from(Span::styled(
        "─".repeat(sep_width),
        Style::default().fg(Color::DarkGray),
    )));

    for (i, svc) in services.iter().enumerate() {
        let (icon, text, color) = status_cell(svc.status, compress_status);

        let highlight = if i == selected { "► " } else { "  " };
        let name = super::logs::pad_right(
            &super::logs::truncate_ellipsis(&svc.name, name_width),
            name_width,
        );

        let mut spans = vec![
            Span::raw(highlight.to_string()),
            Span::styled(
                name,
                Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(
                format!("{} {:<width$}", icon, text, width = status_width),
                Style::default().fg(color),
            ),
        ];

        if show_uptime {
            spans.push(Span::styled(
                format!(" {:<8}", format_uptime(svc)),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if show_restarts {
            spans.push(Span::styled(
                format!(" {}", svc.reconnect_count),
                Style::default().fg(Color::DarkGray),
            ));
        }

        // The status row carries the last error, clipped for display
        if !svc.last_error.is_empty() {
            let clipped = super::logs::truncate_ellipsis(&svc.last_error, 100);
            spans.push(Span::styled(
                format!("  {}", clipped),
                Style::default().fg(Color::Red),
            ));
        }

        rows.push(Line::from(spans));
    }

    f.render_widget(Paragraph::new(rows).block(block), area);
}

fn status_cell(status: Status, compress: bool) -> (&'static str, &'static str, Color) {
    let (icon, long, short, color) = match status {
        Status::Online => ("●", "ONLINE", "ONL", Color::Green),
        Status::Connecting => ("◐", "CONNECTING", "CON", Color::Yellow),
        Status::Reconnecting => ("◌", "RECONNECT", "REC", Color::Yellow),
        Status::Error => ("✗", "ERROR", "ERR", Color::Red),
        Status::Stopped => ("○", "STOPPED", "STP", Color::DarkGray),
    };
    (icon, if compress { short } else { long }, color)
}

fn format_uptime(svc: &ServiceSnapshot) -> String {
    let Some(start) = svc.start_time else {
        return "-".to_string();
    };
    let secs = (Utc::now() - start).num_seconds().max(0);

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Rows the table occupies for a given fleet size (borders included);
/// the run loop uses this to size the log viewport.
pub fn table_height(service_count: usize) -> u16 {
    if service_count == 0 {
        // Single message row + borders
        3
    } else {
        // header + separator + rows + borders
        (service_count as u16) + 4
    }
}
