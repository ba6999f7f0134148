//! Add-service overlay: catalog entries not currently running, with
//! multi-select checkboxes.

use crate::tui::app::AddModal;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

pub fn draw(f: &mut Frame, modal: &AddModal, area: Rect) {
    let name_width = modal
        .available
        .iter()
        .map(|n| n.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(7, 30);

    let mut rows: Vec<Line> = Vec::with_capacity(modal.available.len() + 2);

    rows.push(Line::from(Span::styled(
        format!("  {:<width$}  SELECT", "SERVICE", width = name_width),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )));
    let sep_width = (area.width.saturating_sub(4) as usize).clamp(20, 200);
    rows.push(Line::from(Span::styled(
        "─".repeat(sep_width),
        Style::default().fg(Color::DarkGray),
    )));

    for (i, name) in modal.available.iter().enumerate() {
        let highlight = if i == modal.cursor { "► " } else { "  " };
        let checkbox = if modal.is_selected(name) { "[✓]" } else { "[ ]" };

        let display = super::logs::pad_right(
            &super::logs::truncate_ellipsis(name, name_width),
            name_width,
        );

        let row_style = if modal.is_placeholder(name) {
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC)
        } else {
            Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)
        };

        let mut spans = vec![Span::raw(highlight.to_string()), Span::styled(display, row_style)];
        if !modal.is_placeholder(name) {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                checkbox.to_string(),
                Style::default().fg(Color::DarkGray),
            ));
        }
        rows.push(Line::from(spans));
    }

    let box_height = (rows.len() as u16 + 2).min(area.height.saturating_sub(2));
    let box_area = Rect::new(area.x, area.y, area.width, box_height);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue))
        .title(" Add services ");
    f.render_widget(Paragraph::new(rows).block(block), box_area);

    // Instructions under the box
    if box_area.bottom() < area.bottom() {
        let help_area = Rect::new(area.x, box_area.bottom(), area.width, 1);
        f.render_widget(
            Paragraph::new(Span::styled(
                "↑↓:navigate • Space:toggle selection • Enter:add selected • Esc:cancel",
                Style::default().fg(Color::DarkGray),
            )),
            help_area,
        );
    }
}
