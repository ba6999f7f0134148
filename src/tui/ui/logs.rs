//! Merged log view: every service's log ring, sorted by time, wrapped to the
//! viewport width with continuation lines indented under the prefix.

use crate::service::state::ServiceSnapshot;
use chrono::{DateTime, Local, Utc};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Render the combined log content for the viewport. Lines are pre-wrapped
/// to `max_width`, so the caller can scroll by plain line index.
pub fn render_merged(services: &[ServiceSnapshot], max_width: usize) -> Vec<Line<'static>> {
    struct Tagged<'a> {
        service: &'a str,
        time: DateTime<Utc>,
        message: &'a str,
        is_error: bool,
    }

    let mut all: Vec<Tagged> = services
        .iter()
        .flat_map(|svc| {
            svc.log_history.iter().map(move |entry| Tagged {
                service: &svc.name,
                time: entry.time,
                message: &entry.message,
                is_error: entry.is_error,
            })
        })
        .collect();
    all.sort_by_key(|t| t.time);

    if all.is_empty() {
        return vec![Line::from(Span::styled(
            "No logs yet...",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ))];
    }

    let name_width = (max_width / 4).clamp(8, 24);
    // "[" + name + " " + HH:MM:SS + "] "
    let prefix_width = name_width + 12;
    let message_width = max_width.saturating_sub(prefix_width).max(20);

    let mut lines = Vec::new();
    for entry in &all {
        let msg_style = if entry.is_error {
            Style::default().fg(Color::Red)
        } else if entry.message.contains("━━━━") {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };

        let name = pad_right(&truncate_ellipsis(entry.service, name_width), name_width);
        let timestamp = entry.time.with_timezone(&Local).format("%H:%M:%S").to_string();

        let wrapped = wrap_text(entry.message, message_width);
        if wrapped.is_empty() {
            continue;
        }

        lines.push(Line::from(vec![
            Span::raw("["),
            Span::styled(
                name,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
            Span::raw("] "),
            Span::styled(wrapped[0].clone(), msg_style),
        ]));

        let indent = " ".repeat(prefix_width);
        for continuation in wrapped.iter().skip(1) {
            lines.push(Line::from(vec![
                Span::raw(indent.clone()),
                Span::styled(continuation.clone(), msg_style),
            ]));
        }
    }

    lines
}

/// Wrap at word boundaries; words longer than the width are hard-split.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }
    if text.chars().count() <= max_width {
        return vec![text.to_string()];
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return split_chunks(text, max_width);
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in words {
        let word_len = word.chars().count();

        if word_len > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.extend(split_chunks(word, max_width));
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current.chars().count() + 1 + word_len
        };

        if needed > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

fn split_chunks(text: &str, max_width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Truncate to `max` display chars, ellipsized when it doesn't fit.
pub fn truncate_ellipsis(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return chars[..max].iter().collect();
    }
    chars[..max - 3].iter().collect::<String>() + "..."
}

pub fn pad_right(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", text, " ".repeat(width - len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(wrap_text("hello world", 20), vec!["hello world"]);
    }

    #[test]
    fn wraps_at_word_boundaries() {
        let lines = wrap_text("connection to remote host was refused by peer", 15);
        assert!(lines.iter().all(|l| l.chars().count() <= 15));
        assert_eq!(lines.join(" "), "connection to remote host was refused by peer");
    }

    #[test]
    fn long_single_words_are_hard_split() {
        let lines = wrap_text(&"x".repeat(25), 10);
        assert_eq!(lines, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn truncate_keeps_short_names_and_ellipsizes_long_ones() {
        assert_eq!(truncate_ellipsis("db", 10), "db");
        assert_eq!(truncate_ellipsis("a-very-long-service", 10), "a-very-...");
        assert_eq!(truncate_ellipsis("abcdef", 3), "abc");
    }

    #[test]
    fn pad_right_fills_to_width() {
        assert_eq!(pad_right("db", 5), "db   ");
        assert_eq!(pad_right("exact", 5), "exact");
        assert_eq!(pad_right("overflowing", 5), "overflowing");
    }
}
