use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::{
    conversation::{Role, Turn},
    session::Notice,
    tui::app::{ChatApp, InputMode},
};

const TITLE: &str = "🤖 Atelier";
const PLACEHOLDER: &str = "Type your question here...";

/// Render the main UI
pub fn render_ui(f: &mut Frame, app: &ChatApp) {
    let notice = app.session().notice();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                                     // Status bar
            Constraint::Min(5),                                        // Messages
            Constraint::Length(if notice.is_some() { 3 } else { 0 }), // Error banner
            Constraint::Length(3),                                     // Input box
        ])
        .split(f.size());

    render_status_bar(f, app, chunks[0]);
    render_messages(f, app, chunks[1]);
    if let Some(notice) = notice {
        render_notice(f, notice, chunks[2]);
    }
    render_input_box(f, app, chunks[3]);
}

fn render_status_bar(f: &mut Frame, app: &ChatApp, area: Rect) {
    let session = app.session();
    let (state, state_color) = if app.is_loading() {
        ("Thinking...", Color::Yellow)
    } else {
        ("Ready", Color::Green)
    };

    let status_text = Line::from(vec![
        Span::styled("Model: ", Style::default().fg(Color::Gray)),
        Span::styled(app.model_name(), Style::default().fg(Color::Green)),
        Span::styled(" | Turns: ", Style::default().fg(Color::Gray)),
        Span::raw(session.log().len().to_string()),
        Span::styled(" | Since: ", Style::default().fg(Color::Gray)),
        Span::raw(session.started_at().format("%H:%M").to_string()),
        Span::styled(" | ", Style::default().fg(Color::Gray)),
        Span::styled(state, Style::default().fg(state_color)),
    ]);

    let status_bar =
        Paragraph::new(status_text).block(Block::default().borders(Borders::ALL).title(TITLE));

    f.render_widget(status_bar, area);
}

fn turn_lines(turn: &Turn, width: usize) -> Vec<Line<'static>> {
    let (label, color) = match turn.role {
        Role::User => ("You", Color::Cyan),
        Role::Assistant => ("Assistant", Color::Green),
    };

    let mut lines = vec![Line::from(Span::styled(
        format!("{}:", label),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];
    for line in turn.content.lines() {
        lines.extend(wrap_text(line, width).into_iter().map(Line::from));
    }
    lines.push(Line::from(""));
    lines
}

/// Greedy word wrap by display width. Each returned row fits in `width`
/// cells; words wider than a row are split.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut row_width = 0;

    for word in text.split(' ') {
        let word_width = word.width();
        if row_width > 0 && row_width + 1 + word_width <= width {
            row.push(' ');
            row.push_str(word);
            row_width += 1 + word_width;
            continue;
        }
        if row_width > 0 {
            rows.push(std::mem::take(&mut row));
            row_width = 0;
        }
        for c in word.chars() {
            let c_width = c.width().unwrap_or(0);
            if row_width + c_width > width && row_width > 0 {
                rows.push(std::mem::take(&mut row));
                row_width = 0;
            }
            row.push(c);
            row_width += c_width;
        }
    }
    rows.push(row);
    rows
}

fn render_messages(f: &mut Frame, app: &ChatApp, area: Rect) {
    let width = usize::from(area.width.saturating_sub(2));
    let log = app.session().log();

    let mut lines: Vec<Line> = log
        .turns()
        .iter()
        .flat_map(|turn| turn_lines(turn, width))
        .collect();

    if log.is_empty() && !app.is_loading() {
        lines.push(Line::from(Span::styled(
            "No messages yet. Ask something to start.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    if app.is_loading() {
        lines.push(Line::from(Span::styled(
            "Assistant is thinking... (Esc to cancel)",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    // Rows are pre-wrapped, so one line is one row. Stick to the bottom
    // unless the user scrolled back.
    let inner_height = area.height.saturating_sub(2);
    let content_height = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    let bottom = content_height.saturating_sub(inner_height);
    let offset = bottom.saturating_sub(app.scroll_back());

    let messages = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("Conversation"))
        .scroll((offset, 0));

    f.render_widget(messages, area);
}

fn render_notice(f: &mut Frame, notice: &Notice, area: Rect) {
    let banner = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("[{}] ", notice.at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(notice.message.as_str(), Style::default().fg(Color::Red)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Error"),
    )
    .wrap(Wrap { trim: true });

    f.render_widget(banner, area);
}

fn render_input_box(f: &mut Frame, app: &ChatApp, area: Rect) {
    let editing = app.input_mode() == InputMode::Editing;
    let title = if editing {
        "Input (Enter send, Esc normal mode)"
    } else {
        "Input (e edit, q quit, j/k scroll)"
    };

    let content = if app.input().is_empty() && !app.is_loading() {
        Span::styled(PLACEHOLDER, Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(app.input())
    };

    let input = Paragraph::new(Line::from(content)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(Style::default().fg(if app.is_loading() {
                Color::DarkGray
            } else {
                Color::White
            })),
    );

    f.render_widget(input, area);

    // Show cursor only while typing
    if editing && !app.is_loading() {
        let typed = u16::try_from(app.input().width()).unwrap_or(u16::MAX);
        f.set_cursor(
            area.x
                .saturating_add(typed)
                .saturating_add(1)
                .min(area.right().saturating_sub(2)),
            area.y + 1,
        );
    }
}
