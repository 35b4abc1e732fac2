use chatbot_core::{CallStatus, ChatRole};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::App;

const SEND_LABEL: &str = "[ Send ]";
const CALL_LABEL: &str = "[ Start Voice Call ]";
const END_CALL_LABEL: &str = "[ End Call ]";

/// Bubbles take up to this share of the chat width
const BUBBLE_WIDTH_PERCENT: usize = 70;

/// Wrap text to fit within a given width, breaking on whitespace
///
/// Words longer than the width are split across lines.
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();

    for paragraph in text.lines() {
        if paragraph.trim().is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            // Break words that can never fit
            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current_line));
                    current_len = 0;
                }
                lines.push(word.drain(..width).collect());
            }
            if word.is_empty() {
                continue;
            }

            let word_len = word.len();
            if current_len == 0 {
                current_line = word.into_iter().collect();
                current_len = word_len;
            } else if current_len + 1 + word_len <= width {
                current_line.push(' ');
                current_line.extend(word);
                current_len += 1 + word_len;
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.into_iter().collect();
                current_len = word_len;
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

fn bubble_width(chat_width: u16) -> usize {
    // Two columns of padding inside each bubble
    (chat_width as usize * BUBBLE_WIDTH_PERCENT / 100).saturating_sub(2).max(1)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input row, call button row, footer
    let [header_area, chat_area, input_area, call_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_call_button(app, frame, call_area);
    render_footer(app, frame, footer_area);

    if app.call.is_some() {
        render_call_popup(app, frame, area);
    } else {
        app.end_call_button = None;
    }
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Chatbot ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    let inner_width = area.width.saturating_sub(2);
    app.chat_height = area.height.saturating_sub(2);

    let wrap_width = bubble_width(inner_width);
    let mut lines: Vec<Line> = Vec::new();

    if app.messages.is_empty() && !app.loading {
        lines.push(Line::from(Span::styled(
            "Type a message below or start a voice call...",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for msg in &app.messages {
        let (style, alignment) = match msg.role {
            ChatRole::User => (Style::default().fg(Color::White).bg(Color::Blue), Alignment::Left),
            ChatRole::Bot => (Style::default().fg(Color::Black).bg(Color::Green), Alignment::Right),
        };

        for line in wrap_text_to_width(&msg.text, wrap_width) {
            lines.push(
                Line::from(Span::styled(format!(" {line} "), style)).alignment(alignment),
            );
        }
        lines.push(Line::default());
    }

    if app.loading {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(
            Line::from(Span::styled(
                format!("Thinking{dots}"),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Right),
        );
    }

    app.chat_line_count = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    if app.follow_bottom {
        app.chat_scroll = app.max_scroll();
    } else {
        app.chat_scroll = app.chat_scroll.min(app.max_scroll());
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &mut App, frame: &mut Frame, area: Rect) {
    let send_width = SEND_LABEL.len() as u16 + 2;
    let [input_area, send_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(send_width),
    ])
    .areas(area);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Message ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, input_area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));

    // Vertically centre the button next to the input box
    let button_area = Rect::new(send_area.x + 1, send_area.y + 1, SEND_LABEL.len() as u16, 1)
        .intersection(send_area);
    let send_style = if app.is_busy() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    };
    frame.render_widget(Paragraph::new(SEND_LABEL).style(send_style), button_area);
    app.send_button = Some(button_area);
}

fn render_call_button(app: &mut App, frame: &mut Frame, area: Rect) {
    let width = (CALL_LABEL.len() as u16).min(area.width);
    let button_area = Rect::new(area.x + area.width.saturating_sub(width) / 2, area.y, width, 1);

    let button = Paragraph::new(CALL_LABEL)
        .style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD));
    frame.render_widget(button, button_area);
    app.call_button = Some(button_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = if app.call.is_some() {
        " Enter: send  Esc: end call  PgUp/PgDn: scroll  Ctrl+C: quit"
    } else {
        " Enter: send  Ctrl+O: voice call  ↑/↓ PgUp/PgDn: scroll  Ctrl+C: quit"
    };

    let footer = Paragraph::new(hints).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, area);
}

fn render_call_popup(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(call) = app.call.as_ref() else {
        return;
    };

    // Calculate popup size and position (centered)
    let popup_width = 44.min(area.width.saturating_sub(4));
    let popup_height = 7.min(area.height.saturating_sub(2));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Voice Call ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let status_style = match call.status {
        CallStatus::Error(_) => Style::default().fg(Color::Red),
        CallStatus::Listening => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        _ => Style::default(),
    };

    let [_, status_area, _, button_row] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(inner);

    let status = Paragraph::new(call.status.to_string())
        .style(status_style)
        .alignment(Alignment::Center)
        .wrap(ratatui::widgets::Wrap { trim: true });
    frame.render_widget(status, status_area);

    let width = (END_CALL_LABEL.len() as u16).min(button_row.width);
    let button_area = Rect::new(
        button_row.x + button_row.width.saturating_sub(width) / 2,
        button_row.y,
        width,
        1,
    );
    let button = Paragraph::new(END_CALL_LABEL)
        .style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD));
    frame.render_widget(button, button_area);
    app.end_call_button = Some(button_area);
}
