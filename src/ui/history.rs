//! Conversation transcript display component

use crate::assembler::SendPhase;
use crate::conversation::{Conversation, Role, Turn};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Renders the conversation bottom-anchored, newest turns in view.
///
/// Borrows the conversation for one frame. The system turn is part of
/// every payload but never shown.
pub struct Transcript<'a> {
    conversation: &'a Conversation,
    phase: SendPhase,
    error: Option<&'a str>,
    notice: Option<&'a str>,
}

impl<'a> Transcript<'a> {
    pub fn new(conversation: &'a Conversation, phase: SendPhase) -> Self {
        Self {
            conversation,
            phase,
            error: None,
            notice: None,
        }
    }

    pub fn with_error(mut self, error: Option<&'a str>) -> Self {
        self.error = error;
        self
    }

    pub fn with_notice(mut self, notice: Option<&'a str>) -> Self {
        self.notice = notice;
        self
    }
}

impl Widget for Transcript<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL).title("💬 banter");

        let inner_area = block.inner(area);
        block.render(area, buf);

        let visible: Vec<&Turn> = self
            .conversation
            .turns()
            .iter()
            .filter(|turn| turn.role != Role::System)
            .collect();

        if visible.is_empty() && self.error.is_none() && self.notice.is_none() {
            let welcome_lines = vec![
                Line::from(vec![Span::styled(
                    "Welcome to banter!",
                    Style::default().fg(Color::Green),
                )]),
                Line::from(vec![Span::raw("")]),
                Line::from(vec![Span::styled(
                    "Ask anything below.",
                    Style::default().fg(Color::Gray),
                )]),
                Line::from(vec![Span::raw("")]),
                Line::from(vec![Span::styled(
                    "Press Enter to send, Shift+Enter for a new line, / for commands.",
                    Style::default().fg(Color::DarkGray),
                )]),
            ];

            for (i, line) in welcome_lines.iter().enumerate() {
                if i < inner_area.height as usize {
                    buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
                }
            }
            return;
        }

        let mut all_lines: Vec<Line> = Vec::new();
        let in_flight = self.conversation.is_streaming();
        for (i, &turn) in visible.iter().enumerate() {
            let is_pending_reply = in_flight && i == visible.len() - 1;
            let mut lines = render_turn(turn, is_pending_reply, self.phase, inner_area.width);
            all_lines.append(&mut lines);
            // spacing between turns
            all_lines.push(Line::from(vec![Span::raw("")]));
        }

        if let Some(notice) = self.notice {
            for segment in notice.split('\n') {
                all_lines.push(Line::from(vec![Span::styled(
                    segment.to_string(),
                    Style::default().fg(Color::Cyan),
                )]));
            }
            all_lines.push(Line::from(vec![Span::raw("")]));
        }

        if let Some(error) = self.error {
            all_lines.push(Line::from(vec![
                Span::styled("⚠ ", Style::default().fg(Color::Red)),
                Span::styled(error.to_string(), Style::default().fg(Color::Red)),
                Span::styled("  (Esc to dismiss)", Style::default().fg(Color::DarkGray)),
            ]));
        }

        // Window over the tail so the newest lines stay in view.
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let start = total.saturating_sub(height);
        let visible_lines = &all_lines[start..];

        for (i, line) in visible_lines.iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

/// Render a single turn into header and wrapped content lines.
fn render_turn(turn: &Turn, is_pending_reply: bool, phase: SendPhase, width: u16) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let (icon, label) = match turn.role {
        Role::User => ("👤", "you"),
        Role::Assistant => ("🤖", "assistant"),
        Role::System => ("⚙", "system"),
    };

    let timestamp = turn.at.format("%H:%M:%S").to_string();
    let header = format!("{} {} {} {}", icon, label, timestamp, "─".repeat(20));
    lines.push(Line::from(vec![Span::styled(
        header,
        Style::default().fg(Color::DarkGray),
    )]));

    if is_pending_reply && turn.content.is_empty() && phase == SendPhase::AwaitingReply {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(
                "thinking…",
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            ),
        ]));
        return lines;
    }

    let content_lines = wrap_text(&turn.content, width.saturating_sub(2) as usize);
    let last = content_lines.len() - 1;
    for (i, content_line) in content_lines.into_iter().enumerate() {
        let cursor = if is_pending_reply && i == last { "▋" } else { "" };
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(content_line, content_style(turn.role)),
            Span::styled(cursor, Style::default().fg(Color::Yellow)),
        ]));
    }

    lines
}

fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default().fg(Color::Green),
        Role::System => Style::default().fg(Color::Yellow),
    }
}

/// Word-wrap to `width` characters, preserving explicit newlines.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for segment in text.split('\n') {
        let mut current = String::new();
        let mut current_chars = 0usize;

        for word in segment.split_whitespace() {
            let word_chars = word.chars().count();
            if current_chars + word_chars + usize::from(current_chars > 0) <= width {
                if current_chars > 0 {
                    current.push(' ');
                    current_chars += 1;
                }
                current.push_str(word);
                current_chars += word_chars;
            } else {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_chars = 0;
                }
                current.push_str(word);
                current_chars = word_chars;
            }
        }

        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}
