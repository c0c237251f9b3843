use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result of a key press inside the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    None,
}

/// Draft text plus a cursor counted in chars
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    pub cursor_position: usize,
}

impl TextAreaState {
    fn byte_index(&self) -> usize {
        self.content
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.content.len(), |(i, _)| i)
    }

    fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_index();
        self.content.insert(at, c);
        self.cursor_position += 1;
    }

    fn insert_str(&mut self, text: &str) {
        let at = self.byte_index();
        self.content.insert_str(at, text);
        self.cursor_position += text.chars().count();
    }

    fn backspace(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index();
            self.content.remove(at);
        }
    }

    fn delete(&mut self) {
        if self.cursor_position < self.char_len() {
            let at = self.byte_index();
            self.content.remove(at);
        }
    }

    fn clear(&mut self) {
        self.content.clear();
        self.cursor_position = 0;
    }
}

/// Message input at the bottom of the chat pane.
///
/// Enter submits the trimmed draft, Shift+Enter inserts a newline. While a
/// send is in flight further submits are ignored; the draft is only cleared
/// once the send succeeds.
pub struct MessageComposer {
    state: TextAreaState,
    placeholder: String,
    sending: bool,
}

impl Default for MessageComposer {
    fn default() -> Self {
        Self::new("Type a message")
    }
}

impl MessageComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            sending: false,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, disabled: bool) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.state.insert_char('\n');
                } else {
                    return self.submit(disabled);
                }
            }
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    return ComposerResult::None;
                }
                self.state.insert_char(c);
            }
            KeyCode::Backspace => self.state.backspace(),
            KeyCode::Delete => self.state.delete(),
            KeyCode::Left => {
                self.state.cursor_position = self.state.cursor_position.saturating_sub(1);
            }
            KeyCode::Right => {
                if self.state.cursor_position < self.state.char_len() {
                    self.state.cursor_position += 1;
                }
            }
            KeyCode::Home => self.state.cursor_position = 0,
            KeyCode::End => self.state.cursor_position = self.state.char_len(),
            _ => {}
        }

        ComposerResult::None
    }

    fn submit(&mut self, disabled: bool) -> ComposerResult {
        let body = self.state.content.trim();
        if body.is_empty() || self.sending || disabled {
            return ComposerResult::None;
        }
        let body = body.to_string();
        self.sending = true;
        ComposerResult::Submitted(body)
    }

    /// Close out an in-flight send; failures keep the draft for another try
    pub fn finish_send(&mut self, success: bool) {
        self.sending = false;
        if success {
            self.state.clear();
        }
    }

    pub fn paste(&mut self, text: &str) {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        self.state.insert_str(&normalized);
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    #[cfg(test)]
    pub fn content(&self) -> &str {
        &self.state.content
    }

    /// Drop the draft when switching conversations
    pub fn reset(&mut self) {
        self.state.clear();
        self.sending = false;
    }

    pub fn widget(&self, focused: bool) -> ComposerWidget<'_> {
        ComposerWidget {
            composer: self,
            focused,
        }
    }
}

pub struct ComposerWidget<'a> {
    composer: &'a MessageComposer,
    focused: bool,
}

impl Widget for ComposerWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state = &self.composer.state;
        let title = if self.composer.sending { " Sending... " } else { "" };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(if self.focused {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner = block.inner(area);
        block.render(area, buf);

        if state.content.is_empty() {
            let mut spans = Vec::new();
            if self.focused {
                spans.push(Span::styled("▌", Style::default().fg(Color::Green)));
            }
            spans.push(Span::styled(
                self.composer.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            ));
            buf.set_line(inner.x, inner.y, &Line::from(spans), inner.width);
            return;
        }

        let mut content = state.content.clone();
        if self.focused {
            content.insert(state.byte_index(), '▌');
        }

        // Keep the tail of a tall draft visible
        let lines: Vec<&str> = content.split('\n').collect();
        let skip = lines.len().saturating_sub(inner.height as usize);
        for (row, text) in lines.iter().skip(skip).enumerate() {
            buf.set_line(
                inner.x,
                inner.y + row as u16,
                &Line::from(Span::raw(*text)),
                inner.width,
            );
        }
    }
}
