use crate::api::ApiError;
use crate::events::LiveEvent;
use crate::model::{Conversation, Message, MessageStatus, initials};
use crate::time_format::group_messages_by_date;
use crate::ui::chat::bubble::MessageBubble;
use crate::ui::chat::composer::{ComposerResult, MessageComposer};
use crate::ui::chat::date_separator::date_separator;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tracing::{debug, error};

/// Side effects the chat pane needs the root to carry out
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Leave(String),
    LoadMessages(String),
    MarkRead(String),
    Join(String),
    /// Register live callbacks for the active conversation
    Subscribe,
    Unsubscribe,
    Send {
        wa_id: String,
        body: String,
        contact_name: String,
    },
    RefreshConversations,
}

const COMPOSER_HEIGHT: u16 = 3;
const HEADER_HEIGHT: u16 = 3;

/// Thread view for the selected conversation
#[derive(Default)]
pub struct ChatPane {
    selected: Option<Conversation>,
    messages: Vec<Message>,
    loading: bool,
    error: Option<String>,
    /// Lines scrolled up from the latest message
    scroll: usize,
    composer: MessageComposer,
}

impl ChatPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&Conversation> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|c| c.wa_id.as_str())
    }

    #[cfg(test)]
    fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[cfg(test)]
    fn is_loading(&self) -> bool {
        self.loading
    }

    #[cfg(test)]
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[cfg(test)]
    fn composer(&self) -> &MessageComposer {
        &self.composer
    }

    fn is_active(&self, wa_id: &str) -> bool {
        self.selected_id() == Some(wa_id)
    }

    /// Switch the active conversation. Re-selecting the current one is a no-op.
    pub fn select(&mut self, conversation: Option<Conversation>) -> Vec<ChatCommand> {
        let next_id = conversation.as_ref().map(|c| c.wa_id.clone());
        if self.selected_id().map(str::to_string) == next_id {
            // Keep the freshest name and preview
            if conversation.is_some() {
                self.selected = conversation;
            }
            return Vec::new();
        }

        let mut commands = Vec::new();
        if let Some(previous) = self.selected.take() {
            commands.push(ChatCommand::Leave(previous.wa_id));
            commands.push(ChatCommand::Unsubscribe);
        }

        self.messages.clear();
        self.error = None;
        self.scroll = 0;
        self.composer.reset();
        self.loading = false;

        if let Some(conversation) = conversation {
            let wa_id = conversation.wa_id.clone();
            self.selected = Some(conversation);
            self.loading = true;
            commands.push(ChatCommand::LoadMessages(wa_id.clone()));
            commands.push(ChatCommand::MarkRead(wa_id.clone()));
            commands.push(ChatCommand::Join(wa_id));
            commands.push(ChatCommand::Subscribe);
        }

        commands
    }

    /// Apply a history fetch; results for a conversation no longer on screen are dropped
    pub fn apply_loaded(&mut self, wa_id: &str, result: Result<Vec<Message>, ApiError>) {
        if !self.is_active(wa_id) {
            debug!("Dropping message history for inactive conversation {}", wa_id);
            return;
        }

        self.loading = false;
        match result {
            Ok(messages) => {
                self.messages = messages;
                self.error = None;
                self.scroll = 0;
            }
            Err(e) => {
                error!("Error loading messages: {}", e);
                self.error = Some("Failed to load messages".to_string());
            }
        }
    }

    pub fn retry(&mut self) -> Vec<ChatCommand> {
        let Some(wa_id) = self.selected_id().map(str::to_string) else {
            return Vec::new();
        };
        if self.loading {
            return Vec::new();
        }
        self.loading = true;
        self.error = None;
        vec![ChatCommand::LoadMessages(wa_id)]
    }

    pub fn apply_live(&mut self, event: LiveEvent) {
        if !self.is_active(event.wa_id()) {
            return;
        }

        match event {
            LiveEvent::NewMessage(message) => {
                self.messages.push(message);
                self.scroll = 0;
            }
            LiveEvent::MessageUpdate(update) => {
                let key = update.key().to_string();
                if key.is_empty() {
                    return;
                }
                if let Some(slot) = self.messages.iter_mut().find(|m| m.key() == key) {
                    slot.apply_update(update);
                    self.scroll = 0;
                }
            }
            LiveEvent::MessagesRead(read) => {
                let mut changed = false;
                for message in self.messages.iter_mut() {
                    let listed = read.message_ids.iter().any(|id| id == message.key());
                    if message.is_from_business && listed {
                        message.status = MessageStatus::Read;
                        changed = true;
                    }
                }
                if changed {
                    self.scroll = 0;
                }
            }
        }
    }

    /// Finish an in-flight send for `wa_id`. A send abandoned by switching
    /// conversations leaves the current draft untouched.
    pub fn apply_sent(
        &mut self,
        wa_id: &str,
        result: Result<Option<Message>, ApiError>,
    ) -> Vec<ChatCommand> {
        let pending = self.is_active(wa_id) && self.composer.is_sending();
        match result {
            Ok(echoed) => {
                if pending {
                    self.composer.finish_send(true);
                    if let Some(message) = echoed {
                        self.messages.push(message);
                        self.scroll = 0;
                    }
                }
                vec![ChatCommand::RefreshConversations]
            }
            Err(e) => {
                error!("Error sending message: {}", e);
                if pending {
                    self.composer.finish_send(false);
                }
                Vec::new()
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Vec<ChatCommand> {
        if key.kind != KeyEventKind::Press {
            return Vec::new();
        }
        let Some((wa_id, contact_name)) = self
            .selected
            .as_ref()
            .map(|c| (c.wa_id.clone(), c.contact_name.clone()))
        else {
            return Vec::new();
        };

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('r') {
            if self.error.is_some() {
                return self.retry();
            }
            return Vec::new();
        }

        match key.code {
            KeyCode::PageUp => {
                self.scroll = self.scroll.saturating_add(5);
                return Vec::new();
            }
            KeyCode::PageDown => {
                self.scroll = self.scroll.saturating_sub(5);
                return Vec::new();
            }
            _ => {}
        }

        match self.composer.handle_key(key, self.loading) {
            ComposerResult::Submitted(body) => vec![ChatCommand::Send {
                wa_id,
                body,
                contact_name,
            }],
            ComposerResult::None => Vec::new(),
        }
    }

    pub fn paste(&mut self, text: &str) {
        if self.selected.is_some() {
            self.composer.paste(text);
        }
    }

    /// Thread lines in display order: a separator per day, then its bubbles
    fn thread_lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for group in group_messages_by_date(&self.messages) {
            lines.push(Line::from(""));
            lines.push(date_separator(&group.label));
            for message in group.messages {
                lines.push(Line::from(""));
                lines.extend(MessageBubble::new(message).lines(width));
            }
        }
        lines
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer, focused: bool) {
        let Some(conversation) = self.selected.as_ref() else {
            render_empty_state(area, buf);
            return;
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(HEADER_HEIGHT),
                Constraint::Min(1),
                Constraint::Length(COMPOSER_HEIGHT),
            ])
            .split(area);

        let header = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        let header_inner = header.inner(chunks[0]);
        header.render(chunks[0], buf);
        Paragraph::new(vec![
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", initials(&conversation.contact_name)),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(
                    conversation.contact_name.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(Span::styled("      online", Style::default().fg(Color::DarkGray))),
        ])
        .render(header_inner, buf);

        let body = chunks[1];
        if self.loading {
            centered(body, buf, vec![Line::from(Span::styled(
                "Loading messages...",
                Style::default().fg(Color::Gray),
            ))]);
        } else if let Some(message) = &self.error {
            centered(body, buf, vec![
                Line::from(Span::styled(message.clone(), Style::default().fg(Color::Red))),
                Line::from(""),
                Line::from(Span::styled(
                    "Press Ctrl+R to try again",
                    Style::default().fg(Color::Green),
                )),
            ]);
        } else {
            let lines = self.thread_lines(body.width);
            let height = body.height as usize;
            let max_scroll = lines.len().saturating_sub(height);
            let scroll = self.scroll.min(max_scroll);
            let end = lines.len() - scroll;
            let start = end.saturating_sub(height);
            // Anchor the thread to the bottom edge
            let pad = height.saturating_sub(end - start) as u16;
            let target = Rect::new(body.x, body.y + pad, body.width, body.height - pad);
            Paragraph::new(lines[start..end].to_vec()).render(target, buf);
        }

        self.composer.widget(focused).render(chunks[2], buf);
    }
}

fn render_empty_state(area: Rect, buf: &mut Buffer) {
    centered(area, buf, vec![
        Line::from(Span::styled(
            "WhatsApp Web",
            Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Send and receive messages without keeping your phone online.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Select a conversation to start chatting.",
            Style::default().fg(Color::DarkGray),
        )),
    ]);
}

fn centered(area: Rect, buf: &mut Buffer, lines: Vec<Line<'static>>) {
    let top = area.height.saturating_sub(lines.len() as u16) / 2;
    let target = Rect::new(area.x, area.y + top, area.width, area.height - top);
    Paragraph::new(lines).alignment(Alignment::Center).render(target, buf);
}
