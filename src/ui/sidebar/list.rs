use crate::api::ApiError;
use crate::model::{Conversation, initials};
use crate::ui::sidebar::item::{ConversationItem, ITEM_HEIGHT};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tracing::error;

/// What the sidebar asks the root to do after a key press
#[derive(Debug, Clone, PartialEq)]
pub enum ListAction {
    None,
    Select(Conversation),
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
enum LoadState {
    Loading,
    Failed(String),
    Ready,
}

/// Conversation list with live search
pub struct ConversationList {
    conversations: Vec<Conversation>,
    state: LoadState,
    search_term: String,
    highlighted: usize,
    profile_name: String,
}

/// Case-insensitive match on contact name, plain substring match on the id
pub fn filter_conversations<'a>(
    conversations: &'a [Conversation],
    term: &str,
) -> Vec<&'a Conversation> {
    let needle = term.to_lowercase();
    conversations
        .iter()
        .filter(|c| c.contact_name.to_lowercase().contains(&needle) || c.wa_id.contains(term))
        .collect()
}

impl ConversationList {
    pub fn new(profile_name: impl Into<String>) -> Self {
        Self {
            conversations: Vec::new(),
            state: LoadState::Loading,
            search_term: String::new(),
            highlighted: 0,
            profile_name: profile_name.into(),
        }
    }

    /// Show the loading state ahead of a fetch (initial load and retry)
    pub fn begin_load(&mut self) {
        self.state = LoadState::Loading;
    }

    /// Replace the list with a fetch result
    pub fn apply_loaded(&mut self, result: Result<Vec<Conversation>, ApiError>) {
        match result {
            Ok(conversations) => {
                self.conversations = conversations;
                self.state = LoadState::Ready;
                self.clamp_highlight();
            }
            Err(e) => {
                error!("Error loading conversations: {}", e);
                // A failed background refresh keeps what is already on screen.
                if self.state == LoadState::Loading {
                    self.state = LoadState::Failed("Failed to load conversations".to_string());
                }
            }
        }
    }

    #[cfg(test)]
    fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            LoadState::Failed(message) => Some(message.as_str()),
            _ => None,
        }
    }

    #[cfg(test)]
    fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn filtered(&self) -> Vec<&Conversation> {
        filter_conversations(&self.conversations, &self.search_term)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ListAction {
        if key.kind != KeyEventKind::Press {
            return ListAction::None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('r') => ListAction::Retry,
                _ => ListAction::None,
            };
        }

        match key.code {
            KeyCode::Enter => {
                if self.error().is_some() {
                    return ListAction::Retry;
                }
                if let Some(conversation) = self.filtered().get(self.highlighted) {
                    return ListAction::Select((*conversation).clone());
                }
            }
            KeyCode::Up => {
                self.highlighted = self.highlighted.saturating_sub(1);
            }
            KeyCode::Down => {
                let len = self.filtered().len();
                if self.highlighted + 1 < len {
                    self.highlighted += 1;
                }
            }
            KeyCode::Char(c) => {
                self.search_term.push(c);
                self.highlighted = 0;
            }
            KeyCode::Backspace => {
                self.search_term.pop();
                self.highlighted = 0;
            }
            _ => {}
        }

        ListAction::None
    }

    /// Append pasted text to the search field
    pub fn paste(&mut self, text: &str) {
        self.search_term.push_str(text.trim());
        self.highlighted = 0;
    }

    fn clamp_highlight(&mut self) {
        let len = self.filtered().len();
        if self.highlighted >= len {
            self.highlighted = len.saturating_sub(1);
        }
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer, selected: Option<&str>, focused: bool) {
        let border_style = if focused {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Gray)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(format!(" [{}] {} ", initials(&self.profile_name), self.profile_name));
        let inner = block.inner(area);
        block.render(area, buf);

        match &self.state {
            LoadState::Loading => {
                centered_message(inner, buf, vec![Line::from(Span::styled(
                    "Loading conversations...",
                    Style::default().fg(Color::Gray),
                ))]);
                return;
            }
            LoadState::Failed(message) => {
                centered_message(inner, buf, vec![
                    Line::from(Span::styled(
                        format!("Error: {}", message),
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )),
                    Line::from(""),
                    Line::from(Span::styled(
                        "Press Enter to retry",
                        Style::default().fg(Color::Green),
                    )),
                ]);
                return;
            }
            LoadState::Ready => {}
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(0)])
            .split(inner);

        let search_line = if self.search_term.is_empty() {
            Line::from(vec![
                Span::raw("🔍 "),
                Span::styled("Search or start new chat", Style::default().fg(Color::DarkGray)),
            ])
        } else {
            let mut spans = vec![Span::raw("🔍 "), Span::raw(self.search_term.clone())];
            if focused {
                spans.push(Span::styled("▌", Style::default().fg(Color::Green)));
            }
            Line::from(spans)
        };
        buf.set_line(chunks[0].x, chunks[0].y, &search_line, chunks[0].width);

        let list_area = chunks[2];
        let filtered = self.filtered();
        if filtered.is_empty() {
            let (title, hint) = if self.search_term.is_empty() {
                ("No conversations yet", "Start a new conversation to get started")
            } else {
                ("No conversations found", "Try a different search term")
            };
            centered_message(list_area, buf, vec![
                Line::from(Span::styled(title, Style::default().add_modifier(Modifier::BOLD))),
                Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))),
            ]);
            return;
        }

        let pitch = ITEM_HEIGHT + 1;
        let visible = (list_area.height / pitch).max(1) as usize;
        let first = self.highlighted.saturating_sub(visible - 1);

        let rows = filtered.iter().enumerate().skip(first).take(visible);
        for (row, (index, conversation)) in rows.enumerate() {
            let y = list_area.y + row as u16 * pitch;
            if y + ITEM_HEIGHT > list_area.y + list_area.height {
                break;
            }
            let item_area = Rect::new(list_area.x, y, list_area.width, ITEM_HEIGHT);
            let is_active = selected == Some(conversation.wa_id.as_str());
            ConversationItem::new(conversation, is_active, focused && index == self.highlighted)
                .render(item_area, buf);
        }
    }
}

fn centered_message(area: Rect, buf: &mut Buffer, lines: Vec<Line<'static>>) {
    let top = area.height.saturating_sub(lines.len() as u16) / 2;
    let target = Rect::new(area.x, area.y + top, area.width, area.height.saturating_sub(top));
    Paragraph::new(lines).alignment(Alignment::Center).render(target, buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversations() -> Vec<Conversation> {
        vec![
            Conversation {
                wa_id: "111".to_string(),
                contact_name: "Alice".to_string(),
                last_message: "hi".to_string(),
                last_timestamp: 1_700_000_000,
                unread_count: 0,
            },
            Conversation {
                wa_id: "222".to_string(),
                contact_name: "Bob".to_string(),
                last_message: "yo".to_string(),
                last_timestamp: 1_700_000_100,
                unread_count: 1,
            },
        ]
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ready_list() -> ConversationList {
        let mut list = ConversationList::new("My WhatsApp");
        list.apply_loaded(Ok(conversations()));
        list
    }

    #[test]
    fn test_filter_by_name_case_insensitive() {
        let all = conversations();
        let found = filter_conversations(&all, "ali");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contact_name, "Alice");
    }

    #[test]
    fn test_filter_by_id() {
        let all = conversations();
        let found = filter_conversations(&all, "222");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contact_name, "Bob");
    }

    #[test]
    fn test_empty_term_keeps_everything() {
        assert_eq!(filter_conversations(&conversations(), "").len(), 2);
    }

    #[test]
    fn test_search_then_select() {
        let mut list = ready_list();
        for c in "BO".chars() {
            list.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(list.search_term(), "BO");
        match list.handle_key(key(KeyCode::Enter)) {
            ListAction::Select(conversation) => assert_eq!(conversation.wa_id, "222"),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_highlight_moves_within_bounds() {
        let mut list = ready_list();
        list.handle_key(key(KeyCode::Down));
        list.handle_key(key(KeyCode::Down));
        list.handle_key(key(KeyCode::Down));
        assert_eq!(
            list.handle_key(key(KeyCode::Enter)),
            ListAction::Select(conversations()[1].clone())
        );
        list.handle_key(key(KeyCode::Up));
        list.handle_key(key(KeyCode::Up));
        assert_eq!(
            list.handle_key(key(KeyCode::Enter)),
            ListAction::Select(conversations()[0].clone())
        );
    }

    #[test]
    fn test_failed_load_offers_retry() {
        let mut list = ConversationList::new("Me");
        list.apply_loaded(Err(ApiError::Status {
            status: 503,
            body: String::new(),
        }));
        assert_eq!(list.error(), Some("Failed to load conversations"));
        assert_eq!(list.handle_key(key(KeyCode::Enter)), ListAction::Retry);

        list.begin_load();
        assert!(list.is_loading());
        list.apply_loaded(Ok(conversations()));
        assert!(list.error().is_none());
        assert_eq!(list.filtered().len(), 2);
    }

    #[test]
    fn test_failed_refresh_keeps_list() {
        let mut list = ready_list();
        list.apply_loaded(Err(ApiError::Status {
            status: 500,
            body: String::new(),
        }));
        assert!(list.error().is_none());
        assert_eq!(list.filtered().len(), 2);
    }

    #[test]
    fn test_render_empty_search_result() {
        let mut list = ready_list();
        list.paste("zzz");
        let area = Rect::new(0, 0, 40, 12);
        let mut buf = Buffer::empty(area);
        list.render(area, &mut buf, None, true);
        let text: String = (0..area.height)
            .flat_map(|y| (0..area.width).map(move |x| (x, y)))
            .map(|(x, y)| buf.get(x, y).symbol().to_string())
            .collect();
        assert!(text.contains("No conversations found"));
    }
}
