use crate::model::{Conversation, initials};
use crate::time_format::format_conversation_time;
use crate::ui::truncate;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};

/// Rows a single conversation occupies in the sidebar
pub const ITEM_HEIGHT: u16 = 2;

/// One row pair in the conversation list
pub struct ConversationItem<'a> {
    conversation: &'a Conversation,
    is_active: bool,
    is_highlighted: bool,
    time_label: String,
}

impl<'a> ConversationItem<'a> {
    pub fn new(conversation: &'a Conversation, is_active: bool, is_highlighted: bool) -> Self {
        Self {
            conversation,
            is_active,
            is_highlighted,
            time_label: format_conversation_time(conversation.last_timestamp),
        }
    }

    #[cfg(test)]
    fn with_time_label(mut self, label: &str) -> Self {
        self.time_label = label.to_string();
        self
    }
}

/// Unread counter text, capped at `99+`; nothing when there is nothing unread
pub fn unread_badge(count: u32) -> Option<String> {
    match count {
        0 => None,
        1..=99 => Some(count.to_string()),
        _ => Some("99+".to_string()),
    }
}

impl Widget for ConversationItem<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width < 8 {
            return;
        }

        let unread = self.conversation.unread_count > 0;
        let row_style = if self.is_highlighted {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };
        buf.set_style(area, row_style);

        let marker = if self.is_active { "▌" } else { " " };
        buf.set_string(area.x, area.y, marker, row_style.fg(Color::Green));

        let avatar = format!("[{:<2}]", initials(&self.conversation.contact_name));
        buf.set_string(area.x + 1, area.y, &avatar, row_style.fg(Color::Gray));

        let text_x = area.x + 6;
        let right = area.x + area.width;
        let text_width = right.saturating_sub(text_x) as usize;

        // Top row: name on the left, time on the right
        let time_style = if unread {
            row_style.fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            row_style.fg(Color::DarkGray)
        };
        let time_len = self.time_label.chars().count();
        let name_width = text_width.saturating_sub(time_len + 1);

        let mut name_style = row_style.fg(Color::White);
        if unread || self.is_active {
            name_style = name_style.add_modifier(Modifier::BOLD);
        }
        buf.set_string(
            text_x,
            area.y,
            truncate(&self.conversation.contact_name, name_width),
            name_style,
        );
        if time_len < text_width {
            buf.set_string(right - time_len as u16, area.y, &self.time_label, time_style);
        }

        if area.height < 2 {
            return;
        }

        // Bottom row: preview on the left, unread badge on the right
        let badge = unread_badge(self.conversation.unread_count).map(|b| format!(" {} ", b));
        let badge_len = badge.as_ref().map_or(0, |b| b.chars().count());
        let preview_width = text_width.saturating_sub(badge_len + 1);
        let preview_style = if unread {
            row_style.fg(Color::White)
        } else {
            row_style.fg(Color::Gray)
        };
        let preview = self.conversation.last_message.replace('\n', " ");
        buf.set_string(
            text_x,
            area.y + 1,
            truncate(&preview, preview_width),
            preview_style,
        );
        if let Some(badge) = badge {
            if badge_len < text_width {
                buf.set_string(
                    right - badge_len as u16,
                    area.y + 1,
                    &badge,
                    Style::default().fg(Color::Black).bg(Color::Green),
                );
            }
        }
    }
}
