use crate::model::MessageStatus;
use ratatui::{
    style::{Color, Style},
    text::Span,
};

/// Delivery ticks for a message; counterparty messages carry none
pub fn status_glyph(status: MessageStatus, is_from_business: bool) -> Option<Span<'static>> {
    if !is_from_business {
        return None;
    }

    let glyph = match status {
        MessageStatus::Sent => Span::styled("✓", Style::default().fg(Color::Gray)),
        MessageStatus::Delivered => Span::styled("✓✓", Style::default().fg(Color::Gray)),
        MessageStatus::Read => Span::styled("✓✓", Style::default().fg(Color::LightBlue)),
    };
    Some(glyph)
}
