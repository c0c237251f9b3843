use crate::model::Message;
use crate::time_format::format_message_time;
use crate::ui::chat::status::status_glyph;
use crate::ui::wrap_text;
use ratatui::{
    layout::Alignment,
    style::{Color, Style},
    text::{Line, Span},
};

/// Lines for one message: wrapped body, then time and delivery ticks.
/// Business messages sit on the right, counterparty messages on the left.
pub struct MessageBubble<'a> {
    message: &'a Message,
    time_label: String,
}

impl<'a> MessageBubble<'a> {
    pub fn new(message: &'a Message) -> Self {
        Self {
            message,
            time_label: format_message_time(message.timestamp),
        }
    }

    #[cfg(test)]
    fn with_time_label(mut self, label: impl Into<String>) -> Self {
        self.time_label = label.into();
        self
    }

    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        // Bubbles take at most three quarters of the pane
        let max_width = ((width as usize) * 3 / 4).max(10);
        let (alignment, body_style) = if self.message.is_from_business {
            (Alignment::Right, Style::default().fg(Color::Black).bg(Color::LightGreen))
        } else {
            (Alignment::Left, Style::default().fg(Color::Black).bg(Color::White))
        };

        let mut lines = Vec::new();
        for paragraph in self.message.message_body.split('\n') {
            for text in wrap_text(paragraph, max_width.saturating_sub(2)) {
                let span = Span::styled(format!(" {} ", text), body_style);
                lines.push(Line::from(span).alignment(alignment));
            }
        }

        let mut footer = vec![Span::styled(
            self.time_label.clone(),
            Style::default().fg(Color::DarkGray),
        )];
        if let Some(glyph) = status_glyph(self.message.status, self.message.is_from_business) {
            footer.push(Span::raw(" "));
            footer.push(glyph);
        }
        lines.push(Line::from(footer).alignment(alignment));

        lines
    }
}
