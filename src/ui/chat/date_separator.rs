use ratatui::{
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

/// Centered day label placed above each date group, shown as formatted
pub fn date_separator(label: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!(" {} ", label),
        Style::default()
            .fg(Color::Gray)
            .bg(Color::Black)
            .add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center)
}
