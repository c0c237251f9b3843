use crate::api::ApiError;
use crate::model::{Conversation, Message, MessageUpdate, MessagesRead};

/// Internal application events. Background tasks (REST calls, the live
/// connection driver) report back to the UI loop through these.
#[derive(Debug)]
pub enum AppEvent {
    /// Conversation list fetch finished
    ConversationsLoaded(Result<Vec<Conversation>, ApiError>),

    /// Message history fetch for `wa_id` finished
    MessagesLoaded {
        wa_id: String,
        result: Result<Vec<Message>, ApiError>,
    },

    /// Send for `wa_id` finished; `Ok(None)` when the backend echoed nothing usable
    MessageSent {
        wa_id: String,
        result: Result<Option<Message>, ApiError>,
    },

    /// Inbound event from the live-update channel
    Live(LiveEvent),
}

/// Inbound live-update events, as delivered to registered callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    NewMessage(Message),
    MessageUpdate(MessageUpdate),
    MessagesRead(MessagesRead),
}

impl LiveEvent {
    /// Conversation the event belongs to, used for client-side filtering
    pub fn wa_id(&self) -> &str {
        match self {
            LiveEvent::NewMessage(message) => &message.wa_id,
            LiveEvent::MessageUpdate(update) => &update.wa_id,
            LiveEvent::MessagesRead(read) => &read.wa_id,
        }
    }
}

/// TUI-specific events (keyboard, resize)
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize; only the new width drives the layout
    Resize(u16),
}
