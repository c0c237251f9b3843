//! Conversation list shown in the left panel

pub mod item;
pub mod list;

pub use list::{ConversationList, ListAction};
