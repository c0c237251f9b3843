mod bubble;
mod composer;
mod date_separator;
mod pane;
mod status;

pub use pane::{ChatCommand, ChatPane};
