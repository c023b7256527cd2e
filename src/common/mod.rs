pub mod commands;
pub mod events;
pub mod seed;
pub mod types;

pub use commands::ChatCommand;
pub use events::ChatEvent;
pub use types::{
    ChatMessage, Conversation, MessageKind, MessageStatus, Presence, ReplyState, StreamState, User,
};
