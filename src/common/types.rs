use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Presence shown next to a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
    Away,
}

/// A chat participant. Never mutated once created.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub status: Presence,
    pub last_seen: Option<DateTime<Utc>>,
    pub is_bot: bool,
}

impl User {
    /// Subtitle shown under the name in the chat header.
    pub fn presence_label(&self) -> &'static str {
        if self.is_bot {
            "AI Assistant"
        } else if self.status == Presence::Online {
            "Active now"
        } else {
            "Last seen recently"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image { url: String },
}

/// Outcome of a streamed bot reply, carried on the message itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Complete,
    Failed(String),
}

/// Domain model for a single chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub kind: MessageKind,
    /// `None` for messages that were never streamed.
    pub stream: Option<StreamState>,
}

impl ChatMessage {
    /// A message typed by the local user.
    pub fn outgoing(conversation_id: &str, sender_id: &str, text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.into(),
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
            kind: MessageKind::Text,
            stream: None,
        }
    }

    /// A complete message from the other participant.
    pub fn incoming(conversation_id: &str, sender_id: &str, text: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Delivered,
            ..Self::outgoing(conversation_id, sender_id, text)
        }
    }

    /// Empty bot message that streamed fragments are written into.
    pub fn placeholder(conversation_id: &str, sender_id: &str, id: &str) -> Self {
        Self {
            id: id.to_string(),
            stream: Some(StreamState::Streaming),
            ..Self::incoming(conversation_id, sender_id, String::new())
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.stream, Some(StreamState::Streaming))
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.stream {
            Some(StreamState::Failed(reason)) => Some(reason),
            _ => None,
        }
    }
}

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether a bot reply is currently being streamed into a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyState {
    #[default]
    Idle,
    Streaming { message_id: String },
}

/// A two-party thread. Its message history lives in `AppState`, keyed by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub participants: [User; 2],
    pub unread_count: u32,
    pub reply_state: ReplyState,
}

impl Conversation {
    pub fn new(id: impl Into<String>, participants: [User; 2]) -> Self {
        Self {
            id: id.into(),
            participants,
            unread_count: 0,
            reply_state: ReplyState::Idle,
        }
    }

    pub fn other_participant(&self, current_user_id: &str) -> Option<&User> {
        self.participants
            .iter()
            .find(|participant| participant.id != current_user_id)
    }

    pub fn is_typing(&self) -> bool {
        matches!(self.reply_state, ReplyState::Streaming { .. })
    }

    /// Placeholder id of the reply in flight, if any.
    pub fn streaming_message_id(&self) -> Option<&str> {
        match &self.reply_state {
            ReplyState::Streaming { message_id } => Some(message_id),
            ReplyState::Idle => None,
        }
    }
}
