use super::types::ChatMessage;

/// Events the reply worker sends back to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    MessageReceived(ChatMessage),
    /// The stream is open; the placeholder can be shown.
    ReplyStarted {
        conversation_id: String,
        message_id: String,
    },
    /// `text` is everything received so far, not just the latest fragment.
    ReplyProgress {
        conversation_id: String,
        message_id: String,
        text: String,
    },
    ReplyCompleted {
        conversation_id: String,
        message_id: String,
        text: String,
    },
    ReplyFailed {
        conversation_id: String,
        message_id: String,
        error: String,
    },
}
