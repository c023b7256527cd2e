use std::collections::HashMap;

use thiserror::Error;

use crate::common::seed;
use crate::common::types::new_message_id;
use crate::common::{
    ChatCommand, ChatEvent, ChatMessage, Conversation, MessageStatus, ReplyState, StreamState, User,
};

/// Why a submit or retry was refused. State is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no conversation selected")]
    NoActiveConversation,
    #[error("conversation has no other participant")]
    UnknownRecipient,
    #[error("a reply is still streaming in this conversation")]
    ReplyInProgress,
    #[error("no failed reply to retry")]
    NothingToRetry,
}

/// Local UI state. Mutated only from the UI thread, one call or event at a time.
///
/// The last message of a conversation is never stored; it is always the tail
/// of that conversation's history.
pub struct AppState {
    pub current_user: User,
    pub conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<ChatMessage>>,
    pub active_conversation_id: Option<String>,
    pub input_text: String,
    pub search_query: String,
}

impl AppState {
    pub fn new() -> Self {
        let (conversations, messages) = seed::initial_conversations();
        let mut state = Self::with_data(seed::current_user(), conversations, messages);
        state.active_conversation_id = state.conversations.first().map(|c| c.id.clone());
        state
    }

    pub fn with_data(
        current_user: User,
        conversations: Vec<Conversation>,
        messages: HashMap<String, Vec<ChatMessage>>,
    ) -> Self {
        Self {
            current_user,
            conversations,
            messages,
            active_conversation_id: None,
            input_text: String::new(),
            search_query: String::new(),
        }
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    fn conversation_mut(&mut self, conversation_id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == conversation_id)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    pub fn history(&self, conversation_id: &str) -> &[ChatMessage] {
        self.messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn active_messages(&self) -> &[ChatMessage] {
        self.active_conversation_id
            .as_deref()
            .map(|id| self.history(id))
            .unwrap_or(&[])
    }

    pub fn last_message(&self, conversation_id: &str) -> Option<&ChatMessage> {
        self.history(conversation_id).last()
    }

    pub fn other_participant(&self, conversation_id: &str) -> Option<&User> {
        self.conversation(conversation_id)?
            .other_participant(&self.current_user.id)
    }

    pub fn is_own(&self, message: &ChatMessage) -> bool {
        message.sender_id == self.current_user.id
    }

    /// Conversations matching the search box: by contact name or by any
    /// message text, case-insensitively.
    pub fn visible_conversations(&self) -> Vec<&Conversation> {
        let query = self.search_query.trim().to_lowercase();
        self.conversations
            .iter()
            .filter(|conversation| {
                if query.is_empty() {
                    return true;
                }
                let name_matches = conversation
                    .other_participant(&self.current_user.id)
                    .is_some_and(|user| user.name.to_lowercase().contains(&query));
                name_matches
                    || self
                        .history(&conversation.id)
                        .iter()
                        .any(|message| message.text.to_lowercase().contains(&query))
            })
            .collect()
    }

    /// Make a conversation active, clearing its unread counter and marking
    /// incoming messages read. `None` returns to the welcome screen.
    pub fn select_conversation(&mut self, conversation_id: Option<String>) {
        if let Some(id) = conversation_id.as_deref() {
            let Some(conversation) = self.conversation_mut(id) else {
                log::warn!("Ignoring selection of unknown conversation {id}");
                return;
            };
            conversation.unread_count = 0;

            let current_user_id = self.current_user.id.clone();
            if let Some(history) = self.messages.get_mut(id) {
                history
                    .iter_mut()
                    .filter(|message| {
                        message.sender_id != current_user_id
                            && message.status == MessageStatus::Delivered
                            && !message.is_streaming()
                    })
                    .for_each(|message| message.status = MessageStatus::Read);
            }
        }
        self.active_conversation_id = conversation_id;
    }

    /// Submit the composer text to the active conversation and return the
    /// command that produces the reply.
    pub fn send_message(&mut self) -> Result<ChatCommand, SendError> {
        let text = self.input_text.trim().to_string();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let conversation_id = self
            .active_conversation_id
            .clone()
            .ok_or(SendError::NoActiveConversation)?;
        let conversation = self
            .conversation(&conversation_id)
            .ok_or(SendError::NoActiveConversation)?;
        let recipient = conversation
            .other_participant(&self.current_user.id)
            .ok_or(SendError::UnknownRecipient)?
            .clone();
        if recipient.is_bot && conversation.is_typing() {
            return Err(SendError::ReplyInProgress);
        }

        let message = ChatMessage::outgoing(&conversation_id, &self.current_user.id, text.clone());
        self.push_message(message);
        self.input_text.clear();

        if recipient.is_bot {
            Ok(self.begin_bot_reply(&conversation_id, text))
        } else {
            Ok(ChatCommand::ScheduleHumanReply {
                conversation_id,
                sender_id: recipient.id,
            })
        }
    }

    /// Ask again for a bot reply that failed, reusing the user message that
    /// preceded it. The failed message is dropped from the history.
    pub fn retry_reply(
        &mut self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<ChatCommand, SendError> {
        let conversation = self
            .conversation(conversation_id)
            .ok_or(SendError::NothingToRetry)?;
        if conversation.is_typing() {
            return Err(SendError::ReplyInProgress);
        }

        let history = self.history(conversation_id);
        let index = history
            .iter()
            .position(|message| message.id == message_id && message.failure().is_some())
            .ok_or(SendError::NothingToRetry)?;
        let prompt = history[..index]
            .iter()
            .rev()
            .find(|message| self.is_own(message))
            .map(|message| message.text.clone())
            .ok_or(SendError::NothingToRetry)?;

        if let Some(history) = self.messages.get_mut(conversation_id) {
            history.remove(index);
        }
        log::info!("Retrying bot reply in {conversation_id}");
        Ok(self.begin_bot_reply(conversation_id, prompt))
    }

    /// Merge one worker event into the state.
    pub fn apply_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::MessageReceived(message) => {
                let conversation_id = message.conversation_id.clone();
                if self.conversation(&conversation_id).is_none() {
                    log::warn!("Dropping message for unknown conversation {conversation_id}");
                    return;
                }
                let message_id = message.id.clone();
                self.push_message(message);
                self.note_arrival(&conversation_id, &message_id);
            }
            ChatEvent::ReplyStarted {
                conversation_id,
                message_id,
            } => {
                if !self.is_current_stream(&conversation_id, &message_id) {
                    return;
                }
                if let Some(placeholder) = self.placeholder(&conversation_id, &message_id) {
                    self.push_message(placeholder);
                }
            }
            ChatEvent::ReplyProgress {
                conversation_id,
                message_id,
                text,
            } => {
                if !self.is_current_stream(&conversation_id, &message_id) {
                    return;
                }
                match self.message_mut(&conversation_id, &message_id) {
                    Some(message) if message.is_streaming() => message.text = text,
                    _ => log::debug!("No streaming placeholder {message_id} in {conversation_id}"),
                }
            }
            ChatEvent::ReplyCompleted {
                conversation_id,
                message_id,
                text,
            } => {
                if !self.is_current_stream(&conversation_id, &message_id) {
                    return;
                }
                self.settle_reply(&conversation_id, &message_id, Some(text), StreamState::Complete);
                self.note_arrival(&conversation_id, &message_id);
            }
            ChatEvent::ReplyFailed {
                conversation_id,
                message_id,
                error,
            } => {
                if !self.is_current_stream(&conversation_id, &message_id) {
                    return;
                }
                self.settle_reply(&conversation_id, &message_id, None, StreamState::Failed(error));
            }
        }
    }

    fn begin_bot_reply(&mut self, conversation_id: &str, text: String) -> ChatCommand {
        let message_id = new_message_id();
        if let Some(conversation) = self.conversation_mut(conversation_id) {
            conversation.reply_state = ReplyState::Streaming {
                message_id: message_id.clone(),
            };
        }
        ChatCommand::RequestBotReply {
            conversation_id: conversation_id.to_string(),
            message_id,
            text,
        }
    }

    /// Record how a stream ended and let the conversation accept new submits.
    /// A failure that happened before the placeholder existed still leaves a
    /// (failed, empty) message behind so it can be retried.
    fn settle_reply(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        text: Option<String>,
        outcome: StreamState,
    ) {
        match self.message_mut(conversation_id, message_id) {
            Some(message) => {
                if let Some(text) = text {
                    message.text = text;
                }
                message.stream = Some(outcome);
            }
            None => {
                if let Some(mut message) = self.placeholder(conversation_id, message_id) {
                    message.text = text.unwrap_or_default();
                    message.stream = Some(outcome);
                    self.push_message(message);
                }
            }
        }

        if let Some(conversation) = self.conversation_mut(conversation_id) {
            conversation.reply_state = ReplyState::Idle;
        }
    }

    fn is_current_stream(&self, conversation_id: &str, message_id: &str) -> bool {
        let current = self
            .conversation(conversation_id)
            .and_then(Conversation::streaming_message_id);
        if current == Some(message_id) {
            true
        } else {
            log::debug!("Ignoring stale reply event {message_id} for {conversation_id}");
            false
        }
    }

    fn placeholder(&self, conversation_id: &str, message_id: &str) -> Option<ChatMessage> {
        let sender = self.other_participant(conversation_id)?;
        Some(ChatMessage::placeholder(conversation_id, &sender.id, message_id))
    }

    fn message_mut(&mut self, conversation_id: &str, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages
            .get_mut(conversation_id)?
            .iter_mut()
            .find(|message| message.id == message_id)
    }

    fn push_message(&mut self, message: ChatMessage) {
        self.messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
    }

    /// An incoming message seen in the open conversation is read at once;
    /// elsewhere it counts as unread.
    fn note_arrival(&mut self, conversation_id: &str, message_id: &str) {
        if self.active_conversation_id.as_deref() == Some(conversation_id) {
            if let Some(message) = self.message_mut(conversation_id, message_id) {
                message.status = MessageStatus::Read;
            }
            return;
        }
        if let Some(conversation) = self.conversation_mut(conversation_id) {
            conversation.unread_count += 1;
        }
    }
}
