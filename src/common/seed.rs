//! Fixed contacts and opening conversations the client starts with.

use std::collections::HashMap;

use chrono::{Duration, Utc};

use super::types::{ChatMessage, Conversation, MessageKind, MessageStatus, Presence, User};

pub const CURRENT_USER_ID: &str = "user_1";
pub const BOT_USER_ID: &str = "gemini_agent";

pub fn current_user() -> User {
    User {
        id: CURRENT_USER_ID.to_string(),
        name: "Alex Developer".to_string(),
        avatar: "https://picsum.photos/seed/alex/200/200".to_string(),
        status: Presence::Online,
        last_seen: None,
        is_bot: false,
    }
}

pub fn contacts() -> Vec<User> {
    vec![
        User {
            id: BOT_USER_ID.to_string(),
            name: "Gemini Assistant".to_string(),
            avatar: "https://picsum.photos/seed/gemini/200/200".to_string(),
            status: Presence::Online,
            last_seen: None,
            is_bot: true,
        },
        User {
            id: "user_2".to_string(),
            name: "Sarah Designer".to_string(),
            avatar: "https://picsum.photos/seed/sarah/200/200".to_string(),
            status: Presence::Away,
            last_seen: None,
            is_bot: false,
        },
        User {
            id: "user_3".to_string(),
            name: "Mike Manager".to_string(),
            avatar: "https://picsum.photos/seed/mike/200/200".to_string(),
            status: Presence::Offline,
            last_seen: Some(Utc::now() - Duration::hours(1)),
            is_bot: false,
        },
    ]
}

/// Opening conversations and their histories, keyed by conversation id.
pub fn initial_conversations() -> (Vec<Conversation>, HashMap<String, Vec<ChatMessage>>) {
    let me = current_user();
    let contacts = contacts();
    let now = Utc::now();

    let gemini = Conversation::new("conv_1", [me.clone(), contacts[0].clone()]);
    let greeting = ChatMessage {
        id: "msg_0".to_string(),
        conversation_id: gemini.id.clone(),
        sender_id: BOT_USER_ID.to_string(),
        text: "Hello! I am ready to help you with your Rust tasks.".to_string(),
        timestamp: now - Duration::minutes(5),
        status: MessageStatus::Read,
        kind: MessageKind::Text,
        stream: None,
    };

    let mut sarah = Conversation::new("conv_2", [me, contacts[1].clone()]);
    sarah.unread_count = 2;
    let question = ChatMessage {
        id: "msg_old".to_string(),
        conversation_id: sarah.id.clone(),
        sender_id: contacts[1].id.clone(),
        text: "Hey, did you see the new designs?".to_string(),
        timestamp: now - Duration::hours(2),
        status: MessageStatus::Delivered,
        kind: MessageKind::Text,
        stream: None,
    };

    let mut histories = HashMap::new();
    histories.insert(gemini.id.clone(), vec![greeting]);
    histories.insert(sarah.id.clone(), vec![question]);

    (vec![gemini, sarah], histories)
}
