use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::common::{ChatCommand, ChatEvent, ChatMessage};

use super::model::{LanguageModel, ModelError};

/// Canned answer sent on behalf of human contacts.
#[derive(Debug, Clone)]
pub struct HumanReply {
    pub delay: Duration,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("UI event channel closed")]
    UiClosed,
}

/// Background worker producing replies for the UI.
///
/// Every bot stream and every human-reply timer runs as its own task, so a
/// slow stream never delays other conversations. Dropping the command sender
/// stops the worker and cancels whatever is still pending.
pub struct ReplyClient<M: ?Sized> {
    model: Arc<M>,
    event_sender: mpsc::Sender<ChatEvent>,
    command_receiver: mpsc::Receiver<ChatCommand>,
    human_reply: HumanReply,
}

impl<M: LanguageModel + ?Sized + 'static> ReplyClient<M> {
    pub fn new(
        model: Arc<M>,
        event_sender: mpsc::Sender<ChatEvent>,
        command_receiver: mpsc::Receiver<ChatCommand>,
        human_reply: HumanReply,
    ) -> Self {
        Self {
            model,
            event_sender,
            command_receiver,
            human_reply,
        }
    }

    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();
        log::info!("Reply worker started");

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command, &mut tasks);
                    } else {
                        break;
                    }
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            log::error!("Reply task panicked: {err}");
                        }
                    }
                }
            }
        }

        if !tasks.is_empty() {
            log::info!("Cancelling {} pending replies", tasks.len());
        }
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        log::info!("Reply worker stopped");
    }

    fn handle_command(&self, command: ChatCommand, tasks: &mut JoinSet<()>) {
        match command {
            ChatCommand::RequestBotReply {
                conversation_id,
                message_id,
                text,
            } => {
                log::info!("Requesting bot reply for {conversation_id}");
                tasks.spawn(stream_reply(
                    Arc::clone(&self.model),
                    self.event_sender.clone(),
                    conversation_id,
                    message_id,
                    text,
                ));
            }
            ChatCommand::ScheduleHumanReply {
                conversation_id,
                sender_id,
            } => {
                let reply = self.human_reply.clone();
                let events = self.event_sender.clone();
                tasks.spawn(async move {
                    tokio::time::sleep(reply.delay).await;
                    let message = ChatMessage::incoming(&conversation_id, &sender_id, reply.text);
                    if events
                        .send(ChatEvent::MessageReceived(message))
                        .await
                        .is_err()
                    {
                        log::debug!("UI closed before reply for {conversation_id} arrived");
                    }
                });
            }
        }
    }
}

/// Stream one bot reply and report how it ended. Never fails: errors are
/// logged and turned into `ReplyFailed`.
async fn stream_reply<M: LanguageModel + ?Sized>(
    model: Arc<M>,
    events: mpsc::Sender<ChatEvent>,
    conversation_id: String,
    message_id: String,
    text: String,
) {
    let event = match accumulate(model.as_ref(), &events, &conversation_id, &message_id, &text)
        .await
    {
        Ok(text) => {
            log::info!(
                "Bot reply for {conversation_id} completed ({} bytes)",
                text.len()
            );
            ChatEvent::ReplyCompleted {
                conversation_id,
                message_id,
                text,
            }
        }
        Err(ReplyError::UiClosed) => {
            log::debug!("UI closed while streaming reply for {conversation_id}");
            return;
        }
        Err(err) => {
            log::error!("Failed to get response for {conversation_id}: {err}");
            ChatEvent::ReplyFailed {
                conversation_id,
                message_id,
                error: err.to_string(),
            }
        }
    };

    if events.send(event).await.is_err() {
        log::debug!("UI closed before reply outcome could be delivered");
    }
}

/// Concatenate fragments in arrival order, publishing the running text
/// after each one.
async fn accumulate<M: LanguageModel + ?Sized>(
    model: &M,
    events: &mpsc::Sender<ChatEvent>,
    conversation_id: &str,
    message_id: &str,
    text: &str,
) -> Result<String, ReplyError> {
    let mut fragments = model.send_message_stream(conversation_id, text).await?;

    emit(
        events,
        ChatEvent::ReplyStarted {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
        },
    )
    .await?;

    let mut buffer = String::new();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        buffer.push_str(&fragment);
        emit(
            events,
            ChatEvent::ReplyProgress {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
                text: buffer.clone(),
            },
        )
        .await?;
    }

    if buffer.is_empty() {
        return Err(ModelError::EmptyReply.into());
    }
    Ok(buffer)
}

async fn emit(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> Result<(), ReplyError> {
    events.send(event).await.map_err(|_| ReplyError::UiClosed)
}
