use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{ChatCommand, ChatEvent};

use super::components::{chat_area, input_bar, sidebar};
use super::state::{AppState, SendError};

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<ChatCommand>,
    event_receiver: mpsc::Receiver<ChatEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<ChatCommand>,
        event_receiver: mpsc::Receiver<ChatEvent>,
    ) -> Self {
        Self {
            state: AppState::new(),
            command_sender,
            event_receiver,
        }
    }

    fn handle_chat_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply_event(event);
        }
    }

    fn submit(&mut self) {
        match self.state.send_message() {
            Ok(command) => self.dispatch(command),
            Err(SendError::EmptyMessage) => {}
            Err(err) => log::debug!("Message not sent: {err}"),
        }
    }

    fn retry(&mut self, conversation_id: &str, message_id: &str) {
        match self.state.retry_reply(conversation_id, message_id) {
            Ok(command) => self.dispatch(command),
            Err(err) => log::warn!("Cannot retry reply {message_id}: {err}"),
        }
    }

    /// Hand a command to the worker. A bot request that cannot be delivered
    /// fails right away so the conversation does not stay stuck typing.
    fn dispatch(&mut self, command: ChatCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to reply worker: {err}");
            if let ChatCommand::RequestBotReply {
                conversation_id,
                message_id,
                ..
            } = err.into_inner()
            {
                self.state.apply_event(ChatEvent::ReplyFailed {
                    conversation_id,
                    message_id,
                    error: "reply worker unavailable".to_string(),
                });
            }
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_chat_events();

        egui::SidePanel::left("conversation_sidebar")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                let actions = sidebar::render(ui, &mut self.state);
                if let Some(conversation_id) = actions.selected {
                    self.state.select_conversation(Some(conversation_id));
                }
            });

        let active = self.state.active_conversation().map(|conversation| {
            let talks_to_bot = self
                .state
                .other_participant(&conversation.id)
                .is_some_and(|user| user.is_bot);
            (conversation.is_typing(), talks_to_bot)
        });

        if let Some((busy, talks_to_bot)) = active {
            egui::TopBottomPanel::bottom("composer").show(ctx, |ui| {
                let disclaimer = if talks_to_bot {
                    "AI-generated messages may be inaccurate."
                } else {
                    "End-to-end encrypted."
                };
                if input_bar::render(ui, &mut self.state.input_text, busy, disclaimer) {
                    self.submit();
                }
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if active.is_none() {
                chat_area::render_welcome(ui);
                return;
            }

            let actions = chat_area::render(ui, &self.state);
            if actions.back {
                self.state.select_conversation(None);
            }
            if let Some((conversation_id, message_id)) = actions.retry {
                self.retry(&conversation_id, &message_id);
            }
        });

        ctx.request_repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StreamState;

    fn app_with(command_sender: mpsc::Sender<ChatCommand>) -> ChatApp {
        let (_event_tx, event_receiver) = mpsc::channel(1);
        ChatApp {
            state: AppState::new(),
            command_sender,
            event_receiver,
        }
    }

    fn assert_reply_failed(app: &ChatApp) {
        let conversation = app.state.active_conversation().unwrap();
        assert!(!conversation.is_typing());
        let reply = app.state.last_message(&conversation.id).unwrap();
        assert!(reply.text.is_empty());
        assert_eq!(
            reply.stream,
            Some(StreamState::Failed("reply worker unavailable".to_string()))
        );
    }

    #[test]
    fn bot_request_to_stopped_worker_fails_reply() {
        let (command_sender, command_receiver) = mpsc::channel(1);
        drop(command_receiver);
        let mut app = app_with(command_sender);

        app.state.input_text = "hello".to_string();
        app.submit();

        assert_reply_failed(&app);
        assert!(app.state.input_text.is_empty());
    }

    #[test]
    fn bot_request_to_busy_worker_fails_reply() {
        let (command_sender, mut command_receiver) = mpsc::channel(1);
        command_sender
            .try_send(ChatCommand::ScheduleHumanReply {
                conversation_id: "conv_2".to_string(),
                sender_id: "user_2".to_string(),
            })
            .unwrap();
        let mut app = app_with(command_sender);

        app.state.input_text = "hello".to_string();
        app.submit();

        assert_reply_failed(&app);
        assert!(matches!(
            command_receiver.try_recv(),
            Ok(ChatCommand::ScheduleHumanReply { .. })
        ));
        assert!(command_receiver.try_recv().is_err());
    }
}
