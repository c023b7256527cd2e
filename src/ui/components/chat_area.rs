use eframe::egui;

use crate::common::{ChatMessage, MessageKind, MessageStatus};
use crate::ui::state::AppState;

use super::{presence_color, short_time};

const OWN_BUBBLE: egui::Color32 = egui::Color32::from_rgb(79, 70, 229);

#[derive(Default)]
pub struct ChatAreaActions {
    pub back: bool,
    /// `(conversation_id, message_id)` of a failed reply to ask for again.
    pub retry: Option<(String, String)>,
}

pub fn render(ui: &mut egui::Ui, state: &AppState) -> ChatAreaActions {
    let mut actions = ChatAreaActions::default();
    let Some(conversation) = state.active_conversation() else {
        return actions;
    };
    let Some(contact) = state.other_participant(&conversation.id) else {
        return actions;
    };

    ui.horizontal(|ui| {
        if ui.button("←").clicked() {
            actions.back = true;
        }
        ui.colored_label(presence_color(contact.status), "●");
        ui.vertical(|ui| {
            ui.heading(&contact.name);
            let presence = ui.label(egui::RichText::new(contact.presence_label()).small().weak());
            if let Some(last_seen) = contact.last_seen {
                presence.on_hover_text(format!("Last seen {}", short_time(last_seen)));
            }
        });
    });
    ui.separator();

    egui::ScrollArea::vertical()
        .auto_shrink([false; 2])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(egui::RichText::new("Today").small().weak());
            });

            let messages = state.active_messages();
            for message in messages {
                if bubble(ui, message, state.is_own(message)) {
                    actions.retry = Some((conversation.id.clone(), message.id.clone()));
                }
            }

            // Placeholder not inserted yet: the stream is still opening.
            let placeholder_shown = conversation
                .streaming_message_id()
                .is_some_and(|id| messages.iter().any(|message| message.id == id));
            if conversation.is_typing() && !placeholder_shown {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(egui::RichText::new("typing…").italics().weak());
                });
            }
        });

    actions
}

/// Draw one message. Returns `true` when its Retry button was clicked.
fn bubble(ui: &mut egui::Ui, message: &ChatMessage, own: bool) -> bool {
    let mut retry = false;
    let layout = if own {
        egui::Layout::right_to_left(egui::Align::TOP)
    } else {
        egui::Layout::left_to_right(egui::Align::TOP)
    };

    ui.with_layout(layout, |ui| {
        let fill = if own {
            OWN_BUBBLE
        } else {
            ui.visuals().extreme_bg_color
        };
        egui::Frame::group(ui.style()).fill(fill).show(ui, |ui| {
            ui.set_max_width(ui.available_width() * 0.7);
            ui.vertical(|ui| {
                match &message.kind {
                    MessageKind::Image { url } => {
                        ui.hyperlink_to("Photo", url);
                    }
                    MessageKind::Text if message.text.is_empty() && message.is_streaming() => {
                        ui.label(egui::RichText::new("typing…").italics().weak());
                    }
                    MessageKind::Text => {
                        let text = egui::RichText::new(&message.text);
                        ui.label(if own { text.color(egui::Color32::WHITE) } else { text });
                    }
                }

                ui.horizontal(|ui| {
                    let mut meta = short_time(message.timestamp);
                    if own {
                        meta.push(' ');
                        meta.push_str(status_mark(message.status));
                    }
                    ui.label(egui::RichText::new(meta).small().weak());
                });

                if let Some(reason) = message.failure() {
                    ui.horizontal(|ui| {
                        ui.colored_label(egui::Color32::LIGHT_RED, format!("⚠ {reason}"));
                        if ui.small_button("Retry").clicked() {
                            retry = true;
                        }
                    });
                }
            });
        });
    });

    retry
}

fn status_mark(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Sending => "…",
        MessageStatus::Sent => "✓",
        MessageStatus::Delivered | MessageStatus::Read => "✓✓",
    }
}

/// Shown when no conversation is selected.
pub fn render_welcome(ui: &mut egui::Ui) {
    ui.vertical_centered(|ui| {
        ui.add_space(ui.available_height() * 0.3);
        ui.heading("Welcome to Nova Chat");
        ui.add_space(8.0);
        ui.label("Select a conversation from the sidebar to start messaging.");
        ui.label("Try talking to Gemini Assistant for real-time AI responses.");
    });
}
