use eframe::egui;

use crate::common::{Conversation, MessageKind};
use crate::ui::state::AppState;

use super::{presence_color, short_time};

const PREVIEW_CHARS: usize = 40;

#[derive(Default)]
pub struct SidebarActions {
    pub selected: Option<String>,
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> SidebarActions {
    let mut actions = SidebarActions::default();

    ui.horizontal(|ui| {
        ui.colored_label(presence_color(state.current_user.status), "●");
        ui.label(egui::RichText::new(&state.current_user.name).weak());
    });
    ui.heading("Chats");
    ui.add(
        egui::TextEdit::singleline(&mut state.search_query)
            .hint_text("Search messages...")
            .desired_width(f32::INFINITY),
    );
    ui.separator();

    let conversations = state.visible_conversations();
    if conversations.is_empty() {
        ui.label("No conversations found");
        return actions;
    }

    egui::ScrollArea::vertical()
        .auto_shrink([false; 2])
        .show(ui, |ui| {
            for conversation in conversations {
                let Some(contact) = conversation.other_participant(&state.current_user.id) else {
                    continue;
                };
                let selected =
                    state.active_conversation_id.as_deref() == Some(conversation.id.as_str());

                ui.horizontal(|ui| {
                    ui.colored_label(presence_color(contact.status), "●");
                    let title = egui::RichText::new(&contact.name).strong();
                    if ui.selectable_label(selected, title).clicked() {
                        actions.selected = Some(conversation.id.clone());
                    }
                    if conversation.unread_count > 0 {
                        ui.label(
                            egui::RichText::new(conversation.unread_count.to_string())
                                .color(egui::Color32::LIGHT_BLUE)
                                .strong(),
                        );
                    }
                });

                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(preview(state, conversation)).weak());
                    if let Some(last) = state.last_message(&conversation.id) {
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            ui.label(egui::RichText::new(short_time(last.timestamp)).small().weak());
                        });
                    }
                });
                ui.separator();
            }
        });

    actions
}

/// One-line summary under the contact name.
fn preview(state: &AppState, conversation: &Conversation) -> String {
    if conversation.is_typing() {
        return "typing…".to_string();
    }
    let Some(last) = state.last_message(&conversation.id) else {
        return "No messages yet".to_string();
    };

    let body = match &last.kind {
        MessageKind::Image { .. } => "Photo".to_string(),
        MessageKind::Text if last.text.chars().count() > PREVIEW_CHARS => {
            let cut: String = last.text.chars().take(PREVIEW_CHARS).collect();
            format!("{}…", cut.trim_end())
        }
        MessageKind::Text => last.text.clone(),
    };

    if state.is_own(last) {
        format!("You: {body}")
    } else {
        body
    }
}
