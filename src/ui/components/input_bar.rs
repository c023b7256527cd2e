use eframe::egui;

/// Composer row. Returns `true` when the user asked to send; trimming and
/// clearing are left to `AppState::send_message`.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, busy: bool, disclaimer: &str) -> bool {
    let mut send = false;
    ui.add_space(4.0);
    ui.horizontal(|ui| {
        let has_text = !input_text.trim().is_empty();
        let button_width = 60.0;

        let response = ui.add(
            egui::TextEdit::singleline(input_text)
                .hint_text("Type a message...")
                .desired_width(ui.available_width() - button_width),
        );
        if ui
            .add_enabled(has_text && !busy, egui::Button::new("Send"))
            .clicked()
        {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = !busy;
            response.request_focus();
        }
    });

    ui.vertical_centered(|ui| {
        ui.label(egui::RichText::new(disclaimer).small().weak());
    });
    ui.add_space(2.0);

    send
}
