pub mod chat_area;
pub mod input_bar;
pub mod sidebar;

use chrono::{DateTime, Local, Utc};
use eframe::egui;

use crate::common::Presence;

pub fn presence_color(status: Presence) -> egui::Color32 {
    match status {
        Presence::Online => egui::Color32::GREEN,
        Presence::Away => egui::Color32::YELLOW,
        Presence::Offline => egui::Color32::GRAY,
    }
}

/// `14:05` for today, `Mar 02` otherwise.
pub fn short_time(timestamp: DateTime<Utc>) -> String {
    let local = timestamp.with_timezone(&Local);
    if local.date_naive() == Local::now().date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%b %d").to_string()
    }
}
