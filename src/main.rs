mod common;
mod config;
mod network;
mod ui;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::AppConfig;
use dotenvy::dotenv;
use network::{GeminiClient, GeminiConfig, HumanReply, ReplyClient};
use tokio::sync::mpsc;
use ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "nova_chat",
    version,
    about = "Desktop chat client with streamed Gemini replies"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Override the Gemini model from the config file
    #[arg(long, value_name = "NAME")]
    model: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Write the default config file and exit
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<(), eframe::Error> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    if cli.mode == Some(Mode::InitConfig) {
        match config::save_config(&cli.config, &AppConfig::default()) {
            Ok(()) => log::info!("Wrote default config to {}", cli.config),
            Err(err) => log::error!("Failed to write config {}: {err}", cli.config),
        }
        return Ok(());
    }

    let mut app_config = config::load_config(&cli.config);
    if let Some(model) = cli.model {
        app_config.model = model;
    }

    run_full_client(app_config).await
}

async fn run_full_client(app_config: AppConfig) -> Result<(), eframe::Error> {
    // UI -> worker
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Worker -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let api_key = app_config.resolve_api_key();
    if api_key.is_none() {
        log::warn!("No Gemini API key configured; bot replies will fail");
    }
    let model = Arc::new(GeminiClient::new(GeminiConfig {
        api_key,
        base_url: app_config.api_base_url.clone(),
        model: app_config.model.clone(),
        system_instruction: app_config.system_instruction.clone(),
    }));
    let human_reply = HumanReply {
        delay: app_config.human_reply_delay(),
        text: app_config.human_reply_text.clone(),
    };

    tokio::spawn(ReplyClient::new(model, event_tx, cmd_rx, human_reply).run());

    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "Nova Chat",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");

            log::info!("Client started with model {}", app_config.model);

            Ok(Box::new(ChatApp::new(cc, cmd_tx.clone(), event_receiver)))
        }),
    )
}
