use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::prelude::*;

use unibot::chatbot::{ChatbotConfig, ChatbotEngine};
use unibot::config::Config;
use unibot::line::LineClient;
use unibot::llm::{AzureOpenAiClient, CompletionParams};
use unibot::server::{self, AppState};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        );

    let mut _guard = None;
    let file_layer = match config.log_dir {
        Some(ref log_dir) => {
            std::fs::create_dir_all(log_dir).ok();
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join("unibot.log"))
            {
                Ok(log_file) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
                    _guard = Some(guard);
                    Some(
                        tracing_subscriber::fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .with_filter(
                                tracing_subscriber::EnvFilter::from_default_env()
                                    .add_directive(tracing::Level::INFO.into()),
                            ),
                    )
                }
                Err(e) => {
                    eprintln!("Failed to open log file in {}: {e}", log_dir.display());
                    None
                }
            }
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("🚀 Starting unibot...");
    info!("Model deployment: {}", config.azure_openai_model);
    info!("FAQ entries: {}", config.faq.entries().len());

    let model = match AzureOpenAiClient::new(
        config.azure_openai_endpoint.clone(),
        config.azure_openai_api_key.clone(),
        config.azure_openai_api_version.clone(),
        config.azure_openai_model.clone(),
        config.model_timeout,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build model client: {e}");
            std::process::exit(1);
        }
    };

    let chatbot_config = ChatbotConfig {
        max_turns: config.history_max_turns,
        onboard_new_conversations: config.onboard_new_conversations,
        max_conversations: config.max_conversations,
        params: CompletionParams::default(),
    };
    let engine = ChatbotEngine::new(chatbot_config, config.faq.clone(), Arc::new(model));

    let state = Arc::new(AppState {
        channel_secret: config.line_channel_secret.clone(),
        engine,
        line: Arc::new(LineClient::new(config.line_channel_access_token.clone())),
    });

    if let Err(e) = server::serve(config.bind_addr, state).await {
        error!("HTTP server exited with error: {e}");
        std::process::exit(1);
    }
}
