use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use intake_bot::channels::{ChatTransport, TelegramTransport};
use intake_bot::config::BotConfig;
use intake_bot::extraction::{DocumentExtractor, HttpExtractor};
use intake_bot::flow::{FlowController, FlowDeps, MessageDispatcher, PlainTextPolicyRenderer};
use intake_bot::llm::create_agent;
use intake_bot::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    eprintln!("🚗 Intake Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.agent.model);
    eprintln!("   Price: {}", config.quote);
    eprintln!(
        "   Telegram allowed users: {}",
        config.telegram.allowed_users.join(", ")
    );

    let store = Arc::new(SessionStore::new());

    let extractor: Arc<dyn DocumentExtractor> = Arc::new(HttpExtractor::new(
        config.extraction.base_url.clone(),
        config.extraction.api_key.clone(),
    ));

    let agent = create_agent(&config.agent, Arc::clone(&store), Arc::clone(&extractor))
        .context("Failed to create agent")?;

    let telegram = Arc::new(TelegramTransport::new(
        config.telegram.bot_token.clone(),
        config.telegram.allowed_users.clone(),
    ));
    telegram
        .health_check()
        .await
        .context("Telegram health check failed")?;

    let transport: Arc<dyn ChatTransport> = telegram.clone();
    let controller = Arc::new(FlowController::new(
        store,
        FlowDeps {
            transport,
            agent,
            extractor,
            renderer: Arc::new(PlainTextPolicyRenderer),
            quote: config.quote.clone(),
            limits: config.limits.clone(),
        },
    ));

    let dispatcher = MessageDispatcher::new(controller);
    let mut messages = telegram.start();
    tracing::info!("Intake bot ready");

    loop {
        tokio::select! {
            message = messages.next() => {
                let Some(message) = message else {
                    tracing::warn!("Telegram message stream ended");
                    break;
                };
                dispatcher.dispatch(message).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    tracing::info!(users = dispatcher.active_users().await, "Draining user queues");
    dispatcher.drain().await;
    Ok(())
}
