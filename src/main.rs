//! Vibebot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use serenity::http::Http;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vibebot::llm::CompletionClient;
use vibebot::messaging::{DiscordGateway, DiscordPort};
use vibebot::pipeline::Pipeline;
use vibebot::poll::PollRegistry;
use vibebot::queue::EventQueue;
use vibebot::store::{self, InteractionLog, ProfileStore};

#[derive(Parser)]
#[command(name = "vibebot")]
#[command(about = "A persona Discord bot with model-driven charisma and polls")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting vibebot...");

    let config = vibebot::config::Config::load()
        .with_context(|| "failed to load configuration from environment")?;
    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let options = SqliteConnectOptions::new()
        .filename(config.sqlite_path())
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| "failed to open SQLite database")?;
    store::initialize(&pool)
        .await
        .with_context(|| "failed to initialize database schema")?;
    tracing::info!("Database ready");

    let system_prompt = config.load_system_prompt();

    let http = Arc::new(Http::new(&config.discord_token));
    let bot_user = http
        .get_current_user()
        .await
        .with_context(|| "failed to look up the bot's own user")?;
    tracing::info!(username = %bot_user.name, user_id = bot_user.id.get(), "Authenticated with Discord");

    let queue = Arc::new(EventQueue::new(config.queue.capacity));
    let registry = Arc::new(PollRegistry::new());
    let profiles = ProfileStore::new(pool.clone());
    let log = InteractionLog::new(pool);
    let llm = Arc::new(CompletionClient::new(config.llm.clone()));
    let port = DiscordPort::new(http);

    let pipeline = Arc::new(Pipeline::new(
        profiles,
        log,
        llm,
        port,
        registry.clone(),
        bot_user.id.get(),
        config.bot_name.clone(),
        system_prompt,
    ));

    // Single drain loop: one event at a time, paced between dequeues.
    let drain_delay = config.queue.drain_delay;
    let drain_queue = queue.clone();
    let drain_pipeline = pipeline.clone();
    tokio::spawn(async move {
        loop {
            let event = drain_queue.pop().await;
            drain_pipeline.run(event).await;
            let depth = drain_queue.len();
            if depth > 0 {
                tracing::debug!(depth, "events waiting in queue");
            }
            tokio::time::sleep(drain_delay).await;
        }
    });

    // Periodic poll sweep.
    let sweep_registry = registry.clone();
    let poll_config = config.poll;
    tokio::spawn(async move {
        let max_age = chrono::Duration::from_std(poll_config.max_age)
            .unwrap_or_else(|_| chrono::Duration::minutes(60));
        let mut interval = tokio::time::interval(poll_config.sweep_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = sweep_registry.sweep(max_age);
            if removed > 0 {
                tracing::debug!(removed, active = sweep_registry.active_count(), "swept polls");
            }
        }
    });

    if config.webhook.public_key.is_some() {
        let webhook = config.webhook.clone();
        tokio::spawn(async move {
            if let Err(error) = vibebot::server::serve(&webhook).await {
                tracing::error!(%error, "webhook server exited");
            }
        });
    }

    let gateway = DiscordGateway::new(queue, registry, config.bot_name.clone());
    let gateway_task = tokio::spawn(async move {
        if let Err(error) = gateway.run(&config.discord_token).await {
            tracing::error!(%error, "gateway connection ended");
        }
    });

    tracing::info!("Vibebot started successfully");

    tokio::select! {
        _ = gateway_task => {
            tracing::info!("Gateway task ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Vibebot stopped");
    Ok(())
}
