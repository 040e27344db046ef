use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use serenity::all::{ApplicationId, GatewayIntents, ShardManager};
use serenity::Client;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::EnvFilter;

use clan_helper::bot::{Handler, Workers};
use clan_helper::commands::market_food::{MarketClient, MARKET_PRICES_URL};
use clan_helper::commands::Commands;
use clan_helper::config::Config;
use clan_helper::db::Database;
use clan_helper::http::JsonFetcher;
use clan_helper::retry::RetryPolicy;
use clan_helper::{api, metrics};

/// How long background workers get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(?config, "Configuration loaded");

    if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!(path = %dir.display(), "Failed to create database directory: {e}");
            return ExitCode::FAILURE;
        }
    }
    let db = match Database::open(&config.db_path).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %config.db_path.display(), "Failed to open database: {e}");
            return ExitCode::FAILURE;
        }
    };

    metrics::register_metrics();

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    let fetcher = match JsonFetcher::new(RetryPolicy::HTTP) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            tracing::error!("Failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = config.health_port {
        match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => {
                let cancel = cancel.clone();
                tracker.spawn(async move {
                    if let Err(e) = api::serve(listener, cancel).await {
                        tracing::error!("Health server stopped: {e}");
                    }
                });
            }
            Err(e) => tracing::error!(port, "Failed to bind health server: {e}"),
        }
    }

    let commands = Commands::new(
        db.clone(),
        MarketClient::new(fetcher.clone(), MARKET_PRICES_URL),
        config.boss_channel.clone(),
        config.boss_summary_channel.clone(),
        cancel.clone(),
    );
    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::GUILD_MESSAGE_REACTIONS;
    let token = config.discord_token.clone();
    let application_id = ApplicationId::new(config.application_id);
    let handler = Handler::new(
        commands,
        Workers {
            config,
            db: db.clone(),
            fetcher,
            tracker: tracker.clone(),
            cancel: cancel.clone(),
        },
    );

    let mut client = match Client::builder(&token, intents)
        .event_handler(handler)
        .application_id(application_id)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to create Discord client: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(shutdown_signal(client.shard_manager.clone(), cancel.clone()));

    let result = client.start().await;
    cancel.cancel();

    tracker.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait()).await.is_err() {
        tracing::warn!("Background workers did not stop in time");
    }
    db.close().await;

    match result {
        Ok(()) => {
            tracing::info!("Shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Discord client error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Wait for Ctrl-C or SIGTERM, then stop the workers and the gateway.
async fn shutdown_signal(shard_manager: Arc<ShardManager>, cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    tracing::info!("Shutting down");
    cancel.cancel();
    shard_manager.shutdown_all().await;
}
