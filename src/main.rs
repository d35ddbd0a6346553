use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use relay_bot::channels::{Gateway, TelegramGateway};
use relay_bot::config::BotConfig;
use relay_bot::error;
use relay_bot::health::health_routes;
use relay_bot::relay::{RelayRouter, RelayState};

/// How often idle rate windows are dropped.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export TELEGRAM_TOKEN=123456:ABC... OWNER_ID=123456789");
        std::process::exit(1);
    });

    // Initialize tracing; the guard flushes the file writer on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("📨 Relay Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mode: {}", config.relay.mode);
    eprintln!("   Owner: {}", config.relay.owner);
    eprintln!("   Data: {}", config.relay.data_dir.display());
    eprintln!("   Health: http://0.0.0.0:{}/health", config.port);

    let gateway: Arc<dyn Gateway> = Arc::new(TelegramGateway::new(config.telegram_token.clone())?);
    if let Err(e) = gateway.health_check().await {
        tracing::warn!(error = %e, "Telegram health check failed; polling anyway");
    }

    let state = RelayState::load(&config.relay).await;
    let router = Arc::new(RelayRouter::new(&config.relay, Arc::clone(&gateway), state));

    // Spawn liveness server
    let app = health_routes(config.relay.mode);
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = serve_health(app, port).await {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    // Spawn rate window sweep task (runs every 60s)
    let _sweep_handle = router.spawn_maintenance(SWEEP_INTERVAL);

    let mut events = gateway
        .start()
        .await
        .context("failed to start Telegram gateway")?;
    tracing::info!(mode = %router.mode(), "Relay bot started");

    while let Some(event) = events.next().await {
        // Each event runs in its own task so a panic stays contained.
        let router = Arc::clone(&router);
        let user = event.sender.id;
        let task = tokio::spawn(async move { router.handle(event).await });
        if let Err(e) = task.await {
            tracing::error!(user_id = %user, error = %e, "Event handler panicked");
        }
    }

    gateway.shutdown().await?;
    Ok(())
}

fn init_tracing(config: &BotConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "relay-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .init();
            None
        }
    }
}

async fn serve_health(app: axum::Router, port: u16) -> error::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Health server started");
    axum::serve(listener, app).await?;
    Ok(())
}
