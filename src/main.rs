use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use astro_assist::channels::{Channel, CliChannel, TelegramChannel};
use astro_assist::config::{AppConfig, LogConfig};
use astro_assist::dispatcher::Dispatcher;
use astro_assist::gateways::{
    GenerationGateway, HttpMemoryGateway, HttpPredictionGateway, MemoryGateway, PredictionGateway,
};
use astro_assist::history::ChatHistory;
use astro_assist::http::{health_routes, HealthState};
use astro_assist::llm::create_provider;
use astro_assist::onboarding::OnboardingManager;
use astro_assist::queue::DurableQueue;
use astro_assist::store::{Database, LibSqlBackend};
use astro_assist::worker::{RequestWorker, WorkerDeps};

/// Install the subscriber. The returned guard flushes the file writer on drop.
fn init_tracing(log: &LogConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(log.level.clone().unwrap_or_else(|| "info".to_string()))
        })
    };

    match &log.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "astro-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: OLLAMA_HOST, OLLAMA_MODEL, MEM0_SERVICE_URL, ASTROLOGY_API_URL");
        std::process::exit(1);
    });
    let _log_guard = init_tracing(&config.log);

    eprintln!("🔮 Astro Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} @ {}", config.llm.model, config.llm.base_url);
    eprintln!("   Memory: {}", config.memory.base_url);
    eprintln!("   Predictions: {}", config.prediction.base_url);
    eprintln!("   Health: http://0.0.0.0:{}/health", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.database_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.database_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.database_path.display());

    // ── Gateways ─────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let memory: Arc<dyn MemoryGateway> = Arc::new(HttpMemoryGateway::new(
        &config.memory.base_url,
        config.memory.timeout,
    )?);
    let prediction: Arc<dyn PredictionGateway> = Arc::new(HttpPredictionGateway::new(
        &config.prediction.base_url,
        config.prediction.timeout,
    )?);
    let generation = Arc::new(GenerationGateway::new(
        llm,
        prediction,
        &config.generation,
        config.llm.enable_thinking,
    ));
    eprintln!(
        "   Thinking: {}",
        if config.llm.enable_thinking { "enabled" } else { "disabled" }
    );

    // ── Queue ────────────────────────────────────────────────────────────
    let queue = Arc::new(DurableQueue::new(Arc::clone(&db), config.queue.clone()));
    match queue.reclaim_expired().await {
        Ok(0) => {}
        Ok(n) => eprintln!("   Recovered {n} in-flight requests from a previous run"),
        Err(e) => tracing::warn!(error = %e, "Failed to reclaim expired queue items"),
    }
    eprintln!(
        "   Queue: {} ({} consumer slot(s), {} attempts)",
        config.queue.name, config.queue.consumer_slots, config.queue.max_attempts
    );

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.telegram.bot_token {
        Some(token) => {
            let allowed = &config.telegram.allowed_users;
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if allowed.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    allowed.join(", ")
                }
            );
            Arc::new(TelegramChannel::new(token.clone(), allowed.clone()))
        }
        None => {
            eprintln!("   Telegram: disabled (no TELEGRAM_BOT_TOKEN); using CLI");
            Arc::new(CliChannel::new())
        }
    };
    eprintln!("   Channel: {}\n", channel.name());

    let history = Arc::new(ChatHistory::new(Arc::clone(&db), config.history_window));
    let onboarding = Arc::new(OnboardingManager::new(Arc::clone(&db)));
    let cancel = CancellationToken::new();

    // ── Worker ───────────────────────────────────────────────────────────
    let worker = Arc::new(RequestWorker::new(WorkerDeps {
        channel: Arc::clone(&channel),
        memory: Arc::clone(&memory),
        generation,
        history: Arc::clone(&history),
        presence_cadence: config.presence_cadence,
    }));
    let consumers = queue.spawn_consumers(worker, cancel.clone());

    // ── Health server ────────────────────────────────────────────────────
    let app = health_routes(HealthState {
        db: Arc::clone(&db),
        queue: Arc::clone(&queue),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "Health server started");
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        let shutdown = async move { server_cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    // ── Dispatcher ───────────────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&db),
        Arc::clone(&channel),
        onboarding,
        Arc::clone(&queue),
        history,
        memory,
    ));
    let mut messages = channel.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            next = messages.next() => {
                let Some(msg) = next else {
                    tracing::info!(channel = channel.name(), "Inbound stream ended");
                    break;
                };
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let outcome = dispatcher.dispatch(&msg).await;
                    tracing::debug!(user_id = msg.user_id, ?outcome, "Message dispatched");
                });
            }
        }
    }

    cancel.cancel();
    for consumer in consumers {
        let _ = consumer.await;
    }
    if let Err(e) = channel.shutdown().await {
        tracing::warn!(error = %e, "Channel shutdown failed");
    }
    eprintln!("Goodbye 🌙");
    Ok(())
}
