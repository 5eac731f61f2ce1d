//! BriefBot Agents - Entry Point
//!
//! Runs the notification, context and monitor agents until Ctrl-C.

use briefbot::agents::ReminderDefaults;
use briefbot::delivery::{EmailTransport, TelegramTransport};
use briefbot::services::{GoogleCalendarClient, OllamaContextGenerator};
use briefbot::{
    Agent, AgentOrchestrator, AgentRunner, BroadcastPolicy, ChannelRouter, Config, ContextAgent, MonitorAgent,
    NotificationAgent, NotificationService, Store,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("BriefBot Agents v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: briefbot [--help]");
        println!();
        println!("Environment variables:");
        println!("  BRIEFBOT_DB_PATH       SQLite database path");
        println!("  OLLAMA_URL             Ollama base URL (default: http://localhost:11434)");
        println!("  TELEGRAM_BOT_TOKEN     Enables Telegram reminders");
        println!("  EMAIL_RELAY_URL        Enables email reminders");
        println!("  STATUS_PORT            Enables the status HTTP server");
        println!("  BRIEFBOT_LOG_JSON=1    JSON logs on stderr");
        return Ok(());
    }

    init_logging()?;
    info!("BriefBot Agents v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let store = Store::open(&config.db_path)?;
    info!("Database at {}", config.db_path.display());

    let orchestrator = Arc::new(build_orchestrator(&config, store));
    orchestrator.start_all();

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let status_server = config.status_port.map(|port| {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let orchestrator = orchestrator.clone();
        let shutdown = async move {
            let _ = shutdown_rx.changed().await;
        };
        tokio::spawn(async move {
            if let Err(e) = briefbot::status::serve(orchestrator, addr, shutdown).await {
                warn!("Status server error: {:#}", e);
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    orchestrator.stop_all().await;
    let _ = shutdown_tx.send(true);
    if let Some(server) = status_server {
        let _ = server.await;
    }

    info!("BriefBot stopped");
    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    // RUST_LOG accepts a level or per-target directives, e.g. `briefbot=debug`
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("BRIEFBOT_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter())
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

fn build_orchestrator(config: &Config, store: Store) -> AgentOrchestrator {
    let mut router = ChannelRouter::new();
    match &config.email_relay_url {
        Some(url) => {
            router = router.with_transport(Arc::new(EmailTransport::new(
                url,
                config.email_relay_api_key.clone(),
                &config.email_sender,
            )));
        }
        None => warn!("EMAIL_RELAY_URL not set; email reminders will fail"),
    }
    if let Some(token) = &config.telegram_bot_token {
        router = router.with_transport(Arc::new(TelegramTransport::new(token)));
    }

    let service = Arc::new(NotificationService::new(
        store.clone(),
        Arc::new(router),
        BroadcastPolicy::new(config.broadcast_window_minutes),
    ));
    let generator = Arc::new(OllamaContextGenerator::new(
        &config.ollama_url,
        &config.context_model,
        config.ai_timeout,
    ));
    let calendar = Arc::new(GoogleCalendarClient::new(&config.google_calendar_api));

    let notification = NotificationAgent::new(store.clone(), service.clone());
    let context = ContextAgent::new(
        store.clone(),
        generator,
        config.context_batch_size,
        config.context_lookahead_days,
    );
    let monitor = MonitorAgent::new(store, calendar, config.calendar_sync_days).with_reminders(ReminderDefaults {
        service,
        minutes_before: config.default_reminder_minutes.clone(),
        channels: config.default_channels.clone(),
    });

    let agents: [(Arc<dyn Agent>, Duration); 3] = [
        (Arc::new(notification), config.notification_interval),
        (Arc::new(context), config.context_interval),
        (Arc::new(monitor), config.monitor_interval),
    ];

    let orchestrator = AgentOrchestrator::new();
    for (agent, interval) in agents {
        orchestrator.register(Arc::new(
            AgentRunner::new(agent, interval).with_stop_timeout(config.agent_stop_timeout),
        ));
    }
    orchestrator
}
