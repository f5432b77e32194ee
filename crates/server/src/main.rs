mod api;
mod cli;
mod consume;
mod db;
mod pg_sink;
mod replay;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use monitor_core::Config;
use monitor_limits::{LaneRouter, LimitChecker, MemorySink, NotificationFilters, NotificationSink};
use monitor_queue::{QueueConsumer, SqsConsumer};

use crate::cli::{CliArgs, Command};
use crate::consume::run_consumer;
use crate::pg_sink::PgNotificationSink;
use crate::state::{AppState, QueueMetrics};

fn load_config() -> Config {
    monitor_core::config::load_dotenv();
    Config::from_env()
}

/// PostgreSQL when configured, otherwise an in-memory sink.
async fn build_sink(config: &Config, force_memory: bool) -> anyhow::Result<Arc<dyn NotificationSink>> {
    if force_memory {
        info!("Using in-memory notification sink");
        return Ok(Arc::new(MemorySink::new()));
    }
    if !config.postgres.is_configured() {
        warn!("PG_USERNAME not set; notifications are kept in memory only");
        return Ok(Arc::new(MemorySink::new()));
    }
    let pool = db::init_pg_pool(&config.postgres)
        .await
        .context("failed to initialise PostgreSQL")?;
    Ok(Arc::new(PgNotificationSink::new(pool)))
}

async fn serve(config: Config, memory_sink: bool) -> anyhow::Result<()> {
    config.log_summary();

    let sink = build_sink(&config, memory_sink).await?;
    let checker = Arc::new(LimitChecker::from_config(&config.limits, sink.clone()));
    info!(evaluators = ?checker.evaluator_names(), "Limit engine ready");
    let lanes = LaneRouter::from_config(checker, &config.limits);

    let metrics = Arc::new(QueueMetrics::default());
    let state = Arc::new(AppState::new(
        sink,
        metrics.clone(),
        config.redacted_summary(),
    ));
    let app = router::build_router(state, &config.server.cors_origin);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    let mut http_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    if config.queue.is_configured() {
        let consumer = SqsConsumer::new(&config.aws, &config.queue).await?;
        match consumer.health_check().await {
            Ok(health) => info!(%health, "Queue reachable"),
            Err(e) => warn!(error = %e, "Queue health check failed; polling anyway"),
        }
        let exit = run_consumer(&consumer, &lanes, &config.queue, &metrics, shutdown_rx).await;
        info!(?exit, "Queue consumer stopped");
    } else {
        warn!("QUEUE_URL not set; serving HTTP API only");
        let mut idle = shutdown_rx;
        let _ = idle.changed().await;
    }

    lanes.shutdown().await;
    server.await??;
    Ok(())
}

async fn replay(config: Config, file: &std::path::Path, persist: bool) -> anyhow::Result<()> {
    let sink = build_sink(&config, !persist).await?;
    let checker = Arc::new(LimitChecker::from_config(&config.limits, sink.clone()));

    let summary = replay::replay_file(file, checker, &config.limits, &config.queue).await?;

    if persist {
        info!(
            lines = summary.lines,
            events = summary.events,
            parse_failures = summary.parse_failures,
            backend = sink.backend_name(),
            "Replay complete; notifications persisted"
        );
        return Ok(());
    }

    let notifications = sink.find(&NotificationFilters::default()).await?;
    for n in notifications.iter().rev() {
        println!("{}", serde_json::to_string(n)?);
    }
    info!(
        lines = summary.lines,
        events = summary.events,
        parse_failures = summary.parse_failures,
        notifications = notifications.len(),
        "Replay complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut config = load_config();

    match CliArgs::parse().command() {
        Command::Serve {
            host,
            port,
            memory_sink,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, memory_sink).await
        }
        Command::Replay { file, persist } => replay(config, &file, persist).await,
    }
}
