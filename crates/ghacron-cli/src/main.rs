//! The ghacron binary: bootstrap, signal handling, shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ghacron_api::ApiState;
use ghacron_config::{Config, LogConfig};
use ghacron_github::{GithubApi, GithubClient};
use ghacron_scheduler::{Reconciler, Scheduler};

/// Fires `workflow_dispatch` for `# ghacron:` annotated workflows on
/// their annotated schedules.
#[derive(Parser)]
#[command(name = "ghacron", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();

    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.log);

    info!(version = env!("CARGO_PKG_VERSION"), "starting ghacron");

    let private_key = config.private_key()?;
    let client: Arc<dyn GithubApi> = Arc::new(
        GithubClient::new(config.github.app_id, &private_key)
            .context("failed to initialize GitHub client")?,
    );

    let timezone: Tz = config
        .reconcile
        .timezone
        .parse()
        .map_err(|_| anyhow!("invalid timezone {:?}", config.reconcile.timezone))?;

    // Build the scheduler first, then hand it to the reconciler; the
    // scheduler only sees the reconciler through its loop driver.
    let scheduler = Arc::new(Scheduler::new(
        client.clone(),
        config.reconcile.clone(),
        timezone,
    ));
    let reconciler = Arc::new(Reconciler::new(client.clone(), scheduler.clone()));

    let shutdown = CancellationToken::new();

    if config.webapi.enabled {
        let state = Arc::new(ApiState::new(
            config.clone(),
            scheduler.clone(),
            reconciler.clone(),
        ));
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = ghacron_api::serve(state, token).await {
                error!("observation API server error: {e:#}");
            }
        });
    } else {
        info!("observation API server is disabled");
    }

    let interval = Duration::from_secs(config.reconcile.interval_minutes * 60);
    let reconcile_loop = tokio::spawn({
        let scheduler = scheduler.clone();
        let reconciler = reconciler.clone();
        let token = shutdown.clone();
        async move {
            scheduler
                .run_reconcile_loop(&reconciler, interval, token)
                .await;
        }
    });

    info!(
        interval_minutes = config.reconcile.interval_minutes,
        duplicate_guard_seconds = config.reconcile.duplicate_guard_seconds,
        dry_run = config.reconcile.dry_run,
        timezone = %config.reconcile.timezone,
        "ghacron started"
    );

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received, stopping");

    shutdown.cancel();
    let _ = reconcile_loop.await;
    // In-flight dispatch handlers run to completion under their own
    // 30-second deadline.
    scheduler.stop().await;

    info!("ghacron stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log.level.clone()));

    if log.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
    Ok(())
}
