//! ghacron-api: the observation HTTP surface.
//!
//! Read-only endpoints for health checks and for diagnosing the engine:
//! registered jobs with next-fire times, the latest skipped-annotation
//! list, the last reconcile time, and the effective public
//! configuration. Secrets never appear here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ghacron_config::Config;
use ghacron_scheduler::{format_rfc3339, Reconciler, Scheduler};
use ghacron_types::{JobDetail, SkippedAnnotation};

/// Shared state behind the observation endpoints.
pub struct ApiState {
    config: Config,
    scheduler: Arc<Scheduler>,
    reconciler: Arc<Reconciler>,
    started_at: Instant,
}

impl ApiState {
    pub fn new(config: Config, scheduler: Arc<Scheduler>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            config,
            scheduler,
            reconciler,
            started_at: Instant::now(),
        }
    }
}

/// Serve the observation API until the token is cancelled.
pub async fn serve(state: Arc<ApiState>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.webapi.host, state.config.webapi.port
    )
    .parse()?;

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("observation API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route("/status", get(status_handler))
        .route("/jobs", get(jobs_handler))
        .route("/config", get(config_handler))
        .with_state(state)
}

async fn index_handler() -> impl IntoResponse {
    Json(json!({
        "service": "ghacron",
        "endpoints": [
            {"path": "/healthz", "description": "Health check"},
            {"path": "/status", "description": "Service status (uptime, job count, last reconcile)"},
            {"path": "/jobs", "description": "Registered cron job list"},
            {"path": "/config", "description": "Public configuration"},
        ],
    }))
}

async fn healthz_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn status_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let mut status = json!({
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "registered_jobs": state.scheduler.registered_job_count().await,
    });
    if let Some(last) = state.scheduler.last_reconcile_time().await {
        status["last_reconcile"] = json!(format_rfc3339(last));
    }
    Json(status)
}

#[derive(Serialize)]
struct JobsResponse {
    registered: Vec<JobDetail>,
    skipped: Vec<SkippedAnnotation>,
}

async fn jobs_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(JobsResponse {
        registered: state.scheduler.job_details().await,
        skipped: state.reconciler.skipped_annotations().await,
    })
}

/// The public configuration exposed by `/config`. Keys mirror the
/// `GHACRON_*` environment variable names, without the prefix.
#[derive(Serialize)]
struct ConfigResponse {
    app_id: i64,
    reconcile_interval_minutes: u64,
    reconcile_duplicate_guard_seconds: u64,
    dry_run: bool,
    timezone: String,
    log_level: String,
    log_format: String,
    webapi_enabled: bool,
    webapi_host: String,
    webapi_port: u16,
}

async fn config_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let config = &state.config;
    Json(ConfigResponse {
        app_id: config.github.app_id,
        reconcile_interval_minutes: config.reconcile.interval_minutes,
        reconcile_duplicate_guard_seconds: config.reconcile.duplicate_guard_seconds,
        dry_run: config.reconcile.dry_run,
        timezone: config.reconcile.timezone.clone(),
        log_level: config.log.level.clone(),
        log_format: config.log.format.clone(),
        webapi_enabled: config.webapi.enabled,
        webapi_host: config.webapi.host.clone(),
        webapi_port: config.webapi.port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_response_serializes_empty_arrays() {
        let resp = JobsResponse {
            registered: vec![],
            skipped: vec![],
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"registered":[],"skipped":[]}"#);
    }

    #[test]
    fn test_config_response_has_no_secrets() {
        let resp = ConfigResponse {
            app_id: 12345,
            reconcile_interval_minutes: 5,
            reconcile_duplicate_guard_seconds: 60,
            dry_run: false,
            timezone: "UTC".into(),
            log_level: "info".into(),
            log_format: "json".into(),
            webapi_enabled: true,
            webapi_host: "0.0.0.0".into(),
            webapi_port: 8080,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"app_id\":12345"));
        assert!(!json.to_lowercase().contains("key"));
        assert!(!json.to_lowercase().contains("token"));
    }
}
