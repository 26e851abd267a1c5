//! The dispatch handler: what runs when a job's tick arrives.
//!
//! A linear sequence of guarded steps. The pre-save before the dispatch
//! call is the invariant that keeps a lost response from turning into a
//! duplicate on the next tick; the rollback after an observed dispatch
//! failure restores the prior state so the next tick can retry. When the
//! initial read failed we never learned the prior state, so no rollback
//! is issued (a made-up mark could hide an older one).

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use ghacron_config::ReconcileConfig;
use ghacron_github::GithubApi;
use ghacron_types::CronAnnotation;

use crate::state::{zero_instant, StateManager};

/// Run one dispatch for an annotation. Never returns an error: every
/// failure path resolves to a logged terminal state.
pub(crate) async fn run_dispatch(
    client: Arc<dyn GithubApi>,
    config: &ReconcileConfig,
    annotation: &CronAnnotation,
) {
    let state = StateManager::new(client.clone());

    // Read the previous dispatch time. A failed read forfeits rollback
    // for this invocation but does not block the dispatch.
    let previous = match state.last_dispatch(annotation).await {
        Ok(prev) => Some(prev),
        Err(e) => {
            warn!(
                owner = %annotation.owner,
                repo = %annotation.repo,
                workflow_file = %annotation.workflow_file,
                "failed to read last dispatch time, proceeding without rollback: {e:#}"
            );
            None
        }
    };

    // Duplicate guard: suppress a tick that lands too soon after the
    // recorded last dispatch.
    if let Some(Some(last)) = previous {
        let guard = Duration::seconds(config.duplicate_guard_seconds as i64);
        let elapsed = Utc::now() - last;
        if config.duplicate_guard_seconds > 0 && elapsed < guard {
            info!(
                owner = %annotation.owner,
                repo = %annotation.repo,
                workflow_file = %annotation.workflow_file,
                elapsed_seconds = elapsed.num_seconds(),
                guard_seconds = config.duplicate_guard_seconds,
                "duplicate guard suppressed dispatch"
            );
            return;
        }
    }

    if config.dry_run {
        info!(
            owner = %annotation.owner,
            repo = %annotation.repo,
            workflow_file = %annotation.workflow_file,
            git_ref = %annotation.git_ref,
            cron_expr = %annotation.cron_expr,
            "[dry-run] would dispatch"
        );
        return;
    }

    // Pre-save the dispatch time. Dispatching without a durable mark
    // could duplicate on the next tick, so a failed save aborts.
    let now = Utc::now();
    if let Err(e) = state.record_dispatch(annotation, now).await {
        warn!(
            owner = %annotation.owner,
            repo = %annotation.repo,
            workflow_file = %annotation.workflow_file,
            "failed to pre-save dispatch time, skipping dispatch: {e:#}"
        );
        return;
    }

    if let Err(e) = client
        .dispatch_workflow(
            &annotation.owner,
            &annotation.repo,
            &annotation.workflow_file,
            &annotation.git_ref,
        )
        .await
    {
        warn!(
            owner = %annotation.owner,
            repo = %annotation.repo,
            workflow_file = %annotation.workflow_file,
            "dispatch failed: {e:#}"
        );

        // Roll back only when the earlier read succeeded.
        if let Some(prev) = previous {
            let rollback_to = prev.unwrap_or_else(zero_instant);
            if let Err(rb) = state.record_dispatch(annotation, rollback_to).await {
                warn!(
                    owner = %annotation.owner,
                    repo = %annotation.repo,
                    workflow_file = %annotation.workflow_file,
                    "failed to roll back dispatch time: {rb:#}"
                );
            }
        }
    }
}
