//! Timer registry: one background task per registered job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use ghacron_config::ReconcileConfig;
use ghacron_cron::CronSpec;
use ghacron_github::GithubApi;
use ghacron_types::{CronAnnotation, CronJobKey, JobDetail};

use crate::dispatch::run_dispatch;
use crate::reconciler::Reconciler;

/// Upper bound on a single dispatch handler invocation.
const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

struct RegisteredJob {
    annotation: CronAnnotation,
    spec: CronSpec,
    cancel: CancellationToken,
}

/// Owns the job registry and the per-job timers.
///
/// The registry is the only shared mutable state: a reader-writer lock
/// guards it, with all observation getters on the reader side. Handler
/// closures capture their annotation by value and stay valid after the
/// job is removed.
pub struct Scheduler {
    client: Arc<dyn GithubApi>,
    config: ReconcileConfig,
    timezone: Tz,
    jobs: RwLock<HashMap<CronJobKey, RegisteredJob>>,
    last_reconcile: RwLock<Option<DateTime<Utc>>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler evaluating unprefixed expressions in
    /// `timezone`.
    pub fn new(client: Arc<dyn GithubApi>, config: ReconcileConfig, timezone: Tz) -> Self {
        Self {
            client,
            config,
            timezone,
            jobs: RwLock::new(HashMap::new()),
            last_reconcile: RwLock::new(None),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a job. Adding an already-registered key is a no-op.
    ///
    /// The expression is re-validated here: the scanner pre-validates,
    /// but registration treats its input as untrusted.
    pub async fn add_job(&self, annotation: CronAnnotation) -> anyhow::Result<()> {
        let key = annotation.key();
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&key) {
            return Ok(());
        }

        let spec = CronSpec::parse(&annotation.cron_expr).with_context(|| {
            format!(
                "failed to add cron job ({}/{} {} {:?})",
                annotation.owner, annotation.repo, annotation.workflow_file, annotation.cron_expr
            )
        })?;

        let cancel = self.shutdown.child_token();
        self.tracker.spawn(job_timer(
            self.client.clone(),
            self.config.clone(),
            self.timezone,
            annotation.clone(),
            spec.clone(),
            cancel.clone(),
            self.tracker.clone(),
        ));

        info!(
            owner = %annotation.owner,
            repo = %annotation.repo,
            workflow_file = %annotation.workflow_file,
            cron_expr = %annotation.cron_expr,
            "registered cron job"
        );
        jobs.insert(
            key,
            RegisteredJob {
                annotation,
                spec,
                cancel,
            },
        );
        Ok(())
    }

    /// Deregister a job. Removing an unknown key is a no-op. A handler
    /// already executing for the key runs to completion.
    pub async fn remove_job(&self, key: &CronJobKey) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.remove(key) {
            job.cancel.cancel();
            info!(
                owner = %key.owner,
                repo = %key.repo,
                workflow_file = %key.workflow_file,
                cron_expr = %key.cron_expr,
                "removed cron job"
            );
        }
    }

    /// Snapshot of the registered keys.
    pub async fn registered_keys(&self) -> Vec<CronJobKey> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Number of registered jobs.
    pub async fn registered_job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// When the last reconcile iteration finished, if any yet.
    pub async fn last_reconcile_time(&self) -> Option<DateTime<Utc>> {
        *self.last_reconcile.read().await
    }

    /// Details of every registered job, next-fire times computed on
    /// demand.
    pub async fn job_details(&self) -> Vec<JobDetail> {
        let jobs = self.jobs.read().await;
        jobs.values()
            .map(|job| JobDetail {
                owner: job.annotation.owner.clone(),
                repo: job.annotation.repo.clone(),
                workflow_file: job.annotation.workflow_file.clone(),
                cron_expr: job.annotation.cron_expr.clone(),
                next_run: job.spec.upcoming(self.timezone),
            })
            .collect()
    }

    /// Drive the reconcile loop: once immediately, then on every tick of
    /// a fixed interval, until the token is cancelled. The current
    /// iteration always runs to completion.
    pub async fn run_reconcile_loop(
        &self,
        reconciler: &Reconciler,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        self.run_reconcile(reconciler).await;

        let mut ticker = tokio::time::interval(interval);
        // The first tick of a tokio interval completes immediately; the
        // startup run above already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("reconcile loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_reconcile(reconciler).await;
                }
            }
        }
    }

    async fn run_reconcile(&self, reconciler: &Reconciler) {
        info!("reconcile started");
        let started = std::time::Instant::now();

        if let Err(e) = reconciler.reconcile().await {
            error!("reconcile failed: {e:#}");
        }

        *self.last_reconcile.write().await = Some(Utc::now());

        let registered_jobs = self.registered_job_count().await;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            registered_jobs,
            "reconcile finished"
        );
    }

    /// Stop all timers and wait for currently executing handlers to
    /// return.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("cron scheduler stopped");
    }
}

/// The timer task owning one job's schedule. Each due tick spawns the
/// dispatch handler on the shared tracker with its own deadline, so a
/// slow handler does not delay the following tick.
async fn job_timer(
    client: Arc<dyn GithubApi>,
    config: ReconcileConfig,
    timezone: Tz,
    annotation: CronAnnotation,
    spec: CronSpec,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    // Anchoring the next-occurrence search at the previous fire time
    // (not the wall clock) keeps an early timer wake-up from firing the
    // same tick twice.
    let mut anchor = Utc::now();

    loop {
        let Some(next) = spec.next_after(anchor, timezone) else {
            warn!(
                owner = %annotation.owner,
                repo = %annotation.repo,
                workflow_file = %annotation.workflow_file,
                cron_expr = %annotation.cron_expr,
                "cron expression has no upcoming occurrence"
            );
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {
                let client = client.clone();
                let config = config.clone();
                let annotation = annotation.clone();
                tracker.spawn(async move {
                    let run = run_dispatch(client, &config, &annotation);
                    if tokio::time::timeout(HANDLER_TIMEOUT, run).await.is_err() {
                        warn!(
                            owner = %annotation.owner,
                            repo = %annotation.repo,
                            workflow_file = %annotation.workflow_file,
                            "dispatch handler timed out"
                        );
                    }
                });
                anchor = next;
            }
        }
    }
}
