//! Convergence of desired state (annotations) onto the timer registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use ghacron_github::GithubApi;
use ghacron_scanner::Scanner;
use ghacron_types::{CronAnnotation, CronJobKey, SkippedAnnotation};

use crate::scheduler::Scheduler;

/// Applies the diff between scanned annotations and registered jobs.
///
/// Also publishes the skipped-annotation list from the latest scan for
/// the observation surface, replacing the previous iteration's list.
pub struct Reconciler {
    scanner: Scanner,
    scheduler: Arc<Scheduler>,
    skipped: RwLock<Vec<SkippedAnnotation>>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn GithubApi>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            scanner: Scanner::new(client),
            scheduler,
            skipped: RwLock::new(Vec::new()),
        }
    }

    /// One full convergence pass. Fails only when the scan itself fails;
    /// individual job registration failures are logged and skipped.
    pub async fn reconcile(&self) -> anyhow::Result<()> {
        let result = self.scanner.scan_all().await?;

        // Desired state keyed by job identity. Duplicate keys collapse,
        // last scanned occurrence winning.
        let mut desired: HashMap<CronJobKey, CronAnnotation> = HashMap::new();
        for annotation in result.annotations {
            desired.insert(annotation.key(), annotation);
        }

        let actual = self.scheduler.registered_keys().await;
        let actual_set: HashSet<&CronJobKey> = actual.iter().collect();

        let to_add: Vec<&CronAnnotation> = desired
            .iter()
            .filter(|(key, _)| !actual_set.contains(key))
            .map(|(_, annotation)| annotation)
            .collect();
        let to_remove: Vec<&CronJobKey> = actual
            .iter()
            .filter(|key| !desired.contains_key(*key))
            .collect();

        let (added, removed) = (to_add.len(), to_remove.len());

        for annotation in to_add {
            if let Err(e) = self.scheduler.add_job(annotation.clone()).await {
                warn!("failed to add job: {e:#}");
            }
        }
        for key in to_remove {
            self.scheduler.remove_job(key).await;
        }

        *self.skipped.write().await = result.skipped;

        if added > 0 || removed > 0 {
            info!(added, removed, desired = desired.len(), "reconcile applied changes");
        }

        Ok(())
    }

    /// The skipped annotations from the most recent completed scan.
    pub async fn skipped_annotations(&self) -> Vec<SkippedAnnotation> {
        self.skipped.read().await.clone()
    }
}
