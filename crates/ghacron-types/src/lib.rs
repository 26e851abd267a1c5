//! ghacron-types: data model shared by the scanner, scheduler and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository visible to the GitHub App installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository owner (user or organization login).
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Default branch at discovery time (e.g. "main").
    pub default_branch: String,
}

/// A workflow file under `.github/workflows/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFile {
    /// File name (e.g. "build.yml").
    pub name: String,
    /// Full path (e.g. ".github/workflows/build.yml").
    pub path: String,
}

/// A cron annotation extracted from a workflow file comment.
///
/// `cron_expr` is kept verbatim as written, including any leading
/// `CRON_TZ=`/`TZ=` token. `git_ref` is the repository's default branch
/// at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronAnnotation {
    pub owner: String,
    pub repo: String,
    pub workflow_file: String,
    pub cron_expr: String,
    pub git_ref: String,
}

impl CronAnnotation {
    /// The identity under which this annotation is registered and its
    /// durable state is keyed.
    pub fn key(&self) -> CronJobKey {
        CronJobKey {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            workflow_file: self.workflow_file.clone(),
            cron_expr: self.cron_expr.clone(),
        }
    }
}

/// Uniquely identifies a registered cron job.
///
/// The expression is part of the identity: changing any field yields a
/// different job and a different durable variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CronJobKey {
    pub owner: String,
    pub repo: String,
    pub workflow_file: String,
    pub cron_expr: String,
}

/// An annotation that was detected but rejected by cron validation.
///
/// Regenerated fresh each reconcile; exposed on the observation surface
/// for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAnnotation {
    pub owner: String,
    pub repo: String,
    pub workflow_file: String,
    pub cron_expr: String,
    pub reason: String,
}

/// Details of a registered job for the observation surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetail {
    pub owner: String,
    pub repo: String,
    pub workflow_file: String,
    pub cron_expr: String,
    pub next_run: Option<DateTime<Utc>>,
}
