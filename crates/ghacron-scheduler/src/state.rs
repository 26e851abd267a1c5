//! Durable per-job state in repository Actions variables.
//!
//! One variable per job records the last successful dispatch as an
//! RFC3339 timestamp. An absent or empty variable means the job has
//! never fired.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use sha2::{Digest, Sha256};

use ghacron_github::GithubApi;
use ghacron_types::CronAnnotation;

/// Reads and writes the last-dispatch variable for a job.
pub struct StateManager {
    client: Arc<dyn GithubApi>,
}

impl StateManager {
    pub fn new(client: Arc<dyn GithubApi>) -> Self {
        Self { client }
    }

    /// The last successful dispatch time, or `None` when the job has
    /// never fired. A present-but-unparseable value is an error.
    pub async fn last_dispatch(
        &self,
        annotation: &CronAnnotation,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let name = variable_name(annotation);
        let value = self
            .client
            .get_variable(&annotation.owner, &annotation.repo, &name)
            .await?;

        match value {
            None => Ok(None),
            Some(v) if v.is_empty() => Ok(None),
            Some(v) => {
                let parsed = DateTime::parse_from_rfc3339(&v)
                    .with_context(|| format!("failed to parse last dispatch time ({v:?})"))?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
        }
    }

    /// Record a dispatch time.
    pub async fn record_dispatch(
        &self,
        annotation: &CronAnnotation,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let name = variable_name(annotation);
        self.client
            .set_variable(
                &annotation.owner,
                &annotation.repo,
                &name,
                &format_rfc3339(at),
            )
            .await
    }
}

/// Variable name for a job: `GHACRON_LAST_` plus the first four bytes of
/// SHA-256 over `<workflow_file>:<cron_expr>` as uppercase hex. The
/// expression is hashed verbatim, TZ prefix included, so jobs differing
/// only in zone keep distinct records.
pub(crate) fn variable_name(annotation: &CronAnnotation) -> String {
    let digest = Sha256::digest(format!(
        "{}:{}",
        annotation.workflow_file, annotation.cron_expr
    ));
    format!(
        "GHACRON_LAST_{:02X}{:02X}{:02X}{:02X}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

/// RFC3339 with a `Z` suffix and no sub-second digits, the layout every
/// stored timestamp uses.
pub fn format_rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The rollback value when a job had never fired: `0001-01-01T00:00:00Z`.
pub(crate) fn zero_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(workflow_file: &str, cron_expr: &str) -> CronAnnotation {
        CronAnnotation {
            owner: "test-owner".into(),
            repo: "test-repo".into(),
            workflow_file: workflow_file.into(),
            cron_expr: cron_expr.into(),
            git_ref: "main".into(),
        }
    }

    #[test]
    fn test_variable_name_shape() {
        let name = variable_name(&annotation("ci.yml", "0 8 * * *"));
        assert_eq!(name.len(), 21);
        assert!(name.starts_with("GHACRON_LAST_"));
        let suffix = &name["GHACRON_LAST_".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_variable_name_deterministic() {
        let a = variable_name(&annotation("ci.yml", "0 8 * * *"));
        let b = variable_name(&annotation("ci.yml", "0 8 * * *"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_variable_name_depends_on_file_and_expr() {
        let base = variable_name(&annotation("ci.yml", "0 8 * * *"));
        assert_ne!(base, variable_name(&annotation("deploy.yml", "0 8 * * *")));
        assert_ne!(base, variable_name(&annotation("ci.yml", "0 9 * * *")));
    }

    #[test]
    fn test_variable_name_tz_prefix_is_distinct() {
        let plain = variable_name(&annotation("ci.yml", "0 8 * * *"));
        let prefixed = variable_name(&annotation("ci.yml", "CRON_TZ=Asia/Tokyo 0 8 * * *"));
        assert_ne!(plain, prefixed);
    }

    #[test]
    fn test_variable_name_ignores_owner_and_repo() {
        let mut a = annotation("ci.yml", "0 8 * * *");
        a.owner = "other".into();
        a.repo = "elsewhere".into();
        assert_eq!(
            variable_name(&a),
            variable_name(&annotation("ci.yml", "0 8 * * *"))
        );
    }

    #[test]
    fn test_format_rfc3339_uses_z_suffix() {
        let t = DateTime::parse_from_rfc3339("2026-02-25T08:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_rfc3339(t), "2026-02-25T08:00:00Z");
    }

    #[test]
    fn test_zero_instant_formats_like_a_zero_time() {
        assert_eq!(format_rfc3339(zero_instant()), "0001-01-01T00:00:00Z");
    }
}
