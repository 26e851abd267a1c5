//! Cross-repository annotation scanner.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use ghacron_cron::CronSpec;
use ghacron_github::GithubApi;
use ghacron_types::{CronAnnotation, Repository, SkippedAnnotation, WorkflowFile};

use crate::parser::{has_workflow_dispatch, parse_annotations};

/// One scan pass over every reachable repository.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Annotations that validated against the cron grammar.
    pub annotations: Vec<CronAnnotation>,
    /// Annotations rejected by the cron grammar, with reasons.
    pub skipped: Vec<SkippedAnnotation>,
}

/// Discovers cron annotations across all installation repositories.
pub struct Scanner {
    client: Arc<dyn GithubApi>,
}

impl Scanner {
    pub fn new(client: Arc<dyn GithubApi>) -> Self {
        Self { client }
    }

    /// Scan every repository. Per-repository and per-file failures are
    /// logged and skipped; only a failure to list repositories at all
    /// aborts the scan.
    pub async fn scan_all(&self) -> anyhow::Result<ScanResult> {
        let repos = self
            .client
            .list_installation_repos()
            .await
            .context("failed to list installation repositories")?;

        info!(repositories = repos.len(), "scanning repositories");

        let mut result = ScanResult::default();

        for repo in &repos {
            match self.scan_repo(repo).await {
                Ok(mut found) => {
                    result.annotations.append(&mut found.annotations);
                    result.skipped.append(&mut found.skipped);
                }
                Err(e) => {
                    warn!(
                        owner = %repo.owner,
                        repo = %repo.name,
                        "repository scan failed: {e:#}"
                    );
                }
            }
        }

        info!(
            annotations = result.annotations.len(),
            skipped = result.skipped.len(),
            "scan complete"
        );
        Ok(result)
    }

    async fn scan_repo(&self, repo: &Repository) -> anyhow::Result<ScanResult> {
        let files = self
            .client
            .get_workflow_files(&repo.owner, &repo.name)
            .await?;

        let mut result = ScanResult::default();

        for file in &files {
            let content = match self
                .client
                .get_file_content(&repo.owner, &repo.name, &file.path, &repo.default_branch)
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    warn!(
                        owner = %repo.owner,
                        repo = %repo.name,
                        path = %file.path,
                        "file read failed: {e:#}"
                    );
                    continue;
                }
            };

            let mut found = parse_file(repo, file, &content);
            result.annotations.append(&mut found.annotations);
            result.skipped.append(&mut found.skipped);
        }

        Ok(result)
    }
}

/// Extract and validate the annotations of a single workflow file.
fn parse_file(repo: &Repository, file: &WorkflowFile, content: &str) -> ScanResult {
    let mut result = ScanResult::default();

    // Only files that opt in to manual dispatch are eligible.
    if !has_workflow_dispatch(content) {
        return result;
    }

    for expr in parse_annotations(content) {
        match CronSpec::parse(&expr) {
            Ok(_) => result.annotations.push(CronAnnotation {
                owner: repo.owner.clone(),
                repo: repo.name.clone(),
                workflow_file: file.name.clone(),
                cron_expr: expr,
                git_ref: repo.default_branch.clone(),
            }),
            Err(e) => {
                warn!(
                    owner = %repo.owner,
                    repo = %repo.name,
                    workflow_file = %file.name,
                    expr = %expr,
                    "skipping invalid cron expression: {e}"
                );
                result.skipped.push(SkippedAnnotation {
                    owner: repo.owner.clone(),
                    repo: repo.name.clone(),
                    workflow_file: file.name.clone(),
                    cron_expr: expr,
                    reason: e.to_string(),
                });
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockClient {
        repos: Mutex<Vec<Repository>>,
        repos_error: Option<String>,
        files: Mutex<HashMap<String, Vec<WorkflowFile>>>,
        files_error_for: Option<String>,
        contents: Mutex<HashMap<String, String>>,
    }

    impl MockClient {
        fn with_repo(owner: &str, name: &str) -> Self {
            let mock = Self::default();
            mock.repos.lock().unwrap().push(Repository {
                owner: owner.into(),
                name: name.into(),
                default_branch: "main".into(),
            });
            mock
        }

        fn add_file(&self, repo: &str, name: &str, content: &str) {
            let path = format!(".github/workflows/{name}");
            self.files
                .lock()
                .unwrap()
                .entry(repo.to_string())
                .or_default()
                .push(WorkflowFile {
                    name: name.into(),
                    path: path.clone(),
                });
            self.contents
                .lock()
                .unwrap()
                .insert(path, content.to_string());
        }
    }

    #[async_trait]
    impl GithubApi for MockClient {
        async fn list_installation_repos(&self) -> anyhow::Result<Vec<Repository>> {
            if let Some(msg) = &self.repos_error {
                anyhow::bail!("{msg}");
            }
            Ok(self.repos.lock().unwrap().clone())
        }

        async fn get_workflow_files(
            &self,
            _owner: &str,
            repo: &str,
        ) -> anyhow::Result<Vec<WorkflowFile>> {
            if self.files_error_for.as_deref() == Some(repo) {
                anyhow::bail!("boom");
            }
            Ok(self
                .files
                .lock()
                .unwrap()
                .get(repo)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_file_content(
            &self,
            _owner: &str,
            _repo: &str,
            path: &str,
            _git_ref: &str,
        ) -> anyhow::Result<String> {
            self.contents
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not found: {path}"))
        }

        async fn dispatch_workflow(
            &self,
            _owner: &str,
            _repo: &str,
            _workflow_file: &str,
            _git_ref: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_variable(
            &self,
            _owner: &str,
            _repo: &str,
            _name: &str,
        ) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn set_variable(
            &self,
            _owner: &str,
            _repo: &str,
            _name: &str,
            _value: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_repo() -> Repository {
        Repository {
            owner: "test".into(),
            name: "repo".into(),
            default_branch: "main".into(),
        }
    }

    fn test_file() -> WorkflowFile {
        WorkflowFile {
            name: "ci.yml".into(),
            path: ".github/workflows/ci.yml".into(),
        }
    }

    #[test]
    fn test_parse_file_standard_cron() {
        let content = "on:\n  # ghacron: \"0 8 * * *\"\n  workflow_dispatch:\n";
        let result = parse_file(&test_repo(), &test_file(), content);

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].cron_expr, "0 8 * * *");
        assert_eq!(result.annotations[0].git_ref, "main");
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_parse_file_cron_tz() {
        let content = "on:\n  # ghacron: \"CRON_TZ=Asia/Tokyo 0 8 * * *\"\n  workflow_dispatch:\n";
        let result = parse_file(&test_repo(), &test_file(), content);

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].cron_expr, "CRON_TZ=Asia/Tokyo 0 8 * * *");
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_parse_file_tz_prefix() {
        let content = "on:\n  # ghacron: \"TZ=UTC 30 6 * * 1-5\"\n  workflow_dispatch:\n";
        let result = parse_file(&test_repo(), &test_file(), content);

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].cron_expr, "TZ=UTC 30 6 * * 1-5");
    }

    #[test]
    fn test_parse_file_invalid_tz_is_skipped() {
        let content =
            "on:\n  # ghacron: \"CRON_TZ=Asis/Tokyo 0 8 * * *\"\n  workflow_dispatch:\n";
        let result = parse_file(&test_repo(), &test_file(), content);

        assert!(result.annotations.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].cron_expr, "CRON_TZ=Asis/Tokyo 0 8 * * *");
        assert!(result.skipped[0].reason.contains("unknown time zone Asis/Tokyo"));
    }

    #[test]
    fn test_parse_file_without_workflow_dispatch() {
        let content = "on:\n  # ghacron: \"0 8 * * *\"\n  push:\n";
        let result = parse_file(&test_repo(), &test_file(), content);

        assert!(result.annotations.is_empty());
        assert!(result.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_scan_all_collects_annotations() {
        let mock = MockClient::with_repo("test", "repo");
        mock.add_file(
            "repo",
            "ci.yml",
            "on:\n  # ghacron: \"0 8 * * *\"\n  workflow_dispatch:\n",
        );

        let scanner = Scanner::new(Arc::new(mock));
        let result = scanner.scan_all().await.unwrap();

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].owner, "test");
        assert_eq!(result.annotations[0].workflow_file, "ci.yml");
    }

    #[tokio::test]
    async fn test_scan_all_repo_failure_continues() {
        let mut mock = MockClient::with_repo("test", "broken");
        mock.repos.lock().unwrap().push(Repository {
            owner: "test".into(),
            name: "ok".into(),
            default_branch: "main".into(),
        });
        mock.files_error_for = Some("broken".into());
        mock.add_file(
            "ok",
            "ci.yml",
            "on:\n  # ghacron: \"0 8 * * *\"\n  workflow_dispatch:\n",
        );

        let scanner = Scanner::new(Arc::new(mock));
        let result = scanner.scan_all().await.unwrap();

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].repo, "ok");
    }

    #[tokio::test]
    async fn test_scan_all_top_level_failure_aborts() {
        let mock = MockClient {
            repos_error: Some("api down".into()),
            ..Default::default()
        };

        let scanner = Scanner::new(Arc::new(mock));
        assert!(scanner.scan_all().await.is_err());
    }

    #[tokio::test]
    async fn test_scan_all_file_read_failure_continues() {
        let mock = MockClient::with_repo("test", "repo");
        // A listed file with no stored content: the read fails, the
        // scan still succeeds with nothing found.
        mock.files.lock().unwrap().insert(
            "repo".into(),
            vec![WorkflowFile {
                name: "ci.yml".into(),
                path: ".github/workflows/ci.yml".into(),
            }],
        );

        let scanner = Scanner::new(Arc::new(mock));
        let result = scanner.scan_all().await.unwrap();
        assert!(result.annotations.is_empty());
    }
}
