//! REST client over the GitHub API.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use ghacron_types::{Repository, WorkflowFile};

use crate::auth::AppAuth;
use crate::GithubApi;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const WORKFLOW_DIR: &str = ".github/workflows";
const ACCEPT_HEADER: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("ghacron/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: usize = 100;

#[derive(Deserialize)]
struct InstallationRepos {
    repositories: Vec<RepoPayload>,
}

#[derive(Deserialize)]
struct RepoPayload {
    name: String,
    owner: OwnerPayload,
    #[serde(default)]
    default_branch: String,
}

#[derive(Deserialize)]
struct OwnerPayload {
    login: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
}

#[derive(Deserialize)]
struct FileContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct VariablePayload {
    value: String,
}

/// GitHub REST client authenticated as a GitHub App installation.
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    auth: AppAuth,
}

impl GithubClient {
    /// Create a client for the given App id and RSA private key (PEM).
    pub fn new(app_id: i64, private_key_pem: &[u8]) -> anyhow::Result<Self> {
        Self::with_base_url(app_id, private_key_pem, DEFAULT_BASE_URL.to_string())
    }

    /// Create a client against a non-default API endpoint (GitHub
    /// Enterprise Server, or a test server).
    pub fn with_base_url(
        app_id: i64,
        private_key_pem: &[u8],
        base_url: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let auth = AppAuth::new(app_id, private_key_pem, base_url.clone(), http.clone())?;
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    async fn get(&self, url: String) -> anyhow::Result<reqwest::Response> {
        let token = self.auth.bearer_token().await?;
        self.http
            .get(url)
            .bearer_auth(token)
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await
            .context("GitHub API request failed")
    }
}

/// Fail with the response status and body unless the status is a success.
async fn ensure_success(
    resp: reqwest::Response,
    what: &str,
) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{what} failed (status={status}): {body}");
    }
    Ok(resp)
}

/// Whether a directory entry looks like a workflow file.
fn is_workflow_file(name: &str) -> bool {
    matches!(
        name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()),
        Some(ext) if ext == "yml" || ext == "yaml"
    )
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn list_installation_repos(&self) -> anyhow::Result<Vec<Repository>> {
        let mut repos = Vec::new();
        let mut page = 1;

        loop {
            let resp = self
                .get(format!(
                    "{}/installation/repositories?per_page={PER_PAGE}&page={page}",
                    self.base_url
                ))
                .await?;
            let resp = ensure_success(resp, "repository listing").await?;
            let body: InstallationRepos = resp
                .json()
                .await
                .context("repository listing parse failed")?;

            let count = body.repositories.len();
            repos.extend(body.repositories.into_iter().map(|r| Repository {
                owner: r.owner.login,
                name: r.name,
                default_branch: r.default_branch,
            }));

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(repos)
    }

    async fn get_workflow_files(
        &self,
        owner: &str,
        repo: &str,
    ) -> anyhow::Result<Vec<WorkflowFile>> {
        let resp = self
            .get(format!(
                "{}/repos/{owner}/{repo}/contents/{WORKFLOW_DIR}",
                self.base_url
            ))
            .await?;

        // No workflow directory at all.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let resp = ensure_success(resp, "workflow listing").await?;
        let entries: Vec<ContentEntry> =
            resp.json().await.context("workflow listing parse failed")?;

        Ok(entries
            .into_iter()
            .filter(|e| is_workflow_file(&e.name))
            .map(|e| WorkflowFile {
                name: e.name,
                path: e.path,
            })
            .collect())
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> anyhow::Result<String> {
        let mut url = format!("{}/repos/{owner}/{repo}/contents/{path}", self.base_url);
        if !git_ref.is_empty() {
            url.push_str(&format!("?ref={git_ref}"));
        }

        let resp = self.get(url).await?;
        let resp = ensure_success(resp, "file content fetch").await?;
        let file: FileContent = resp.json().await.context("file content parse failed")?;

        let Some(content) = file.content else {
            bail!("no content returned for {owner}/{repo}/{path}");
        };

        if file.encoding.as_deref() == Some("base64") {
            let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(cleaned)
                .context("file content base64 decode failed")?;
            String::from_utf8(bytes).context("file content is not valid UTF-8")
        } else {
            Ok(content)
        }
    }

    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow_file: &str,
        git_ref: &str,
    ) -> anyhow::Result<()> {
        let token = self.auth.bearer_token().await?;
        let resp = self
            .http
            .post(format!(
                "{}/repos/{owner}/{repo}/actions/workflows/{workflow_file}/dispatches",
                self.base_url
            ))
            .bearer_auth(token)
            .header("Accept", ACCEPT_HEADER)
            .json(&json!({ "ref": git_ref }))
            .send()
            .await
            .context("workflow_dispatch request failed")?;

        ensure_success(resp, "workflow_dispatch").await?;
        info!(owner, repo, workflow_file, git_ref, "fired workflow_dispatch");
        Ok(())
    }

    async fn get_variable(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
    ) -> anyhow::Result<Option<String>> {
        let resp = self
            .get(format!(
                "{}/repos/{owner}/{repo}/actions/variables/{name}",
                self.base_url
            ))
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = ensure_success(resp, "variable fetch").await?;
        let variable: VariablePayload = resp.json().await.context("variable parse failed")?;
        Ok(Some(variable.value))
    }

    async fn set_variable(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        let token = self.auth.bearer_token().await?;
        let body = json!({ "name": name, "value": value });

        // Update first; create when the variable does not exist yet.
        let update = self
            .http
            .patch(format!(
                "{}/repos/{owner}/{repo}/actions/variables/{name}",
                self.base_url
            ))
            .bearer_auth(&token)
            .header("Accept", ACCEPT_HEADER)
            .json(&body)
            .send()
            .await
            .context("variable update request failed")?;

        if update.status().is_success() {
            return Ok(());
        }
        let update_status = update.status();
        let update_body = update.text().await.unwrap_or_default();

        let create = self
            .http
            .post(format!(
                "{}/repos/{owner}/{repo}/actions/variables",
                self.base_url
            ))
            .bearer_auth(&token)
            .header("Accept", ACCEPT_HEADER)
            .json(&body)
            .send()
            .await
            .context("variable create request failed")?;

        if create.status().is_success() {
            return Ok(());
        }
        let create_status = create.status();
        let create_body = create.text().await.unwrap_or_default();

        bail!(
            "failed to set variable {owner}/{repo}/{name}: \
             update status={update_status} ({update_body}); \
             create status={create_status} ({create_body})"
        );
    }
}
