//! ghacron-github: GitHub App REST client.
//!
//! The engine consumes only the [`GithubApi`] trait; [`GithubClient`] is
//! the production implementation over the GitHub REST API with App
//! installation authentication.

pub mod auth;
mod client;

use async_trait::async_trait;

use ghacron_types::{Repository, WorkflowFile};

pub use client::GithubClient;

/// The platform surface the engine consumes.
#[async_trait]
pub trait GithubApi: Send + Sync {
    /// Enumerate all repositories visible to the App installation.
    async fn list_installation_repos(&self) -> anyhow::Result<Vec<Repository>>;

    /// List workflow files (`.yml`/`.yaml`) under `.github/workflows/`.
    /// A missing directory yields an empty list.
    async fn get_workflow_files(
        &self,
        owner: &str,
        repo: &str,
    ) -> anyhow::Result<Vec<WorkflowFile>>;

    /// Fetch the decoded UTF-8 body of a file at a ref.
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> anyhow::Result<String>;

    /// Fire a `workflow_dispatch` event for a workflow file on a ref.
    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow_file: &str,
        git_ref: &str,
    ) -> anyhow::Result<()>;

    /// Read a repository Actions variable. Absent (404) yields `None`.
    async fn get_variable(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
    ) -> anyhow::Result<Option<String>>;

    /// Create or update a repository Actions variable.
    async fn set_variable(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        value: &str,
    ) -> anyhow::Result<()>;
}
