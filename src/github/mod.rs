pub mod auth;
pub mod client;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::{Authenticator, Credentials};
pub use client::GitHubClient;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{method} {path} returned {status}: {message}")]
    Status {
        method: String,
        path: String,
        status: u16,
        message: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response from {path}: {message}")]
    Decode { path: String, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ForgeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// GitHub answers 422 when a team or repository name is taken.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status: 422, .. })
    }
}

pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Pull,
    Push,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub has_projects: bool,
    pub has_wiki: bool,
}

impl NewRepository {
    pub fn private(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            private: true,
            has_projects: true,
            has_wiki: false,
        }
    }

    pub fn without_projects(mut self) -> Self {
        self.has_projects = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub milestone: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
}

/// The subset of the GitHub REST API the course tooling drives. Repository
/// and team names are relative to the configured organization.
#[async_trait]
pub trait Forge: Send + Sync {
    fn org(&self) -> &str;

    async fn read_text(&self, repo: &str, path: &str, reference: Option<&str>)
        -> ForgeResult<String>;
    async fn list_names(&self, repo: &str, path: &str) -> ForgeResult<Vec<String>>;
    async fn write_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> ForgeResult<()>;

    async fn append_comment(&self, repo: &str, issue: u64, body: &str) -> ForgeResult<()>;
    async fn list_comments(&self, repo: &str, issue: u64) -> ForgeResult<Vec<String>>;
    async fn create_issue(&self, repo: &str, issue: &NewIssue) -> ForgeResult<u64>;
    async fn list_issues(&self, repo: &str) -> ForgeResult<Vec<Issue>>;
    async fn list_milestones(&self, repo: &str) -> ForgeResult<Vec<Milestone>>;

    async fn create_team(&self, name: &str) -> ForgeResult<()>;
    async fn delete_team(&self, team: &str) -> ForgeResult<()>;
    async fn add_team_member(&self, team: &str, user: &str) -> ForgeResult<()>;
    /// Fails with `NotFound` when `user` is not a member of `team`.
    async fn team_membership(&self, team: &str, user: &str) -> ForgeResult<()>;
    async fn team_members(&self, team: &str) -> ForgeResult<Vec<String>>;
    async fn remove_org_member(&self, user: &str) -> ForgeResult<()>;

    async fn create_repo(&self, repo: &NewRepository) -> ForgeResult<()>;
    async fn delete_repo(&self, repo: &str) -> ForgeResult<()>;
    async fn list_repos(&self) -> ForgeResult<Vec<String>>;
    async fn grant_team(&self, team: &str, repo: &str, permission: Permission)
        -> ForgeResult<()>;
    async fn add_collaborator(&self, repo: &str, user: &str, permission: Permission)
        -> ForgeResult<()>;
    async fn commit_sha(&self, repo: &str, reference: &str) -> ForgeResult<String>;
}

pub fn repo_url(org: &str, repo: &str) -> String {
    format!("https://github.com/{org}/{repo}")
}
