use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::github::{
    Authenticator, Forge, ForgeError, ForgeResult, Issue, Milestone, NewIssue, NewRepository,
    Permission,
};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const PER_PAGE: usize = 100;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("coursebot/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

#[derive(Debug, Deserialize)]
struct ContentFile {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    number: u64,
    title: String,
    #[serde(default)]
    pull_request: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NamedPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CommitPayload {
    sha: String,
}

pub struct GitHubClient {
    api_url: String,
    org: String,
    auth: Authenticator,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, org: impl Into<String>, auth: Authenticator) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            org: org.into(),
            auth,
        }
    }

    async fn request(&self, method: Method, path: &str) -> ForgeResult<RequestBuilder> {
        let token = self.auth.token(&HTTP_CLIENT, &self.api_url).await?;
        debug!("{method} {path}");
        Ok(HTTP_CLIENT
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28"))
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> ForgeResult<Response> {
        let mut builder = self.request(method.clone(), path).await?;
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await?;
        check_status(method, path, response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ForgeResult<T> {
        let response = self.send(method, path, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ForgeError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_paginated<T: DeserializeOwned>(&self, path: &str) -> ForgeResult<Vec<T>> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut out = Vec::new();
        let mut page = 1usize;
        loop {
            let paged = format!("{path}{separator}per_page={PER_PAGE}&page={page}");
            let batch: Vec<T> = self.send_json(Method::GET, &paged, None).await?;
            let len = batch.len();
            out.extend(batch);
            if len < PER_PAGE {
                return Ok(out);
            }
            page += 1;
        }
    }

    async fn existing_sha(&self, repo: &str, path: &str) -> ForgeResult<Option<String>> {
        let api_path = format!("/repos/{}/{repo}/contents/{path}", self.org);
        match self
            .send_json::<ContentFile>(Method::GET, &api_path, None)
            .await
        {
            Ok(file) => Ok(Some(file.sha)),
            Err(ForgeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

async fn check_status(method: Method, path: &str, response: Response) -> ForgeResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(ForgeError::NotFound(path.to_string()));
    }
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(180).collect());
    Err(ForgeError::Status {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
        message,
    })
}

/// GitHub wraps base64 file content at 60 columns.
pub fn decode_content(path: &str, content: &str) -> ForgeResult<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| ForgeError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| ForgeError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Forge for GitHubClient {
    fn org(&self) -> &str {
        &self.org
    }

    async fn read_text(
        &self,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> ForgeResult<String> {
        let mut api_path = format!("/repos/{}/{repo}/contents/{path}", self.org);
        if let Some(reference) = reference {
            api_path.push_str(&format!("?ref={reference}"));
        }
        let file: ContentFile = self.send_json(Method::GET, &api_path, None).await?;
        if file.encoding != "base64" {
            return Err(ForgeError::Decode {
                path: api_path,
                message: format!("unsupported encoding `{}`", file.encoding),
            });
        }
        decode_content(&api_path, &file.content)
    }

    async fn list_names(&self, repo: &str, path: &str) -> ForgeResult<Vec<String>> {
        let api_path = format!("/repos/{}/{repo}/contents/{path}", self.org);
        let entries: Vec<ContentEntry> = self.send_json(Method::GET, &api_path, None).await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    async fn write_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> ForgeResult<()> {
        let sha = self.existing_sha(repo, path).await?;
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha);
        }
        let api_path = format!("/repos/{}/{repo}/contents/{path}", self.org);
        self.send(Method::PUT, &api_path, Some(body)).await?;
        Ok(())
    }

    async fn append_comment(&self, repo: &str, issue: u64, body: &str) -> ForgeResult<()> {
        let api_path = format!("/repos/{}/{repo}/issues/{issue}/comments", self.org);
        self.send(Method::POST, &api_path, Some(json!({ "body": body })))
            .await?;
        Ok(())
    }

    async fn list_comments(&self, repo: &str, issue: u64) -> ForgeResult<Vec<String>> {
        let api_path = format!("/repos/{}/{repo}/issues/{issue}/comments", self.org);
        let comments: Vec<CommentPayload> = self.get_paginated(&api_path).await?;
        Ok(comments
            .into_iter()
            .map(|c| c.body.unwrap_or_default())
            .collect())
    }

    async fn create_issue(&self, repo: &str, issue: &NewIssue) -> ForgeResult<u64> {
        let api_path = format!("/repos/{}/{repo}/issues", self.org);
        let mut body = json!({
            "title": issue.title,
            "body": issue.body,
            "labels": issue.labels,
        });
        if let Some(milestone) = issue.milestone {
            body["milestone"] = json!(milestone);
        }
        let created: IssuePayload = self.send_json(Method::POST, &api_path, Some(body)).await?;
        Ok(created.number)
    }

    async fn list_issues(&self, repo: &str) -> ForgeResult<Vec<Issue>> {
        let api_path = format!("/repos/{}/{repo}/issues?state=all", self.org);
        let issues: Vec<IssuePayload> = self.get_paginated(&api_path).await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(|i| Issue {
                number: i.number,
                title: i.title,
            })
            .collect())
    }

    async fn list_milestones(&self, repo: &str) -> ForgeResult<Vec<Milestone>> {
        let api_path = format!("/repos/{}/{repo}/milestones?state=all", self.org);
        self.get_paginated(&api_path).await
    }

    async fn create_team(&self, name: &str) -> ForgeResult<()> {
        let api_path = format!("/orgs/{}/teams", self.org);
        self.send(
            Method::POST,
            &api_path,
            Some(json!({ "name": name, "privacy": "closed" })),
        )
        .await?;
        Ok(())
    }

    async fn delete_team(&self, team: &str) -> ForgeResult<()> {
        let api_path = format!("/orgs/{}/teams/{team}", self.org);
        self.send(Method::DELETE, &api_path, None).await?;
        Ok(())
    }

    async fn add_team_member(&self, team: &str, user: &str) -> ForgeResult<()> {
        let api_path = format!("/orgs/{}/teams/{team}/memberships/{user}", self.org);
        self.send(Method::PUT, &api_path, Some(json!({ "role": "member" })))
            .await?;
        Ok(())
    }

    async fn team_membership(&self, team: &str, user: &str) -> ForgeResult<()> {
        let api_path = format!("/orgs/{}/teams/{team}/memberships/{user}", self.org);
        self.send(Method::GET, &api_path, None).await?;
        Ok(())
    }

    async fn team_members(&self, team: &str) -> ForgeResult<Vec<String>> {
        let api_path = format!("/orgs/{}/teams/{team}/members", self.org);
        let members: Vec<LoginPayload> = self.get_paginated(&api_path).await?;
        Ok(members.into_iter().map(|m| m.login).collect())
    }

    async fn remove_org_member(&self, user: &str) -> ForgeResult<()> {
        let api_path = format!("/orgs/{}/members/{user}", self.org);
        self.send(Method::DELETE, &api_path, None).await?;
        Ok(())
    }

    async fn create_repo(&self, repo: &NewRepository) -> ForgeResult<()> {
        let api_path = format!("/orgs/{}/repos", self.org);
        self.send(
            Method::POST,
            &api_path,
            Some(json!({
                "name": repo.name,
                "description": repo.description,
                "private": repo.private,
                "has_projects": repo.has_projects,
                "has_wiki": repo.has_wiki,
            })),
        )
        .await?;
        Ok(())
    }

    async fn delete_repo(&self, repo: &str) -> ForgeResult<()> {
        let api_path = format!("/repos/{}/{repo}", self.org);
        self.send(Method::DELETE, &api_path, None).await?;
        Ok(())
    }

    async fn list_repos(&self) -> ForgeResult<Vec<String>> {
        let api_path = format!("/orgs/{}/repos", self.org);
        let repos: Vec<NamedPayload> = self.get_paginated(&api_path).await?;
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    async fn grant_team(&self, team: &str, repo: &str, permission: Permission) -> ForgeResult<()> {
        let api_path = format!("/orgs/{0}/teams/{team}/repos/{0}/{repo}", self.org);
        self.send(
            Method::PUT,
            &api_path,
            Some(json!({ "permission": permission.as_str() })),
        )
        .await?;
        Ok(())
    }

    async fn add_collaborator(
        &self,
        repo: &str,
        user: &str,
        permission: Permission,
    ) -> ForgeResult<()> {
        let api_path = format!("/repos/{}/{repo}/collaborators/{user}", self.org);
        self.send(
            Method::PUT,
            &api_path,
            Some(json!({ "permission": permission.as_str() })),
        )
        .await?;
        Ok(())
    }

    async fn commit_sha(&self, repo: &str, reference: &str) -> ForgeResult<String> {
        let api_path = format!("/repos/{}/{repo}/commits/{reference}", self.org);
        let commit: CommitPayload = self.send_json(Method::GET, &api_path, None).await?;
        Ok(commit.sha)
    }
}
