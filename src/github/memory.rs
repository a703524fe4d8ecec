use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::github::{
    Forge, ForgeError, ForgeResult, Issue, Milestone, NewIssue, NewRepository, Permission,
};

#[derive(Debug, Clone)]
pub struct StoredIssue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub milestone: Option<u64>,
    pub comments: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<(String, String), String>,
    commits: BTreeSet<(String, String)>,
    issues: BTreeMap<String, Vec<StoredIssue>>,
    milestones: BTreeMap<String, Vec<Milestone>>,
    teams: BTreeMap<String, Vec<String>>,
    team_grants: Vec<(String, String, Permission)>,
    collaborators: Vec<(String, String, Permission)>,
    repos: BTreeSet<String>,
    removed_members: Vec<String>,
    broken_repos: BTreeSet<String>,
}

/// In-memory stand-in for GitHub used by workflow tests.
#[derive(Debug, Default)]
pub struct InMemoryForge {
    state: Mutex<State>,
}

impl InMemoryForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, repo: &str) -> Self {
        self.state.lock().unwrap().repos.insert(repo.to_string());
        self
    }

    pub fn with_file(self, repo: &str, path: &str, content: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.repos.insert(repo.to_string());
            state
                .files
                .insert((repo.to_string(), path.to_string()), content.to_string());
        }
        self
    }

    pub fn with_commit(self, repo: &str, sha: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .commits
            .insert((repo.to_string(), sha.to_string()));
        self
    }

    pub fn with_team(self, team: &str, members: &[&str]) -> Self {
        self.state.lock().unwrap().teams.insert(
            team.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    pub fn with_issue(self, repo: &str, number: u64, title: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .issues
            .entry(repo.to_string())
            .or_default()
            .push(StoredIssue {
                number,
                title: title.to_string(),
                body: String::new(),
                labels: Vec::new(),
                milestone: None,
                comments: Vec::new(),
            });
        self
    }

    pub fn with_milestone(self, repo: &str, number: u64, title: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .milestones
            .entry(repo.to_string())
            .or_default()
            .push(Milestone {
                number,
                title: title.to_string(),
            });
        self
    }

    /// Every write against `repo` fails afterwards.
    pub fn with_broken_repo(self, repo: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .broken_repos
            .insert(repo.to_string());
        self
    }

    pub fn file(&self, repo: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(repo.to_string(), path.to_string()))
            .cloned()
    }

    pub fn issues(&self, repo: &str) -> Vec<StoredIssue> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(repo)
            .cloned()
            .unwrap_or_default()
    }

    pub fn comments(&self, repo: &str, issue: u64) -> Vec<String> {
        self.issues(repo)
            .into_iter()
            .find(|i| i.number == issue)
            .map(|i| i.comments)
            .unwrap_or_default()
    }

    pub fn has_repo(&self, repo: &str) -> bool {
        self.state.lock().unwrap().repos.contains(repo)
    }

    pub fn team(&self, team: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().teams.get(team).cloned()
    }

    pub fn grants(&self) -> Vec<(String, String, Permission)> {
        self.state.lock().unwrap().team_grants.clone()
    }

    pub fn collaborators(&self) -> Vec<(String, String, Permission)> {
        self.state.lock().unwrap().collaborators.clone()
    }

    pub fn removed_members(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_members.clone()
    }

    fn ensure_writable(state: &State, repo: &str) -> ForgeResult<()> {
        if state.broken_repos.contains(repo) {
            return Err(ForgeError::Status {
                method: "PUT".to_string(),
                path: repo.to_string(),
                status: 500,
                message: "simulated failure".to_string(),
            });
        }
        if !state.repos.contains(repo) {
            return Err(ForgeError::NotFound(repo.to_string()));
        }
        Ok(())
    }
}

fn already_exists(path: &str) -> ForgeError {
    ForgeError::Status {
        method: "POST".to_string(),
        path: path.to_string(),
        status: 422,
        message: "already exists".to_string(),
    }
}

#[async_trait]
impl Forge for InMemoryForge {
    fn org(&self) -> &str {
        "course-org"
    }

    async fn read_text(
        &self,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> ForgeResult<String> {
        let state = self.state.lock().unwrap();
        if let Some(reference) = reference {
            if !state
                .commits
                .contains(&(repo.to_string(), reference.to_string()))
            {
                return Err(ForgeError::NotFound(format!("{repo}@{reference}")));
            }
        }
        state
            .files
            .get(&(repo.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("{repo}/{path}")))
    }

    async fn list_names(&self, repo: &str, path: &str) -> ForgeResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let names = state
            .files
            .keys()
            .filter(|(r, _)| r == repo)
            .filter_map(|(_, p)| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if names.is_empty() {
            return Err(ForgeError::NotFound(format!("{repo}/{path}")));
        }
        Ok(names)
    }

    async fn write_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        _message: &str,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_writable(&state, repo)?;
        state
            .files
            .insert((repo.to_string(), path.to_string()), content.to_string());
        Ok(())
    }

    async fn append_comment(&self, repo: &str, issue: u64, body: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .issues
            .get_mut(repo)
            .and_then(|issues| issues.iter_mut().find(|i| i.number == issue))
            .ok_or_else(|| ForgeError::NotFound(format!("{repo}#{issue}")))?;
        stored.comments.push(body.to_string());
        Ok(())
    }

    async fn list_comments(&self, repo: &str, issue: u64) -> ForgeResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .issues
            .get(repo)
            .and_then(|issues| issues.iter().find(|i| i.number == issue))
            .map(|i| i.comments.clone())
            .ok_or_else(|| ForgeError::NotFound(format!("{repo}#{issue}")))
    }

    async fn create_issue(&self, repo: &str, issue: &NewIssue) -> ForgeResult<u64> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_writable(&state, repo)?;
        let issues = state.issues.entry(repo.to_string()).or_default();
        let number = issues.iter().map(|i| i.number).max().unwrap_or(0) + 1;
        issues.push(StoredIssue {
            number,
            title: issue.title.clone(),
            body: issue.body.clone(),
            labels: issue.labels.clone(),
            milestone: issue.milestone,
            comments: Vec::new(),
        });
        Ok(number)
    }

    async fn list_issues(&self, repo: &str) -> ForgeResult<Vec<Issue>> {
        let state = self.state.lock().unwrap();
        if !state.repos.contains(repo) {
            return Err(ForgeError::NotFound(repo.to_string()));
        }
        Ok(state
            .issues
            .get(repo)
            .map(|issues| {
                issues
                    .iter()
                    .map(|i| Issue {
                        number: i.number,
                        title: i.title.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_milestones(&self, repo: &str) -> ForgeResult<Vec<Milestone>> {
        let state = self.state.lock().unwrap();
        Ok(state.milestones.get(repo).cloned().unwrap_or_default())
    }

    async fn create_team(&self, name: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.teams.contains_key(name) {
            return Err(already_exists(name));
        }
        state.teams.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_team(&self, team: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .teams
            .remove(team)
            .map(|_| ())
            .ok_or_else(|| ForgeError::NotFound(team.to_string()))
    }

    async fn add_team_member(&self, team: &str, user: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        let members = state
            .teams
            .get_mut(team)
            .ok_or_else(|| ForgeError::NotFound(team.to_string()))?;
        if !members.iter().any(|m| m == user) {
            members.push(user.to_string());
        }
        Ok(())
    }

    async fn team_membership(&self, team: &str, user: &str) -> ForgeResult<()> {
        let state = self.state.lock().unwrap();
        match state.teams.get(team) {
            Some(members) if members.iter().any(|m| m == user) => Ok(()),
            _ => Err(ForgeError::NotFound(format!("{team}/{user}"))),
        }
    }

    async fn team_members(&self, team: &str) -> ForgeResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .teams
            .get(team)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(team.to_string()))
    }

    async fn remove_org_member(&self, user: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        for members in state.teams.values_mut() {
            members.retain(|m| m != user);
        }
        state.removed_members.push(user.to_string());
        Ok(())
    }

    async fn create_repo(&self, repo: &NewRepository) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.repos.insert(repo.name.clone()) {
            return Err(already_exists(&repo.name));
        }
        Ok(())
    }

    async fn delete_repo(&self, repo: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.repos.remove(repo) {
            return Err(ForgeError::NotFound(repo.to_string()));
        }
        state.files.retain(|(r, _), _| r != repo);
        Ok(())
    }

    async fn list_repos(&self) -> ForgeResult<Vec<String>> {
        Ok(self.state.lock().unwrap().repos.iter().cloned().collect())
    }

    async fn grant_team(&self, team: &str, repo: &str, permission: Permission) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.teams.contains_key(team) {
            return Err(ForgeError::NotFound(team.to_string()));
        }
        Self::ensure_writable(&state, repo)?;
        state
            .team_grants
            .push((team.to_string(), repo.to_string(), permission));
        Ok(())
    }

    async fn add_collaborator(
        &self,
        repo: &str,
        user: &str,
        permission: Permission,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_writable(&state, repo)?;
        state
            .collaborators
            .push((repo.to_string(), user.to_string(), permission));
        Ok(())
    }

    async fn commit_sha(&self, repo: &str, reference: &str) -> ForgeResult<String> {
        let state = self.state.lock().unwrap();
        if state
            .commits
            .contains(&(repo.to_string(), reference.to_string()))
        {
            Ok(reference.to_string())
        } else {
            Err(ForgeError::NotFound(format!("{repo}@{reference}")))
        }
    }
}
