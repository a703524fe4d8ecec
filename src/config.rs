use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::github::{Credentials, Forge};

pub const COURSE_CONFIG_PATH: &str = "configuration.json";
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Process-level settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub course: String,
    pub org: String,
    pub api_url: String,
    pub credentials: Credentials,
    pub course_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub course: Option<String>,
    pub org: Option<String>,
    pub course_config: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let course = get("COURSE").ok_or_else(|| anyhow!("COURSE is not set"))?;
        let org = get("GITHUB_ORG").ok_or_else(|| anyhow!("GITHUB_ORG is not set"))?;
        let api_url = get("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let credentials = if let Some(token) = get("GITHUB_TOKEN") {
            Credentials::Token(token)
        } else {
            let app_id = get("APP_ID")
                .ok_or_else(|| anyhow!("either GITHUB_TOKEN or APP_ID must be set"))?
                .parse::<u64>()
                .context("APP_ID must be numeric")?;
            let private_key =
                get("PRIVATE_KEY").ok_or_else(|| anyhow!("PRIVATE_KEY is not set"))?;
            let installation_id = get("INSTALLATION_ID")
                .ok_or_else(|| anyhow!("INSTALLATION_ID is not set"))?
                .parse::<u64>()
                .context("INSTALLATION_ID must be numeric")?;
            Credentials::App {
                app_id,
                private_key,
                installation_id,
            }
        };

        Ok(Self {
            course,
            org,
            api_url,
            credentials,
            course_config: get("COURSE_CONFIG").map(PathBuf::from),
        })
    }

    pub fn apply_overrides(&mut self, overrides: SettingsOverrides) {
        if let Some(course) = overrides.course {
            self.course = course;
        }
        if let Some(org) = overrides.org {
            self.org = org;
        }
        if let Some(path) = overrides.course_config {
            self.course_config = Some(path);
        }
    }

    pub fn staff_repo(&self) -> String {
        format!("{}-staff", self.course)
    }

    pub fn students_repo(&self) -> String {
        format!("{}-students", self.course)
    }

    pub fn staff_team(&self) -> String {
        format!("{}-staff", self.course)
    }

    pub fn students_team(&self) -> String {
        format!("{}-students", self.course)
    }

    pub fn student_repo(&self, github: &str) -> String {
        format!("{}-student-{github}", self.course)
    }

    pub fn student_repo_prefix(&self) -> String {
        format!("{}-student-", self.course)
    }

    pub fn group_repo(&self, identifier: &str) -> String {
        format!("{}-group-{identifier}", self.course)
    }

    pub fn group_team(&self, identifier: &str) -> String {
        self.group_repo(identifier)
    }

    /// Loads the course configuration from the local override if one is
    /// set, otherwise from the staff repository.
    pub async fn course_config(&self, forge: &dyn Forge) -> Result<CourseConfig> {
        if let Some(path) = &self.course_config {
            return CourseConfig::load(path);
        }
        let raw = forge
            .read_text(&self.staff_repo(), COURSE_CONFIG_PATH, None)
            .await
            .with_context(|| format!("failed reading {COURSE_CONFIG_PATH} from staff repository"))?;
        CourseConfig::parse(&raw)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CourseConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub assignments: Vec<Deliverable>,
    #[serde(default)]
    pub iterations: Vec<Deliverable>,
    #[serde(default)]
    pub grading: GradingPolicy,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub redirects: RedirectsConfig,
}

/// Issue numbers of the staff-repository issues that hold each table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub students: Option<u64>,
    #[serde(default)]
    pub assignments: Option<u64>,
    #[serde(default)]
    pub feedbacks: Option<u64>,
    #[serde(default)]
    pub groups: Option<u64>,
    #[serde(default)]
    pub iterations: Option<u64>,
    #[serde(default)]
    pub grades: Option<u64>,
    #[serde(default)]
    pub self_reviews: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deliverable {
    pub id: String,
    #[serde(default)]
    pub due: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradingPolicy {
    #[serde(default)]
    pub weights: Weights,
    #[serde(default = "default_cutoffs")]
    pub cutoffs: Vec<Cutoff>,
    #[serde(default = "default_allowed_late_days")]
    pub allowed_late_days: u32,
    /// Points per late day beyond the allowance; zero or negative.
    #[serde(default = "default_late_days_penalty")]
    pub late_days_penalty: f64,
    #[serde(default)]
    pub ignored_assignments: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub adjustments: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Weights {
    pub assignments: f64,
    pub quiz: f64,
    pub iterations: f64,
    pub project: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cutoff {
    pub grade: String,
    pub points: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplatesConfig {
    /// Copied from the staff repository into each new student repository.
    #[serde(default)]
    pub onboarding: Vec<TemplateCopy>,
    /// Copied from the staff repository into each new group repository.
    #[serde(default)]
    pub groups: Vec<TemplateCopy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateCopy {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedirectsConfig {
    #[serde(default = "default_redirect")]
    pub success: String,
    #[serde(default = "default_redirect")]
    pub error: String,
}

impl CourseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed reading course config: {}", path.display()))?;
        Self::parse(&data)
            .with_context(|| format!("failed parsing course config: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(raw).context("invalid course configuration")?;
        Ok(parsed)
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn assignment(&self, id: &str) -> Option<&Deliverable> {
        self.assignments.iter().find(|a| a.id == id)
    }

    pub fn iteration(&self, id: &str) -> Option<&Deliverable> {
        self.iterations.iter().find(|i| i.id == id)
    }

    pub fn default_template() -> String {
        let template = r#"{
  "database": {
    "students": 1,
    "assignments": 2,
    "feedbacks": 3,
    "groups": 4,
    "iterations": 5,
    "grades": 6,
    "self_reviews": 7
  },
  "assignments": [
    { "id": "1", "due": "2020-09-11T23:59:59-04:00" },
    { "id": "2", "due": "2020-09-18T23:59:59-04:00" }
  ],
  "iterations": [
    { "id": "1", "due": "2020-10-16T23:59:59-04:00" },
    { "id": "2", "due": "2020-11-06T23:59:59-05:00" },
    { "id": "3", "due": "2020-12-04T23:59:59-05:00" }
  ],
  "grading": {
    "weights": { "assignments": 0.4, "quiz": 0.1, "iterations": 0.25, "project": 0.25 },
    "cutoffs": [
      { "grade": "A", "points": 93 },
      { "grade": "A-", "points": 90 },
      { "grade": "B+", "points": 87 },
      { "grade": "B", "points": 83 },
      { "grade": "B-", "points": 80 },
      { "grade": "C+", "points": 77 },
      { "grade": "C", "points": 73 },
      { "grade": "C-", "points": 70 },
      { "grade": "D+", "points": 67 },
      { "grade": "D", "points": 60 },
      { "grade": "F", "points": 0 }
    ],
    "allowed_late_days": 5,
    "late_days_penalty": -5,
    "ignored_assignments": {},
    "adjustments": {}
  },
  "templates": {
    "onboarding": [
      { "source": "templates/assignments/1.md", "destination": "assignments/1.md" }
    ],
    "groups": [
      { "source": "templates/project/srs.md", "destination": "docs/SRS.md" }
    ]
  },
  "redirects": {
    "success": "https://example.edu/course/onboarding_success/",
    "error": "https://example.edu/course/onboarding_error/"
  }
}
"#;
        template.to_string()
    }
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            cutoffs: default_cutoffs(),
            allowed_late_days: default_allowed_late_days(),
            late_days_penalty: default_late_days_penalty(),
            ignored_assignments: BTreeMap::new(),
            adjustments: BTreeMap::new(),
        }
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            assignments: 0.4,
            quiz: 0.1,
            iterations: 0.25,
            project: 0.25,
        }
    }
}

impl Default for RedirectsConfig {
    fn default() -> Self {
        Self {
            success: default_redirect(),
            error: default_redirect(),
        }
    }
}

fn default_cutoffs() -> Vec<Cutoff> {
    [
        ("A", 93.0),
        ("A-", 90.0),
        ("B+", 87.0),
        ("B", 83.0),
        ("B-", 80.0),
        ("C+", 77.0),
        ("C", 73.0),
        ("C-", 70.0),
        ("D+", 67.0),
        ("D", 60.0),
        ("F", 0.0),
    ]
    .into_iter()
    .map(|(grade, points)| Cutoff {
        grade: grade.to_string(),
        points,
    })
    .collect()
}

fn default_allowed_late_days() -> u32 {
    5
}

fn default_late_days_penalty() -> f64 {
    -5.0
}

fn default_redirect() -> String {
    "/".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn template_parses_and_matches_defaults() {
        let config = CourseConfig::parse(&CourseConfig::default_template()).expect("template");
        assert_eq!(config.database.grades, Some(6));
        assert_eq!(config.grading, GradingPolicy::default());
        assert_eq!(config.iterations.len(), 3);
        assert!(config.assignment("2").and_then(|a| a.due).is_some());
    }

    #[test]
    fn empty_document_falls_back_to_defaults() {
        let config = CourseConfig::parse("{}").expect("empty config");
        assert_eq!(config.database, DatabaseConfig::default());
        assert_eq!(config.grading.allowed_late_days, 5);
        assert_eq!(config.grading.cutoffs.first().map(|c| c.grade.as_str()), Some("A"));
    }

    #[test]
    fn settings_prefer_personal_token() {
        let settings = Settings::from_lookup(lookup(&[
            ("COURSE", "cs421"),
            ("GITHUB_ORG", "jhu-course"),
            ("GITHUB_TOKEN", "ghp_x"),
            ("APP_ID", "12"),
        ]))
        .expect("settings");
        assert!(matches!(settings.credentials, Credentials::Token(ref t) if t == "ghp_x"));
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.student_repo("alice"), "cs421-student-alice");
        assert_eq!(settings.group_team("7"), "cs421-group-7");
    }

    #[test]
    fn settings_read_app_credentials() {
        let settings = Settings::from_lookup(lookup(&[
            ("COURSE", "cs421"),
            ("GITHUB_ORG", "jhu-course"),
            ("APP_ID", "12"),
            ("PRIVATE_KEY", "pem"),
            ("INSTALLATION_ID", "34"),
        ]))
        .expect("settings");
        match settings.credentials {
            Credentials::App {
                app_id,
                installation_id,
                ..
            } => {
                assert_eq!(app_id, 12);
                assert_eq!(installation_id, 34);
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }

    #[test]
    fn settings_require_course() {
        let err = Settings::from_lookup(lookup(&[("GITHUB_ORG", "x"), ("GITHUB_TOKEN", "t")]))
            .expect_err("missing course");
        assert!(err.to_string().contains("COURSE"));
    }

    #[test]
    fn overrides_replace_course_and_org() {
        let mut settings = Settings::from_lookup(lookup(&[
            ("COURSE", "cs421"),
            ("GITHUB_ORG", "jhu-course"),
            ("GITHUB_TOKEN", "t"),
        ]))
        .unwrap();
        settings.apply_overrides(SettingsOverrides {
            course: Some("cs500".to_string()),
            org: None,
            course_config: Some(PathBuf::from("local.json")),
        });
        assert_eq!(settings.staff_repo(), "cs500-staff");
        assert_eq!(settings.org, "jhu-course");
        assert_eq!(settings.course_config, Some(PathBuf::from("local.json")));
    }
}
