//! Rubric grading: parsing hand-edited part files, merging them into one
//! aggregate grade per student (or group) and rendering the results.

pub mod aggregate;
pub mod errors;
pub mod parser;
pub mod skeleton;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use aggregate::{aggregate, extract_total, AggregateGrade, Aggregation, PartSource};
pub use errors::{ErrorKind, GradeError, GradingFailed, MissingDataError};
pub use parser::{parse_part, ParsedPart};

/// What a set of part files grades.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Assignment(String),
    Iteration(String),
    Quiz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Student,
    Group,
}

impl Subject {
    /// Stable key used in storage paths and grade records.
    pub fn slug(&self) -> String {
        match self {
            Self::Assignment(id) => format!("assignments/{id}"),
            Self::Iteration(id) => format!("iterations/{id}"),
            Self::Quiz => "quiz".to_string(),
        }
    }

    /// Staff-repository directory holding the part files.
    pub fn directory(&self) -> String {
        format!("grades/{}", self.slug())
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            Self::Iteration(_) => EntityKind::Group,
            Self::Assignment(_) | Self::Quiz => EntityKind::Student,
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        if slug == "quiz" {
            return Some(Self::Quiz);
        }
        let (kind, id) = slug.split_once('/')?;
        match kind {
            "assignments" => Some(Self::Assignment(id.to_string())),
            "iterations" => Some(Self::Iteration(id.to_string())),
            _ => None,
        }
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assignment(id) => write!(f, "Assignment {id}"),
            Self::Iteration(id) => write!(f, "Iteration {id}"),
            Self::Quiz => write!(f, "Quiz"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown grading subject `{0}` (expected quiz, assignment:<id> or iteration:<id>)")]
pub struct SubjectParseError(pub String);

impl FromStr for Subject {
    type Err = SubjectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("quiz") {
            return Ok(Self::Quiz);
        }
        // Only the kind is case-insensitive; ids must match the course config.
        let (kind, id) = trimmed
            .split_once(|c| c == ':' || c == '/' || c == '-')
            .ok_or_else(|| SubjectParseError(s.to_string()))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(SubjectParseError(s.to_string()));
        }
        match kind.trim().to_ascii_lowercase().as_str() {
            "assignment" | "assignments" | "a" => Ok(Self::Assignment(id.to_string())),
            "iteration" | "iterations" | "i" => Ok(Self::Iteration(id.to_string())),
            _ => Err(SubjectParseError(s.to_string())),
        }
    }
}

/// `**+N** description` / `**-N** description`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointLine {
    pub delta: i64,
    pub description: String,
}

impl Display for PointLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "**{:+}** {}", self.delta, self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricItem {
    pub identifier: String,
    pub lines: Vec<PointLine>,
}

impl RubricItem {
    pub fn delta(&self) -> i64 {
        self.lines.iter().map(|l| l.delta).sum()
    }

    pub fn description(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.description.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A grade line after rubric references have been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedLine {
    Rubric { identifier: String, lines: Vec<PointLine> },
    Point(PointLine),
}

impl AppliedLine {
    pub fn point_lines(&self) -> &[PointLine] {
        match self {
            Self::Rubric { lines, .. } => lines,
            Self::Point(line) => std::slice::from_ref(line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentGradeEntry {
    pub student: String,
    pub url: String,
    pub lines: Vec<AppliedLine>,
    pub grader: String,
}

impl StudentGradeEntry {
    pub fn delta(&self) -> i64 {
        self.lines
            .iter()
            .flat_map(|l| l.point_lines())
            .map(|l| l.delta)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartFile {
    pub name: String,
    pub title: String,
    pub rubric: Vec<RubricItem>,
    pub entries: Vec<StudentGradeEntry>,
    /// Every student with a header in the grades block, valid entry or not.
    pub students: Vec<String>,
}

impl PartFile {
    pub fn rubric_item(&self, identifier: &str) -> Option<&RubricItem> {
        self.rubric.iter().find(|r| r.identifier == identifier)
    }

    pub fn entry(&self, student: &str) -> Option<&StudentGradeEntry> {
        self.entries.iter().find(|e| e.student == student)
    }
}
